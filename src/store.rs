//! Keyed per-user stores: session tokens and in-flight conversation states.
//!
//! Both are behind small traits so the dispatcher never touches global
//! mutable state: tests inject in-memory maps, the live bot keeps tokens in
//! SQLite (sessions survive a restart) and conversation states in memory
//! (they are ephemeral by design).

use crate::bot::flow::ConversationState;
use anyhow::Result;
use sqlite::State;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Bearer-token cache keyed by chat identity.
pub trait TokenStore: Send + Sync {
    fn get(&self, chat_id: &str) -> Option<String>;
    fn put(&self, chat_id: &str, token: &str) -> Result<()>;
    fn remove(&self, chat_id: &str) -> Result<()>;
}

/// In-flight conversation state keyed by chat identity. At most one state
/// per chat exists at a time.
pub trait StateStore: Send + Sync {
    fn get(&self, chat_id: &str) -> Option<ConversationState>;
    fn put(&self, chat_id: &str, state: ConversationState);
    fn remove(&self, chat_id: &str);
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, chat_id: &str) -> Option<String> {
        self.inner.lock().unwrap().get(chat_id).cloned()
    }

    fn put(&self, chat_id: &str, token: &str) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), token.to_string());
        Ok(())
    }

    fn remove(&self, chat_id: &str) -> Result<()> {
        self.inner.lock().unwrap().remove(chat_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<String, ConversationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, chat_id: &str) -> Option<ConversationState> {
        self.inner.lock().unwrap().get(chat_id).cloned()
    }

    fn put(&self, chat_id: &str, state: ConversationState) {
        self.inner.lock().unwrap().insert(chat_id.to_string(), state);
    }

    fn remove(&self, chat_id: &str) {
        self.inner.lock().unwrap().remove(chat_id);
    }
}

// ---------------------------------------------------------------------------
// SQLite-backed token store
// ---------------------------------------------------------------------------

pub type SharedDb = Arc<Mutex<sqlite::Connection>>;

pub struct SqliteTokenStore {
    db: SharedDb,
}

impl SqliteTokenStore {
    /// Open (or create) the session database and ensure the schema exists.
    pub fn open(path: &str) -> Result<Self> {
        let conn = sqlite::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                chat_id  TEXT PRIMARY KEY,
                token    TEXT NOT NULL,
                added_at TEXT NOT NULL DEFAULT (datetime('now'))
             );",
        )?;
        info!("Session DB opened at {path}");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

impl TokenStore for SqliteTokenStore {
    fn get(&self, chat_id: &str) -> Option<String> {
        let db = self.db.lock().unwrap();
        let mut stmt = match db.prepare("SELECT token FROM sessions WHERE chat_id = ?") {
            Ok(s) => s,
            Err(e) => {
                warn!("session lookup failed for {chat_id}: {e}");
                return None;
            }
        };
        if stmt.bind((1, chat_id)).is_err() {
            return None;
        }
        match stmt.next() {
            Ok(State::Row) => stmt.read::<String, _>(0).ok(),
            _ => None,
        }
    }

    fn put(&self, chat_id: &str, token: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("INSERT OR REPLACE INTO sessions (chat_id, token) VALUES (?, ?)")?;
        stmt.bind((1, chat_id))?;
        stmt.bind((2, token))?;
        stmt.next()?;
        Ok(())
    }

    fn remove(&self, chat_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("DELETE FROM sessions WHERE chat_id = ?")?;
        stmt.bind((1, chat_id))?;
        stmt.next()?;
        Ok(())
    }
}
