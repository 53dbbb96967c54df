use crate::api::ApiClient;
use crate::bot::Bot;
use crate::gateway::Gateway;
use crate::store::{MemoryStateStore, SqliteTokenStore, StateStore, TokenStore};
use anyhow::Result;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use super::shared::{load_api_base, load_bot_cfg};

/// Live bot loop: long-poll the WhatsApp gateway and dispatch each message.
///
/// Delivery is message-at-a-time; a user's conversation state is never
/// touched concurrently because replies are processed in arrival order.
pub(super) async fn run() -> Result<()> {
    let api_base = load_api_base()?;
    let cfg = load_bot_cfg()?;

    let tokens: Arc<dyn TokenStore> = Arc::new(SqliteTokenStore::open(&cfg.session_db_path)?);
    let states: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let bot = Bot::new(ApiClient::new(api_base), tokens, states);
    let gateway = Gateway::new(cfg.gateway_url, cfg.gateway_api_key);

    info!("Bot loop started. Waiting for messages...");
    let mut offset: i64 = 0;
    loop {
        let batch = match gateway.poll(offset).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Gateway poll failed: {e}");
                tokio::time::sleep(Duration::from_secs(5)).await;
                continue;
            }
        };

        for msg in batch {
            offset = msg.id + 1;
            if msg.is_empty() {
                continue;
            }

            let replies = bot.handle_message(&msg).await;
            for reply in replies {
                if let Err(e) = gateway.send_text(&msg.from, &reply).await {
                    warn!("Failed to deliver reply to {}: {e}", msg.from);
                }
            }
        }
    }
}
