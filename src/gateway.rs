//! WhatsApp gateway transport: long-poll inbound messages, send text replies.
//!
//! The bot talks to a WAHA-style HTTP bridge that owns the actual WhatsApp
//! session. The bridge exposes two endpoints we care about:
//!
//! - `GET  /api/messages?timeout=30&offset=N` — long-poll for inbound
//!   messages with ids strictly greater than `offset`.
//! - `POST /api/sendText` — deliver one text reply to a chat.

use anyhow::{Result, anyhow};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A point shared by location attachments and disaster records.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// One inbound chat message, as the dispatcher sees it.
///
/// `text` is the raw body (may be empty for pure attachment messages);
/// `location` and `media_url` carry the optional structured attachments.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: i64,
    /// Stable chat identity of the sender (phone-number based chat id).
    pub from: String,
    pub text: String,
    pub location: Option<GeoPoint>,
    pub media_url: Option<String>,
    pub media_mime: Option<String>,
}

impl InboundMessage {
    /// `true` when there is nothing to dispatch on at all.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.location.is_none() && self.media_url.is_none()
    }
}

// ---------------------------------------------------------------------------
// Gateway wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PollResponse {
    ok: bool,
    #[serde(default)]
    messages: Vec<GatewayMessage>,
}

#[derive(Deserialize)]
struct GatewayMessage {
    id: i64,
    #[serde(rename = "chatId")]
    chat_id: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    location: Option<GeoPoint>,
    #[serde(default, rename = "mediaUrl")]
    media_url: Option<String>,
    #[serde(default)]
    mimetype: Option<String>,
}

#[derive(Serialize)]
struct SendTextPayload<'a> {
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    text: &'a str,
}

// ---------------------------------------------------------------------------
// Gateway client
// ---------------------------------------------------------------------------

/// Long-poll window requested from the bridge, in seconds.
const POLL_WINDOW_SECS: u64 = 30;
/// Local timeout for one poll request; slightly above the long-poll window.
const POLL_TIMEOUT: Duration = Duration::from_secs(40);

pub struct Gateway {
    http: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl Gateway {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("X-Api-Key", key),
            None => builder,
        }
    }

    /// Long-poll for messages with ids greater than `offset`.
    ///
    /// Errors here are transport errors; the caller is expected to log,
    /// back off, and retry without advancing the offset.
    pub async fn poll(&self, offset: i64) -> Result<Vec<InboundMessage>> {
        let url = format!(
            "{}/api/messages?timeout={POLL_WINDOW_SECS}&offset={offset}",
            self.base_url
        );

        let resp = tokio::time::timeout(POLL_TIMEOUT, self.request(self.http.get(&url)).send())
            .await
            .map_err(|_| anyhow!("gateway poll timed out locally"))??;

        if !resp.status().is_success() {
            let status = resp.status();
            let raw = resp.text().await.unwrap_or_default();
            return Err(anyhow!("gateway poll failed: {status} body={raw}"));
        }

        let batch: PollResponse = resp.json().await?;
        if !batch.ok {
            return Err(anyhow!("gateway poll returned ok=false"));
        }

        Ok(batch
            .messages
            .into_iter()
            .map(|m| InboundMessage {
                id: m.id,
                from: m.chat_id,
                text: m.body.unwrap_or_default(),
                location: m.location,
                media_url: m.media_url,
                media_mime: m.mimetype,
            })
            .collect())
    }

    /// Send a single text reply to one chat.
    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/api/sendText", self.base_url);
        let body = SendTextPayload { chat_id, text };
        let resp = self.request(self.http.post(&url)).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let raw = resp.text().await.unwrap_or_default();
            return Err(anyhow!("sendText failed: {status} body={raw}"));
        }
        Ok(())
    }
}
