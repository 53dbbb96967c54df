use anyhow::{Result, anyhow};

#[derive(Clone)]
pub(super) struct BotCfg {
    pub gateway_url: String,
    pub gateway_api_key: Option<String>,
    pub session_db_path: String,
}

pub(super) fn must_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("Missing env var {key}"))
}

pub(super) fn load_api_base() -> Result<String> {
    must_env("API_BASE_URL")
}

pub(super) fn load_bot_cfg() -> Result<BotCfg> {
    Ok(BotCfg {
        gateway_url: must_env("WA_GATEWAY_URL")?,
        gateway_api_key: std::env::var("WA_GATEWAY_API_KEY").ok(),
        session_db_path: std::env::var("SESSION_DB_PATH")
            .unwrap_or_else(|_| "./wa_sessions.sqlite".into()),
    })
}
