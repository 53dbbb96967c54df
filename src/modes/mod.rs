mod bot;
mod shared;
mod triage;

use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Bot,
    Triage,
}

impl RunMode {
    fn from_env() -> Self {
        let raw = std::env::var("RUN_MODE").unwrap_or_else(|_| "bot".into());
        match raw.trim().to_lowercase().as_str() {
            "triage" => Self::Triage,
            _ => Self::Bot,
        }
    }
}

pub async fn run_from_env() -> Result<()> {
    match RunMode::from_env() {
        RunMode::Bot => bot::run().await,
        RunMode::Triage => triage::run().await,
    }
}
