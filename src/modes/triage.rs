use crate::api::{ApiClient, DisasterReport};
use crate::dedup;
use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::info;

use super::shared::{load_api_base, must_env};

/// One-shot duplicate-report triage pass over the pending reports.
///
/// Reads a JSONL snapshot when `TRIAGE_INPUT_PATH` is set (offline runs,
/// incident post-mortems), otherwise fetches the government report listing
/// with `TRIAGE_TOKEN`. Prints the grouped result to stdout.
pub(super) async fn run() -> Result<()> {
    let reports = match std::env::var("TRIAGE_INPUT_PATH") {
        Ok(path) => load_reports(&path)?,
        Err(_) => {
            let api = ApiClient::new(load_api_base()?);
            let token = must_env("TRIAGE_TOKEN")?;
            api.gov_reports(&token)
                .await
                .map_err(|e| anyhow!("failed to fetch government reports: {e}"))?
        }
    };

    let total = reports.len();
    let pending: Vec<DisasterReport> = reports
        .into_iter()
        .filter(|r| r.has_status("pending"))
        .collect();
    info!("Scoring {} pending report(s) out of {total}", pending.len());

    let groups = dedup::group_duplicates(&pending);
    let flagged = groups.iter().filter(|g| g.is_duplicate_group()).count();
    info!("{flagged} group(s) flagged as possible duplicates");

    print!("{}", dedup::render_groups(&groups));
    Ok(())
}

fn load_reports(path: &str) -> Result<Vec<DisasterReport>> {
    let file = File::open(path).with_context(|| format!("failed to open snapshot {path}"))?;
    let reader = BufReader::new(file);

    let mut reports = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let report: DisasterReport = serde_json::from_str(&line)
            .with_context(|| format!("invalid JSON at line {}", idx + 1))?;
        reports.push(report);
    }
    Ok(reports)
}
