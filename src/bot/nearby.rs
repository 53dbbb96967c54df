//! Nearby-disasters flow: a coordinate, then `GET /public/nearby` filtered
//! client-side to active reports.

use super::flow::{ConversationState, StepDef, StepKind};
use crate::api::{ApiError, Backend, DisasterReport};
use crate::gateway::GeoPoint;
use anyhow::Result;
use tracing::warn;

pub(super) const STEPS: &[StepDef] = &[
    StepDef {
        field: "latitude",
        prompt: "Share a location, or type its latitude (a number between -90 and 90).",
        kind: StepKind::Latitude,
    },
    StepDef {
        field: "longitude",
        prompt: "Now type the longitude (a number between -180 and 180).",
        kind: StepKind::Longitude,
    },
];

pub(super) async fn finish<B: Backend>(
    backend: &B,
    chat_id: &str,
    state: &ConversationState,
) -> Result<Vec<String>> {
    let point = GeoPoint {
        latitude: state.require_number("latitude")?,
        longitude: state.require_number("longitude")?,
    };

    match backend.nearby(point).await {
        Ok(reports) => Ok(vec![render_nearby(&reports)]),
        Err(ApiError::Network(e)) => {
            warn!("Nearby lookup failed for {chat_id}: {e}");
            Ok(vec![
                "Could not reach the server. Please try !nearbydisasters again in a moment."
                    .to_string(),
            ])
        }
        Err(e) => Ok(vec![format!("Could not fetch nearby disasters: {e}")]),
    }
}

/// Numbered list of the active reports, or a calm all-clear line.
pub(super) fn render_nearby(reports: &[DisasterReport]) -> String {
    let active: Vec<&DisasterReport> = reports.iter().filter(|r| r.has_status("active")).collect();

    if active.is_empty() {
        return "No active disasters reported near that location.".to_string();
    }

    let mut out = String::from("Active disasters near that location:\n");
    for (idx, report) in active.iter().enumerate() {
        let kind = report.emergency_type.as_deref().unwrap_or("unknown");
        let urgency = report.urgency_level.as_deref().unwrap_or("unknown");
        out.push_str(&format!("{}. {kind} ({urgency} urgency)", idx + 1));
        if let Some(people) = &report.people_count {
            out.push_str(&format!(", about {people} people affected"));
        }
        out.push('\n');
        if let Some(point) = report.coordinates() {
            out.push_str(&format!(
                "   https://maps.google.com/?q={},{}\n",
                point.latitude, point.longitude
            ));
        }
    }
    out.trim_end().to_string()
}
