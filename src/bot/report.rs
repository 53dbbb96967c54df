//! Emergency-report flow: situation details + location + optional photo,
//! then `POST /user/emergency/report` (multipart when a photo is attached).

use super::flow::{ConversationState, StepDef, StepKind};
use crate::api::{ApiError, Backend, ReportSubmission};
use crate::store::TokenStore;
use anyhow::Result;
use tracing::{info, warn};

pub(super) const URGENCY_LEVELS: &[&str] = &["low", "medium", "high", "critical"];

pub(super) const STEPS: &[StepDef] = &[
    StepDef {
        field: "emergency_type",
        prompt: "What type of emergency is it? (e.g. flood, fire, earthquake)",
        kind: StepKind::Text,
    },
    StepDef {
        field: "urgency_level",
        prompt: "How urgent is it? (low / medium / high / critical)",
        kind: StepKind::Choice(URGENCY_LEVELS),
    },
    StepDef {
        field: "situation",
        prompt: "Briefly describe the situation.",
        kind: StepKind::Text,
    },
    StepDef {
        field: "people_count",
        prompt: "Roughly how many people are affected?",
        kind: StepKind::Text,
    },
    StepDef {
        field: "latitude",
        prompt: "Share the location of the emergency, or type its latitude \
                 (a number between -90 and 90).",
        kind: StepKind::Latitude,
    },
    StepDef {
        field: "longitude",
        prompt: "Now type the longitude (a number between -180 and 180).",
        kind: StepKind::Longitude,
    },
    StepDef {
        field: "image",
        prompt: "Attach a photo of the situation, or type 'skip'.",
        kind: StepKind::ImageOrSkip,
    },
];

pub(super) async fn finish<B: Backend>(
    backend: &B,
    tokens: &dyn TokenStore,
    chat_id: &str,
    state: &ConversationState,
) -> Result<Vec<String>> {
    let Some(token) = tokens.get(chat_id) else {
        // Token evicted mid-flow (e.g. session expiry on another command).
        return Ok(vec![
            "Your session has expired. Please !login and report again.".to_string(),
        ]);
    };

    let submission = ReportSubmission {
        emergency_type: state.require_text("emergency_type")?.to_string(),
        urgency_level: state.require_text("urgency_level")?.to_string(),
        situation: state.require_text("situation")?.to_string(),
        people_count: state.require_text("people_count")?.to_string(),
        latitude: state.require_number("latitude")?,
        longitude: state.require_number("longitude")?,
    };

    let mut replies = vec!["Submitting your emergency report...".to_string()];

    let mut photo_dropped = false;
    let image = match state.image() {
        Some((url, mime)) => match backend.fetch_media(url).await {
            Ok(mut media) => {
                if let Some(mime) = mime {
                    // The gateway knows the real mimetype; trust it over the
                    // media server's content-type.
                    media.mime = mime.to_string();
                }
                Some(media)
            }
            Err(e) => {
                warn!("Photo download failed for {chat_id}: {e}");
                photo_dropped = true;
                None
            }
        },
        None => None,
    };

    match backend.submit_report(&token, &submission, image.as_ref()).await {
        Ok(ack) => {
            info!(
                "Report submitted for {chat_id}: {} / {}",
                submission.emergency_type, submission.urgency_level
            );
            let mut message = ack;
            if photo_dropped {
                message.push_str("\n(The photo could not be downloaded and was left out.)");
            }
            replies.push(message);
        }
        Err(ApiError::Unauthorized) => {
            tokens.remove(chat_id)?;
            replies.push(
                "Your session has expired and the report was not submitted. \
                 Please !login and try again."
                    .to_string(),
            );
        }
        Err(ApiError::Backend(message)) => {
            replies.push(message);
        }
        Err(ApiError::Network(e)) => {
            warn!("Report submission failed for {chat_id}: {e}");
            replies.push(
                "Could not reach the server, so the report was not submitted. \
                 Please start again with !reportemergency."
                    .to_string(),
            );
        }
    }

    Ok(replies)
}
