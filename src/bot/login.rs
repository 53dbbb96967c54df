//! Login flow: credentials + coordinates, then `POST /auth/login`.

use super::flow::{ConversationState, StepDef, StepKind};
use crate::api::{ApiError, Backend, LoginRequest};
use crate::store::TokenStore;
use anyhow::Result;
use tracing::{info, warn};

pub(super) const STEPS: &[StepDef] = &[
    StepDef {
        field: "email",
        prompt: "Please enter your username or email.",
        kind: StepKind::Text,
    },
    StepDef {
        field: "password",
        prompt: "Please enter your password.",
        kind: StepKind::Text,
    },
    StepDef {
        field: "latitude",
        prompt: "Share your location, or type your latitude (a number between -90 and 90).",
        kind: StepKind::Latitude,
    },
    StepDef {
        field: "longitude",
        prompt: "Now type your longitude (a number between -180 and 180).",
        kind: StepKind::Longitude,
    },
];

pub(super) async fn finish<B: Backend>(
    backend: &B,
    tokens: &dyn TokenStore,
    chat_id: &str,
    state: &ConversationState,
) -> Result<Vec<String>> {
    let req = LoginRequest {
        email: state.require_text("email")?.to_string(),
        password: state.require_text("password")?.to_string(),
        latitude: state.require_number("latitude")?,
        longitude: state.require_number("longitude")?,
    };

    match backend.login(&req).await {
        Ok(ok) => {
            tokens.put(chat_id, &ok.access_token)?;
            info!("Login succeeded for {chat_id}");
            let greeting = match ok.user.as_ref().and_then(|u| u.name.as_deref()) {
                Some(name) => format!("You're logged in. Welcome, {name}!"),
                None => "You're logged in.".to_string(),
            };
            Ok(vec![greeting])
        }
        Err(ApiError::Network(e)) => {
            warn!("Login call failed for {chat_id}: {e}");
            Ok(vec![
                "Could not reach the server. Please try !login again in a moment.".to_string(),
            ])
        }
        Err(e) => {
            // Never reveal which credential was wrong.
            info!("Login rejected for {chat_id}: {e}");
            Ok(vec![
                "Login failed. Please check your credentials and start over with !login."
                    .to_string(),
            ])
        }
    }
}
