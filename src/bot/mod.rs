//! Conversation dispatcher: routes each inbound message to the active
//! multi-step flow (when one is open) or to a single-shot command.
//!
//! One inbound message produces exactly one reply, except terminal flow
//! steps which send an informational line followed by the call result.
pub mod bot_tests;
pub mod flow;
mod login;
mod nearby;
mod report;

use crate::api::{ApiError, Backend, DashboardSummary, UserInfo};
use crate::gateway::InboundMessage;
use crate::store::{StateStore, TokenStore};
use anyhow::Result;
use flow::{ConversationState, FlowKind, StepProgress};
use std::sync::Arc;
use tracing::{error, info, warn};

const GENERIC_ERROR: &str =
    "Something went wrong while handling your message. Please try again.";
const LOGIN_REQUIRED: &str = "You need to log in first. Send !login to get started.";
const UNRECOGNIZED: &str = "Unrecognized command. Send !help to see what I can do.";

const HELP_TEXT: &str = "Here's what I can do:\n\
    !login - log in to your account\n\
    !profile - show your profile\n\
    !dashboard - show your dashboard summary\n\
    !reportemergency - report an emergency step by step\n\
    !nearbydisasters - list active disasters near a location\n\
    !logout - log out\n\
    !cancel - abort the current operation\n\
    !help - show this message";

pub struct Bot<B> {
    backend: B,
    tokens: Arc<dyn TokenStore>,
    states: Arc<dyn StateStore>,
}

impl<B: Backend> Bot<B> {
    pub fn new(backend: B, tokens: Arc<dyn TokenStore>, states: Arc<dyn StateStore>) -> Self {
        Self {
            backend,
            tokens,
            states,
        }
    }

    /// Top-level entry point. Internal failures are logged and collapsed
    /// into one generic reply; this must never take down the message loop.
    pub async fn handle_message(&self, msg: &InboundMessage) -> Vec<String> {
        match self.dispatch(msg).await {
            Ok(replies) => replies,
            Err(e) => {
                error!("Dispatch failed for {}: {e:#}", msg.from);
                vec![GENERIC_ERROR.to_string()]
            }
        }
    }

    async fn dispatch(&self, msg: &InboundMessage) -> Result<Vec<String>> {
        let command = msg.text.trim().to_lowercase();

        if let Some(state) = self.states.get(&msg.from) {
            // Cancellation overrides whatever step is current.
            if command == "!cancel" {
                self.states.remove(&msg.from);
                info!("Cancelled {} flow for {}", state.flow.label(), msg.from);
                return Ok(vec![format!(
                    "Cancelled the {} flow. Send !help to see available commands.",
                    state.flow.label()
                )]);
            }
            return self.continue_flow(msg, state).await;
        }

        match command.as_str() {
            "!help" => Ok(vec![HELP_TEXT.to_string()]),
            "!login" => Ok(self.cmd_login(&msg.from)),
            "!profile" => self.cmd_profile(&msg.from).await,
            "!dashboard" => self.cmd_dashboard(&msg.from).await,
            "!reportemergency" => Ok(self.cmd_report(&msg.from)),
            "!nearbydisasters" => Ok(self.start_flow(&msg.from, FlowKind::NearbyDisasters)),
            "!logout" => self.cmd_logout(&msg.from),
            "!cancel" => Ok(vec!["Nothing to cancel right now.".to_string()]),
            _ => Ok(vec![UNRECOGNIZED.to_string()]),
        }
    }

    // ── Flow plumbing ───────────────────────────────────────────────────

    fn start_flow(&self, chat_id: &str, kind: FlowKind) -> Vec<String> {
        let state = ConversationState::new(kind);
        let prompt = state.current().map(|step| step.prompt).unwrap_or_default();
        self.states.put(chat_id, state);
        info!("Started {} flow for {chat_id}", kind.label());
        vec![format!("{}\n{prompt}", kind.intro())]
    }

    async fn continue_flow(
        &self,
        msg: &InboundMessage,
        state: ConversationState,
    ) -> Result<Vec<String>> {
        // Mutate a local copy and commit on acceptance; a rejected reply or
        // a failure mid-step leaves the stored state exactly as it was.
        let mut next = state;
        match flow::apply_reply(&mut next, msg) {
            StepProgress::Invalid(hint) => Ok(vec![hint]),
            StepProgress::Next(prompt) => {
                self.states.put(&msg.from, next);
                Ok(vec![prompt.to_string()])
            }
            StepProgress::Complete => {
                // The state is cleared no matter how the terminal call ends;
                // retrying requires fresh input anyway.
                self.states.remove(&msg.from);
                match next.flow {
                    FlowKind::Login => {
                        login::finish(&self.backend, self.tokens.as_ref(), &msg.from, &next).await
                    }
                    FlowKind::ReportEmergency => {
                        report::finish(&self.backend, self.tokens.as_ref(), &msg.from, &next).await
                    }
                    FlowKind::NearbyDisasters => {
                        nearby::finish(&self.backend, &msg.from, &next).await
                    }
                }
            }
        }
    }

    // ── Single-shot commands ────────────────────────────────────────────

    fn cmd_login(&self, chat_id: &str) -> Vec<String> {
        if self.tokens.get(chat_id).is_some() {
            return vec![
                "You are already logged in. Send !logout first to switch accounts.".to_string(),
            ];
        }
        self.start_flow(chat_id, FlowKind::Login)
    }

    fn cmd_report(&self, chat_id: &str) -> Vec<String> {
        if self.tokens.get(chat_id).is_none() {
            return vec![LOGIN_REQUIRED.to_string()];
        }
        self.start_flow(chat_id, FlowKind::ReportEmergency)
    }

    async fn cmd_profile(&self, chat_id: &str) -> Result<Vec<String>> {
        let Some(token) = self.tokens.get(chat_id) else {
            return Ok(vec![LOGIN_REQUIRED.to_string()]);
        };
        match self.backend.profile(&token).await {
            Ok(profile) => Ok(vec![render_profile(&profile)]),
            Err(e) => self.authed_failure(chat_id, "profile", e),
        }
    }

    async fn cmd_dashboard(&self, chat_id: &str) -> Result<Vec<String>> {
        let Some(token) = self.tokens.get(chat_id) else {
            return Ok(vec![LOGIN_REQUIRED.to_string()]);
        };
        match self.backend.dashboard(&token).await {
            Ok(summary) => Ok(vec![render_dashboard(&summary)]),
            Err(e) => self.authed_failure(chat_id, "dashboard", e),
        }
    }

    fn cmd_logout(&self, chat_id: &str) -> Result<Vec<String>> {
        if self.tokens.get(chat_id).is_none() {
            return Ok(vec!["You are not logged in.".to_string()]);
        }
        self.tokens.remove(chat_id)?;
        info!("Logged out {chat_id}");
        Ok(vec!["You have been logged out.".to_string()])
    }

    /// Shared failure mapping for authenticated single-shot calls.
    fn authed_failure(&self, chat_id: &str, what: &str, err: ApiError) -> Result<Vec<String>> {
        match err {
            ApiError::Unauthorized => {
                self.tokens.remove(chat_id)?;
                Ok(vec![
                    "Your session has expired. Please !login again.".to_string(),
                ])
            }
            ApiError::Backend(message) => Ok(vec![format!("Could not fetch your {what}: {message}")]),
            ApiError::Network(e) => {
                warn!("{what} call failed for {chat_id}: {e}");
                Ok(vec![
                    "Could not reach the server. Please try again in a moment.".to_string(),
                ])
            }
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────────

fn render_profile(profile: &UserInfo) -> String {
    let mut out = String::from("Your profile:");
    if let Some(name) = &profile.name {
        out.push_str(&format!("\nName: {name}"));
    }
    if let Some(email) = &profile.email {
        out.push_str(&format!("\nEmail: {email}"));
    }
    if let Some(role) = &profile.role {
        out.push_str(&format!("\nRole: {role}"));
    }
    if out == "Your profile:" {
        out.push_str("\n(no details on file)");
    }
    out
}

fn render_dashboard(summary: &DashboardSummary) -> String {
    let mut out = String::from("Your dashboard:");
    let counters = [
        ("Total reports", summary.total_reports),
        ("Active", summary.active_reports),
        ("Pending", summary.pending_reports),
        ("Archived", summary.archived_reports),
    ];
    for (label, value) in counters {
        if let Some(value) = value {
            out.push_str(&format!("\n{label}: {value}"));
        }
    }
    if out == "Your dashboard:" {
        out.push_str("\n(no data available)");
    }
    out
}
