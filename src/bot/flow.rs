//! Conversation state machine core.
//!
//! Each multi-step flow is a linear table of [`StepDef`]s; the engine walks
//! the table one validated reply at a time. Steps that accept a structured
//! location attachment fill latitude and longitude together and jump past
//! the paired manual-entry step, so both entry paths converge on the same
//! collected data before the terminal action runs.

use crate::gateway::InboundMessage;
use anyhow::{Context, Result};
use std::collections::BTreeMap;

// ─────────────────────────── Flow identity ────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Login,
    ReportEmergency,
    NearbyDisasters,
}

impl FlowKind {
    /// The ordered step table for this flow.
    pub fn steps(self) -> &'static [StepDef] {
        match self {
            Self::Login => super::login::STEPS,
            Self::ReportEmergency => super::report::STEPS,
            Self::NearbyDisasters => super::nearby::STEPS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::ReportEmergency => "emergency report",
            Self::NearbyDisasters => "nearby disasters",
        }
    }

    /// One-line opener sent together with the first prompt.
    pub fn intro(self) -> &'static str {
        match self {
            Self::Login => "Let's get you logged in. Send !cancel at any time to abort.",
            Self::ReportEmergency => {
                "Let's file an emergency report. Send !cancel at any time to abort."
            }
            Self::NearbyDisasters => {
                "Let's find active disasters near a location. Send !cancel at any time to abort."
            }
        }
    }
}

// ─────────────────────────── Step definitions ──────────────────────────────

/// What the step accepts and how the reply is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Non-empty free text.
    Text,
    /// One of a fixed lowercase vocabulary.
    Choice(&'static [&'static str]),
    /// Manual numeric latitude, or a location attachment that fills both
    /// coordinates and jumps past the paired [`StepKind::Longitude`] step.
    Latitude,
    /// Manual numeric longitude. Always immediately follows a `Latitude`
    /// step; only reached on the manual-entry path.
    Longitude,
    /// Optional image attachment, or the literal `skip`.
    ImageOrSkip,
}

#[derive(Debug, Clone, Copy)]
pub struct StepDef {
    /// Key the validated value is stored under.
    pub field: &'static str,
    /// Sent when the step becomes current.
    pub prompt: &'static str,
    pub kind: StepKind,
}

// ─────────────────────────── Collected data ────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Image { url: String, mime: Option<String> },
}

pub type FlowData = BTreeMap<&'static str, FieldValue>;

/// One in-progress dialogue. Exactly one exists per chat identity at a time;
/// it is created when a flow command is issued and deleted on completion,
/// cancellation, or unrecoverable error.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    pub flow: FlowKind,
    pub step: usize,
    pub data: FlowData,
}

impl ConversationState {
    pub fn new(flow: FlowKind) -> Self {
        Self {
            flow,
            step: 0,
            data: FlowData::new(),
        }
    }

    pub fn current(&self) -> Option<&'static StepDef> {
        self.flow.steps().get(self.step)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        match self.data.get(field)? {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        match self.data.get(field)? {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The optional image attachment, when one was collected.
    pub fn image(&self) -> Option<(&str, Option<&str>)> {
        match self.data.get("image")? {
            FieldValue::Image { url, mime } => Some((url.as_str(), mime.as_deref())),
            _ => None,
        }
    }

    /// Terminal actions run only after every step validated, so a missing
    /// field here is an internal bug, not user error.
    pub fn require_text(&self, field: &str) -> Result<&str> {
        self.text(field)
            .with_context(|| format!("flow data missing text field `{field}`"))
    }

    pub fn require_number(&self, field: &str) -> Result<f64> {
        self.number(field)
            .with_context(|| format!("flow data missing numeric field `{field}`"))
    }
}

// ─────────────────────────── Step advancement ──────────────────────────────

#[derive(Debug, PartialEq)]
pub enum StepProgress {
    /// Reply rejected; the state is untouched and the same step stays
    /// current. The string is the user-facing format hint.
    Invalid(String),
    /// Reply accepted; the contained prompt belongs to the new current step.
    Next(&'static str),
    /// Every field is filled; run the flow's terminal action.
    Complete,
}

/// Apply one inbound reply to the state. Mutates `state` only on acceptance;
/// callers commit the mutated copy to the store themselves, so a rejected
/// reply can never leave a half-updated state behind.
pub fn apply_reply(state: &mut ConversationState, msg: &InboundMessage) -> StepProgress {
    let Some(def) = state.current() else {
        // Step index past the table: the terminal action already ran.
        return StepProgress::Complete;
    };

    match def.kind {
        StepKind::Latitude => {
            if let Some(loc) = msg.location {
                state.data.insert("latitude", FieldValue::Number(loc.latitude));
                state
                    .data
                    .insert("longitude", FieldValue::Number(loc.longitude));
                // Skip the paired longitude step; the attachment filled both.
                state.step += 2;
                return next_or_complete(state);
            }
        }
        StepKind::ImageOrSkip => {
            if let Some(url) = &msg.media_url {
                state.data.insert(
                    def.field,
                    FieldValue::Image {
                        url: url.clone(),
                        mime: msg.media_mime.clone(),
                    },
                );
                state.step += 1;
                return next_or_complete(state);
            }
            if msg.text.trim().eq_ignore_ascii_case("skip") {
                // Optional field stays absent.
                state.step += 1;
                return next_or_complete(state);
            }
            return StepProgress::Invalid(validation_hint(def.kind));
        }
        _ => {}
    }

    match validate(def.kind, msg.text.trim()) {
        Ok(value) => {
            state.data.insert(def.field, value);
            state.step += 1;
            next_or_complete(state)
        }
        Err(hint) => StepProgress::Invalid(hint),
    }
}

fn next_or_complete(state: &ConversationState) -> StepProgress {
    match state.current() {
        Some(def) => StepProgress::Next(def.prompt),
        None => StepProgress::Complete,
    }
}

// ─────────────────────────── Validation ────────────────────────────────────

/// Validate one trimmed text reply against the step kind.
pub fn validate(kind: StepKind, input: &str) -> Result<FieldValue, String> {
    match kind {
        StepKind::Text => {
            if input.is_empty() {
                Err(validation_hint(kind))
            } else {
                Ok(FieldValue::Text(input.to_string()))
            }
        }
        StepKind::Choice(options) => {
            let lower = input.to_lowercase();
            if options.contains(&lower.as_str()) {
                Ok(FieldValue::Text(lower))
            } else {
                Err(validation_hint(kind))
            }
        }
        StepKind::Latitude => parse_coord(input, -90.0, 90.0)
            .map(FieldValue::Number)
            .ok_or_else(|| validation_hint(kind)),
        StepKind::Longitude => parse_coord(input, -180.0, 180.0)
            .map(FieldValue::Number)
            .ok_or_else(|| validation_hint(kind)),
        StepKind::ImageOrSkip => Err(validation_hint(kind)),
    }
}

fn validation_hint(kind: StepKind) -> String {
    match kind {
        StepKind::Text => "Please send a non-empty reply.".to_string(),
        StepKind::Choice(options) => {
            format!("Please answer with one of: {}.", options.join(", "))
        }
        StepKind::Latitude => {
            "That doesn't look like a valid latitude. Send a number between -90 and 90, \
             or share a location."
                .to_string()
        }
        StepKind::Longitude => {
            "That doesn't look like a valid longitude. Send a number between -180 and 180."
                .to_string()
        }
        StepKind::ImageOrSkip => {
            "Send a photo of the situation, or type 'skip' to continue without one.".to_string()
        }
    }
}

/// The value must parse as a finite number inside `[min, max]`.
fn parse_coord(input: &str, min: f64, max: f64) -> Option<f64> {
    input
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && (min..=max).contains(v))
}
