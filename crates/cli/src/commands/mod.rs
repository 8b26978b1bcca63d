pub mod config;
pub mod doctor;
pub mod subscriptions;

use serde::Serialize;

pub const EXIT_CHECK_FAILED: u8 = 1;
pub const EXIT_CONFIG_INVALID: u8 = 2;
pub const EXIT_STORAGE_UNREADABLE: u8 = 3;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }
}

fn serialize_payload<T: Serialize>(payload: &T) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Keeps the numeric bot id of a `<bot id>:<secret>` token and hides the rest.
pub(crate) fn redact_bot_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once(':') {
        Some((bot_id, _)) if !bot_id.is_empty() => format!("{bot_id}:***"),
        _ => "<redacted>".to_string(),
    }
}
