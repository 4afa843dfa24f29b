use reqwest::StatusCode;
use serde::Deserialize;

use tradelane_core::ports::ProviderError;

const MAX_MESSAGE_LEN: usize = 240;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

/// Maps a non-success response to a port error. `resource` names what the
/// request addressed: the unique name for creates, the conversation id
/// otherwise.
pub(crate) fn classify_status(status: StatusCode, body: &str, resource: &str) -> ProviderError {
    match status {
        StatusCode::CONFLICT => ProviderError::Conflict { unique_name: resource.to_string() },
        StatusCode::NOT_FOUND => ProviderError::NotFound(resource.to_string()),
        _ => ProviderError::Rejected { status: status.as_u16(), message: error_message(body) },
    }
}

pub(crate) fn classify_transport(
    operation: &'static str,
    timeout_ms: u64,
    error: &reqwest::Error,
) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout { operation, after_ms: timeout_ms }
    } else {
        ProviderError::Transport(format!("{operation}: {error}"))
    }
}

fn error_message(body: &str) -> String {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { code: Some(code), message: Some(message) }) => format!("{message} ({code})"),
        Ok(ErrorBody { message: Some(message), .. }) => message,
        _ => body.trim().to_string(),
    };
    truncate(message)
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push_str("...");
    }
    message
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::classify_status;
    use tradelane_core::ports::ProviderError;

    #[test]
    fn conflict_carries_the_unique_name() {
        let error = classify_status(
            StatusCode::CONFLICT,
            r#"{"code": 50353, "message": "Conversation with provided unique name already exists"}"#,
            "quote::Q1",
        );
        assert_eq!(error, ProviderError::Conflict { unique_name: "quote::Q1".to_string() });
    }

    #[test]
    fn not_found_is_distinguished_from_rejection() {
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "", "CH0001"),
            ProviderError::NotFound("CH0001".to_string())
        );
    }

    #[test]
    fn rejection_prefers_the_provider_message() {
        let error = classify_status(
            StatusCode::BAD_REQUEST,
            r#"{"code": 50100, "message": "Invalid role"}"#,
            "CH0001",
        );
        assert_eq!(
            error,
            ProviderError::Rejected { status: 400, message: "Invalid role (50100)".to_string() }
        );
    }

    #[test]
    fn plain_text_bodies_are_trimmed_and_bounded() {
        let body = format!("  {}  ", "x".repeat(500));
        let ProviderError::Rejected { status, message } =
            classify_status(StatusCode::BAD_GATEWAY, &body, "CH0001")
        else {
            panic!("expected rejection");
        };
        assert_eq!(status, 502);
        assert_eq!(message.len(), 243);
        assert!(message.ends_with("..."));
    }
}
