//! Crate-level error types.
//!
//! [`RelayError`] covers everything that can go wrong between an inbound
//! `/api/chat` request and the upstream language API. Its `Display` output
//! carries full detail and is meant for logs only; callers of the endpoint
//! only ever see [`RelayError::public_message`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// `GEMINI_API_KEY` was not present in the environment at startup.
    #[error("GEMINI_API_KEY not configured")]
    MissingCredential,

    /// The upstream replied with a non-2xx status.
    #[error("upstream returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// Connection, TLS or timeout failure talking to the upstream.
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream replied 2xx but the body was not the expected JSON.
    #[error("could not decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// The opaque message returned to the caller for this failure.
    pub fn public_message(&self) -> &'static str {
        match self {
            RelayError::MissingCredential => "API not configured",
            RelayError::UpstreamStatus { .. } => "AI service error",
            _ => "Internal server error",
        }
    }
}

/// Failures on the client side of the chat relay.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("relay returned HTTP {0}")]
    Status(u16),

    #[error("no completion is pending for this ticket")]
    StaleTicket,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_public_message() {
        assert_eq!(RelayError::MissingCredential.public_message(), "API not configured");
    }

    #[test]
    fn upstream_status_hides_body_from_caller() {
        let err = RelayError::UpstreamStatus {
            status: 403,
            body: "API key not valid. Please pass a valid API key.".to_string(),
        };
        assert_eq!(err.public_message(), "AI service error");
        let logged = err.to_string();
        assert!(logged.contains("403"), "status in display: {logged}");
        assert!(logged.contains("API key not valid"), "body in display: {logged}");
    }

    #[test]
    fn decode_error_is_internal() {
        let err: RelayError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.public_message(), "Internal server error");
    }

    #[test]
    fn config_error_display() {
        let err = RelayError::Config("port out of range".to_string());
        assert!(err.to_string().contains("port out of range"));
    }

    #[test]
    fn chat_error_status_display() {
        assert_eq!(ChatError::Status(500).to_string(), "relay returned HTTP 500");
    }
}
