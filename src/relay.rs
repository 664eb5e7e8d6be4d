//! The `/api/chat` relay: validate, forward once, relay the reply.
//!
//! A [`Relay`] owns nothing but read-only configuration and its upstream, so
//! one instance is shared by every connection. There is no retry and no cache;
//! each inbound request produces at most one outbound call.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::providers::{
    generate_content_url, GenerateContentRequest, GenerateContentResponse, EMPTY_REPLY_FALLBACK,
};
use crate::ChatMessage;

/// The only method the relay accepts.
pub const WRITE_METHOD: &str = "POST";

/// Inbound body: `{ "messages": [...], "context": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: String,
}

/// Outbound body, either a reply or an opaque error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayBody {
    Message { message: String },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: RelayBody,
}

impl RelayResponse {
    pub fn reply(message: impl Into<String>) -> Self {
        Self { status: 200, body: RelayBody::Message { message: message.into() } }
    }

    pub fn error(status: u16, error: impl Into<String>) -> Self {
        Self { status, body: RelayBody::Error { error: error.into() } }
    }

    pub fn to_json(&self) -> String {
        // RelayBody only holds strings; serialization cannot fail.
        serde_json::to_string(&self.body).unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string())
    }
}

/// Something that can answer a `generateContent` request.
///
/// Not object-safe; [`Relay`] is generic over it instead.
pub trait Upstream: Send + Sync {
    fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> impl Future<Output = Result<GenerateContentResponse, RelayError>> + Send;
}

// ---------------------------------------------------------------------------
// GeminiClient: the production upstream
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: generate_content_url(base_url, model),
            api_key,
        })
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self, RelayError> {
        Self::new(
            &config.upstream_url,
            &config.model,
            config.api_key.clone(),
            config.timeout(),
        )
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Upstream for GeminiClient {
    async fn generate(
        &self,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, RelayError> {
        let api_key = self.api_key.as_deref().ok_or(RelayError::MissingCredential)?;

        let response = self
            .client
            .post(&self.url)
            .query(&[("key", api_key)])
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::UpstreamStatus { status: status.as_u16(), body });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

pub struct Relay<U> {
    upstream: U,
}

impl<U: Upstream> Relay<U> {
    pub fn new(upstream: U) -> Self {
        Self { upstream }
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Handle one inbound request. Never fails: every outcome is a response.
    pub async fn handle(&self, method: &str, body: &[u8]) -> RelayResponse {
        if !method.eq_ignore_ascii_case(WRITE_METHOD) {
            debug!(method, "rejecting non-POST chat request");
            return RelayResponse::error(405, "Method not allowed");
        }

        let request = match parse_request(body) {
            Some(req) => req,
            None => {
                debug!(len = body.len(), "rejecting malformed chat request");
                return RelayResponse::error(400, "Invalid messages format");
            }
        };

        match self.forward(&request).await {
            Ok(message) => RelayResponse::reply(message),
            Err(e) => {
                match &e {
                    RelayError::MissingCredential => error!("GEMINI_API_KEY not configured"),
                    RelayError::UpstreamStatus { status, body } => {
                        error!(status, body = %body, "Gemini API error")
                    }
                    other => error!(error = %other, "Chat API error"),
                }
                RelayResponse::error(500, e.public_message())
            }
        }
    }

    async fn forward(&self, request: &RelayRequest) -> Result<String, RelayError> {
        let outbound = GenerateContentRequest::from_conversation(&request.messages, &request.context);
        let response = self.upstream.generate(&outbound).await?;
        match response.first_text() {
            Some(text) => Ok(text.to_string()),
            None => {
                warn!(candidates = response.candidates.len(), "upstream reply carried no text");
                Ok(EMPTY_REPLY_FALLBACK.to_string())
            }
        }
    }
}

/// `None` when the body is not JSON or `messages` is absent or malformed.
fn parse_request(body: &[u8]) -> Option<RelayRequest> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    if !value.get("messages")?.is_array() {
        return None;
    }
    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedUpstream {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Upstream for CannedUpstream {
        async fn generate(
            &self,
            _request: &GenerateContentRequest,
        ) -> Result<GenerateContentResponse, RelayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let json = match self.reply {
                Some(text) => serde_json::json!({
                    "candidates": [{ "content": { "parts": [{ "text": text }] } }]
                }),
                None => serde_json::json!({ "candidates": [] }),
            };
            Ok(serde_json::from_value(json)?)
        }
    }

    fn canned(reply: Option<&'static str>) -> Relay<CannedUpstream> {
        Relay::new(CannedUpstream { reply, calls: AtomicUsize::new(0) })
    }

    #[test]
    fn test_parse_request_accepts_well_formed() {
        let req = parse_request(br#"{"messages":[{"role":"user","content":"Hi"}],"context":"ctx"}"#)
            .expect("well formed");
        assert_eq!(req.messages, vec![ChatMessage::user("Hi")]);
        assert_eq!(req.context, "ctx");
    }

    #[test]
    fn test_parse_request_context_optional() {
        let req = parse_request(br#"{"messages":[]}"#).expect("well formed");
        assert!(req.messages.is_empty());
        assert_eq!(req.context, "");
    }

    #[test]
    fn test_parse_request_rejects_non_array() {
        assert!(parse_request(br#"{"messages":"hello"}"#).is_none());
        assert!(parse_request(br#"{"messages":{"role":"user"}}"#).is_none());
    }

    #[test]
    fn test_parse_request_rejects_missing_messages() {
        assert!(parse_request(br#"{"context":"x"}"#).is_none());
        assert!(parse_request(b"").is_none());
        assert!(parse_request(b"not json").is_none());
        assert!(parse_request(b"[]").is_none());
    }

    #[test]
    fn test_parse_request_rejects_unknown_role() {
        assert!(parse_request(br#"{"messages":[{"role":"system","content":"x"}]}"#).is_none());
    }

    #[tokio::test]
    async fn test_empty_candidates_fall_back() {
        let relay = canned(None);
        let resp = relay
            .handle("POST", br#"{"messages":[{"role":"user","content":"Hi"}],"context":""}"#)
            .await;
        assert_eq!(resp, RelayResponse::reply(EMPTY_REPLY_FALLBACK));
    }

    #[tokio::test]
    async fn test_empty_text_falls_back() {
        let relay = canned(Some(""));
        let resp = relay
            .handle("POST", br#"{"messages":[{"role":"user","content":"Hi"}]}"#)
            .await;
        assert_eq!(resp, RelayResponse::reply(EMPTY_REPLY_FALLBACK));
        assert_eq!(relay.upstream().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_method_is_case_insensitive() {
        let relay = canned(Some("ok"));
        let resp = relay.handle("post", br#"{"messages":[]}"#).await;
        assert_eq!(resp.status, 200);
        assert_eq!(relay.upstream().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gemini_client_without_key_never_sends() {
        // Port 9 (discard) on localhost; a send attempt would surface as Transport.
        let client = GeminiClient::new("http://127.0.0.1:9", "m", None, Duration::from_secs(1))
            .expect("client");
        assert!(!client.has_credential());
        let req = GenerateContentRequest::from_conversation(&[ChatMessage::user("Hi")], "");
        let err = client.generate(&req).await.unwrap_err();
        assert!(matches!(err, RelayError::MissingCredential));
    }

    #[test]
    fn test_response_json_shapes() {
        assert_eq!(RelayResponse::reply("Hello!").to_json(), r#"{"message":"Hello!"}"#);
        assert_eq!(
            RelayResponse::error(405, "Method not allowed").to_json(),
            r#"{"error":"Method not allowed"}"#
        );
    }
}
