use std::sync::Arc;
use std::time::Duration;

use colored::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::relay::{GeminiClient, Relay, Upstream};

/// Path the chat UI posts to.
pub const CHAT_PATH: &str = "/api/chat";

/// Largest request head accepted before answering 413.
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Largest request body accepted before answering 413.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

const CORS_HEADERS: &str = "Access-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: POST\r\nAccess-Control-Allow-Headers: Content-Type\r\n";

/// Owned view of a parsed request head.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub content_length: usize,
    /// `Transfer-Encoding` was present; such bodies are refused with 411.
    pub chunked: bool,
    /// Bytes consumed by the request line and headers.
    pub head_len: usize,
}

/// Parse a request head. `Ok(None)` means more bytes are needed.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(buf)? {
        httparse::Status::Partial => Ok(None),
        httparse::Status::Complete(head_len) => {
            let content_length = req
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("content-length"))
                .and_then(|h| std::str::from_utf8(h.value).ok())
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let chunked = req
                .headers
                .iter()
                .any(|h| h.name.eq_ignore_ascii_case("transfer-encoding"));
            Ok(Some(RequestHead {
                method: req.method.unwrap_or("").to_string(),
                path: req.path.unwrap_or("/").to_string(),
                content_length,
                chunked,
                head_len,
            }))
        }
    }
}

/// Strip the query string from a request target.
pub fn route_path(target: &str) -> &str {
    target.split('?').next().unwrap_or(target)
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Serialize a complete `Connection: close` response.
pub fn render_response(status: u16, content_type: &str, body: &str, cors: bool) -> String {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        status,
        reason_phrase(status),
        content_type,
        body.len(),
        if cors { CORS_HEADERS } else { "" },
        body,
    )
}

enum ReadOutcome {
    Request(RequestHead, Vec<u8>),
    TooLarge,
    LengthRequired,
    Malformed,
    Closed,
}

/// Start the relay server with the production upstream.
pub async fn serve(config: RelayConfig) -> Result<(), RelayError> {
    let upstream = GeminiClient::from_config(&config)?;
    if !upstream.has_credential() {
        warn!("GEMINI_API_KEY not set; /api/chat will answer 500 until it is configured");
    }
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;

    eprintln!(
        "{}",
        format!("  Chat relay listening on http://{}{}", addr, CHAT_PATH).bright_green()
    );
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());
    info!(%addr, model = %config.model, "relay started");

    serve_on(listener, Arc::new(Relay::new(upstream)), config.read_timeout()).await
}

/// Accept loop over an already-bound listener. Runs until accept fails.
///
/// A client gets `read_timeout` to deliver its whole request; after that the
/// connection is answered with 408 and closed.
pub async fn serve_on<U: Upstream + 'static>(
    listener: TcpListener,
    relay: Arc<Relay<U>>,
    read_timeout: Duration,
) -> Result<(), RelayError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let relay = Arc::clone(&relay);
        let span = info_span!("request", id = %Uuid::new_v4(), %peer);
        tokio::spawn(
            async move {
                if let Err(e) = handle_connection(stream, relay, read_timeout).await {
                    warn!(error = %e, "connection error");
                }
            }
            .instrument(span),
        );
    }
}

async fn handle_connection<U: Upstream>(
    mut stream: TcpStream,
    relay: Arc<Relay<U>>,
    read_timeout: Duration,
) -> Result<(), std::io::Error> {
    let read = tokio::time::timeout(read_timeout, read_request(&mut stream)).await;
    let outcome = match read {
        Ok(outcome) => outcome?,
        Err(_) => {
            warn!(?read_timeout, "client stalled; closing connection");
            return reject(&mut stream, 408, "Request timeout").await;
        }
    };
    let (head, body) = match outcome {
        ReadOutcome::Request(head, body) => (head, body),
        ReadOutcome::Closed => return Ok(()),
        ReadOutcome::TooLarge => return reject(&mut stream, 413, "Request too large").await,
        ReadOutcome::LengthRequired => {
            return reject(&mut stream, 411, "Content-Length required").await
        }
        ReadOutcome::Malformed => return reject(&mut stream, 400, "Malformed request").await,
    };

    let path = route_path(&head.path);
    debug!(method = %head.method, path, len = body.len(), "dispatching");

    let response = match path {
        CHAT_PATH if head.method.eq_ignore_ascii_case("OPTIONS") => {
            render_response(204, "text/plain", "", true)
        }
        CHAT_PATH => {
            let resp = relay.handle(&head.method, &body).await;
            info!(status = resp.status, "chat request handled");
            render_response(resp.status, "application/json", &resp.to_json(), true)
        }
        "/healthz" => render_response(200, "text/plain", "ok", false),
        _ => render_response(404, "text/plain", "Not Found", false),
    };

    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Answer a request that never reached routing, then close.
async fn reject(stream: &mut TcpStream, status: u16, error: &str) -> Result<(), std::io::Error> {
    let body = serde_json::json!({ "error": error }).to_string();
    let resp = render_response(status, "application/json", &body, true);
    stream.write_all(resp.as_bytes()).await?;
    stream.shutdown().await
}

async fn read_request(stream: &mut TcpStream) -> Result<ReadOutcome, std::io::Error> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let head = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(ReadOutcome::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);
        match parse_head(&buf) {
            Ok(Some(head)) => break head,
            Ok(None) if buf.len() > MAX_HEAD_BYTES => return Ok(ReadOutcome::TooLarge),
            Ok(None) => continue,
            Err(_) => return Ok(ReadOutcome::Malformed),
        }
    };

    if head.chunked {
        return Ok(ReadOutcome::LengthRequired);
    }
    if head.content_length > MAX_BODY_BYTES {
        return Ok(ReadOutcome::TooLarge);
    }

    let mut body = buf.split_off(head.head_len);
    while body.len() < head.content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(head.content_length);

    Ok(ReadOutcome::Request(head, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_head_complete() {
        let raw = b"POST /api/chat HTTP/1.1\r\nHost: x\r\nContent-Length: 12\r\n\r\n{\"a\":\"b\"}xx";
        let head = parse_head(raw).expect("valid").expect("complete");
        assert_eq!(head.method, "POST");
        assert_eq!(head.path, "/api/chat");
        assert_eq!(head.content_length, 12);
        assert_eq!(&raw[head.head_len..head.head_len + 3], b"{\"a");
    }

    #[test]
    fn test_parse_head_partial() {
        assert_eq!(parse_head(b"POST /api/chat HTTP/1.1\r\nHost: x\r\n").expect("valid"), None);
    }

    #[test]
    fn test_parse_head_without_content_length() {
        let head = parse_head(b"GET /healthz HTTP/1.1\r\n\r\n").expect("valid").expect("complete");
        assert_eq!(head.content_length, 0);
        assert!(!head.chunked);
    }

    #[test]
    fn test_parse_head_flags_transfer_encoding() {
        let head = parse_head(b"POST /api/chat HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
            .expect("valid")
            .expect("complete");
        assert!(head.chunked);
        assert_eq!(head.content_length, 0);
    }

    #[test]
    fn test_parse_head_header_name_case_insensitive() {
        let head = parse_head(b"POST / HTTP/1.1\r\ncontent-length: 5\r\n\r\n")
            .expect("valid")
            .expect("complete");
        assert_eq!(head.content_length, 5);
    }

    #[test]
    fn test_parse_head_garbage_is_error() {
        assert!(parse_head(b"\x00\x01\x02 nonsense\r\n\r\n").is_err());
    }

    #[test]
    fn test_route_path_strips_query() {
        assert_eq!(route_path("/api/chat?x=1"), "/api/chat");
        assert_eq!(route_path("/api/chat"), "/api/chat");
    }

    #[test]
    fn test_render_response_with_cors() {
        let resp = render_response(200, "application/json", r#"{"message":"hi"}"#, true);
        assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(resp.contains("Access-Control-Allow-Origin: *"));
        assert!(resp.contains("Content-Length: 16\r\n"));
        assert!(resp.ends_with(r#"{"message":"hi"}"#));
    }

    #[test]
    fn test_render_response_without_cors() {
        let resp = render_response(404, "text/plain", "Not Found", false);
        assert!(resp.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(!resp.contains("Access-Control"));
    }

    #[test]
    fn test_reason_phrases() {
        assert_eq!(reason_phrase(405), "Method Not Allowed");
        assert_eq!(reason_phrase(408), "Request Timeout");
        assert_eq!(reason_phrase(411), "Length Required");
        assert_eq!(reason_phrase(500), "Internal Server Error");
        assert_eq!(reason_phrase(418), "Unknown");
    }

    #[tokio::test]
    async fn test_listener_binds_ephemeral_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        assert!(listener.local_addr().expect("addr").port() > 0);
    }
}
