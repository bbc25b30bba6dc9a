//! Streaming chat turns against Gemini's `streamGenerateContent`
//!
//! A turn is delivered as a channel of [`StreamEvent`]s: zero or more
//! cumulative [`StreamEvent::Snapshot`]s, then exactly one terminal
//! `Finished` or `Failed`. Each snapshot carries the full text so far, so a
//! consumer only ever replaces what it shows.

use std::fmt;

use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use tokio::sync::mpsc;

use super::gemini::{self, Content, GenerateContentRequest, GenerateContentResponse, Part, SystemInstruction};
use crate::config::Config;
use crate::state::Message;

const CHANNEL_CAPACITY: usize = 64;

/// Why a turn ended without a complete answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFailure {
    /// No credential was configured; nothing was sent
    MissingCredential,
    /// The service rejected the credential
    Unauthorized(String),
    /// Connection, HTTP, or mid-stream service error
    Transport(String),
}

impl fmt::Display for StreamFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFailure::MissingCredential | StreamFailure::Unauthorized(_) => write!(
                f,
                "Error: invalid or missing API key. Please contact the administrator."
            ),
            StreamFailure::Transport(reason) => write!(f, "Connection error: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Full accumulated answer text so far
    Snapshot(String),
    Failed(StreamFailure),
    Finished,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Snapshot(_))
    }
}

/// Source of streamed chat turns.
///
/// Every call opens a fresh remote stream; a returned receiver is never
/// restarted. Implementations must spawn their work on the current tokio
/// runtime and return immediately.
pub trait ChatBackend: Send + Sync {
    fn stream_turn(&self, message: &str, history: &[Message]) -> mpsc::Receiver<StreamEvent>;
}

#[derive(Clone)]
pub struct GeminiChatClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    system_instruction: String,
}

impl GeminiChatClient {
    pub fn new(api_key: Option<String>, base_url: &str, model: &str, system_instruction: &str) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.to_string(),
            model: model.to_string(),
            system_instruction: system_instruction.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.resolve_api_key(),
            config.base_url(),
            config.chat_model(),
            config.system_instruction(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, message: &str, history: &[Message]) -> GenerateContentRequest {
        let mut contents: Vec<Content> = history.iter().map(Content::from).collect();
        contents.push(Content::user(vec![Part::text(message)]));

        GenerateContentRequest {
            contents,
            system_instruction: Some(SystemInstruction {
                parts: vec![Part::text(self.system_instruction.clone())],
            }),
            generation_config: None,
        }
    }

    async fn run(self, api_key: String, request: GenerateContentRequest, tx: mpsc::Sender<StreamEvent>) {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        tracing::debug!("Opening chat stream to {}", url);

        let response = match self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Chat stream request failed: {}", e);
                let _ = tx.send(StreamEvent::Failed(StreamFailure::Transport(e.to_string()))).await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let failure = rejection_failure(status, &body);
            tracing::error!("Chat stream rejected with {}: {:?}", status, failure);
            let _ = tx.send(StreamEvent::Failed(failure)).await;
            return;
        }

        forward_sse(response.bytes_stream(), tx).await;
    }
}

impl ChatBackend for GeminiChatClient {
    fn stream_turn(&self, message: &str, history: &[Message]) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let Some(api_key) = self.api_key.clone() else {
            tracing::warn!("Chat turn attempted without an API key");
            let _ = tx.try_send(StreamEvent::Failed(StreamFailure::MissingCredential));
            return rx;
        };

        let request = self.build_request(message, history);
        let client = self.clone();
        tokio::spawn(client.run(api_key, request, tx));
        rx
    }
}

/// Map a non-success response to a failure; credential problems are
/// reported as `Unauthorized` whatever the status code
fn rejection_failure(status: StatusCode, body: &str) -> StreamFailure {
    let message = gemini::error_message(body);
    let credential_error = serde_json::from_str::<gemini::ErrorResponse>(body)
        .map(|e| e.error.is_credential_error())
        .unwrap_or(false);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StreamFailure::Unauthorized(message),
        _ if credential_error => StreamFailure::Unauthorized(message),
        _ => StreamFailure::Transport(format!("{} {}", status.as_u16(), message)),
    }
}

/// Read an SSE body of `GenerateContentResponse` payloads and forward
/// cumulative snapshots, ending with exactly one terminal event.
pub async fn forward_sse<S, B, E>(body: S, tx: mpsc::Sender<StreamEvent>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut body = Box::pin(body);
    let mut decoder = SseDecoder::default();
    let mut accumulated = String::new();

    loop {
        let payloads = match body.next().await {
            Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
            Some(Err(e)) => {
                tracing::error!("Chat stream interrupted: {}", e);
                let _ = tx.send(StreamEvent::Failed(StreamFailure::Transport(e.to_string()))).await;
                return;
            }
            None => {
                let rest = decoder.finish();
                if let Err(failure) = apply_payloads(rest, &mut accumulated, &tx).await {
                    let _ = tx.send(StreamEvent::Failed(failure)).await;
                } else {
                    let _ = tx.send(StreamEvent::Finished).await;
                }
                return;
            }
        };

        if let Err(failure) = apply_payloads(payloads, &mut accumulated, &tx).await {
            let _ = tx.send(StreamEvent::Failed(failure)).await;
            return;
        }
        if tx.is_closed() {
            tracing::debug!("Chat stream consumer went away");
            return;
        }
    }
}

async fn apply_payloads(
    payloads: Vec<String>,
    accumulated: &mut String,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), StreamFailure> {
    for payload in payloads {
        if let Ok(error) = serde_json::from_str::<gemini::ErrorResponse>(&payload) {
            tracing::error!("Chat stream returned an error: {}", error.error.message);
            return Err(StreamFailure::Transport(error.error.message));
        }

        match serde_json::from_str::<GenerateContentResponse>(&payload) {
            Ok(response) => {
                let delta = response.text();
                if delta.is_empty() {
                    continue;
                }
                accumulated.push_str(&delta);
                if tx.send(StreamEvent::Snapshot(accumulated.clone())).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => tracing::warn!("Skipping unparsable stream payload: {}", e),
        }
    }
    Ok(())
}

/// Incremental decoder for `data:` lines of a server-sent event body.
///
/// Bytes are buffered until a full line arrives so multi-byte characters
/// split across chunks decode correctly.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk, returning the payloads of all completed `data:` lines
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let payload = line.trim_end_matches(['\r', '\n']).strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        None
    } else {
        Some(payload.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunk(text: &str) -> String {
        format!(
            "data: {{\"candidates\":[{{\"content\":{{\"role\":\"model\",\"parts\":[{{\"text\":{}}}]}}}}]}}\r\n\r\n",
            serde_json::to_string(text).unwrap()
        )
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_decoder_splits_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b":1}\r\n\r\ndata: {}\n"), vec!["{\"a\":1}", "{}"]);
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn test_decoder_ignores_comments_and_events() {
        let mut decoder = SseDecoder::default();
        let payloads = decoder.push(b": keep-alive\nevent: message\ndata: [DONE]\ndata:x\n");
        assert_eq!(payloads, vec!["x"]);
    }

    #[test]
    fn test_decoder_handles_split_utf8() {
        let mut decoder = SseDecoder::default();
        let bytes = "data: ğ\n".as_bytes();
        let (head, tail) = bytes.split_at(7);
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["ğ"]);
    }

    #[test]
    fn test_decoder_flushes_unterminated_line() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), vec!["tail"]);
    }

    #[tokio::test]
    async fn test_forward_emits_cumulative_snapshots() {
        let body = format!("{}{}{}", chunk("Hel"), chunk("lo"), chunk(" world"));
        let (head, tail) = body.split_at(50);
        let parts: Vec<Result<Vec<u8>, std::io::Error>> =
            vec![Ok(head.as_bytes().to_vec()), Ok(tail.as_bytes().to_vec())];

        let (tx, rx) = mpsc::channel(16);
        forward_sse(stream::iter(parts), tx).await;

        assert_eq!(
            collect(rx).await,
            vec![
                StreamEvent::Snapshot("Hel".to_string()),
                StreamEvent::Snapshot("Hello".to_string()),
                StreamEvent::Snapshot("Hello world".to_string()),
                StreamEvent::Finished,
            ]
        );
    }

    #[tokio::test]
    async fn test_forward_reports_transport_error_once() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(chunk("partial").into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(chunk("never").into_bytes()),
        ];

        let (tx, rx) = mpsc::channel(16);
        forward_sse(stream::iter(parts), tx).await;

        let events = collect(rx).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], StreamEvent::Snapshot("partial".to_string()));
        assert_eq!(
            events[1],
            StreamEvent::Failed(StreamFailure::Transport("reset".to_string()))
        );
    }

    #[tokio::test]
    async fn test_forward_maps_inline_error_payload() {
        let body = "data: {\"error\":{\"code\":500,\"message\":\"overloaded\"}}\n\n";
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(body.as_bytes().to_vec())];

        let (tx, rx) = mpsc::channel(16);
        forward_sse(stream::iter(parts), tx).await;

        assert_eq!(
            collect(rx).await,
            vec![StreamEvent::Failed(StreamFailure::Transport("overloaded".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_missing_credential_fails_without_request() {
        let client = GeminiChatClient::new(None, "http://127.0.0.1:9", "m", "persona");
        let events = collect(client.stream_turn("hi", &[])).await;
        assert_eq!(events, vec![StreamEvent::Failed(StreamFailure::MissingCredential)]);
    }

    #[test]
    fn test_request_carries_persona_and_history() {
        let client = GeminiChatClient::new(Some("k".to_string()), "http://x", "m", "You are AION.");
        let history = vec![Message::user("earlier")];
        let request = client.build_request("now", &history);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "You are AION.");
        assert_eq!(value["contents"].as_array().unwrap().len(), 2);
        assert_eq!(value["contents"][1]["role"], "user");
        assert_eq!(value["contents"][1]["parts"][0]["text"], "now");
        assert!(value.get("generationConfig").is_none());
    }

    /// Answer a single HTTP request with `status_line` and `body`, returning the base URL
    async fn serve_once(status_line: &'static str, content_type: &'static str, body: String) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            // Drain the request so the client is not reset mid-write
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                    let headers = String::from_utf8_lossy(&request[..end]).to_lowercase();
                    let content_length = headers
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status_line,
                content_type,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    async fn turn_against(status_line: &'static str, content_type: &'static str, body: String) -> Vec<StreamEvent> {
        let base_url = serve_once(status_line, content_type, body).await;
        let client = GeminiChatClient::new(Some("key".to_string()), &base_url, "m", "persona");
        collect(client.stream_turn("hi", &[])).await
    }

    #[tokio::test]
    async fn test_invalid_key_on_bad_request_is_unauthorized() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        let events = turn_against("400 Bad Request", "application/json", body.to_string()).await;
        assert_eq!(
            events,
            vec![StreamEvent::Failed(StreamFailure::Unauthorized(
                "API key not valid. Please pass a valid API key.".to_string()
            ))]
        );
    }

    #[tokio::test]
    async fn test_401_is_unauthorized() {
        let body = r#"{"error":{"code":401,"message":"Request is missing required authentication credential.","status":"UNAUTHENTICATED"}}"#;
        let events = turn_against("401 Unauthorized", "application/json", body.to_string()).await;
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Failed(StreamFailure::Unauthorized(_))]
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let body = r#"{"error":{"code":500,"message":"Internal error encountered.","status":"INTERNAL"}}"#;
        let events = turn_against("500 Internal Server Error", "application/json", body.to_string()).await;
        assert_eq!(
            events,
            vec![StreamEvent::Failed(StreamFailure::Transport(
                "500 Internal error encountered.".to_string()
            ))]
        );
    }

    #[tokio::test]
    async fn test_successful_turn_over_http() {
        let body = format!("{}{}", chunk("Mer"), chunk("haba"));
        let events = turn_against("200 OK", "text/event-stream", body).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Snapshot("Mer".to_string()),
                StreamEvent::Snapshot("Merhaba".to_string()),
                StreamEvent::Finished,
            ]
        );
    }

    #[test]
    fn test_rejection_without_json_body() {
        assert_eq!(
            rejection_failure(StatusCode::BAD_GATEWAY, "upstream down"),
            StreamFailure::Transport("502 upstream down".to_string())
        );
        assert_eq!(
            rejection_failure(StatusCode::FORBIDDEN, ""),
            StreamFailure::Unauthorized(String::new())
        );
    }

    #[test]
    fn test_only_snapshots_are_non_terminal() {
        assert!(!StreamEvent::Snapshot(String::new()).is_terminal());
        assert!(StreamEvent::Finished.is_terminal());
        assert!(StreamEvent::Failed(StreamFailure::MissingCredential).is_terminal());
    }

    #[test]
    fn test_failure_messages() {
        assert!(StreamFailure::MissingCredential.to_string().contains("API key"));
        assert_eq!(
            StreamFailure::Transport("timeout".to_string()).to_string(),
            "Connection error: timeout"
        );
    }
}
