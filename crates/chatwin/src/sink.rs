//! Completion sinks: where a buffer snapshot is sent to get a reply.
//!
//! [`CompletionSink`] is the seam between the conversation window and the
//! model. [`OpenRouterSink`] is the production implementation, posting to
//! the OpenRouter chat completions API with retry on transient failures.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::retry::RetryPolicy;
use crate::{Message, OPENROUTER_URL};

/// Boxed future returned by [`CompletionSink::complete`].
pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Turns an ordered message list into one generated reply.
///
/// The messages are the full snapshot, system prompt first. Implementations
/// return the reply text, or an error describing why none was produced.
pub trait CompletionSink: Send + Sync {
    fn complete<'a>(&'a self, messages: &'a [Message]) -> CompletionFuture<'a>;
}

// ── Request / response types ───────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

#[derive(Deserialize, Debug)]
struct UsageInfo {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// Pull the first choice's text out of a raw response body.
fn parse_completion(text: &str) -> Result<String, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("OpenRouter API error: {}", err.message));
    }

    if let Some(usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
        );
    }

    parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .ok_or_else(|| "expected one choice, got none".to_string())
}

// ── OpenRouterSink ─────────────────────────────────────────────────

/// HTTP sink for the OpenRouter chat completions API.
pub struct OpenRouterSink {
    client: reqwest::Client,
    api_key: String,
    model: String,
    url: String,
    referer: String,
    title: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    retry: RetryPolicy,
}

impl OpenRouterSink {
    /// Create a sink for `model` with default headers and retry policy.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("chatwin/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            url: OPENROUTER_URL.to_string(),
            referer: "https://github.com/tacryt-socryp/chatwin".to_string(),
            title: "chatwin".to_string(),
            max_tokens: None,
            temperature: None,
            retry: RetryPolicy::default(),
        })
    }

    /// Send requests to a different endpoint (any OpenAI-compatible API).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the Referer and X-Title headers OpenRouter uses for attribution.
    pub fn with_headers(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One request, no retries.
    async fn send_once(&self, messages: &[Message]) -> Result<String, String> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        debug!(
            "LLM request: model={}, messages={}",
            self.model,
            messages.len()
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(&body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("OpenRouter API HTTP {status}: {text}"));
        }
        parse_completion(&text)
    }
}

impl CompletionSink for OpenRouterSink {
    fn complete<'a>(&'a self, messages: &'a [Message]) -> CompletionFuture<'a> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                let e = match self.send_once(messages).await {
                    Ok(reply) => return Ok(reply),
                    Err(e) => e,
                };
                let Some(delay) = self.retry.retry_after(&e, attempt) else {
                    return Err(e);
                };
                warn!(
                    "Completion attempt {} failed, retrying in {:.3}s: {}",
                    attempt + 1,
                    delay.as_secs_f64(),
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const REPLY_BODY: &str = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}]}"#;

    /// Read one HTTP request, headers and body.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some((head, body)) = text.split_once("\r\n\r\n") {
                let expected = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if body.len() >= expected {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer one connection per scripted `(status, body)` pair, in order.
    /// Returns the endpoint URL and the requests received so far.
    async fn scripted_server(
        script: Vec<(u16, &'static str)>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            for (status, body) in script {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                log.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (format!("http://{addr}/v1/chat/completions"), seen)
    }

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[tokio::test]
    async fn server_error_is_retried_until_success() {
        let (url, seen) = scripted_server(vec![(503, "overloaded"), (200, REPLY_BODY)]).await;
        let sink = OpenRouterSink::new("test-key", "some/model")
            .unwrap()
            .with_url(url)
            .with_retry(quick_retry());

        let reply = sink.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(reply, "hello");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("POST /v1/chat/completions "));
        assert!(seen[1].contains("Bearer test-key"));
        assert!(seen[1].contains(r#""model":"some/model""#));
    }

    #[tokio::test]
    async fn client_error_fails_on_first_attempt() {
        let (url, seen) = scripted_server(vec![(401, "bad key"), (200, REPLY_BODY)]).await;
        let sink = OpenRouterSink::new("wrong", "some/model")
            .unwrap()
            .with_url(url)
            .with_retry(quick_retry());

        let err = sink.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(err.contains("HTTP 401"), "{err}");
        assert!(err.ends_with("bad key"), "{err}");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retries_give_up_after_policy_limit() {
        let (url, seen) =
            scripted_server(vec![(502, "a"), (502, "b"), (502, "c"), (200, REPLY_BODY)]).await;
        let sink = OpenRouterSink::new("test-key", "some/model")
            .unwrap()
            .with_url(url)
            .with_retry(quick_retry());

        let err = sink.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(err.contains("HTTP 502"), "{err}");
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn empty_choices_are_not_retried() {
        let script = vec![(200, r#"{"choices":[]}"#), (200, REPLY_BODY)];
        let (url, seen) = scripted_server(script).await;
        let sink = OpenRouterSink::new("test-key", "some/model")
            .unwrap()
            .with_url(url)
            .with_retry(quick_retry());

        let err = sink.complete(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, "expected one choice, got none");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn request_serializes_messages_in_order() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let req = ChatRequest {
            model: "test-model",
            messages: &messages,
            max_tokens: None,
            temperature: Some(0.5),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn parse_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}],
                       "usage":{"prompt_tokens":5,"completion_tokens":1}}"#;
        assert_eq!(parse_completion(body).unwrap(), "hello");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(err.contains("got none"));
    }

    #[test]
    fn api_error_surfaces_message() {
        let err = parse_completion(r#"{"error":{"message":"no credits"}}"#).unwrap_err();
        assert_eq!(err, "OpenRouter API error: no credits");
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_completion("not json").is_err());
    }

    #[test]
    fn builder_sets_model() {
        let sink = OpenRouterSink::new("key", "some/model")
            .unwrap()
            .with_max_tokens(256)
            .with_temperature(0.2);
        assert_eq!(sink.model(), "some/model");
        assert_eq!(sink.max_tokens, Some(256));
    }
}
