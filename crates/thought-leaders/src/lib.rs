//! Research pipeline that builds a dated Markdown digest of thought leaders.
//!
//! For every subject name it asks a research chat-completion API
//! ([Perplexity](https://docs.perplexity.ai/)) for an analysis of the
//! person's ideas, contributions and controversies, asks a second generative
//! API ([Gemini](https://ai.google.dev/)) to reshape that analysis into nested
//! bullet points, and appends the result under a `## <name>` heading to
//! `thought_leaders_<YYYYMMDD>.md`. Subjects that already have a heading in
//! today's document are skipped, so a run can be repeated safely.
//!
//! # Where to find things
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Command line, `.env` and environment handling; [`Config`](config::Config) |
//! | [`names`] | Reading subject names from line-delimited files |
//! | [`research`] | [`ResearchClient`](research::ResearchClient) and its prompts |
//! | [`formatter`] | [`GeminiFormatter`](formatter::GeminiFormatter), the bullet-point pass |
//! | [`store`] | [`OutputStore`](store::OutputStore), the append-only digest |
//! | [`pipeline`] | [`Pipeline`](pipeline::Pipeline), the per-subject state machine |
//! | [`events`] | [`PipelineEvent`](events::PipelineEvent) and handlers |
//! | [`logging`] | Console `tracing` layer |
//!
//! The chat-completion wire types and [`ChatClient`] live at the crate root
//! because both the binary and the research module use them directly.

pub mod config;
pub mod events;
pub mod formatter;
pub mod logging;
pub mod names;
pub mod pipeline;
pub mod research;
pub mod store;

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// ── Constants ──────────────────────────────────────────────────────

pub const PERPLEXITY_URL: &str = "https://api.perplexity.ai/chat/completions";

/// Default model for research requests.
pub const DEFAULT_RESEARCH_MODEL: &str = "sonar";

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for the bullet-point formatting pass.
pub const DEFAULT_FORMATTER_MODEL: &str = "gemini-2.0-flash-thinking-exp-01-21";

/// Response length cap for research requests.
pub const RESEARCH_MAX_TOKENS: u32 = 2000;

/// Sampling temperature for research requests.
pub const RESEARCH_TEMPERATURE: f32 = 0.7;

/// Per-request timeout shared by both HTTP clients.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

pub(crate) const USER_AGENT: &str = concat!("thought-leaders/", env!("CARGO_PKG_VERSION"));

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body.
#[derive(Serialize, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
        }
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
    /// Perplexity returns the web sources it consulted as bare URLs.
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
}

/// Error object shared by both remote APIs.
#[derive(Deserialize, Debug)]
pub(crate) struct ApiErrorResponse {
    pub(crate) message: String,
}

/// Clean return type from [`ChatClient::chat`].
#[derive(Debug)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub citations: Vec<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Parse a chat completion response body.
///
/// An `error` object in the body wins over any choices. A body with no
/// choices parses successfully with `content: None`.
pub fn parse_chat_response(text: &str) -> Result<ChatCompletion, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("research API error: {}", err.message));
    }

    let content = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content);
    Ok(ChatCompletion {
        content,
        usage: parsed.usage,
        citations: parsed.citations,
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for an OpenAI-compatible chat completions endpoint.
pub struct ChatClient {
    pub(crate) client: reqwest::Client,
    pub(crate) api_key: String,
    pub(crate) url: String,
}

impl ChatClient {
    /// Create a client for a compatible endpoint such as [`PERPLEXITY_URL`].
    pub fn with_url(api_key: impl Into<String>, url: impl Into<String>) -> Result<Self, String> {
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.into(),
            url: url.into(),
        })
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "Research request: model={}, messages={}, max_tokens={}, temp={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
            body.temperature,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;
        debug!(
            "Research response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("research API HTTP {status}: {text}"));
        }

        let completion = parse_chat_response(&text)?;
        if let Some(ref usage) = completion.usage {
            debug!(
                "Token usage: prompt={}, completion={}, total={}",
                usage.prompt_tokens.unwrap_or(0),
                usage.completion_tokens.unwrap_or(0),
                usage.total_tokens.unwrap_or(0),
            );
        }
        Ok(completion)
    }
}

pub(crate) fn build_http_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))
}

// ── Citation formatting ────────────────────────────────────────────

/// Format source URLs as a "Sources:" footer, dropping repeats.
pub fn format_citations(citations: &[String]) -> String {
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<String> = citations
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty() && seen.insert(*c))
        .map(|c| format!("- {c}"))
        .collect();

    if unique.is_empty() {
        String::new()
    } else {
        format!("\n\nSources:\n{}", unique.join("\n"))
    }
}

/// One-shot HTTP server for client tests.
#[cfg(test)]
pub(crate) mod test_support {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Answer a single request with `status` and a JSON `body`.
    ///
    /// Returns the server's base URL and a handle resolving to the raw
    /// request it received (head and body).
    pub(crate) async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (base, handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf);
            if let Some((head, _)) = text.split_once("\r\n\r\n") {
                let length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= head.len() + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}
