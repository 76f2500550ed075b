//! Bullet-point formatting pass over the Gemini `generateContent` API.
//!
//! The research text is wrapped in an instruction to rewrite it as nested
//! markdown hyphen bullets without `#` headings. Any failure is logged and
//! reported as `None`; the pipeline then writes the unformatted text.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::pipeline::{FormatFuture, Formatter};
use crate::{ApiErrorResponse, DEFAULT_FORMATTER_MODEL, GEMINI_BASE_URL, build_http_client};

/// Wrap `text` in the bullet-conversion instruction.
pub fn bullet_prompt(text: &str) -> String {
    format!(
        "Convert this text into hierarchical bullet points using markdown hyphens (-), \
removing any hashtags and unnecessary denotations.
Format it like this:
- Main point
  - Subpoint
    - Sub-subpoint

Here's the text to convert: {text}"
    )
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
}

#[derive(Serialize, Debug)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Serialize, Debug)]
pub struct Part {
    pub text: String,
}

impl GenerateRequest {
    /// A single user turn holding one text part.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.into(),
                }],
            }],
        }
    }
}

#[derive(Deserialize, Debug)]
struct RawGenerateResponse {
    candidates: Option<Vec<RawCandidate>>,
    error: Option<ApiErrorResponse>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<RawPromptFeedback>,
}

#[derive(Deserialize, Debug)]
struct RawCandidate {
    content: Option<RawContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawContent {
    #[serde(default)]
    parts: Vec<RawPart>,
}

#[derive(Deserialize, Debug)]
struct RawPart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize, Debug)]
struct RawPromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

/// Extract the generated text from a `generateContent` response body.
///
/// Text parts of the first candidate are concatenated; thought parts are
/// skipped. A blocked prompt or a blank result is an error.
pub fn parse_generate_response(body: &str) -> Result<String, String> {
    let parsed: RawGenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("formatting API error: {}", err.message));
    }
    if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(format!("prompt blocked: {reason}"));
    }

    let candidate = parsed
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| "no candidates in response".to_string())?;

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.thought)
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(format!(
            "empty response (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ));
    }
    Ok(text)
}

// ── Client ─────────────────────────────────────────────────────────

pub struct GeminiFormatter {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GeminiFormatter {
    /// Create a formatter for the default model on the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_model(api_key, GEMINI_BASE_URL, DEFAULT_FORMATTER_MODEL)
    }

    pub fn with_model(
        api_key: impl Into<String>,
        base_url: &str,
        model: &str,
    ) -> Result<Self, String> {
        Ok(Self {
            client: build_http_client()?,
            api_key: api_key.into(),
            endpoint: generate_endpoint(base_url, model),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one prompt and return the generated text.
    pub async fn generate(&self, prompt: &str) -> Result<String, String> {
        let body = GenerateRequest::from_prompt(prompt);
        debug!(
            "Formatting request: {} ({} chars)",
            self.endpoint,
            prompt.len()
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
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
            "Formatting response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("formatting API HTTP {status}: {text}"));
        }
        parse_generate_response(&text)
    }
}

fn generate_endpoint(base_url: &str, model: &str) -> String {
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!(
        "{}/models/{model}:generateContent",
        base_url.trim_end_matches('/')
    )
}

impl Formatter for GeminiFormatter {
    fn reformat<'a>(&'a self, text: &'a str) -> FormatFuture<'a> {
        Box::pin(async move {
            match self.generate(&bullet_prompt(text)).await {
                Ok(formatted) => Some(formatted),
                Err(e) => {
                    warn!("Error querying formatting API: {e}");
                    None
                }
            }
        })
    }
}
