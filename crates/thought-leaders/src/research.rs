//! Research client: one chat completion per subject.
//!
//! The system prompt frames the model as an expert researcher; the user
//! prompt names the subject and asks for four things (ideas, contributions,
//! controversies, and their effect on reputation). Failures never escape
//! this module: they are logged and the subject is reported as absent.

use tracing::error;

use crate::pipeline::{Analysis, ResearchFuture, Researcher};
use crate::{
    ChatClient, ChatRequest, DEFAULT_RESEARCH_MODEL, Message, PERPLEXITY_URL, RESEARCH_MAX_TOKENS,
    RESEARCH_TEMPERATURE, format_citations,
};

/// Fixed system-role instruction sent with every research request.
pub const SYSTEM_PROMPT: &str = "\
You are an expert researcher tasked with compiling a comprehensive, clear, and concise summary \
of the specified person's philosophy, impact, and notable controversies/mistakes. Your goal is to:
1. Extract key principles, ideas, and insights from their public statements, writings, and interviews
2. Analyze their significant contributions to their field
3. Identify and explain their notable controversies, criticisms, or strategic mistakes (e.g., \
business decisions, public statements, or actions that were widely criticized or later proved problematic)

Focus on their views on technology, innovation, and society. Present the information in a \
structured format, including specific quotes where possible. If data is limited or unclear, \
note that and provide a reasonable interpretation based on available context.";

/// Per-subject user prompt.
pub fn analysis_prompt(subject: &str) -> String {
    format!(
        "Provide a detailed analysis of {subject}, including:
1. Their key philosophical ideas and principles
2. Major contributions and impact in their field
3. Notable controversies, criticisms, or strategic mistakes they've made
4. How these mistakes or controversies have affected their work or reputation"
    )
}

/// Request settings for [`ResearchClient`].
#[derive(Debug, Clone)]
pub struct ResearchSettings {
    /// Default: [`PERPLEXITY_URL`].
    pub url: String,
    /// Default: [`DEFAULT_RESEARCH_MODEL`].
    pub model: String,
    /// Default: [`RESEARCH_MAX_TOKENS`].
    pub max_tokens: u32,
    /// Default: [`RESEARCH_TEMPERATURE`].
    pub temperature: f32,
    /// Append the returned source URLs below the analysis. Default: `false`.
    pub include_citations: bool,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            url: PERPLEXITY_URL.to_string(),
            model: DEFAULT_RESEARCH_MODEL.to_string(),
            max_tokens: RESEARCH_MAX_TOKENS,
            temperature: RESEARCH_TEMPERATURE,
            include_citations: false,
        }
    }
}

pub struct ResearchClient {
    chat: ChatClient,
    settings: ResearchSettings,
}

impl ResearchClient {
    pub fn new(api_key: impl Into<String>, settings: ResearchSettings) -> Result<Self, String> {
        let chat = ChatClient::with_url(api_key, settings.url.clone())?;
        Ok(Self { chat, settings })
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    /// Build the request body for one subject.
    pub fn build_request(&self, subject: &str) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(analysis_prompt(subject)),
            ],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }

    /// Run the research request and return the analysis text.
    pub async fn query(&self, subject: &str) -> Result<Analysis, String> {
        let completion = self.chat.chat(&self.build_request(subject)).await?;
        let content = completion
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| "empty research response".to_string())?;

        let text = if self.settings.include_citations {
            format!("{content}{}", format_citations(&completion.citations))
        } else {
            content
        };
        Ok(Analysis {
            text,
            usage: completion.usage,
        })
    }
}

impl Researcher for ResearchClient {
    fn fetch_analysis<'a>(&'a self, subject: &'a str) -> ResearchFuture<'a> {
        Box::pin(async move {
            match self.query(subject).await {
                Ok(analysis) => Some(analysis),
                Err(e) => {
                    error!("Error querying research API for {subject}: {e}");
                    None
                }
            }
        })
    }
}
