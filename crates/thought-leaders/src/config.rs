//! Startup configuration.
//!
//! Values come from the command line, then the process environment, then a
//! `.env` file in the working directory (loaded by [`Cli::load`] without
//! overriding variables that are already set). Everything has a default
//! except the two API keys; [`Config::from_cli`] refuses to build without
//! them, before any subject is touched.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::Level;

use crate::formatter::GeminiFormatter;
use crate::names::default_name_files;
use crate::research::{ResearchClient, ResearchSettings};
use crate::{
    DEFAULT_FORMATTER_MODEL, DEFAULT_RESEARCH_MODEL, GEMINI_BASE_URL, PERPLEXITY_URL,
    RESEARCH_MAX_TOKENS, RESEARCH_TEMPERATURE,
};

pub const PERPLEXITY_KEY_VAR: &str = "PERPLEXITY_API_KEY";
pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set (environment or .env file)")]
    MissingCredential(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Research thinkers and append the findings to today's digest.
#[derive(Debug, Parser)]
#[command(name = "thought-leaders", version)]
pub struct Cli {
    /// API key for the research endpoint
    #[arg(long, env = PERPLEXITY_KEY_VAR, hide_env_values = true)]
    pub perplexity_api_key: Option<String>,

    /// API key for the formatting endpoint
    #[arg(long, env = GEMINI_KEY_VAR, hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Name file to read; repeat to read several in order.
    /// Default: contemporary.txt, classical_new.txt, classical_old.txt
    #[arg(long = "names", value_name = "FILE")]
    pub name_files: Vec<PathBuf>,

    /// Directory that holds the dated digest
    #[arg(long, env = "THOUGHT_LEADERS_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Seconds to pause after each researched subject
    #[arg(long, env = "THOUGHT_LEADERS_DELAY", default_value_t = 2.0)]
    pub delay_secs: f64,

    /// Research endpoint URL
    #[arg(long, env = "PERPLEXITY_API_URL", default_value = PERPLEXITY_URL)]
    pub research_url: String,

    /// Research model
    #[arg(long, default_value = DEFAULT_RESEARCH_MODEL)]
    pub research_model: String,

    /// Maximum tokens in a research response
    #[arg(long, default_value_t = RESEARCH_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Research sampling temperature
    #[arg(long, default_value_t = RESEARCH_TEMPERATURE)]
    pub temperature: f32,

    /// Append the research API's source URLs below each analysis
    #[arg(long)]
    pub citations: bool,

    /// Formatting API base URL
    #[arg(long, env = "GEMINI_API_BASE", default_value = GEMINI_BASE_URL)]
    pub formatter_url: String,

    /// Formatting model
    #[arg(long, default_value = DEFAULT_FORMATTER_MODEL)]
    pub formatter_model: String,

    /// Log request details
    #[arg(long, short, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short)]
    pub quiet: bool,
}

impl Cli {
    /// Load `.env`, then parse the process arguments.
    pub fn load() -> Self {
        // A missing .env is normal; real environment variables win.
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub perplexity_api_key: String,
    pub gemini_api_key: String,
    pub name_files: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub delay: Duration,
    pub research: ResearchSettings,
    pub formatter_url: String,
    pub formatter_model: String,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let perplexity_api_key = require(cli.perplexity_api_key, PERPLEXITY_KEY_VAR)?;
        let gemini_api_key = require(cli.gemini_api_key, GEMINI_KEY_VAR)?;

        let delay = Duration::try_from_secs_f64(cli.delay_secs).map_err(|e| {
            ConfigError::Invalid {
                name: "delay",
                reason: e.to_string(),
            }
        })?;
        if !(0.0..=2.0).contains(&cli.temperature) {
            return Err(ConfigError::Invalid {
                name: "temperature",
                reason: format!("{} is outside 0.0..=2.0", cli.temperature),
            });
        }

        let name_files = if cli.name_files.is_empty() {
            default_name_files()
        } else {
            cli.name_files
        };

        Ok(Self {
            perplexity_api_key,
            gemini_api_key,
            name_files,
            output_dir: cli.output_dir,
            delay,
            research: ResearchSettings {
                url: cli.research_url,
                model: cli.research_model,
                max_tokens: cli.max_tokens,
                temperature: cli.temperature,
                include_citations: cli.citations,
            },
            formatter_url: cli.formatter_url,
            formatter_model: cli.formatter_model,
        })
    }

    /// Build both API clients from the validated settings.
    pub fn build_clients(&self) -> Result<(ResearchClient, GeminiFormatter), ConfigError> {
        let researcher = ResearchClient::new(&self.perplexity_api_key, self.research.clone())
            .map_err(ConfigError::HttpClient)?;
        let formatter = GeminiFormatter::with_model(
            &self.gemini_api_key,
            &self.formatter_url,
            &self.formatter_model,
        )
        .map_err(ConfigError::HttpClient)?;
        Ok((researcher, formatter))
    }
}

fn require(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingCredential(name))
}
