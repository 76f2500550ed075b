//! Research every subject in the name files and append the findings to
//! `thought_leaders_<YYYYMMDD>.md`.
//!
//! Reads `PERPLEXITY_API_KEY` and `GEMINI_API_KEY` from the environment or a
//! `.env` file in the working directory.
//!
//! # Examples
//!
//! ```sh
//! # Default name files, output in the current directory
//! thought-leaders
//!
//! # Explicit name files and output directory, no pause between subjects
//! thought-leaders --names founders.txt --names philosophers.txt \
//!   --output-dir digests --delay-secs 0
//! ```

use std::process;

use thought_leaders::config::{Cli, Config};
use thought_leaders::events::{CompositeEventHandler, EventHandler, LoggingHandler, PipelineEvent};
use thought_leaders::logging;
use thought_leaders::names::load_subjects;
use thought_leaders::pipeline::{Pipeline, RunSummary};
use thought_leaders::store::OutputStore;
use tracing::info;

/// Prints each analysis to stdout as it arrives.
struct ConsoleHandler;

impl EventHandler for ConsoleHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        if let PipelineEvent::Researched { subject, text } = event {
            println!("=== {subject}'s Philosophy ===");
            println!("{text}");
        }
    }
}

async fn run(cli: Cli) -> Result<RunSummary, String> {
    let config = Config::from_cli(cli).map_err(|e| e.to_string())?;
    let (researcher, formatter) = config.build_clients().map_err(|e| e.to_string())?;

    let subjects = load_subjects(&config.name_files);
    if subjects.is_empty() {
        info!("No subjects found in the name files; nothing to do");
        return Ok(RunSummary::default());
    }

    let today = chrono::Local::now().date_naive();
    let mut store = OutputStore::open(&config.output_dir, today).map_err(|e| e.to_string())?;

    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(ConsoleHandler);

    Pipeline::new(&researcher, &formatter)
        .with_delay(config.delay)
        .with_event_handler(&handler)
        .run(&subjects, &mut store)
        .await
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::load();
    logging::init(cli.log_level());

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
