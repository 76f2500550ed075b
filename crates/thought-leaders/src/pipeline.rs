//! The per-subject research loop.
//!
//! [`Pipeline`] walks the subject list strictly in order. Each subject moves
//! through a small state machine:
//!
//! ```text
//! Pending ─┬─> Skipped                               (heading already present)
//!          ├─> Researched ─> Formatted ─> Written
//!          └─> Failed                                (research returned nothing)
//! ```
//!
//! A formatting failure does not leave the happy path: the raw research text
//! is written instead. Every subject that reached the network is followed by
//! the configured pause; skipped subjects are not.
//!
//! The remote calls sit behind [`Researcher`] and [`Formatter`] so the loop
//! can run against in-process fakes.

use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;

use crate::UsageInfo;
use crate::events::{EventHandler, NoopHandler, PipelineEvent};
use crate::store::{OutputStore, StoreError};

/// Pause between subjects that reached the network.
pub const DEFAULT_SUBJECT_DELAY: Duration = Duration::from_secs(2);

// ── Collaborator traits ────────────────────────────────────────────

/// Raw research output for one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub text: String,
    pub usage: Option<UsageInfo>,
}

/// Boxed future returned by [`Researcher::fetch_analysis`].
pub type ResearchFuture<'a> = BoxFuture<'a, Option<Analysis>>;

/// Boxed future returned by [`Formatter::reformat`].
pub type FormatFuture<'a> = BoxFuture<'a, Option<String>>;

/// Produces the analysis of a subject. `None` means the call failed and the
/// failure has already been reported.
pub trait Researcher: Send + Sync {
    fn fetch_analysis<'a>(&'a self, subject: &'a str) -> ResearchFuture<'a>;
}

/// Rewrites research text. `None` means the caller should keep the input.
pub trait Formatter: Send + Sync {
    fn reformat<'a>(&'a self, text: &'a str) -> FormatFuture<'a>;
}

// ── State and results ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectState {
    Pending,
    Skipped,
    Researched,
    Formatted,
    Written,
    Failed,
}

impl std::fmt::Display for SubjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubjectState::Pending => "pending",
            SubjectState::Skipped => "skipped",
            SubjectState::Researched => "researched",
            SubjectState::Formatted => "formatted",
            SubjectState::Written => "written",
            SubjectState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final state of one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectReport {
    pub subject: String,
    pub state: SubjectState,
    /// The raw research text was written because formatting failed.
    pub unformatted: bool,
}

impl SubjectReport {
    pub fn new(subject: impl Into<String>, state: SubjectState, unformatted: bool) -> Self {
        Self {
            subject: subject.into(),
            state,
            unformatted,
        }
    }
}

/// Token totals across the research calls of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl UsageTotals {
    pub fn record(&mut self, usage: &UsageInfo) {
        self.prompt_tokens += u64::from(usage.prompt_tokens.unwrap_or(0));
        self.completion_tokens += u64::from(usage.completion_tokens.unwrap_or(0));
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Outcome of a [`Pipeline::run`].
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// One report per input subject, in input order.
    pub reports: Vec<SubjectReport>,
    pub usage: UsageTotals,
}

impl RunSummary {
    fn count(&self, state: SubjectState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }

    pub fn written(&self) -> usize {
        self.count(SubjectState::Written)
    }

    pub fn skipped(&self) -> usize {
        self.count(SubjectState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(SubjectState::Failed)
    }

    /// Subjects written without the formatting pass.
    pub fn unformatted(&self) -> usize {
        self.reports.iter().filter(|r| r.unformatted).count()
    }
}

// ── Pipeline ───────────────────────────────────────────────────────

pub struct Pipeline<'a> {
    researcher: &'a dyn Researcher,
    formatter: &'a dyn Formatter,
    delay: Duration,
    handler: &'a dyn EventHandler,
}

impl<'a> Pipeline<'a> {
    pub fn new(researcher: &'a dyn Researcher, formatter: &'a dyn Formatter) -> Self {
        Self {
            researcher,
            formatter,
            delay: DEFAULT_SUBJECT_DELAY,
            handler: &NoopHandler,
        }
    }

    /// Set the pause after each subject that reached the network.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    /// Process every subject against `store`.
    ///
    /// Remote failures are absorbed per subject; only a failed write to the
    /// document stops the run.
    pub async fn run(
        &self,
        subjects: &[String],
        store: &mut OutputStore,
    ) -> Result<RunSummary, StoreError> {
        let mut summary = RunSummary::default();
        self.handler.on_event(&PipelineEvent::RunStarted {
            total: subjects.len(),
            output: store.path(),
        });

        for (index, subject) in subjects.iter().enumerate() {
            self.handler.on_event(&PipelineEvent::SubjectStarted {
                index,
                total: subjects.len(),
                subject,
            });

            let report = self.process(subject, store, &mut summary.usage).await?;
            let reached_network = report.state != SubjectState::Skipped;
            summary.reports.push(report);

            if reached_network && !self.delay.is_zero() {
                self.handler
                    .on_event(&PipelineEvent::Pausing { delay: self.delay });
                tokio::time::sleep(self.delay).await;
            }
        }

        self.handler
            .on_event(&PipelineEvent::Finished { summary: &summary });
        Ok(summary)
    }

    async fn process(
        &self,
        subject: &str,
        store: &mut OutputStore,
        usage: &mut UsageTotals,
    ) -> Result<SubjectReport, StoreError> {
        let mut state = SubjectState::Pending;

        if store.exists(subject) {
            advance(subject, &mut state, SubjectState::Skipped);
            self.handler.on_event(&PipelineEvent::Skipped { subject });
            return Ok(SubjectReport::new(subject, state, false));
        }

        let Some(analysis) = self.researcher.fetch_analysis(subject).await else {
            advance(subject, &mut state, SubjectState::Failed);
            self.handler.on_event(&PipelineEvent::Failed { subject });
            return Ok(SubjectReport::new(subject, state, false));
        };
        advance(subject, &mut state, SubjectState::Researched);
        if let Some(ref u) = analysis.usage {
            usage.record(u);
        }
        self.handler.on_event(&PipelineEvent::Researched {
            subject,
            text: &analysis.text,
        });

        let formatted = self.formatter.reformat(&analysis.text).await;
        let unformatted = formatted.is_none();
        let entry = match formatted {
            Some(text) => {
                self.handler
                    .on_event(&PipelineEvent::Formatted { subject, text: &text });
                text
            }
            None => {
                self.handler
                    .on_event(&PipelineEvent::FormatFallback { subject });
                analysis.text
            }
        };
        advance(subject, &mut state, SubjectState::Formatted);

        let mode = store.append(subject, &entry)?;
        advance(subject, &mut state, SubjectState::Written);
        self.handler.on_event(&PipelineEvent::Written {
            subject,
            path: store.path(),
            mode,
        });
        Ok(SubjectReport::new(subject, state, unformatted))
    }
}

fn advance(subject: &str, state: &mut SubjectState, to: SubjectState) {
    debug!("{subject}: {state} -> {to}");
    *state = to;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_totals_accumulate() {
        let mut totals = UsageTotals::default();
        totals.record(&UsageInfo {
            prompt_tokens: Some(100),
            completion_tokens: Some(900),
            total_tokens: Some(1000),
        });
        totals.record(&UsageInfo {
            prompt_tokens: Some(50),
            completion_tokens: None,
            total_tokens: None,
        });
        assert_eq!(totals.prompt_tokens, 150);
        assert_eq!(totals.completion_tokens, 900);
        assert_eq!(totals.total(), 1050);
    }

    #[test]
    fn summary_counts() {
        let report = |state, unformatted| SubjectReport::new("x", state, unformatted);
        let summary = RunSummary {
            reports: vec![
                report(SubjectState::Written, false),
                report(SubjectState::Written, true),
                report(SubjectState::Skipped, false),
                report(SubjectState::Failed, false),
            ],
            usage: UsageTotals::default(),
        };
        assert_eq!(summary.written(), 2);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.unformatted(), 1);
    }
}
