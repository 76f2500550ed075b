//! Events and handlers for the [`Pipeline`](crate::pipeline::Pipeline).
//!
//! The pipeline reports every step of a run as a [`PipelineEvent`]. Callers
//! implement [`EventHandler`] to print progress, collect metrics, or assert
//! on behavior in tests.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or silent runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::pipeline::RunSummary;
use crate::store::WriteMode;

/// Events emitted by the pipeline during a run.
#[derive(Debug)]
pub enum PipelineEvent<'a> {
    /// The run is starting with `total` subjects.
    RunStarted { total: usize, output: &'a Path },
    /// A subject is about to be processed (`index` is zero-based).
    SubjectStarted {
        index: usize,
        total: usize,
        subject: &'a str,
    },
    /// The subject already has a heading in the document.
    Skipped { subject: &'a str },
    /// The research call returned text.
    Researched { subject: &'a str, text: &'a str },
    /// The formatting call returned text.
    Formatted { subject: &'a str, text: &'a str },
    /// The formatting call failed; the raw text will be written.
    FormatFallback { subject: &'a str },
    /// The entry was appended to the document.
    Written {
        subject: &'a str,
        path: &'a Path,
        mode: WriteMode,
    },
    /// The research call failed; nothing is written for this subject.
    Failed { subject: &'a str },
    /// The pipeline is pausing before the next subject.
    Pausing { delay: Duration },
    /// Every subject has been processed.
    Finished { summary: &'a RunSummary },
}

/// Handler for pipeline events.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        let _ = event;
    }
}

pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// # Example
///
/// ```
/// use thought_leaders::events::{FnEventHandler, PipelineEvent};
///
/// let handler = FnEventHandler::new(|event| {
///     if let PipelineEvent::Failed { subject } = event {
///         eprintln!("no analysis for {subject}");
///     }
/// });
/// # let _ = handler;
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&PipelineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &PipelineEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches each event to every inner handler, in registration order.
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Logs every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &PipelineEvent<'_>) {
        match event {
            PipelineEvent::RunStarted { total, output } => {
                info!("Processing {total} subject(s) into {}", output.display());
            }
            PipelineEvent::SubjectStarted {
                index,
                total,
                subject,
            } => {
                info!("[{}/{}] Analyzing {subject}...", index + 1, total);
            }
            PipelineEvent::Skipped { subject } => {
                info!("Skipping {subject} - already analyzed");
            }
            PipelineEvent::Researched { subject, text } => {
                debug!("Research for {subject}: {} chars", text.len());
            }
            PipelineEvent::Formatted { subject, text } => {
                debug!("Formatted {subject}: {} chars", text.len());
            }
            PipelineEvent::FormatFallback { subject } => {
                warn!("Formatting failed for {subject}; writing unformatted text");
            }
            PipelineEvent::Written {
                subject,
                path,
                mode,
            } => {
                let verb = match mode {
                    WriteMode::Create => "Created",
                    WriteMode::Append => "Appended to",
                };
                debug!("{verb} {} with {subject}", path.display());
            }
            PipelineEvent::Failed { subject } => {
                error!("Failed to retrieve information about {subject} from the research API");
            }
            PipelineEvent::Pausing { delay } => {
                debug!("Pausing {:.1}s", delay.as_secs_f64());
            }
            PipelineEvent::Finished { summary } => {
                info!(
                    "Done: {} written ({} unformatted), {} skipped, {} failed, {} tokens",
                    summary.written(),
                    summary.unformatted(),
                    summary.skipped(),
                    summary.failed(),
                    summary.usage.total(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: Arc<AtomicUsize>) -> impl EventHandler {
        FnEventHandler::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn composite_dispatches_to_all() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let handler = CompositeEventHandler::new()
            .with(counting(a.clone()))
            .with(LoggingHandler)
            .with(counting(b.clone()));
        assert_eq!(handler.len(), 3);

        handler.on_event(&PipelineEvent::Skipped { subject: "x" });
        handler.on_event(&PipelineEvent::Failed { subject: "y" });
        assert_eq!(a.load(Ordering::Relaxed), 2);
        assert_eq!(b.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn fn_handler_sees_event_fields() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = FnEventHandler::new(move |event| {
            if let PipelineEvent::FormatFallback { subject } = event {
                sink.lock().unwrap().push(subject.to_string());
            }
        });
        handler.on_event(&PipelineEvent::FormatFallback { subject: "Yann LeCun" });
        handler.on_event(&PipelineEvent::Skipped { subject: "ignored" });
        assert_eq!(*seen.lock().unwrap(), vec!["Yann LeCun".to_string()]);
    }
}
