//! Console output for `tracing` events.
//!
//! [`ConsoleLayer`] renders each event as a single
//! `HH:MM:SS LEVEL message {field=value, ...}` line on stderr, dropping
//! anything more verbose than its configured level. Stdout stays reserved
//! for the research text itself.

use std::io::Write;

use chrono::Local;
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// A [`tracing_subscriber::Layer`] that writes formatted events to stderr.
pub struct ConsoleLayer {
    max_level: Level,
}

impl ConsoleLayer {
    pub fn new(max_level: Level) -> Self {
        Self { max_level }
    }
}

impl<S: Subscriber + for<'a> LookupSpan<'a>> Layer<S> for ConsoleLayer {
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();
        let level = *metadata.level();
        // Level ordering: TRACE > DEBUG > INFO > WARN > ERROR.
        if level > self.max_level {
            return;
        }
        // HTTP stack chatter below INFO is noise for this tool.
        if level > Level::INFO && !metadata.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format_line(&Local::now().format("%H:%M:%S").to_string(), level, visitor);

        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }
}

fn format_line(time: &str, level: Level, visitor: MessageVisitor) -> String {
    let mut message = visitor.message;
    if !visitor.fields.is_empty() {
        let extras: Vec<String> = visitor
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        if message.is_empty() {
            message = extras.join(" ");
        } else {
            message = format!("{message} {{{}}}", extras.join(", "));
        }
    }
    format!("{time} {:>5} {message}", level.as_str())
}

/// Install a [`ConsoleLayer`] as the global subscriber.
///
/// Only the first call in a process takes effect.
pub fn init(max_level: Level) {
    let _ = tracing_subscriber::registry()
        .with(ConsoleLayer::new(max_level))
        .try_init();
}

/// Visitor that extracts the message and extra fields from a tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields
                .push((field.name().to_string(), value.to_string()));
        }
    }
}
