//! Purpose: Streaming "refresh scripts" client for the host's notification port.
//! Exports: `RefreshClient`, `RefreshSession`, `RefreshEvent`, `EventSink`, `LogCategory`.
//! Role: Send one command frame, then fold the notification stream into events.
//! Invariants: Filter hits are buffered per run and drained exactly once per `success`.
//! Invariants: Unknown or malformed notifications produce one diagnostic, never abort.
//! Invariants: Transport errors end the run with the outcome accumulated so far.
//! Notes: The timeout bounds each receive, not the whole exchange.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::client::connect;
use super::message::{Notification, RefreshCommand};
use crate::core::error::{Error, ErrorKind};
use crate::core::frame::{FrameReader, write_frame};
use crate::targets::{DEFAULT_HOST, DEFAULT_REFRESH_PORT, DEFAULT_TIMEOUT};

const NOT_AVAILABLE: &str = "N/A";

/// Display category chosen from a `log` message prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogCategory {
    Warning,
    Ok,
    Directory,
    Plain,
}

// Checked in order; the first match wins.
const LOG_PREFIXES: [(&str, LogCategory); 3] = [
    ("WARN:", LogCategory::Warning),
    ("Refreshed: ", LogCategory::Ok),
    ("Refreshing scripts in", LogCategory::Directory),
];

/// Split a log message into its category and the text to display.
pub fn classify_log(message: &str) -> (LogCategory, &str) {
    for (prefix, category) in LOG_PREFIXES {
        if let Some(rest) = message.strip_prefix(prefix) {
            return (category, rest.trim_start());
        }
    }
    (LogCategory::Plain, message)
}

#[derive(Clone, Debug, PartialEq)]
pub enum RefreshEvent {
    Log {
        category: LogCategory,
        message: String,
    },
    /// Consolidated filter hits seen before a `success`.
    Filters {
        patterns: Vec<String>,
        folders: Vec<String>,
    },
    Error {
        message: String,
    },
    Success {
        message: String,
        files: String,
        folders: String,
    },
    Unknown {
        status: Option<String>,
        raw: Value,
    },
    Invalid {
        status: String,
        detail: String,
    },
    /// The stream ended on a transport, framing or decode error.
    Aborted {
        kind: ErrorKind,
        message: String,
        hint: Option<String>,
    },
}

pub trait EventSink {
    fn emit(&mut self, event: RefreshEvent);
}

impl EventSink for Vec<RefreshEvent> {
    fn emit(&mut self, event: RefreshEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: RefreshEvent) {
        (**self).emit(event);
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct FilterHit {
    pattern: String,
    folder: String,
}

/// Per-run state: buffered filter hits and whether `success` was seen.
#[derive(Debug, Default)]
pub struct RefreshSession {
    filters: Vec<FilterHit>,
    succeeded: bool,
}

impl RefreshSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn pending_filters(&self) -> usize {
        self.filters.len()
    }

    pub fn handle(&mut self, notification: Notification, sink: &mut impl EventSink) {
        match notification {
            Notification::Log { message } => {
                let (category, text) = classify_log(&message);
                sink.emit(RefreshEvent::Log {
                    category,
                    message: text.to_string(),
                });
            }
            Notification::Filter { pattern, folder } => {
                self.filters.push(FilterHit { pattern, folder });
            }
            Notification::Error { message } => sink.emit(RefreshEvent::Error { message }),
            Notification::Success {
                message,
                files,
                folders,
            } => {
                self.flush_filters(sink);
                sink.emit(RefreshEvent::Success {
                    message,
                    files: count_text(files.as_ref()),
                    folders: count_text(folders.as_ref()),
                });
                self.succeeded = true;
            }
            Notification::Unknown { status, raw } => {
                sink.emit(RefreshEvent::Unknown { status, raw });
            }
            Notification::Invalid { status, detail, .. } => {
                sink.emit(RefreshEvent::Invalid { status, detail });
            }
        }
    }

    fn flush_filters(&mut self, sink: &mut impl EventSink) {
        if self.filters.is_empty() {
            return;
        }
        let hits = std::mem::take(&mut self.filters);
        let patterns: BTreeSet<&str> = hits.iter().map(|hit| hit.pattern.as_str()).collect();
        let patterns = patterns.into_iter().map(str::to_string).collect();
        let folders = hits.into_iter().map(|hit| hit.folder).collect();
        sink.emit(RefreshEvent::Filters { patterns, folders });
    }
}

fn count_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => NOT_AVAILABLE.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct RefreshClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl Default for RefreshClient {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_PORT)
    }
}

impl RefreshClient {
    pub fn new(port: u16) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one refresh; true iff the host reported `success` before closing.
    pub fn run(&self, command: RefreshCommand, mut sink: impl EventSink) -> bool {
        let mut session = RefreshSession::new();
        if let Err(err) = self.stream(command, &mut session, &mut sink) {
            debug!(kind = ?err.kind(), "refresh stream ended early: {}", err.describe());
            sink.emit(RefreshEvent::Aborted {
                kind: err.kind(),
                message: err.describe(),
                hint: err.hint().map(str::to_string),
            });
        }
        session.succeeded()
    }

    fn stream(
        &self,
        command: RefreshCommand,
        session: &mut RefreshSession,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        let mut stream = connect(&self.host, self.port, self.timeout).map_err(|err| {
            err.with_hint("Is the game running with the refresh script listening on this port?")
        })?;
        debug!(port = self.port, ?command, "sending refresh command");
        write_frame(&mut stream, &command)?;

        let mut frames = FrameReader::new(stream);
        let mut received = 0usize;
        while let Some(value) = frames.decode_next()? {
            received += 1;
            session.handle(Notification::from_value(value), sink);
        }
        debug!(received, succeeded = session.succeeded(), "host closed refresh stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LogCategory, RefreshEvent, RefreshSession, classify_log};
    use crate::api::message::Notification;
    use serde_json::json;

    fn feed(session: &mut RefreshSession, raw: serde_json::Value) -> Vec<RefreshEvent> {
        let mut events = Vec::new();
        session.handle(Notification::from_value(raw), &mut events);
        events
    }

    #[test]
    fn log_prefixes_select_category() {
        assert_eq!(classify_log("WARN:   slow disk"), (LogCategory::Warning, "slow disk"));
        assert_eq!(classify_log("Refreshed: a.txt"), (LogCategory::Ok, "a.txt"));
        assert_eq!(
            classify_log("Refreshing scripts in  Titles/Trackmania"),
            (LogCategory::Directory, "Titles/Trackmania")
        );
        assert_eq!(classify_log("  plain text"), (LogCategory::Plain, "  plain text"));
        assert_eq!(classify_log("Refreshed:x"), (LogCategory::Plain, "Refreshed:x"));
    }

    #[test]
    fn filters_are_buffered_until_success() {
        let mut session = RefreshSession::new();
        let events = feed(
            &mut session,
            json!({"status": "filter", "pattern": "*.bak", "folder": "Media"}),
        );
        assert!(events.is_empty());
        assert_eq!(session.pending_filters(), 1);
        assert!(!session.succeeded());
    }

    #[test]
    fn success_drains_filters_once() {
        let mut session = RefreshSession::new();
        feed(&mut session, json!({"status": "filter", "pattern": "p2", "folder": "f1"}));
        feed(&mut session, json!({"status": "filter", "pattern": "p1", "folder": "f1"}));
        feed(&mut session, json!({"status": "filter", "pattern": "p2", "folder": "f2"}));

        let events = feed(
            &mut session,
            json!({"status": "success", "message": "done", "files": 3, "folders": 1}),
        );
        assert_eq!(
            events,
            vec![
                RefreshEvent::Filters {
                    patterns: vec!["p1".to_string(), "p2".to_string()],
                    folders: vec!["f1".to_string(), "f1".to_string(), "f2".to_string()],
                },
                RefreshEvent::Success {
                    message: "done".to_string(),
                    files: "3".to_string(),
                    folders: "1".to_string(),
                },
            ]
        );
        assert!(session.succeeded());
        assert_eq!(session.pending_filters(), 0);

        let again = feed(&mut session, json!({"status": "success", "message": "again"}));
        assert_eq!(
            again,
            vec![RefreshEvent::Success {
                message: "again".to_string(),
                files: "N/A".to_string(),
                folders: "N/A".to_string(),
            }]
        );
    }

    #[test]
    fn errors_and_unknowns_do_not_end_the_session() {
        let mut session = RefreshSession::new();
        let events = feed(&mut session, json!({"status": "error", "message": "boom"}));
        assert_eq!(
            events,
            vec![RefreshEvent::Error {
                message: "boom".to_string()
            }]
        );

        let events = feed(&mut session, json!({"status": "bogus"}));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            RefreshEvent::Unknown { status: Some(status), .. } if status == "bogus"
        ));

        let events = feed(&mut session, json!({"status": "log", "message": "Refreshed: b.txt"}));
        assert_eq!(
            events,
            vec![RefreshEvent::Log {
                category: LogCategory::Ok,
                message: "b.txt".to_string()
            }]
        );
        assert!(!session.succeeded());
    }

    #[test]
    fn string_counts_are_shown_verbatim() {
        let mut session = RefreshSession::new();
        let events = feed(
            &mut session,
            json!({"status": "success", "message": "ok", "files": "12", "folders": null}),
        );
        assert_eq!(
            events,
            vec![RefreshEvent::Success {
                message: "ok".to_string(),
                files: "12".to_string(),
                folders: "N/A".to_string(),
            }]
        );
    }
}
