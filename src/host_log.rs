//! Purpose: Correlate a plugin reload with what the host wrote to its log.
//! Exports: `LogCursor`, `LogMarker`, `ReloadReport`, `ReloadOutcome`, `classify_line`.
//! Role: Optional enrichment layered on the single-response client; no framing here.
//! Invariants: Reads are bounded to the last `MAX_TAIL_BYTES` of new log content.
//! Invariants: A log that shrank since the cursor was taken is read from the start.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;

use crate::core::error::{Error, fs_error_kind};

pub const HOST_LOG_FILE: &str = "Openplanet.log";
pub const MAX_TAIL_BYTES: u64 = 64 * 1024;
pub const DEFAULT_TAIL_LINES: usize = 40;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogMarker {
    Loaded,
    Unloaded,
    CompileFailed,
    Error,
    Warning,
    Info,
}

const COMPILE_FAILURE_MARKERS: [&str; 3] =
    ["failed to compile", "compilation failed", "compile error"];

/// Classify one host log line; `None` when it does not name `plugin_id`.
pub fn classify_line(line: &str, plugin_id: &str) -> Option<LogMarker> {
    let lower = line.to_lowercase();
    if !mentions_plugin(&lower, &plugin_id.to_lowercase()) {
        return None;
    }

    let marker = if COMPILE_FAILURE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        LogMarker::CompileFailed
    } else if lower.contains("unload") {
        LogMarker::Unloaded
    } else if lower.contains("loaded") || lower.contains("starting plugin") {
        LogMarker::Loaded
    } else if lower.contains("[error]") || lower.contains(" error") || lower.contains("exception") {
        LogMarker::Error
    } else if lower.contains("warn") {
        LogMarker::Warning
    } else {
        LogMarker::Info
    };
    Some(marker)
}

/// The id counts only as a quoted name, a path segment, or a `[  id]` tag.
fn mentions_plugin(lower: &str, id: &str) -> bool {
    if id.is_empty() {
        return false;
    }
    lower.match_indices(id).any(|(at, _)| {
        let before = &lower[..at];
        let after = &lower[at + id.len()..];
        match before.chars().next_back() {
            Some(quote @ ('\'' | '"')) => after.starts_with(quote),
            Some('/' | '\\') => {
                after.is_empty()
                    || after.starts_with(['/', '\\', ' ', ':'])
                    || after.starts_with(".op")
            }
            _ => {
                before.trim_end_matches(' ').ends_with('[')
                    && after.trim_start_matches(' ').starts_with(']')
            }
        }
    })
}

/// Position in the host log taken before a reload request.
#[derive(Clone, Debug)]
pub struct LogCursor {
    path: PathBuf,
    offset: u64,
}

impl LogCursor {
    pub fn at_end(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let offset = std::fs::metadata(&path)
            .map_err(|err| {
                Error::new(fs_error_kind(&err))
                    .with_message("failed to stat host log")
                    .with_path(&path)
                    .with_source(err)
            })?
            .len();
        Ok(Self { path, offset })
    }

    /// Lines appended since the cursor was taken, newest last.
    pub fn read_recent(&self, max_lines: usize) -> Result<Vec<String>, Error> {
        let io_err = |err: std::io::Error, message: &str| {
            Error::new(fs_error_kind(&err))
                .with_message(message.to_string())
                .with_path(&self.path)
                .with_source(err)
        };

        let mut file =
            File::open(&self.path).map_err(|err| io_err(err, "failed to open host log"))?;
        let len = file
            .metadata()
            .map_err(|err| io_err(err, "failed to stat host log"))?
            .len();

        let from = if len < self.offset { 0 } else { self.offset };
        let start = from.max(len.saturating_sub(MAX_TAIL_BYTES));
        let cut = start > from;
        // One byte before a cut window tells whether it starts on a line boundary.
        let read_from = if cut { start - 1 } else { start };
        file.seek(SeekFrom::Start(read_from))
            .map_err(|err| io_err(err, "failed to seek host log"))?;
        let mut bytes = Vec::new();
        file.take(len - read_from)
            .read_to_end(&mut bytes)
            .map_err(|err| io_err(err, "failed to read host log"))?;

        let (partial_first, window) = if cut {
            (bytes.first() != Some(&b'\n'), bytes.get(1..).unwrap_or_default())
        } else {
            (false, bytes.as_slice())
        };
        let text = String::from_utf8_lossy(window);
        let mut lines: Vec<&str> = text.lines().collect();
        if partial_first && !lines.is_empty() {
            lines.remove(0);
        }
        let skip = lines.len().saturating_sub(max_lines);
        Ok(lines
            .into_iter()
            .skip(skip)
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReloadOutcome {
    Loaded,
    Failed,
    Unknown,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReloadReport {
    pub entries: Vec<(LogMarker, String)>,
}

impl ReloadReport {
    pub fn from_lines(lines: &[String], plugin_id: &str) -> Self {
        let entries = lines
            .iter()
            .filter_map(|line| classify_line(line, plugin_id).map(|marker| (marker, line.clone())))
            .collect();
        Self { entries }
    }

    pub fn outcome(&self) -> ReloadOutcome {
        let has = |wanted: LogMarker| self.entries.iter().any(|(marker, _)| *marker == wanted);
        if has(LogMarker::CompileFailed) || has(LogMarker::Error) {
            ReloadOutcome::Failed
        } else if has(LogMarker::Loaded) {
            ReloadOutcome::Loaded
        } else {
            ReloadOutcome::Unknown
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{LogCursor, LogMarker, MAX_TAIL_BYTES, ReloadOutcome, ReloadReport, classify_line};
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    fn append(path: &std::path::Path, text: &str) {
        let mut file = OpenOptions::new().append(true).open(path).expect("open");
        file.write_all(text.as_bytes()).expect("append");
    }

    #[test]
    fn lines_are_classified_for_the_plugin() {
        let id = "Dashboard";
        assert_eq!(
            classify_line("[ ScriptEngine] [12:00:01] Unloading plugin 'Dashboard'", id),
            Some(LogMarker::Unloaded)
        );
        assert_eq!(
            classify_line("[ ScriptEngine] [12:00:02] Loaded plugin 'Dashboard' (v2.1)", id),
            Some(LogMarker::Loaded)
        );
        assert_eq!(
            classify_line("[ ScriptEngine] Failed to compile Plugins/Dashboard/main.as", id),
            Some(LogMarker::CompileFailed)
        );
        assert_eq!(
            classify_line("[ ScriptEngine] Failed to compile Plugins/Other/main.as", id),
            None
        );
        assert_eq!(
            classify_line("[   dashboard] [12:00:03] null pointer exception", id),
            Some(LogMarker::Error)
        );
        assert_eq!(
            classify_line("[   Dashboard] [12:00:03] WARN: setting missing", id),
            Some(LogMarker::Warning)
        );
        assert_eq!(
            classify_line("[ ScriptEngine] Loading Plugins\\Dashboard.op", id),
            Some(LogMarker::Info)
        );
        assert_eq!(classify_line("[ Game] [12:00:04] Map loaded", id), None);
    }

    #[test]
    fn plugin_id_must_stand_alone() {
        assert_eq!(classify_line("[ Game] Map loaded", "Map"), None);
        assert_eq!(classify_line("Loaded plugin 'MapEditorTools'", "Map"), None);
        assert_eq!(classify_line("Loaded plugin 'Map'", "Map"), Some(LogMarker::Loaded));
        assert_eq!(
            classify_line("Failed to compile Plugins/Dashboard2/main.as", "Dashboard"),
            None
        );
        assert_eq!(classify_line("Loaded plugin ''", ""), None);
    }

    #[test]
    fn cursor_reads_only_new_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Openplanet.log");
        fs::write(&path, "old line 1\nold line 2\n").expect("write");

        let cursor = LogCursor::at_end(&path).expect("cursor");
        append(&path, "new line 1\nnew line 2\nnew line 3\n");

        let lines = cursor.read_recent(2).expect("read");
        assert_eq!(lines, vec!["new line 2".to_string(), "new line 3".to_string()]);
    }

    #[test]
    fn truncated_log_is_read_from_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Openplanet.log");
        fs::write(&path, "a much longer previous session log\n".repeat(4)).expect("write");

        let cursor = LogCursor::at_end(&path).expect("cursor");
        fs::write(&path, "fresh\r\n").expect("rewrite");

        assert_eq!(cursor.read_recent(10).expect("read"), vec!["fresh".to_string()]);
    }

    #[test]
    fn window_is_bounded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Openplanet.log");
        fs::write(&path, "").expect("write");

        let cursor = LogCursor::at_end(&path).expect("cursor");
        let line = "x".repeat(99) + "\n";
        append(&path, &line.repeat((MAX_TAIL_BYTES as usize / 100) * 2));
        append(&path, "last\n");

        let lines = cursor.read_recent(usize::MAX).expect("read");
        assert_eq!(lines.last().map(String::as_str), Some("last"));
        let total: usize = lines.iter().map(|line| line.len() + 1).sum();
        assert!(total as u64 <= MAX_TAIL_BYTES);
        assert!(lines.iter().all(|line| line == "last" || line.len() == 99));
    }

    #[test]
    fn window_starting_on_a_line_keeps_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Openplanet.log");
        fs::write(&path, "").expect("write");

        let cursor = LogCursor::at_end(&path).expect("cursor");
        // 64-byte lines put the window start exactly on a line boundary.
        let line = "y".repeat(63) + "\n";
        append(&path, &line.repeat(1100));

        let lines = cursor.read_recent(usize::MAX).expect("read");
        assert_eq!(lines.len() as u64, MAX_TAIL_BYTES / 64);
        assert!(lines.iter().all(|line| line.len() == 63));
    }

    #[test]
    fn missing_log_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = LogCursor::at_end(dir.path().join("Openplanet.log")).expect_err("missing");
        assert_eq!(err.kind(), crate::core::error::ErrorKind::NotFound);
    }

    #[test]
    fn report_outcome_prefers_failures() {
        let lines = vec![
            "Unloading plugin 'Dashboard'".to_string(),
            "Loaded plugin 'Dashboard'".to_string(),
        ];
        let report = ReloadReport::from_lines(&lines, "Dashboard");
        assert_eq!(report.outcome(), ReloadOutcome::Loaded);

        let mut failing = lines.clone();
        failing.push("Compilation failed: Plugins/Dashboard/src/Main.as (12, 4)".to_string());
        assert_eq!(
            ReloadReport::from_lines(&failing, "Dashboard").outcome(),
            ReloadOutcome::Failed
        );

        let unrelated = ReloadReport::from_lines(&["Map loaded".to_string()], "Dashboard");
        assert!(unrelated.is_empty());
        assert_eq!(unrelated.outcome(), ReloadOutcome::Unknown);
    }

    #[test]
    fn other_plugins_failing_does_not_fail_the_reload() {
        let lines = vec![
            "Loaded plugin 'Dashboard'".to_string(),
            "Failed to compile Plugins/OtherPlugin/main.as".to_string(),
        ];
        let report = ReloadReport::from_lines(&lines, "Dashboard");
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.outcome(), ReloadOutcome::Loaded);

        let only_other = ReloadReport::from_lines(&lines[1..], "Dashboard");
        assert_eq!(only_other.outcome(), ReloadOutcome::Unknown);
    }
}
