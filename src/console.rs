//! Purpose: Render refresh events and build-status lines for a terminal.
//! Exports: `ColorMode`, `ConsoleSink`, `paint`, `Tone`.
//! Role: Presentation only; protocol state lives in `api::refresh`.
//! Invariants: ANSI escapes appear only when color is enabled.
//! Invariants: Error and abort lines go to the error writer, everything else to `out`.
use std::io::{self, IsTerminal, Write};

use clap::ValueEnum;

use crate::api::refresh::{EventSink, LogCategory, RefreshEvent};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }

    pub fn for_stdout(self) -> bool {
        self.use_color(io::stdout().is_terminal())
    }

    pub fn for_stderr(self) -> bool {
        self.use_color(io::stderr().is_terminal())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Tone {
    Green,
    Red,
    Yellow,
    Grey,
}

impl Tone {
    fn code(self) -> &'static str {
        match self {
            Tone::Green => "92",
            Tone::Red => "91",
            Tone::Yellow => "93",
            Tone::Grey => "90",
        }
    }
}

pub fn paint(text: &str, tone: Tone, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }
    format!("\u{1b}[{}m{text}\u{1b}[0m", tone.code())
}

fn log_label(category: LogCategory) -> (&'static str, Tone) {
    match category {
        LogCategory::Warning => ("[WARN]", Tone::Yellow),
        LogCategory::Ok => ("[  OK]", Tone::Green),
        LogCategory::Directory => ("[ DIR]", Tone::Grey),
        LogCategory::Plain => ("[ LOG]", Tone::Grey),
    }
}

/// Writes refresh events in the console layout the host tooling expects.
pub struct ConsoleSink<O: Write, E: Write> {
    out: O,
    err: E,
    color: bool,
}

impl ConsoleSink<io::Stdout, io::Stderr> {
    pub fn stdio(color_mode: ColorMode) -> Self {
        Self::new(io::stdout(), io::stderr(), color_mode.for_stdout())
    }
}

impl<O: Write, E: Write> ConsoleSink<O, E> {
    pub fn new(out: O, err: E, color: bool) -> Self {
        Self { out, err, color }
    }

    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }

    fn render(&mut self, event: RefreshEvent) -> io::Result<()> {
        let color = self.color;
        let written = match event {
            RefreshEvent::Log { category, message } => {
                let (label, tone) = log_label(category);
                writeln!(self.out, " {} {message}", paint(label, tone, color))
            }
            RefreshEvent::Filters { patterns, folders } => {
                let quoted = patterns
                    .iter()
                    .map(|pattern| format!("\"{pattern}\""))
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(self.out)?;
                writeln!(self.out, " {} [{quoted}]", paint("[FILTERS]", Tone::Yellow, color))?;
                for folder in folders {
                    writeln!(self.out, " {folder}")?;
                }
                Ok(())
            }
            RefreshEvent::Error { message } => {
                writeln!(self.err, " {} {message}", paint("[ERR]", Tone::Red, color))
            }
            RefreshEvent::Success {
                message,
                files,
                folders,
            } => {
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    " {} {message} (Files: {files}, Folders: {folders})",
                    paint("[SUCCESS]", Tone::Green, color)
                )?;
                writeln!(self.out)
            }
            RefreshEvent::Unknown { status, raw } => {
                let status = status.as_deref().unwrap_or("<missing>");
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    " {} Unknown message status '{status}': {raw}",
                    paint("[???]", Tone::Yellow, color)
                )?;
                writeln!(self.out)
            }
            RefreshEvent::Invalid { status, detail } => writeln!(
                self.out,
                " {} Malformed '{status}' message: {detail}",
                paint("[???]", Tone::Yellow, color)
            ),
            RefreshEvent::Aborted { message, hint, .. } => {
                writeln!(self.err, " {} {message}", paint("[ERR]", Tone::Red, color))?;
                if let Some(hint) = hint {
                    writeln!(self.err, " {} {hint}", paint("hint:", Tone::Yellow, color))?;
                }
                Ok(())
            }
        };
        written?;
        self.out.flush()
    }
}

impl<O: Write, E: Write> EventSink for ConsoleSink<O, E> {
    fn emit(&mut self, event: RefreshEvent) {
        // Output failures never change the refresh outcome.
        let _ = self.render(event);
    }
}

#[cfg(test)]
mod tests {
    use super::{ConsoleSink, Tone, paint};
    use crate::api::refresh::{EventSink, LogCategory, RefreshEvent};
    use crate::core::error::ErrorKind;
    use serde_json::json;

    fn render(events: Vec<RefreshEvent>, color: bool) -> (String, String) {
        let mut sink = ConsoleSink::new(Vec::new(), Vec::new(), color);
        for event in events {
            sink.emit(event);
        }
        let (out, err) = sink.into_parts();
        (
            String::from_utf8(out).expect("utf8"),
            String::from_utf8(err).expect("utf8"),
        )
    }

    #[test]
    fn plain_layout_matches_host_tooling() {
        let (out, err) = render(
            vec![
                RefreshEvent::Log {
                    category: LogCategory::Ok,
                    message: "a.txt".to_string(),
                },
                RefreshEvent::Filters {
                    patterns: vec!["p1".to_string(), "p2".to_string()],
                    folders: vec!["f1".to_string(), "f1".to_string()],
                },
                RefreshEvent::Success {
                    message: "done".to_string(),
                    files: "3".to_string(),
                    folders: "1".to_string(),
                },
                RefreshEvent::Error {
                    message: "boom".to_string(),
                },
            ],
            false,
        );
        assert_eq!(
            out,
            " [  OK] a.txt\n\n [FILTERS] [\"p1\", \"p2\"]\n f1\n f1\n\n [SUCCESS] done (Files: 3, Folders: 1)\n\n"
        );
        assert_eq!(err, " [ERR] boom\n");
    }

    #[test]
    fn unknown_status_is_one_diagnostic() {
        let (out, _) = render(
            vec![RefreshEvent::Unknown {
                status: Some("bogus".to_string()),
                raw: json!({"status": "bogus"}),
            }],
            false,
        );
        let lines: Vec<&str> = out.lines().filter(|line| !line.is_empty()).collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Unknown message status 'bogus'"));
    }

    #[test]
    fn aborted_goes_to_error_writer() {
        let (out, err) = render(
            vec![RefreshEvent::Aborted {
                kind: ErrorKind::Framing,
                message: "connection closed after 2 of 4 header bytes".to_string(),
                hint: None,
            }],
            false,
        );
        assert!(out.is_empty());
        assert_eq!(err, " [ERR] connection closed after 2 of 4 header bytes\n");
    }

    #[test]
    fn abort_hint_follows_the_error_line() {
        let (out, err) = render(
            vec![RefreshEvent::Aborted {
                kind: ErrorKind::Connection,
                message: "failed to connect to localhost:30005".to_string(),
                hint: Some("Is the game running?".to_string()),
            }],
            false,
        );
        assert!(out.is_empty());
        assert_eq!(
            err,
            " [ERR] failed to connect to localhost:30005\n hint: Is the game running?\n"
        );
    }

    #[test]
    fn color_is_opt_in() {
        assert_eq!(paint("[WARN]", Tone::Yellow, false), "[WARN]");
        assert_eq!(paint("[WARN]", Tone::Yellow, true), "\u{1b}[93m[WARN]\u{1b}[0m");

        let (out, _) = render(
            vec![RefreshEvent::Log {
                category: LogCategory::Warning,
                message: "careful".to_string(),
            }],
            true,
        );
        assert_eq!(out, " \u{1b}[93m[WARN]\u{1b}[0m careful\n");
    }
}
