//! Purpose: `opdev` CLI entry point: build, deploy, reload and refresh Openplanet plugins.
//! Role: Binary crate root; parses args, runs commands, prints status for humans.
//! Invariants: Exit code is 0 only when the command's success condition was reached.
//! Invariants: Errors go to stderr: text on a terminal, one JSON object otherwise.
//! Invariants: All host traffic goes through `api::HostClient` / `api::RefreshClient`.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use opdev::api::{EXIT_FAILURE, Error, ErrorKind, HostClient, Request, Response};
use opdev::console::{ColorMode, Tone, paint};
use opdev::host_log::{LogMarker, ReloadOutcome, ReloadReport};
use opdev::package::PackageKind;
use opdev::targets::{
    DEFAULT_HOST, DEFAULT_REFRESH_PORT, HostTarget, translate_host_path, wine_prefix_from_env,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn failure() -> Self {
        Self {
            exit_code: EXIT_FAILURE,
        }
    }

    fn from_success(success: bool) -> Self {
        if success { Self::ok() } else { Self::failure() }
    }
}

/// Connection settings shared by every host-facing command.
#[derive(Clone, Debug)]
struct HostOptions {
    host: String,
    timeout: Duration,
    color: ColorMode,
}

impl HostOptions {
    fn client(&self, port: u16) -> HostClient {
        HostClient::new(port)
            .with_host(self.host.clone())
            .with_timeout(self.timeout)
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            EXIT_FAILURE
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    EXIT_FAILURE
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Run `opdev --help` for usage."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();

    let color_mode = cli.color;
    let options = HostOptions {
        host: cli.host,
        timeout: Duration::from_millis(cli.timeout_ms),
        color: color_mode,
    };

    command_dispatch::dispatch_command(cli.command, &options)
        .map_err(add_transport_hint)
        .map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "opdev",
    version,
    about = "Build, deploy and hot-reload Openplanet plugins",
    long_about = None,
    after_help = r#"EXAMPLES
  $ opdev build --type folder --op tmnext        # copy ./src + info.toml into Plugins/<id>/
  $ opdev build --type op --op mp4               # zip into Plugins/<id>.op
  $ opdev reload --op tmnext                     # ask the host to reload ./ as a plugin
  $ opdev refresh --filter                       # stream a script refresh
  $ opdev call get_data_folder --op turbo        # raw request/response

NOTES
  - Ports: tmnext 30000, mp4 30001, turbo 30002, refresh 30005
  - On Linux the host's data folder is mapped into the Wine prefix
    (--wine-prefix, OPDEV_WINEPREFIX or WINEPREFIX)
  - RUST_LOG=debug shows wire activity on stderr"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "auto",
        value_enum,
        help = "Colorize console output: auto|always|never"
    )]
    color: ColorMode,
    #[arg(long, global = true, default_value = DEFAULT_HOST, help = "Host running the game")]
    host: String,
    #[arg(
        long = "timeout-ms",
        global = true,
        default_value_t = 3000,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Connect timeout and per-receive timeout in milliseconds"
    )]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Debug)]
struct TargetArgs {
    #[arg(
        long,
        value_enum,
        required_unless_present = "port",
        help = "Target game: tmnext|mp4|turbo"
    )]
    op: Option<HostTarget>,
    #[arg(long, help = "Override the API port of the target")]
    port: Option<u16>,
}

impl TargetArgs {
    fn port(&self) -> u16 {
        match (self.port, self.op) {
            (Some(port), _) => port,
            (None, Some(target)) => target.port(),
            (None, None) => HostTarget::Tmnext.port(),
        }
    }

    fn describe(&self) -> String {
        match self.op {
            Some(target) => format!("{} (port {})", target.name(), self.port()),
            None => format!("port {}", self.port()),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Package the plugin, deploy it and ask the host to reload it",
        after_help = r#"EXAMPLES
  $ opdev build --type folder --op tmnext
  $ opdev build --type op --op mp4 --dir ~/plugins/Dashboard

NOTES
  - The plugin id is the project directory name
  - Sources: <dir>/src and <dir>/info.toml; archives are kept in <dir>/dist"#
    )]
    Build {
        #[arg(long = "type", value_enum, help = "Deploy as a folder or an .op archive")]
        kind: PackageKind,
        #[command(flatten)]
        target: TargetArgs,
        #[arg(
            long,
            help = "Plugin project directory (default: current directory)",
            value_hint = ValueHint::DirPath
        )]
        dir: Option<PathBuf>,
        #[arg(
            long = "wine-prefix",
            help = "Wine prefix the game runs in (Linux)",
            value_hint = ValueHint::DirPath
        )]
        wine_prefix: Option<PathBuf>,
        #[arg(
            long = "log-wait-ms",
            default_value_t = 500,
            help = "How long to wait for the host log after reloading"
        )]
        log_wait_ms: u64,
        #[arg(long = "no-log", help = "Skip the host log report after reloading")]
        no_log: bool,
    },
    #[command(about = "Ask the host to reload an already deployed plugin")]
    Reload {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long, help = "Plugin id (default: current directory name)")]
        id: Option<String>,
        #[arg(
            long = "type",
            value_enum,
            default_value = "folder",
            help = "How the plugin is deployed"
        )]
        kind: PackageKind,
    },
    #[command(about = "Print the host's data folder and its local path")]
    DataFolder {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(
            long = "wine-prefix",
            help = "Wine prefix the game runs in (Linux)",
            value_hint = ValueHint::DirPath
        )]
        wine_prefix: Option<PathBuf>,
    },
    #[command(about = "Send one raw request and print the reply as JSON")]
    Call {
        #[arg(help = "Route name, e.g. get_data_folder")]
        route: String,
        #[arg(help = "Route data as a JSON object (default: {})")]
        data: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    #[command(
        about = "Trigger a script refresh and stream its progress",
        after_help = r#"EXAMPLES
  $ opdev refresh
  $ opdev refresh --extra --filter"#
    )]
    Refresh {
        #[arg(long, help = "Do the extra refresh pass")]
        extra: bool,
        #[arg(long, help = "Skip folders listed in .refreshignore")]
        filter: bool,
        #[arg(long, help = "Only refresh title scripts in the WorkTitles folder")]
        title: bool,
        #[arg(long, default_value_t = DEFAULT_REFRESH_PORT, help = "Refresh notification port")]
        port: u16,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error:").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn add_transport_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Framing | ErrorKind::Decode => err.with_hint(
            "The host sent a malformed reply. Check that the plugin and opdev versions match.",
        ),
        ErrorKind::Connection => {
            err.with_hint("Check that the game is running and --op/--port match its API port.")
        }
        _ => err,
    }
}

fn resolve_wine_prefix(flag: Option<PathBuf>) -> Option<PathBuf> {
    flag.or_else(wine_prefix_from_env)
}

/// Ask the host for its data folder and map it to a local path.
fn resolve_data_folder(
    client: &HostClient,
    wine_prefix: Option<&Path>,
) -> Result<(String, PathBuf), Error> {
    let response = client.try_send(&Request::get_data_folder())?;
    if !response.is_ok() {
        return Err(Error::new(ErrorKind::Protocol)
            .with_message(format!("host rejected get_data_folder: {}", response.error)));
    }
    if response.data.is_empty() {
        return Err(Error::new(ErrorKind::Protocol)
            .with_message("failed to get data folder from host")
            .with_hint("The host replied without a data folder; is the API plugin up to date?"));
    }
    let local = translate_host_path(&response.data, wine_prefix)?;
    Ok((response.data, local))
}

fn current_dir_name() -> Result<String, Error> {
    let dir = std::env::current_dir().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read current directory")
            .with_source(err)
    })?;
    dir.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("cannot derive a plugin id from the current directory")
                .with_hint("Pass --id explicitly.")
        })
}

/// Print a `{error, data}` reply the way the build flow reports it.
fn emit_response(response: &Response, color_mode: ColorMode) -> bool {
    if !response.error.is_empty() {
        eprintln!("{}", paint(&response.error, Tone::Red, color_mode.for_stderr()));
    }
    if !response.data.is_empty() {
        println!("{}", response.data);
    }
    response.is_ok()
}

fn emit_reload_report(report: &ReloadReport, color_mode: ColorMode) {
    if report.is_empty() {
        println!("No host log entries mention this plugin yet.");
        return;
    }
    let color = color_mode.for_stdout();
    for (marker, line) in &report.entries {
        let (label, tone) = match marker {
            LogMarker::Loaded => ("[LOADED]", Tone::Green),
            LogMarker::Unloaded => ("[UNLOAD]", Tone::Grey),
            LogMarker::CompileFailed => ("[COMPILE]", Tone::Red),
            LogMarker::Error => ("[ERR]", Tone::Red),
            LogMarker::Warning => ("[WARN]", Tone::Yellow),
            LogMarker::Info => ("[INFO]", Tone::Grey),
        };
        println!(" {} {line}", paint(label, tone, color));
    }
    if report.outcome() == ReloadOutcome::Unknown {
        println!("Host log does not confirm the reload yet.");
    }
}

fn emit_success(message: &str, color_mode: ColorMode) {
    println!("{}", paint(message, Tone::Green, color_mode.for_stdout()));
}

fn emit_failure(message: &str, color_mode: ColorMode) {
    eprintln!("{}", paint(message, Tone::Red, color_mode.for_stderr()));
}

fn emit_json(value: &Value) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Connection => "connection to host failed".to_string(),
        ErrorKind::Framing => "truncated frame from host".to_string(),
        ErrorKind::Decode => "undecodable reply from host".to_string(),
        ErrorKind::Protocol => "unexpected reply from host".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }
    json!({ "error": Value::Object(inner) })
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        paint("error:", Tone::Red, use_color),
        error_message(err)
    )];
    if let Some(hint) = err.hint() {
        lines.push(format!("{} {hint}", paint("hint:", Tone::Yellow, use_color)));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            paint("path:", Tone::Yellow, use_color),
            path.display()
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("{} {cause}", paint("caused by:", Tone::Yellow, use_color)));
    }
    lines.join("\n")
}
