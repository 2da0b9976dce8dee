//! Purpose: Standalone `op-refresh` tool that streams one script refresh from the host.
//! Role: Thin CLI over `api::RefreshClient` for editor hooks and task runners.
//! Invariants: Exit code is 0 iff the host reported `success` before closing the stream.
//! Invariants: Progress goes to stdout; error and abort lines go to stderr.
use std::io;
use std::time::Duration;

use clap::Parser;
use opdev::api::{EXIT_FAILURE, RefreshClient, RefreshCommand};
use opdev::console::{ColorMode, ConsoleSink};
use opdev::targets::{DEFAULT_HOST, DEFAULT_REFRESH_PORT};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "op-refresh",
    version,
    about = "Trigger a script refresh in the running game and stream its progress"
)]
struct Cli {
    #[arg(long, help = "Do the extra refresh pass")]
    extra: bool,
    #[arg(long, help = "Skip folders listed in .refreshignore")]
    filter: bool,
    #[arg(long, help = "Only refresh title scripts in the WorkTitles folder")]
    title: bool,
    #[arg(long, default_value = DEFAULT_HOST, help = "Host running the game")]
    host: String,
    #[arg(long, default_value_t = DEFAULT_REFRESH_PORT, help = "Refresh notification port")]
    port: u16,
    #[arg(
        long = "timeout-ms",
        default_value_t = 3000,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Connect timeout and per-receive timeout in milliseconds"
    )]
    timeout_ms: u64,
    #[arg(long, default_value = "auto", value_enum, help = "Colorize output: auto|always|never")]
    color: ColorMode,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() { EXIT_FAILURE } else { 0 };
            std::process::exit(code);
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();

    let command = RefreshCommand {
        extra: cli.extra,
        filter: cli.filter,
        title: cli.title,
    };
    let succeeded = RefreshClient::new(cli.port)
        .with_host(cli.host)
        .with_timeout(Duration::from_millis(cli.timeout_ms))
        .run(command, ConsoleSink::stdio(cli.color));
    std::process::exit(if succeeded { 0 } else { EXIT_FAILURE });
}
