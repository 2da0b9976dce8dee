//! Purpose: Hold top-level CLI command dispatch for `opdev`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Host-reported failures map to exit 1; transport failures surface as `Error`.
//! Invariants: Helpers in `main.rs` remain the source of output formatting.

use super::*;

use std::thread;

use clap::CommandFactory;
use opdev::api::{RefreshClient, RefreshCommand};
use opdev::console::ConsoleSink;
use opdev::host_log::{DEFAULT_TAIL_LINES, HOST_LOG_FILE, LogCursor};
use opdev::package::{PluginLayout, deploy};

const PLUGINS_DIR: &str = "Plugins";

pub(super) fn dispatch_command(
    command: Command,
    options: &HostOptions,
) -> Result<RunOutcome, Error> {
    let color_mode = options.color;
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "opdev", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Build {
            kind,
            target,
            dir,
            wine_prefix,
            log_wait_ms,
            no_log,
        } => {
            let layout = PluginLayout::from_dir(&dir.unwrap_or_else(|| PathBuf::from(".")))?;
            layout.ensure_manifest()?;

            let client = options.client(target.port());
            let wine_prefix = resolve_wine_prefix(wine_prefix);
            let (_, data_folder) = resolve_data_folder(&client, wine_prefix.as_deref())?;

            let host_log = data_folder.join(HOST_LOG_FILE);
            if !host_log.is_file() {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message(format!("{HOST_LOG_FILE} not found in the host data folder"))
                    .with_path(&host_log)
                    .with_hint("The data folder may be mapped wrong; check --wine-prefix."));
            }
            let plugins_dir = data_folder.join(PLUGINS_DIR);
            if !plugins_dir.is_dir() {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message("plugins directory not found in the host data folder")
                    .with_path(&plugins_dir));
            }
            println!("Using plugins directory: {}", plugins_dir.display());
            println!("Building {} as {}", layout.id(), kind.label());

            let deployment = deploy(&layout, kind, &plugins_dir)?;
            if let Some(removed) = &deployment.removed {
                println!("Removed existing deployment: {}", removed.display());
            }
            if let Some(archive) = &deployment.archive {
                println!("Packed {} files into {}", deployment.files, archive.display());
            }
            println!(
                "Deployed as {} to: {}",
                kind.label(),
                deployment.destination.display()
            );

            // Taken before the reload so only the host's reaction is reported.
            let cursor = if no_log {
                None
            } else {
                match LogCursor::at_end(&host_log) {
                    Ok(cursor) => Some(cursor),
                    Err(err) => {
                        tracing::warn!("host log unavailable: {}", err.describe());
                        None
                    }
                }
            };

            println!("Reloading plugin on {}...", target.describe());
            let response = client.load_plugin(layout.id(), kind.plugin_kind());
            if !emit_response(&response, color_mode) {
                emit_failure("Plugin reload failed.", color_mode);
                return Ok(RunOutcome::failure());
            }

            let mut reloaded = true;
            if let Some(cursor) = cursor {
                thread::sleep(Duration::from_millis(log_wait_ms));
                match cursor.read_recent(DEFAULT_TAIL_LINES) {
                    Ok(lines) => {
                        let report = ReloadReport::from_lines(&lines, layout.id());
                        emit_reload_report(&report, color_mode);
                        reloaded = report.outcome() != ReloadOutcome::Failed;
                    }
                    Err(err) => tracing::warn!("failed to read host log: {}", err.describe()),
                }
            }

            if reloaded {
                emit_success("Plugin reloaded successfully.", color_mode);
                println!("Build and deployment complete!");
                Ok(RunOutcome::ok())
            } else {
                emit_failure("Host log reports errors after reloading; see above.", color_mode);
                Ok(RunOutcome::failure())
            }
        }
        Command::Reload { target, id, kind } => {
            let id = match id {
                Some(id) => id,
                None => current_dir_name()?,
            };
            let client = options.client(target.port());
            println!("Reloading {id} on {}...", target.describe());
            let response = client.load_plugin(&id, kind.plugin_kind());
            let ok = emit_response(&response, color_mode);
            if ok {
                emit_success("Plugin reloaded successfully.", color_mode);
            }
            Ok(RunOutcome::from_success(ok))
        }
        Command::DataFolder {
            target,
            wine_prefix,
        } => {
            let client = options.client(target.port());
            let wine_prefix = resolve_wine_prefix(wine_prefix);
            let (raw, local) = resolve_data_folder(&client, wine_prefix.as_deref())?;
            println!("Host data folder: {raw}");
            println!("Local path: {}", local.display());
            Ok(RunOutcome::ok())
        }
        Command::Call {
            route,
            data,
            target,
        } => {
            let data = match data {
                Some(text) => serde_json::from_str::<Value>(&text).map_err(|err| {
                    Error::new(ErrorKind::Usage)
                        .with_message("route data is not valid JSON")
                        .with_hint("Pass a JSON object, e.g. '{\"id\": \"Dashboard\"}'.")
                        .with_source(err)
                })?,
                None => Value::Object(Map::new()),
            };
            let response = options.client(target.port()).call(&route, data);
            emit_json(&json!({
                "error": &response.error,
                "data": &response.data,
            }));
            Ok(RunOutcome::from_success(response.is_ok()))
        }
        Command::Refresh {
            extra,
            filter,
            title,
            port,
        } => {
            let command = RefreshCommand {
                extra,
                filter,
                title,
            };
            let succeeded = RefreshClient::new(port)
                .with_host(options.host.clone())
                .with_timeout(options.timeout)
                .run(command, ConsoleSink::stdio(color_mode));
            Ok(RunOutcome::from_success(succeeded))
        }
    }
}
