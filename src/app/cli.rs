use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::app::commands::{
    self, check_adb, extract_apk, get_package_info, host_session, kill_server, list_devices,
    list_packages, open_session, run_console_command, set_package_enabled, uninstall_package,
    ExtractRequest, PackageQuery,
};
use crate::app::config::AppConfig;
use crate::app::console::render_transcript;
use crate::app::error::AppError;
use crate::app::models::{CommandResponse, PackageOrigin};
use crate::app::state::AppState;

pub const USAGE: &str = "\
Usage: uninstall_without_root [--serial SERIAL] [--json] <command>

Commands:
  check                                 verify the adb binary
  devices                               list connected devices
  packages [--filter TEXT] [--origin user|system] [--disabled]
  info <package>                        version and update time
  uninstall <package> [--keep-data|--delete-data]
  enable <package>
  disable <package>
  extract <package> [--dest DIR]        pull the apk to the extraction dir
  exec <adb args...>                    run a raw adb command
  kill-server
  config show | config set <key> <value> | config reset
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    Show,
    Set { key: String, value: String },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Check,
    Devices,
    Packages {
        filter: Option<String>,
        origin: Option<PackageOrigin>,
        disabled_only: bool,
    },
    Info { package_name: String },
    Uninstall { package_name: String, keep_data: Option<bool> },
    SetEnabled { package_name: String, enable: bool },
    Extract { package_name: String, dest: Option<PathBuf> },
    Exec { args: Vec<String> },
    KillServer,
    Config(ConfigAction),
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub serial: Option<String>,
    pub json: bool,
    pub command: CliCommand,
}

fn take_value(it: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    it.next()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn take_package(rest: &mut impl Iterator<Item = String>, command: &str) -> Result<String, String> {
    rest.next()
        .filter(|value| !value.starts_with("--"))
        .ok_or_else(|| format!("{command} requires a package name"))
}

/// Parses everything after the program name. Global flags may appear before
/// the subcommand; `exec` passes the rest through untouched.
pub fn parse_args<I>(args: I) -> Result<Cli, String>
where
    I: IntoIterator<Item = String>,
{
    let mut serial = None;
    let mut json = false;
    let mut it = args.into_iter();

    let command = loop {
        let Some(arg) = it.next() else {
            return Err(USAGE.to_string());
        };
        match arg.as_str() {
            "--serial" | "-s" => serial = Some(take_value(&mut it, "--serial")?),
            "--json" => json = true,
            "-h" | "--help" | "help" => {
                return Ok(Cli {
                    serial,
                    json,
                    command: CliCommand::Help,
                })
            }
            other if other.starts_with('-') => return Err(format!("Unknown arg: {other}")),
            other => break other.to_string(),
        }
    };

    let command = match command.as_str() {
        "check" => CliCommand::Check,
        "devices" => CliCommand::Devices,
        "packages" => {
            let mut filter = None;
            let mut origin = None;
            let mut disabled_only = false;
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--filter" => filter = Some(take_value(&mut it, "--filter")?),
                    "--origin" => {
                        origin = Some(take_value(&mut it, "--origin")?.parse::<PackageOrigin>()?)
                    }
                    "--disabled" => disabled_only = true,
                    "--json" => json = true,
                    other => return Err(format!("Unknown arg: {other}")),
                }
            }
            CliCommand::Packages {
                filter,
                origin,
                disabled_only,
            }
        }
        "info" => CliCommand::Info {
            package_name: take_package(&mut it, "info")?,
        },
        "uninstall" => {
            let package_name = take_package(&mut it, "uninstall")?;
            let mut keep_data = None;
            for arg in it.by_ref() {
                match arg.as_str() {
                    "--keep-data" => keep_data = Some(true),
                    "--delete-data" => keep_data = Some(false),
                    "--json" => json = true,
                    other => return Err(format!("Unknown arg: {other}")),
                }
            }
            CliCommand::Uninstall {
                package_name,
                keep_data,
            }
        }
        "enable" | "disable" => CliCommand::SetEnabled {
            package_name: take_package(&mut it, &command)?,
            enable: command == "enable",
        },
        "extract" => {
            let package_name = take_package(&mut it, "extract")?;
            let mut dest = None;
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "--dest" => dest = Some(PathBuf::from(take_value(&mut it, "--dest")?)),
                    "--json" => json = true,
                    other => return Err(format!("Unknown arg: {other}")),
                }
            }
            CliCommand::Extract { package_name, dest }
        }
        "exec" => {
            let args: Vec<String> = it.by_ref().collect();
            if args.is_empty() {
                return Err("exec requires an adb command".to_string());
            }
            CliCommand::Exec { args }
        }
        "kill-server" => CliCommand::KillServer,
        "config" => match it.next().as_deref() {
            None | Some("show") => CliCommand::Config(ConfigAction::Show),
            Some("reset") => CliCommand::Config(ConfigAction::Reset),
            Some("set") => {
                let key = it.next().ok_or("config set requires a key")?;
                let value = it.next().ok_or("config set requires a value")?;
                CliCommand::Config(ConfigAction::Set { key, value })
            }
            Some(other) => return Err(format!("Unknown config action: {other}")),
        },
        other => return Err(format!("Unknown command: {other}\n\n{USAGE}")),
    };

    // `--json` is accepted after any subcommand, not only before it.
    for extra in it {
        match extra.as_str() {
            "--json" => json = true,
            other => return Err(format!("Unexpected arg: {other}")),
        }
    }
    Ok(Cli {
        serial,
        json,
        command,
    })
}

fn emit<T: Serialize>(
    json: bool,
    response: CommandResponse<T>,
    text: impl FnOnce(&T) -> String,
) -> i32 {
    if json {
        match serde_json::to_string_pretty(&response) {
            Ok(body) => println!("{body}"),
            Err(err) => {
                eprintln!("Failed to serialize output: {err}");
                return 1;
            }
        }
    } else {
        let body = text(&response.data);
        if !body.is_empty() {
            println!("{body}");
        }
    }
    0
}

fn report_error(json: bool, err: &AppError) -> i32 {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(err).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        eprintln!("{err}\ntrace_id: {}", err.trace_id);
    }
    1
}

/// Runs one parsed command and returns the process exit code.
pub fn execute(cli: Cli, config: &AppConfig, state: &AppState) -> i32 {
    let trace_id = Uuid::new_v4().to_string();
    match dispatch(&cli, config, state, trace_id) {
        Ok(code) => code,
        Err(err) => report_error(cli.json, &err),
    }
}

fn dispatch(
    cli: &Cli,
    config: &AppConfig,
    state: &AppState,
    trace_id: String,
) -> Result<i32, AppError> {
    let json = cli.json;
    let device_session = |trace_id: &str| {
        open_session(config, cli.serial.clone(), Some(trace_id.to_string())).map(|r| r.data)
    };

    let code = match &cli.command {
        CliCommand::Help => {
            print!("{USAGE}");
            0
        }
        CliCommand::Check => {
            let response = check_adb(config, Some(trace_id));
            let available = response.data.available;
            emit(json, response, |info| match &info.error {
                None => format!(
                    "adb {} ({})",
                    info.version.as_deref().unwrap_or("?"),
                    info.command_path
                ),
                Some(error) => format!("adb unavailable ({}): {error}", info.command_path),
            });
            if available {
                0
            } else {
                1
            }
        }
        CliCommand::Devices => {
            let host = host_session(config, &trace_id)?;
            emit(json, list_devices(&host, Some(trace_id))?, |devices| {
                if devices.is_empty() {
                    return "No devices connected".to_string();
                }
                devices
                    .iter()
                    .map(|device| {
                        format!(
                            "{}\t{}\t{}",
                            device.id,
                            device.status,
                            device.model.as_deref().unwrap_or("-")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        CliCommand::Packages {
            filter,
            origin,
            disabled_only,
        } => {
            let session = device_session(&trace_id)?;
            let query = PackageQuery {
                filter: filter.clone(),
                origin: *origin,
                disabled_only: *disabled_only,
            };
            emit(json, list_packages(&session, query, Some(trace_id))?, |items| {
                items
                    .iter()
                    .map(|item| {
                        format!(
                            "{}\t{}\t{}",
                            item.package.package_name,
                            item.package.origin.as_str(),
                            if item.enabled { "enabled" } else { "disabled" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        CliCommand::Info { package_name } => {
            let session = device_session(&trace_id)?;
            let response = get_package_info(&session, package_name.clone(), Some(trace_id))?;
            emit(json, response, |info| {
                format!(
                    "package: {}\nversion: {} ({})\nupdated: {}\nenabled: {}",
                    info.package_name,
                    info.version_name,
                    info.version_code,
                    info.last_update_time,
                    info.enabled
                )
            })
        }
        CliCommand::Uninstall {
            package_name,
            keep_data,
        } => {
            let session = device_session(&trace_id)?;
            let keep_data = keep_data.unwrap_or(!config.delete_data);
            let package_name = package_name.clone();
            let response =
                uninstall_package(state, &session, package_name, keep_data, Some(trace_id))?;
            action_outcome(json, response)
        }
        CliCommand::SetEnabled {
            package_name,
            enable,
        } => {
            let session = device_session(&trace_id)?;
            let package_name = package_name.clone();
            let response =
                set_package_enabled(state, &session, package_name, *enable, Some(trace_id))?;
            action_outcome(json, response)
        }
        CliCommand::Extract { package_name, dest } => {
            let session = device_session(&trace_id)?;
            let request = ExtractRequest {
                package_name: package_name.clone(),
                apk_path: None,
                dest: dest.clone(),
            };
            let response = extract_apk(state, &session, config, request, Some(trace_id))?;
            emit(json, response, |report| {
                let mut lines = report.final_paths.clone();
                if let Some(apk) = &report.apk {
                    if !apk.has_manifest {
                        lines.push(format!(
                            "warning: {}",
                            apk.error.as_deref().unwrap_or("no AndroidManifest.xml in archive")
                        ));
                    }
                }
                lines.join("\n")
            })
        }
        CliCommand::Exec { args } => {
            let session = match &cli.serial {
                Some(serial) => host_session(config, &trace_id)?.with_serial(serial.clone()),
                None => host_session(config, &trace_id)?,
            };
            let response = run_console_command(state, &session, args.join(" "), Some(trace_id))?;
            let failed = response
                .data
                .as_ref()
                .map_or(false, |result| result.exit_code != Some(0));
            emit(json, response, |result| match result {
                Some(result) => {
                    if result.stderr.trim().is_empty() {
                        result.stdout.trim_end().to_string()
                    } else {
                        format!("{}\n{}", result.stdout.trim_end(), result.stderr.trim_end())
                            .trim()
                            .to_string()
                    }
                }
                None => String::new(),
            });
            if let Some(transcript) = debug_transcript(state, config) {
                eprint!("{transcript}");
            }
            if failed {
                1
            } else {
                0
            }
        }
        CliCommand::KillServer => {
            let host = host_session(config, &trace_id)?;
            emit(json, kill_server(&host, Some(trace_id))?, |stopped| {
                if *stopped {
                    "adb server stopped".to_string()
                } else {
                    "adb server was not running".to_string()
                }
            })
        }
        CliCommand::Config(action) => {
            let response = match action {
                ConfigAction::Show => commands::get_config(Some(trace_id))?,
                ConfigAction::Set { key, value } => {
                    commands::set_config_value(key.clone(), value.clone(), Some(trace_id))?
                }
                ConfigAction::Reset => commands::reset_config(Some(trace_id))?,
            };
            emit(json, response, |config| {
                serde_json::to_string_pretty(config).unwrap_or_default()
            })
        }
    };
    Ok(code)
}

/// The console transcript of this run, shown on stderr when debug mode is on.
fn debug_transcript(state: &AppState, config: &AppConfig) -> Option<String> {
    if !config.debug_mode {
        return None;
    }
    let log = state.console.lock().ok()?;
    if log.is_empty() {
        return None;
    }
    Some(render_transcript(&log.entries()))
}

fn action_outcome(
    json: bool,
    response: CommandResponse<crate::app::models::PackageActionResult>,
) -> i32 {
    let success = response.data.success;
    emit(json, response, |result| {
        let status = if result.success { "ok" } else { "failed" };
        format!(
            "{} {}: {status}\n{}",
            result.action,
            result.package_name,
            result.output.trim()
        )
    });
    if success {
        0
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::console::ConsoleKind;

    fn parse(args: &[&str]) -> Result<Cli, String> {
        parse_args(args.iter().map(|value| value.to_string()))
    }

    #[test]
    fn parses_global_flags_before_command() {
        let cli = parse(&["--serial", "ABC", "--json", "devices"]).unwrap();
        assert_eq!(cli.serial.as_deref(), Some("ABC"));
        assert!(cli.json);
        assert_eq!(cli.command, CliCommand::Devices);
    }

    #[test]
    fn parses_package_filters() {
        let args = ["packages", "--filter", "goo", "--origin", "system", "--disabled"];
        let cli = parse(&args).unwrap();
        assert_eq!(
            cli.command,
            CliCommand::Packages {
                filter: Some("goo".to_string()),
                origin: Some(PackageOrigin::System),
                disabled_only: true,
            }
        );
        assert!(parse(&["packages", "--origin", "vendor"]).is_err());
    }

    #[test]
    fn uninstall_keep_data_is_optional() {
        let cli = parse(&["uninstall", "com.foo"]).unwrap();
        assert_eq!(
            cli.command,
            CliCommand::Uninstall {
                package_name: "com.foo".to_string(),
                keep_data: None
            }
        );
        let cli = parse(&["uninstall", "com.foo", "--delete-data"]).unwrap();
        assert!(matches!(
            cli.command,
            CliCommand::Uninstall {
                keep_data: Some(false),
                ..
            }
        ));
        assert!(parse(&["uninstall"]).is_err());
        assert!(parse(&["uninstall", "--keep-data"]).is_err());
    }

    #[test]
    fn json_flag_trails_any_command() {
        let cli = parse(&["info", "com.foo", "--json"]).unwrap();
        assert!(cli.json);
        assert_eq!(
            cli.command,
            CliCommand::Info {
                package_name: "com.foo".to_string()
            }
        );
        for action in ["enable", "disable"] {
            let cli = parse(&[action, "com.foo", "--json"]).unwrap();
            assert!(cli.json);
            assert_eq!(
                cli.command,
                CliCommand::SetEnabled {
                    package_name: "com.foo".to_string(),
                    enable: action == "enable",
                }
            );
        }
        assert!(parse(&["devices", "--json"]).unwrap().json);
        assert!(parse(&["kill-server", "--json"]).unwrap().json);
        assert_eq!(
            parse(&["info", "com.foo", "--verbose"]).unwrap_err(),
            "Unexpected arg: --verbose"
        );
    }

    #[test]
    fn transcript_is_shown_only_in_debug_mode() {
        let state = AppState::new();
        let mut config = AppConfig::default();
        assert_eq!(debug_transcript(&state, &config), None);

        config.debug_mode = true;
        assert_eq!(debug_transcript(&state, &config), None);

        state
            .console
            .lock()
            .unwrap()
            .push(ConsoleKind::Command, "adb version");
        let text = debug_transcript(&state, &config).unwrap();
        assert!(text.contains("command  adb version"));

        config.debug_mode = false;
        assert_eq!(debug_transcript(&state, &config), None);
    }

    #[test]
    fn exec_passes_arguments_through() {
        let cli = parse(&["-s", "X", "exec", "shell", "ls", "--help"]).unwrap();
        assert_eq!(
            cli.command,
            CliCommand::Exec {
                args: vec!["shell".to_string(), "ls".to_string(), "--help".to_string()]
            }
        );
        assert!(parse(&["exec"]).is_err());
    }

    #[test]
    fn parses_config_actions() {
        assert_eq!(
            parse(&["config"]).unwrap().command,
            CliCommand::Config(ConfigAction::Show)
        );
        assert_eq!(
            parse(&["config", "set", "delete_data", "true"]).unwrap().command,
            CliCommand::Config(ConfigAction::Set {
                key: "delete_data".to_string(),
                value: "true".to_string()
            })
        );
        assert!(parse(&["config", "set", "delete_data"]).is_err());
        assert!(parse(&["config", "purge"]).is_err());
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--verbose", "devices"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
        assert!(parse(&["devices", "extra"]).is_err());
        assert!(parse(&["--serial"]).is_err());
        assert_eq!(parse(&["--help"]).unwrap().command, CliCommand::Help);
    }
}
