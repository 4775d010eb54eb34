use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use uuid::Uuid;

use crate::app::adb::apps::{
    disable_succeeded, enable_succeeded, filter_packages, join_enabled, parse_disabled_packages,
    parse_package_info, parse_pm_list_packages_output, parse_pm_path_output, uninstall_succeeded,
};
use crate::app::adb::locator::{ensure_executable, resolve_adb_program, validate_adb_program};
use crate::app::adb::parse::{parse_adb_devices, parse_adb_version, parse_getprop_value};
use crate::app::adb::paths::{resolve_extract_dir, validate_device_path, validate_package_name};
use crate::app::adb::session::AdbSession;
use crate::app::config::{self, AppConfig, ExtractionSettings};
use crate::app::console::{error_display_line, prepare_console_command, ConsoleAction, ConsoleKind};
use crate::app::error::AppError;
use crate::app::extraction::poller::file_exists;
use crate::app::extraction::workspace::TempWorkspace;
use crate::app::extraction::{plan_extraction, run_extraction};
use crate::app::models::{
    AdbInfo, AppPackage, CommandResponse, CommandResult, DeviceInfo, ExtractionReport,
    PackageActionResult, PackageInfo, PackageOrigin, UNKNOWN,
};
use crate::app::state::AppState;


pub const SERIAL_ENV: &str = "ANDROID_SERIAL";

fn resolve_trace_id(input: Option<String>) -> String {
    input
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn ensure_non_empty(value: &str, field: &str, trace_id: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(
            format!("{field} is required"),
            trace_id,
        ));
    }
    Ok(())
}

fn ensure_package_name(value: &str, trace_id: &str) -> Result<(), AppError> {
    ensure_non_empty(value, "package_name", trace_id)?;
    validate_package_name(value).map_err(|message| AppError::validation(message, trace_id))
}

fn bundle_base() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Resolves and validates the adb binary for `config`.
pub fn get_adb_program(config: &AppConfig, trace_id: &str) -> Result<String, AppError> {
    let program = resolve_adb_program(&config.adb.command_path, bundle_base().as_deref());
    if let Err(message) = validate_adb_program(&program) {
        return Err(AppError::validation(message, trace_id));
    }
    if let Err(message) = ensure_executable(&program) {
        warn!(
            trace_id = %trace_id,
            program = %program,
            error = %message,
            "could not mark adb executable"
        );
    }
    Ok(program)
}

/// Session without a device, for host commands and device discovery.
pub fn host_session(config: &AppConfig, trace_id: &str) -> Result<AdbSession, AppError> {
    Ok(AdbSession::new(get_adb_program(config, trace_id)?).with_timeout(config.command_timeout()))
}

pub fn get_config(trace_id: Option<String>) -> Result<CommandResponse<AppConfig>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let config = config::load_config(&trace_id)?;
    Ok(CommandResponse {
        trace_id,
        data: config,
    })
}

pub fn set_config_value(
    key: String,
    value: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<AppConfig>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_non_empty(&key, "key", &trace_id)?;
    let current = config::load_config(&trace_id)?;
    let updated = config::set_config_value(current, key.trim(), &value)
        .map_err(|message| AppError::validation(message, &trace_id))?;
    config::save_config(&updated, &trace_id)?;
    info!(trace_id = %trace_id, key = %key, "config updated");
    Ok(CommandResponse {
        trace_id,
        data: updated,
    })
}

pub fn reset_config(trace_id: Option<String>) -> Result<CommandResponse<AppConfig>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let config = config::reset_config(&trace_id)?;
    Ok(CommandResponse {
        trace_id,
        data: config,
    })
}

/// Never fails: an unusable adb is reported through `available` and `error`.
pub fn check_adb(config: &AppConfig, trace_id: Option<String>) -> CommandResponse<AdbInfo> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "check_adb");

    let session = match host_session(config, &trace_id) {
        Ok(session) => session,
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err.error, "adb validation failed");
            return CommandResponse {
                trace_id,
                data: AdbInfo {
                    available: false,
                    version: None,
                    version_output: String::new(),
                    command_path: config.adb.command_path.clone(),
                    error: Some(err.error),
                },
            };
        }
    };

    let data = match session.execute(&["version"], &trace_id) {
        Ok(output) => {
            let available = output.success();
            let error = if available {
                None
            } else if output.stderr.trim().is_empty() {
                Some("ADB command returned a non-zero exit code".to_string())
            } else {
                Some(output.stderr.trim().to_string())
            };
            AdbInfo {
                available,
                version: parse_adb_version(&output.stdout),
                version_output: output.combined(),
                command_path: session.program.clone(),
                error,
            }
        }
        Err(err) => {
            warn!(trace_id = %trace_id, error = %err.error, "adb check failed");
            AdbInfo {
                available: false,
                version: None,
                version_output: String::new(),
                command_path: session.program.clone(),
                error: Some(err.error),
            }
        }
    };
    CommandResponse { trace_id, data }
}

/// `adb devices`, plus the model name of every device that is ready.
///
/// Output without the header means adb itself is unusable and is reported as
/// `ERR_ADB_UNAVAILABLE`, distinct from an empty device list.
pub fn list_devices(
    session: &AdbSession,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<DeviceInfo>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, "list_devices");

    let host = session.host();
    let output = host.execute(&["devices"], &trace_id)?;
    let Some(devices) = parse_adb_devices(&output.stdout) else {
        let detail = output.combined();
        warn!(trace_id = %trace_id, output = %detail, "adb devices returned no header");
        return Err(AppError::adb_unavailable(
            if detail.is_empty() {
                "adb did not report a device list".to_string()
            } else {
                format!("adb did not report a device list: {}", error_display_line(&detail))
            },
            &trace_id,
        ));
    };

    let data = devices
        .into_iter()
        .map(|device| {
            let model = if device.is_ready() {
                Some(read_model(&host, &device.id, &trace_id))
            } else {
                None
            };
            DeviceInfo {
                id: device.id,
                status: device.status,
                model,
            }
        })
        .collect();
    Ok(CommandResponse { trace_id, data })
}

fn read_model(host: &AdbSession, serial: &str, trace_id: &str) -> String {
    let session = host.clone().with_serial(serial);
    match session.run(&["shell", "getprop", "ro.product.model"], trace_id) {
        Ok(stdout) => parse_getprop_value(&stdout).unwrap_or_else(|| UNKNOWN.to_string()),
        Err(err) => {
            warn!(
                trace_id = %trace_id,
                serial = %serial,
                error = %err.error,
                "failed to read device model"
            );
            UNKNOWN.to_string()
        }
    }
}

/// Picks the device to work with: the requested serial if it is listed, or
/// the only ready device when nothing was requested.
pub fn select_device(
    devices: &[DeviceInfo],
    requested: Option<&str>,
    trace_id: &str,
) -> Result<String, AppError> {
    if let Some(serial) = requested.map(str::trim).filter(|value| !value.is_empty()) {
        return match devices.iter().find(|device| device.id == serial) {
            Some(device) if device.status == "device" => Ok(device.id.clone()),
            Some(device) => Err(AppError::validation(
                format!("Device {serial} is {}", device.status),
                trace_id,
            )),
            None => Err(AppError::validation(
                format!("Device {serial} is not connected"),
                trace_id,
            )),
        };
    }

    let ready: Vec<&DeviceInfo> = devices
        .iter()
        .filter(|device| device.status == "device")
        .collect();
    match ready.as_slice() {
        [] => Err(AppError::validation("No ready device connected", trace_id)),
        [only] => Ok(only.id.clone()),
        many => {
            let choices = many
                .iter()
                .map(|device| {
                    format!(
                        "{} ({})",
                        device.id,
                        device.model.as_deref().unwrap_or(UNKNOWN)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            Err(AppError::validation(
                format!("Several devices connected, choose one with --serial: {choices}"),
                trace_id,
            ))
        }
    }
}

/// Builds the session every device command runs in. `requested` falls back
/// to `ANDROID_SERIAL`.
pub fn open_session(
    config: &AppConfig,
    requested: Option<String>,
    trace_id: Option<String>,
) -> Result<CommandResponse<AdbSession>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let host = host_session(config, &trace_id)?;
    let requested = requested.or_else(|| std::env::var(SERIAL_ENV).ok());
    let devices = list_devices(&host, Some(trace_id.clone()))?.data;
    let serial = select_device(&devices, requested.as_deref(), &trace_id)?;
    info!(trace_id = %trace_id, serial = %serial, "device selected");
    Ok(CommandResponse {
        trace_id,
        data: host.with_serial(serial),
    })
}

#[derive(Debug, Clone, Default)]
pub struct PackageQuery {
    pub filter: Option<String>,
    pub origin: Option<PackageOrigin>,
    pub disabled_only: bool,
}

fn load_disabled(session: &AdbSession, trace_id: &str) -> BTreeSet<String> {
    match session.run(&["shell", "pm", "list", "packages", "-d"], trace_id) {
        Ok(stdout) => parse_disabled_packages(&stdout),
        Err(err) => {
            warn!(
                trace_id = %trace_id,
                error = %err.error,
                "failed to list disabled packages, treating all as enabled"
            );
            BTreeSet::new()
        }
    }
}

pub fn list_packages(
    session: &AdbSession,
    query: PackageQuery,
    trace_id: Option<String>,
) -> Result<CommandResponse<Vec<AppPackage>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    info!(trace_id = %trace_id, serial = ?session.serial, "list_packages");

    let stdout = session.run(&["shell", "pm", "list", "packages", "-f"], &trace_id)?;
    let packages = parse_pm_list_packages_output(&stdout);
    let disabled = load_disabled(session, &trace_id);
    let mut items = filter_packages(
        join_enabled(packages, &disabled),
        query.filter.as_deref(),
        query.origin,
    );
    if query.disabled_only {
        items.retain(|item| !item.enabled);
    }
    Ok(CommandResponse {
        trace_id,
        data: items,
    })
}

/// Degrades to an all-"unknown" record when dumpsys fails.
pub fn get_package_info(
    session: &AdbSession,
    package_name: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<PackageInfo>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_package_name(&package_name, &trace_id)?;

    let dumpsys = ["shell", "dumpsys", "package", package_name.as_str()];
    let data = match session.run(&dumpsys, &trace_id) {
        Ok(dump) => {
            let disabled = load_disabled(session, &trace_id);
            parse_package_info(&package_name, &dump, &disabled)
        }
        Err(err) => {
            warn!(
                trace_id = %trace_id,
                package_name = %package_name,
                error = %err.error,
                "dumpsys failed"
            );
            PackageInfo::unknown(&package_name)
        }
    };
    Ok(CommandResponse { trace_id, data })
}

/// Single attempt; success is the `Success` marker in the output.
pub fn uninstall_package(
    state: &AppState,
    session: &AdbSession,
    package_name: String,
    keep_data: bool,
    trace_id: Option<String>,
) -> Result<CommandResponse<PackageActionResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_package_name(&package_name, &trace_id)?;
    let _guard = state.locks.try_acquire(session.device_key(), &trace_id)?;

    let mut tail = vec!["shell", "pm", "uninstall", "--user", "0"];
    if keep_data {
        tail.push("-k");
    }
    tail.push(package_name.as_str());
    let output = session.execute(&tail, &trace_id)?;
    let text = output.combined();
    let success = uninstall_succeeded(&text);
    info!(trace_id = %trace_id, package_name = %package_name, keep_data, success, "uninstall");

    Ok(CommandResponse {
        trace_id,
        data: PackageActionResult {
            package_name,
            action: "uninstall".to_string(),
            success,
            output: text,
        },
    })
}

pub fn set_package_enabled(
    state: &AppState,
    session: &AdbSession,
    package_name: String,
    enable: bool,
    trace_id: Option<String>,
) -> Result<CommandResponse<PackageActionResult>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_package_name(&package_name, &trace_id)?;
    let _guard = state.locks.try_acquire(session.device_key(), &trace_id)?;

    let verb = if enable { "enable" } else { "disable-user" };
    let output = session.execute(
        &["shell", "pm", verb, "--user", "0", package_name.as_str()],
        &trace_id,
    )?;
    let text = output.combined();
    let success = if enable {
        enable_succeeded(&text)
    } else {
        disable_succeeded(&text)
    };
    info!(
        trace_id = %trace_id,
        package_name = %package_name,
        enable,
        success,
        "set_package_enabled"
    );

    Ok(CommandResponse {
        trace_id,
        data: PackageActionResult {
            package_name,
            action: if enable { "enable" } else { "disable" }.to_string(),
            success,
            output: text,
        },
    })
}

/// Device path of a package's apk, via `pm path`.
pub fn resolve_apk_path(
    session: &AdbSession,
    package_name: &str,
    trace_id: &str,
) -> Result<String, AppError> {
    let stdout = session.run(&["shell", "pm", "path", package_name], trace_id)?;
    parse_pm_path_output(&stdout).ok_or_else(|| {
        AppError::not_found(format!("No apk path reported for {package_name}"), trace_id)
    })
}

pub struct ExtractRequest {
    pub package_name: String,
    /// Known device path from the package list; resolved with `pm path` when empty.
    pub apk_path: Option<String>,
    /// Overrides the configured extraction dir.
    pub dest: Option<PathBuf>,
}

pub fn extract_apk(
    state: &AppState,
    session: &AdbSession,
    config: &AppConfig,
    request: ExtractRequest,
    trace_id: Option<String>,
) -> Result<CommandResponse<ExtractionReport>, AppError> {
    let data_dir = config::data_dir();
    let workspace = TempWorkspace::new(config::temp_dir());
    let final_dir = match request.dest.as_deref() {
        Some(dest) => dest.to_path_buf(),
        None => resolve_extract_dir(&config.extract_path, &data_dir),
    };
    extract_apk_with(
        state,
        session,
        request,
        &workspace,
        &final_dir,
        &config.extraction,
        trace_id,
    )
}

/// Extraction against explicit directories; [`extract_apk`] fills them in
/// from the config. The pull runs under `settings.pull_timeout()`, not the
/// session's command timeout.
pub fn extract_apk_with(
    state: &AppState,
    session: &AdbSession,
    request: ExtractRequest,
    workspace: &TempWorkspace,
    final_dir: &Path,
    settings: &ExtractionSettings,
    trace_id: Option<String>,
) -> Result<CommandResponse<ExtractionReport>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    ensure_package_name(&request.package_name, &trace_id)?;
    let _guard = state.locks.try_acquire(session.device_key(), &trace_id)?;

    let source_path = match request.apk_path.filter(|path| !path.trim().is_empty()) {
        Some(path) => path,
        None => resolve_apk_path(session, &request.package_name, &trace_id)?,
    };
    validate_device_path(&source_path)
        .map_err(|message| AppError::validation(message, &trace_id))?;

    let job = plan_extraction(&request.package_name, &source_path, workspace, final_dir);
    let pull_session = session.clone().with_timeout(settings.pull_timeout());
    let report = run_extraction(
        &job,
        workspace,
        settings.poll_settings(),
        &trace_id,
        |source, target| {
            let target = target.to_string_lossy().to_string();
            pull_session.execute(&["pull", source, target.as_str()], &trace_id)
        },
        file_exists,
        std::thread::sleep,
    )?;
    Ok(CommandResponse {
        trace_id,
        data: report,
    })
}

/// One line typed into the debug console. Every step is appended to the
/// transcript in `state`.
pub fn run_console_command(
    state: &AppState,
    session: &AdbSession,
    input: String,
    trace_id: Option<String>,
) -> Result<CommandResponse<Option<CommandResult>>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let record = |kind: ConsoleKind, text: String| {
        if let Ok(mut log) = state.console.lock() {
            log.push(kind, text);
        }
    };

    let args = match prepare_console_command(&input) {
        ConsoleAction::Clear => {
            if let Ok(mut log) = state.console.lock() {
                log.clear();
            }
            return Ok(CommandResponse {
                trace_id,
                data: None,
            });
        }
        ConsoleAction::Unsupported(message) => {
            record(ConsoleKind::Info, message.clone());
            return Err(AppError::validation(message, &trace_id));
        }
        ConsoleAction::Run(args) => args,
    };

    record(ConsoleKind::Command, format!("adb {}", args.join(" ")));
    let output = match session.execute(&args, &trace_id) {
        Ok(output) => output,
        Err(err) => {
            record(ConsoleKind::Error, error_display_line(&err.error));
            return Err(err);
        }
    };
    if output.success() {
        let stdout = output.stdout.trim_end();
        if stdout.is_empty() {
            record(ConsoleKind::Success, "Command completed".to_string());
        } else {
            record(ConsoleKind::Response, stdout.to_string());
        }
    } else {
        record(ConsoleKind::Error, error_display_line(&output.combined()));
    }

    Ok(CommandResponse {
        trace_id,
        data: Some(CommandResult {
            serial: session.serial.clone(),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
        }),
    })
}

/// Stops the adb server, as done when the app quits.
pub fn kill_server(
    session: &AdbSession,
    trace_id: Option<String>,
) -> Result<CommandResponse<bool>, AppError> {
    let trace_id = resolve_trace_id(trace_id);
    let output = session.host().execute(&["kill-server"], &trace_id)?;
    info!(trace_id = %trace_id, exit_code = ?output.exit_code, "kill-server");
    Ok(CommandResponse {
        trace_id,
        data: output.success(),
    })
}
