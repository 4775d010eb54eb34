use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use uninstall_without_root_lib::app::commands::{
    check_adb, extract_apk, get_package_info, list_packages, open_session, ExtractRequest,
    PackageQuery,
};
use uninstall_without_root_lib::app::config::load_config;
use uninstall_without_root_lib::app::models::PackageOrigin;
use uninstall_without_root_lib::app::state::AppState;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Args {
    serial: Option<String>,
    out_dir: Option<PathBuf>,
    json: bool,
    extract: bool,
    package: Option<String>,
}

#[derive(Serialize)]
struct SmokeSummary {
    tool: &'static str,
    status: &'static str,
    trace_id: String,
    serial: Option<String>,
    adb_program: Option<String>,
    out_dir: String,
    checks: Vec<SmokeCheck>,
}

#[derive(Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: &'static str, // pass|fail|skip
    duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut serial = None;
    let mut out_dir: Option<PathBuf> = None;
    let mut json = false;
    let mut extract = false;
    let mut package: Option<String> = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--serial" => {
                serial = it
                    .next()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty());
                if serial.is_none() {
                    return Err("--serial requires a value".to_string());
                }
            }
            "--out" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--out requires a value".to_string())?;
                out_dir = Some(PathBuf::from(value));
            }
            "--json" => {
                json = true;
            }
            "--extract" => {
                extract = true;
            }
            "--package" => {
                let value = it
                    .next()
                    .ok_or_else(|| "--package requires a value".to_string())?;
                package = Some(value);
            }
            "-h" | "--help" => {
                return Err(
                    "Usage: cargo run --bin smoke -- [--serial SERIAL] [--out DIR] [--json] \
                     [--package PKG] [--extract]\n"
                        .to_string(),
                );
            }
            other => return Err(format!("Unknown arg: {other}")),
        }
    }

    Ok(Args {
        serial,
        out_dir,
        json,
        extract,
        package,
    })
}

fn ensure_dir(path: &Path) -> Result<(), String> {
    fs::create_dir_all(path)
        .map_err(|err| format!("Failed to create dir {}: {err}", path.display()))
}

/// Runs one check and records it. `Err` carries `(code, message)`.
fn run_check<T, F>(checks: &mut Vec<SmokeCheck>, name: &'static str, f: F) -> Option<T>
where
    F: FnOnce() -> Result<(T, Option<String>), (String, String)>,
{
    let start = Instant::now();
    match f() {
        Ok((value, detail)) => {
            checks.push(SmokeCheck {
                name,
                status: "pass",
                duration_ms: start.elapsed().as_millis(),
                detail,
                error_code: None,
                error: None,
            });
            Some(value)
        }
        Err((code, err)) => {
            checks.push(SmokeCheck {
                name,
                status: "fail",
                duration_ms: start.elapsed().as_millis(),
                detail: None,
                error_code: Some(code),
                error: Some(err),
            });
            None
        }
    }
}

fn skip(checks: &mut Vec<SmokeCheck>, name: &'static str, reason: &str) {
    checks.push(SmokeCheck {
        name,
        status: "skip",
        duration_ms: 0,
        detail: Some(reason.to_string()),
        error_code: None,
        error: None,
    });
}

fn main() {
    let args = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let trace_id = Uuid::new_v4().to_string();
    let out_dir = args.out_dir.clone().unwrap_or_else(|| {
        let mut p = std::env::temp_dir();
        p.push(format!("uninstall_without_root_smoke_{trace_id}"));
        p
    });
    if let Err(err) = ensure_dir(&out_dir) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let state = AppState::new();
    let mut checks: Vec<SmokeCheck> = Vec::new();

    let config = run_check(&mut checks, "load_config", || {
        load_config(&trace_id)
            .map(|config| (config, None))
            .map_err(|err| (err.code.clone(), err.error))
    })
    .unwrap_or_default();

    let adb = check_adb(&config, Some(trace_id.clone())).data;
    let adb_program = Some(adb.command_path.clone());
    run_check(&mut checks, "check_adb", || {
        if adb.available {
            Ok(((), Some(adb.version_output.clone())))
        } else {
            Err((
                "ERR_ADB_UNAVAILABLE".to_string(),
                adb.error.clone().unwrap_or_default(),
            ))
        }
    });

    let session = run_check(&mut checks, "open_session", || {
        open_session(&config, args.serial.clone(), Some(trace_id.clone()))
            .map(|response| {
                let detail = response.data.serial.clone();
                (response.data, detail)
            })
            .map_err(|err| (err.code, err.error))
    });

    let mut package = args.package.clone();
    if let Some(session) = &session {
        run_check(&mut checks, "list_packages", || {
            let items = list_packages(session, PackageQuery::default(), Some(trace_id.clone()))
                .map_err(|err| (err.code, err.error))?
                .data;
            if items.is_empty() {
                return Err(("ERR_EMPTY".to_string(), "pm returned no packages".to_string()));
            }
            let users = items
                .iter()
                .filter(|item| item.package.origin == PackageOrigin::User)
                .count();
            if package.is_none() {
                package = items
                    .iter()
                    .find(|item| item.package.origin == PackageOrigin::User)
                    .or_else(|| items.first())
                    .map(|item| item.package.package_name.clone());
            }
            Ok((
                (),
                Some(format!("{} packages, {users} user", items.len())),
            ))
        });
    } else {
        skip(&mut checks, "list_packages", "no device session");
    }

    match (&session, package.as_deref()) {
        (Some(session), Some(name)) => {
            run_check(&mut checks, "package_info", || {
                let info = get_package_info(session, name.to_string(), Some(trace_id.clone()))
                    .map_err(|err| (err.code, err.error))?
                    .data;
                Ok(((), Some(format!("{} {}", info.package_name, info.version_name))))
            });
        }
        _ => skip(&mut checks, "package_info", "no package to inspect"),
    }

    match (&session, package.as_deref(), args.extract) {
        (Some(session), Some(name), true) => {
            run_check(&mut checks, "extract_apk", || {
                let request = ExtractRequest {
                    package_name: name.to_string(),
                    apk_path: None,
                    dest: Some(out_dir.join("apks")),
                };
                let report = extract_apk(&state, session, &config, request, Some(trace_id.clone()))
                    .map_err(|err| (err.code, err.error))?
                    .data;
                let valid = report.apk.as_ref().map_or(false, |apk| apk.is_valid_archive);
                if !valid {
                    return Err((
                        "ERR_APK".to_string(),
                        format!("extracted file is not an apk: {:?}", report.final_paths),
                    ));
                }
                Ok(((), Some(report.final_paths.join(", "))))
            });
        }
        _ => skip(&mut checks, "extract_apk", "pass --extract to pull an apk"),
    }

    let status = if checks.iter().any(|check| check.status == "fail") {
        "fail"
    } else {
        "pass"
    };
    let summary = SmokeSummary {
        tool: "uninstall_without_root_smoke",
        status,
        trace_id: trace_id.clone(),
        serial: session.as_ref().and_then(|session| session.serial.clone()),
        adb_program,
        out_dir: out_dir.to_string_lossy().to_string(),
        checks,
    };

    let output = if args.json {
        serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut text = format!(
            "status: {}\ntrace_id: {}\nout: {}\n",
            summary.status, summary.trace_id, summary.out_dir
        );
        for check in &summary.checks {
            text.push_str(&format!(
                "{:<14} {}{}\n",
                check.name,
                check.status,
                check
                    .error
                    .as_deref()
                    .or(check.detail.as_deref())
                    .map(|value| format!(" ({value})"))
                    .unwrap_or_default()
            ));
        }
        text
    };

    println!("{output}");
    if summary.status != "pass" {
        std::process::exit(1);
    }
}
