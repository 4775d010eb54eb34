use std::path::{Path, PathBuf};

use tracing::{debug, warn};

pub fn normalize_command_path(value: &str) -> String {
    let trimmed = value.trim();
    if let Some(inner) = trimmed
        .strip_prefix('"')
        .and_then(|candidate| candidate.strip_suffix('"'))
    {
        return inner.trim().to_string();
    }
    if let Some(inner) = trimmed
        .strip_prefix('\'')
        .and_then(|candidate| candidate.strip_suffix('\''))
    {
        return inner.trim().to_string();
    }
    trimmed.to_string()
}

/// Directory name of the platform-tools build shipped next to the executable,
/// e.g. `linux-x64`, `mac-arm64`, `win-x64`.
pub fn platform_dir_name(os: &str, arch: &str) -> Option<String> {
    let arch = match arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    };
    match os {
        "macos" => Some(format!("mac-{arch}")),
        "linux" => Some(format!("linux-{arch}")),
        "windows" => Some("win-x64".to_string()),
        _ => None,
    }
}

pub fn bundled_adb_path(base: &Path) -> Option<PathBuf> {
    let dir = platform_dir_name(std::env::consts::OS, std::env::consts::ARCH)?;
    let file = if cfg!(windows) { "adb.exe" } else { "adb" };
    Some(base.join("adb").join(dir).join(file))
}

/// Configured path first, then a bundled binary under `bundle_base`, then
/// whatever `adb` is on PATH.
pub fn resolve_adb_program(config_command_path: &str, bundle_base: Option<&Path>) -> String {
    let normalized = normalize_command_path(config_command_path);
    if !normalized.is_empty() {
        return normalized;
    }
    if let Some(bundled) = bundle_base.and_then(bundled_adb_path) {
        if bundled.is_file() {
            debug!(path = %bundled.display(), "using bundled adb");
            return bundled.to_string_lossy().to_string();
        }
    }
    "adb".to_string()
}

pub fn validate_adb_program(program: &str) -> Result<(), String> {
    if program.trim().is_empty() {
        return Err("ADB command is empty".to_string());
    }
    if is_bare_program_name(program) {
        return Ok(());
    }
    let path = Path::new(program);
    if path.is_dir() {
        return Err("ADB path must point to an executable file".to_string());
    }
    if !path.exists() {
        return Err("ADB executable not found at the configured path".to_string());
    }
    Ok(())
}

fn is_bare_program_name(program: &str) -> bool {
    !program.contains('/') && !program.contains('\\')
}

/// Bundled binaries can lose their exec bit when unpacked; restore 0o755.
#[cfg(unix)]
pub fn ensure_executable(program: &str) -> Result<(), String> {
    use std::os::unix::fs::PermissionsExt;

    if is_bare_program_name(program) {
        return Ok(());
    }
    let metadata = std::fs::metadata(program)
        .map_err(|err| format!("Failed to stat {program}: {err}"))?;
    if metadata.permissions().mode() & 0o111 != 0 {
        return Ok(());
    }
    warn!(program = %program, "adb is not executable, applying 0o755");
    std::fs::set_permissions(program, std::fs::Permissions::from_mode(0o755))
        .map_err(|err| format!("Failed to set permissions on {program}: {err}"))
}

#[cfg(not(unix))]
pub fn ensure_executable(_program: &str) -> Result<(), String> {
    Ok(())
}
