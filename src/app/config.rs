use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::extraction::poller::PollSettings;

pub const DATA_DIR_ENV: &str = "UNINSTALL_WITHOUT_ROOT_HOME";
const APP_DIR_NAME: &str = "uninstall_without_root";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdbSettings {
    pub command_path: String,
    pub command_timeout_secs: u64,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            command_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionSettings {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    /// Ceiling for `adb pull` alone. Large apks stream well past the
    /// general command timeout.
    #[serde(default = "default_pull_timeout_secs")]
    pub pull_timeout_secs: u64,
}

fn default_pull_timeout_secs() -> u64 {
    300
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            poll_attempts: 10,
            poll_interval_ms: 1000,
            pull_timeout_secs: default_pull_timeout_secs(),
        }
    }
}

impl ExtractionSettings {
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            max_attempts: self.poll_attempts,
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub darkmode: bool,
    #[serde(default)]
    pub delete_data: bool,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default = "default_extract_path")]
    pub extract_path: String,
    #[serde(default)]
    pub adb: AdbSettings,
    #[serde(default)]
    pub extraction: ExtractionSettings,
}

fn default_language() -> String {
    "zh".to_string()
}

fn default_true() -> bool {
    true
}

fn default_extract_path() -> String {
    "extract_apks".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            darkmode: true,
            delete_data: false,
            debug_mode: false,
            extract_path: default_extract_path(),
            adb: AdbSettings::default(),
            extraction: ExtractionSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.adb.command_timeout_secs)
    }
}

/// Per-user app data dir holding `config.json` and the `temp` scratch folder.
pub fn data_dir() -> PathBuf {
    if let Some(path) = std::env::var_os(DATA_DIR_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(path);
    }
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

pub fn backup_config_path() -> PathBuf {
    data_dir().join("config.backup.json")
}

pub fn temp_dir() -> PathBuf {
    data_dir().join("temp")
}

pub fn load_config(trace_id: &str) -> Result<AppConfig, AppError> {
    load_config_from_path(&config_path(), &backup_config_path(), trace_id)
}

pub fn save_config(config: &AppConfig, trace_id: &str) -> Result<(), AppError> {
    save_config_to_path(config, &config_path(), &backup_config_path(), trace_id)
}

pub fn reset_config(trace_id: &str) -> Result<AppConfig, AppError> {
    let config = AppConfig::default();
    save_config(&config, trace_id)?;
    Ok(config)
}

/// Missing or unparsable files are replaced by defaults on disk. A corrupt
/// file is kept as the backup before being overwritten.
pub fn load_config_from_path(
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<AppConfig, AppError> {
    if !path.exists() {
        info!(trace_id = %trace_id, path = %path.display(), "config not found, writing defaults");
        let config = AppConfig::default();
        save_config_to_path(&config, path, backup_path, trace_id)?;
        return Ok(config);
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(_) | Err(_) => {
            warn!(
                trace_id = %trace_id,
                path = %path.display(),
                "config corrupt, resetting to defaults"
            );
            let config = AppConfig::default();
            save_config_to_path(&config, path, backup_path, trace_id)?;
            return Ok(config);
        }
    };
    let config: AppConfig = match serde_json::from_value(value.clone()) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                trace_id = %trace_id,
                error = %err,
                "config fields invalid, using defaults for them"
            );
            AppConfig::default()
        }
    };
    Ok(validate_config(apply_legacy_overrides(config, &value)))
}

pub fn save_config_to_path(
    config: &AppConfig,
    path: &Path,
    backup_path: &Path,
    trace_id: &str,
) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::system(format!("Failed to create config dir: {err}"), trace_id)
        })?;
    }
    if path.exists() {
        let _ = fs::copy(path, backup_path);
    }
    let payload = serde_json::to_string_pretty(config)
        .map_err(|err| AppError::system(format!("Failed to serialize config: {err}"), trace_id))?;
    fs::write(path, payload)
        .map_err(|err| AppError::system(format!("Failed to write config: {err}"), trace_id))?;
    Ok(())
}

/// Early releases wrote the extraction dir under the misspelt `extrect_path`.
fn apply_legacy_overrides(mut config: AppConfig, value: &serde_json::Value) -> AppConfig {
    if value.get("extract_path").is_none() {
        if let Some(path) = value.get("extrect_path").and_then(|v| v.as_str()) {
            config.extract_path = path.to_string();
        }
    }
    config
}

fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.adb.command_timeout_secs == 0 || config.adb.command_timeout_secs > 600 {
        config.adb.command_timeout_secs = 15;
    }
    if config.extraction.poll_attempts == 0 {
        config.extraction.poll_attempts = 10;
    }
    if config.extraction.poll_interval_ms == 0 {
        config.extraction.poll_interval_ms = 1000;
    }
    if config.extraction.pull_timeout_secs == 0 || config.extraction.pull_timeout_secs > 3600 {
        config.extraction.pull_timeout_secs = default_pull_timeout_secs();
    }
    if config.extract_path.trim().is_empty() {
        config.extract_path = default_extract_path();
    }
    config
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        other => Err(format!("{key} expects true/false, got {other}")),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| format!("{key} expects a number, got {value}"))
}

/// Sets one key by name, as the settings screen does.
pub fn set_config_value(
    mut config: AppConfig,
    key: &str,
    value: &str,
) -> Result<AppConfig, String> {
    match key {
        "language" => config.language = value.trim().to_string(),
        "darkmode" => config.darkmode = parse_bool(key, value)?,
        "delete_data" => config.delete_data = parse_bool(key, value)?,
        "debug_mode" => config.debug_mode = parse_bool(key, value)?,
        "extract_path" => config.extract_path = value.trim().to_string(),
        "adb.command_path" => config.adb.command_path = value.trim().to_string(),
        "adb.command_timeout_secs" => config.adb.command_timeout_secs = parse_number(key, value)?,
        "extraction.poll_attempts" => config.extraction.poll_attempts = parse_number(key, value)?,
        "extraction.poll_interval_ms" => {
            config.extraction.poll_interval_ms = parse_number(key, value)?
        }
        "extraction.pull_timeout_secs" => {
            config.extraction.pull_timeout_secs = parse_number(key, value)?
        }
        other => return Err(format!("unknown config key: {other}")),
    }
    Ok(validate_config(config))
}
