use serde::{Deserialize, Serialize};

/// Placeholder for any field adb did not report.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub status: String,
}

impl Device {
    pub fn is_ready(&self) -> bool {
        self.status == "device"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub status: String,
    pub model: Option<String>,
}

/// Heuristic split between side-loaded/updatable and pre-installed packages.
/// Derived from the apk path only; Android itself is never asked.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PackageOrigin {
    User,
    System,
}

impl PackageOrigin {
    pub fn from_apk_path(apk_path: &str) -> Self {
        if apk_path.contains("/data/app/") || apk_path.contains("/data/user/") {
            Self::User
        } else {
            Self::System
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for PackageOrigin {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "system" => Ok(Self::System),
            other => Err(format!("unknown package origin: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Package {
    pub package_name: String,
    pub apk_path: String,
    pub origin: PackageOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppPackage {
    #[serde(flatten)]
    pub package: Package,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageInfo {
    pub package_name: String,
    pub version_name: String,
    pub version_code: String,
    pub last_update_time: String,
    pub enabled: bool,
}

impl PackageInfo {
    pub fn unknown(package_name: &str) -> Self {
        Self {
            package_name: package_name.to_string(),
            version_name: UNKNOWN.to_string(),
            version_code: UNKNOWN.to_string(),
            last_update_time: UNKNOWN.to_string(),
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdbInfo {
    pub available: bool,
    pub version: Option<String>,
    pub version_output: String,
    pub command_path: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub serial: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageActionResult {
    pub package_name: String,
    pub action: String,
    pub success: bool,
    pub output: String,
}

/// One pull-then-move operation. Lives only as long as the extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionJob {
    pub package_name: String,
    pub source_path: String,
    pub dest_temp_path: String,
    pub final_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveOutcome {
    pub success: bool,
    pub filenames: Vec<String>,
    pub error_occurred: bool,
}

impl MoveOutcome {
    pub fn moved(filenames: Vec<String>) -> Self {
        Self {
            success: !filenames.is_empty(),
            filenames,
            error_occurred: false,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            filenames: Vec::new(),
            error_occurred: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApkInfo {
    pub path: String,
    pub file_size_bytes: u64,
    pub is_valid_archive: bool,
    pub has_manifest: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractionReport {
    pub package_name: String,
    pub source_path: String,
    pub final_paths: Vec<String>,
    pub attempts: u32,
    pub apk: Option<ApkInfo>,
}
