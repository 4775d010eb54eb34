use std::path::{Path, PathBuf};

/// adb joins shell arguments into one device-side command line, so anything
/// forwarded to `pm` must be a plain dotted identifier.
pub fn validate_package_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("package_name is required".to_string());
    }
    let valid_segments = trimmed.split('.').all(|segment| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    });
    if !valid_segments {
        return Err(format!("invalid package name: {trimmed}"));
    }
    Ok(())
}

pub fn validate_device_path(path: &str) -> Result<(), String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err("device_path is required".to_string());
    }
    if !trimmed.starts_with('/') {
        return Err("device_path must be an absolute device path starting with '/'".to_string());
    }
    if trimmed.contains('\0') || trimmed.contains('\n') {
        return Err("device_path contains invalid characters".to_string());
    }
    if trimmed == "/" {
        return Err("device_path must not be root".to_string());
    }
    if trimmed.split('/').any(|segment| segment == "..") {
        return Err("device_path must not contain '..' segments".to_string());
    }
    Ok(())
}

/// `<package>.apk`, with anything unsafe for a host filename replaced by `_`.
pub fn apk_file_name(package_name: &str) -> String {
    let sanitized: String = package_name
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches('.');
    if sanitized.is_empty() {
        "package.apk".to_string()
    } else {
        format!("{sanitized}.apk")
    }
}

pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Relative extraction dirs live under the app data dir.
pub fn resolve_extract_dir(extract_path: &str, data_dir: &Path) -> PathBuf {
    let expanded = expand_home(extract_path.trim());
    if expanded.is_absolute() {
        expanded
    } else {
        data_dir.join(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_real_package_names() {
        assert!(validate_package_name("com.android.settings").is_ok());
        assert!(validate_package_name("com.google.android.gms_1").is_ok());
        assert!(validate_package_name("android").is_ok());
    }

    #[test]
    fn rejects_shell_metacharacters() {
        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("com.foo; reboot").is_err());
        assert!(validate_package_name("com..foo").is_err());
        assert!(validate_package_name("$(id)").is_err());
    }

    #[test]
    fn validate_device_path_requires_absolute() {
        assert!(validate_device_path("").is_err());
        assert!(validate_device_path("data/app/x.apk").is_err());
        assert!(validate_device_path("/").is_err());
        assert!(validate_device_path("/data/app/com.foo-1/base.apk").is_ok());
    }

    #[test]
    fn validate_device_path_blocks_dotdot() {
        assert!(validate_device_path("/data/app/../../etc/passwd").is_err());
        assert!(validate_device_path("/sdcard/..").is_err());
    }

    #[test]
    fn builds_apk_file_names() {
        assert_eq!(apk_file_name("com.foo"), "com.foo.apk");
        assert_eq!(apk_file_name("a/b"), "a_b.apk");
        assert_eq!(apk_file_name(".."), "package.apk");
    }

    #[test]
    fn resolves_extract_dir() {
        let data = Path::new("/var/lib/app");
        assert_eq!(
            resolve_extract_dir("extract_apks", data),
            PathBuf::from("/var/lib/app/extract_apks")
        );
        let absolute = std::env::temp_dir().join("apks");
        assert_eq!(
            resolve_extract_dir(absolute.to_str().unwrap(), data),
            absolute
        );
    }
}
