use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::app::models::{AppPackage, Package, PackageInfo, PackageOrigin, UNKNOWN};

const PACKAGE_PREFIX: &str = "package:";

pub const UNINSTALL_SUCCESS_MARKER: &str = "Success";
pub const ENABLED_MARKER: &str = "new state: enabled";
pub const DISABLED_MARKER: &str = "new state: disabled";

/// Parses `pm list packages -f`.
///
/// `package:<path>=<name>` splits on the last `=`, so paths containing `=`
/// survive. `package:<name>` yields an empty path. Anything else is dropped
/// with a warning. Names are unique in the result; a repeated name replaces
/// the earlier entry in place.
pub fn parse_pm_list_packages_output(output: &str) -> Vec<Package> {
    let mut packages: Vec<Package> = Vec::new();
    let mut index_by_name: HashMap<String, usize> = HashMap::new();

    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some(payload) = line.strip_prefix(PACKAGE_PREFIX) else {
            warn!(line = %line, "dropping unrecognised pm list line");
            continue;
        };
        let (apk_path, package_name) = match payload.rfind('=') {
            Some(split) => (&payload[..split], payload[split + 1..].trim()),
            None => ("", payload.trim()),
        };
        if package_name.is_empty() {
            warn!(line = %line, "dropping pm list line without a package name");
            continue;
        }

        let package = Package {
            package_name: package_name.to_string(),
            apk_path: apk_path.to_string(),
            origin: PackageOrigin::from_apk_path(apk_path),
        };
        match index_by_name.get(package_name) {
            Some(&existing) => {
                debug!(package_name = %package_name, "duplicate package line");
                packages[existing] = package;
            }
            None => {
                index_by_name.insert(package.package_name.clone(), packages.len());
                packages.push(package);
            }
        }
    }
    packages
}

/// Parses `pm list packages -d` into the set of disabled package names.
pub fn parse_disabled_packages(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix(PACKAGE_PREFIX).unwrap_or(line).trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn version_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"versionName=(\S+)").expect("static regex"))
}

fn version_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"versionCode=(\S+)").expect("static regex"))
}

fn last_update_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"lastUpdateTime=([^\n]+)").expect("static regex"))
}

fn capture_or_unknown(re: &Regex, text: &str) -> String {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().trim())
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// Extracts version and update time from `dumpsys package <name>`.
/// Each field is independent and falls back to `"unknown"`.
pub fn parse_package_info(
    package_name: &str,
    dump: &str,
    disabled: &BTreeSet<String>,
) -> PackageInfo {
    PackageInfo {
        package_name: package_name.to_string(),
        version_name: capture_or_unknown(version_name_re(), dump),
        version_code: capture_or_unknown(version_code_re(), dump),
        last_update_time: capture_or_unknown(last_update_time_re(), dump),
        enabled: !disabled.contains(package_name),
    }
}

/// Picks the apk from `pm path <name>`, preferring `base.apk` for split installs.
pub fn parse_pm_path_output(output: &str) -> Option<String> {
    let paths: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix(PACKAGE_PREFIX))
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .collect();
    paths
        .iter()
        .find(|path| path.ends_with("/base.apk"))
        .or_else(|| paths.first())
        .map(|path| path.to_string())
}

/// Joins packages with the disabled set; user packages first, input order kept.
pub fn join_enabled(packages: Vec<Package>, disabled: &BTreeSet<String>) -> Vec<AppPackage> {
    let mut items: Vec<AppPackage> = packages
        .into_iter()
        .map(|package| AppPackage {
            enabled: !disabled.contains(&package.package_name),
            package,
        })
        .collect();
    items.sort_by_key(|item| item.package.origin);
    items
}

pub fn filter_packages(
    items: Vec<AppPackage>,
    term: Option<&str>,
    origin: Option<PackageOrigin>,
) -> Vec<AppPackage> {
    let term = term
        .map(|value| value.trim().to_lowercase())
        .filter(|value| !value.is_empty());
    items
        .into_iter()
        .filter(|item| origin.map_or(true, |wanted| item.package.origin == wanted))
        .filter(|item| {
            term.as_deref()
                .map_or(true, |term| item.package.package_name.to_lowercase().contains(term))
        })
        .collect()
}

pub fn uninstall_succeeded(output: &str) -> bool {
    output.contains(UNINSTALL_SUCCESS_MARKER)
}

pub fn enable_succeeded(output: &str) -> bool {
    output.contains(ENABLED_MARKER)
}

pub fn disable_succeeded(output: &str) -> bool {
    output.contains(DISABLED_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_package_with_path() {
        let items = parse_pm_list_packages_output("package:/data/app/com.foo-1/base.apk=com.foo\n");
        assert_eq!(
            items,
            vec![Package {
                package_name: "com.foo".to_string(),
                apk_path: "/data/app/com.foo-1/base.apk".to_string(),
                origin: PackageOrigin::User,
            }]
        );
    }

    #[test]
    fn parses_bare_package_as_system() {
        let items = parse_pm_list_packages_output("package:com.android.settings\n");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].package_name, "com.android.settings");
        assert_eq!(items[0].apk_path, "");
        assert_eq!(items[0].origin, PackageOrigin::System);
    }

    #[test]
    fn splits_on_last_equals() {
        let output = "package:/data/app/~~a1b2==/com.bar-x==/base.apk=com.bar\n";
        let items = parse_pm_list_packages_output(output);
        assert_eq!(items[0].apk_path, "/data/app/~~a1b2==/com.bar-x==/base.apk");
        assert_eq!(items[0].package_name, "com.bar");
    }

    #[test]
    fn one_entry_per_line_and_classification_is_stable() {
        let output = "package:/system/app/Chrome/Chrome.apk=com.android.chrome\r\n\
                      \r\n\
                      package:/data/app/com.whatsapp-2/base.apk=com.whatsapp\r\n\
                      package:/product/priv-app/Gms/Gms.apk=com.google.android.gms\r\n";
        let first = parse_pm_list_packages_output(output);
        assert_eq!(first.len(), 3);

        let reserialized: String = first
            .iter()
            .map(|item| format!("package:{}={}\n", item.apk_path, item.package_name))
            .collect();
        let second = parse_pm_list_packages_output(&reserialized);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_output_is_empty_list() {
        assert!(parse_pm_list_packages_output("").is_empty());
        assert!(parse_disabled_packages("").is_empty());
    }

    #[test]
    fn drops_unrecognised_lines() {
        let output = concat!(
            "Error: could not access the Package Manager\n",
            "package:/system/app/X.apk=\n",
            "package:com.ok\n",
        );
        let items = parse_pm_list_packages_output(output);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].package_name, "com.ok");
    }

    #[test]
    fn duplicate_names_keep_one_entry() {
        let output = "package:/system/app/A.apk=com.a\npackage:/data/app/com.a-1/base.apk=com.a\n";
        let items = parse_pm_list_packages_output(output);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].origin, PackageOrigin::User);
    }

    #[test]
    fn parses_disabled_set() {
        let set = parse_disabled_packages("package:com.a\n\npackage:com.b \n");
        assert_eq!(set.len(), 2);
        assert!(set.contains("com.a"));
        assert!(set.contains("com.b"));
    }

    #[test]
    fn parses_package_info() {
        let dump = concat!(
            "Packages:\n",
            "  Package [com.foo] (abc):\n",
            "    versionCode=42 minSdk=24 targetSdk=34\n",
            "    versionName=1.2.3\n",
            "    lastUpdateTime=2024-03-01 10:20:30\r\n",
        );
        let disabled = BTreeSet::from(["com.foo".to_string()]);
        let info = parse_package_info("com.foo", dump, &disabled);
        assert_eq!(info.version_name, "1.2.3");
        assert_eq!(info.version_code, "42");
        assert_eq!(info.last_update_time, "2024-03-01 10:20:30");
        assert!(!info.enabled);
    }

    #[test]
    fn missing_version_name_is_unknown_only_for_that_field() {
        let dump = "    versionCode=7 minSdk=21\n    lastUpdateTime=2023-12-24 08:00:00\n";
        let info = parse_package_info("com.foo", dump, &BTreeSet::new());
        assert_eq!(info.version_name, "unknown");
        assert_eq!(info.version_code, "7");
        assert_eq!(info.last_update_time, "2023-12-24 08:00:00");
        assert!(info.enabled);
    }

    #[test]
    fn parses_pm_path_preferring_base() {
        let output = concat!(
            "package:/data/app/com.foo/split_config.arm64_v8a.apk\n",
            "package:/data/app/com.foo/base.apk\n",
        );
        assert_eq!(
            parse_pm_path_output(output).as_deref(),
            Some("/data/app/com.foo/base.apk")
        );
        assert_eq!(
            parse_pm_path_output("package:/system/app/X/X.apk\n").as_deref(),
            Some("/system/app/X/X.apk")
        );
        assert_eq!(parse_pm_path_output(""), None);
    }

    #[test]
    fn joins_and_filters() {
        let packages = parse_pm_list_packages_output(
            concat!(
                "package:/system/app/Cam.apk=com.android.camera\n",
                "package:/data/app/com.Foo-1/base.apk=com.Foo\n",
            ),
        );
        let disabled = BTreeSet::from(["com.android.camera".to_string()]);
        let items = join_enabled(packages, &disabled);
        assert_eq!(items[0].package.package_name, "com.Foo");
        assert!(items[0].enabled);
        assert!(!items[1].enabled);

        let found = filter_packages(items.clone(), Some(" FOO "), None);
        assert_eq!(found.len(), 1);
        let system = filter_packages(items, None, Some(PackageOrigin::System));
        assert_eq!(system[0].package.package_name, "com.android.camera");
    }

    #[test]
    fn success_contracts_are_verbatim() {
        assert!(uninstall_succeeded("Success\n"));
        assert!(!uninstall_succeeded("Failure [DELETE_FAILED_INTERNAL_ERROR]"));
        assert!(enable_succeeded("Package com.foo new state: enabled\n"));
        assert!(!enable_succeeded("Package com.foo new state: disabled-user\n"));
        assert!(disable_succeeded("Package com.foo new state: disabled-user\n"));
    }
}
