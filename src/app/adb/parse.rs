use tracing::debug;

use crate::app::models::{Device, UNKNOWN};

pub const DEVICES_HEADER: &str = "List of devices attached";

/// Parses `adb devices`.
///
/// `None` means the header never appeared: adb is missing or broken, which is
/// not the same thing as "no devices" (`Some(vec![])`). Lines after the header
/// are split on tab; a line without a status cell still yields a device whose
/// status is `"unknown"`.
pub fn parse_adb_devices(output: &str) -> Option<Vec<Device>> {
    let mut lines = output.lines();
    lines.by_ref().find(|line| line.contains(DEVICES_HEADER))?;

    let devices = lines
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        // daemon banners such as "* daemon started successfully"
        .filter(|line| !line.trim_start().starts_with('*'))
        .map(|line| {
            let mut cells = line.splitn(2, '\t');
            let id = cells.next().unwrap_or_default().trim().to_string();
            let status = cells
                .next()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string();
            if status == UNKNOWN {
                debug!(line = %line, "device line without status");
            }
            Device { id, status }
        })
        .collect();
    Some(devices)
}

/// Single `getprop <key>` value; empty output means the property is unset.
pub fn parse_getprop_value(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// `Android Debug Bridge version 1.0.41` -> `1.0.41`.
pub fn parse_adb_version(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Android Debug Bridge version")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}
