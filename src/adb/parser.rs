use std::collections::BTreeSet;

use crate::details::{PackageDetail, enable_state_label};

const PACKAGE_PREFIX: &str = "package:";

/// Extracts package names from `pm list packages` output.
pub(crate) fn parse_package_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let name = trimmed.strip_prefix(PACKAGE_PREFIX)?.trim();
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}

pub(crate) fn parse_package_set(output: &str) -> BTreeSet<String> {
    parse_package_lines(output).into_iter().collect()
}

/// Parses `adb devices`, keeping serials whose state is exactly `device`.
pub(crate) fn parse_devices_output(output: &str) -> Vec<String> {
    let mut devices: Vec<String> = output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let trimmed = line.trim_end_matches('\r');
            if trimmed.trim().is_empty() {
                return None;
            }
            let (serial, state) = trimmed.split_once('\t')?;
            if state.trim() == "device" && !serial.trim().is_empty() {
                Some(serial.trim().to_string())
            } else {
                None
            }
        })
        .collect();

    devices.sort();
    devices.dedup();
    devices
}

pub(crate) fn parse_dumpsys_package(output: &str) -> PackageDetail {
    let mut detail = PackageDetail {
        raw: output.to_string(),
        ..PackageDetail::default()
    };

    for line in output.lines() {
        let line = line.trim();

        if let Some(value) = line.strip_prefix("appId=") {
            set_field(&mut detail.app_id, value);
        } else if line.starts_with("User 0: ") {
            detail.enabled_state = parse_enabled_state(line);
        } else if let Some(value) = line.strip_prefix("versionName=") {
            set_field(&mut detail.version_name, value);
        } else if let Some(value) = line.strip_prefix("versionCode=") {
            let code = value.split_whitespace().next().unwrap_or("");
            set_field(&mut detail.version_code, code);
        } else if let Some(value) = line.strip_prefix("installerPackageName=") {
            set_field(&mut detail.installer, value);
        } else if let Some(value) = line.strip_prefix("timeStamp=") {
            set_field(&mut detail.time_stamp, value);
        } else if let Some(value) = line.strip_prefix("lastUpdateTime=") {
            set_field(&mut detail.last_update_time, value);
        }
    }

    detail
}

// dumpsys repeats some keys for each code path; the last line wins
fn set_field(slot: &mut Option<String>, value: &str) {
    let trimmed = value.trim();
    *slot = (!trimmed.is_empty()).then(|| trimmed.to_string());
}

fn parse_enabled_state(line: &str) -> Option<String> {
    let (_, rest) = line.split_once(" enabled=")?;
    let digit = rest.chars().next()?;
    match digit.to_digit(10) {
        Some(code) => Some(format!("{} ({})", code, enable_state_label(code))),
        None => Some(digit.to_string()),
    }
}

pub(crate) fn summarize_output_line(text: &str) -> Option<String> {
    text.lines()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .map(|line| truncate_for_summary(line, 96))
}

pub(crate) fn truncate_for_summary(text: &str, max_chars: usize) -> String {
    let mut result: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        result.push_str("...");
    }
    result
}
