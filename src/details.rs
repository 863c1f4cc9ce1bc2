/// Fields shown for a package, parsed from `dumpsys package`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageDetail {
    pub app_id: Option<String>,
    pub enabled_state: Option<String>,
    pub version_name: Option<String>,
    pub version_code: Option<String>,
    pub installer: Option<String>,
    pub time_stamp: Option<String>,
    pub last_update_time: Option<String>,
    pub raw: String,
}

pub(crate) fn enable_state_label(code: u32) -> &'static str {
    match code {
        0 => "ENABLED_STATE_DEFAULT",
        1 => "ENABLED_STATE_ENABLED",
        2 => "ENABLED_STATE_DISABLED",
        3 => "ENABLED_STATE_DISABLED_USER",
        4 => "ENABLED_STATE_DISABLED_UNTIL_USED",
        _ => "UNKNOWN",
    }
}

impl PackageDetail {
    /// Text copied for the detail view, one `Label: value` per line.
    pub(crate) fn clipboard_text(&self, package: &str) -> String {
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".to_string());
        format!(
            "Package: {}\nApp ID: {}\nEnable State: {}\nVersion Name: {}\nVersion Code: {}\nInstaller Package Name: {}\nTime Stamp: {}\nLast Update Time: {}",
            package,
            field(&self.app_id),
            field(&self.enabled_state),
            field(&self.version_name),
            field(&self.version_code),
            field(&self.installer),
            field(&self.time_stamp),
            field(&self.last_update_time),
        )
    }
}
