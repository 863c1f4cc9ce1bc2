use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::PackageFilter;

const APP_SETTINGS_FILE: &str = "settings.json";
const APP_CONFIG_DIR_NAME: &str = "apkdeck";
pub(crate) const DEFAULT_MAX_OPERATION_HISTORY: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_max_operation_history")]
    pub max_operation_history: usize,
    #[serde(default = "default_confirm_pref")]
    pub confirm_operations: bool,
    #[serde(default)]
    pub default_filter: PackageFilter,
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_max_operation_history() -> usize {
    DEFAULT_MAX_OPERATION_HISTORY
}

fn default_confirm_pref() -> bool {
    true
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            command_timeout_secs: default_command_timeout_secs(),
            max_operation_history: default_max_operation_history(),
            confirm_operations: default_confirm_pref(),
            default_filter: PackageFilter::All,
            log_filter: None,
        }
    }
}

impl AppSettings {
    /// Per-command ceiling; zero falls back to the default.
    pub fn command_timeout(&self) -> Duration {
        let secs = if self.command_timeout_secs == 0 {
            default_command_timeout_secs()
        } else {
            self.command_timeout_secs
        };
        Duration::from_secs(secs)
    }
}

pub fn load_app_settings() -> AppSettings {
    let Some(path) = app_settings_path() else {
        return AppSettings::default();
    };
    load_settings_from(&path)
}

pub(crate) fn load_settings_from(path: &Path) -> AppSettings {
    let Ok(content) = fs::read_to_string(path) else {
        return AppSettings::default();
    };

    match serde_json::from_str(&content) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring malformed settings file");
            AppSettings::default()
        }
    }
}

pub fn save_app_settings(settings: &AppSettings) -> Result<()> {
    let Some(path) = app_settings_path() else {
        return Err(Error::Config(
            "Unable to determine settings directory".to_string(),
        ));
    };
    save_settings_to(settings, &path)
}

pub(crate) fn save_settings_to(settings: &AppSettings, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            Error::Config(format!("Failed to create settings directory: {}", err))
        })?;
    }

    let data = serde_json::to_string_pretty(settings)
        .map_err(|err| Error::Config(format!("Failed to serialize settings: {}", err)))?;

    fs::write(path, data)
        .map_err(|err| Error::Config(format!("Failed to write settings: {}", err)))
}

fn app_config_dir() -> Option<PathBuf> {
    config_dir_from(|key| env::var(key).ok())
}

fn config_dir_from<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(custom) = non_empty("APKDECK_CONFIG_DIR") {
        return Some(PathBuf::from(custom));
    }

    if let Some(config_home) = non_empty("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(config_home).join(APP_CONFIG_DIR_NAME));
    }

    if let Some(home) = non_empty("HOME") {
        return Some(
            PathBuf::from(home)
                .join(".config")
                .join(APP_CONFIG_DIR_NAME),
        );
    }

    None
}

pub(crate) fn app_settings_path() -> Option<PathBuf> {
    app_config_dir().map(|dir| dir.join(APP_SETTINGS_FILE))
}
