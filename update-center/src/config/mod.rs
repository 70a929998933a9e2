//! Runtime configuration.
//!
//! [`ControlPlaneConfig`] comes from the environment (optionally seeded from
//! a `.env` file). [`UpdaterSettings`] is the small durable settings file
//! the control plane reads at startup.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::installer::BatteryThresholds;
use crate::{Error, Result};

/// Prefix of every environment variable read by [`ControlPlaneConfig::from_env`].
pub const ENV_PREFIX: &str = "UPDATE_CENTER_";

/// Default mailbox capacity of the control-plane host.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Static configuration of the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Directory the transfer engine stores packages in.
    pub download_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Location of the durable [`UpdaterSettings`] file.
    pub settings_path: PathBuf,
    pub battery: BatteryThresholds,
    pub mailbox_capacity: usize,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./downloads"),
            log_dir: PathBuf::from("./logs"),
            settings_path: PathBuf::from("./settings.json"),
            battery: BatteryThresholds::default(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl ControlPlaneConfig {
    /// Load from `UPDATE_CENTER_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(dir) = var("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("SETTINGS_PATH") {
            config.settings_path = PathBuf::from(path);
        }
        if let Some(value) = var("BATTERY_CHARGING_PCT") {
            config.battery.charging = parse_percent("BATTERY_CHARGING_PCT", &value)?;
        }
        if let Some(value) = var("BATTERY_DISCHARGING_PCT") {
            config.battery.discharging = parse_percent("BATTERY_DISCHARGING_PCT", &value)?;
        }
        if let Some(value) = var("MAILBOX_CAPACITY") {
            config.mailbox_capacity = parse_number("MAILBOX_CAPACITY", &value)?;
            if config.mailbox_capacity == 0 {
                return Err(Error::config("UPDATE_CENTER_MAILBOX_CAPACITY must be positive"));
            }
        }

        Ok(config)
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{}{} is not a number: {}", ENV_PREFIX, name, value)))
}

fn parse_percent(name: &str, value: &str) -> Result<u8> {
    let percent: u8 = parse_number(name, value)?;
    if percent > 100 {
        return Err(Error::config(format!(
            "{}{} must be within 0-100: {}",
            ENV_PREFIX, name, percent
        )));
    }
    Ok(percent)
}

/// Durable user settings read at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterSettings {
    /// Do not resume downloads automatically on metered networks.
    pub warn_on_mobile_data: bool,
    /// Remove transfers of updates the catalog no longer lists.
    pub auto_delete_updates: bool,
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            warn_on_mobile_data: true,
            auto_delete_updates: false,
        }
    }
}

impl UpdaterSettings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }
}
