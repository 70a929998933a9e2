//! Battery precondition for installs.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Battery reading at the time of an install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryStatus {
    /// A battery is fitted.
    pub present: bool,
    pub level: u32,
    pub scale: u32,
    /// Power is connected (AC, USB or wireless).
    pub plugged: bool,
}

impl BatteryStatus {
    /// Reading in percent on a scale of 100.
    pub fn new(percent: u8, plugged: bool) -> Self {
        Self {
            present: true,
            level: percent as u32,
            scale: 100,
            plugged,
        }
    }

    pub fn absent() -> Self {
        Self {
            present: false,
            level: 0,
            scale: 0,
            plugged: true,
        }
    }

    /// Charge level rounded to whole percent.
    pub fn percent(&self) -> u8 {
        if self.scale == 0 {
            return 0;
        }
        let percent = (100.0 * self.level as f64 / self.scale as f64).round();
        percent.clamp(0.0, 100.0) as u8
    }
}

/// Minimum charge required before an install, by power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryThresholds {
    pub charging: u8,
    pub discharging: u8,
}

impl Default for BatteryThresholds {
    fn default() -> Self {
        Self {
            charging: 20,
            discharging: 30,
        }
    }
}

impl BatteryThresholds {
    pub fn required(&self, plugged: bool) -> u8 {
        if plugged {
            self.charging
        } else {
            self.discharging
        }
    }

    /// Reject with `BatteryTooLow` when the charge is below the threshold.
    /// Devices without a battery always pass.
    pub fn check(&self, battery: &BatteryStatus) -> Result<()> {
        if !battery.present {
            return Ok(());
        }
        let level = battery.percent();
        let required = self.required(battery.plugged);
        if level < required {
            return Err(Error::BatteryTooLow { level, required });
        }
        Ok(())
    }
}

/// Source of battery readings.
pub trait BatteryMonitor: Send + Sync {
    fn status(&self) -> BatteryStatus;
}

/// Monitor for devices without a battery.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBattery;

impl BatteryMonitor for NoBattery {
    fn status(&self) -> BatteryStatus {
        BatteryStatus::absent()
    }
}
