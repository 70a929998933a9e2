//! Installation dispatcher.
//!
//! Installation runs in two steps around package inspection, which happens
//! off the serialization queue: [`InstallDispatcher::prepare`] validates the
//! request without touching state, [`InstallDispatcher::accept`] commits it.

use std::path::{Path, PathBuf};

use ota_package::{PackageInfo, PackageKind};
use tracing::{debug, info, warn};

use crate::domain::{ProgressStatus, UpdateStatus};
use crate::downloader::RecordStore;
use crate::{Error, Result};

use super::{BatteryStatus, BatteryThresholds, InstallEvent, InstallRequest};

/// The install currently owned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlightInstall {
    pub tag: String,
    pub kind: PackageKind,
    pub progress: f32,
    pub finalizing: bool,
    /// Picked up from the backend's durable state after a host restart.
    pub recovered: bool,
}

#[derive(Debug)]
pub struct InstallDispatcher {
    thresholds: BatteryThresholds,
    in_flight: Option<InFlightInstall>,
}

impl InstallDispatcher {
    pub fn new(thresholds: BatteryThresholds) -> Self {
        Self {
            thresholds,
            in_flight: None,
        }
    }

    pub fn in_flight(&self) -> Option<&InFlightInstall> {
        self.in_flight.as_ref()
    }

    pub fn is_installing(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Validate an install request and return the package path to inspect.
    ///
    /// Leaves every record untouched.
    pub fn prepare(
        &self,
        store: &RecordStore,
        tag: &str,
        battery: &BatteryStatus,
        download_dir: &Path,
    ) -> Result<PathBuf> {
        let entry = store.get(tag).ok_or_else(|| Error::not_found(tag))?;

        let running = self
            .in_flight
            .as_ref()
            .map(|i| i.tag.as_str())
            .or(store.installing_tag());
        if let Some(running) = running {
            return Err(Error::InstallAlreadyRunning {
                tag: running.to_string(),
            });
        }

        let downloaded = entry
            .progress
            .as_ref()
            .is_some_and(|p| p.status == ProgressStatus::Finish)
            || matches!(
                entry.record.status,
                UpdateStatus::Verified | UpdateStatus::InstallationFailed
            );
        if !downloaded {
            return Err(Error::PackageNotReady {
                tag: tag.to_string(),
            });
        }

        if let Err(e) = self.thresholds.check(battery) {
            info!(tag = %tag, plugged = battery.plugged, error = %e, "Install rejected");
            return Err(e);
        }

        Ok(download_dir.join(tag))
    }

    /// Commit an install of an inspected package.
    pub fn accept(
        &mut self,
        store: &mut RecordStore,
        tag: &str,
        path: PathBuf,
        package: PackageInfo,
    ) -> Result<InstallRequest> {
        if let Some(running) = &self.in_flight {
            return Err(Error::InstallAlreadyRunning {
                tag: running.tag.clone(),
            });
        }
        let entry = store.get_mut(tag).ok_or_else(|| Error::not_found(tag))?;
        entry.record.set_status(UpdateStatus::Installing)?;
        entry.record.install_progress = 0.0;
        entry.record.finalizing = false;

        self.in_flight = Some(InFlightInstall {
            tag: tag.to_string(),
            kind: package.kind,
            progress: 0.0,
            finalizing: false,
            recovered: false,
        });

        info!(tag = %tag, kind = %package.kind, "Installation started");
        Ok(InstallRequest {
            tag: tag.to_string(),
            path,
            package,
        })
    }

    /// Mark the install as failed after inspection or hand-off failed.
    pub fn fail(&mut self, store: &mut RecordStore, tag: &str, error: &Error) {
        warn!(tag = %tag, error = %error, "Installation failed");
        if self.in_flight.as_ref().is_some_and(|i| i.tag == tag) {
            self.in_flight = None;
        }
        if let Some(entry) = store.get_mut(tag) {
            if entry.record.status.can_transition_to(UpdateStatus::InstallationFailed) {
                entry.record.status = UpdateStatus::InstallationFailed;
            }
            entry.record.finalizing = false;
        }
    }

    /// Adopt an install the backend reports as running after a host restart.
    pub fn recover(&mut self, store: &mut RecordStore, tag: &str, kind: PackageKind) {
        if let Some(entry) = store.get_mut(tag) {
            entry.record.status = UpdateStatus::Installing;
        }
        self.in_flight = Some(InFlightInstall {
            tag: tag.to_string(),
            kind,
            progress: 0.0,
            finalizing: false,
            recovered: true,
        });
        info!(tag = %tag, kind = %kind, "Recovered in-flight installation");
    }

    /// The running install may be cancelled.
    ///
    /// Only streaming installs outside their finalizing phase qualify.
    pub fn cancellable(&self) -> Result<&InFlightInstall> {
        match &self.in_flight {
            Some(install) if install.kind == PackageKind::Streaming && !install.finalizing => {
                Ok(install)
            }
            _ => Err(Error::InstallNotCancellable),
        }
    }

    /// Apply an installer callback. Returns true when it changed state.
    pub fn on_event(&mut self, store: &mut RecordStore, event: &InstallEvent) -> bool {
        let Some(install) = self.in_flight.as_mut().filter(|i| i.tag == event.tag()) else {
            debug!(tag = %event.tag(), "Ignoring callback for unknown installation");
            return false;
        };

        match event {
            InstallEvent::Progress {
                fraction,
                finalizing,
                ..
            } => {
                install.progress = fraction.clamp(0.0, 1.0);
                install.finalizing = *finalizing;
                if let Some(entry) = store.get_mut(&install.tag) {
                    entry.record.install_progress = install.progress;
                    entry.record.finalizing = install.finalizing;
                }
            }
            InstallEvent::Installed { tag } => {
                info!(tag = %tag, "Installation completed");
                if let Some(entry) = store.get_mut(tag) {
                    entry.record.status = UpdateStatus::Installed;
                    entry.record.install_progress = 1.0;
                    entry.record.finalizing = false;
                }
                self.in_flight = None;
            }
            InstallEvent::Failed { tag, reason } => {
                warn!(tag = %tag, reason = %reason, "Installation failed");
                if let Some(entry) = store.get_mut(tag) {
                    entry.record.status = UpdateStatus::InstallationFailed;
                    entry.record.finalizing = false;
                }
                self.in_flight = None;
            }
        }
        true
    }
}
