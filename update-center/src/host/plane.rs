//! Synchronous core of the control plane.
//!
//! [`ControlPlane`] owns all mutable state. Every operation mutates it and
//! returns the [`Effect`]s the host executes against the collaborators; no
//! operation performs I/O itself.

use std::path::PathBuf;

use ota_package::{PackageInfo, PackageKind};
use tracing::{debug, warn};

use crate::config::{ControlPlaneConfig, UpdaterSettings};
use crate::domain::UpdateRecord;
use crate::downloader::{
    CatalogDiff, DownloadAction, DownloadLifecycle, EventOutcome, RecordStore, TransferCommand,
    TransferEvent, resolve_primary_action,
};
use crate::installer::{BatteryStatus, InstallDispatcher, InstallEvent, InstallRequest};
use crate::network::{ConnectivityEvent, ResumeController};
use crate::notification::{Presentation, PresentationTracker, Projection, RenderCommand, project};
use crate::{Error, Result};

use super::{UpdateEvent, UpdateSnapshot};

/// Side effect requested by the control plane.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Transfer(TransferCommand),
    Install(InstallRequest),
    Reconnect(PackageKind),
    CancelInstall(PackageKind),
    Render(RenderCommand),
    Publish(UpdateEvent),
}

/// All state of the control plane.
#[derive(Debug)]
pub struct ControlPlane {
    store: RecordStore,
    dispatcher: InstallDispatcher,
    resume: ResumeController,
    tracker: PresentationTracker,
    settings: UpdaterSettings,
    download_dir: PathBuf,
}

impl ControlPlane {
    pub fn new(config: &ControlPlaneConfig, settings: UpdaterSettings) -> Self {
        Self {
            store: RecordStore::new(),
            dispatcher: InstallDispatcher::new(config.battery),
            resume: ResumeController::new(settings.warn_on_mobile_data),
            tracker: PresentationTracker::new(),
            settings,
            download_dir: config.download_dir.clone(),
        }
    }

    // ========== Queries ==========

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn dispatcher(&self) -> &InstallDispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &UpdaterSettings {
        &self.settings
    }

    /// Presentation currently rendered, if any.
    pub fn presentation(&self) -> Option<&Presentation> {
        self.tracker.shown()
    }

    pub fn is_installing(&self) -> bool {
        self.dispatcher.is_installing()
    }

    /// No download keeps the host busy and no install is in flight.
    pub fn is_idle(&self) -> bool {
        !self.store.has_busy_downloads() && !self.dispatcher.is_installing()
    }

    pub fn snapshot(&self) -> Vec<UpdateSnapshot> {
        self.store
            .iter()
            .map(|entry| UpdateSnapshot {
                record: entry.record.clone(),
                state: entry.state,
                progress: entry.progress.clone(),
                action: resolve_primary_action(&entry.record, entry.progress.as_ref()),
            })
            .collect()
    }

    // ========== Commands ==========

    /// Replace the catalog, keeping records that are still in use.
    pub fn replace_catalog(&mut self, records: Vec<UpdateRecord>) -> (CatalogDiff, Vec<Effect>) {
        let diff = self.store.replace_catalog(records);
        let mut effects = Vec::new();

        for tag in &diff.superseded {
            if self.settings.auto_delete_updates {
                effects.push(Effect::Transfer(TransferCommand::Remove { tag: tag.clone() }));
            }
            effects.push(Effect::Publish(UpdateEvent::Removed { tag: tag.clone() }));
            self.release_subject(tag, &mut effects);
        }
        effects.push(Effect::Publish(UpdateEvent::CatalogUpdated {
            added: diff.added.clone(),
            superseded: diff.superseded.clone(),
        }));

        (diff, effects)
    }

    /// Apply a user download control action.
    pub fn download_control(&mut self, tag: &str, action: DownloadAction) -> Result<Vec<Effect>> {
        if action != DownloadAction::Pause
            && let Some(install) = self.dispatcher.in_flight()
        {
            return Err(if install.tag == tag {
                Error::InstallInProgress {
                    tag: tag.to_string(),
                }
            } else {
                Error::InstallAlreadyRunning {
                    tag: install.tag.clone(),
                }
            });
        }

        let before = self.store.get(tag).cloned();
        let command = DownloadLifecycle::new(&mut self.store).apply(tag, action)?;
        if command.is_none() && self.store.get(tag) == before.as_ref() {
            return Ok(Vec::new());
        }

        let mut effects = Vec::new();
        if let Some(command) = command {
            effects.push(Effect::Transfer(command));
        }
        self.publish_status(tag, &mut effects);
        self.focus(tag, &mut effects);
        Ok(effects)
    }

    /// Delete `tag`, cancelling its transfer.
    pub fn delete(&mut self, tag: &str) -> Result<Vec<Effect>> {
        let (_, command) = DownloadLifecycle::new(&mut self.store).delete(tag)?;

        let mut effects = vec![
            Effect::Transfer(command),
            Effect::Publish(UpdateEvent::Removed {
                tag: tag.to_string(),
            }),
        ];
        self.release_subject(tag, &mut effects);
        Ok(effects)
    }

    /// Apply a transfer engine callback.
    pub fn on_transfer_event(&mut self, event: TransferEvent) -> Vec<Effect> {
        let tag = event.tag().to_string();
        let before = self
            .store
            .get(&tag)
            .map(|e| (e.record.status, e.state));

        let command = match DownloadLifecycle::new(&mut self.store).on_event(event) {
            EventOutcome::Ignored => return Vec::new(),
            EventOutcome::Applied { command, .. } => command,
        };

        let mut effects = Vec::new();
        if let Some(command) = command {
            effects.push(Effect::Transfer(command));
        }
        if let Some(entry) = self.store.get(&tag) {
            if let Some(progress) = &entry.progress {
                effects.push(Effect::Publish(UpdateEvent::DownloadProgress {
                    progress: progress.clone(),
                }));
            }
            if before != Some((entry.record.status, entry.state)) {
                self.publish_status(&tag, &mut effects);
            }
        }
        self.observe(&tag, &mut effects);
        effects
    }

    /// React to a connectivity transition.
    pub fn on_connectivity(&mut self, event: ConnectivityEvent) -> Vec<Effect> {
        let Some(tag) = self.resume.on_connectivity(&event, &self.store) else {
            return Vec::new();
        };
        match self.download_control(&tag, DownloadAction::Resume) {
            Ok(effects) => effects,
            Err(e) => {
                warn!(tag = %tag, error = %e, "Automatic resume rejected");
                Vec::new()
            }
        }
    }

    /// Validate an install request and return the package path to inspect.
    pub fn prepare_install(&self, tag: &str, battery: &BatteryStatus) -> Result<PathBuf> {
        self.dispatcher
            .prepare(&self.store, tag, battery, &self.download_dir)
    }

    /// Commit an install of an inspected package.
    pub fn accept_install(
        &mut self,
        tag: &str,
        path: PathBuf,
        package: PackageInfo,
    ) -> Result<Vec<Effect>> {
        let request = self.dispatcher.accept(&mut self.store, tag, path, package)?;

        let mut effects = vec![Effect::Install(request)];
        self.publish_status(tag, &mut effects);
        self.focus(tag, &mut effects);
        Ok(effects)
    }

    /// Record a failed install hand-off.
    pub fn fail_install(&mut self, tag: &str, error: &Error) -> Vec<Effect> {
        self.dispatcher.fail(&mut self.store, tag, error);

        let mut effects = Vec::new();
        self.publish_status(tag, &mut effects);
        self.focus(tag, &mut effects);
        effects
    }

    /// Apply an installer callback.
    pub fn on_install_event(&mut self, event: InstallEvent) -> Vec<Effect> {
        if !self.dispatcher.on_event(&mut self.store, &event) {
            return Vec::new();
        }

        let mut effects = Vec::new();
        match &event {
            InstallEvent::Progress {
                tag,
                fraction,
                finalizing,
            } => effects.push(Effect::Publish(UpdateEvent::InstallProgress {
                tag: tag.clone(),
                fraction: *fraction,
                finalizing: *finalizing,
            })),
            InstallEvent::Installed { tag } | InstallEvent::Failed { tag, .. } => {
                self.publish_status(tag, &mut effects);
            }
        }
        self.focus(event.tag(), &mut effects);
        effects
    }

    /// Cancel the running streaming install.
    pub fn install_stop(&self) -> Result<Vec<Effect>> {
        let install = self.dispatcher.cancellable()?;
        debug!(tag = %install.tag, "Cancelling installation");
        Ok(vec![Effect::CancelInstall(install.kind)])
    }

    /// Adopt an install a backend reports from its durable state.
    pub fn recover_install(&mut self, tag: &str, kind: PackageKind) -> Vec<Effect> {
        if self.dispatcher.is_installing() {
            return Vec::new();
        }
        self.dispatcher.recover(&mut self.store, tag, kind);

        let mut effects = vec![Effect::Reconnect(kind)];
        self.publish_status(tag, &mut effects);
        self.focus(tag, &mut effects);
        effects
    }

    /// Update the mobile data warning; returns the settings to persist.
    pub fn set_warn_on_mobile_data(&mut self, warn: bool) -> UpdaterSettings {
        self.settings.warn_on_mobile_data = warn;
        self.resume.set_warn_on_mobile_data(warn);
        self.settings.clone()
    }

    // ========== Presentation ==========

    fn projection(&self, tag: &str) -> Option<Projection> {
        let entry = self.store.get(tag)?;
        let installer = self
            .dispatcher
            .in_flight()
            .filter(|i| i.tag == tag)
            .map(|i| i.kind);
        Some(project(
            &entry.record,
            &entry.progress_or_default(),
            entry.last_retry,
            installer,
        ))
    }

    /// Whether `tag` is the most recently active tag.
    fn is_active(&self, tag: &str) -> bool {
        self.store.get(tag).is_some_and(|e| e.state.is_busy())
            || self.dispatcher.in_flight().is_some_and(|i| i.tag == tag)
    }

    fn focus(&mut self, tag: &str, effects: &mut Vec<Effect>) {
        if let Some(projection) = self.projection(tag) {
            if let Some(command) = self.tracker.focus(projection) {
                effects.push(Effect::Render(command));
            }
        }
    }

    fn observe(&mut self, tag: &str, effects: &mut Vec<Effect>) {
        if let Some(projection) = self.projection(tag) {
            let active = self.is_active(tag);
            if let Some(command) = self.tracker.observe(projection, active) {
                effects.push(Effect::Render(command));
            }
        }
    }

    /// Hand the presentation slot to another active tag, or clear it.
    fn release_subject(&mut self, tag: &str, effects: &mut Vec<Effect>) {
        let replacement = self
            .store
            .busy_other_than(tag)
            .map(str::to_string)
            .or_else(|| self.dispatcher.in_flight().map(|i| i.tag.clone()))
            .and_then(|other| self.projection(&other));
        if let Some(command) = self.tracker.removed(tag, replacement) {
            effects.push(Effect::Render(command));
        }
    }

    fn publish_status(&self, tag: &str, effects: &mut Vec<Effect>) {
        if let Some(entry) = self.store.get(tag) {
            effects.push(Effect::Publish(UpdateEvent::StatusChanged {
                tag: tag.to_string(),
                status: entry.record.status,
                state: entry.state,
            }));
        }
    }
}
