//! Download lifecycle state machine.
//!
//! The lifecycle manager is the only writer of download state in the record
//! store. Every operation validates the transition, mutates the entry and
//! returns the command to hand to the transfer engine, if any.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{DownloadProgress, ProgressStatus, UpdateStatus};
use crate::{Error, Result};

use super::{
    DownloadState, RecordStore, RetryAction, StoreEntry, TransferCommand, TransferEvent, classify,
};

/// User-facing download control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadAction {
    Start,
    Pause,
    Resume,
    Restart,
}

impl DownloadAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Restart => "restart",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "restart" => Some(Self::Restart),
            _ => None,
        }
    }
}

impl fmt::Display for DownloadAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying a transfer engine callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The tag is unknown, typically a late callback after delete.
    Ignored,
    Applied {
        /// Automatic retry command for the engine.
        command: Option<TransferCommand>,
        /// Classification when the callback reported a failure.
        retry: Option<RetryAction>,
    },
}

/// Lifecycle manager operating on a borrowed record store.
pub struct DownloadLifecycle<'a> {
    store: &'a mut RecordStore,
}

impl<'a> DownloadLifecycle<'a> {
    pub fn new(store: &'a mut RecordStore) -> Self {
        Self { store }
    }

    /// Apply a user download control action.
    pub fn apply(&mut self, tag: &str, action: DownloadAction) -> Result<Option<TransferCommand>> {
        match action {
            DownloadAction::Start => self.start(tag).map(Some),
            DownloadAction::Pause => self.pause(tag),
            DownloadAction::Resume => self.resume(tag),
            DownloadAction::Restart => self.restart(tag).map(Some),
        }
    }

    // ========== Commands ==========

    /// Queue a new transfer for `tag`.
    pub fn start(&mut self, tag: &str) -> Result<TransferCommand> {
        let entry = self.entry(tag)?;
        if entry.state.is_transferring() {
            return Err(Error::AlreadyActive {
                tag: tag.to_string(),
            });
        }
        if !matches!(entry.state, DownloadState::Idle | DownloadState::Error(_)) {
            return Err(Error::invalid_transition(
                tag,
                entry.state,
                DownloadState::Waiting,
            ));
        }
        self.ensure_no_other_transfer(tag)?;

        let entry = self.entry_mut(tag)?;
        entry.record.set_status(UpdateStatus::Starting)?;
        let url = entry.record.url.clone();
        let prior = entry.state;
        Self::enter_waiting(entry, false);
        self.store.set_current_transfer(tag);

        info!(tag = %tag, prior = %prior, "Download started");
        Ok(TransferCommand::Start {
            tag: tag.to_string(),
            url,
        })
    }

    /// Pause the transfer of `tag`. Pausing a paused download is a no-op.
    pub fn pause(&mut self, tag: &str) -> Result<Option<TransferCommand>> {
        let entry = self.entry_mut(tag)?;
        match entry.state {
            DownloadState::Paused => {
                debug!(tag = %tag, "Download already paused");
                Ok(None)
            }
            DownloadState::Waiting | DownloadState::Active => {
                if entry.record.status.can_transition_to(UpdateStatus::Paused) {
                    entry.record.status = UpdateStatus::Paused;
                }
                let prior = entry.state;
                entry.state = DownloadState::Paused;
                entry.last_retry = None;
                entry.progress = Some(Self::with_status(entry, ProgressStatus::Pause));

                info!(tag = %tag, prior = %prior, "Download paused");
                Ok(Some(TransferCommand::Pause {
                    tag: tag.to_string(),
                }))
            }
            DownloadState::Error(RetryAction::WaitForNetwork) => {
                // The engine was already paused when the network dropped
                if entry.record.status.can_transition_to(UpdateStatus::Paused) {
                    entry.record.status = UpdateStatus::Paused;
                }
                entry.state = DownloadState::Paused;
                entry.last_retry = None;
                entry.progress = Some(Self::with_status(entry, ProgressStatus::Pause));
                info!(tag = %tag, "Network wait converted to user pause");
                Ok(None)
            }
            other => Err(Error::invalid_transition(tag, other, DownloadState::Paused)),
        }
    }

    /// Resume a paused or network-suspended transfer.
    pub fn resume(&mut self, tag: &str) -> Result<Option<TransferCommand>> {
        let state = self.entry(tag)?.state;
        if state.is_transferring() {
            debug!(tag = %tag, state = %state, "Download already running");
            return Ok(None);
        }
        if !state.is_resumable() {
            return Err(Error::invalid_transition(tag, state, DownloadState::Waiting));
        }
        self.ensure_no_other_transfer(tag)?;

        let entry = self.entry_mut(tag)?;
        entry.record.set_status(UpdateStatus::Starting)?;
        Self::enter_waiting(entry, false);
        self.store.set_current_transfer(tag);

        info!(tag = %tag, prior = %state, "Download resumed");
        Ok(Some(TransferCommand::Resume {
            tag: tag.to_string(),
        }))
    }

    /// Discard partial data and transfer `tag` again.
    pub fn restart(&mut self, tag: &str) -> Result<TransferCommand> {
        let entry = self.entry(tag)?;
        if entry.record.status == UpdateStatus::Installing {
            return Err(Error::InstallInProgress {
                tag: tag.to_string(),
            });
        }
        self.ensure_no_other_transfer(tag)?;

        let entry = self.entry_mut(tag)?;
        let prior = entry.state;
        entry.record.set_status(UpdateStatus::Starting)?;
        entry.record.install_progress = 0.0;
        entry.record.finalizing = false;
        Self::enter_waiting(entry, true);
        self.store.set_current_transfer(tag);

        info!(tag = %tag, prior = %prior, "Download restarted");
        Ok(TransferCommand::Restart {
            tag: tag.to_string(),
        })
    }

    /// Remove `tag` from the store and cancel its transfer.
    pub fn delete(&mut self, tag: &str) -> Result<(StoreEntry, TransferCommand)> {
        if self.entry(tag)?.record.status == UpdateStatus::Installing {
            return Err(Error::InstallInProgress {
                tag: tag.to_string(),
            });
        }

        let mut entry = self
            .store
            .remove(tag)
            .ok_or_else(|| Error::not_found(tag))?;
        let prior = entry.state;
        entry.record.status = UpdateStatus::Deleted;

        info!(tag = %tag, prior = %prior, "Download deleted");
        Ok((
            entry,
            TransferCommand::Remove {
                tag: tag.to_string(),
            },
        ))
    }

    // ========== Engine callbacks ==========

    /// Apply a transfer engine callback to the tag it names.
    pub fn on_event(&mut self, event: TransferEvent) -> EventOutcome {
        let progress = event.into_progress();
        let tag = progress.tag.clone();
        let Some(entry) = self.store.get_mut(&tag) else {
            debug!(tag = %tag, status = %progress.status, "Ignoring callback for unknown tag");
            return EventOutcome::Ignored;
        };

        let prior = entry.state;
        if prior == DownloadState::Paused
            && matches!(
                progress.status,
                ProgressStatus::Waiting | ProgressStatus::Loading | ProgressStatus::Error
            )
        {
            // The engine may still report the transfer the user just paused
            debug!(
                tag = %tag,
                status = %progress.status,
                "Ignoring late callback for paused download"
            );
            Self::refresh_bytes(entry, progress);
            return EventOutcome::Applied {
                command: None,
                retry: None,
            };
        }

        match progress.status {
            ProgressStatus::None => {
                if prior != DownloadState::Waiting {
                    entry.state = DownloadState::Idle;
                }
                entry.progress = Some(progress);
            }
            ProgressStatus::Waiting => {
                Self::advance_status(entry, UpdateStatus::Starting);
                entry.state = DownloadState::Waiting;
                entry.progress = Some(progress);
            }
            ProgressStatus::Loading => {
                Self::advance_status(entry, UpdateStatus::Downloading);
                entry.state = DownloadState::Active;
                entry.last_retry = None;
                entry.handshake_retried = false;
                entry.progress = Some(progress);
            }
            ProgressStatus::Pause if prior.is_waiting_for_network() => {
                // Acknowledgement of the pause issued for the network wait
                Self::refresh_bytes(entry, progress);
            }
            ProgressStatus::Pause => {
                Self::advance_status(entry, UpdateStatus::Paused);
                entry.state = DownloadState::Paused;
                entry.progress = Some(progress);
            }
            ProgressStatus::Finish => {
                Self::advance_status(entry, UpdateStatus::Verified);
                entry.state = DownloadState::Finished;
                entry.last_retry = None;
                entry.progress = Some(progress);
            }
            ProgressStatus::Error => return Self::on_failure(entry, progress),
        }

        if entry.state != prior {
            debug!(tag = %tag, prior = %prior, state = %entry.state, "Download state changed");
        }
        EventOutcome::Applied {
            command: None,
            retry: None,
        }
    }

    fn on_failure(entry: &mut StoreEntry, progress: DownloadProgress) -> EventOutcome {
        let tag = entry.tag().to_string();
        let prior = entry.state;
        let mut action = classify(progress.fault.as_ref(), progress.is_complete());
        if action == RetryAction::RetryOnce && entry.handshake_retried {
            action = RetryAction::WaitForNetwork;
        }

        let fault = progress
            .fault
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unspecified".to_string());
        warn!(
            tag = %tag,
            prior = %prior,
            fault = %fault,
            action = %action,
            class = ?action.class(),
            "Transfer failed"
        );

        entry.progress = Some(progress);
        entry.last_retry = Some(action);

        let command = match action {
            RetryAction::ImmediateRestart => {
                // The engine discards partial data on restart
                Self::advance_status(entry, UpdateStatus::Starting);
                entry.state = DownloadState::Waiting;
                entry.progress = Some(DownloadProgress::reset(&tag));
                Some(TransferCommand::Restart { tag })
            }
            RetryAction::RetryOnce | RetryAction::GenericRestart => {
                if action == RetryAction::RetryOnce {
                    entry.handshake_retried = true;
                }
                Self::advance_status(entry, UpdateStatus::Starting);
                entry.state = DownloadState::Waiting;
                Some(TransferCommand::Start {
                    tag,
                    url: entry.record.url.clone(),
                })
            }
            RetryAction::WaitForNetwork => {
                Self::advance_status(entry, UpdateStatus::Paused);
                entry.state = DownloadState::Error(action);
                Some(TransferCommand::Pause { tag })
            }
            RetryAction::TerminalVerification | RetryAction::TerminalNotFound => {
                entry.state = DownloadState::Error(action);
                None
            }
        };

        EventOutcome::Applied {
            command,
            retry: Some(action),
        }
    }

    // ========== Helpers ==========

    fn entry(&self, tag: &str) -> Result<&StoreEntry> {
        self.store.get(tag).ok_or_else(|| Error::not_found(tag))
    }

    fn entry_mut(&mut self, tag: &str) -> Result<&mut StoreEntry> {
        self.store.get_mut(tag).ok_or_else(|| Error::not_found(tag))
    }

    fn ensure_no_other_transfer(&self, tag: &str) -> Result<()> {
        match self.store.busy_other_than(tag) {
            Some(active) => Err(Error::DownloadAlreadyRunning {
                active: active.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Move the entry to `Waiting` with a fresh `WAITING` snapshot.
    fn enter_waiting(entry: &mut StoreEntry, discard: bool) {
        let mut progress = if discard {
            DownloadProgress::reset(entry.tag())
        } else {
            Self::with_status(entry, ProgressStatus::Waiting)
        };
        progress.fault = None;
        entry.progress = Some(progress);
        entry.state = DownloadState::Waiting;
        entry.last_retry = None;
        entry.handshake_retried = false;
    }

    /// Take the byte counts of `progress`, keeping the stored status.
    fn refresh_bytes(entry: &mut StoreEntry, progress: DownloadProgress) {
        match entry.progress.as_mut() {
            Some(stored) => {
                stored.current = progress.current;
                stored.total = progress.total;
                stored.fraction = progress.fraction;
            }
            None => {
                let mut progress = progress;
                progress.status = ProgressStatus::Pause;
                progress.fault = None;
                entry.progress = Some(progress);
            }
        }
    }

    /// Copy of the current snapshot with a new status and no fault.
    fn with_status(entry: &StoreEntry, status: ProgressStatus) -> DownloadProgress {
        let mut progress = entry.progress_or_default();
        progress.status = status;
        progress.fault = None;
        progress.rate_eta = None;
        progress
    }

    /// Apply an engine-driven status change, keeping installer-owned statuses.
    fn advance_status(entry: &mut StoreEntry, target: UpdateStatus) {
        if entry.record.status.can_transition_to(target) {
            entry.record.status = target;
        } else {
            debug!(
                tag = %entry.tag(),
                status = %entry.record.status,
                target = %target,
                "Keeping record status"
            );
        }
    }
}
