//! Resolution of the single primary action offered for an update.

use serde::{Deserialize, Serialize};

use crate::domain::{DownloadProgress, ProgressStatus, UpdateRecord, UpdateStatus};

/// What a single "action button" for an update should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryAction {
    Start,
    Pause,
    Resume,
    /// Discard the corrupt payload and download again.
    Restart,
    Install,
    Reboot,
    /// Nothing to do while the transfer is queued or installing.
    None,
}

/// Resolve the primary action from the record and its latest snapshot.
pub fn resolve_primary_action(
    record: &UpdateRecord,
    progress: Option<&DownloadProgress>,
) -> PrimaryAction {
    match record.status {
        UpdateStatus::Installing => return PrimaryAction::None,
        UpdateStatus::Installed => return PrimaryAction::Reboot,
        UpdateStatus::InstallationFailed => return PrimaryAction::Install,
        _ => {}
    }

    let Some(progress) = progress else {
        return PrimaryAction::Start;
    };

    match progress.status {
        ProgressStatus::Waiting => PrimaryAction::None,
        ProgressStatus::Loading => PrimaryAction::Pause,
        ProgressStatus::Finish => PrimaryAction::Install,
        // A failure on a fully received payload means it was rejected
        ProgressStatus::Error if progress.is_complete() => PrimaryAction::Restart,
        ProgressStatus::Error | ProgressStatus::Pause | ProgressStatus::None => {
            PrimaryAction::Resume
        }
    }
}
