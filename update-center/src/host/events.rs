//! State changes published to attached observers.

use serde::Serialize;

use crate::domain::{DownloadProgress, UpdateRecord, UpdateStatus};
use crate::downloader::{DownloadState, PrimaryAction};

/// Event broadcast after every state mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    StatusChanged {
        tag: String,
        status: UpdateStatus,
        state: DownloadState,
    },
    DownloadProgress {
        progress: DownloadProgress,
    },
    InstallProgress {
        tag: String,
        fraction: f32,
        finalizing: bool,
    },
    Removed {
        tag: String,
    },
    CatalogUpdated {
        added: Vec<String>,
        superseded: Vec<String>,
    },
}

impl UpdateEvent {
    /// Get a short description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::StatusChanged { tag, status, state } => {
                format!("{} is {} ({})", tag, status, state)
            }
            Self::DownloadProgress { progress } => {
                format!("{} {} {}%", progress.tag, progress.status, progress.percent())
            }
            Self::InstallProgress { tag, fraction, .. } => {
                format!("{} installing {:.0}%", tag, fraction * 100.0)
            }
            Self::Removed { tag } => format!("{} removed", tag),
            Self::CatalogUpdated { added, superseded } => format!(
                "catalog updated: {} new, {} superseded",
                added.len(),
                superseded.len()
            ),
        }
    }
}

/// Read model of one update, returned to observers on request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateSnapshot {
    pub record: UpdateRecord,
    pub state: DownloadState,
    pub progress: Option<DownloadProgress>,
    pub action: PrimaryAction,
}
