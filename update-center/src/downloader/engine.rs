//! Transfer engine contract.
//!
//! The engine performs the byte transfer off the serialization queue. Its
//! callbacks re-enter the control plane as [`TransferEvent`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Result;
use crate::domain::DownloadProgress;

/// Command issued by the lifecycle manager to the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferCommand {
    Start { tag: String, url: String },
    Pause { tag: String },
    Resume { tag: String },
    /// Discard partial data and transfer again.
    Restart { tag: String },
    Remove { tag: String },
}

impl TransferCommand {
    pub fn tag(&self) -> &str {
        match self {
            Self::Start { tag, .. }
            | Self::Pause { tag }
            | Self::Resume { tag }
            | Self::Restart { tag }
            | Self::Remove { tag } => tag,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Pause { .. } => "pause",
            Self::Resume { .. } => "resume",
            Self::Restart { .. } => "restart",
            Self::Remove { .. } => "remove",
        }
    }
}

/// Callback from the transfer engine, always carrying the full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "progress", rename_all = "snake_case")]
pub enum TransferEvent {
    StatusChanged(DownloadProgress),
    Progress(DownloadProgress),
    Error(DownloadProgress),
}

impl TransferEvent {
    pub fn progress(&self) -> &DownloadProgress {
        match self {
            Self::StatusChanged(p) | Self::Progress(p) | Self::Error(p) => p,
        }
    }

    pub fn into_progress(self) -> DownloadProgress {
        match self {
            Self::StatusChanged(p) | Self::Progress(p) | Self::Error(p) => p,
        }
    }

    pub fn tag(&self) -> &str {
        &self.progress().tag
    }
}

/// Transfer engine performing HTTP range requests and persisting partial data.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    async fn start(&self, tag: &str, url: &str) -> Result<()>;
    async fn pause(&self, tag: &str) -> Result<()>;
    async fn resume(&self, tag: &str) -> Result<()>;
    async fn restart(&self, tag: &str) -> Result<()>;
    async fn remove(&self, tag: &str) -> Result<()>;

    /// Execute a lifecycle command.
    async fn execute(&self, command: &TransferCommand) -> Result<()> {
        match command {
            TransferCommand::Start { tag, url } => self.start(tag, url).await,
            TransferCommand::Pause { tag } => self.pause(tag).await,
            TransferCommand::Resume { tag } => self.resume(tag).await,
            TransferCommand::Restart { tag } => self.restart(tag).await,
            TransferCommand::Remove { tag } => self.remove(tag).await,
        }
    }
}

/// Engine that accepts every command and never reports progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTransferEngine;

#[async_trait]
impl TransferEngine for NoOpTransferEngine {
    async fn start(&self, tag: &str, url: &str) -> Result<()> {
        debug!(tag = %tag, url = %url, "NoOp transfer start");
        Ok(())
    }

    async fn pause(&self, tag: &str) -> Result<()> {
        debug!(tag = %tag, "NoOp transfer pause");
        Ok(())
    }

    async fn resume(&self, tag: &str) -> Result<()> {
        debug!(tag = %tag, "NoOp transfer resume");
        Ok(())
    }

    async fn restart(&self, tag: &str) -> Result<()> {
        debug!(tag = %tag, "NoOp transfer restart");
        Ok(())
    }

    async fn remove(&self, tag: &str) -> Result<()> {
        debug!(tag = %tag, "NoOp transfer remove");
        Ok(())
    }
}
