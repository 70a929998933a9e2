use std::fmt;

use serde::{Deserialize, Serialize};

use super::RetryAction;

/// Per-tag download state owned by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "action", rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    Idle,
    /// A transfer command was issued and the engine has not reported bytes yet.
    Waiting,
    Active,
    Paused,
    /// The last transfer failed with a non-automatic classification.
    Error(RetryAction),
    Finished,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Error(_) => "error",
            Self::Finished => "finished",
        }
    }

    /// A transfer is queued or running.
    pub fn is_transferring(&self) -> bool {
        matches!(self, Self::Waiting | Self::Active)
    }

    /// The download is suspended waiting for connectivity.
    pub fn is_waiting_for_network(&self) -> bool {
        matches!(self, Self::Error(RetryAction::WaitForNetwork))
    }

    /// The download has work pending that keeps the host alive.
    pub fn is_busy(&self) -> bool {
        self.is_transferring() || self.is_waiting_for_network()
    }

    /// The download can be resumed without discarding data.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Paused) || self.is_waiting_for_network()
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(action) => write!(f, "error({})", action),
            other => f.write_str(other.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_states() {
        assert!(DownloadState::Waiting.is_busy());
        assert!(DownloadState::Active.is_busy());
        assert!(DownloadState::Error(RetryAction::WaitForNetwork).is_busy());
        assert!(!DownloadState::Paused.is_busy());
        assert!(!DownloadState::Error(RetryAction::TerminalVerification).is_busy());
        assert!(!DownloadState::Finished.is_busy());
    }

    #[test]
    fn test_display() {
        assert_eq!(DownloadState::Active.to_string(), "active");
        assert_eq!(
            DownloadState::Error(RetryAction::WaitForNetwork).to_string(),
            "error(wait_for_network)"
        );
    }
}
