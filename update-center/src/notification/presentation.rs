use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress shown alongside a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressIndicator {
    Hidden,
    Indeterminate,
    Determinate { current: u64, max: u64 },
}

/// Action offered on a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationAction {
    Pause,
    Resume,
    Restart,
    Reboot,
}

/// Main text of a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Headline {
    Starting,
    Downloading,
    Paused,
    WaitingForNetwork,
    VerificationFailed,
    NotFound,
    Completed,
    PreparingPackage,
    PreparingFirstBoot,
    Finalizing,
    Installed,
    InstallationFailed,
}

impl fmt::Display for Headline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Starting => "Starting download",
            Self::Downloading => "Downloading",
            Self::Paused => "Download paused",
            Self::WaitingForNetwork => "Waiting for network",
            Self::VerificationFailed => "Verification failed",
            Self::NotFound => "Update no longer available",
            Self::Completed => "Download completed",
            Self::PreparingPackage => "Preparing update package",
            Self::PreparingFirstBoot => "Preparing for first boot",
            Self::Finalizing => "Finalizing installation",
            Self::Installed => "Update installed, reboot to apply",
            Self::InstallationFailed => "Installation failed",
        };
        f.write_str(text)
    }
}

/// Renderer-agnostic description of what is shown for one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presentation {
    pub tag: String,
    pub title: String,
    pub headline: Headline,
    /// Secondary text, such as the remaining time.
    pub detail: Option<String>,
    pub progress: ProgressIndicator,
    pub actions: Vec<PresentationAction>,
    /// Stays visible until the control plane replaces or clears it.
    pub persistent: bool,
    /// The user may swipe it away.
    pub dismissible: bool,
    /// Disappears when the user acts on it.
    pub auto_cancel: bool,
}

impl Presentation {
    pub(crate) fn new(tag: &str, title: &str, headline: Headline) -> Self {
        Self {
            tag: tag.to_string(),
            title: title.to_string(),
            headline,
            detail: None,
            progress: ProgressIndicator::Hidden,
            actions: Vec::new(),
            persistent: false,
            dismissible: true,
            auto_cancel: false,
        }
    }

    pub(crate) fn ongoing(mut self) -> Self {
        self.persistent = true;
        self.dismissible = false;
        self
    }

    pub(crate) fn with_progress(mut self, progress: ProgressIndicator) -> Self {
        self.progress = progress;
        self
    }

    pub(crate) fn with_action(mut self, action: PresentationAction) -> Self {
        self.actions.push(action);
        self
    }

    pub(crate) fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    pub(crate) fn auto_cancel(mut self) -> Self {
        self.auto_cancel = true;
        self
    }
}
