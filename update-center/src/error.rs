//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Update not found: {tag}")]
    NotFound { tag: String },

    #[error("Download already active for {tag}")]
    AlreadyActive { tag: String },

    #[error("Another download is running: {active}")]
    DownloadAlreadyRunning { active: String },

    #[error("An installation is already running: {tag}")]
    InstallAlreadyRunning { tag: String },

    #[error("Update {tag} is being installed")]
    InstallInProgress { tag: String },

    #[error("Battery too low: {level}% (requires {required}%)")]
    BatteryTooLow { level: u8, required: u8 },

    #[error("Package for {tag} is not downloaded")]
    PackageNotReady { tag: String },

    #[error("Invalid state transition for {tag}: cannot transition from {from} to {to}")]
    InvalidStateTransition {
        tag: String,
        from: String,
        to: String,
    },

    #[error("No cancellable installation in progress")]
    InstallNotCancellable,

    #[error("Package error: {0}")]
    Package(#[from] ota_package::PackageError),

    #[error("Transfer engine error: {0}")]
    Transfer(String),

    #[error("Installer error: {0}")]
    Installer(String),

    #[error("Control plane host has stopped")]
    HostStopped,

    #[error("Host mailbox error: {0}")]
    Mailbox(#[from] crate::host::SendError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(tag: impl Into<String>) -> Self {
        Self::NotFound { tag: tag.into() }
    }

    pub fn invalid_transition(
        tag: impl Into<String>,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidStateTransition {
            tag: tag.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
