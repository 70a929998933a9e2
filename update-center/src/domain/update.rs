//! Update records and their status machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Status of an update package, mutated by the lifecycle manager and the
/// installation dispatcher only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateStatus {
    /// Parsed from the catalog, nothing downloaded yet.
    #[default]
    Unknown,
    /// A transfer was requested and is queued in the engine.
    Starting,
    /// Bytes are flowing.
    Downloading,
    /// The transfer is suspended.
    Paused,
    /// The package is fully downloaded.
    Verified,
    /// Handed to an installer backend.
    Installing,
    Installed,
    InstallationFailed,
    /// Terminal removal marker.
    Deleted,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Starting => "STARTING",
            Self::Downloading => "DOWNLOADING",
            Self::Paused => "PAUSED",
            Self::Verified => "VERIFIED",
            Self::Installing => "INSTALLING",
            Self::Installed => "INSTALLED",
            Self::InstallationFailed => "INSTALLATION_FAILED",
            Self::Deleted => "DELETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN" => Some(Self::Unknown),
            "STARTING" => Some(Self::Starting),
            "DOWNLOADING" => Some(Self::Downloading),
            "PAUSED" => Some(Self::Paused),
            "VERIFIED" => Some(Self::Verified),
            "INSTALLING" => Some(Self::Installing),
            "INSTALLED" => Some(Self::Installed),
            "INSTALLATION_FAILED" => Some(Self::InstallationFailed),
            "DELETED" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Validate a status transition.
    pub fn can_transition_to(&self, target: UpdateStatus) -> bool {
        use UpdateStatus::*;

        match (self, target) {
            (from, to) if *from == to => true,

            // Nothing leaves INSTALLING except the installer's verdict
            (Installing, Installed | InstallationFailed) => true,
            (Installing, _) => false,

            // DELETED is terminal
            (Deleted, _) => false,
            (_, Deleted) => true,

            // start and restart
            (_, Starting) => true,

            (Unknown | Starting | Paused, Downloading) => true,
            (Unknown | Starting | Downloading, Paused) => true,
            (Unknown | Starting | Downloading | Paused, Verified) => true,

            (Verified | InstallationFailed, Installing) => true,
            // The package could not be handed to an installer
            (Verified, InstallationFailed) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new status.
    pub fn transition_to(&self, tag: &str, target: UpdateStatus) -> Result<UpdateStatus, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::invalid_transition(tag, self, target))
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single update package offered by the catalog.
///
/// The package name is the unique key and doubles as the download tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub name: String,
    #[serde(default)]
    pub display_version: String,
    /// Content hash published by the catalog.
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub diff_size: u64,
    #[serde(default)]
    pub published_at: DateTime<Utc>,
    pub url: String,
    #[serde(default)]
    pub status: UpdateStatus,
    /// Install progress in `[0, 1]`.
    #[serde(default)]
    pub install_progress: f32,
    /// The installer entered its non-cancellable commit phase.
    #[serde(default)]
    pub finalizing: bool,
}

impl UpdateRecord {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_version: String::new(),
            hash: String::new(),
            size: 0,
            diff_size: 0,
            published_at: Utc::now(),
            url: url.into(),
            status: UpdateStatus::Unknown,
            install_progress: 0.0,
            finalizing: false,
        }
    }

    pub fn with_display_version(mut self, version: impl Into<String>) -> Self {
        self.display_version = version.into();
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    pub fn with_sizes(mut self, size: u64, diff_size: u64) -> Self {
        self.size = size;
        self.diff_size = diff_size;
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = published_at;
        self
    }

    pub fn with_status(mut self, status: UpdateStatus) -> Self {
        self.status = status;
        self
    }

    /// The download tag of this record.
    pub fn tag(&self) -> &str {
        &self.name
    }

    /// Human readable title, falling back to the package name.
    pub fn title(&self) -> &str {
        if self.display_version.is_empty() {
            &self.name
        } else {
            &self.display_version
        }
    }

    /// Move to `target`, rejecting transitions the status machine forbids.
    pub fn set_status(&mut self, target: UpdateStatus) -> Result<(), Error> {
        self.status = self.status.transition_to(&self.name, target)?;
        Ok(())
    }
}
