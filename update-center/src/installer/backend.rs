//! Installer backend contract.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ota_package::{PackageInfo, PackageKind};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Error, Result};

/// Package handed to an installer backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub tag: String,
    pub path: PathBuf,
    pub package: PackageInfo,
}

/// Callback from an installer backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InstallEvent {
    Progress {
        tag: String,
        /// Fraction in `[0, 1]`.
        fraction: f32,
        /// The backend entered its non-cancellable commit phase.
        #[serde(default)]
        finalizing: bool,
    },
    Installed {
        tag: String,
    },
    Failed {
        tag: String,
        reason: String,
    },
}

impl InstallEvent {
    pub fn tag(&self) -> &str {
        match self {
            Self::Progress { tag, .. } | Self::Installed { tag } | Self::Failed { tag, .. } => tag,
        }
    }
}

/// Backend that applies a package to the device.
///
/// Progress is reported asynchronously as [`InstallEvent`]s.
#[async_trait]
pub trait InstallerBackend: Send + Sync {
    /// Package format this backend applies.
    fn kind(&self) -> PackageKind;

    async fn install(&self, request: &InstallRequest) -> Result<()>;

    /// Re-attach to an install started before the host restarted.
    async fn reconnect(&self) -> Result<()>;

    /// Abort the running install.
    async fn cancel(&self) -> Result<()> {
        Err(Error::InstallNotCancellable)
    }

    /// Tag of an install in progress according to the backend's durable state.
    async fn in_flight(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// The two installer backends, selected by package format.
#[derive(Clone)]
pub struct Installers {
    streaming: Arc<dyn InstallerBackend>,
    legacy: Arc<dyn InstallerBackend>,
}

impl Installers {
    pub fn new(streaming: Arc<dyn InstallerBackend>, legacy: Arc<dyn InstallerBackend>) -> Self {
        Self { streaming, legacy }
    }

    pub fn for_kind(&self, kind: PackageKind) -> &Arc<dyn InstallerBackend> {
        match kind {
            PackageKind::Streaming => &self.streaming,
            PackageKind::Legacy => &self.legacy,
        }
    }

    pub fn streaming(&self) -> &Arc<dyn InstallerBackend> {
        &self.streaming
    }
}

/// Backend that only logs what it is asked to do.
#[derive(Debug, Clone, Copy)]
pub struct NoOpInstaller {
    kind: PackageKind,
}

impl NoOpInstaller {
    pub fn new(kind: PackageKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl InstallerBackend for NoOpInstaller {
    fn kind(&self) -> PackageKind {
        self.kind
    }

    async fn install(&self, request: &InstallRequest) -> Result<()> {
        info!(
            tag = %request.tag,
            kind = %self.kind,
            path = %request.path.display(),
            "NoOp install requested"
        );
        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        Ok(())
    }
}
