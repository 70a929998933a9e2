//! Messages accepted by the control-plane host.
//!
//! User commands carry a oneshot reply channel. Collaborator callbacks are
//! fire-and-forget.

use tokio::sync::{broadcast, oneshot};

use crate::Result;
use crate::domain::UpdateRecord;
use crate::downloader::{CatalogDiff, DownloadAction, TransferEvent};
use crate::installer::InstallEvent;
use crate::network::ConnectivityEvent;

use super::{UpdateEvent, UpdateSnapshot};

#[derive(Debug)]
pub enum HostMessage {
    /// Start, pause, resume or restart the download of a tag.
    DownloadControl {
        tag: String,
        action: DownloadAction,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Delete a tag and cancel its transfer.
    Delete {
        tag: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Install the downloaded package of a tag.
    InstallUpdate {
        tag: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Cancel the running streaming install.
    InstallStop { reply: oneshot::Sender<Result<()>> },
    /// Replace the update catalog.
    ReplaceCatalog {
        records: Vec<UpdateRecord>,
        reply: oneshot::Sender<CatalogDiff>,
    },
    SetMobileDataWarning {
        warn: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Transfer engine callback.
    Transfer(TransferEvent),
    /// Connectivity monitor callback.
    Connectivity(ConnectivityEvent),
    /// Installer backend callback.
    Install(InstallEvent),
    /// An observer binds; replies with its event subscription.
    Attach(oneshot::Sender<broadcast::Receiver<UpdateEvent>>),
    /// An observer unbinds.
    Detach,
    /// Query the state of every update.
    GetState(oneshot::Sender<Vec<UpdateSnapshot>>),
    /// Ask the host to stop if nothing keeps it alive.
    ///
    /// Replies true when the host accepted and is stopping.
    Release(oneshot::Sender<bool>),
}

impl HostMessage {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DownloadControl { .. } => "download_control",
            Self::Delete { .. } => "delete",
            Self::InstallUpdate { .. } => "install_update",
            Self::InstallStop { .. } => "install_stop",
            Self::ReplaceCatalog { .. } => "replace_catalog",
            Self::SetMobileDataWarning { .. } => "set_mobile_data_warning",
            Self::Transfer(_) => "transfer_event",
            Self::Connectivity(_) => "connectivity_event",
            Self::Install(_) => "install_event",
            Self::Attach(_) => "attach",
            Self::Detach => "detach",
            Self::GetState(_) => "get_state",
            Self::Release(_) => "release",
        }
    }
}
