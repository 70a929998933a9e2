//! Supervisor owning the host actor's lifetime.
//!
//! The host stops when its shutdown guard allows it. The next request
//! re-hosts the control plane the stopped actor handed back, so no state is
//! lost across an idle teardown.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ControlPlaneConfig, UpdaterSettings};
use crate::domain::UpdateRecord;
use crate::downloader::{CatalogDiff, DownloadAction, TransferEvent};
use crate::installer::InstallEvent;
use crate::network::ConnectivityEvent;
use crate::{Error, Result};

use super::{
    Collaborators, ControlPlane, HostActor, HostExit, HostHandle, HostMessage, SendError,
    ShutdownGuard, UpdateEvent, UpdateSnapshot,
};

/// Capacity of the observer event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct HostSlot {
    handle: Option<HostHandle>,
    task: Option<JoinHandle<HostExit>>,
    /// State waiting for the next host.
    parked: Option<(ControlPlane, ShutdownGuard)>,
}

/// Public entry point of the control plane.
///
/// Every method is a message to the host actor; the actor is started on
/// demand.
pub struct ControlPlaneHost {
    config: ControlPlaneConfig,
    deps: Collaborators,
    slot: Mutex<HostSlot>,
    events: broadcast::Sender<UpdateEvent>,
    idle: Arc<watch::Sender<bool>>,
    token: CancellationToken,
}

impl ControlPlaneHost {
    pub fn new(config: ControlPlaneConfig, settings: UpdaterSettings, deps: Collaborators) -> Self {
        let plane = ControlPlane::new(&config, settings);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (idle, _) = watch::channel(true);
        Self {
            config,
            deps,
            slot: Mutex::new(HostSlot {
                parked: Some((plane, ShutdownGuard::new())),
                ..Default::default()
            }),
            events,
            idle: Arc::new(idle),
            token: CancellationToken::new(),
        }
    }

    // ========== Commands ==========

    pub async fn download_control(&self, tag: &str, action: DownloadAction) -> Result<()> {
        self.request(|reply| HostMessage::DownloadControl {
            tag: tag.to_string(),
            action,
            reply,
        })
        .await?
    }

    pub async fn delete(&self, tag: &str) -> Result<()> {
        self.request(|reply| HostMessage::Delete {
            tag: tag.to_string(),
            reply,
        })
        .await?
    }

    pub async fn install_update(&self, tag: &str) -> Result<()> {
        self.request(|reply| HostMessage::InstallUpdate {
            tag: tag.to_string(),
            reply,
        })
        .await?
    }

    pub async fn install_stop(&self) -> Result<()> {
        self.request(|reply| HostMessage::InstallStop { reply })
            .await?
    }

    pub async fn replace_catalog(&self, records: Vec<UpdateRecord>) -> Result<CatalogDiff> {
        self.request(|reply| HostMessage::ReplaceCatalog {
            records: records.clone(),
            reply,
        })
        .await
    }

    /// Change and persist the mobile data warning.
    pub async fn set_mobile_data_warning(&self, warn: bool) -> Result<()> {
        self.request(|reply| HostMessage::SetMobileDataWarning { warn, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<Vec<UpdateSnapshot>> {
        self.request(HostMessage::GetState).await
    }

    // ========== Observers ==========

    /// Bind an observer. The host stays alive until it detaches.
    pub async fn attach(&self) -> Result<broadcast::Receiver<UpdateEvent>> {
        self.request(HostMessage::Attach).await
    }

    pub async fn detach(&self) -> Result<()> {
        self.notify(|| HostMessage::Detach).await
    }

    // ========== Collaborator callbacks ==========

    pub async fn on_transfer_event(&self, event: TransferEvent) -> Result<()> {
        self.notify(|| HostMessage::Transfer(event.clone())).await
    }

    pub async fn on_connectivity(&self, event: ConnectivityEvent) -> Result<()> {
        self.notify(|| HostMessage::Connectivity(event)).await
    }

    pub async fn on_install_event(&self, event: InstallEvent) -> Result<()> {
        self.notify(|| HostMessage::Install(event.clone())).await
    }

    // ========== Lifetime ==========

    /// Watch channel that is true while the host may stop.
    pub fn idle_signal(&self) -> watch::Receiver<bool> {
        self.idle.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        let slot = self.slot.lock().await;
        slot.handle.as_ref().is_some_and(|h| !h.is_closed())
    }

    /// Ask the running host to stop. Returns true when it stopped.
    pub async fn release_if_idle(&self) -> Result<bool> {
        let handle = {
            let slot = self.slot.lock().await;
            match slot.handle.clone().filter(|h| !h.is_closed()) {
                Some(handle) => handle,
                None => return Ok(false),
            }
        };

        let (reply, rx) = oneshot::channel();
        match handle.send(HostMessage::Release(reply)).await {
            Ok(()) => {}
            Err(SendError::ActorStopped) => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        let released = rx.await.map_err(|_| Error::HostStopped)?;
        if released {
            info!("Control plane host released");
        }
        Ok(released)
    }

    /// Stop the host and return the final control plane.
    pub async fn shutdown(&self) -> Option<ControlPlane> {
        self.token.cancel();
        let mut slot = self.slot.lock().await;
        slot.handle = None;
        match slot.task.take() {
            Some(task) => match task.await {
                Ok(exit) => Some(exit.plane),
                Err(e) => {
                    error!(error = %e, "Control plane host task failed");
                    None
                }
            },
            None => slot.parked.take().map(|(plane, _)| plane),
        }
    }

    // ========== Internals ==========

    /// Handle of the running host, re-hosting the plane if it stopped.
    async fn handle(&self) -> Result<HostHandle> {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.handle.as_ref().filter(|h| !h.is_closed()) {
            return Ok(handle.clone());
        }
        if self.token.is_cancelled() {
            return Err(Error::HostStopped);
        }

        let (plane, guard) = match slot.task.take() {
            Some(task) => match task.await {
                Ok(exit) => {
                    debug!(reason = ?exit.reason, "Re-hosting control plane");
                    (exit.plane, exit.guard)
                }
                Err(e) => {
                    error!(error = %e, "Control plane host task failed, starting fresh");
                    (self.fresh_plane(), ShutdownGuard::new())
                }
            },
            None => slot
                .parked
                .take()
                .unwrap_or_else(|| (self.fresh_plane(), ShutdownGuard::new())),
        };

        let (sender, mailbox) = tokio::sync::mpsc::channel(self.config.mailbox_capacity);
        let token = self.token.child_token();
        let handle = HostHandle::new(sender, token.clone());
        let actor = HostActor::new(
            plane,
            self.deps.clone(),
            mailbox,
            self.events.clone(),
            token,
            self.idle.clone(),
            self.config.settings_path.clone(),
        )
        .with_guard(guard);

        slot.task = Some(tokio::spawn(actor.run()));
        slot.handle = Some(handle.clone());
        Ok(handle)
    }

    fn fresh_plane(&self) -> ControlPlane {
        let settings = UpdaterSettings::load(&self.config.settings_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load settings, using defaults");
            UpdaterSettings::default()
        });
        ControlPlane::new(&self.config, settings)
    }

    /// Send a request and wait for the reply.
    ///
    /// A host that stopped between lookup and send is re-hosted once.
    async fn request<T, F>(&self, make: F) -> Result<T>
    where
        F: Fn(oneshot::Sender<T>) -> HostMessage,
    {
        for attempt in 0..2 {
            let handle = self.handle().await?;
            let (reply, rx) = oneshot::channel();
            match handle.send(make(reply)).await {
                Ok(()) => return rx.await.map_err(|_| Error::HostStopped),
                Err(SendError::ActorStopped) if attempt == 0 => {
                    debug!("Host stopped before the request was queued, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::HostStopped)
    }

    /// Send a message without waiting for it to be handled.
    ///
    /// Waits for a mailbox slot however long the host is busy.
    async fn notify<F>(&self, make: F) -> Result<()>
    where
        F: Fn() -> HostMessage,
    {
        for attempt in 0..2 {
            let handle = self.handle().await?;
            match handle.send_wait(make()).await {
                Ok(()) => return Ok(()),
                Err(SendError::ActorStopped) if attempt == 0 => {
                    debug!("Host stopped before the message was queued, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::HostStopped)
    }
}
