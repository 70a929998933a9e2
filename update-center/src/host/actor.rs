//! The host actor serializing every state mutation of the control plane.
//!
//! Messages are handled one at a time. Each handler asks the
//! [`ControlPlane`] for effects and executes them against the
//! collaborators before the next message is taken.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use ota_package::PackageKind;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::downloader::TransferEngine;
use crate::installer::{BatteryMonitor, Installers, PackageInspector};
use crate::notification::{PRESENTATION_ID, PresentationSink, RenderCommand};
use crate::{Error, Result};

use super::{ControlPlane, Effect, HostMessage, ShutdownGuard, UpdateEvent};

/// External collaborators driven by the host.
#[derive(Clone)]
pub struct Collaborators {
    pub engine: Arc<dyn TransferEngine>,
    pub installers: Installers,
    pub sink: Arc<dyn PresentationSink>,
    pub battery: Arc<dyn BatteryMonitor>,
    pub inspector: Arc<dyn PackageInspector>,
}

/// Why the host actor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The shutdown guard released the host.
    Idle,
    /// Every handle was dropped.
    Shutdown,
    Cancelled,
}

/// Returned by [`HostActor::run`]; hands the state back for re-hosting.
#[derive(Debug)]
pub struct HostExit {
    pub reason: ExitReason,
    pub plane: ControlPlane,
    /// Observers that attached while the mailbox was drained stay counted.
    pub guard: ShutdownGuard,
}

pub struct HostActor {
    plane: ControlPlane,
    deps: Collaborators,
    mailbox: mpsc::Receiver<HostMessage>,
    events: broadcast::Sender<UpdateEvent>,
    guard: ShutdownGuard,
    token: CancellationToken,
    idle: Arc<watch::Sender<bool>>,
    settings_path: PathBuf,
}

impl HostActor {
    pub fn new(
        plane: ControlPlane,
        deps: Collaborators,
        mailbox: mpsc::Receiver<HostMessage>,
        events: broadcast::Sender<UpdateEvent>,
        token: CancellationToken,
        idle: Arc<watch::Sender<bool>>,
        settings_path: PathBuf,
    ) -> Self {
        Self {
            plane,
            deps,
            mailbox,
            events,
            guard: ShutdownGuard::new(),
            token,
            idle,
            settings_path,
        }
    }

    /// Continue with the observer count of a previous host.
    pub fn with_guard(mut self, guard: ShutdownGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Run the actor's event loop.
    ///
    /// Runs until the shutdown guard accepts a release, every handle is
    /// dropped or the cancellation token fires.
    pub async fn run(mut self) -> HostExit {
        info!(updates = self.plane.store().len(), "Control plane host starting");

        self.recover_installs().await;
        self.publish_idle();

        let reason = loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => {
                    info!("Control plane host cancelled");
                    break ExitReason::Cancelled;
                }

                msg = self.mailbox.recv() => match msg {
                    Some(HostMessage::Release(reply)) => {
                        if self.guard.may_stop(&self.plane) {
                            self.mailbox.close();
                            let _ = reply.send(true);
                            break ExitReason::Idle;
                        }
                        let _ = reply.send(false);
                        debug!(observers = self.guard.observers(), "Release declined");
                    }
                    Some(msg) => {
                        self.handle_message(msg).await;
                        self.publish_idle();
                    }
                    None => break ExitReason::Shutdown,
                }
            }
        };

        if reason == ExitReason::Idle {
            // Messages queued before the close are still handled
            while let Some(msg) = self.mailbox.recv().await {
                match msg {
                    HostMessage::Release(reply) => {
                        let _ = reply.send(false);
                    }
                    msg => self.handle_message(msg).await,
                }
            }
            self.publish_idle();
        }

        info!(reason = ?reason, "Control plane host stopped");
        HostExit {
            reason,
            plane: self.plane,
            guard: self.guard,
        }
    }

    async fn handle_message(&mut self, msg: HostMessage) {
        trace!(message = msg.name(), "Handling message");

        match msg {
            HostMessage::DownloadControl { tag, action, reply } => {
                let result = self.plane.download_control(&tag, action);
                let result = self.apply(result).await;
                let _ = reply.send(result);
            }
            HostMessage::Delete { tag, reply } => {
                let result = self.plane.delete(&tag);
                let result = self.apply(result).await;
                let _ = reply.send(result);
            }
            HostMessage::InstallUpdate { tag, reply } => {
                let result = self.install_update(&tag).await;
                let _ = reply.send(result);
            }
            HostMessage::InstallStop { reply } => {
                let result = self.install_stop().await;
                let _ = reply.send(result);
            }
            HostMessage::ReplaceCatalog { records, reply } => {
                let (diff, effects) = self.plane.replace_catalog(records);
                self.run_effects(effects).await;
                info!(
                    added = diff.added.len(),
                    superseded = diff.superseded.len(),
                    retained = diff.retained.len(),
                    "Catalog replaced"
                );
                let _ = reply.send(diff);
            }
            HostMessage::SetMobileDataWarning { warn, reply } => {
                let settings = self.plane.set_warn_on_mobile_data(warn);
                let _ = reply.send(settings.save(&self.settings_path));
            }
            HostMessage::Transfer(event) => {
                let effects = self.plane.on_transfer_event(event);
                self.run_effects(effects).await;
            }
            HostMessage::Connectivity(event) => {
                let effects = self.plane.on_connectivity(event);
                self.run_effects(effects).await;
            }
            HostMessage::Install(event) => {
                let effects = self.plane.on_install_event(event);
                self.run_effects(effects).await;
            }
            HostMessage::Attach(reply) => {
                self.guard.attach();
                let _ = reply.send(self.events.subscribe());
            }
            HostMessage::Detach => self.guard.detach(),
            HostMessage::GetState(reply) => {
                let _ = reply.send(self.plane.snapshot());
            }
            HostMessage::Release(reply) => {
                let _ = reply.send(false);
            }
        }
    }

    // ========== Installation ==========

    async fn install_update(&mut self, tag: &str) -> Result<()> {
        let battery = self.deps.battery.status();
        let path = self.plane.prepare_install(tag, &battery)?;

        let inspector = self.deps.inspector.clone();
        let package_path = path.clone();
        let inspected = tokio::task::spawn_blocking(move || inspector.inspect(&package_path))
            .await
            .map_err(|e| Error::Installer(format!("Package inspection task failed: {}", e)))
            .and_then(|result| result);

        match inspected {
            Ok(package) => {
                debug!(tag = %tag, kind = %package.kind, "Package inspected");
                let result = self.plane.accept_install(tag, path, package);
                self.apply(result).await
            }
            Err(e) => {
                let effects = self.plane.fail_install(tag, &e);
                self.run_effects(effects).await;
                Err(e)
            }
        }
    }

    async fn install_stop(&mut self) -> Result<()> {
        if !self.plane.is_installing() {
            // The backend may own an install this host never dispatched
            if let Some(tag) = self.deps.installers.streaming().in_flight().await? {
                let effects = self.plane.recover_install(&tag, PackageKind::Streaming);
                self.execute(effects).await?;
            }
        }
        let result = self.plane.install_stop();
        self.apply(result).await
    }

    /// Adopt an install a backend reports as running.
    async fn recover_installs(&mut self) {
        if self.plane.is_installing() {
            return;
        }
        for kind in [PackageKind::Streaming, PackageKind::Legacy] {
            let backend = self.deps.installers.for_kind(kind).clone();
            match backend.in_flight().await {
                Ok(Some(tag)) => {
                    let effects = self.plane.recover_install(&tag, kind);
                    self.run_effects(effects).await;
                    return;
                }
                Ok(None) => {}
                Err(e) => warn!(kind = %kind, error = %e, "Failed to query installer state"),
            }
        }
    }

    // ========== Effects ==========

    async fn apply(&mut self, result: Result<Vec<Effect>>) -> Result<()> {
        self.execute(result?).await
    }

    /// Execute effects whose failures only concern the log.
    async fn run_effects(&mut self, effects: Vec<Effect>) {
        if let Err(e) = self.execute(effects).await {
            warn!(error = %e, "Effect execution failed");
        }
    }

    /// Execute effects in order.
    ///
    /// Transfer engine failures are logged. The first installer failure is
    /// returned after the remaining effects ran.
    async fn execute(&mut self, effects: Vec<Effect>) -> Result<()> {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut first_error = None;

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Transfer(command) => {
                    if let Err(e) = self.deps.engine.execute(&command).await {
                        warn!(
                            tag = %command.tag(),
                            command = command.name(),
                            error = %e,
                            "Transfer engine rejected command"
                        );
                    }
                }
                Effect::Install(request) => {
                    let backend = self.deps.installers.for_kind(request.package.kind).clone();
                    if let Err(e) = backend.install(&request).await {
                        queue.extend(self.plane.fail_install(&request.tag, &e));
                        first_error.get_or_insert(e);
                    }
                }
                Effect::Reconnect(kind) => {
                    let backend = self.deps.installers.for_kind(kind).clone();
                    if let Err(e) = backend.reconnect().await {
                        warn!(kind = %kind, error = %e, "Failed to reconnect to installer");
                        first_error.get_or_insert(e);
                    }
                }
                Effect::CancelInstall(kind) => {
                    let backend = self.deps.installers.for_kind(kind).clone();
                    if let Err(e) = backend.cancel().await {
                        first_error.get_or_insert(e);
                    }
                }
                Effect::Render(RenderCommand::Update(presentation)) => {
                    self.deps.sink.update(PRESENTATION_ID, &presentation).await;
                }
                Effect::Render(RenderCommand::Clear) => {
                    self.deps.sink.clear(PRESENTATION_ID).await;
                }
                Effect::Publish(event) => {
                    trace!(event = %event.description(), "Publishing event");
                    // No receivers is fine
                    let _ = self.events.send(event);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn publish_idle(&self) {
        let idle = self.guard.may_stop(&self.plane);
        self.idle.send_if_modified(|current| {
            if *current == idle {
                return false;
            }
            *current = idle;
            true
        });
    }
}
