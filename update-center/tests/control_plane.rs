//! End-to-end behaviour of the hosted control plane against recording fakes.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use update_center::Error;
use update_center::config::{ControlPlaneConfig, UpdaterSettings};
use update_center::domain::{
    DownloadProgress, ProgressStatus, TransferFault, UpdateRecord, UpdateStatus,
};
use update_center::downloader::{
    DownloadAction, DownloadState, PrimaryAction, RetryAction, TransferCommand, TransferEngine,
    TransferEvent,
};
use update_center::host::{Collaborators, ControlPlaneHost, UpdateSnapshot};
use update_center::installer::{
    ArchiveInspector, BatteryMonitor, BatteryStatus, InstallEvent, InstallRequest,
    InstallerBackend, Installers, PackageInfo, PackageInspector, PackageKind,
};
use update_center::network::{ConnectivityEvent, NetworkInfo, NetworkKind};
use update_center::notification::{Headline, Presentation, PresentationAction, PresentationSink};

// ========== Fakes ==========

#[derive(Default)]
struct RecordingEngine {
    commands: Mutex<Vec<TransferCommand>>,
}

impl RecordingEngine {
    fn commands(&self) -> Vec<TransferCommand> {
        self.commands.lock().clone()
    }

    fn record(&self, command: TransferCommand) -> update_center::Result<()> {
        self.commands.lock().push(command);
        Ok(())
    }
}

#[async_trait]
impl TransferEngine for RecordingEngine {
    async fn start(&self, tag: &str, url: &str) -> update_center::Result<()> {
        self.record(TransferCommand::Start {
            tag: tag.into(),
            url: url.into(),
        })
    }

    async fn pause(&self, tag: &str) -> update_center::Result<()> {
        self.record(TransferCommand::Pause { tag: tag.into() })
    }

    async fn resume(&self, tag: &str) -> update_center::Result<()> {
        self.record(TransferCommand::Resume { tag: tag.into() })
    }

    async fn restart(&self, tag: &str) -> update_center::Result<()> {
        self.record(TransferCommand::Restart { tag: tag.into() })
    }

    async fn remove(&self, tag: &str) -> update_center::Result<()> {
        self.record(TransferCommand::Remove { tag: tag.into() })
    }
}

struct FakeInstaller {
    kind: PackageKind,
    requests: Mutex<Vec<InstallRequest>>,
    cancels: Mutex<usize>,
    reconnects: Mutex<usize>,
    running: Mutex<Option<String>>,
    delay: Mutex<Duration>,
}

impl FakeInstaller {
    fn new(kind: PackageKind) -> Self {
        Self {
            kind,
            requests: Mutex::new(Vec::new()),
            cancels: Mutex::new(0),
            reconnects: Mutex::new(0),
            running: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
        }
    }
}

#[async_trait]
impl InstallerBackend for FakeInstaller {
    fn kind(&self) -> PackageKind {
        self.kind
    }

    async fn install(&self, request: &InstallRequest) -> update_center::Result<()> {
        self.requests.lock().push(request.clone());
        let delay = *self.delay.lock();
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn reconnect(&self) -> update_center::Result<()> {
        *self.reconnects.lock() += 1;
        Ok(())
    }

    async fn cancel(&self) -> update_center::Result<()> {
        *self.cancels.lock() += 1;
        Ok(())
    }

    async fn in_flight(&self) -> update_center::Result<Option<String>> {
        Ok(self.running.lock().clone())
    }
}

#[derive(Default)]
struct RecordingSink {
    renders: Mutex<Vec<Option<Presentation>>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.renders.lock().len()
    }

    fn last(&self) -> Option<Presentation> {
        self.renders.lock().last().cloned().flatten()
    }
}

#[async_trait]
impl PresentationSink for RecordingSink {
    async fn update(&self, _id: u32, presentation: &Presentation) {
        self.renders.lock().push(Some(presentation.clone()));
    }

    async fn clear(&self, _id: u32) {
        self.renders.lock().push(None);
    }
}

struct FixedBattery(BatteryStatus);

impl BatteryMonitor for FixedBattery {
    fn status(&self) -> BatteryStatus {
        self.0
    }
}

struct FixedInspector(PackageKind);

impl PackageInspector for FixedInspector {
    fn inspect(&self, _path: &Path) -> update_center::Result<PackageInfo> {
        Ok(PackageInfo {
            kind: self.0,
            payload: None,
            properties: Vec::new(),
        })
    }
}

// ========== Harness ==========

struct Harness {
    host: ControlPlaneHost,
    engine: Arc<RecordingEngine>,
    streaming: Arc<FakeInstaller>,
    legacy: Arc<FakeInstaller>,
    sink: Arc<RecordingSink>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with(
            BatteryStatus::absent(),
            Arc::new(FixedInspector(PackageKind::Streaming)),
        )
    }

    fn with(battery: BatteryStatus, inspector: Arc<dyn PackageInspector>) -> Self {
        Self::configured(battery, inspector, |_| {})
    }

    fn with_mailbox(capacity: usize) -> Self {
        Self::configured(
            BatteryStatus::absent(),
            Arc::new(FixedInspector(PackageKind::Streaming)),
            |config| config.mailbox_capacity = capacity,
        )
    }

    fn configured(
        battery: BatteryStatus,
        inspector: Arc<dyn PackageInspector>,
        tune: impl FnOnce(&mut ControlPlaneConfig),
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ControlPlaneConfig {
            download_dir: dir.path().join("downloads"),
            log_dir: dir.path().join("logs"),
            settings_path: dir.path().join("settings.json"),
            ..Default::default()
        };
        config.battery.discharging = 20;
        tune(&mut config);

        let engine = Arc::new(RecordingEngine::default());
        let streaming = Arc::new(FakeInstaller::new(PackageKind::Streaming));
        let legacy = Arc::new(FakeInstaller::new(PackageKind::Legacy));
        let sink = Arc::new(RecordingSink::default());
        let deps = Collaborators {
            engine: engine.clone(),
            installers: Installers::new(streaming.clone(), legacy.clone()),
            sink: sink.clone(),
            battery: Arc::new(FixedBattery(battery)),
            inspector,
        };

        Self {
            host: ControlPlaneHost::new(config, UpdaterSettings::default(), deps),
            engine,
            streaming,
            legacy,
            sink,
            dir,
        }
    }

    async fn catalog(&self, tags: &[&str]) {
        let records = tags
            .iter()
            .map(|t| {
                UpdateRecord::new(*t, format!("https://updates.example.invalid/{}.zip", t))
                    .with_display_version(format!("Build {}", t))
            })
            .collect();
        self.host.replace_catalog(records).await.unwrap();
    }

    async fn callback(&self, tag: &str, status: ProgressStatus, current: u64) {
        let progress = DownloadProgress::new(tag, status).with_bytes(current, 100);
        self.host
            .on_transfer_event(TransferEvent::Progress(progress))
            .await
            .unwrap();
    }

    async fn fail(&self, tag: &str, fault: TransferFault, current: u64) {
        let progress = DownloadProgress::new(tag, ProgressStatus::Error)
            .with_bytes(current, 100)
            .with_fault(fault);
        self.host
            .on_transfer_event(TransferEvent::Error(progress))
            .await
            .unwrap();
    }

    /// Snapshot of `tag`; also waits for every queued message.
    async fn state(&self, tag: &str) -> Option<UpdateSnapshot> {
        self.host
            .snapshot()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.record.name == tag)
    }

    async fn finished(&self, tags: &[&str]) {
        self.catalog(tags).await;
        for tag in tags {
            self.callback(tag, ProgressStatus::Finish, 100).await;
        }
    }
}

fn write_streaming_package(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file("payload.bin", options).unwrap();
    writer.write_all(b"CrAU").unwrap();
    writer.start_file("payload_properties.txt", options).unwrap();
    writer.write_all(b"FILE_SIZE=4\n").unwrap();
    writer.finish().unwrap();
}

// ========== Download lifecycle ==========

#[tokio::test]
async fn test_network_loss_waits_and_resumes_on_wifi() {
    let h = Harness::new();
    h.catalog(&["X"]).await;
    h.host.download_control("X", DownloadAction::Start).await.unwrap();
    h.callback("X", ProgressStatus::Loading, 50).await;
    h.fail("X", TransferFault::UnresolvedHost, 50).await;

    let x = h.state("X").await.unwrap();
    assert_eq!(x.state, DownloadState::Error(RetryAction::WaitForNetwork));
    let commands = h.engine.commands();
    assert_eq!(commands.len(), 2);
    assert!(matches!(commands[0], TransferCommand::Start { .. }));
    assert_eq!(commands[1], TransferCommand::Pause { tag: "X".into() });
    let shown = h.sink.last().unwrap();
    assert_eq!(shown.headline, Headline::WaitingForNetwork);
    assert_eq!(shown.actions, vec![PresentationAction::Resume]);

    h.host
        .on_connectivity(ConnectivityEvent::Available(NetworkInfo::new(NetworkKind::Wifi)))
        .await
        .unwrap();

    assert_eq!(h.state("X").await.unwrap().state, DownloadState::Waiting);
    assert_eq!(
        h.engine.commands().last(),
        Some(&TransferCommand::Resume { tag: "X".into() })
    );
}

#[tokio::test]
async fn test_mobile_data_resume_follows_persisted_setting() {
    let h = Harness::new();
    h.catalog(&["X"]).await;
    h.host.download_control("X", DownloadAction::Start).await.unwrap();
    h.fail("X", TransferFault::StreamReset, 10).await;

    let cellular = ConnectivityEvent::Available(NetworkInfo::new(NetworkKind::Cellular));
    h.host.on_connectivity(cellular).await.unwrap();
    assert!(h.state("X").await.unwrap().state.is_waiting_for_network());

    h.host.set_mobile_data_warning(false).await.unwrap();
    let saved = UpdaterSettings::load(&h.dir.path().join("settings.json")).unwrap();
    assert!(!saved.warn_on_mobile_data);

    h.host.on_connectivity(cellular).await.unwrap();
    assert_eq!(h.state("X").await.unwrap().state, DownloadState::Waiting);
}

#[tokio::test]
async fn test_corrupt_payload_requires_user_restart() {
    let h = Harness::new();
    h.catalog(&["Z"]).await;
    h.host.download_control("Z", DownloadAction::Start).await.unwrap();
    h.fail("Z", TransferFault::Unsupported, 100).await;

    let z = h.state("Z").await.unwrap();
    assert_eq!(z.state, DownloadState::Error(RetryAction::TerminalVerification));
    assert_eq!(z.action, PrimaryAction::Restart);
    assert_eq!(h.engine.commands().len(), 1);
    let shown = h.sink.last().unwrap();
    assert_eq!(shown.headline, Headline::VerificationFailed);
    assert_eq!(shown.actions, vec![PresentationAction::Restart]);

    h.host.download_control("Z", DownloadAction::Restart).await.unwrap();

    let z = h.state("Z").await.unwrap();
    assert_eq!(z.state, DownloadState::Waiting);
    let progress = z.progress.unwrap();
    assert_eq!(progress.status, ProgressStatus::Waiting);
    assert_eq!(progress.current, 0);
    assert_eq!(
        h.engine.commands().last(),
        Some(&TransferCommand::Restart { tag: "Z".into() })
    );
}

#[tokio::test]
async fn test_stale_callback_after_delete_is_ignored() {
    let h = Harness::new();
    h.catalog(&["W"]).await;
    h.host.download_control("W", DownloadAction::Start).await.unwrap();
    h.callback("W", ProgressStatus::Loading, 30).await;
    h.host.delete("W").await.unwrap();
    assert!(h.state("W").await.is_none());
    let renders = h.sink.count();
    assert!(h.sink.last().is_none());

    h.callback("W", ProgressStatus::Finish, 100).await;

    assert!(h.state("W").await.is_none());
    assert_eq!(h.sink.count(), renders);
    assert_eq!(
        h.engine.commands().last(),
        Some(&TransferCommand::Remove { tag: "W".into() })
    );
}

#[tokio::test]
async fn test_repeated_commands_are_idempotent() {
    let h = Harness::new();
    h.catalog(&["X", "Y"]).await;
    h.host.download_control("X", DownloadAction::Start).await.unwrap();

    assert!(matches!(
        h.host.download_control("X", DownloadAction::Start).await,
        Err(Error::AlreadyActive { .. })
    ));
    assert!(matches!(
        h.host.download_control("Y", DownloadAction::Start).await,
        Err(Error::DownloadAlreadyRunning { .. })
    ));

    h.callback("X", ProgressStatus::Loading, 10).await;
    h.host.download_control("X", DownloadAction::Pause).await.unwrap();
    let renders = h.sink.count();
    h.host.download_control("X", DownloadAction::Pause).await.unwrap();

    let pauses = h
        .engine
        .commands()
        .iter()
        .filter(|c| matches!(c, TransferCommand::Pause { .. }))
        .count();
    assert_eq!(pauses, 1);
    assert_eq!(h.sink.count(), renders);
    assert_eq!(h.state("X").await.unwrap().state, DownloadState::Paused);
}

// ========== Installation ==========

#[tokio::test]
async fn test_low_battery_rejects_without_state_change() {
    let h = Harness::with(
        BatteryStatus::new(10, false),
        Arc::new(FixedInspector(PackageKind::Streaming)),
    );
    h.finished(&["Y"]).await;
    // Round-trip through the host so the queued FINISH callback is drawn.
    h.state("Y").await;
    let renders = h.sink.count();

    let err = h.host.install_update("Y").await.unwrap_err();
    assert!(matches!(
        err,
        Error::BatteryTooLow {
            level: 10,
            required: 20
        }
    ));

    let y = h.state("Y").await.unwrap();
    assert_eq!(y.record.status, UpdateStatus::Verified);
    assert_eq!(y.progress.unwrap().status, ProgressStatus::Finish);
    assert_eq!(h.sink.count(), renders);
    assert!(h.streaming.requests.lock().is_empty());
}

#[tokio::test]
async fn test_single_install_and_streaming_cancel() {
    let h = Harness::new();
    h.finished(&["A", "B"]).await;

    h.host.install_update("A").await.unwrap();
    assert!(matches!(
        h.host.install_update("B").await,
        Err(Error::InstallAlreadyRunning { .. })
    ));
    assert_eq!(h.streaming.requests.lock().len(), 1);
    assert!(h.legacy.requests.lock().is_empty());
    assert_eq!(h.sink.last().unwrap().headline, Headline::PreparingFirstBoot);

    h.host
        .on_install_event(InstallEvent::Progress {
            tag: "A".into(),
            fraction: 0.5,
            finalizing: false,
        })
        .await
        .unwrap();
    h.host.install_stop().await.unwrap();
    assert_eq!(*h.streaming.cancels.lock(), 1);

    h.host
        .on_install_event(InstallEvent::Progress {
            tag: "A".into(),
            fraction: 1.0,
            finalizing: true,
        })
        .await
        .unwrap();
    assert!(matches!(
        h.host.install_stop().await,
        Err(Error::InstallNotCancellable)
    ));
    assert_eq!(h.sink.last().unwrap().headline, Headline::Finalizing);

    h.host
        .on_install_event(InstallEvent::Installed { tag: "A".into() })
        .await
        .unwrap();
    let a = h.state("A").await.unwrap();
    assert_eq!(a.record.status, UpdateStatus::Installed);
    assert_eq!(a.action, PrimaryAction::Reboot);
    assert_eq!(h.sink.last().unwrap().actions, vec![PresentationAction::Reboot]);

    h.host.install_update("B").await.unwrap();
}

#[tokio::test]
async fn test_callbacks_wait_for_a_busy_host() {
    let h = Harness::with_mailbox(1);
    h.catalog(&["A", "B"]).await;
    h.callback("A", ProgressStatus::Finish, 100).await;
    h.host.download_control("B", DownloadAction::Start).await.unwrap();
    *h.streaming.delay.lock() = Duration::from_millis(300);

    // The host is blocked in the installer while both callbacks queue up
    let (installed, loading, finished) = tokio::join!(
        h.host.install_update("A"),
        h.host.on_transfer_event(TransferEvent::Progress(
            DownloadProgress::new("B", ProgressStatus::Loading).with_bytes(60, 100),
        )),
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            h.host
                .on_transfer_event(TransferEvent::StatusChanged(
                    DownloadProgress::new("B", ProgressStatus::Finish).with_bytes(100, 100),
                ))
                .await
        }
    );
    installed.unwrap();
    loading.unwrap();
    finished.unwrap();

    let b = h.state("B").await.unwrap();
    assert_eq!(b.state, DownloadState::Finished);
    assert_eq!(b.progress.unwrap().current, 100);
    assert_eq!(h.streaming.requests.lock().len(), 1);
}

#[tokio::test]
async fn test_legacy_install_is_not_cancellable() {
    let h = Harness::with(
        BatteryStatus::new(50, false),
        Arc::new(FixedInspector(PackageKind::Legacy)),
    );
    h.finished(&["L"]).await;

    h.host.install_update("L").await.unwrap();
    assert_eq!(h.legacy.requests.lock().len(), 1);
    assert!(matches!(
        h.host.install_stop().await,
        Err(Error::InstallNotCancellable)
    ));
    assert_eq!(h.sink.last().unwrap().headline, Headline::PreparingPackage);
}

#[tokio::test]
async fn test_archive_inspection_routes_by_contents() {
    let h = Harness::with(BatteryStatus::new(90, true), Arc::new(ArchiveInspector));
    h.finished(&["S", "M"]).await;
    write_streaming_package(&h.dir.path().join("downloads").join("S"));

    h.host.install_update("S").await.unwrap();
    let requests = h.streaming.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].package.payload.is_some());
    assert_eq!(requests[0].path, h.dir.path().join("downloads").join("S"));

    h.host
        .on_install_event(InstallEvent::Failed {
            tag: "S".into(),
            reason: "cancelled".into(),
        })
        .await
        .unwrap();

    // No package on disk for M
    let err = h.host.install_update("M").await.unwrap_err();
    assert!(matches!(err, Error::Package(_)));
    let m = h.state("M").await.unwrap();
    assert_eq!(m.record.status, UpdateStatus::InstallationFailed);
    assert_eq!(m.action, PrimaryAction::Install);
}

// ========== Host lifetime ==========

#[tokio::test]
async fn test_guard_releases_idle_host_and_rehosts_state() {
    let h = Harness::new();
    h.catalog(&["A"]).await;

    let _events = h.host.attach().await.unwrap();
    assert!(!h.host.release_if_idle().await.unwrap());

    h.host.detach().await.unwrap();
    h.host.download_control("A", DownloadAction::Start).await.unwrap();
    h.state("A").await;
    assert!(!*h.host.idle_signal().borrow());
    assert!(!h.host.release_if_idle().await.unwrap());

    h.host.download_control("A", DownloadAction::Pause).await.unwrap();
    h.state("A").await;
    assert!(*h.host.idle_signal().borrow());
    assert!(h.host.release_if_idle().await.unwrap());
    assert!(!h.host.is_running().await);

    let a = h.state("A").await.unwrap();
    assert!(h.host.is_running().await);
    assert_eq!(a.state, DownloadState::Paused);
}

#[tokio::test]
async fn test_rehosted_plane_recovers_running_install() {
    let h = Harness::new();
    h.catalog(&["R"]).await;
    assert!(h.host.release_if_idle().await.unwrap());

    *h.streaming.running.lock() = Some("R".into());

    let r = h.state("R").await.unwrap();
    assert_eq!(r.record.status, UpdateStatus::Installing);
    assert_eq!(*h.streaming.reconnects.lock(), 1);
    assert!(!h.host.release_if_idle().await.unwrap());

    h.host.install_stop().await.unwrap();
    assert_eq!(*h.streaming.cancels.lock(), 1);
}

#[tokio::test]
async fn test_observer_receives_events() {
    let h = Harness::new();
    h.catalog(&["A"]).await;
    let mut events = h.host.attach().await.unwrap();

    h.host.download_control("A", DownloadAction::Start).await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(
        event,
        update_center::host::UpdateEvent::StatusChanged {
            tag: "A".into(),
            status: UpdateStatus::Starting,
            state: DownloadState::Waiting,
        }
    );
}

#[tokio::test]
async fn test_shutdown_returns_final_state() {
    let h = Harness::new();
    h.catalog(&["A"]).await;
    h.host.download_control("A", DownloadAction::Start).await.unwrap();

    let plane = h.host.shutdown().await.unwrap();
    assert_eq!(plane.store().get("A").unwrap().state, DownloadState::Waiting);
    assert!(matches!(
        h.host.snapshot().await,
        Err(Error::HostStopped)
    ));
}
