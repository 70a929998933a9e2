use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use update_center::config::{ControlPlaneConfig, UpdaterSettings};
use update_center::domain::UpdateRecord;
use update_center::downloader::{DownloadAction, NoOpTransferEngine, TransferEvent};
use update_center::host::{Collaborators, ControlPlaneHost};
use update_center::installer::{
    ArchiveInspector, InstallEvent, Installers, NoBattery, NoOpInstaller, PackageKind,
};
use update_center::logging::{LoggingConfig, init_logging};
use update_center::network::ConnectivityEvent;
use update_center::notification::LoggingSink;

/// One newline-delimited JSON command read from stdin.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Command {
    Catalog { records: Vec<UpdateRecord> },
    Download { tag: String, action: DownloadAction },
    Delete { tag: String },
    Install { tag: String },
    InstallStop,
    MobileDataWarning { warn: bool },
    State,
    Attach,
    Detach,
    Transfer { event: TransferEvent },
    Connectivity { event: ConnectivityEvent },
    Installer { event: InstallEvent },
    LogFilter { directive: String },
}

struct Session {
    host: ControlPlaneHost,
    logging: Arc<LoggingConfig>,
    observer: Option<JoinHandle<()>>,
}

impl Session {
    async fn handle_line(&mut self, line: &str) -> Value {
        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => return json!({ "ok": false, "error": format!("Invalid command: {}", e) }),
        };
        match self.execute(command).await {
            Ok(result) => json!({ "ok": true, "result": result }),
            Err(e) => json!({ "ok": false, "error": e.to_string() }),
        }
    }

    async fn execute(&mut self, command: Command) -> update_center::Result<Value> {
        let host = &self.host;
        match command {
            Command::Catalog { records } => {
                let diff = host.replace_catalog(records).await?;
                Ok(json!({
                    "added": diff.added,
                    "superseded": diff.superseded,
                    "retained": diff.retained,
                }))
            }
            Command::Download { tag, action } => {
                host.download_control(&tag, action).await?;
                Ok(Value::Null)
            }
            Command::Delete { tag } => {
                host.delete(&tag).await?;
                Ok(Value::Null)
            }
            Command::Install { tag } => {
                host.install_update(&tag).await?;
                Ok(Value::Null)
            }
            Command::InstallStop => {
                host.install_stop().await?;
                Ok(Value::Null)
            }
            Command::MobileDataWarning { warn } => {
                host.set_mobile_data_warning(warn).await?;
                Ok(Value::Null)
            }
            Command::State => Ok(serde_json::to_value(host.snapshot().await?)?),
            Command::Attach => {
                if self.observer.is_none() {
                    let events = host.attach().await?;
                    self.observer = Some(tokio::spawn(print_events(events)));
                }
                Ok(Value::Null)
            }
            Command::Detach => {
                if let Some(observer) = self.observer.take() {
                    observer.abort();
                    host.detach().await?;
                }
                Ok(Value::Null)
            }
            Command::Transfer { event } => {
                host.on_transfer_event(event).await?;
                Ok(Value::Null)
            }
            Command::Connectivity { event } => {
                host.on_connectivity(event).await?;
                Ok(Value::Null)
            }
            Command::Installer { event } => {
                host.on_install_event(event).await?;
                Ok(Value::Null)
            }
            Command::LogFilter { directive } => {
                self.logging.set_filter(&directive)?;
                Ok(json!(self.logging.get_filter()))
            }
        }
    }
}

/// Print observer events to stdout as JSON lines.
async fn print_events(mut events: broadcast::Receiver<update_center::host::UpdateEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Observer lagged behind, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ControlPlaneConfig::from_env()?;
    let (logging, _log_guard) = init_logging(&config.log_dir)?;
    let settings = UpdaterSettings::load(&config.settings_path)?;

    let shutdown = CancellationToken::new();
    logging.start_retention_cleanup(shutdown.clone());

    let deps = Collaborators {
        engine: Arc::new(NoOpTransferEngine),
        installers: Installers::new(
            Arc::new(NoOpInstaller::new(PackageKind::Streaming)),
            Arc::new(NoOpInstaller::new(PackageKind::Legacy)),
        ),
        sink: Arc::new(LoggingSink),
        battery: Arc::new(NoBattery),
        inspector: Arc::new(ArchiveInspector),
    };
    let mut session = Session {
        host: ControlPlaneHost::new(config, settings, deps),
        logging,
        observer: None,
    };

    let mut idle = session.host.idle_signal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("update-center ready, reading commands from stdin");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
            changed = idle.changed() => {
                if changed.is_err() {
                    break;
                }
                if *idle.borrow_and_update() {
                    if let Err(e) = session.host.release_if_idle().await {
                        warn!(error = %e, "Failed to release idle host");
                    }
                }
            }
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => println!("{}", session.handle_line(&line).await),
                None => {
                    info!("stdin closed, shutting down");
                    break;
                }
            }
        }
    }

    shutdown.cancel();
    if let Some(observer) = session.observer.take() {
        observer.abort();
    }
    session.host.shutdown().await;
    Ok(())
}
