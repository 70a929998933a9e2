//! Projection of an update's state onto a presentation.

use ota_package::PackageKind;

use crate::domain::{DownloadProgress, ProgressStatus, UpdateRecord, UpdateStatus, format_eta};
use crate::downloader::{RetryAction, classify};

use super::{Headline, Presentation, PresentationAction, ProgressIndicator};

/// Result of projecting one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Show(Presentation),
    /// Keep whatever is shown, the engine is silently retrying.
    Unchanged,
}

/// Project an update onto a presentation.
///
/// The record's install status and finalizing flag take precedence over the
/// transfer snapshot. `retry` is the lifecycle's classification of the last
/// failure; without it the snapshot's fault is classified here.
pub fn project(
    record: &UpdateRecord,
    progress: &DownloadProgress,
    retry: Option<RetryAction>,
    installer: Option<PackageKind>,
) -> Projection {
    let tag = record.tag();
    let title = record.title();

    match (record.status, progress.status) {
        (UpdateStatus::Installing, _) => Projection::Show(installing(record, installer)),
        (UpdateStatus::Installed, _) => Projection::Show(
            Presentation::new(tag, title, Headline::Installed)
                .with_action(PresentationAction::Reboot)
                .auto_cancel(),
        ),
        (UpdateStatus::InstallationFailed, ProgressStatus::Finish) => {
            Projection::Show(Presentation::new(tag, title, Headline::InstallationFailed))
        }
        (_, ProgressStatus::None | ProgressStatus::Waiting) => Projection::Show(
            Presentation::new(tag, title, Headline::Starting)
                .ongoing()
                .with_progress(ProgressIndicator::Indeterminate),
        ),
        (_, ProgressStatus::Loading) => {
            let detail = progress
                .rate_eta
                .clone()
                .or_else(|| format_eta(progress.speed, progress.total, progress.current));
            Projection::Show(
                Presentation::new(tag, title, Headline::Downloading)
                    .ongoing()
                    .with_progress(bytes(progress))
                    .with_detail(detail)
                    .with_action(PresentationAction::Pause),
            )
        }
        (_, ProgressStatus::Pause) => Projection::Show(
            Presentation::new(tag, title, Headline::Paused)
                .with_progress(bytes(progress))
                .with_action(PresentationAction::Resume),
        ),
        (_, ProgressStatus::Finish) => {
            Projection::Show(Presentation::new(tag, title, Headline::Completed))
        }
        (_, ProgressStatus::Error) => {
            let action =
                retry.unwrap_or_else(|| classify(progress.fault.as_ref(), progress.is_complete()));
            match action {
                RetryAction::WaitForNetwork => Projection::Show(
                    Presentation::new(tag, title, Headline::WaitingForNetwork)
                        .ongoing()
                        .with_progress(ProgressIndicator::Indeterminate)
                        .with_action(PresentationAction::Resume),
                ),
                RetryAction::TerminalVerification => Projection::Show(
                    Presentation::new(tag, title, Headline::VerificationFailed)
                        .with_action(PresentationAction::Restart),
                ),
                RetryAction::TerminalNotFound => {
                    Projection::Show(Presentation::new(tag, title, Headline::NotFound))
                }
                RetryAction::ImmediateRestart
                | RetryAction::RetryOnce
                | RetryAction::GenericRestart => Projection::Unchanged,
            }
        }
    }
}

fn installing(record: &UpdateRecord, installer: Option<PackageKind>) -> Presentation {
    let headline = if record.finalizing {
        Headline::Finalizing
    } else {
        match installer {
            Some(PackageKind::Streaming) => Headline::PreparingFirstBoot,
            Some(PackageKind::Legacy) | None => Headline::PreparingPackage,
        }
    };
    let progress = if record.install_progress > 0.0 {
        ProgressIndicator::Determinate {
            current: (record.install_progress.clamp(0.0, 1.0) * 100.0).round() as u64,
            max: 100,
        }
    } else {
        ProgressIndicator::Indeterminate
    };

    Presentation::new(record.tag(), record.title(), headline)
        .ongoing()
        .with_progress(progress)
}

fn bytes(progress: &DownloadProgress) -> ProgressIndicator {
    if progress.total == 0 {
        ProgressIndicator::Indeterminate
    } else {
        ProgressIndicator::Determinate {
            current: progress.current.min(progress.total),
            max: progress.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransferFault;

    fn record(status: UpdateStatus) -> UpdateRecord {
        UpdateRecord::new("MK-X", "u")
            .with_display_version("MK 10")
            .with_status(status)
    }

    fn snapshot(status: ProgressStatus) -> DownloadProgress {
        DownloadProgress::new("MK-X", status).with_bytes(50, 100)
    }

    fn show(projection: Projection) -> Presentation {
        match projection {
            Projection::Show(p) => p,
            Projection::Unchanged => panic!("expected a presentation"),
        }
    }

    #[test]
    fn test_waiting_is_indeterminate_and_ongoing() {
        let p = show(project(
            &record(UpdateStatus::Starting),
            &snapshot(ProgressStatus::Waiting),
            None,
            None,
        ));
        assert_eq!(p.headline, Headline::Starting);
        assert_eq!(p.title, "MK 10");
        assert_eq!(p.progress, ProgressIndicator::Indeterminate);
        assert!(p.persistent);
        assert!(!p.dismissible);
        assert!(p.actions.is_empty());
    }

    #[test]
    fn test_loading_offers_pause() {
        let progress = snapshot(ProgressStatus::Loading).with_speed(10);
        let p = show(project(&record(UpdateStatus::Downloading), &progress, None, None));
        assert_eq!(
            p.progress,
            ProgressIndicator::Determinate {
                current: 50,
                max: 100
            }
        );
        assert_eq!(p.actions, vec![PresentationAction::Pause]);
        assert_eq!(p.detail.as_deref(), Some("5 seconds left"));
        assert!(p.persistent);
    }

    #[test]
    fn test_engine_supplied_rate_text_wins() {
        let mut progress = snapshot(ProgressStatus::Loading).with_speed(10);
        progress.rate_eta = Some("1 MB/s".into());
        let p = show(project(&record(UpdateStatus::Downloading), &progress, None, None));
        assert_eq!(p.detail.as_deref(), Some("1 MB/s"));
    }

    #[test]
    fn test_paused_is_dismissible_with_resume() {
        let p = show(project(
            &record(UpdateStatus::Paused),
            &snapshot(ProgressStatus::Pause),
            None,
            None,
        ));
        assert_eq!(p.actions, vec![PresentationAction::Resume]);
        assert!(p.dismissible);
        assert!(!p.persistent);
    }

    #[test]
    fn test_installing_text_by_backend() {
        let finish = snapshot(ProgressStatus::Finish);
        let mut rec = record(UpdateStatus::Installing);

        let legacy = show(project(&rec, &finish, None, Some(PackageKind::Legacy)));
        assert_eq!(legacy.headline, Headline::PreparingPackage);
        assert_eq!(legacy.progress, ProgressIndicator::Indeterminate);
        assert!(legacy.persistent);
        assert!(legacy.actions.is_empty());

        rec.install_progress = 0.42;
        let streaming = show(project(&rec, &finish, None, Some(PackageKind::Streaming)));
        assert_eq!(streaming.headline, Headline::PreparingFirstBoot);
        assert_eq!(
            streaming.progress,
            ProgressIndicator::Determinate {
                current: 42,
                max: 100
            }
        );

        rec.finalizing = true;
        let finalizing = show(project(&rec, &finish, None, Some(PackageKind::Streaming)));
        assert_eq!(finalizing.headline, Headline::Finalizing);
    }

    #[test]
    fn test_install_status_overrides_snapshot() {
        // No FINISH snapshot after a host restart, the record still decides
        let p = show(project(
            &record(UpdateStatus::Installing),
            &DownloadProgress::new("MK-X", ProgressStatus::None),
            None,
            Some(PackageKind::Streaming),
        ));
        assert_eq!(p.headline, Headline::PreparingFirstBoot);
    }

    #[test]
    fn test_installed_offers_reboot() {
        let p = show(project(
            &record(UpdateStatus::Installed),
            &snapshot(ProgressStatus::Finish),
            None,
            None,
        ));
        assert_eq!(p.actions, vec![PresentationAction::Reboot]);
        assert!(p.dismissible);
        assert!(p.auto_cancel);
    }

    #[test]
    fn test_finish_otherwise_completed() {
        let p = show(project(
            &record(UpdateStatus::Verified),
            &snapshot(ProgressStatus::Finish),
            None,
            None,
        ));
        assert_eq!(p.headline, Headline::Completed);
        assert!(p.dismissible);

        let failed = show(project(
            &record(UpdateStatus::InstallationFailed),
            &snapshot(ProgressStatus::Finish),
            None,
            None,
        ));
        assert_eq!(failed.headline, Headline::InstallationFailed);
        assert!(failed.dismissible);
        assert!(failed.actions.is_empty());
    }

    #[test]
    fn test_error_branches() {
        let rec = record(UpdateStatus::Downloading);

        let network = show(project(
            &rec,
            &snapshot(ProgressStatus::Error).with_fault(TransferFault::StreamReset),
            None,
            None,
        ));
        assert_eq!(network.headline, Headline::WaitingForNetwork);
        assert_eq!(network.progress, ProgressIndicator::Indeterminate);
        assert_eq!(network.actions, vec![PresentationAction::Resume]);
        assert!(network.persistent);
        assert!(!network.dismissible);

        let corrupt = show(project(
            &rec,
            &snapshot(ProgressStatus::Error),
            Some(RetryAction::TerminalVerification),
            None,
        ));
        assert_eq!(corrupt.actions, vec![PresentationAction::Restart]);
        assert!(corrupt.dismissible);

        let missing = show(project(
            &rec,
            &snapshot(ProgressStatus::Error).with_fault(TransferFault::NotFound),
            None,
            None,
        ));
        assert_eq!(missing.headline, Headline::NotFound);
        assert!(missing.actions.is_empty());
        assert!(missing.dismissible);
    }

    #[test]
    fn test_automatic_retries_are_silent() {
        let rec = record(UpdateStatus::Starting);
        for action in [
            RetryAction::ImmediateRestart,
            RetryAction::RetryOnce,
            RetryAction::GenericRestart,
        ] {
            assert_eq!(
                project(&rec, &snapshot(ProgressStatus::Error), Some(action), None),
                Projection::Unchanged
            );
        }
    }

    #[test]
    fn test_projection_is_deterministic() {
        let rec = record(UpdateStatus::Downloading);
        let progress = snapshot(ProgressStatus::Loading);
        assert_eq!(
            project(&rec, &progress, None, None),
            project(&rec, &progress, None, None)
        );
    }
}
