//! Installation dispatch.
//!
//! Completed packages are inspected, gated on battery charge and routed to
//! the installer backend matching their format. Install progress is tracked
//! as a state parallel to the download lifecycle.

pub mod backend;
pub mod battery;
pub mod dispatcher;
pub mod inspector;

pub use backend::{InstallEvent, InstallRequest, InstallerBackend, Installers, NoOpInstaller};
pub use battery::{BatteryMonitor, BatteryStatus, BatteryThresholds, NoBattery};
pub use dispatcher::{InFlightInstall, InstallDispatcher};
pub use inspector::{ArchiveInspector, PackageInspector};
pub use ota_package::{PackageInfo, PackageKind};
