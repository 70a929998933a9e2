//! Core domain types shared by every component of the control plane.

pub mod eta;
pub mod progress;
pub mod update;

pub use eta::{format_duration, format_eta};
pub use progress::{DownloadProgress, ProgressStatus, TransferFault};
pub use update::{UpdateRecord, UpdateStatus};
