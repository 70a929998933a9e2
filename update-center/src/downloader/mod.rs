//! Download lifecycle management.
//!
//! The record store holds the per-tag state, the classifier maps transfer
//! faults to retry policies and the lifecycle manager applies user commands
//! and engine callbacks to the store, emitting commands for the transfer
//! engine.

pub mod action;
pub mod classifier;
pub mod engine;
pub mod lifecycle;
pub mod state;
pub mod store;

pub use action::{PrimaryAction, resolve_primary_action};
pub use classifier::{ErrorClass, RetryAction, classify};
pub use engine::{NoOpTransferEngine, TransferCommand, TransferEngine, TransferEvent};
pub use lifecycle::{DownloadAction, DownloadLifecycle, EventOutcome};
pub use state::DownloadState;
pub use store::{CatalogDiff, RecordStore, StoreEntry};
