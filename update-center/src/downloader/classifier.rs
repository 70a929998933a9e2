//! Transfer failure classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::TransferFault;

/// What the lifecycle manager does after a failed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAction {
    /// Discard partial data and redo the transfer.
    ImmediateRestart,
    /// Retry once without discarding partial data.
    RetryOnce,
    /// Pause and wait for the connectivity monitor.
    WaitForNetwork,
    /// The payload is corrupt; only a user restart recovers.
    TerminalVerification,
    /// The remote resource is gone; nothing to retry.
    TerminalNotFound,
    /// Unknown fault, restart the transfer right away.
    GenericRestart,
}

/// Error taxonomy used for diagnostics and presentation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    TransientNetwork,
    TransientProtocol,
    TerminalCorruption,
    TerminalUnavailable,
}

impl RetryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImmediateRestart => "immediate_restart",
            Self::RetryOnce => "retry_once",
            Self::WaitForNetwork => "wait_for_network",
            Self::TerminalVerification => "terminal_verification",
            Self::TerminalNotFound => "terminal_not_found",
            Self::GenericRestart => "generic_restart",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TerminalVerification | Self::TerminalNotFound)
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::WaitForNetwork => ErrorClass::TransientNetwork,
            Self::ImmediateRestart | Self::RetryOnce | Self::GenericRestart => {
                ErrorClass::TransientProtocol
            }
            Self::TerminalVerification => ErrorClass::TerminalCorruption,
            Self::TerminalNotFound => ErrorClass::TerminalUnavailable,
        }
    }
}

impl fmt::Display for RetryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a transfer fault to its retry policy.
///
/// `complete` is true when the engine already received every byte; an
/// unrecognized fault at that point means the payload itself was rejected.
pub fn classify(fault: Option<&TransferFault>, complete: bool) -> RetryAction {
    match fault {
        Some(TransferFault::EngineInternal) => RetryAction::ImmediateRestart,
        Some(TransferFault::TlsHandshake) => RetryAction::RetryOnce,
        Some(
            TransferFault::TlsNegotiation
            | TransferFault::UnresolvedHost
            | TransferFault::StreamReset,
        ) => RetryAction::WaitForNetwork,
        Some(TransferFault::Unsupported) => RetryAction::TerminalVerification,
        Some(TransferFault::NotFound) => RetryAction::TerminalNotFound,
        Some(TransferFault::Other(_)) | None if complete => RetryAction::TerminalVerification,
        Some(TransferFault::Other(_)) | None => RetryAction::GenericRestart,
    }
}
