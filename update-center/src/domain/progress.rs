//! Transfer progress snapshots reported by the transfer engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transfer status as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    #[default]
    None,
    Waiting,
    Loading,
    Pause,
    Finish,
    Error,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Waiting => "WAITING",
            Self::Loading => "LOADING",
            Self::Pause => "PAUSE",
            Self::Finish => "FINISH",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cause attached to an `ERROR` snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransferFault {
    /// The engine itself failed.
    EngineInternal,
    /// TLS handshake did not complete.
    TlsHandshake,
    /// TLS session could not be negotiated.
    TlsNegotiation,
    UnresolvedHost,
    StreamReset,
    /// The payload was rejected (unsupported or failed verification).
    Unsupported,
    /// The remote resource is gone (404 class).
    NotFound,
    Other(String),
}

impl fmt::Display for TransferFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EngineInternal => write!(f, "engine internal fault"),
            Self::TlsHandshake => write!(f, "TLS handshake fault"),
            Self::TlsNegotiation => write!(f, "TLS negotiation fault"),
            Self::UnresolvedHost => write!(f, "unresolved host"),
            Self::StreamReset => write!(f, "stream reset"),
            Self::Unsupported => write!(f, "unsupported payload"),
            Self::NotFound => write!(f, "remote resource missing"),
            Self::Other(detail) => write!(f, "{}", detail),
        }
    }
}

/// Latest transfer snapshot for a tag. Replaced on every engine callback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub tag: String,
    pub status: ProgressStatus,
    pub current: u64,
    pub total: u64,
    /// Fraction in `[0, 1]`.
    pub fraction: f32,
    #[serde(default)]
    pub fault: Option<TransferFault>,
    /// Current transfer rate in bytes per second.
    #[serde(default)]
    pub speed: u64,
    /// Human readable rate/remaining-time text supplied by the engine.
    #[serde(default)]
    pub rate_eta: Option<String>,
}

impl DownloadProgress {
    pub fn new(tag: impl Into<String>, status: ProgressStatus) -> Self {
        Self {
            tag: tag.into(),
            status,
            ..Default::default()
        }
    }

    /// Set byte counts and derive the fraction from them.
    pub fn with_bytes(mut self, current: u64, total: u64) -> Self {
        self.current = current;
        self.total = total;
        self.fraction = if total == 0 {
            0.0
        } else {
            (current as f64 / total as f64).clamp(0.0, 1.0) as f32
        };
        self
    }

    pub fn with_fault(mut self, fault: TransferFault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn with_speed(mut self, speed: u64) -> Self {
        self.speed = speed;
        self
    }

    /// Whether every byte of the payload has been received.
    pub fn is_complete(&self) -> bool {
        self.fraction >= 1.0
    }

    /// Progress in whole percent.
    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    /// Snapshot reset to the start of a fresh transfer.
    pub fn reset(tag: impl Into<String>) -> Self {
        Self::new(tag, ProgressStatus::Waiting)
    }
}
