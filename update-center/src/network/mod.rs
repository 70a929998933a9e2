//! Network-aware resume of suspended downloads.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::downloader::RecordStore;

/// Transport of an available network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Wifi,
    Ethernet,
    Cellular,
    Vpn,
    Other,
}

impl NetworkKind {
    pub fn is_metered(&self) -> bool {
        matches!(self, Self::Cellular)
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Wifi => "wifi",
            Self::Ethernet => "ethernet",
            Self::Cellular => "cellular",
            Self::Vpn => "vpn",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Metadata of a network reported by the connectivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub kind: NetworkKind,
    /// The network has internet capability.
    pub internet: bool,
}

impl NetworkInfo {
    pub fn new(kind: NetworkKind) -> Self {
        Self {
            kind,
            internet: true,
        }
    }
}

/// Connectivity monitor callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectivityEvent {
    Available(NetworkInfo),
}

/// Decides whether a connectivity transition resumes the current download.
///
/// Never starts a download the user did not start.
#[derive(Debug, Clone)]
pub struct ResumeController {
    warn_on_mobile_data: bool,
}

impl ResumeController {
    pub fn new(warn_on_mobile_data: bool) -> Self {
        Self {
            warn_on_mobile_data,
        }
    }

    pub fn warn_on_mobile_data(&self) -> bool {
        self.warn_on_mobile_data
    }

    pub fn set_warn_on_mobile_data(&mut self, warn: bool) {
        self.warn_on_mobile_data = warn;
    }

    /// Tag to resume after `event`, if any.
    pub fn on_connectivity(&self, event: &ConnectivityEvent, store: &RecordStore) -> Option<String> {
        let ConnectivityEvent::Available(network) = event;
        if !network.internet {
            debug!(kind = %network.kind, "Ignoring network without internet capability");
            return None;
        }
        if self.warn_on_mobile_data && network.kind.is_metered() {
            debug!(kind = %network.kind, "Not resuming on metered network");
            return None;
        }

        let tag = store.current_transfer()?;
        let entry = store.get(tag)?;
        if !entry.state.is_resumable() {
            return None;
        }

        info!(tag = %tag, kind = %network.kind, state = %entry.state, "Network available, resuming download");
        Some(tag.to_string())
    }
}
