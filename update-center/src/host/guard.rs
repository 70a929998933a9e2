//! Decides when the host may stop.

use super::ControlPlane;

/// Shutdown guard of the host.
///
/// The host may stop only when no observer is attached, no download is
/// active or waiting for the network and no install is in flight.
#[derive(Debug, Default)]
pub struct ShutdownGuard {
    observers: usize,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self) {
        self.observers += 1;
    }

    pub fn detach(&mut self) {
        self.observers = self.observers.saturating_sub(1);
    }

    pub fn observers(&self) -> usize {
        self.observers
    }

    pub fn may_stop(&self, plane: &ControlPlane) -> bool {
        self.observers == 0 && plane.is_idle()
    }
}
