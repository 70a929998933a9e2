use async_trait::async_trait;
use tracing::info;

use super::Presentation;

/// Identifier of the single presentation slot.
pub const PRESENTATION_ID: u32 = 10;

/// Renders presentations. Only one is visible at a time, keyed by
/// [`PRESENTATION_ID`].
#[async_trait]
pub trait PresentationSink: Send + Sync {
    async fn update(&self, id: u32, presentation: &Presentation);
    async fn clear(&self, id: u32);
}

/// Sink that writes presentations to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

#[async_trait]
impl PresentationSink for LoggingSink {
    async fn update(&self, id: u32, presentation: &Presentation) {
        info!(
            id,
            tag = %presentation.tag,
            headline = %presentation.headline,
            progress = ?presentation.progress,
            actions = ?presentation.actions,
            "Presentation updated"
        );
    }

    async fn clear(&self, id: u32) {
        info!(id, "Presentation cleared");
    }
}
