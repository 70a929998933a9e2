//! User-facing status presentation.
//!
//! The projector is a pure function from an update's state to an immutable
//! [`Presentation`]. The tracker decides which tag the single presentation
//! slot shows and when it is cleared. The sink renders it.

pub mod presentation;
pub mod projector;
pub mod sink;
pub mod tracker;

pub use presentation::{Headline, Presentation, PresentationAction, ProgressIndicator};
pub use projector::{Projection, project};
pub use sink::{LoggingSink, PRESENTATION_ID, PresentationSink};
pub use tracker::{PresentationTracker, RenderCommand};
