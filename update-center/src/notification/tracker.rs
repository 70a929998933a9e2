//! Ownership of the single presentation slot.

use tracing::debug;

use super::{Presentation, Projection};

/// Instruction for the presentation sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderCommand {
    Update(Presentation),
    Clear,
}

/// Tracks which tag the presentation slot shows and what was last rendered.
#[derive(Debug, Default)]
pub struct PresentationTracker {
    subject: Option<String>,
    shown: Option<Presentation>,
}

impl PresentationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn shown(&self) -> Option<&Presentation> {
        self.shown.as_ref()
    }

    /// A command mutated the projected tag, making it the subject.
    pub fn focus(&mut self, projection: Projection) -> Option<RenderCommand> {
        match projection {
            Projection::Show(presentation) => self.render(presentation),
            Projection::Unchanged => None,
        }
    }

    /// A callback updated the projected tag.
    ///
    /// Another tag takes over the slot only while it is active or when the
    /// slot is empty.
    pub fn observe(&mut self, projection: Projection, active: bool) -> Option<RenderCommand> {
        let Projection::Show(presentation) = projection else {
            return None;
        };
        match self.subject.as_deref() {
            Some(subject) if subject == presentation.tag => self.render(presentation),
            None => self.render(presentation),
            Some(subject) if active => {
                debug!(from = %subject, to = %presentation.tag, "Switching presentation subject");
                self.render(presentation)
            }
            Some(_) => None,
        }
    }

    /// `tag` left the store. `replacement` is the projection of another
    /// active tag, if one exists.
    pub fn removed(&mut self, tag: &str, replacement: Option<Projection>) -> Option<RenderCommand> {
        if self.subject.as_deref() != Some(tag) {
            return None;
        }
        match replacement {
            Some(Projection::Show(presentation)) => self.render(presentation),
            _ => {
                self.subject = None;
                self.shown = None;
                Some(RenderCommand::Clear)
            }
        }
    }

    fn render(&mut self, presentation: Presentation) -> Option<RenderCommand> {
        self.subject = Some(presentation.tag.clone());
        if self.shown.as_ref() == Some(&presentation) {
            return None;
        }
        self.shown = Some(presentation.clone());
        Some(RenderCommand::Update(presentation))
    }
}
