//! Control-plane host.
//!
//! A single actor owns the [`ControlPlane`] and serializes every mutation:
//! user commands, transfer engine callbacks, installer callbacks and
//! connectivity changes all arrive as [`HostMessage`]s in one mailbox. The
//! [`ControlPlaneHost`] supervisor starts the actor on demand and re-hosts
//! the plane after an idle teardown.

pub mod actor;
pub mod events;
pub mod guard;
pub mod handle;
pub mod messages;
pub mod plane;
pub mod supervisor;

pub use actor::{Collaborators, ExitReason, HostActor, HostExit};
pub use events::{UpdateEvent, UpdateSnapshot};
pub use guard::ShutdownGuard;
pub use handle::{ActorHandle, DEFAULT_SEND_TIMEOUT, HostHandle, SendError};
pub use messages::HostMessage;
pub use plane::{ControlPlane, Effect};
pub use supervisor::ControlPlaneHost;
