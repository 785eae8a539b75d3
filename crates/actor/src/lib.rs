//! A minimal actor runtime on top of tokio.
//!
//! Each actor owns its state on one task and handles queued messages in
//! order, so the state never needs a lock.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod error;
mod handle;
mod macros;
mod mailbox;
mod scheduler;

pub use error::ActorDeadError;
pub use handle::Actor;
pub use mailbox::{BoxMessage, Message};
