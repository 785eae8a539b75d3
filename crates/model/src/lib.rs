//! Provider-neutral types shared by every model backend.
//!
//! The agent runtime only talks to models through the types defined here,
//! so a hosted chat-completions endpoint and the scripted test model can be
//! swapped without touching the runtime.
//!
//! Nothing in this crate performs I/O. Implementors of [`ModelProvider`]
//! and [`ModelResponse`] bring the behavior.

#![deny(missing_docs)]

mod error;
mod opaque;
mod provider;
mod request;
mod response;

pub use error::*;
pub use opaque::*;
pub use provider::*;
pub use request::*;
pub use response::*;
