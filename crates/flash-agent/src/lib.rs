//! Ready-made demo agents on top of `flash-agent-core`.
//!
//! The crate includes a CLI tool for chatting with the demos in the
//! terminal, and a small web chat. You can also use it as a library to
//! bring the demo tools and agents into your own host apps.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

pub mod config;
pub mod demos;
pub mod guardrails;
mod session;
pub mod tools;
#[cfg(feature = "web")]
pub mod web;

pub use config::{ConfigError, Settings};
pub use demos::{Demo, DemoOptions};
pub use session::{Reply, Session, SessionBuilder};

/// Re-exports of [`flash_agent_core`] crate.
pub mod core {
    pub use flash_agent_core::*;
}
