//! Core logic including agent loop, tool execution, handoffs, guardrails,
//! etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
pub mod guardrail;
pub mod handoff;
mod model_client;
pub mod profile;
pub mod run;
pub mod tool;

pub use agent::{Agent, AgentBuilder, TranscriptSource};
pub use guardrail::{
    GuardrailError, GuardrailOutput, GuardrailResult, InputGuardrail,
    OutputGuardrail,
};
pub use handoff::{Handoff, HandoffInputFilter};
pub use profile::{AgentProfile, AgentProfileBuilder};
pub use run::{RunError, RunOutput};
pub use tool::{Tool, ToolResult};
