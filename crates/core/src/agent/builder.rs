use std::sync::Arc;

use flash_agent_model::{ModelProvider, ToolCallRequest};

use super::{Agent, Callbacks, TranscriptSource};
use crate::model_client::ModelClient;
use crate::profile::AgentProfile;

/// Model turns allowed in a single run by default.
pub const DEFAULT_MAX_TURNS: usize = 10;

/// [`Agent`] builder.
pub struct AgentBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) profile: Arc<AgentProfile>,
    pub(crate) retain_history: bool,
    pub(crate) max_turns: usize,
    pub(crate) callbacks: Callbacks,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    ///
    /// The agent gets a bare profile named `Assistant` unless
    /// [`AgentBuilder::with_profile`] is called.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            profile: Arc::new(AgentProfile::builder("Assistant").build()),
            retain_history: false,
            max_turns: DEFAULT_MAX_TURNS,
            callbacks: Callbacks::default(),
        }
    }

    /// Sets the root profile every run starts with.
    #[inline]
    pub fn with_profile(mut self, profile: impl Into<Arc<AgentProfile>>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Keeps the conversation across runs.
    ///
    /// Off by default: every run then sees only its own input.
    #[inline]
    pub fn with_history(mut self, retain_history: bool) -> Self {
        self.retain_history = retain_history;
        self
    }

    /// Limits the number of model requests in a single run.
    #[inline]
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Attaches a callback to be invoked when the agent is idle.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Attaches a callback receiving the user input and the streamed model
    /// replies.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str, TranscriptSource) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Attaches a callback invoked for every tool call, handoffs included,
    /// before it runs.
    #[inline]
    pub fn on_tool_call(
        mut self,
        on_tool_call: impl Fn(&ToolCallRequest) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_tool_call = Some(Box::new(on_tool_call));
        self
    }

    /// Attaches a callback invoked with the target name after a handoff.
    #[inline]
    pub fn on_agent_changed(
        mut self,
        on_agent_changed: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_agent_changed = Some(Box::new(on_agent_changed));
        self
    }

    /// Builds the agent.
    ///
    /// Must be called within a tokio runtime.
    #[inline]
    pub fn build(self) -> Agent {
        Agent::spawn_from_builder(self)
    }
}
