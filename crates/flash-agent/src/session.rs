use std::fmt::{self, Debug};

use flash_agent_core::conversation::Conversation;
use flash_agent_core::{Agent, AgentBuilder, RunError, RunOutput};
use flash_agent_model::{ModelProvider, ToolCallRequest};

use crate::config::ConfigError;
use crate::demos::{AgentOutput, Demo, DemoOptions};

type ToolCallCallback = Box<dyn Fn(&ToolCallRequest) + Send + Sync>;
type AgentChangedCallback = Box<dyn Fn(&str) + Send + Sync>;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder<P> {
    demo: Demo,
    provider: P,
    options: DemoOptions,
    on_tool_call: Option<ToolCallCallback>,
    on_agent_changed: Option<AgentChangedCallback>,
}

impl<P: ModelProvider + Clone + 'static> SessionBuilder<P> {
    /// Creates a session builder running `demo` on `provider`.
    pub fn new(demo: Demo, provider: P) -> Self {
        Self {
            demo,
            provider,
            options: DemoOptions::default(),
            on_tool_call: None,
            on_agent_changed: None,
        }
    }

    /// Sets the runtime values the demo needs.
    #[inline]
    pub fn with_options(mut self, options: DemoOptions) -> Self {
        self.options = options;
        self
    }

    /// Attaches a callback to be invoked before a tool or a handoff runs.
    #[inline]
    pub fn on_tool_call(
        mut self,
        on_tool_call: impl Fn(&ToolCallRequest) + Send + Sync + 'static,
    ) -> Self {
        self.on_tool_call = Some(Box::new(on_tool_call));
        self
    }

    /// Attaches a callback to be invoked with the name of the agent taking
    /// over after a handoff.
    #[inline]
    pub fn on_agent_changed(
        mut self,
        on_agent_changed: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_agent_changed = Some(Box::new(on_agent_changed));
        self
    }

    /// Builds a new session.
    ///
    /// Fails if the demo misses a setting. Must be called within a tokio
    /// runtime.
    pub fn build(self) -> Result<Session, ConfigError> {
        let profile = self.demo.build_profile(&self.provider, &self.options)?;
        let root_agent = profile.name().to_owned();

        let mut agent_builder = AgentBuilder::with_model_provider(self.provider)
            .with_profile(profile)
            .with_history(self.demo.retains_history());
        if let Some(on_tool_call) = self.on_tool_call {
            agent_builder = agent_builder.on_tool_call(on_tool_call);
        }
        if let Some(on_agent_changed) = self.on_agent_changed {
            agent_builder = agent_builder.on_agent_changed(on_agent_changed);
        }
        debug!("starting a session for the {} demo", self.demo);

        Ok(Session {
            agent: agent_builder.build(),
            demo: self.demo,
            root_agent,
        })
    }
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// The session holds a fully configured demo agent, and it is basically a
/// wrapper around [`Agent`] that turns run outputs into displayable
/// replies.
pub struct Session {
    agent: Agent,
    demo: Demo,
    root_agent: String,
}

impl Session {
    /// Returns the demo this session runs.
    #[inline]
    pub fn demo(&self) -> Demo {
        self.demo
    }

    /// Returns the name of the agent every input goes to first.
    #[inline]
    pub fn root_agent(&self) -> &str {
        &self.root_agent
    }

    /// Sends a message to the session and waits for the reply.
    ///
    /// Messages sent while a reply is pending are answered in order.
    pub fn send_message(
        &self,
        message: &str,
    ) -> impl Future<Output = Result<Reply, RunError>> + Send + 'static {
        let run = self.agent.run(message);
        let structured = self.demo == Demo::Triage;
        let root_agent = self.root_agent.clone();
        async move {
            let output = run.await?;
            Ok(Reply::from_output(output, structured, &root_agent))
        }
    }

    /// Turns a failed run into the message shown to the user.
    pub fn describe_error(&self, err: &RunError) -> String {
        match self.demo.tripwire_message() {
            Some(message) if err.is_tripwire() => message.to_owned(),
            _ => err.to_string(),
        }
    }

    /// Returns a snapshot of the conversation.
    #[inline]
    pub async fn conversation(&self) -> Conversation {
        self.agent.conversation().await
    }

    /// Forgets the conversation so far.
    #[inline]
    pub fn reset(&self) {
        self.agent.reset();
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("demo", &self.demo)
            .field("root_agent", &self.root_agent)
            .finish_non_exhaustive()
    }
}

/// A reply ready to be displayed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    agent_name: String,
    text: String,
    speaker: Option<String>,
    handed_off: bool,
}

impl Reply {
    fn from_output(output: RunOutput, structured: bool, root: &str) -> Self {
        let handed_off = output.agent_name() != root;
        let parsed = if structured {
            output.parse::<AgentOutput>().ok()
        } else {
            None
        };
        match parsed {
            Some(parsed) => Self {
                agent_name: output.agent_name().to_owned(),
                text: parsed.response,
                speaker: Some(parsed.agent_name),
                handed_off,
            },
            None => Self {
                agent_name: output.agent_name().to_owned(),
                text: output.into_final_output(),
                speaker: None,
                handed_off,
            },
        }
    }

    /// Returns the name of the agent that answered.
    #[inline]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Returns the text of the reply.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the agent name the reply claims in its structured output.
    #[inline]
    pub fn speaker(&self) -> Option<&str> {
        self.speaker.as_deref()
    }

    /// Returns `true` if an agent other than the root one answered.
    #[inline]
    pub fn is_handed_off(&self) -> bool {
        self.handed_off
    }
}
