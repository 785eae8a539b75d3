mod builder;
mod state;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use flash_agent_actor::define_actor;
use flash_agent_model::ToolCallRequest;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::conversation::Conversation;
use crate::model_client::ModelClient;
use crate::profile::AgentProfile;
use crate::run::{RunError, RunOutput};
pub use builder::AgentBuilder;
use state::{
    AgentStage, EnqueueUserInput, PendingInput, ResetConversation, RunState,
    SnapshotConversation,
};

/// Where a transcript fragment comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// The user input that starts a run.
    User,
    /// A streamed piece of a model reply.
    Assistant,
}

pub(crate) type TranscriptCallback =
    Arc<dyn Fn(&str, TranscriptSource) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Callbacks {
    pub on_idle: Option<Box<dyn Fn() + Send + Sync>>,
    pub on_transcript: Option<TranscriptCallback>,
    pub on_tool_call: Option<Box<dyn Fn(&ToolCallRequest) + Send + Sync>>,
    pub on_agent_changed: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

define_actor! {
    /// An agent instance, which maintains a session, a model provider, and
    /// internal state.
    ///
    /// Messages dispatched to the agent should be handled immediately, no
    /// matter what the current stage this agent is in. For example, if the
    /// agent is currently running a tool, it should still process an
    /// `enqueue_user_input` message. Instead of calling the model, the agent
    /// enqueues the user input, and handle it later when it becomes idle.
    ///
    /// Every run starts with the root profile. Handoffs switch the active
    /// profile until the run ends.
    pub struct Agent;

    struct AgentState {
        model_client: Option<ModelClient>,
        root_profile: Arc<AgentProfile>,
        active_profile: Arc<AgentProfile>,
        conversation: Conversation,
        retain_history: bool,
        max_turns: usize,
        current_stage: AgentStage,
        current_run: Option<RunState>,
        next_run_id: u64,
        pending_inputs: VecDeque<PendingInput>,
        running_tasks: HashMap<u64, JoinHandle<()>>,
        next_task_id: u64,
        callbacks: Callbacks,
    }
}

impl Agent {
    /// Enqueues a user input for processing.
    ///
    /// The outcome is only observable through the callbacks. Use
    /// [`Agent::run`] to wait for the final output instead.
    pub fn enqueue_user_input<S: Into<String>>(&self, input: S) {
        let msg = EnqueueUserInput {
            input: input.into(),
            reply: None,
        };
        if self.handle().send(msg).is_err() {
            warn!("agent has stopped, dropping the input");
        }
    }

    /// Runs the agent on `input` and waits for the final output.
    ///
    /// Inputs are handled one at a time. If the agent is busy, the input
    /// waits in the queue.
    pub fn run<S: Into<String>>(
        &self,
        input: S,
    ) -> impl Future<Output = Result<RunOutput, RunError>> + Send + 'static {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self.handle().send(EnqueueUserInput {
            input: input.into(),
            reply: Some(reply_tx),
        });
        async move {
            sent.map_err(|_| RunError::AgentUnavailable)?;
            reply_rx.await.unwrap_or(Err(RunError::AgentUnavailable))
        }
    }

    /// Returns a snapshot of the conversation.
    ///
    /// Without history, the conversation only holds the latest run.
    pub async fn conversation(&self) -> Conversation {
        let (tx, rx) = oneshot::channel();
        if self.handle().send(SnapshotConversation(tx)).is_err() {
            return Conversation::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Forgets the conversation so far.
    pub fn reset(&self) {
        self.handle().send(ResetConversation).ok();
    }
}

impl Agent {
    fn spawn_from_builder(builder: AgentBuilder) -> Self {
        let AgentBuilder {
            model_client,
            profile,
            retain_history,
            max_turns,
            callbacks,
        } = builder;

        let label = profile.name().to_owned();
        let state = AgentState {
            model_client: Some(model_client),
            active_profile: Arc::clone(&profile),
            root_profile: profile,
            conversation: Default::default(),
            retain_history,
            max_turns,
            current_stage: Default::default(),
            current_run: None,
            next_run_id: 1,
            pending_inputs: Default::default(),
            running_tasks: Default::default(),
            next_task_id: 1,
            callbacks,
        };
        Self::spawn(state, Some(&label))
    }
}

impl Drop for AgentState {
    fn drop(&mut self) {
        for (_, task) in self.running_tasks.drain() {
            task.abort();
        }
    }
}
