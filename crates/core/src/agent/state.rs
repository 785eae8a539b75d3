use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use flash_agent_actor::{Actor, Message};
use flash_agent_model::{
    ModelFinishReason, ModelMessage, ModelProviderError, ModelRequest,
    ToolCallRequest,
};
use tokio::sync::oneshot;

use super::{AgentState, TranscriptSource};
use crate::conversation::{Conversation, Item as ConversationItem};
use crate::guardrail::{GuardrailStage, run_guardrails};
use crate::handoff::{Handoff, HandoffInputFilter};
use crate::model_client::{ModelClient, ModelClientResponse};
use crate::run::{RunError, RunOutput};
use crate::tool::ToolResult;

/// Tool result for handoff calls beyond the first one in a turn.
const IGNORED_HANDOFF_OUTPUT: &str =
    "Multiple handoffs detected, ignoring this one.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AgentStage {
    #[default]
    Idle,
    CheckingInput,
    ModelThinking,
    RunningTools,
    CheckingOutput,
}

type RunReply = oneshot::Sender<Result<RunOutput, RunError>>;

#[derive(Debug)]
pub struct PendingInput {
    input: String,
    reply: Option<RunReply>,
}

/// Bookkeeping of the run in progress.
pub struct RunState {
    id: u64,
    input: String,
    reply: Option<RunReply>,
    /// Conversation length before the run, restored if the run fails.
    history_len: usize,
    turns: usize,
    tool_calls: Vec<ToolCallRequest>,
    tool_results: HashMap<String, ToolResult>,
    handoff: Option<(ToolCallRequest, Handoff)>,
    final_output: String,
}

impl AgentState {
    #[inline]
    fn enqueue_user_input(&mut self, pending: PendingInput, handle: &Actor<Self>) {
        if self.current_stage != AgentStage::Idle {
            // If we are not in idle stage, just enqueue the input and
            // do nothing else.
            self.pending_inputs.push_back(pending);
            return;
        }
        self.start_run(pending, handle);
    }

    fn process_next_input(&mut self, handle: &Actor<Self>) {
        if self.current_stage != AgentStage::Idle {
            // Cannot process the next input now. It will be picked up when
            // the current run ends.
            return;
        }
        let pending = self.pending_inputs.pop_front();
        if let Some(pending) = pending {
            self.start_run(pending, handle);
        } else {
            // Nothing to process, so we can invoke the idle callback.
            if let Some(on_idle) = &self.callbacks.on_idle {
                on_idle();
            }
        }
    }

    fn start_run(&mut self, pending: PendingInput, handle: &Actor<Self>) {
        let PendingInput { input, reply } = pending;
        if !self.retain_history {
            self.conversation.items.clear();
        }
        self.active_profile = Arc::clone(&self.root_profile);

        let run_id = self.next_run_id;
        self.next_run_id += 1;
        debug!("starting run {run_id} with `{}`", self.root_profile.name());

        if let Some(on_transcript) = &self.callbacks.on_transcript {
            on_transcript(&input, TranscriptSource::User);
        }

        let guardrails = &self.active_profile.input_guardrails;
        let check = (!guardrails.is_empty()).then(|| {
            run_guardrails(guardrails, &input, GuardrailStage::Input)
        });
        self.current_run = Some(RunState {
            id: run_id,
            input,
            reply,
            history_len: self.conversation.items.len(),
            turns: 0,
            tool_calls: vec![],
            tool_results: HashMap::new(),
            handoff: None,
            final_output: String::new(),
        });

        let Some(check) = check else {
            self.accept_input(handle);
            return;
        };
        self.current_stage = AgentStage::CheckingInput;
        let handle_clone = handle.clone();
        self.spawn_task(
            |_| async move {
                let outcome = check.await;
                handle_clone.send(InputChecked { run_id, outcome }).ok();
            },
            handle,
        );
    }

    /// Adds the checked input to the conversation and calls the model.
    fn accept_input(&mut self, handle: &Actor<Self>) {
        let Some(run) = &self.current_run else {
            return;
        };
        let item = ConversationItem::user(run.input.clone());
        self.conversation.items.push(item);
        self.request_model(handle);
    }

    fn request_model(&mut self, handle: &Actor<Self>) {
        let Some(run) = self.current_run.as_mut() else {
            return;
        };
        if run.turns >= self.max_turns {
            let err = RunError::MaxTurnsExceeded(self.max_turns);
            self.finish_run(Err(err), handle);
            return;
        }
        run.turns += 1;
        let run_id = run.id;
        trace!("run {run_id}: model turn {}", run.turns);

        self.current_stage = AgentStage::ModelThinking;
        let request = self.build_model_request();
        let model_client = self
            .model_client
            .take()
            .expect("model client is already in use");
        let on_transcript = self.callbacks.on_transcript.clone();
        let handle_clone = handle.clone();
        self.spawn_task(
            |_| async move {
                let response = model_client
                    .send_request(request, move |delta| {
                        if let Some(on_transcript) = &on_transcript {
                            on_transcript(&delta, TranscriptSource::Assistant);
                        }
                    })
                    .await;
                handle_clone
                    .send(ModelRequestFinished {
                        run_id,
                        model_client,
                        response,
                    })
                    .ok();
            },
            handle,
        );
    }

    fn build_model_request(&self) -> ModelRequest {
        let profile = &self.active_profile;
        let mut messages =
            Vec::with_capacity(self.conversation.items.len() + 1);
        if !profile.instructions().is_empty() {
            messages.push(ModelMessage::System(
                profile.instructions().to_owned(),
            ));
        }
        messages.extend(self.conversation.items.iter().map(|i| i.msg.clone()));
        ModelRequest {
            messages,
            tools: profile.tool_definitions(),
            output_schema: profile.output_schema().cloned(),
        }
    }

    fn handle_model_response(
        &mut self,
        response: Result<ModelClientResponse, Box<dyn ModelProviderError>>,
        handle: &Actor<Self>,
    ) {
        let resp = match response {
            Ok(resp) => resp,
            Err(err) => {
                let err = RunError::Model {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                self.finish_run(Err(err), handle);
                return;
            }
        };

        // Insert the message to the conversation.
        let ModelClientResponse {
            transcript,
            opaque_msg,
            tool_calls,
            finish_reason,
        } = resp;
        let msg = if let Some(opaque_msg) = opaque_msg {
            ModelMessage::Opaque(opaque_msg)
        } else {
            // Downgrade to a text-only message.
            ModelMessage::Assistant(transcript.clone())
        };
        let has_tool_calls = !tool_calls.is_empty();
        self.conversation.items.push(ConversationItem::assistant(
            msg,
            transcript.clone(),
            self.active_profile.name(),
            has_tool_calls,
        ));

        if has_tool_calls {
            self.dispatch_tool_calls(tool_calls, handle);
            return;
        }
        if finish_reason != Some(ModelFinishReason::Stop) {
            debug!("model stopped with {finish_reason:?}");
        }
        self.check_output(transcript, handle);
    }

    fn dispatch_tool_calls(
        &mut self,
        calls: Vec<ToolCallRequest>,
        handle: &Actor<Self>,
    ) {
        self.current_stage = AgentStage::RunningTools;
        let profile = Arc::clone(&self.active_profile);
        let Some(run) = self.current_run.as_mut() else {
            return;
        };
        let run_id = run.id;

        let mut function_calls = Vec::with_capacity(calls.len());
        for call in &calls {
            if let Some(on_tool_call) = &self.callbacks.on_tool_call {
                on_tool_call(call);
            }
            match profile.find_handoff(&call.name) {
                Some(handoff) if run.handoff.is_none() => {
                    run.handoff = Some((call.clone(), handoff.clone()));
                }
                Some(_) => {
                    warn!("ignoring extra handoff `{}`", call.name);
                    run.tool_results.insert(
                        call.id.clone(),
                        Ok(IGNORED_HANDOFF_OUTPUT.to_owned()),
                    );
                }
                None => function_calls.push(call.clone()),
            }
        }
        run.tool_calls = calls;

        profile
            .tools()
            .handle_requests(function_calls, |call_id, future| {
                let handle_clone = handle.clone();
                self.spawn_task(
                    |_| async move {
                        let result = future.await;
                        handle_clone
                            .send(ToolCallFinished {
                                run_id,
                                call_id,
                                result,
                            })
                            .ok();
                    },
                    handle,
                );
            });

        // A turn with only handoffs has nothing to wait for.
        self.try_complete_tool_round(handle);
    }

    fn try_complete_tool_round(&mut self, handle: &Actor<Self>) {
        let Some(run) = &self.current_run else {
            return;
        };
        let handoff_id = run.handoff.as_ref().map(|(call, _)| &call.id);
        let complete = run.tool_calls.iter().all(|call| {
            Some(&call.id) == handoff_id
                || run.tool_results.contains_key(&call.id)
        });
        if complete {
            self.complete_tool_round(handle);
        }
    }

    /// Records every tool result in call order, performs the pending
    /// handoff, then asks the model again.
    fn complete_tool_round(&mut self, handle: &Actor<Self>) {
        let Some(run) = self.current_run.as_mut() else {
            return;
        };
        let calls = std::mem::take(&mut run.tool_calls);
        let mut results = std::mem::take(&mut run.tool_results);
        let mut handoff = run.handoff.take();
        let mut accepted_handoff = None;

        for call in calls {
            let content = match results.remove(&call.id) {
                Some(Ok(content)) => content,
                Some(Err(err)) => {
                    debug!("tool `{}` failed: {err}", call.name);
                    err.to_tool_output()
                }
                None => {
                    let Some((handoff_call, pending)) =
                        handoff.take_if(|(c, _)| c.id == call.id)
                    else {
                        continue;
                    };
                    match pending.invoke(handoff_call.arguments) {
                        Ok(()) => {
                            let content = pending.accepted_output();
                            accepted_handoff = Some(pending);
                            content
                        }
                        Err(reason) => {
                            warn!(
                                "rejected handoff `{}`: {reason}",
                                call.name
                            );
                            format!("Error: invalid handoff input: {reason}")
                        }
                    }
                }
            };
            self.conversation
                .items
                .push(ConversationItem::tool_result(call.id, content));
        }

        if let Some(handoff) = accepted_handoff {
            self.switch_profile(handoff);
        }
        self.request_model(handle);
    }

    fn switch_profile(&mut self, handoff: Handoff) {
        if let Some(filter) = handoff.input_filter() {
            self.filter_history(filter);
        }

        let target = handoff.target();
        info!(
            "handed off from `{}` to `{}`",
            self.active_profile.name(),
            target.name()
        );
        self.active_profile = Arc::clone(target);
        if let Some(on_agent_changed) = &self.callbacks.on_agent_changed {
            on_agent_changed(target.name());
        }
    }

    fn filter_history(&mut self, filter: HandoffInputFilter) {
        let Some(run) = self.current_run.as_mut() else {
            return;
        };
        // Earlier runs are filtered on their own so the rollback point
        // stays valid.
        let items = &mut self.conversation.items;
        let mut current = items.split_off(run.history_len.min(items.len()));
        filter.apply(items);
        run.history_len = items.len();
        filter.apply(&mut current);
        items.extend(current);
    }

    fn check_output(&mut self, final_output: String, handle: &Actor<Self>) {
        let Some(run) = self.current_run.as_mut() else {
            return;
        };
        run.final_output = final_output;
        let run_id = run.id;

        let guardrails = &self.active_profile.output_guardrails;
        if guardrails.is_empty() {
            self.finish_run(Ok(()), handle);
            return;
        }
        let output = &run.final_output;
        let check = run_guardrails(guardrails, output, GuardrailStage::Output);
        self.current_stage = AgentStage::CheckingOutput;
        let handle_clone = handle.clone();
        self.spawn_task(
            |_| async move {
                let outcome = check.await;
                handle_clone.send(OutputChecked { run_id, outcome }).ok();
            },
            handle,
        );
    }

    /// Ends the current run, replies to its caller, and moves on to the
    /// next queued input.
    fn finish_run(
        &mut self,
        outcome: Result<(), RunError>,
        handle: &Actor<Self>,
    ) {
        let Some(run) = self.current_run.take() else {
            return;
        };
        self.current_stage = AgentStage::Idle;

        let result = match outcome {
            Ok(()) => {
                let agent_name = self.active_profile.name();
                debug!("run {} finished by `{agent_name}`", run.id);
                Ok(RunOutput {
                    agent_name: self.active_profile.name().to_owned(),
                    final_output: run.final_output,
                })
            }
            Err(err) => {
                warn!("run {} failed: {err}", run.id);
                self.conversation.items.truncate(run.history_len);
                Err(err)
            }
        };
        if let Some(reply) = run.reply {
            // The caller may have stopped waiting.
            reply.send(result).ok();
        }

        self.process_next_input(handle);
    }

    #[inline]
    fn is_current_run(&self, run_id: u64) -> bool {
        self.current_run.as_ref().is_some_and(|run| run.id == run_id)
    }

    fn spawn_task<F, Fut>(&mut self, f: F, handle: &Actor<Self>)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let handle = handle.clone();
        let fut = f(task_id);
        let task = tokio::spawn(async move {
            fut.await;
            handle.send(TaskEndedMessage(task_id)).ok();
        });
        self.running_tasks.insert(task_id, task);
    }
}

#[derive(Debug)]
pub struct EnqueueUserInput {
    pub input: String,
    pub reply: Option<RunReply>,
}

impl Message<AgentState> for EnqueueUserInput {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        let pending = PendingInput {
            input: self.input,
            reply: self.reply,
        };
        state.enqueue_user_input(pending, handle);
    }
}

#[derive(Debug)]
struct InputChecked {
    run_id: u64,
    outcome: Result<(), RunError>,
}

impl Message<AgentState> for InputChecked {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        if !state.is_current_run(self.run_id) {
            return;
        }
        match self.outcome {
            Ok(()) => state.accept_input(handle),
            Err(err) => state.finish_run(Err(err), handle),
        }
    }
}

struct ModelRequestFinished {
    run_id: u64,
    model_client: ModelClient,
    response: Result<ModelClientResponse, Box<dyn ModelProviderError>>,
}

impl Debug for ModelRequestFinished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRequestFinished")
            .field("run_id", &self.run_id)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

impl Message<AgentState> for ModelRequestFinished {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        state.model_client = Some(self.model_client);
        if !state.is_current_run(self.run_id) {
            return;
        }
        state.handle_model_response(self.response, handle);
    }
}

#[derive(Debug)]
struct ToolCallFinished {
    run_id: u64,
    call_id: String,
    result: ToolResult,
}

impl Message<AgentState> for ToolCallFinished {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        let Some(run) = state.current_run.as_mut() else {
            return;
        };
        if run.id != self.run_id {
            return;
        }
        run.tool_results.insert(self.call_id, self.result);
        state.try_complete_tool_round(handle);
    }
}

#[derive(Debug)]
struct OutputChecked {
    run_id: u64,
    outcome: Result<(), RunError>,
}

impl Message<AgentState> for OutputChecked {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        if state.is_current_run(self.run_id) {
            state.finish_run(self.outcome, handle);
        }
    }
}

#[derive(Debug)]
pub struct SnapshotConversation(pub oneshot::Sender<Conversation>);

impl Message<AgentState> for SnapshotConversation {
    #[inline]
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        self.0.send(state.conversation.clone()).ok();
    }
}

#[derive(Debug)]
pub struct ResetConversation;

impl Message<AgentState> for ResetConversation {
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        debug!("conversation reset");
        match state.current_run.as_mut() {
            Some(run) => {
                // Keeps the run in progress consistent.
                let len = run.history_len.min(state.conversation.items.len());
                state.conversation.items.drain(..len);
                run.history_len = 0;
            }
            None => state.conversation.items.clear(),
        }
    }
}

#[derive(Debug)]
struct TaskEndedMessage(u64);

impl Message<AgentState> for TaskEndedMessage {
    #[inline]
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        if state.running_tasks.remove(&self.0).is_none() {
            warn!("unknown task {} ended", self.0);
        }
    }
}
