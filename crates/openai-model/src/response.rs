use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use flash_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    OpaqueMessage, ToolCallRequest,
};
use pin_project_lite::pin_project;
use serde_json::Value;

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, Message, ToolCall};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    content: String,
    reasoning_content: Option<String>,
    tool_calls: Vec<ToolCall>,
    // Indices into `tool_calls` that are complete enough to be emitted but
    // have not been handed to the caller yet.
    pending_tool_call_idx: VecDeque<usize>,
    pending_finish_reason: Option<ModelFinishReason>,
    stream_ended: bool,
}

impl PartialState {
    fn new(sse: Sse) -> Self {
        Self {
            sse,
            id: None,
            content: String::new(),
            reasoning_content: None,
            tool_calls: Vec::new(),
            pending_tool_call_idx: VecDeque::new(),
            pending_finish_reason: None,
            stream_ended: false,
        }
    }

    fn finish(self) -> (String, Message) {
        let id = self.id.unwrap_or_else(|| "chatcmpl-unknown".to_owned());
        let content = if self.content.is_empty() && !self.tool_calls.is_empty()
        {
            None
        } else {
            Some(self.content)
        };
        let message = Message::Assistant {
            content,
            tool_calls: if self.tool_calls.is_empty() {
                None
            } else {
                Some(self.tool_calls)
            },
            reasoning_content: self.reasoning_content,
        };
        (id, message)
    }

    fn merge_tool_call(&mut self, fragment: ToolCall) {
        let existing = match (fragment.index, fragment.id.as_deref()) {
            (Some(index), _) => {
                self.tool_calls.iter().position(|t| t.index == Some(index))
            }
            // Some providers stream whole tool calls without an index.
            (None, Some(id)) if !id.is_empty() => {
                self.tool_calls.iter().position(|t| t.id.as_deref() == Some(id))
            }
            // A named fragment starts a new call, e.g. Gemini's parallel
            // calls with empty ids. Name-less ones continue the last call.
            (None, _) => {
                let named = fragment
                    .function
                    .as_ref()
                    .and_then(|f| f.name.as_deref())
                    .is_some_and(|name| !name.is_empty());
                if named {
                    None
                } else {
                    self.tool_calls.len().checked_sub(1)
                }
            }
        };
        let Some(existing) = existing else {
            self.pending_tool_call_idx.push_back(self.tool_calls.len());
            self.tool_calls.push(fragment);
            return;
        };

        let partial = &mut self.tool_calls[existing];
        if let Some(id) = fragment.id {
            partial.id.get_or_insert_default().push_str(&id);
        }
        if let Some(ty) = fragment.r#type {
            partial.r#type = Some(ty);
        }
        let Some(function) = fragment.function else {
            return;
        };
        match &mut partial.function {
            Some(partial_func) => {
                if let Some(name) = function.name {
                    partial_func.name.get_or_insert_default().push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial_func
                        .arguments
                        .get_or_insert_default()
                        .push_str(&arguments);
                }
            }
            None => partial.function = Some(function),
        }
    }

    /// Turns the tool call at `idx` into a request, assigning an id if the
    /// provider didn't send one.
    fn take_tool_call_request(&mut self, idx: usize) -> ToolCallRequest {
        let tool_call = &mut self.tool_calls[idx];
        let id = match tool_call.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => {
                let id = format!("call_{idx}");
                tool_call.id = Some(id.clone());
                id
            }
        };
        let name = tool_call
            .function
            .as_ref()
            .and_then(|f| f.name.clone())
            .unwrap_or_default();
        let arguments = tool_call
            .function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .filter(|args| !args.trim().is_empty())
            .and_then(|args| serde_json::from_str::<Value>(args).ok())
            .unwrap_or_else(|| Value::Object(Default::default()));
        ToolCallRequest {
            id,
            name,
            arguments,
        }
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streamed chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
        full_msg: Option<(String, Message)>,
    }
}

impl OpenAIResponse {
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState::new(sse);
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
            full_msg: None,
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, partial_state)) => {
                    *this.next_event_fut = None;
                    *this.full_msg = Some(partial_state.finish());
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        *this.next_event_fut = Some(Box::pin(next_event(partial_state)));
        Poll::Ready(Ok(Some(event)))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        self.full_msg
            .as_ref()
            .map(|(id, msg)| OpaqueMessage::new(id.as_str(), msg.clone()))
    }
}

fn parse_finish_reason(reason: &str) -> ModelFinishReason {
    match reason {
        "tool_calls" | "function_call" => ModelFinishReason::ToolCalls,
        "length" => ModelFinishReason::Length,
        "content_filter" => ModelFinishReason::ContentFilter,
        _ => ModelFinishReason::Stop,
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    let mut message_delta = None;

    while !partial_state.stream_ended {
        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.stream_ended = true;
                break;
            }
            Err(err) => {
                return Err(Error::new(
                    format!("broken event stream: {err:?}"),
                    ErrorKind::Unavailable,
                ));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.stream_ended = true;
            break;
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("malformed chunk: {err}"), ErrorKind::Other)
            })?;
        if let Some(chunk_id) = chunk.id.filter(|id| !id.is_empty()) {
            if partial_state.id.get_or_insert_with(|| chunk_id.clone())
                != &chunk_id
            {
                return Err(Error::new("chunk id mismatch", ErrorKind::Other));
            }
        }

        // Usage-only chunks come without choices.
        let Some(choice) = chunk.choices.into_iter().next() else {
            continue;
        };

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty())
        {
            partial_state.content.push_str(&content);
            message_delta = Some(content);
        }
        if let Some(reasoning_content) = &choice.delta.reasoning_content {
            partial_state
                .reasoning_content
                .get_or_insert_default()
                .push_str(reasoning_content);
        }
        for fragment in choice.delta.tool_calls.into_iter().flatten() {
            partial_state.merge_tool_call(fragment);
        }
        if let Some(finish_reason) = choice.finish_reason {
            partial_state.pending_finish_reason =
                Some(parse_finish_reason(&finish_reason));
        }

        if message_delta.is_some()
            || partial_state.pending_finish_reason.is_some()
        {
            break;
        }
    }

    // Message deltas go first, then tool calls, and the finish reason last.
    // Tool calls are only complete once the provider moved past them, so
    // they are held back until the finish reason or the end of the stream.

    if let Some(message_delta) = message_delta {
        return Ok((
            Some(ModelResponseEvent::MessageDelta(message_delta)),
            partial_state,
        ));
    }

    if let Some(idx) = partial_state.pending_tool_call_idx.pop_front() {
        let request = partial_state.take_tool_call_request(idx);
        return Ok((Some(ModelResponseEvent::ToolCall(request)), partial_state));
    }

    if let Some(finish_reason) = partial_state.pending_finish_reason.take() {
        return Ok((
            Some(ModelResponseEvent::Completed(finish_reason)),
            partial_state,
        ));
    }

    Ok((None, partial_state))
}
