//! A scripted fake model for tests.

mod preset;

use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use flash_agent_model::{
    ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    OpaqueMessage,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

/// Error returned by [`TestModelProvider`].
#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// A response replaying the events of one scripted step.
pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    opaque_id: String,
    transcript: String,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if this.events.is_empty() {
            return Poll::Ready(Ok(None));
        }
        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;
        Poll::Ready(Ok(this.events.pop_front()))
    }

    fn make_opaque_message(&self) -> Option<OpaqueMessage> {
        Some(OpaqueMessage::new(&self.opaque_id, self.transcript.clone()))
    }
}

#[derive(Clone, Debug)]
enum ConversationStep {
    Input,
    AssistantResponse(PresetResponse),
}

#[derive(Default)]
struct Recorder {
    requests: Vec<ModelRequest>,
    attempts: HashMap<usize, u64>,
    served: usize,
}

/// A local fake model for tests.
///
/// The script is a list of input steps (user inputs, tool results) and
/// assistant response steps. A request picks its step by counting the
/// non-system messages it carries, so a request with one user message gets
/// the step at index 1. Asking for a step that is missing, or that is not an
/// assistant step, fails.
///
/// A provider created with [`TestModelProvider::ordered`] ignores the
/// history instead and serves its assistant steps one after another.
///
/// Clones share the request log, so a test can keep one clone around to
/// inspect what the agent sent.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    conversation_script: Vec<ConversationStep>,
    ordered: bool,
    delay: Option<Duration>,
    recorder: Arc<Mutex<Recorder>>,
}

impl TestModelProvider {
    /// Creates a provider answering requests with its assistant steps in
    /// the order they were added.
    #[inline]
    pub fn ordered() -> Self {
        Self {
            ordered: true,
            ..Default::default()
        }
    }

    /// Appends an assistant response step.
    #[inline]
    pub fn add_assistant_response_step(&mut self, preset: PresetResponse) {
        self.conversation_script
            .push(ConversationStep::AssistantResponse(preset));
    }

    /// Appends a user input step.
    #[inline]
    pub fn add_user_input_step(&mut self) {
        self.conversation_script.push(ConversationStep::Input);
    }

    /// Appends `count` tool result steps.
    #[inline]
    pub fn add_tool_result_steps(&mut self, count: usize) {
        for _ in 0..count {
            self.conversation_script.push(ConversationStep::Input);
        }
    }

    /// Sets the delay between two events.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, across all clones.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.recorder
            .lock()
            .map(|recorder| recorder.requests.clone())
            .unwrap_or_default()
    }

    fn respond(&self, req: &ModelRequest) -> Result<TestModelResponse, Error> {
        let step_idx = req
            .messages
            .iter()
            .filter(|msg| !matches!(msg, ModelMessage::System(_)))
            .count();

        let mut recorder = self.recorder.lock().map_err(|_| Error {
            message: "request log poisoned",
            kind: ErrorKind::Other,
        })?;
        recorder.requests.push(req.clone());

        let (step_key, preset) = if self.ordered {
            let served = recorder.served;
            let preset = self
                .conversation_script
                .iter()
                .filter_map(|step| match step {
                    ConversationStep::AssistantResponse(preset) => Some(preset),
                    ConversationStep::Input => None,
                })
                .nth(served);
            (served, preset)
        } else {
            match self.conversation_script.get(step_idx) {
                Some(ConversationStep::AssistantResponse(preset)) => {
                    (step_idx, Some(preset))
                }
                Some(ConversationStep::Input) => {
                    return Err(Error {
                        message: "not an assistant response step",
                        kind: ErrorKind::Other,
                    });
                }
                None => (step_idx, None),
            }
        };
        let Some(preset) = preset else {
            return Err(Error {
                message: "no enough steps",
                kind: ErrorKind::Other,
            });
        };

        if let Some(failures) = preset.failures {
            let attempts = recorder.attempts.entry(step_key).or_default();
            *attempts += 1;
            if failures == 0 || *attempts <= failures {
                return Err(Error {
                    message: "scripted failure",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
        }
        recorder.served += 1;

        let mut transcript = String::new();
        let mut has_tool_call = false;
        let mut events: VecDeque<_> = preset
            .events
            .iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    transcript.push_str(msg);
                    ModelResponseEvent::MessageDelta(msg.clone())
                }
                PresetEvent::ToolCall(req) => {
                    has_tool_call = true;
                    ModelResponseEvent::ToolCall(req.clone())
                }
            })
            .collect();
        events.push_back(ModelResponseEvent::Completed(if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }));

        Ok(TestModelResponse {
            events,
            opaque_id: format!("msg:{}", recorder.requests.len()),
            transcript,
            delay: self.delay.unwrap_or(Duration::from_millis(1)),
            sleep: None,
        })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.respond(req))
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use flash_agent_model::{ModelTool, ToolCallRequest, ToolCallResult};
    use serde_json::json;

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, OpaqueMessage) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await.unwrap()
        {
            match event {
                ModelResponseEvent::Completed(_) => {}
                ModelResponseEvent::MessageDelta(delta) => msg.push_str(&delta),
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
            }
        }
        (msg, tool_call, resp.make_opaque_message().unwrap())
    }

    #[tokio::test]
    async fn test_scripted_tool_turn() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::MessageDelta("Checking ".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_0".to_owned(),
                name: "get_weather".to_owned(),
                arguments: json!({ "city": "Karachi" }),
            }),
        ]));
        provider.add_tool_result_steps(1);
        provider.add_assistant_response_step(PresetResponse::text(
            "It is 31°C with Sunny.",
        ));

        let mut req = ModelRequest {
            messages: vec![
                ModelMessage::System("You are weather agent.".to_owned()),
                ModelMessage::User("Weather in Karachi?".to_owned()),
            ],
            tools: vec![ModelTool {
                name: "get_weather".to_owned(),
                description: "Get weather for the given city".to_owned(),
                parameters: json!({ "type": "object" }),
            }],
            output_schema: None,
        };
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, opaque_msg) = collect_response(resp).await;
        assert_eq!(msg, "Checking ");
        assert_eq!(tool_call.unwrap().arguments["city"], "Karachi");

        req.messages.push(ModelMessage::Opaque(opaque_msg));
        req.messages.push(ModelMessage::Tool(ToolCallResult {
            id: "call_0".to_owned(),
            content: "31°C with Sunny".to_owned(),
        }));
        let resp = provider.send_request(&req).await.unwrap();
        let (msg, tool_call, _) = collect_response(resp).await;
        assert_eq!(msg, "It is 31°C with Sunny.");
        assert!(tool_call.is_none());

        assert_eq!(provider.clone().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_user_input_step();
        provider.add_assistant_response_step(
            PresetResponse::text("finally").with_failures(2),
        );

        let req = ModelRequest {
            messages: vec![ModelMessage::User("hi".to_owned())],
            ..Default::default()
        };
        for _ in 0..2 {
            let err = provider.send_request(&req).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        assert!(provider.send_request(&req).await.is_ok());
    }

    #[tokio::test]
    async fn test_ordered_script() {
        let mut provider = TestModelProvider::ordered();
        provider.add_assistant_response_step(PresetResponse::text("first"));
        provider.add_assistant_response_step(PresetResponse::text("second"));

        let req = ModelRequest {
            messages: vec![ModelMessage::User("hi".to_owned())],
            ..Default::default()
        };
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await.0, "first");
        let resp = provider.send_request(&req).await.unwrap();
        assert_eq!(collect_response(resp).await.0, "second");
        assert!(provider.send_request(&req).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_step() {
        let provider = TestModelProvider::default();
        let req = ModelRequest {
            messages: vec![ModelMessage::User("hi".to_owned())],
            ..Default::default()
        };
        let err = provider.send_request(&req).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
