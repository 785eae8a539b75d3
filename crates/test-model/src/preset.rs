use flash_agent_model::ToolCallRequest;
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallRequest),
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the first `failures` requests for this step are rejected as
    /// rate limited. `Some(0)` rejects every request.
    #[serde(default)]
    pub failures: Option<u64>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: None,
        }
    }

    /// A response made of a single text message.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::with_events([PresetEvent::MessageDelta(text.into())])
    }

    /// Sets failure times before a successful response. `0` means the
    /// response will always be a failure.
    #[inline]
    pub fn with_failures(mut self, failures: u64) -> Self {
        self.failures = Some(failures);
        self
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_script_file_format() {
        let script = r#"{
            "events": [
                { "type": "message_delta", "data": "Let me check." },
                {
                    "type": "tool_call",
                    "data": {
                        "id": "call_0",
                        "name": "get_weather",
                        "arguments": { "city": "Karachi" }
                    }
                }
            ]
        }"#;
        let response: PresetResponse = serde_json::from_str(script).unwrap();
        assert_eq!(response.failures, None);
        assert_eq!(
            response.events[1],
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_0".to_owned(),
                name: "get_weather".to_owned(),
                arguments: json!({ "city": "Karachi" }),
            })
        );
    }
}
