//! Delegating a conversation to another agent profile.
//!
//! Each handoff is offered to the model as a tool named
//! `transfer_to_<agent_name>`. When the model calls it, the run continues
//! with the target profile: its instructions, its tools and its handoffs.

use std::fmt::{self, Debug};
use std::sync::Arc;

use flash_agent_model::ModelTool;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::conversation::Item;
use crate::profile::AgentProfile;

/// Rewrites the history the target agent receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandoffInputFilter {
    /// Drops every tool call and tool result, including the handoff call
    /// itself.
    RemoveAllTools,
}

impl HandoffInputFilter {
    pub(crate) fn apply(self, items: &mut Vec<Item>) {
        match self {
            HandoffInputFilter::RemoveAllTools => {
                items.retain(|item| !item.involves_tools());
            }
        }
    }
}

type HandoffCallback = Arc<dyn Fn(Value) -> Result<(), String> + Send + Sync>;

/// A handoff to another agent profile.
#[derive(Clone)]
pub struct Handoff {
    target: Arc<AgentProfile>,
    tool_name: String,
    tool_description: Option<String>,
    input_schema: Value,
    on_handoff: Option<HandoffCallback>,
    input_filter: Option<HandoffInputFilter>,
}

impl Handoff {
    /// Creates a handoff to `target` taking no input.
    pub fn to(target: impl Into<Arc<AgentProfile>>) -> Self {
        let target = target.into();
        Self {
            tool_name: default_tool_name(target.name()),
            target,
            tool_description: None,
            input_schema: json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false,
            }),
            on_handoff: None,
            input_filter: None,
        }
    }

    /// Overrides the tool name.
    #[inline]
    pub fn with_tool_name<S: Into<String>>(mut self, name: S) -> Self {
        self.tool_name = name.into();
        self
    }

    /// Overrides the tool description.
    #[inline]
    pub fn with_tool_description<S: Into<String>>(
        mut self,
        description: S,
    ) -> Self {
        self.tool_description = Some(description.into());
        self
    }

    /// Makes the model pass a structured input along with the handoff.
    ///
    /// `on_handoff` receives the parsed input before the target takes over.
    /// Arguments that don't match `T` are reported back to the model as a
    /// tool error and the handoff doesn't happen.
    pub fn with_input<T, F>(mut self, schema: Value, on_handoff: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.input_schema = schema;
        self.on_handoff = Some(Arc::new(move |arguments| {
            let input = serde_json::from_value::<T>(arguments)
                .map_err(|err| err.to_string())?;
            on_handoff(input);
            Ok(())
        }));
        self
    }

    /// Invokes `on_handoff` whenever the handoff happens.
    pub fn on_handoff<F>(mut self, on_handoff: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_handoff = Some(Arc::new(move |_| {
            on_handoff();
            Ok(())
        }));
        self
    }

    /// Rewrites the history before the target takes over.
    #[inline]
    pub fn with_input_filter(mut self, filter: HandoffInputFilter) -> Self {
        self.input_filter = Some(filter);
        self
    }

    /// Returns the target profile.
    #[inline]
    pub fn target(&self) -> &Arc<AgentProfile> {
        &self.target
    }

    /// Returns the name of the tool offered to the model.
    #[inline]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    #[inline]
    pub(crate) fn input_filter(&self) -> Option<HandoffInputFilter> {
        self.input_filter
    }

    pub(crate) fn definition(&self) -> ModelTool {
        let description = match &self.tool_description {
            Some(description) => description.clone(),
            None => {
                let mut description = format!(
                    "Handoff to the {} agent to handle the request.",
                    self.target.name()
                );
                if let Some(extra) = self.target.handoff_description() {
                    description.push(' ');
                    description.push_str(extra);
                }
                description
            }
        };
        ModelTool {
            name: self.tool_name.clone(),
            description,
            parameters: self.input_schema.clone(),
        }
    }

    pub(crate) fn invoke(&self, arguments: Value) -> Result<(), String> {
        match &self.on_handoff {
            Some(on_handoff) => on_handoff(arguments),
            None => Ok(()),
        }
    }

    /// The tool result answering an accepted handoff call.
    pub(crate) fn accepted_output(&self) -> String {
        json!({ "assistant": self.target.name() }).to_string()
    }
}

impl Debug for Handoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handoff")
            .field("target", &self.target.name())
            .field("tool_name", &self.tool_name)
            .field("input_filter", &self.input_filter)
            .finish_non_exhaustive()
    }
}

/// Derives the handoff tool name for an agent, e.g.
/// `maths assistant` becomes `transfer_to_maths_assistant`.
pub fn default_tool_name(agent_name: &str) -> String {
    let mut name = String::from("transfer_to_");
    for ch in agent_name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch.to_ascii_lowercase());
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use flash_agent_model::ModelMessage;
    use serde::Deserialize;

    use super::*;

    #[test]
    fn test_default_tool_name() {
        assert_eq!(
            default_tool_name("maths assistant"),
            "transfer_to_maths_assistant"
        );
        assert_eq!(
            default_tool_name("History Tutor"),
            "transfer_to_history_tutor"
        );
        assert_eq!(default_tool_name("a - b"), "transfer_to_a_b");
    }

    #[test]
    fn test_definition() {
        let target = AgentProfile::builder("history assistant")
            .with_handoff_description("Specialist for historical questions")
            .build();
        let handoff = Handoff::to(target);
        let tool = handoff.definition();
        assert_eq!(tool.name, "transfer_to_history_assistant");
        assert_eq!(
            tool.description,
            "Handoff to the history assistant agent to handle the request. \
             Specialist for historical questions"
        );
        assert_eq!(tool.parameters["type"], "object");
        assert_eq!(
            handoff.accepted_output(),
            r#"{"assistant":"history assistant"}"#
        );
    }

    #[derive(Deserialize)]
    struct Problem {
        user_question: String,
    }

    #[test]
    fn test_input_callback() {
        let seen = Arc::new(Mutex::new(vec![]));
        let handoff = Handoff::to(AgentProfile::builder("maths").build())
            .with_input::<Problem, _>(json!({ "type": "object" }), {
                let seen = Arc::clone(&seen);
                move |problem| {
                    seen.lock().unwrap().push(problem.user_question);
                }
            });

        handoff
            .invoke(json!({ "user_question": "2 + 2?", "topic": "sum" }))
            .unwrap();
        assert!(handoff.invoke(json!({ "topic": "sum" })).is_err());
        assert_eq!(*seen.lock().unwrap(), ["2 + 2?"]);
    }

    #[test]
    fn test_remove_all_tools() {
        let mut items = vec![
            Item::user("Solve 2x = 4".to_owned()),
            Item::assistant(
                ModelMessage::Assistant(String::new()),
                String::new(),
                "triage",
                true,
            ),
            Item::tool_result("call_0".to_owned(), "{}".to_owned()),
        ];
        HandoffInputFilter::RemoveAllTools.apply(&mut items);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].transcript(), "Solve 2x = 4");
    }
}
