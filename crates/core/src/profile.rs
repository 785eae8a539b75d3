//! Agent profiles: who the agent is and what it may do.

use std::fmt::{self, Debug};
use std::sync::Arc;

use flash_agent_model::{ModelTool, OutputSchema};

use crate::guardrail::{
    AnyInputGuardrail, AnyOutputGuardrail, GuardrailObject, InputGuardrail,
    OutputGuardrail,
};
use crate::handoff::Handoff;
use crate::tool::{AnyTool, Executor, Tool};

/// The static description of an agent.
///
/// A profile is immutable once built. Share it with [`Arc`] to use it as
/// the target of several handoffs.
pub struct AgentProfile {
    name: String,
    instructions: String,
    handoff_description: Option<String>,
    tools: Executor,
    handoffs: Vec<Handoff>,
    pub(crate) input_guardrails: Vec<Arc<dyn GuardrailObject>>,
    pub(crate) output_guardrails: Vec<Arc<dyn GuardrailObject>>,
    output_schema: Option<OutputSchema>,
}

impl AgentProfile {
    /// Starts building a profile with the given name.
    #[inline]
    pub fn builder<S: Into<String>>(name: S) -> AgentProfileBuilder {
        AgentProfileBuilder {
            name: name.into(),
            instructions: String::new(),
            handoff_description: None,
            tools: Executor::default(),
            handoffs: vec![],
            input_guardrails: vec![],
            output_guardrails: vec![],
            output_schema: None,
        }
    }

    /// Returns the name of the agent.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the system instructions.
    #[inline]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Returns the description shown to agents that can hand off to this
    /// one.
    #[inline]
    pub fn handoff_description(&self) -> Option<&str> {
        self.handoff_description.as_deref()
    }

    /// Returns the handoffs this agent may perform.
    #[inline]
    pub fn handoffs(&self) -> &[Handoff] {
        &self.handoffs
    }

    /// Returns the schema the final reply must follow, if any.
    #[inline]
    pub fn output_schema(&self) -> Option<&OutputSchema> {
        self.output_schema.as_ref()
    }

    /// Returns the names of the function tools, handoffs excluded.
    #[inline]
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tools.names()
    }

    #[inline]
    pub(crate) fn tools(&self) -> &Executor {
        &self.tools
    }

    /// Tool definitions sent to the model: function tools, then handoffs.
    pub(crate) fn tool_definitions(&self) -> Vec<ModelTool> {
        self.tools
            .definitions()
            .chain(self.handoffs.iter().map(Handoff::definition))
            .collect()
    }

    pub(crate) fn find_handoff(&self, tool_name: &str) -> Option<&Handoff> {
        self.handoffs.iter().find(|h| h.tool_name() == tool_name)
    }
}

impl Debug for AgentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentProfile")
            .field("name", &self.name)
            .field("tools", &self.tools.names().collect::<Vec<_>>())
            .field("handoffs", &self.handoffs)
            .finish_non_exhaustive()
    }
}

/// [`AgentProfile`] builder.
pub struct AgentProfileBuilder {
    name: String,
    instructions: String,
    handoff_description: Option<String>,
    tools: Executor,
    handoffs: Vec<Handoff>,
    input_guardrails: Vec<Arc<dyn GuardrailObject>>,
    output_guardrails: Vec<Arc<dyn GuardrailObject>>,
    output_schema: Option<OutputSchema>,
}

impl AgentProfileBuilder {
    /// Sets the system instructions.
    #[inline]
    pub fn with_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Sets the description used by handoff tools targeting this agent.
    #[inline]
    pub fn with_handoff_description<S: Into<String>>(
        mut self,
        description: S,
    ) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    /// Registers a tool. A tool with the same name replaces the old one.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.add(Arc::new(AnyTool(tool)));
        self
    }

    /// Registers a handoff.
    #[inline]
    pub fn with_handoff(mut self, handoff: Handoff) -> Self {
        self.handoffs.push(handoff);
        self
    }

    /// Registers an input guardrail.
    #[inline]
    pub fn with_input_guardrail<G: InputGuardrail>(mut self, guardrail: G) -> Self {
        self.input_guardrails
            .push(Arc::new(AnyInputGuardrail(guardrail)));
        self
    }

    /// Registers an output guardrail.
    #[inline]
    pub fn with_output_guardrail<G: OutputGuardrail>(
        mut self,
        guardrail: G,
    ) -> Self {
        self.output_guardrails
            .push(Arc::new(AnyOutputGuardrail(guardrail)));
        self
    }

    /// Asks the model to reply with JSON matching `schema`.
    #[inline]
    pub fn with_output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Builds the profile.
    pub fn build(self) -> AgentProfile {
        for handoff in &self.handoffs {
            if self.tools.names().any(|name| name == handoff.tool_name()) {
                warn!(
                    "handoff `{}` of agent `{}` shadows a tool with the same name",
                    handoff.tool_name(),
                    self.name
                );
            }
        }
        AgentProfile {
            name: self.name,
            instructions: self.instructions,
            handoff_description: self.handoff_description,
            tools: self.tools,
            handoffs: self.handoffs,
            input_guardrails: self.input_guardrails,
            output_guardrails: self.output_guardrails,
            output_schema: self.output_schema,
        }
    }
}

impl From<AgentProfileBuilder> for AgentProfile {
    #[inline]
    fn from(builder: AgentProfileBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;

    use serde_json::{Value, json};

    use super::*;
    use crate::tool::ToolResult;

    struct NamedTool(&'static str, Value);

    impl Tool for NamedTool {
        type Input = Value;

        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test"
        }

        fn parameter_schema(&self) -> &Value {
            &self.1
        }

        fn execute(
            &self,
            _input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(String::new()))
        }
    }

    #[test]
    fn test_tool_definitions_order() {
        let history = Arc::new(AgentProfile::builder("history assistant").build());
        let profile = AgentProfile::builder("triage")
            .with_instructions("Route the question.")
            .with_tool(NamedTool("add", json!({})))
            .with_tool(NamedTool("subtract", json!({})))
            .with_handoff(Handoff::to(Arc::clone(&history)))
            .with_tool(NamedTool("add", json!({ "type": "object" })))
            .build();

        let names: Vec<_> = profile
            .tool_definitions()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, ["add", "subtract", "transfer_to_history_assistant"]);
        assert_eq!(profile.tool_definitions()[0].parameters["type"], "object");
        assert!(profile.find_handoff("transfer_to_history_assistant").is_some());
        assert!(profile.find_handoff("add").is_none());
        assert_eq!(profile.instructions(), "Route the question.");
    }
}
