//! Guardrails used by the demo agents.

use flash_agent_core::guardrail::{
    GuardrailError, GuardrailOutput, GuardrailResult, InputGuardrail,
};
use flash_agent_core::{Agent, AgentBuilder, AgentProfile};
use flash_agent_model::{ModelProvider, OutputSchema};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::schema_of;

/// The verdict of the maths detector agent.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MathsQueryDetectorOutput {
    /// Whether the query has nothing to do with maths.
    pub is_not_maths_query: bool,
    /// Why the detector decided so.
    pub explanation: String,
}

/// Trips on queries that are not about maths.
///
/// The check is delegated to a dedicated detector agent with a structured
/// output, so every check costs one model request.
pub struct MathsHomeworkGuardrail {
    detector: Agent,
}

impl MathsHomeworkGuardrail {
    /// Name reported when the guardrail trips.
    pub const NAME: &'static str = "not_maths_homework_detection";

    /// Creates the guardrail, spawning its detector agent on `provider`.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        let detector = AgentBuilder::with_model_provider(provider)
            .with_profile(detector_profile())
            .build();
        Self { detector }
    }
}

fn detector_profile() -> AgentProfile {
    AgentProfile::builder("Math Detector")
        .with_instructions(
            "Check if the user query is related to maths or not.",
        )
        .with_output_schema(OutputSchema::new(
            "MathsQueryDetectorOutput",
            schema_of::<MathsQueryDetectorOutput>(),
        ))
        .build()
}

impl InputGuardrail for MathsHomeworkGuardrail {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn check(
        &self,
        input: &str,
    ) -> impl Future<Output = GuardrailResult> + Send + 'static {
        let run = self.detector.run(input);
        async move {
            let output = run.await.map_err(|err| {
                GuardrailError::new(format!("maths detector failed: {err}"))
            })?;
            let verdict: MathsQueryDetectorOutput =
                output.parse().map_err(|err| {
                    GuardrailError::new(format!(
                        "unexpected maths detector reply: {err}"
                    ))
                })?;
            debug!("maths detector verdict: {verdict:?}");

            let info = serde_json::to_value(&verdict).unwrap_or_default();
            Ok(if verdict.is_not_maths_query {
                GuardrailOutput::tripwire(info)
            } else {
                GuardrailOutput::pass().with_info(info)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use flash_agent_model::ModelMessage;
    use flash_agent_test_model::{PresetResponse, TestModelProvider};

    use super::*;

    fn detector_reply(is_not_maths_query: bool) -> PresetResponse {
        let verdict = MathsQueryDetectorOutput {
            is_not_maths_query,
            explanation: "checked".to_owned(),
        };
        PresetResponse::text(serde_json::to_string(&verdict).unwrap())
    }

    #[tokio::test]
    async fn test_trips_on_other_topics() {
        let mut provider = TestModelProvider::ordered();
        provider.add_assistant_response_step(detector_reply(true));
        let guardrail = MathsHomeworkGuardrail::new(provider.clone());

        let output = guardrail.check("Who won the 1992 World Cup?").await;
        let output = output.unwrap();
        assert!(output.tripwire_triggered);
        assert_eq!(output.info["explanation"], "checked");

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].output_schema.as_ref().unwrap().name,
            "MathsQueryDetectorOutput"
        );
        assert!(requests[0].messages.contains(&ModelMessage::User(
            "Who won the 1992 World Cup?".to_owned()
        )));
    }

    #[tokio::test]
    async fn test_passes_maths_queries() {
        let mut provider = TestModelProvider::ordered();
        provider.add_assistant_response_step(detector_reply(false));
        let guardrail = MathsHomeworkGuardrail::new(provider);

        let output = guardrail.check("Solve 2x + 3 = 7").await.unwrap();
        assert!(!output.tripwire_triggered);
        assert_eq!(output.info["is_not_maths_query"], false);
    }

    #[tokio::test]
    async fn test_unparsable_verdict() {
        let mut provider = TestModelProvider::ordered();
        provider.add_assistant_response_step(PresetResponse::text("maybe?"));
        let guardrail = MathsHomeworkGuardrail::new(provider);

        let err = guardrail.check("Solve 2x + 3 = 7").await.unwrap_err();
        assert!(err.to_string().starts_with("unexpected maths detector reply"));
    }
}
