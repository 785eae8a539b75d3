//! Results of a single agent run.

use flash_agent_model::ErrorKind as ModelErrorKind;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutput {
    pub(crate) agent_name: String,
    pub(crate) final_output: String,
}

impl RunOutput {
    /// Returns the name of the agent that produced the final output.
    ///
    /// This differs from the root agent when the run was handed off.
    #[inline]
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Returns the text of the final reply.
    #[inline]
    pub fn final_output(&self) -> &str {
        &self.final_output
    }

    /// Consumes the output, returning the text of the final reply.
    #[inline]
    pub fn into_final_output(self) -> String {
        self.final_output
    }

    /// Parses the final reply as JSON.
    ///
    /// Models occasionally wrap structured replies in a Markdown code
    /// fence, which is stripped first.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(strip_code_fence(&self.final_output))
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    match rest.find('\n') {
        // Drops the language tag, e.g. ```json.
        Some(idx) => rest[idx + 1..].trim(),
        None => rest.trim(),
    }
}

/// Errors that end a run.
#[derive(Clone, Debug, thiserror::Error)]
pub enum RunError {
    /// An input guardrail tripped. The model was never called.
    #[error("input guardrail `{guardrail}` triggered")]
    InputGuardrailTriggered {
        /// Name of the guardrail.
        guardrail: String,
        /// What the guardrail reported.
        info: Value,
    },
    /// An output guardrail tripped on the final reply.
    #[error("output guardrail `{guardrail}` triggered")]
    OutputGuardrailTriggered {
        /// Name of the guardrail.
        guardrail: String,
        /// What the guardrail reported.
        info: Value,
    },
    /// A guardrail failed to reach a decision.
    #[error("guardrail `{guardrail}` failed: {message}")]
    Guardrail {
        /// Name of the guardrail.
        guardrail: String,
        /// Why it failed.
        message: String,
    },
    /// The model request failed, after retries for transient errors.
    #[error("model request failed: {message}")]
    Model {
        /// The kind reported by the provider.
        kind: ModelErrorKind,
        /// The provider's error message.
        message: String,
    },
    /// The model kept calling tools past the turn limit.
    #[error("exceeded the limit of {0} model turns")]
    MaxTurnsExceeded(usize),
    /// The agent stopped before the run finished.
    #[error("the agent is no longer running")]
    AgentUnavailable,
}

impl RunError {
    /// Returns `true` if a guardrail tripwire ended the run.
    #[inline]
    pub fn is_tripwire(&self) -> bool {
        matches!(
            self,
            RunError::InputGuardrailTriggered { .. }
                | RunError::OutputGuardrailTriggered { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        is_maths_homework: bool,
        reasoning: String,
    }

    fn output(text: &str) -> RunOutput {
        RunOutput {
            agent_name: "Guardrail check".to_owned(),
            final_output: text.to_owned(),
        }
    }

    #[test]
    fn test_parse_plain_json() {
        let verdict: Verdict = output(
            r#"{"is_maths_homework": true, "reasoning": "asks for x"}"#,
        )
        .parse()
        .unwrap();
        assert!(verdict.is_maths_homework);
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"is_maths_homework\": false, \"reasoning\": \"history\"}\n```";
        let verdict: Verdict = output(text).parse().unwrap();
        assert_eq!(
            verdict,
            Verdict {
                is_maths_homework: false,
                reasoning: "history".to_owned(),
            }
        );

        let verdict: Verdict = output(
            "```{\"is_maths_homework\": true, \"reasoning\": \"\"}```",
        )
        .parse()
        .unwrap();
        assert!(verdict.is_maths_homework);
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(output("Sure! Here it is.").parse::<Verdict>().is_err());
    }
}
