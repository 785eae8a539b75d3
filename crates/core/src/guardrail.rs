//! Guardrails that validate the input and the final output of a run.
//!
//! A guardrail inspects a piece of text and reports whether its tripwire
//! fired. All guardrails of a stage run concurrently, and any tripwire ends
//! the run with a typed error.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use serde_json::Value;

use crate::run::RunError;

/// What a guardrail concluded about a piece of text.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GuardrailOutput {
    /// Whether the run must stop.
    pub tripwire_triggered: bool,
    /// Free-form details, surfaced through [`RunError`].
    pub info: Value,
}

impl GuardrailOutput {
    /// Lets the text through.
    #[inline]
    pub fn pass() -> Self {
        Self::default()
    }

    /// Stops the run.
    #[inline]
    pub fn tripwire(info: Value) -> Self {
        Self {
            tripwire_triggered: true,
            info,
        }
    }

    /// Attaches details without changing the verdict.
    #[inline]
    pub fn with_info(self, info: Value) -> Self {
        Self { info, ..self }
    }
}

/// A guardrail that could not decide.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct GuardrailError(String);

impl GuardrailError {
    /// Creates an error with the given message.
    #[inline]
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self(message.into())
    }
}

/// The result of a guardrail check.
pub type GuardrailResult = Result<GuardrailOutput, GuardrailError>;

/// Checks the user input before the model sees it.
pub trait InputGuardrail: Send + Sync + 'static {
    /// Returns the name reported when the guardrail trips.
    fn name(&self) -> &str;

    /// Checks the input.
    ///
    /// The returned future must not borrow `self` or `input`.
    fn check(
        &self,
        input: &str,
    ) -> impl Future<Output = GuardrailResult> + Send + 'static;
}

/// Checks the final reply before it is returned.
pub trait OutputGuardrail: Send + Sync + 'static {
    /// Returns the name reported when the guardrail trips.
    fn name(&self) -> &str;

    /// Checks the final output.
    ///
    /// The returned future must not borrow `self` or `output`.
    fn check(
        &self,
        output: &str,
    ) -> impl Future<Output = GuardrailResult> + Send + 'static;
}

type GuardrailFuture = Pin<Box<dyn Future<Output = GuardrailResult> + Send>>;

pub(crate) trait GuardrailObject: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn check(&self, text: &str) -> GuardrailFuture;
}

pub(crate) struct AnyInputGuardrail<G>(pub G);

impl<G: InputGuardrail> GuardrailObject for AnyInputGuardrail<G> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn check(&self, text: &str) -> GuardrailFuture {
        Box::pin(self.0.check(text))
    }
}

pub(crate) struct AnyOutputGuardrail<G>(pub G);

impl<G: OutputGuardrail> GuardrailObject for AnyOutputGuardrail<G> {
    #[inline]
    fn name(&self) -> &str {
        self.0.name()
    }

    #[inline]
    fn check(&self, text: &str) -> GuardrailFuture {
        Box::pin(self.0.check(text))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GuardrailStage {
    Input,
    Output,
}

/// Starts every guardrail on `text` and waits for all of them.
///
/// Verdicts are inspected in registration order, so the first registered
/// guardrail that trips is the one reported.
pub(crate) fn run_guardrails(
    guardrails: &[Arc<dyn GuardrailObject>],
    text: &str,
    stage: GuardrailStage,
) -> impl Future<Output = Result<(), RunError>> + Send + 'static {
    let checks: Vec<_> = guardrails
        .iter()
        .map(|guardrail| (guardrail.name().to_owned(), guardrail.check(text)))
        .collect();

    async move {
        let (names, futures): (Vec<_>, Vec<_>) = checks.into_iter().unzip();
        let results = join_all(futures).await;
        for (guardrail, result) in names.into_iter().zip(results) {
            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    warn!("guardrail `{guardrail}` failed: {err}");
                    return Err(RunError::Guardrail {
                        guardrail,
                        message: err.to_string(),
                    });
                }
            };
            if !output.tripwire_triggered {
                continue;
            }
            info!("{stage:?} guardrail `{guardrail}` triggered");
            let info = output.info;
            return Err(match stage {
                GuardrailStage::Input => {
                    RunError::InputGuardrailTriggered { guardrail, info }
                }
                GuardrailStage::Output => {
                    RunError::OutputGuardrailTriggered { guardrail, info }
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::future::ready;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    struct KeywordGuardrail {
        name: &'static str,
        keyword: &'static str,
        delay: Duration,
    }

    impl InputGuardrail for KeywordGuardrail {
        fn name(&self) -> &str {
            self.name
        }

        fn check(
            &self,
            input: &str,
        ) -> impl Future<Output = GuardrailResult> + Send + 'static {
            let tripped = input.contains(self.keyword);
            let keyword = self.keyword;
            let delay = self.delay;
            async move {
                tokio::time::sleep(delay).await;
                Ok(if tripped {
                    GuardrailOutput::tripwire(json!({ "keyword": keyword }))
                } else {
                    GuardrailOutput::pass()
                })
            }
        }
    }

    struct BrokenGuardrail;

    impl OutputGuardrail for BrokenGuardrail {
        fn name(&self) -> &str {
            "broken"
        }

        fn check(
            &self,
            _output: &str,
        ) -> impl Future<Output = GuardrailResult> + Send + 'static {
            ready(Err(GuardrailError::new("detector unreachable")))
        }
    }

    fn keyword(
        name: &'static str,
        keyword: &'static str,
        delay_ms: u64,
    ) -> Arc<dyn GuardrailObject> {
        Arc::new(AnyInputGuardrail(KeywordGuardrail {
            name,
            keyword,
            delay: Duration::from_millis(delay_ms),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_registered_tripwire_wins() {
        let guardrails = [
            keyword("slow", "solve", 50),
            keyword("fast", "x", 1),
        ];
        let err = run_guardrails(
            &guardrails,
            "solve for x: 2x + 3 = 11",
            GuardrailStage::Input,
        )
        .await
        .unwrap_err();
        match err {
            RunError::InputGuardrailTriggered { guardrail, info } => {
                assert_eq!(guardrail, "slow");
                assert_eq!(info["keyword"], "solve");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_pass() {
        let guardrails = [keyword("maths", "solve", 5)];
        run_guardrails(
            &guardrails,
            "Who was the first president of Pakistan?",
            GuardrailStage::Input,
        )
        .await
        .unwrap();
        run_guardrails(&[], "anything", GuardrailStage::Input)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let guardrails: [Arc<dyn GuardrailObject>; 1] =
            [Arc::new(AnyOutputGuardrail(BrokenGuardrail))];
        let err = run_guardrails(&guardrails, "42", GuardrailStage::Output)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Guardrail { ref guardrail, .. } if guardrail == "broken"
        ));
    }
}
