//! The catalogue of demo agents.
//!
//! Every demo is one root [`AgentProfile`] plus a few knobs: sampling
//! parameters, whether the conversation is kept across inputs, and what to
//! print when a guardrail trips.

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use flash_agent_core::{AgentProfile, Handoff, HandoffInputFilter};
use flash_agent_model::{ModelProvider, OutputSchema};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ModelSettings, WEATHER_API_KEY_VAR};
use crate::guardrails::MathsHomeworkGuardrail;
use crate::tools::{
    ArithmeticTool, FetchUserAgeTool, UserInfo, WeatherTool, schema_of,
};

const SUPPORTIVE_INSTRUCTIONS: &str = "You are supportive agent";

/// Input passed along with the handoffs of the `handoff` demo.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Problems {
    /// The question the user asked.
    pub user_question: String,
    /// The topic of the question.
    pub topic: String,
}

/// Structured reply of the agents behind the `triage` demo.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct AgentOutput {
    /// The answer shown to the user.
    pub response: String,
    /// The agent that answered.
    pub agent_name: String,
}

/// Callback invoked with the input of a `handoff` demo handoff.
pub type ProblemCallback = Arc<dyn Fn(&Problems) + Send + Sync>;

/// Runtime values some demos need.
#[derive(Clone)]
pub struct DemoOptions {
    /// The weatherapi.com key. Required by [`Demo::Weather`].
    pub weather_api_key: Option<String>,
    /// The user known to [`Demo::Context`].
    pub user: UserInfo,
    /// Observes the handoffs of [`Demo::Handoff`].
    pub on_problem: Option<ProblemCallback>,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            weather_api_key: None,
            user: UserInfo {
                name: "Rohaan".to_owned(),
                uid: 123,
            },
            on_problem: None,
        }
    }
}

impl fmt::Debug for DemoOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemoOptions")
            .field(
                "weather_api_key",
                &self.weather_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("user", &self.user)
            .field("on_problem", &self.on_problem.is_some())
            .finish()
    }
}

/// A runnable demo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Demo {
    /// A supportive general assistant.
    Assistant,
    /// A calculator using the arithmetic tools.
    Calculator,
    /// A calculator working from its instructions alone.
    CalculatorChat,
    /// Current weather lookups.
    Weather,
    /// A tool reading local user data.
    Context,
    /// An assistant remembering the conversation.
    History,
    /// A maths helper behind an input guardrail.
    Guardrail,
    /// A teaching triage agent handing off to subject assistants.
    Handoff,
    /// A triage agent routing to structured calculator and translator
    /// agents. The web chat runs this one.
    Triage,
}

impl Demo {
    /// All demos, in the order they are listed.
    pub const ALL: [Demo; 9] = [
        Demo::Assistant,
        Demo::Calculator,
        Demo::CalculatorChat,
        Demo::Weather,
        Demo::Context,
        Demo::History,
        Demo::Guardrail,
        Demo::Handoff,
        Demo::Triage,
    ];

    /// Returns the name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Demo::Assistant => "assistant",
            Demo::Calculator => "calculator",
            Demo::CalculatorChat => "calculator-chat",
            Demo::Weather => "weather",
            Demo::Context => "context",
            Demo::History => "history",
            Demo::Guardrail => "guardrail",
            Demo::Handoff => "handoff",
            Demo::Triage => "triage",
        }
    }

    /// Returns a one-line description.
    pub fn summary(self) -> &'static str {
        match self {
            Demo::Assistant => "a supportive assistant",
            Demo::Calculator => "a calculator with arithmetic tools",
            Demo::CalculatorChat => "a calculator without tools",
            Demo::Weather => {
                "current weather of any city, needs WEATHER_API_KEY"
            }
            Demo::Context => "answers from local user data",
            Demo::History => "an assistant that remembers the conversation",
            Demo::Guardrail => "a maths helper refusing other topics",
            Demo::Handoff => "a teaching assistant routing to subject experts",
            Demo::Triage => "routes to calculator and translator agents",
        }
    }

    /// Returns the sampling parameters of the demo.
    pub fn model_settings(self) -> ModelSettings {
        match self {
            Demo::Assistant => ModelSettings {
                temperature: Some(0.0),
                top_p: None,
            },
            Demo::Weather => ModelSettings {
                temperature: Some(0.7),
                top_p: Some(0.7),
            },
            _ => ModelSettings::default(),
        }
    }

    /// Returns `true` if the demo keeps the conversation across inputs.
    #[inline]
    pub fn retains_history(self) -> bool {
        matches!(self, Demo::History)
    }

    /// Returns the reply shown when an input guardrail trips.
    pub fn tripwire_message(self) -> Option<&'static str> {
        match self {
            Demo::Guardrail => Some("You can only ask Maths related Queries!"),
            _ => None,
        }
    }

    /// Builds the root profile of the demo.
    ///
    /// `provider` backs the agents the demo needs besides the one being
    /// built, e.g. the detector behind a guardrail. Must be called within a
    /// tokio runtime.
    pub fn build_profile<P>(
        self,
        provider: &P,
        options: &DemoOptions,
    ) -> Result<AgentProfile, ConfigError>
    where
        P: ModelProvider + Clone + 'static,
    {
        let profile = match self {
            Demo::Assistant => supportive_agent(),
            Demo::Calculator => calculator_agent(),
            Demo::CalculatorChat => calculator_chat_agent(),
            Demo::Weather => {
                let api_key = options
                    .weather_api_key
                    .as_deref()
                    .ok_or(ConfigError::MissingVar(WEATHER_API_KEY_VAR))?;
                weather_agent(WeatherTool::new(api_key))
            }
            Demo::Context => context_agent(options.user.clone()),
            Demo::History => history_agent(),
            Demo::Guardrail => maths_helper_agent(
                MathsHomeworkGuardrail::new(provider.clone()),
            ),
            Demo::Handoff => teaching_triage_agent(options.on_problem.clone()),
            Demo::Triage => unit_triage_agent(),
        };
        Ok(profile)
    }
}

impl Display for Demo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown demo name.
#[derive(Clone, Debug, thiserror::Error)]
#[error("unknown demo `{0}`, run `flash-agent list` to see all demos")]
pub struct UnknownDemo(String);

impl FromStr for Demo {
    type Err = UnknownDemo;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Demo::ALL
            .into_iter()
            .find(|demo| demo.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownDemo(name.to_owned()))
    }
}

/// A supportive general assistant.
pub fn supportive_agent() -> AgentProfile {
    AgentProfile::builder("Agent")
        .with_instructions(SUPPORTIVE_INSTRUCTIONS)
        .build()
}

/// A calculator agent with the four arithmetic tools.
pub fn calculator_agent() -> AgentProfile {
    let mut builder = AgentProfile::builder("Calculator Agent")
        .with_instructions(
            "You are a calculator Agent. You can only perform calculations \
             and if user asks anything else tell user that you cannot do \
             anything else.",
        );
    for tool in ArithmeticTool::all() {
        builder = builder.with_tool(tool);
    }
    builder.build()
}

/// A calculator agent without tools.
pub fn calculator_chat_agent() -> AgentProfile {
    AgentProfile::builder("Calculator Agent")
        .with_instructions(
            "You are a calculator Ai agent you can only do calculations. If \
             anything else is told just tell the user you can't do anything \
             but calculations.",
        )
        .build()
}

/// A weather agent. Retrying failed lookups is left to the model.
pub fn weather_agent(tool: WeatherTool) -> AgentProfile {
    AgentProfile::builder("Weather Agent")
        .with_instructions(
            "You are weather agent. If API fails to fetch weather, try again \
             3 more times calling the same tool.",
        )
        .with_tool(tool)
        .build()
}

/// A supportive agent that can look up the age of `user`.
pub fn context_agent(user: UserInfo) -> AgentProfile {
    AgentProfile::builder("Agent")
        .with_instructions(SUPPORTIVE_INSTRUCTIONS)
        .with_tool(FetchUserAgeTool::new(user))
        .build()
}

/// A concise assistant, meant to run with history.
pub fn history_agent() -> AgentProfile {
    AgentProfile::builder("Assistant")
        .with_instructions(
            "Help user in solving their queries. Be concise and precise.",
        )
        .build()
}

/// A maths helper guarded by `guardrail`.
pub fn maths_helper_agent(guardrail: MathsHomeworkGuardrail) -> AgentProfile {
    AgentProfile::builder("Maths Helper Agent")
        .with_instructions("Answer maths query")
        .with_input_guardrail(guardrail)
        .build()
}

/// A teaching assistant handing off to the maths and history assistants.
///
/// Both handoffs carry a [`Problems`] input, reported to `on_problem`. The
/// maths assistant sees the history without tool traffic.
pub fn teaching_triage_agent(
    on_problem: Option<ProblemCallback>,
) -> AgentProfile {
    let maths = AgentProfile::builder("maths assistant")
        .with_instructions(
            "You are a maths assistant you only solve mathematic problems.",
        )
        .with_handoff_description(
            "This agent only answers maths related queries",
        )
        .build();
    let history = AgentProfile::builder("history assistant")
        .with_instructions(
            "You are a history assistant you only tell about history.",
        )
        .with_handoff_description("This agent only answers historical queries")
        .build();

    let problem_handoff = |target: AgentProfile| {
        let on_problem = on_problem.clone();
        Handoff::to(target).with_input::<Problems, _>(
            schema_of::<Problems>(),
            move |problem| {
                info!(
                    "handing off `{}` on {}",
                    problem.user_question, problem.topic
                );
                if let Some(on_problem) = &on_problem {
                    on_problem(&problem);
                }
            },
        )
    };

    AgentProfile::builder("triage agent")
        .with_instructions(
            "You are a teaching assistant. You handoff user request to \
             corresponding agent if present. If such agent is not present to \
             handoff, you simply tell user what queries you can answer.",
        )
        .with_handoff(
            problem_handoff(maths)
                .with_input_filter(HandoffInputFilter::RemoveAllTools),
        )
        .with_handoff(problem_handoff(history))
        .build()
}

/// A triage agent routing to calculator and translator agents, both
/// replying with an [`AgentOutput`].
pub fn unit_triage_agent() -> AgentProfile {
    let calculator = AgentProfile::builder("Calculator Agent")
        .with_instructions(
            "You are a calculator AI agent you can only do calculations. If \
             anything else is told just tell the user you can't do anything \
             but calculations.",
        )
        .with_output_schema(agent_output_schema())
        .build();
    let translator = AgentProfile::builder("Translator Agent")
        .with_instructions(
            "You are a translator AI agent you can only do translations. If \
             anything else is told just tell the user you can't do anything \
             but translations.",
        )
        .with_output_schema(agent_output_schema())
        .build();

    AgentProfile::builder("Triage Agent")
        .with_instructions(
            "You are a triage Agent. You can only transfer request to other \
             agents. And you cannot answer directly. If no agent is present \
             to handle a request tell the user that you can \"only perform \
             calculations and translations\". Do not tell user that you are \
             a triage agent and you can transfer, just handoff to agent or \
             tell \"I can only perform calculations and translations\" as \
             per required situation.",
        )
        .with_handoff(Handoff::to(calculator))
        .with_handoff(Handoff::to(translator))
        .build()
}

fn agent_output_schema() -> OutputSchema {
    OutputSchema::new("AgentOutput", schema_of::<AgentOutput>())
}
