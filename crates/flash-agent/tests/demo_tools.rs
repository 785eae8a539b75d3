use flash_agent::{Demo, SessionBuilder};
use flash_agent_model::{ModelMessage, ToolCallRequest, ToolCallResult};
use flash_agent_test_model::{PresetEvent, PresetResponse, TestModelProvider};
use serde_json::{Value, json};

/// Scripts one tool call followed by a final answer.
fn tool_round(name: &str, arguments: Value, answer: &str) -> TestModelProvider {
    let mut provider = TestModelProvider::default();
    provider.add_user_input_step();
    provider.add_assistant_response_step(PresetResponse::with_events([
        PresetEvent::ToolCall(ToolCallRequest {
            id: "call_0".to_owned(),
            name: name.to_owned(),
            arguments,
        }),
    ]));
    provider.add_tool_result_steps(1);
    provider.add_assistant_response_step(PresetResponse::text(answer));
    provider
}

fn tool_result(provider: &TestModelProvider) -> String {
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    requests[1]
        .messages
        .iter()
        .find_map(|msg| match msg {
            ModelMessage::Tool(ToolCallResult { content, .. }) => {
                Some(content.clone())
            }
            _ => None,
        })
        .expect("no tool result was sent")
}

#[tokio::test]
async fn test_calculator_adds() {
    let provider = tool_round("add", json!({ "a": 2, "b": 3 }), "2 + 3 = 5");
    let session = SessionBuilder::new(Demo::Calculator, provider.clone())
        .build()
        .unwrap();

    let reply = session.send_message("What is 2 + 3?").await.unwrap();
    assert_eq!(reply.text(), "2 + 3 = 5");
    assert_eq!(tool_result(&provider), "5");

    let tools: Vec<_> = provider.requests()[0]
        .tools
        .iter()
        .map(|tool| tool.name.clone())
        .collect();
    assert_eq!(tools.len(), 4);
}

#[tokio::test]
async fn test_calculator_reports_division_by_zero() {
    let provider = tool_round(
        "divide",
        json!({ "a": 1, "b": 0 }),
        "Division by zero is undefined.",
    );
    let session = SessionBuilder::new(Demo::Calculator, provider.clone())
        .build()
        .unwrap();

    let reply = session.send_message("1 / 0").await.unwrap();
    assert_eq!(reply.text(), "Division by zero is undefined.");
    assert_eq!(tool_result(&provider), "Error: Division by zero");
}

#[tokio::test]
async fn test_context_tool_reads_local_user() {
    let provider = tool_round(
        "fetch_user_age",
        json!({}),
        "Rohaan is 47 years old.",
    );
    let session = SessionBuilder::new(Demo::Context, provider.clone())
        .build()
        .unwrap();

    let reply = session.send_message("How old am I?").await.unwrap();
    assert_eq!(reply.text(), "Rohaan is 47 years old.");
    assert_eq!(tool_result(&provider), "The user Rohaan is 47 years old");

    // The user data never reaches the model through the instructions.
    let requests = provider.requests();
    assert_eq!(
        requests[0].messages[0],
        ModelMessage::System("You are supportive agent".to_owned())
    );
}
