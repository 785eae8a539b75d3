//! A browser chat in front of a [`Session`].
//!
//! The page is embedded in the binary. It talks to two JSON endpoints:
//! `GET /api/history` returns every [`ChatEntry`] so far and
//! `POST /api/chat` sends a [`ChatRequest`] and returns the reply entry.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

use crate::Session;

/// The first entry of every chat.
pub const INTRO_MESSAGE: &str = "Hello! I am an AI Agent. I can translate, \
                                 and perfrom Calculations. How can I help you?";

const INDEX_HTML: &str = include_str!("web/index.html");

/// One message of the chat.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatEntry {
    /// `user`, `assistant`, or the name of the agent that answered.
    pub role: String,
    /// The message text.
    pub content: String,
}

impl ChatEntry {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_owned(),
            content: content.to_owned(),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChatRequest {
    /// The user message.
    pub message: String,
}

/// Errors answered by the chat endpoints.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// The message was blank.
    #[error("message must not be empty")]
    EmptyMessage,
    /// The agent failed to answer.
    #[error("{0}")]
    Run(String),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match self {
            WebError::EmptyMessage => StatusCode::BAD_REQUEST,
            WebError::Run(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

struct ChatState {
    session: Session,
    history: Mutex<Vec<ChatEntry>>,
}

impl ChatState {
    fn new(session: Session) -> Self {
        Self {
            session,
            history: Mutex::new(vec![ChatEntry::new(
                "assistant",
                INTRO_MESSAGE,
            )]),
        }
    }

    fn history(&self) -> MutexGuard<'_, Vec<ChatEntry>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates the chat application for `session`.
pub fn router(session: Session) -> Router {
    let state = Arc::new(ChatState::new(session));
    Router::new()
        .route("/", get(index))
        .route("/api/history", get(history))
        .route("/api/chat", post(chat))
        .with_state(state)
}

/// Serves the chat on `addr` until the process exits.
pub async fn serve(addr: SocketAddr, session: Session) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("serving the chat on http://{}", listener.local_addr()?);
    axum::serve(listener, router(session)).await
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn history(State(state): State<Arc<ChatState>>) -> Json<Vec<ChatEntry>> {
    Json(state.history().clone())
}

async fn chat(
    State(state): State<Arc<ChatState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatEntry>, WebError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(WebError::EmptyMessage);
    }

    let reply = state.session.send_message(message).await.map_err(|err| {
        warn!("chat run failed: {err}");
        WebError::Run(state.session.describe_error(&err))
    })?;
    let entry = ChatEntry::new(
        reply.speaker().unwrap_or("assistant"),
        reply.text(),
    );

    // A failed run records neither entry.
    let mut history = state.history();
    history.push(ChatEntry::new("user", message));
    history.push(entry.clone());
    Ok(Json(entry))
}

#[cfg(test)]
mod tests {
    use flash_agent_model::ToolCallRequest;
    use flash_agent_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };
    use serde_json::json;

    use super::*;
    use crate::SessionBuilder;
    use crate::demos::Demo;

    fn chat_state(provider: TestModelProvider) -> Arc<ChatState> {
        let session = SessionBuilder::new(Demo::Triage, provider)
            .build()
            .unwrap();
        Arc::new(ChatState::new(session))
    }

    fn request(message: &str) -> Json<ChatRequest> {
        Json(ChatRequest {
            message: message.to_owned(),
        })
    }

    #[tokio::test]
    async fn test_history_starts_with_intro() {
        let state = chat_state(TestModelProvider::ordered());
        let Json(entries) = history(State(state)).await;
        assert_eq!(entries, [ChatEntry::new("assistant", INTRO_MESSAGE)]);
    }

    #[tokio::test]
    async fn test_chat_records_structured_reply() {
        let mut provider = TestModelProvider::ordered();
        provider.add_assistant_response_step(PresetResponse::with_events([
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_0".to_owned(),
                name: "transfer_to_translator_agent".to_owned(),
                arguments: json!({}),
            }),
        ]));
        provider.add_assistant_response_step(PresetResponse::text(
            json!({
                "response": "Bonjour",
                "agent_name": "Translator Agent",
            })
            .to_string(),
        ));
        let state = chat_state(provider);

        let Json(entry) = chat(State(state.clone()), request("Hello in French"))
            .await
            .unwrap();
        assert_eq!(entry, ChatEntry::new("Translator Agent", "Bonjour"));

        let Json(entries) = history(State(state)).await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1], ChatEntry::new("user", "Hello in French"));
        assert_eq!(entries[2], entry);
    }

    #[tokio::test]
    async fn test_chat_plain_reply() {
        let mut provider = TestModelProvider::ordered();
        provider.add_assistant_response_step(PresetResponse::text(
            "I can only perform calculations and translations",
        ));
        let state = chat_state(provider);

        let Json(entry) =
            chat(State(state), request("Sing a song")).await.unwrap();
        assert_eq!(entry.role, "assistant");
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_message() {
        let state = chat_state(TestModelProvider::ordered());
        let err = chat(State(state), request("   ")).await.unwrap_err();
        assert!(matches!(err, WebError::EmptyMessage));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_failure_leaves_history() {
        let mut provider = TestModelProvider::ordered();
        provider.add_assistant_response_step(
            PresetResponse::text("never").with_failures(0),
        );
        let state = chat_state(provider);

        let err = chat(State(state.clone()), request("2 + 2"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);

        let Json(entries) = history(State(state)).await;
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_index_page() {
        let Html(page) = index().await;
        assert!(page.contains("<title>Unit Conversion using AI</title>"));
    }
}
