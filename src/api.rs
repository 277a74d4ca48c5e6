use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced by the assistant backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Status { status: StatusCode, message: String },
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Deserialize)]
struct NewSessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct ClearSessionRequest<'a> {
    session_id: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the assistant backend. Cheap to clone; spawned tasks
/// take their own copy.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask the backend for a fresh session token.
    pub async fn new_session(&self) -> Result<String, ApiError> {
        let url = format!("{}/api/new_session", self.base_url);

        let response = self.client.post(&url).send().await?;
        let response = Self::check_status(response).await?;

        let body: NewSessionResponse = response.json().await?;
        Ok(body.session_id)
    }

    /// Send one user message and wait for the full reply. No client-side
    /// timeout: tool-heavy questions can take minutes on the server.
    pub async fn chat(&self, message: &str, session_id: Option<&str>) -> Result<String, ApiError> {
        let url = format!("{}/api/chat", self.base_url);

        let request = ChatRequest {
            message,
            session_id,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let response = Self::check_status(response).await?;

        let body: ChatResponse = response.json().await?;
        Ok(body.response)
    }

    /// Drop a session's history on the server. Best-effort: callers log
    /// failures and move on.
    pub async fn clear_session(&self, session_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/api/clear_session", self.base_url);

        let request = ClearSessionRequest { session_id };

        let response = self.client.post(&url).json(&request).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Turn non-2xx replies into `ApiError::Status`, pulling the detail out
    /// of the backend's `{"error": ...}` body when it parses.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        Err(ApiError::Status { status, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Option<Value>>>;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn capture_chat(State(captured): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        *captured.lock().unwrap() = Some(body);
        Json(json!({"response": "**Hello!**", "session_id": "s-1"}))
    }

    #[tokio::test]
    async fn test_new_session_returns_token() {
        let router = Router::new().route(
            "/api/new_session",
            post(|| async { Json(json!({"session_id": "abc-123"})) }),
        );
        let base = serve(router).await;

        let client = ApiClient::new(&base);
        let token = client.new_session().await.unwrap();
        assert_eq!(token, "abc-123");
    }

    #[tokio::test]
    async fn test_chat_sends_message_and_session_id() {
        let captured: Captured = Arc::new(Mutex::new(None));
        let router = Router::new()
            .route("/api/chat", post(capture_chat))
            .with_state(captured.clone());
        let base = serve(router).await;

        let client = ApiClient::new(&base);
        let reply = client.chat("what does GRIN2B do?", Some("s-1")).await.unwrap();
        assert_eq!(reply, "**Hello!**");

        let body = captured.lock().unwrap().take().unwrap();
        assert_eq!(body["message"], "what does GRIN2B do?");
        assert_eq!(body["session_id"], "s-1");
    }

    #[tokio::test]
    async fn test_chat_omits_session_id_when_absent() {
        let captured: Captured = Arc::new(Mutex::new(None));
        let router = Router::new()
            .route("/api/chat", post(capture_chat))
            .with_state(captured.clone());
        let base = serve(router).await;

        let client = ApiClient::new(&base);
        client.chat("hi", None).await.unwrap();

        let body = captured.lock().unwrap().take().unwrap();
        assert!(body.get("session_id").is_none());
    }

    #[tokio::test]
    async fn test_error_body_detail_is_surfaced() {
        let router = Router::new().route(
            "/api/chat",
            post(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "model overloaded"})),
                )
            }),
        );
        let base = serve(router).await;

        let client = ApiClient::new(&base);
        let err = client.chat("hi", None).await.unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(message, "model overloaded");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_server_is_a_transport_error() {
        let client = ApiClient::new("http://127.0.0.1:1");
        let err = client.new_session().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn test_clear_session_posts_token() {
        let captured: Captured = Arc::new(Mutex::new(None));
        let router = Router::new()
            .route(
                "/api/clear_session",
                post(
                    |State(captured): State<Captured>, Json(body): Json<Value>| async move {
                        *captured.lock().unwrap() = Some(body);
                        Json(json!({"status": "cleared"}))
                    },
                ),
            )
            .with_state(captured.clone());
        let base = serve(router).await;

        let client = ApiClient::new(&base);
        client.clear_session("s-9").await.unwrap();

        let body = captured.lock().unwrap().take().unwrap();
        assert_eq!(body["session_id"], "s-9");
    }
}
