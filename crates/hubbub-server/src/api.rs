//! REST endpoints: history, posting a message, and the dev reset.

use crate::handlers::AppState;
use crate::metrics;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hubbub_core::{clock, ChatMessage};
use hubbub_protocol::ServerFrame;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// Errors returned by the REST handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// `user_id` or `text` missing or blank.
    #[error("user_id and text are required")]
    MissingFields,

    /// The body was not JSON.
    #[error("Invalid JSON body: {0}")]
    InvalidBody(String),

    /// Anything that is not the caller's fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
            metrics::record_error("api");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody(rejection.body_text())
    }
}

/// Body of `GET /history/{user_id}`.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub messages: Vec<ChatMessage>,
}

/// Body of a successful `POST /message`.
#[derive(Debug, Serialize)]
pub struct PostMessageResponse {
    pub ok: bool,
    pub message: ChatMessage,
}

/// Body of `POST /__dev__/reset`.
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub ok: bool,
    pub reset_at: String,
}

/// A validated `POST /message` request.
#[derive(Debug, PartialEq, Eq)]
struct NewMessage {
    user_id: String,
    role: String,
    text: String,
}

/// Read a body field as trimmed text. Non-string scalars are stringified.
fn field_text(body: &Value, key: &str) -> String {
    match body.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string().trim().to_string(),
    }
}

impl NewMessage {
    fn from_body(body: &Value) -> Result<Self, ApiError> {
        let user_id = field_text(body, "user_id");
        let text = field_text(body, "text");
        if user_id.is_empty() || text.is_empty() {
            return Err(ApiError::MissingFields);
        }

        let role = match field_text(body, "role") {
            role if role.is_empty() => "user".to_string(),
            role => role,
        };

        Ok(Self {
            user_id,
            role,
            text,
        })
    }
}

/// `GET /history/{user_id}`
pub async fn history_handler(
    Path(user_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<HistoryResponse> {
    let messages = state.store.history(&user_id);
    debug!(user = %user_id, count = messages.len(), "History read");
    Json(HistoryResponse { user_id, messages })
}

/// `POST /message`
pub async fn post_message_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PostMessageResponse>, ApiError> {
    let Json(body) = body?;
    let new = NewMessage::from_body(&body)?;

    let message = ChatMessage::new(new.user_id, new.role, new.text);
    state
        .store
        .append(&message.user_id, message.clone())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    metrics::set_history_users(state.store.user_count());

    // History and fan-out are separate steps; a failure between them is tolerated.
    let data = serde_json::to_value(&message).map_err(|e| ApiError::Internal(e.to_string()))?;
    let recipients = state
        .hub
        .broadcast_to_user(&message.user_id, &ServerFrame::message(data))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    metrics::record_broadcast("user", recipients);

    debug!(user = %message.user_id, id = %message.id, recipients, "Message posted");
    Ok(Json(PostMessageResponse { ok: true, message }))
}

/// `POST /__dev__/reset`
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> Json<ResetResponse> {
    state.store.reset();
    metrics::set_history_users(0);
    info!("Message history reset");
    Json(ResetResponse {
        ok: true,
        reset_at: clock::utc_now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_defaults_role() {
        let new = NewMessage::from_body(&json!({"user_id": " alice ", "text": " hi "})).unwrap();
        assert_eq!(
            new,
            NewMessage {
                user_id: "alice".into(),
                role: "user".into(),
                text: "hi".into(),
            }
        );

        let new =
            NewMessage::from_body(&json!({"user_id": "a", "text": "t", "role": "assistant"}))
                .unwrap();
        assert_eq!(new.role, "assistant");

        let new = NewMessage::from_body(&json!({"user_id": "a", "text": "t", "role": null}))
            .unwrap();
        assert_eq!(new.role, "user");
    }

    #[test]
    fn test_new_message_requires_fields() {
        for body in [
            json!({}),
            json!({"user_id": "alice"}),
            json!({"text": "hi"}),
            json!({"user_id": "   ", "text": "hi"}),
            json!({"user_id": "alice", "text": "\n\t"}),
            json!({"user_id": null, "text": "hi"}),
            json!(["alice", "hi"]),
        ] {
            assert!(matches!(
                NewMessage::from_body(&body),
                Err(ApiError::MissingFields)
            ));
        }
    }

    #[test]
    fn test_non_string_fields_are_stringified() {
        let new = NewMessage::from_body(&json!({"user_id": 42, "text": true})).unwrap();
        assert_eq!(new.user_id, "42");
        assert_eq!(new.text, "true");
    }

    #[test]
    fn test_api_error_status() {
        assert_eq!(ApiError::MissingFields.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::MissingFields.to_string(),
            "user_id and text are required"
        );
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
