//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/ask`                — Ask a question, get the answer as a plain-text stream
//! - `GET  /v1/conversations/{id}` — Stored turns for a conversation

use std::convert::Infallible;

use axum::{
    Router,
    body::Body,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use clinq_agent::{AnswerStyle, AskRequest, ProfileHints};
use clinq_core::error::{Error, ProviderError};
use clinq_core::message::{ConversationId, Message};

use crate::{CONVERSATION_ID_HEADER, SharedState};

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> axum::Router {
    Router::new()
        .route("/ask", post(ask_handler))
        .route("/conversations/{id}", get(get_conversation_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskBody {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub profile: ProfileHints,
    #[serde(default)]
    pub answer_style: AnswerStyle,
    /// Omit to start a new conversation.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Persistence and memory updates are opt-in.
    #[serde(default)]
    pub save_to_history: bool,
}

impl From<AskBody> for AskRequest {
    fn from(body: AskBody) -> Self {
        Self {
            messages: body.messages,
            profile: body.profile,
            answer_style: body.answer_style,
            conversation_id: body
                .conversation_id
                .filter(|id| !id.trim().is_empty())
                .map(ConversationId),
            save_to_history: body.save_to_history,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnDto {
    pub question: String,
    pub answer: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: String,
    pub turns: Vec<TurnDto>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Status for a failure that happens before any byte is streamed.
fn error_status(e: &Error) -> StatusCode {
    match e {
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::Provider(ProviderError::NotConfigured(_)) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Provider(ProviderError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
        Error::Provider(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(e: Error) -> ApiError {
    let status = error_status(&e);
    if status.is_server_error() {
        error!(error = %e, "Request failed before streaming");
    } else {
        warn!(error = %e, "Request rejected");
    }
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Malformed, oversized or mistyped bodies still answer with a JSON error.
fn rejection_error(rejection: JsonRejection) -> ApiError {
    let status = rejection.status();
    warn!(status = %status, error = %rejection.body_text(), "Request body rejected");
    (
        status,
        Json(ErrorResponse {
            error: rejection.body_text(),
        }),
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn ask_handler(
    State(state): State<SharedState>,
    payload: Result<Json<AskBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(rejection_error)?;
    info!(
        messages = body.messages.len(),
        style = ?body.answer_style,
        save = body.save_to_history,
        "v1/ask request"
    );

    let handle = state.pipeline.ask(body.into()).await.map_err(api_error)?;

    // Background work is detached; the body stream drives it.
    let stream = handle.body.map(Ok::<_, Infallible>);
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&handle.conversation_id.0) {
        response.headers_mut().insert(CONVERSATION_ID_HEADER, value);
    }
    Ok(response)
}

async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationResponse>, ApiError> {
    let turns = state
        .history
        .turns(&ConversationId(id.clone()))
        .await
        .map_err(|e| api_error(e.into()))?;

    if turns.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("conversation {id} not found"),
            }),
        ));
    }

    Ok(Json(ConversationResponse {
        id,
        turns: turns
            .into_iter()
            .map(|t| TurnDto {
                question: t.question,
                answer: t.answer,
                created_at: t.created_at.to_rfc3339(),
            })
            .collect(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────
