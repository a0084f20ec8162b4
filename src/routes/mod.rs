//! API routes
//!
//! The HTTP surface a chat front-end renders from. Every session endpoint
//! answers with a [`SessionSnapshot`] so the page can redraw the whole
//! transcript after each call.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Persona;
use crate::core::{SessionError, SessionSnapshot};
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    sessions: usize,
}

#[derive(Debug, Serialize)]
struct PersonaInfo {
    id: &'static str,
    description: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub persona: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SelectPersonaRequest {
    pub persona: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Errors surfaced to the front-end
#[derive(Debug)]
pub enum ApiError {
    SessionNotFound(Uuid),
    Session(SessionError),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::Session(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::SessionNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Session not found: {id}"))
            }
            ApiError::Session(
                err @ (SessionError::Busy | SessionError::AwaitingAcknowledgement),
            ) => (StatusCode::CONFLICT, err.to_string()),
            ApiError::Session(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.sessions.len().await,
    })
}

async fn personas() -> Json<Vec<PersonaInfo>> {
    Json(
        Persona::known()
            .iter()
            .map(|p| PersonaInfo {
                id: p.label(),
                description: p.description(),
            })
            .collect(),
    )
}

async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let session = state.sessions.create(request.persona.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(session.snapshot().await)))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or(ApiError::SessionNotFound(id))?;
    Ok(Json(session.snapshot().await))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::SessionNotFound(id))
    }
}

async fn select_persona(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SelectPersonaRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or(ApiError::SessionNotFound(id))?;
    session.select_persona(&request.persona).await?;
    Ok(Json(session.snapshot().await))
}

async fn submit_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or(ApiError::SessionNotFound(id))?;
    session.submit(&request.text).await?;
    Ok(Json(session.snapshot().await))
}

async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or(ApiError::SessionNotFound(id))?;
    session.acknowledge().await;
    Ok(Json(session.snapshot().await))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/personas", get(personas))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session).delete(delete_session))
        .route("/v1/sessions/:id/persona", post(select_persona))
        .route("/v1/sessions/:id/messages", post(submit_message))
        .route("/v1/sessions/:id/acknowledge", post(acknowledge))
}
