//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for chat,
//! room agents, and maintenance. It uses `utoipa` doc comments to generate
//! OpenAPI documentation.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{
        ChatRequest, ChatResponse, ErrorResponse, HealthResponse, RoomAgentRequest,
        RoomAgentResponse, SweepResponse,
    },
    room::StartOutcome,
    session::SubmitError,
    state::AppState,
    sweeper,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn submit_error(err: SubmitError) -> ApiError {
    match err {
        SubmitError::Superseded => {
            ApiError::Conflict("request superseded by a newer message".to_string())
        }
        SubmitError::Service(err) => ApiError::InternalServerError(err.into()),
    }
}

/// Send a chat message and receive a tutoring reply.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Tutoring reply", body = ChatResponse),
        (status = 409, description = "Request superseded by a newer message", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let result = state
        .conversations
        .submit_text(&payload.session_id, &payload.language, payload.message)
        .await
        .map_err(submit_error)?;
    Ok(Json(result.into()))
}

/// Send an audio message; it is transcribed before entering the pipeline.
///
/// Expects a multipart form with an `audio` file part plus optional
/// `language` and `session_id` text parts.
#[utoipa::path(
    post,
    path = "/chat/audio",
    responses(
        (status = 200, description = "Tutoring reply", body = ChatResponse),
        (status = 400, description = "Missing audio part", body = ErrorResponse),
        (status = 409, description = "Request superseded by a newer message", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn chat_audio(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, ApiError> {
    let mut audio: Option<Bytes> = None;
    let mut language = "English".to_string();
    let mut session_id = "default".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("audio") => {
                audio = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("unreadable audio part: {e}")))?,
                );
            }
            Some("language") => {
                language = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable language part: {e}")))?;
            }
            Some("session_id") => {
                session_id = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("unreadable session part: {e}")))?;
            }
            _ => {}
        }
    }

    let audio =
        audio.ok_or_else(|| ApiError::BadRequest("an `audio` part is required".to_string()))?;

    let result = state
        .conversations
        .submit_audio(&session_id, &language, audio)
        .await
        .map_err(submit_error)?;
    Ok(Json(result.into()))
}

/// Start a tutoring agent in a real-time room.
#[utoipa::path(
    post,
    path = "/rooms/agent",
    request_body = RoomAgentRequest,
    responses(
        (status = 200, description = "Agent status for the room", body = RoomAgentResponse)
    )
)]
pub async fn start_room_agent(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RoomAgentRequest>,
) -> Json<RoomAgentResponse> {
    let outcome = state
        .rooms
        .start_room_agent(
            &payload.room_id,
            &payload.language,
            &payload.token,
            &payload.server_url,
        )
        .await;

    let response = match outcome {
        Ok(StartOutcome::Started) => RoomAgentResponse {
            status: "started".to_string(),
            message: format!("agent started for room '{}'", payload.room_id),
        },
        Ok(StartOutcome::AlreadyRunning) => RoomAgentResponse {
            status: "already_running".to_string(),
            message: format!("agent already running for room '{}'", payload.room_id),
        },
        Err(err) => RoomAgentResponse {
            status: "error".to_string(),
            message: err.to_string(),
        },
    };
    Json(response)
}

/// Stop the tutoring agent for a room.
#[utoipa::path(
    delete,
    path = "/rooms/{room_id}/agent",
    responses(
        (status = 200, description = "Agent stop requested", body = RoomAgentResponse),
        (status = 404, description = "No agent running for the room", body = ErrorResponse)
    ),
    params(
        ("room_id" = String, Path, description = "Room identifier")
    )
)]
pub async fn stop_room_agent(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomAgentResponse>, ApiError> {
    if state.rooms.stop_room_agent(&room_id) {
        Ok(Json(RoomAgentResponse {
            status: "stopped".to_string(),
            message: format!("agent stop requested for room '{room_id}'"),
        }))
    } else {
        Err(ApiError::NotFound(format!(
            "no agent running for room '{room_id}'"
        )))
    }
}

/// Delete stored audio artifacts older than the retention window.
#[utoipa::path(
    post,
    path = "/maintenance/sweep",
    responses(
        (status = 200, description = "Sweep finished", body = SweepResponse),
        (status = 503, description = "Audio storage is not available", body = ErrorResponse)
    )
)]
pub async fn sweep_artifacts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepResponse>, ApiError> {
    let store = state.store.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("audio storage is not available".to_string())
    })?;

    let report =
        sweeper::sweep_artifacts(store.as_ref(), state.config.retention_window, Utc::now())
            .await
            .map_err(|e| ApiError::InternalServerError(e.into()))?;

    Ok(Json(SweepResponse {
        deleted: report.deleted,
        skipped: report.skipped,
    }))
}

/// Service health check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
