//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ChatRequest, ChatResponse, ErrorResponse, HealthResponse, RoomAgentRequest,
        RoomAgentResponse, SweepResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::chat,
        handlers::chat_audio,
        handlers::start_room_agent,
        handlers::stop_room_agent,
        handlers::sweep_artifacts,
        handlers::health,
    ),
    components(
        schemas(ChatRequest, ChatResponse, RoomAgentRequest, RoomAgentResponse, SweepResponse, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "Laingfy API", description = "Conversational language-tutoring agent")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/chat/audio", post(handlers::chat_audio))
        .route("/rooms/agent", post(handlers::start_room_agent))
        .route("/rooms/{room_id}/agent", delete(handlers::stop_room_agent))
        .route("/maintenance/sweep", post(handlers::sweep_artifacts))
        .route("/health", get(handlers::health))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
