//! API request and response models.
//!
//! These structs define the HTTP surface and double as the `utoipa` schema
//! source for the generated OpenAPI documentation.

use crate::pipeline::PipelineResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn default_language() -> String {
    "English".to_string()
}

fn default_session() -> String {
    "default".to_string()
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    #[schema(example = "Hallo, wie geht es dir?")]
    pub message: String,
    /// Language label or code; unknown values fall back to English.
    #[serde(default = "default_language")]
    #[schema(example = "German")]
    pub language: String,
    /// Conversation to attribute the message to.
    #[serde(default = "default_session")]
    pub session_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ChatResponse {
    /// The full tutoring reply.
    pub response: String,
    /// Public URL of the synthesized audio clip, when available.
    pub audio_url: Option<String>,
}

impl From<PipelineResult> for ChatResponse {
    fn from(result: PipelineResult) -> Self {
        Self {
            response: result.reply_text,
            audio_url: result.audio_url,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RoomAgentRequest {
    #[schema(example = "de")]
    pub room_id: String,
    #[serde(default = "default_language")]
    #[schema(example = "German")]
    pub language: String,
    /// Access token for the room.
    pub token: String,
    /// WebSocket URL of the real-time media server.
    #[schema(example = "wss://rooms.example.com")]
    pub server_url: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct RoomAgentResponse {
    #[schema(example = "started")]
    pub status: String,
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    pub deleted: usize,
    pub skipped: usize,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
