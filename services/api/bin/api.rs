//! Main Entrypoint for the Laingfy API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the AI service clients and audio storage.
//! 3. Constructing the conversation service and room manager.
//! 4. Spawning the background maintenance tasks.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use laingfy_api::{
    config::Config,
    pipeline::ResponsePipeline,
    room::{RoomManager, RoomSettings, WsRoomTransport},
    router::create_router,
    session::ConversationService,
    state::AppState,
    storage::{ArtifactStore, S3ArtifactStore},
    sweeper,
};
use laingfy_core::{
    llm::OpenAICompatibleModel,
    speech::OpenAISpeechSynthesizer,
    transcribe::{DeepgramTranscriber, Transcriber},
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// Connects to the audio bucket, degrading to no storage when unreachable.
async fn init_artifact_store(config: &Config) -> Option<Arc<dyn ArtifactStore>> {
    let store = S3ArtifactStore::connect(config.audio_bucket.clone(), config.aws_region.clone()).await;
    match store.bucket_exists().await {
        Ok(true) => {
            info!(bucket = %config.audio_bucket, region = %config.aws_region, "connected to audio bucket");
            Some(Arc::new(store))
        }
        Ok(false) => {
            warn!(bucket = %config.audio_bucket, "audio bucket does not exist, running without audio storage");
            None
        }
        Err(err) => {
            warn!(bucket = %config.audio_bucket, error = %err, "audio bucket unreachable, running without audio storage");
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    let model = Arc::new(OpenAICompatibleModel::new(
        openai_config.clone(),
        config.chat_model.clone(),
    ));
    let synthesizer = Arc::new(OpenAISpeechSynthesizer::new(openai_config));
    let transcriber: Option<Arc<dyn Transcriber>> = config
        .deepgram_api_key
        .clone()
        .map(|key| Arc::new(DeepgramTranscriber::new(key)) as Arc<dyn Transcriber>);
    if transcriber.is_none() {
        warn!("DEEPGRAM_API_KEY not set, audio chat requests will be rejected");
    }

    let store = init_artifact_store(&config).await;

    let pipeline = Arc::new(ResponsePipeline::new(model, synthesizer, store.clone()));
    let conversations = Arc::new(ConversationService::new(pipeline, transcriber));
    let rooms = Arc::new(RoomManager::new(
        Arc::new(WsRoomTransport),
        Arc::clone(&conversations),
        RoomSettings {
            participant_timeout: config.participant_timeout,
            ..RoomSettings::default()
        },
    ));

    // --- 4. Spawn Background Maintenance ---
    if let Some(store) = store.clone() {
        sweeper::spawn_sweeper(store, config.retention_window, config.sweep_interval);
    }
    {
        let conversations = Arc::clone(&conversations);
        let idle_timeout = config.session_idle_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = conversations.evict_idle(idle_timeout);
                if evicted > 0 {
                    info!(evicted, "evicted idle sessions");
                }
            }
        });
    }

    let app_state = Arc::new(AppState {
        conversations,
        rooms,
        store,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
