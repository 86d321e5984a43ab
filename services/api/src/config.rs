use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub chat_model: String,
    pub deepgram_api_key: Option<String>,
    pub audio_bucket: String,
    pub aws_region: String,
    pub retention_window: Duration,
    pub sweep_interval: Duration,
    /// Bound on waiting for the first room participant; `None` waits forever.
    pub participant_timeout: Option<Duration>,
    pub session_idle_timeout: Duration,
    pub log_level: Level,
}

fn seconds_var(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map(|key| key.trim_matches('"').to_string())
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let deepgram_api_key = std::env::var("DEEPGRAM_API_KEY")
            .ok()
            .map(|key| key.trim_matches('"').to_string())
            .filter(|key| !key.is_empty());

        let audio_bucket = std::env::var("AWS_S3_BUCKET_AUDIO")
            .ok()
            .map(|bucket| bucket.trim().to_string())
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("AWS_S3_BUCKET_AUDIO".to_string()))?;

        let aws_region = std::env::var("AWS_REGION")
            .ok()
            .map(|region| region.trim().to_string())
            .filter(|region| !region.is_empty())
            .unwrap_or_else(|| "us-east-1".to_string());

        let retention_window = Duration::from_secs(seconds_var("AUDIO_RETENTION_SECS", 86_400)?);
        let sweep_interval = Duration::from_secs(seconds_var("SWEEP_INTERVAL_SECS", 3_600)?);

        let participant_timeout = match seconds_var("ROOM_PARTICIPANT_TIMEOUT_SECS", 300)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let session_idle_timeout =
            Duration::from_secs(seconds_var("SESSION_IDLE_TIMEOUT_SECS", 1_800)?);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            chat_model,
            deepgram_api_key,
            audio_bucket,
            aws_region,
            retention_window,
            sweep_interval,
            participant_timeout,
            session_idle_timeout,
            log_level,
        })
    }
}
