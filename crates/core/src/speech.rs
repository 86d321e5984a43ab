//! Speech synthesis client for voicing tutoring replies.

use crate::error::ServiceError;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, Voice},
};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// A generic client for the speech-synthesis service.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Renders `text` as audio using the named voice.
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes, ServiceError>;
}

/// An implementation of `SpeechSynthesizer` backed by the OpenAI TTS API.
pub struct OpenAISpeechSynthesizer {
    client: Client<OpenAIConfig>,
}

impl OpenAISpeechSynthesizer {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
        }
    }

    fn voice_for(name: &str) -> Voice {
        match name {
            "alloy" => Voice::Alloy,
            "echo" => Voice::Echo,
            "fable" => Voice::Fable,
            "onyx" => Voice::Onyx,
            "nova" => Voice::Nova,
            "shimmer" => Voice::Shimmer,
            other => {
                debug!(voice = %other, "unknown voice, using shimmer");
                Voice::Shimmer
            }
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeechSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Bytes, ServiceError> {
        let request = CreateSpeechRequestArgs::default()
            .model(SpeechModel::Tts1)
            .voice(Self::voice_for(voice))
            .input(text)
            .build()
            .map_err(|e| ServiceError::Synthesis(e.to_string()))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e| ServiceError::Synthesis(e.to_string()))?;

        Ok(response.bytes)
    }
}

/// A canned `SpeechSynthesizer` for development and integration testing.
///
/// Returns a fixed byte payload for any input.
pub struct MockSpeechSynthesizer {
    audio: Bytes,
}

impl MockSpeechSynthesizer {
    pub fn new(audio: impl Into<Bytes>) -> Self {
        Self {
            audio: audio.into(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeechSynthesizer {
    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Bytes, ServiceError> {
        Ok(self.audio.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_synthesizer_returns_canned_audio() {
        let synth = MockSpeechSynthesizer::new(&b"mp3-bytes"[..]);
        let audio = synth.synthesize("Hallo", "onyx").await.unwrap();
        assert_eq!(audio.as_ref(), b"mp3-bytes");
    }
}
