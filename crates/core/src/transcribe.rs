//! Speech-to-text client for audio chat requests.

use crate::error::ServiceError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

const DEEPGRAM_LISTEN_URL: &str = "https://api.deepgram.com/v1/listen";
const TRANSCRIPTION_MODEL: &str = "nova-2-general";

/// A generic client for the transcription service.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribes `audio` into text, hinted with the profile's language code.
    async fn transcribe(&self, audio: Bytes, language: &str) -> Result<String, ServiceError>;
}

/// An implementation of `Transcriber` backed by the Deepgram prerecorded API.
pub struct DeepgramTranscriber {
    http: reqwest::Client,
    api_key: String,
}

impl DeepgramTranscriber {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Deserialize)]
struct ListenResults {
    channels: Vec<ListenChannel>,
}

#[derive(Deserialize)]
struct ListenChannel {
    alternatives: Vec<ListenAlternative>,
}

#[derive(Deserialize)]
struct ListenAlternative {
    transcript: String,
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn transcribe(&self, audio: Bytes, language: &str) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(DEEPGRAM_LISTEN_URL)
            .query(&[("model", TRANSCRIPTION_MODEL), ("language", language)])
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "application/octet-stream")
            .body(audio)
            .send()
            .await
            .map_err(|e| ServiceError::Transcription(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Transcription(format!(
                "deepgram returned {status}: {body}"
            )));
        }

        let listen: ListenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Transcription(e.to_string()))?;

        listen
            .results
            .channels
            .first()
            .and_then(|channel| channel.alternatives.first())
            .map(|alt| alt.transcript.clone())
            .ok_or_else(|| {
                ServiceError::Transcription("response contained no transcript".to_string())
            })
    }
}

/// A canned `Transcriber` for development and integration testing.
pub struct MockTranscriber {
    transcript: String,
}

impl MockTranscriber {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
        }
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio: Bytes, _language: &str) -> Result<String, ServiceError> {
        Ok(self.transcript.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_response_parses_transcript() {
        let body = r#"{
            "results": {
                "channels": [
                    {"alternatives": [{"transcript": "wie geht es dir"}]}
                ]
            }
        }"#;
        let parsed: ListenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.results.channels[0].alternatives[0].transcript,
            "wie geht es dir"
        );
    }

    #[tokio::test]
    async fn mock_transcriber_returns_canned_text() {
        let transcriber = MockTranscriber::new("hallo welt");
        let text = transcriber
            .transcribe(Bytes::from_static(b"audio"), "de")
            .await
            .unwrap();
        assert_eq!(text, "hallo welt");
    }
}
