//! The response generation pipeline: prompt composition, model call, text
//! extraction, speech synthesis, and artifact storage.
//!
//! The textual reply is authoritative: once the model call succeeds the
//! pipeline always returns text. Everything after that is best effort, and
//! any failure downgrades the result to a reply without audio.

use crate::storage::{ArtifactMetadata, ArtifactStore, artifact_key};
use bytes::Bytes;
use chrono::Utc;
use laingfy_core::{
    ServiceError, extraction,
    llm::LanguageModel,
    profile::LanguageProfile,
    speech::SpeechSynthesizer,
};
use std::sync::Arc;
use tracing::{info, warn};

/// The outcome of one completed pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    /// The full tutoring reply, markers included.
    pub reply_text: String,
    /// Public URL of the synthesized audio, when synthesis and storage
    /// both succeeded.
    pub audio_url: Option<String>,
}

/// Runs tutoring requests through model, extraction, synthesis, and storage.
pub struct ResponsePipeline {
    model: Arc<dyn LanguageModel>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    /// `None` when audio storage was unavailable at startup; replies are
    /// then produced without audio.
    store: Option<Arc<dyn ArtifactStore>>,
}

impl ResponsePipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        store: Option<Arc<dyn ArtifactStore>>,
    ) -> Self {
        Self {
            model,
            synthesizer,
            store,
        }
    }

    /// Generates a reply for `input` under `profile`.
    ///
    /// A model failure ends the run with a `ServiceError`; synthesis and
    /// storage failures degrade to `audio_url: None`.
    pub async fn run(
        &self,
        profile: &'static LanguageProfile,
        input: &str,
    ) -> Result<PipelineResult, ServiceError> {
        let system_prompt = compose_system_prompt(profile);
        let reply = self.model.complete(&system_prompt, input).await?;

        let speech_text = extraction::speech_text(&reply, &profile.rules);
        let audio_url = self.synthesize_and_store(profile, &speech_text, &reply).await;

        Ok(PipelineResult {
            reply_text: reply,
            audio_url,
        })
    }

    async fn synthesize_and_store(
        &self,
        profile: &LanguageProfile,
        speech_text: &str,
        raw_reply: &str,
    ) -> Option<String> {
        if speech_text.trim().is_empty() {
            return None;
        }

        let audio = match self.synthesizer.synthesize(speech_text, profile.voice).await {
            Ok(audio) => audio,
            Err(err) => {
                // One retry with the unextracted reply before giving up.
                warn!(language = profile.code, error = %err, "synthesis failed, retrying with full reply");
                match self.synthesizer.synthesize(raw_reply, profile.voice).await {
                    Ok(audio) => audio,
                    Err(err) => {
                        warn!(language = profile.code, error = %err, "synthesis retry failed, continuing without audio");
                        return None;
                    }
                }
            }
        };

        self.store_artifact(profile, audio).await
    }

    async fn store_artifact(&self, profile: &LanguageProfile, audio: Bytes) -> Option<String> {
        let store = self.store.as_ref()?;

        let created_at = Utc::now().timestamp();
        let key = artifact_key(created_at);
        let metadata = ArtifactMetadata {
            language: profile.code.to_string(),
            created_at,
        };

        match store.put(&key, audio, &metadata).await {
            Ok(()) => {
                let url = store.public_url(&key);
                info!(%key, language = profile.code, "audio artifact stored");
                Some(url)
            }
            Err(err) => {
                warn!(%key, error = %err, "artifact upload failed, continuing without audio");
                None
            }
        }
    }
}

/// Pairs the profile's instructions with the standing conversation reminders.
fn compose_system_prompt(profile: &LanguageProfile) -> String {
    format!(
        "{}\n\nRemember to:\n\
         1. Keep responses natural and conversational\n\
         2. Focus on practical, everyday language use\n\
         3. Provide improvements only when they would genuinely help the user learn\n\
         4. Keep explanations concise and clear",
        profile.system_prompt
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockArtifactStore;
    use async_trait::async_trait;
    use laingfy_core::llm::MockLanguageModel;
    use laingfy_core::profile;
    use laingfy_core::speech::MockSpeechSynthesizer;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingModel;

    #[async_trait]
    impl LanguageModel for FailingModel {
        async fn complete(&self, _: &str, _: &str) -> Result<String, ServiceError> {
            Err(ServiceError::Model("rate limited".to_string()))
        }
    }

    /// Fails the first `failures` calls, then succeeds; records every input.
    struct FlakySynthesizer {
        failures: AtomicUsize,
        inputs: Mutex<Vec<String>>,
    }

    impl FlakySynthesizer {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                inputs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for FlakySynthesizer {
        async fn synthesize(&self, text: &str, _voice: &str) -> Result<Bytes, ServiceError> {
            self.inputs.lock().unwrap().push(text.to_string());
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                Err(ServiceError::Synthesis("tts unavailable".to_string()))
            } else {
                Ok(Bytes::from_static(b"mp3"))
            }
        }
    }

    fn storing_store() -> MockArtifactStore {
        let mut store = MockArtifactStore::new();
        store.expect_put().returning(|_, _, _| Ok(()));
        store
            .expect_public_url()
            .returning(|key| format!("https://bucket.s3.us-east-1.amazonaws.com/{key}"));
        store
    }

    const GERMAN_REPLY: &str =
        "🇩🇪 Mir geht es gut! 🇺🇸 I am doing well!\n❓ Und dir? / And you?";

    #[tokio::test]
    async fn successful_run_returns_text_and_audio_url() {
        let pipeline = ResponsePipeline::new(
            Arc::new(MockLanguageModel::new(GERMAN_REPLY)),
            Arc::new(MockSpeechSynthesizer::new(&b"mp3"[..])),
            Some(Arc::new(storing_store())),
        );

        let result = pipeline
            .run(profile::resolve("German"), "Wie geht's?")
            .await
            .unwrap();

        assert_eq!(result.reply_text, GERMAN_REPLY);
        let url = result.audio_url.expect("audio url");
        assert!(url.starts_with("https://bucket.s3.us-east-1.amazonaws.com/audio/audio_"));
    }

    #[tokio::test]
    async fn model_failure_ends_the_run() {
        let pipeline = ResponsePipeline::new(
            Arc::new(FailingModel),
            Arc::new(MockSpeechSynthesizer::new(&b"mp3"[..])),
            Some(Arc::new(storing_store())),
        );

        let err = pipeline
            .run(profile::resolve("English"), "Hello")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Model(_)));
    }

    #[tokio::test]
    async fn synthesis_failure_retries_with_full_reply() {
        let synthesizer = Arc::new(FlakySynthesizer::new(1));
        let pipeline = ResponsePipeline::new(
            Arc::new(MockLanguageModel::new(GERMAN_REPLY)),
            synthesizer.clone(),
            Some(Arc::new(storing_store())),
        );

        let result = pipeline
            .run(profile::resolve("German"), "Wie geht's?")
            .await
            .unwrap();

        assert!(result.audio_url.is_some());
        let inputs = synthesizer.inputs.lock().unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0], "Mir geht es gut! Und dir?");
        assert_eq!(inputs[1], GERMAN_REPLY);
    }

    #[tokio::test]
    async fn repeated_synthesis_failure_degrades_to_no_audio() {
        let pipeline = ResponsePipeline::new(
            Arc::new(MockLanguageModel::new(GERMAN_REPLY)),
            Arc::new(FlakySynthesizer::new(2)),
            Some(Arc::new(storing_store())),
        );

        let result = pipeline
            .run(profile::resolve("German"), "Wie geht's?")
            .await
            .unwrap();

        assert_eq!(result.reply_text, GERMAN_REPLY);
        assert_eq!(result.audio_url, None);
    }

    #[tokio::test]
    async fn storage_failure_degrades_to_no_audio() {
        let mut store = MockArtifactStore::new();
        store
            .expect_put()
            .returning(|_, _, _| Err(ServiceError::Storage("access denied".to_string())));

        let pipeline = ResponsePipeline::new(
            Arc::new(MockLanguageModel::new(GERMAN_REPLY)),
            Arc::new(MockSpeechSynthesizer::new(&b"mp3"[..])),
            Some(Arc::new(store)),
        );

        let result = pipeline
            .run(profile::resolve("German"), "Wie geht's?")
            .await
            .unwrap();

        assert_eq!(result.reply_text, GERMAN_REPLY);
        assert_eq!(result.audio_url, None);
    }

    #[tokio::test]
    async fn missing_store_still_returns_reply() {
        let pipeline = ResponsePipeline::new(
            Arc::new(MockLanguageModel::new(GERMAN_REPLY)),
            Arc::new(MockSpeechSynthesizer::new(&b"mp3"[..])),
            None,
        );

        let result = pipeline
            .run(profile::resolve("German"), "Wie geht's?")
            .await
            .unwrap();

        assert_eq!(result.reply_text, GERMAN_REPLY);
        assert_eq!(result.audio_url, None);
    }

    #[tokio::test]
    async fn unmarked_reply_synthesizes_raw_text() {
        let synthesizer = Arc::new(FlakySynthesizer::new(0));
        let pipeline = ResponsePipeline::new(
            Arc::new(MockLanguageModel::new("Hallo! Schön dich zu sehen.")),
            synthesizer.clone(),
            Some(Arc::new(storing_store())),
        );

        let result = pipeline
            .run(profile::resolve("German"), "Hallo")
            .await
            .unwrap();

        assert!(result.audio_url.is_some());
        let inputs = synthesizer.inputs.lock().unwrap();
        assert_eq!(*inputs, ["Hallo! Schön dich zu sehen."]);
    }
}
