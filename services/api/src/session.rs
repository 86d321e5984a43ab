//! Per-session language state and single-flight request serialization.
//!
//! Each conversation (text API) or room gets one `SessionEntry`. A session
//! accepts at most one in-flight pipeline run: a newer request supersedes an
//! older one by cancelling it and waiting for it to finish before starting.
//! Distinct sessions never contend with each other.

use crate::pipeline::{PipelineResult, ResponsePipeline};
use bytes::Bytes;
use laingfy_core::{
    ServiceError,
    profile::{self, LanguageProfile},
    transcribe::Transcriber,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Why a submitted request did not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// A newer request on the same session cancelled this one; its result
    /// is never delivered.
    #[error("superseded by a newer request on this session")]
    Superseded,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// The pipeline run currently registered for a session.
struct CurrentRun {
    run_id: u64,
    handle: JoinHandle<()>,
}

/// Clears the session's current-run slot when the run finishes, fails, or
/// is cancelled. Lives inside the spawned task so cancellation drops it too.
struct RunGuard {
    slot: Arc<StdMutex<Option<CurrentRun>>>,
    run_id: u64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.as_ref().is_some_and(|run| run.run_id == self.run_id) {
                *slot = None;
            }
        }
    }
}

/// State owned by the registry for one conversation.
pub struct SessionEntry {
    id: String,
    /// The language-dependent resources for this session; swapped out
    /// whenever the language actually changes.
    profile: StdMutex<&'static LanguageProfile>,
    /// Serialization token: submissions for this session take turns here.
    gate: Mutex<()>,
    current: Arc<StdMutex<Option<CurrentRun>>>,
    run_seq: AtomicU64,
    last_used: StdMutex<Instant>,
}

impl SessionEntry {
    fn new(id: String, profile: &'static LanguageProfile) -> Self {
        Self {
            id,
            profile: StdMutex::new(profile),
            gate: Mutex::new(()),
            current: Arc::new(StdMutex::new(None)),
            run_seq: AtomicU64::new(0),
            last_used: StdMutex::new(Instant::now()),
        }
    }

    /// Switches the session language, re-initializing the session's
    /// language-dependent resources only when the language actually changed.
    fn set_language(&self, label: &str) -> &'static LanguageProfile {
        let next = profile::resolve(label);
        if let Ok(mut current) = self.profile.lock() {
            if current.code != next.code {
                info!(
                    session = %self.id,
                    from = current.code,
                    to = next.code,
                    "language changed, reinitializing session resources"
                );
                *current = next;
            }
        }
        next
    }

    fn profile(&self) -> &'static LanguageProfile {
        self.profile
            .lock()
            .map(|profile| *profile)
            .unwrap_or_else(|_| profile::default_profile())
    }

    fn touch(&self) {
        if let Ok(mut last_used) = self.last_used.lock() {
            *last_used = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .map(|last_used| last_used.elapsed())
            .unwrap_or_default()
    }

    fn has_current_run(&self) -> bool {
        self.current.lock().map(|run| run.is_some()).unwrap_or(false)
    }

    fn take_current(&self) -> Option<CurrentRun> {
        self.current.lock().ok().and_then(|mut slot| slot.take())
    }

    fn register(&self, run: CurrentRun) {
        if let Ok(mut slot) = self.current.lock() {
            *slot = Some(run);
        }
    }
}

/// Owns all live sessions and serializes requests within each of them.
pub struct ConversationService {
    sessions: StdMutex<HashMap<String, Arc<SessionEntry>>>,
    pipeline: Arc<ResponsePipeline>,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl ConversationService {
    pub fn new(pipeline: Arc<ResponsePipeline>, transcriber: Option<Arc<dyn Transcriber>>) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            pipeline,
            transcriber,
        }
    }

    fn entry(&self, session_id: &str, language: &str) -> Arc<SessionEntry> {
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session = %session_id, "creating session");
            Arc::new(SessionEntry::new(
                session_id.to_string(),
                profile::resolve(language),
            ))
        }))
    }

    /// Submits a text request for a session.
    ///
    /// Acquires the session's serialization token, cancels and awaits any
    /// run still registered as current, then executes the new run. The
    /// caller of a superseded request gets `SubmitError::Superseded`.
    pub async fn submit_text(
        &self,
        session_id: &str,
        language: &str,
        text: String,
    ) -> Result<PipelineResult, SubmitError> {
        let entry = self.entry(session_id, language);
        entry.touch();
        entry.set_language(language);
        let profile = entry.profile();

        let token = entry.gate.lock().await;

        if let Some(previous) = entry.take_current() {
            debug!(session = %session_id, "cancelling superseded run");
            previous.handle.abort();
            // Wait until the cancelled run has fully wound down before the
            // new one starts.
            let _ = previous.handle.await;
        }

        let run_id = entry.run_seq.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = oneshot::channel();
        let pipeline = Arc::clone(&self.pipeline);
        let guard = RunGuard {
            slot: Arc::clone(&entry.current),
            run_id,
        };
        let handle = tokio::spawn(async move {
            let result = pipeline.run(profile, &text).await;
            // Deregister before delivering so callers observing the result
            // never see the finished run still registered.
            drop(guard);
            let _ = result_tx.send(result);
        });
        entry.register(CurrentRun { run_id, handle });
        drop(token);

        match result_rx.await {
            Ok(result) => result.map_err(SubmitError::Service),
            // The sender was dropped without a result: the run was cancelled.
            Err(_) => Err(SubmitError::Superseded),
        }
    }

    /// Transcribes an audio request and submits the transcript.
    pub async fn submit_audio(
        &self,
        session_id: &str,
        language: &str,
        audio: Bytes,
    ) -> Result<PipelineResult, SubmitError> {
        let transcriber = self.transcriber.as_ref().ok_or_else(|| {
            SubmitError::Service(ServiceError::Transcription(
                "transcription service is not configured".to_string(),
            ))
        })?;

        let profile = profile::resolve(language);
        let text = transcriber
            .transcribe(audio, profile.transcription_language)
            .await
            .map_err(SubmitError::Service)?;
        info!(session = %session_id, transcript = %text, "audio transcribed");

        self.submit_text(session_id, language, text).await
    }

    /// Removes a session, if present. Any in-flight run keeps running until
    /// it completes or is superseded; its guard clears the detached slot.
    pub fn remove_session(&self, session_id: &str) -> bool {
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.remove(session_id).is_some()
    }

    /// Drops sessions idle for longer than `max_idle` with no in-flight run.
    /// Returns how many were evicted.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let evict = entry.idle_for() > max_idle && !entry.has_current_run();
            if evict {
                debug!(session = %id, "evicting idle session");
            }
            !evict
        });
        before - sessions.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }
}
