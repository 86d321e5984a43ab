//! Error types shared by the external service contracts.

/// A failure in one of the downstream AI or storage services.
///
/// Callers recover locally where a degraded path exists (e.g. a reply
/// without audio); otherwise the error surfaces as a failed pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("language model request failed: {0}")]
    Model(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("object storage operation failed: {0}")]
    Storage(String),
}
