//! Retention sweeper for stored audio artifacts.
//!
//! Audio clips are throwaway: clients fetch them right after a reply, so
//! anything older than the retention window is deleted. The creation time is
//! parsed out of each key; keys that do not parse are left alone.

use crate::storage::{AUDIO_PREFIX, ArtifactStore, artifact_timestamp};
use chrono::{DateTime, Utc};
use laingfy_core::ServiceError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Counts from one sweep over the artifact prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepReport {
    /// Artifacts deleted because their age exceeded the retention window.
    pub deleted: usize,
    /// Keys skipped because no creation timestamp could be parsed.
    pub skipped: usize,
}

/// Deletes artifacts strictly older than `retention`, judged against `now`.
///
/// Idempotent: a second sweep over the same storage state deletes nothing
/// further. Per-key delete failures are logged and skipped so a later sweep
/// can retry them.
pub async fn sweep_artifacts(
    store: &dyn ArtifactStore,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<SweepReport, ServiceError> {
    let keys = store.list(AUDIO_PREFIX).await?;
    let mut report = SweepReport::default();

    for key in keys {
        match artifact_timestamp(&key) {
            Some(created_at) if now.timestamp() - created_at > retention.as_secs() as i64 => {
                match store.delete(&key).await {
                    Ok(()) => {
                        info!(%key, "deleted expired audio artifact");
                        report.deleted += 1;
                    }
                    Err(err) => {
                        warn!(%key, error = %err, "failed to delete expired artifact");
                    }
                }
            }
            Some(_) => {}
            None => {
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

/// Spawns the periodic sweep task.
pub fn spawn_sweeper(
    store: Arc<dyn ArtifactStore>,
    retention: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep_artifacts(store.as_ref(), retention, Utc::now()).await {
                Ok(report) => {
                    info!(deleted = report.deleted, skipped = report.skipped, "artifact sweep finished");
                }
                Err(err) => {
                    warn!(error = %err, "artifact sweep failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockArtifactStore;

    const DAY: Duration = Duration::from_secs(86_400);

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
    }

    fn key_aged(age_secs: i64) -> String {
        format!("audio/audio_{}_abc123.mp3", 1_700_000_000 - age_secs)
    }

    #[tokio::test]
    async fn deletes_only_artifacts_older_than_retention() {
        let fresh = key_aged(1_000);
        let expired = key_aged(90_000);

        let mut store = MockArtifactStore::new();
        let listing = vec![fresh.clone(), expired.clone()];
        store
            .expect_list()
            .withf(|prefix| prefix == AUDIO_PREFIX)
            .returning(move |_| Ok(listing.clone()));
        store
            .expect_delete()
            .withf(move |key| key == expired)
            .times(1)
            .returning(|_| Ok(()));

        let report = sweep_artifacts(&store, DAY, now()).await.unwrap();
        assert_eq!(report, SweepReport { deleted: 1, skipped: 0 });
    }

    #[tokio::test]
    async fn retention_boundary_is_strictly_greater() {
        let just_under = key_aged(86_340); // 23h59m
        let just_over = key_aged(86_460); // 24h01m
        let exactly = key_aged(86_400);

        let mut store = MockArtifactStore::new();
        let listing = vec![just_under.clone(), just_over.clone(), exactly.clone()];
        store.expect_list().returning(move |_| Ok(listing.clone()));
        store
            .expect_delete()
            .withf(move |key| key == just_over)
            .times(1)
            .returning(|_| Ok(()));

        let report = sweep_artifacts(&store, DAY, now()).await.unwrap();
        assert_eq!(report.deleted, 1);
    }

    #[tokio::test]
    async fn malformed_keys_are_skipped_not_deleted() {
        let mut store = MockArtifactStore::new();
        let listing = vec![
            "audio/notes.txt".to_string(),
            "audio/audio_soon_abc.mp3".to_string(),
            key_aged(90_000),
        ];
        store.expect_list().returning(move |_| Ok(listing.clone()));
        store.expect_delete().times(1).returning(|_| Ok(()));

        let report = sweep_artifacts(&store, DAY, now()).await.unwrap();
        assert_eq!(report, SweepReport { deleted: 1, skipped: 2 });
    }

    #[tokio::test]
    async fn delete_failures_are_logged_and_skipped() {
        let mut store = MockArtifactStore::new();
        let listing = vec![key_aged(90_000), key_aged(100_000)];
        store.expect_list().returning(move |_| Ok(listing.clone()));
        store
            .expect_delete()
            .times(2)
            .returning(|_| Err(ServiceError::Storage("throttled".to_string())));

        let report = sweep_artifacts(&store, DAY, now()).await.unwrap();
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn listing_failure_surfaces() {
        let mut store = MockArtifactStore::new();
        store
            .expect_list()
            .returning(|_| Err(ServiceError::Storage("no such bucket".to_string())));

        let err = sweep_artifacts(&store, DAY, now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
    }

    #[tokio::test]
    async fn sweep_is_idempotent_over_unchanged_state() {
        let mut store = MockArtifactStore::new();
        let listing = vec![key_aged(1_000)];
        store.expect_list().returning(move |_| Ok(listing.clone()));
        store.expect_delete().never();

        let first = sweep_artifacts(&store, DAY, now()).await.unwrap();
        let second = sweep_artifacts(&store, DAY, now()).await.unwrap();
        assert_eq!(first, second);
    }
}
