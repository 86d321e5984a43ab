//! The per-room lifecycle state machine and the room registry.
//!
//! Each room runs one task through `CONNECTING`, `AWAITING_PARTICIPANT`,
//! `ACTIVE`, and `TEARDOWN`. Teardown runs exactly once no matter which
//! state the task leaves from: the drive loop only ever *returns* a reason,
//! and the release steps run unconditionally after it.

use super::{
    LifecycleError,
    transport::{ConnectOptions, RoomConnection, RoomEvent, RoomTransport},
};
use crate::session::{ConversationService, SubmitError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use laingfy_core::profile::{self, LanguageProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Tuning for room lifecycles.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Bound on waiting for the first participant; `None` waits forever.
    pub participant_timeout: Option<Duration>,
    /// How often the supervising loop re-checks the registry while active.
    pub poll_interval: Duration,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            participant_timeout: Some(Duration::from_secs(300)),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Outcome of a room-agent start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The room already has a live lifecycle task; starting is a no-op.
    AlreadyRunning,
}

struct RoomEntry {
    language: &'static str,
    started_at: DateTime<Utc>,
    lifecycle: Option<JoinHandle<()>>,
}

/// Why a lifecycle task left its drive loop.
#[derive(Debug)]
enum TeardownReason {
    ParticipantTimeout,
    Disconnected,
    ParticipantLeft,
    Stopped,
}

/// A learner message published into the room's data channel.
#[derive(Debug, Deserialize)]
struct InboundRoomMessage {
    #[serde(rename = "type")]
    kind: String,
    content: String,
    language: Option<String>,
}

/// A tutor message published back into the room.
#[derive(Debug, Serialize)]
struct OutboundRoomMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    content: String,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

/// Owns all live rooms and drives one lifecycle task per room.
pub struct RoomManager {
    rooms: StdMutex<HashMap<String, RoomEntry>>,
    transport: Arc<dyn RoomTransport>,
    conversations: Arc<ConversationService>,
    settings: RoomSettings,
}

impl RoomManager {
    pub fn new(
        transport: Arc<dyn RoomTransport>,
        conversations: Arc<ConversationService>,
        settings: RoomSettings,
    ) -> Self {
        Self {
            rooms: StdMutex::new(HashMap::new()),
            transport,
            conversations,
            settings,
        }
    }

    /// Starts a tutoring agent for a room.
    ///
    /// Registers the room, connects, and spawns the lifecycle task. A
    /// connect failure deregisters the room before surfacing, so a failed
    /// start never leaves a registered-but-dead entry. A request for a room
    /// that is already live is a no-op.
    pub async fn start_room_agent(
        self: &Arc<Self>,
        room_id: &str,
        language: &str,
        token: &str,
        server_url: &str,
    ) -> Result<StartOutcome, LifecycleError> {
        let profile = profile::resolve(language);

        {
            let mut rooms = self.lock_rooms();
            if let Some(entry) = rooms.get(room_id) {
                info!(room = %room_id, started_at = %entry.started_at, "agent already running for room");
                return Ok(StartOutcome::AlreadyRunning);
            }
            rooms.insert(
                room_id.to_string(),
                RoomEntry {
                    language: profile.code,
                    started_at: Utc::now(),
                    lifecycle: None,
                },
            );
        }

        // CONNECTING
        let (connection, events) = match self
            .transport
            .connect(server_url, token, &ConnectOptions::default())
            .await
        {
            Ok(connected) => connected,
            Err(err) => {
                self.remove_entry(room_id);
                error!(room = %room_id, error = %err, "room connect failed");
                return Err(err);
            }
        };
        info!(room = %room_id, language = profile.code, "room connected, awaiting participant");

        let manager = Arc::clone(self);
        let lifecycle_room = room_id.to_string();
        let handle = tokio::spawn(async move {
            run_lifecycle(manager, lifecycle_room, profile, connection, events).await;
        });

        // Record the task handle unless the room was stopped in the window
        // between connect and spawn; the task notices removal on its own.
        if let Ok(mut rooms) = self.rooms.lock() {
            if let Some(entry) = rooms.get_mut(room_id) {
                entry.lifecycle = Some(handle);
            }
        }

        Ok(StartOutcome::Started)
    }

    /// Requests teardown of a room's agent by deregistering it; the
    /// lifecycle task notices within one poll interval and tears down.
    pub fn stop_room_agent(&self, room_id: &str) -> bool {
        match self.lock_rooms().remove(room_id) {
            Some(entry) => {
                let finished = entry
                    .lifecycle
                    .as_ref()
                    .is_some_and(JoinHandle::is_finished);
                info!(room = %room_id, lifecycle_finished = finished, "room agent stop requested");
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.lock_rooms().contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.lock_rooms().len()
    }

    pub fn room_language(&self, room_id: &str) -> Option<&'static str> {
        self.lock_rooms().get(room_id).map(|entry| entry.language)
    }

    fn remove_entry(&self, room_id: &str) -> bool {
        self.lock_rooms().remove(room_id).is_some()
    }

    fn lock_rooms(&self) -> std::sync::MutexGuard<'_, HashMap<String, RoomEntry>> {
        match self.rooms.lock() {
            Ok(rooms) => rooms,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn run_lifecycle(
    manager: Arc<RoomManager>,
    room_id: String,
    profile: &'static LanguageProfile,
    connection: Box<dyn RoomConnection>,
    mut events: mpsc::Receiver<RoomEvent>,
) {
    let reason = drive_room(&manager, &room_id, profile, connection.as_ref(), &mut events).await;
    info!(room = %room_id, reason = ?reason, "room lifecycle ended, tearing down");

    // TEARDOWN: deregister, drop the room's conversation session, disconnect.
    manager.remove_entry(&room_id);
    if manager.conversations.remove_session(&room_id) {
        debug!(room = %room_id, "removed room conversation session");
    }
    connection.disconnect().await;
}

/// Runs `AWAITING_PARTICIPANT` and `ACTIVE`; returns the teardown reason.
async fn drive_room(
    manager: &RoomManager,
    room_id: &str,
    profile: &'static LanguageProfile,
    connection: &dyn RoomConnection,
    events: &mut mpsc::Receiver<RoomEvent>,
) -> TeardownReason {
    // AWAITING_PARTICIPANT
    let wait_for_participant = async {
        loop {
            match events.recv().await {
                Some(RoomEvent::ParticipantConnected { identity }) => break Some(identity),
                Some(RoomEvent::Disconnected) | None => break None,
                Some(_) => {}
            }
        }
    };
    let joined = match manager.settings.participant_timeout {
        Some(bound) => match tokio::time::timeout(bound, wait_for_participant).await {
            Ok(joined) => joined,
            Err(_) => {
                info!(room = %room_id, "no participant joined within the timeout");
                return TeardownReason::ParticipantTimeout;
            }
        },
        None => wait_for_participant.await,
    };
    let Some(identity) = joined else {
        return TeardownReason::Disconnected;
    };

    // ACTIVE
    info!(
        room = %room_id,
        participant = %identity,
        language = profile.code,
        "participant joined, starting tutoring agent"
    );
    let mut participants: usize = 1;
    let mut poll = tokio::time::interval(manager.settings.poll_interval);
    poll.tick().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                None | Some(RoomEvent::Disconnected) => return TeardownReason::Disconnected,
                Some(RoomEvent::ParticipantConnected { identity }) => {
                    participants += 1;
                    debug!(room = %room_id, participant = %identity, "participant joined");
                }
                Some(RoomEvent::ParticipantDisconnected { identity }) => {
                    participants = participants.saturating_sub(1);
                    debug!(room = %room_id, participant = %identity, "participant left");
                    if participants == 0 {
                        return TeardownReason::ParticipantLeft;
                    }
                }
                Some(RoomEvent::Data(payload)) => {
                    handle_room_data(manager, room_id, profile, connection, payload).await;
                }
                Some(RoomEvent::Connected) => {}
            },
            _ = poll.tick() => {
                // The registry entry disappearing is an external stop request.
                if !manager.contains(room_id) {
                    return TeardownReason::Stopped;
                }
            }
        }
    }
}

/// Runs one learner message through the pipeline and publishes the reply.
async fn handle_room_data(
    manager: &RoomManager,
    room_id: &str,
    profile: &'static LanguageProfile,
    connection: &dyn RoomConnection,
    payload: Bytes,
) {
    let message: InboundRoomMessage = match serde_json::from_slice(&payload) {
        Ok(message) => message,
        Err(err) => {
            debug!(room = %room_id, error = %err, "ignoring unparseable room data");
            return;
        }
    };
    if message.kind != "text" {
        debug!(room = %room_id, kind = %message.kind, "ignoring non-text room data");
        return;
    }

    let language = message
        .language
        .unwrap_or_else(|| profile.code.to_string());

    debug!(room = %room_id, "turn started");
    match manager
        .conversations
        .submit_text(room_id, &language, message.content)
        .await
    {
        Ok(result) => {
            let timestamp = Utc::now().timestamp_millis();
            publish_message(
                connection,
                room_id,
                OutboundRoomMessage {
                    kind: "text",
                    content: result.reply_text,
                    timestamp,
                    url: None,
                },
            )
            .await;
            if let Some(url) = result.audio_url {
                publish_message(
                    connection,
                    room_id,
                    OutboundRoomMessage {
                        kind: "audio",
                        content: url.clone(),
                        timestamp,
                        url: Some(url),
                    },
                )
                .await;
            }
        }
        Err(SubmitError::Superseded) => {
            debug!(room = %room_id, "turn superseded by a newer message");
        }
        Err(err) => {
            warn!(room = %room_id, error = %err, "turn failed");
        }
    }
    debug!(room = %room_id, "turn ended");
}

async fn publish_message(
    connection: &dyn RoomConnection,
    room_id: &str,
    message: OutboundRoomMessage,
) {
    match serde_json::to_vec(&message) {
        Ok(encoded) => {
            if let Err(err) = connection.publish_data(Bytes::from(encoded)).await {
                warn!(room = %room_id, error = %err, "failed to publish message to room");
            }
        }
        Err(err) => {
            warn!(room = %room_id, error = %err, "failed to encode room message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ResponsePipeline;
    use async_trait::async_trait;
    use laingfy_core::llm::MockLanguageModel;
    use laingfy_core::speech::MockSpeechSynthesizer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct TestConnection {
        published: Arc<StdMutex<Vec<String>>>,
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RoomConnection for TestConnection {
        async fn publish_data(&self, payload: Bytes) -> Result<(), LifecycleError> {
            let text = String::from_utf8(payload.to_vec()).expect("utf-8 payload");
            self.published.lock().unwrap().push(text);
            Ok(())
        }

        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TestTransport {
        fail_connect: bool,
        connection: TestConnection,
        event_tx: StdMutex<Option<mpsc::Sender<RoomEvent>>>,
    }

    impl TestTransport {
        fn new(fail_connect: bool) -> Self {
            Self {
                fail_connect,
                connection: TestConnection::default(),
                event_tx: StdMutex::new(None),
            }
        }

        fn events(&self) -> mpsc::Sender<RoomEvent> {
            self.event_tx
                .lock()
                .unwrap()
                .clone()
                .expect("connect was called")
        }
    }

    #[async_trait]
    impl RoomTransport for TestTransport {
        async fn connect(
            &self,
            _server_url: &str,
            _token: &str,
            _options: &ConnectOptions,
        ) -> Result<(Box<dyn RoomConnection>, mpsc::Receiver<RoomEvent>), LifecycleError> {
            if self.fail_connect {
                return Err(LifecycleError::Connect("connection refused".to_string()));
            }
            let (tx, rx) = mpsc::channel(16);
            *self.event_tx.lock().unwrap() = Some(tx);
            Ok((Box::new(self.connection.clone()), rx))
        }
    }

    fn conversations() -> Arc<ConversationService> {
        let pipeline = Arc::new(ResponsePipeline::new(
            Arc::new(MockLanguageModel::new("Great sentence! Keep going.")),
            Arc::new(MockSpeechSynthesizer::new(&b"mp3"[..])),
            None,
        ));
        Arc::new(ConversationService::new(pipeline, None))
    }

    fn manager(transport: Arc<TestTransport>, timeout: Option<Duration>) -> Arc<RoomManager> {
        Arc::new(RoomManager::new(
            transport,
            conversations(),
            RoomSettings {
                participant_timeout: timeout,
                poll_interval: Duration::from_millis(20),
            },
        ))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    #[tokio::test]
    async fn connect_failure_surfaces_and_leaves_registry_clean() {
        let transport = Arc::new(TestTransport::new(true));
        let manager = manager(transport, Some(Duration::from_millis(100)));

        let err = manager
            .start_room_agent("de", "German", "tok", "wss://rooms.example")
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Connect(_)));
        assert_eq!(manager.room_count(), 0);
    }

    #[tokio::test]
    async fn second_start_for_live_room_is_a_no_op() {
        let transport = Arc::new(TestTransport::new(false));
        let manager = manager(Arc::clone(&transport), Some(Duration::from_secs(5)));

        let first = manager
            .start_room_agent("de", "German", "tok", "wss://rooms.example")
            .await
            .unwrap();
        assert_eq!(first, StartOutcome::Started);
        assert_eq!(manager.room_language("de"), Some("de"));

        let second = manager
            .start_room_agent("de", "German", "tok", "wss://rooms.example")
            .await
            .unwrap();
        assert_eq!(second, StartOutcome::AlreadyRunning);
        assert_eq!(manager.room_count(), 1);

        manager.stop_room_agent("de");
    }

    #[tokio::test]
    async fn participant_timeout_tears_down_without_error() {
        let transport = Arc::new(TestTransport::new(false));
        let manager = manager(Arc::clone(&transport), Some(Duration::from_millis(40)));

        manager
            .start_room_agent("de", "German", "tok", "wss://rooms.example")
            .await
            .unwrap();
        assert_eq!(manager.room_count(), 1);

        settle().await;

        assert_eq!(manager.room_count(), 0);
        assert_eq!(transport.connection.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn learner_message_produces_published_reply() {
        let transport = Arc::new(TestTransport::new(false));
        let manager = manager(Arc::clone(&transport), Some(Duration::from_secs(5)));

        manager
            .start_room_agent("en", "English", "tok", "wss://rooms.example")
            .await
            .unwrap();

        let events = transport.events();
        events
            .send(RoomEvent::ParticipantConnected {
                identity: "learner-1".to_string(),
            })
            .await
            .unwrap();
        events
            .send(RoomEvent::Data(Bytes::from_static(
                br#"{"type":"text","content":"I goed to the park","language":"English"}"#,
            )))
            .await
            .unwrap();
        settle().await;

        let published = transport.connection.published.lock().unwrap().clone();
        assert_eq!(published.len(), 1);
        assert!(published[0].contains("Great sentence! Keep going."));
        assert!(published[0].contains("\"type\":\"text\""));

        // Last participant leaving tears the room down.
        events
            .send(RoomEvent::ParticipantDisconnected {
                identity: "learner-1".to_string(),
            })
            .await
            .unwrap();
        settle().await;

        assert_eq!(manager.room_count(), 0);
        assert_eq!(transport.connection.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_text_room_data_is_ignored() {
        let transport = Arc::new(TestTransport::new(false));
        let manager = manager(Arc::clone(&transport), Some(Duration::from_secs(5)));

        manager
            .start_room_agent("en", "English", "tok", "wss://rooms.example")
            .await
            .unwrap();

        let events = transport.events();
        events
            .send(RoomEvent::ParticipantConnected {
                identity: "learner-1".to_string(),
            })
            .await
            .unwrap();
        events
            .send(RoomEvent::Data(Bytes::from_static(
                br#"{"type":"audio","content":"blob:..."}"#,
            )))
            .await
            .unwrap();
        settle().await;

        assert!(transport.connection.published.lock().unwrap().is_empty());
        manager.stop_room_agent("en");
    }

    #[tokio::test]
    async fn external_stop_is_noticed_by_the_poll_loop() {
        let transport = Arc::new(TestTransport::new(false));
        let manager = manager(Arc::clone(&transport), Some(Duration::from_secs(5)));

        manager
            .start_room_agent("de", "German", "tok", "wss://rooms.example")
            .await
            .unwrap();
        let events = transport.events();
        events
            .send(RoomEvent::ParticipantConnected {
                identity: "learner-1".to_string(),
            })
            .await
            .unwrap();
        settle().await;

        assert!(manager.stop_room_agent("de"));
        settle().await;

        assert_eq!(transport.connection.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(manager.room_count(), 0);
    }

    #[tokio::test]
    async fn disconnection_while_waiting_tears_down() {
        let transport = Arc::new(TestTransport::new(false));
        let manager = manager(Arc::clone(&transport), None);

        manager
            .start_room_agent("de", "German", "tok", "wss://rooms.example")
            .await
            .unwrap();
        transport
            .events()
            .send(RoomEvent::Disconnected)
            .await
            .unwrap();
        settle().await;

        assert_eq!(manager.room_count(), 0);
        assert_eq!(transport.connection.disconnects.load(Ordering::SeqCst), 1);
    }
}
