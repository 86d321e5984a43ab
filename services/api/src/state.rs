//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the conversation service, the room manager, and
//! the artifact store.

use crate::config::Config;
use crate::room::RoomManager;
use crate::session::ConversationService;
use crate::storage::ArtifactStore;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub conversations: Arc<ConversationService>,
    pub rooms: Arc<RoomManager>,
    /// `None` when audio storage was unreachable at startup; the service
    /// then runs without audio artifacts.
    pub store: Option<Arc<dyn ArtifactStore>>,
    pub config: Arc<Config>,
}
