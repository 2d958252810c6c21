use std::sync::Arc;

use crate::rooms::RoomRegistry;
use crate::sessions::{ConnectionLimits, SessionManager};
use crate::state::security_config::SecurityConfig;
use crate::store::StateStore;

/// Application state containing shared resources.
///
/// Every component receives its collaborators here at construction time;
/// there are no globals. Tests build this over the in-memory store.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn StateStore>,
    sessions: Arc<SessionManager>,
    rooms: Arc<RoomRegistry>,
    security: SecurityConfig,
    limits: Arc<ConnectionLimits>,
}

impl AppState {
    pub fn new(store: Arc<dyn StateStore>, security: SecurityConfig) -> Self {
        let sessions = Arc::new(SessionManager::new(store.clone()));
        let rooms = RoomRegistry::new(store.clone(), sessions.clone());
        Self {
            store,
            sessions,
            rooms,
            security,
            limits: Arc::new(ConnectionLimits::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    pub fn limits(&self) -> &Arc<ConnectionLimits> {
        &self.limits
    }
}
