use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use live_console_common::{rwlock_read_or_recover, rwlock_write_or_recover};
use tracing::{debug, warn};

use super::{ConsoleSession, SessionId};
use crate::error::SessionError;
use crate::terminal::Size;

pub const DEFAULT_MAX_SESSIONS: usize = 16;

/// Summary of a live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub size: Size,
}

/// Process-wide map from session id to live session.
///
/// Owned by the console context and shared with both transports. Every
/// operation takes the lock for its whole duration and never awaits.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<ConsoleSession>>>,
    max_sessions: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_max_sessions(DEFAULT_MAX_SESSIONS)
    }

    pub fn with_max_sessions(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    pub fn insert(&self, session: Arc<ConsoleSession>) -> Result<(), SessionError> {
        let mut sessions = rwlock_write_or_recover(&self.sessions);
        let id = session.id().clone();
        if sessions.contains_key(&id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::LimitReached(self.max_sessions));
        }
        sessions.insert(id, session);
        Ok(())
    }

    /// Looks up a live session. Absence is not an error.
    pub fn get(&self, session_id: &str) -> Option<Arc<ConsoleSession>> {
        let sessions = rwlock_read_or_recover(&self.sessions);
        sessions.get(&SessionId::from(session_id)).cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<ConsoleSession>> {
        let mut sessions = rwlock_write_or_recover(&self.sessions);
        sessions.remove(&SessionId::from(session_id))
    }

    /// Removes `session` only if it is still the one registered under its id.
    pub fn remove_if_same(&self, session: &Arc<ConsoleSession>) -> bool {
        let mut sessions = rwlock_write_or_recover(&self.sessions);
        let same = sessions
            .get(session.id())
            .is_some_and(|current| Arc::ptr_eq(current, session));
        if same {
            sessions.remove(session.id());
        }
        same
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let sessions = rwlock_read_or_recover(&self.sessions);
        let mut infos: Vec<SessionInfo> = sessions
            .values()
            .map(|session| SessionInfo {
                id: session.id().clone(),
                created_at: session.created_at(),
                size: session.size(),
            })
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        infos
    }

    pub fn len(&self) -> usize {
        rwlock_read_or_recover(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Unregisters and closes every session. Used on host shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<ConsoleSession>> = {
            let mut sessions = rwlock_write_or_recover(&self.sessions);
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in &drained {
            if session.is_closed() {
                continue;
            }
            match session.close() {
                Ok(()) => debug!(session_id = %session.id(), "Closed session on shutdown"),
                Err(e) => warn!(session_id = %session.id(), error = %e, "Failed to close session"),
            }
        }
        drained.len()
    }
}
