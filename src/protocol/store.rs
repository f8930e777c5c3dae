use std::collections::HashMap;
use std::sync::RwLock;

use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::response::EidResult;
use super::session::AuthenticationSession;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("too many open sessions")]
    TooManyOpenSessions,
    #[error("no session stored for request id {0}")]
    UnknownSession(String),
    #[error("session store lock poisoned")]
    Poisoned,
}

/// Keyed store for in-flight authentication sessions.
///
/// Safe for concurrent store/lookup/remove. Capacity is bounded: storing a
/// new session beyond the bound fails, re-storing an existing one never
/// does. Sessions older than the configured timeout are evicted whenever
/// new ones are admitted.
pub struct SessionStore {
    max_sessions: usize,
    timeout: Duration,
    sessions: RwLock<HashMap<String, AuthenticationSession>>,
}

impl SessionStore {
    pub fn new(max_sessions: usize, timeout: Duration) -> Self {
        SessionStore {
            max_sessions,
            timeout,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    fn expired(&self, session: &AuthenticationSession, now: OffsetDateTime) -> bool {
        now - session.created > self.timeout
    }

    /// Insert or update a session. New sessions count against the capacity
    /// bound; updates to an already-stored request id do not.
    pub fn store(&self, session: AuthenticationSession) -> Result<(), Error> {
        let mut sessions = self.sessions.write().map_err(|_| Error::Poisoned)?;
        let now = OffsetDateTime::now_utc();
        sessions.retain(|_, s| {
            let keep = now - s.created <= self.timeout;
            if !keep {
                debug!("{}session expired, evicting", s.log_prefix);
            }
            keep
        });
        if !sessions.contains_key(&session.request_id) && sessions.len() >= self.max_sessions {
            return Err(Error::TooManyOpenSessions);
        }
        sessions.insert(session.request_id.clone(), session);
        Ok(())
    }

    /// Fetch a copy of the session for `request_id`, if present and not yet
    /// expired.
    pub fn lookup(&self, request_id: &str) -> Result<Option<AuthenticationSession>, Error> {
        let sessions = self.sessions.read().map_err(|_| Error::Poisoned)?;
        let now = OffsetDateTime::now_utc();
        Ok(sessions
            .get(request_id)
            .filter(|s| !self.expired(s, now))
            .cloned())
    }

    pub fn remove(&self, request_id: &str) -> Result<Option<AuthenticationSession>, Error> {
        let mut sessions = self.sessions.write().map_err(|_| Error::Poisoned)?;
        Ok(sessions.remove(request_id))
    }

    /// Attach the asynchronously produced result to a stored session.
    pub fn attach_result(&self, request_id: &str, result: EidResult) -> Result<(), Error> {
        let mut sessions = self.sessions.write().map_err(|_| Error::Poisoned)?;
        match sessions.get_mut(request_id) {
            Some(session) => {
                session.result = Some(result);
                Ok(())
            }
            None => Err(Error::UnknownSession(request_id.to_string())),
        }
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}
