//! The session store: opaque, random session ids mapped to a principal with
//! sliding expiration. Kept in-memory (`DashMap`) since a session's scope
//! never needs to survive the gateway process it was minted on, unlike
//! connection tickets and the session log, both represented as cells.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use rand::RngCore;
use titan_primitives::TitanResult;
use uuid::Uuid;

#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub user_id: Uuid,
    pub roles: Vec<String>,
    pub provider: String,
    pub created_at: u64,
    pub expires_at: AtomicMillis,
    pub sliding: bool,
}

/// A plain `u64` of epoch millis behind an atomic so sliding renewal can
/// update a session's expiry without taking a write lock on the map entry.
pub type AtomicMillis = std::sync::atomic::AtomicU64;

fn now_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn random_id() -> String {
    let mut bytes = [0u8; 18];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub struct SessionConfig {
    pub lifetime: Duration,
    pub sliding: bool,
    pub max_per_user: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { lifetime: Duration::from_secs(24 * 3600), sliding: true, max_per_user: 10 }
    }
}

pub struct SessionStore {
    sessions: DashMap<String, Session>,
    by_user: DashMap<Uuid, Vec<String>>,
    config: SessionConfig,
    issued: AtomicU64,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self { sessions: DashMap::new(), by_user: DashMap::new(), config, issued: AtomicU64::new(0) }
    }

    pub fn create(&self, user_id: Uuid, roles: Vec<String>, provider: &str) -> Session {
        let session_id = random_id();
        let now = now_millis();
        let expires_at = now + self.config.lifetime.as_millis() as u64;
        let session = Session {
            session_id: session_id.clone(),
            user_id,
            roles,
            provider: provider.to_string(),
            created_at: now,
            expires_at: AtomicMillis::new(expires_at),
            sliding: self.config.sliding,
        };

        let mut user_sessions = self.by_user.entry(user_id).or_default();
        user_sessions.push(session_id.clone());
        while user_sessions.len() > self.config.max_per_user {
            let oldest = user_sessions.remove(0);
            self.sessions.remove(&oldest);
        }
        drop(user_sessions);

        self.issued.fetch_add(1, Ordering::Relaxed);
        let snapshot = clone_session(&session);
        self.sessions.insert(session_id, session);
        snapshot
    }

    /// Validates `session_id`, touching its sliding expiry on success.
    /// Expired or unknown sessions return `NotFound` per the rate-limit
    /// propagation rule that non-retryable failures stay specific.
    pub fn validate(&self, session_id: &str) -> TitanResult<Session> {
        let entry = self.sessions.get(session_id).ok_or_else(|| titan_primitives::TitanError::unauthorized("unknown session"))?;
        let now = now_millis();
        if entry.expires_at.load(Ordering::Relaxed) < now {
            drop(entry);
            self.sessions.remove(session_id);
            return Err(titan_primitives::TitanError::unauthorized("session expired"));
        }
        if entry.sliding {
            entry.expires_at.store(now + self.config.lifetime.as_millis() as u64, Ordering::Relaxed);
        }
        Ok(clone_session(&entry))
    }

    pub fn invalidate(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            if let Some(mut ids) = self.by_user.get_mut(&session.user_id) {
                ids.retain(|id| id != session_id);
            }
        }
    }

    pub fn invalidate_all(&self, user_id: Uuid) -> usize {
        let Some((_, ids)) = self.by_user.remove(&user_id) else {
            return 0;
        };
        for id in &ids {
            self.sessions.remove(id);
        }
        ids.len()
    }
}

fn clone_session(s: &Session) -> Session {
    Session {
        session_id: s.session_id.clone(),
        user_id: s.user_id,
        roles: s.roles.clone(),
        provider: s.provider.clone(),
        created_at: s.created_at,
        expires_at: AtomicMillis::new(s.expires_at.load(Ordering::Relaxed)),
        sliding: s.sliding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_session_validates_and_survives_a_lookup() {
        let store = SessionStore::new(SessionConfig::default());
        let user_id = Uuid::new_v4();
        let session = store.create(user_id, vec!["player".into()], "Mock");
        let found = store.validate(&session.session_id).unwrap();
        assert_eq!(found.user_id, user_id);
    }

    #[test]
    fn logging_out_then_validating_fails() {
        let store = SessionStore::new(SessionConfig::default());
        let session = store.create(Uuid::new_v4(), vec![], "Mock");
        store.invalidate(&session.session_id);
        assert!(store.validate(&session.session_id).is_err());
    }

    #[test]
    fn logout_all_invalidates_every_session_for_the_user() {
        let store = SessionStore::new(SessionConfig::default());
        let user_id = Uuid::new_v4();
        let a = store.create(user_id, vec![], "Mock");
        let b = store.create(user_id, vec![], "Mock");
        let invalidated = store.invalidate_all(user_id);
        assert_eq!(invalidated, 2);
        assert!(store.validate(&a.session_id).is_err());
        assert!(store.validate(&b.session_id).is_err());
    }

    #[test]
    fn oldest_session_is_evicted_once_max_per_user_is_exceeded() {
        let store = SessionStore::new(SessionConfig { max_per_user: 1, ..SessionConfig::default() });
        let user_id = Uuid::new_v4();
        let first = store.create(user_id, vec![], "Mock");
        let _second = store.create(user_id, vec![], "Mock");
        assert!(store.validate(&first.session_id).is_err());
    }
}
