//! Local session lifecycle.
//!
//! A session is created at login, slides forward on activity and is dropped
//! at logout or once expired. It is persisted so the CLI and app survive
//! restarts without signing in again.

use std::sync::Arc;
use std::time::Duration;

use crate::config::DEFAULT_SESSION_TTL;
use crate::error::{Error, Result};
use crate::models::Session;
use crate::store::KvStore;
use crate::util::{normalize_text_option, unix_millis_now};

/// Key-value key the session is stored under.
pub const SESSION_KEY: &str = "session";

pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> Result<Option<Session>>;
    fn save_session(&self, session: &Session) -> Result<()>;
    fn clear_session(&self) -> Result<()>;
}

/// [`SessionPersistence`] over the device key-value store.
pub struct KvSessionStore<S: KvStore> {
    store: Arc<S>,
}

impl<S: KvStore> Clone for KvSessionStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KvStore> KvSessionStore<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S: KvStore + 'static> SessionPersistence for KvSessionStore<S> {
    fn load_session(&self) -> Result<Option<Session>> {
        match self.store.get(SESSION_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save_session(&self, session: &Session) -> Result<()> {
        self.store.set(SESSION_KEY, &serde_json::to_vec(session)?)
    }

    fn clear_session(&self) -> Result<()> {
        self.store.remove(SESSION_KEY)
    }
}

/// Who is signing in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub display_name: Option<String>,
    pub assigned_zone: Option<String>,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct SessionManager<P: SessionPersistence> {
    store: P,
    ttl: Duration,
}

impl<P: SessionPersistence> SessionManager<P> {
    pub const fn new(store: P) -> Self {
        Self::with_ttl(store, DEFAULT_SESSION_TTL)
    }

    pub const fn with_ttl(store: P, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn login(&self, credentials: Credentials) -> Result<Session> {
        self.login_at(credentials, unix_millis_now())
    }

    /// Create and persist a session, replacing any previous one.
    pub fn login_at(&self, credentials: Credentials, now_ms: i64) -> Result<Session> {
        let user_id = credentials.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(Error::InvalidInput("User id cannot be empty".to_string()));
        }
        let display_name =
            normalize_text_option(credentials.display_name).unwrap_or_else(|| user_id.clone());

        let session = Session {
            user_id,
            display_name,
            assigned_zone: normalize_text_option(credentials.assigned_zone),
            is_admin: credentials.is_admin,
            expires_at: now_ms.saturating_add(self.ttl_ms()),
        };
        self.store.save_session(&session)?;
        tracing::info!(
            "Signed in as {} (admin: {})",
            session.user_id,
            session.is_admin
        );
        Ok(session)
    }

    pub fn restore(&self) -> Result<Option<Session>> {
        self.restore_at(unix_millis_now())
    }

    /// Load the persisted session. An expired session is cleared and
    /// reported as absent.
    pub fn restore_at(&self, now_ms: i64) -> Result<Option<Session>> {
        let Some(session) = self.store.load_session()? else {
            return Ok(None);
        };

        if session.is_expired_at(now_ms) {
            tracing::info!("Stored session for {} expired", session.user_id);
            self.store.clear_session()?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub fn touch(&self) -> Result<Session> {
        self.touch_at(unix_millis_now())
    }

    /// Record user activity, sliding the expiry forward.
    pub fn touch_at(&self, now_ms: i64) -> Result<Session> {
        let Some(mut session) = self.store.load_session()? else {
            return Err(Error::NotFound("No active session".to_string()));
        };

        if session.is_expired_at(now_ms) {
            self.store.clear_session()?;
            return Err(Error::SessionExpired);
        }

        session.refresh(now_ms, self.ttl_ms());
        self.store.save_session(&session)?;
        Ok(session)
    }

    pub fn logout(&self) -> Result<()> {
        self.store.clear_session()?;
        tracing::info!("Signed out");
        Ok(())
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}
