//! In-memory session store: useful for testing and ephemeral deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobrelay_core::error::StoreError;
use jobrelay_core::session::{
    ContextSession, ContextSessionStore, NewContextSession, next_access_time,
};
use std::cmp::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// An in-memory store that keeps sessions in a Vec.
///
/// Each mutation runs under a single write-lock section, which gives the
/// same read-modify-write atomicity a durable backend provides per row.
#[derive(Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<Vec<ContextSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Issue a new session expiring `ttl` from now.
    pub async fn issue(&self, new: NewContextSession) -> Result<ContextSession, StoreError> {
        let now = Utc::now();
        let expires_at = crate::expiry_after(now, new.ttl)?;
        let session = ContextSession {
            id: Uuid::new_v4().to_string(),
            session_token: new.session_token.unwrap_or_else(crate::generate_token),
            context_data: new.context_data,
            bound_identity: None,
            is_active: true,
            expires_at,
            last_accessed_at: now,
            conversation_started: false,
            created_at: now,
        };
        self.insert(session.clone()).await?;
        Ok(session)
    }

    /// Insert a fully specified session. Tokens must be unique.
    pub async fn insert(&self, session: ContextSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        if sessions
            .iter()
            .any(|s| s.session_token == session.session_token || s.id == session.id)
        {
            return Err(StoreError::WriteFailed(format!(
                "duplicate session token or id: {}",
                session.session_token
            )));
        }
        sessions.push(session);
        Ok(())
    }

    /// Soft-delete a session by token. Returns whether a row changed.
    pub async fn deactivate(&self, token: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions
            .iter_mut()
            .find(|s| s.session_token == token && s.is_active)
        {
            Some(s) => {
                s.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch a session by token regardless of resolvability (for inspection).
    pub async fn get_by_token(&self, token: &str) -> Result<Option<ContextSession>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.iter().find(|s| s.session_token == token).cloned())
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Apply `update` to a resolvable session under the write lock.
    async fn mutate<F>(&self, session_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut ContextSession, DateTime<Utc>),
    {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        match sessions
            .iter_mut()
            .find(|s| s.id == session_id && s.is_resolvable_at(now))
        {
            Some(s) => {
                update(s, now);
                true
            }
            None => false,
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Fallback preference: latest access, then latest creation, then smallest id.
fn fallback_order(a: &ContextSession, b: &ContextSession) -> Ordering {
    b.last_accessed_at
        .cmp(&a.last_accessed_at)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl ContextSessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<ContextSession>, StoreError> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        Ok(sessions
            .iter()
            .find(|s| s.session_token == token && s.is_resolvable_at(now))
            .cloned())
    }

    async fn find_latest_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<ContextSession>, StoreError> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        Ok(sessions
            .iter()
            .filter(|s| s.bound_identity.as_deref() == Some(identity) && s.is_resolvable_at(now))
            .min_by(|a, b| fallback_order(a, b))
            .cloned())
    }

    async fn bind_and_touch(&self, session_id: &str, identity: &str) -> Result<bool, StoreError> {
        Ok(self
            .mutate(session_id, |s, now| {
                s.bound_identity = Some(identity.to_string());
                s.conversation_started = true;
                s.last_accessed_at = next_access_time(s.last_accessed_at, now);
            })
            .await)
    }

    async fn touch(&self, session_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .mutate(session_id, |s, now| {
                s.last_accessed_at = next_access_time(s.last_accessed_at, now);
            })
            .await)
    }
}
