//! Shared test helpers for relay tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jobrelay_core::envelope::{Dispatcher, Envelope};
use jobrelay_core::error::{DispatchError, StoreError};
use jobrelay_core::session::{ContextSession, ContextSessionStore, JobContext};
use jobrelay_store::InMemorySessionStore;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A resolvable session bound to nobody, accessed now.
pub fn session(id: &str, token: &str, context: JobContext) -> ContextSession {
    let now = Utc::now();
    ContextSession {
        id: id.into(),
        session_token: token.into(),
        context_data: context,
        bound_identity: None,
        is_active: true,
        expires_at: now + Duration::hours(1),
        last_accessed_at: now,
        conversation_started: false,
        created_at: now,
    }
}

/// Wraps an in-memory store and fails selected operations.
pub struct FlakyStore {
    pub inner: InMemorySessionStore,
    pub fail_token_lookup: AtomicBool,
    pub fail_identity_lookup: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: InMemorySessionStore) -> Self {
        Self {
            inner,
            fail_token_lookup: AtomicBool::new(false),
            fail_identity_lookup: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    fn outage(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ContextSessionStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<ContextSession>, StoreError> {
        Self::outage(&self.fail_token_lookup)?;
        self.inner.find_by_token(token).await
    }

    async fn find_latest_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<ContextSession>, StoreError> {
        Self::outage(&self.fail_identity_lookup)?;
        self.inner.find_latest_by_identity(identity).await
    }

    async fn bind_and_touch(&self, session_id: &str, identity: &str) -> Result<bool, StoreError> {
        Self::outage(&self.fail_writes)?;
        self.inner.bind_and_touch(session_id, identity).await
    }

    async fn touch(&self, session_id: &str) -> Result<bool, StoreError> {
        Self::outage(&self.fail_writes)?;
        self.inner.touch(session_id).await
    }
}

/// Records every envelope; optionally fails each delivery.
pub struct RecordingDispatcher {
    pub envelopes: Mutex<Vec<Envelope>>,
    pub attempts: AtomicUsize,
    failure: Option<DispatchError>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            envelopes: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            failure: None,
        }
    }

    pub fn failing(error: DispatchError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    pub fn last(&self) -> Option<Envelope> {
        self.envelopes.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn dispatch(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.envelopes.lock().unwrap().push(envelope.clone());
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}
