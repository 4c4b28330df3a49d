//! Context sessions: the mapping from a referral token to a job context.
//!
//! A session is issued when a job posting's deep link is generated and
//! carries the job details that should accompany every conversation
//! resolved to it. Sessions expire; nothing in the relay deletes them.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Job details attached to a conversation.
///
/// `jobTitle` and `company` are the two attributes every downstream
/// consumer reads; anything else the issuing flow recorded is kept
/// verbatim in `attributes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,

    /// Remaining job attributes (location, salary, description, ...)
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl JobContext {
    pub fn new(job_title: impl Into<String>, company: impl Into<String>) -> Self {
        Self {
            job_title: Some(job_title.into()),
            company: Some(company.into()),
            attributes: serde_json::Map::new(),
        }
    }

    /// Add a free-form job attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A stored context session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSession {
    /// Internal row identity, used by mutations
    pub id: String,

    /// Externally issued token carried in the referral deep link
    pub session_token: String,

    /// Job details for conversations resolved to this session
    pub context_data: JobContext,

    /// Messaging-platform user currently associated with this session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_identity: Option<String>,

    /// Manual deactivation flag
    pub is_active: bool,

    /// Hard expiry
    pub expires_at: DateTime<Utc>,

    /// Updated on every successful resolution
    pub last_accessed_at: DateTime<Utc>,

    /// Flipped the first time a referral resolves to this session
    pub conversation_started: bool,

    pub created_at: DateTime<Utc>,
}

impl ContextSession {
    /// Whether the session may be returned by a lookup at `now`.
    pub fn is_resolvable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// Parameters for issuing a new session.
#[derive(Debug, Clone)]
pub struct NewContextSession {
    /// Token to use; a random one is generated when `None`
    pub session_token: Option<String>,
    pub context_data: JobContext,
    pub ttl: Duration,
}

impl NewContextSession {
    pub fn new(context_data: JobContext, ttl: Duration) -> Self {
        Self {
            session_token: None,
            context_data,
            ttl,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

/// The timestamp a touch should record.
///
/// Never earlier than one microsecond past `previous`, so the access time of
/// a session strictly increases even when the clock does not.
pub fn next_access_time(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = previous + Duration::microseconds(1);
    if now > floor { now } else { floor }
}

/// Durable store of context sessions.
///
/// Every lookup filters on resolvability (active and unexpired) and every
/// mutation is a single atomic conditional update. Implementations: SQLite,
/// in-memory (for testing).
#[async_trait]
pub trait ContextSessionStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Look up a resolvable session by its unique token.
    async fn find_by_token(&self, token: &str) -> Result<Option<ContextSession>, StoreError>;

    /// The resolvable session bound to `identity` with the greatest
    /// `last_accessed_at`. Ties go to the most recently created session,
    /// then to the smallest id.
    async fn find_latest_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<ContextSession>, StoreError>;

    /// Bind `identity` to the session, mark the conversation started and
    /// touch it. Returns `false` when the session is no longer resolvable.
    async fn bind_and_touch(&self, session_id: &str, identity: &str) -> Result<bool, StoreError>;

    /// Update `last_accessed_at` without changing the binding. Returns
    /// `false` when the session is no longer resolvable.
    async fn touch(&self, session_id: &str) -> Result<bool, StoreError>;
}
