//! Envelope: the normalized payload sent to the automation pipeline,
//! and the `Dispatcher` trait that delivers it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::message::Attachment;
use crate::session::JobContext;

/// Event type tag for inbound Messenger messages.
pub const MESSENGER_MESSAGE_EVENT: &str = "messenger_message";

/// Source tag identifying the Messenger channel.
pub const MESSENGER_SOURCE: &str = "facebook_messenger_message";

/// One outbound event per inbound message.
///
/// `session_id` and `job_context` serialize as `null` when the message
/// could not be resolved to a context; consumers must treat that as a
/// normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,

    /// ISO-8601 UTC construction time
    pub timestamp: String,

    pub sender_id: String,

    /// The resolved session token
    pub session_id: Option<String>,

    pub message: EnvelopeMessage,

    pub job_context: Option<JobContext>,

    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// Delivers envelopes to an external automation endpoint.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Human-readable dispatcher name (e.g., "webhook", "noop").
    fn name(&self) -> &str;

    /// Deliver a single envelope. One attempt, no retry.
    async fn dispatch(&self, envelope: &Envelope) -> Result<(), DispatchError>;
}
