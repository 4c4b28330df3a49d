//! Envelope construction.

use chrono::{DateTime, SecondsFormat, Utc};
use jobrelay_core::envelope::{Envelope, EnvelopeMessage, MESSENGER_MESSAGE_EVENT, MESSENGER_SOURCE};
use jobrelay_core::message::InboundMessage;
use jobrelay_core::session::JobContext;

/// Build the outbound envelope for one inbound message.
///
/// Absent text becomes an empty string; attachments pass through unchanged.
/// `session_token` and `context` are `None` for unresolved messages.
pub fn build_envelope(
    sender_id: &str,
    session_token: Option<&str>,
    context: Option<&JobContext>,
    message: &InboundMessage,
    timestamp: DateTime<Utc>,
) -> Envelope {
    Envelope {
        event_type: MESSENGER_MESSAGE_EVENT.to_string(),
        timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        sender_id: sender_id.to_string(),
        session_id: session_token.map(str::to_string),
        message: EnvelopeMessage {
            text: message.text.clone().unwrap_or_default(),
            attachments: message.attachments.clone(),
        },
        job_context: context.cloned(),
        source: MESSENGER_SOURCE.to_string(),
    }
}

/// [`build_envelope`] stamped with the current time.
pub fn build_envelope_now(
    sender_id: &str,
    session_token: Option<&str>,
    context: Option<&JobContext>,
    message: &InboundMessage,
) -> Envelope {
    build_envelope(sender_id, session_token, context, message, Utc::now())
}
