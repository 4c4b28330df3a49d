//! Messaging channel adapters for JobRelay.
//!
//! A channel turns a platform's webhook traffic into [`InboundMessage`]s
//! and handles the platform's webhook security handshakes.
//!
//! Available channels:
//! - **Messenger**: Facebook Messenger page webhooks
//!
//! [`InboundMessage`]: jobrelay_core::message::InboundMessage

pub mod messenger;

pub use messenger::{parse_webhook, validate_signature, verify_subscription};
