//! Inbound message types: what a messaging channel hands to the relay.

use serde::{Deserialize, Serialize};

/// A message received from a messaging-platform conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform-specific id of the conversation participant
    pub sender_id: String,

    /// The text content (absent for attachment-only messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Attachments (images, files, audio, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Referral data when the conversation was opened from a deep link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<Referral>,
}

impl InboundMessage {
    pub fn text(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            text: Some(text.into()),
            attachments: Vec::new(),
            referral: None,
        }
    }

    pub fn with_referral(mut self, token: impl Into<String>) -> Self {
        self.referral = Some(Referral {
            r#ref: Some(token.into()),
        });
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// The referral token, if one is present and non-blank.
    pub fn referral_token(&self) -> Option<&str> {
        self.referral.as_ref().and_then(Referral::token)
    }
}

/// Deep-link referral data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    /// Ad and chat-plugin referrals may omit `ref` or send it as null
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub r#ref: Option<String>,
}

impl Referral {
    /// The trimmed `ref`, or `None` when it is missing or blank.
    pub fn token(&self) -> Option<&str> {
        self.r#ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// An attachment, kept in the platform's own shape.
///
/// Only `type` is interpreted; every other field (`payload`, `title`,
/// `URL`, ...) is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Platform attachment type ("image", "file", "audio", "fallback", ...)
    #[serde(
        rename = "type",
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "String::is_empty"
    )]
    pub kind: String,

    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Attachment {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Platform payload (usually `{ "url": ... }`)
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.fields.get("payload").filter(|p| !p.is_null())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
