//! Facebook Messenger channel adapter.
//!
//! Parses page webhook deliveries into inbound messages, answers the
//! subscription handshake, and validates `X-Hub-Signature-256` headers.

use hmac::{Hmac, Mac};
use jobrelay_core::error::ChannelError;
use jobrelay_core::message::{Attachment, InboundMessage, Referral};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the platform's body signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Deserialize)]
struct WebhookBody {
    object: String,
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Deserialize)]
struct MessagingEvent {
    sender: Option<Participant>,
    message: Option<MessagePayload>,
    /// Referral delivered alongside the event rather than inside the message
    referral: Option<Referral>,
}

#[derive(Debug, Deserialize)]
struct Participant {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    text: Option<String>,
    #[serde(default)]
    attachments: Vec<Attachment>,
    referral: Option<Referral>,
    #[serde(default)]
    is_echo: bool,
}

/// Extract every user message from a page webhook delivery.
///
/// Echoes of the page's own messages and non-message events (delivery and
/// read receipts, postbacks) are skipped.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<InboundMessage>, ChannelError> {
    let body: WebhookBody = serde_json::from_slice(body)
        .map_err(|e| ChannelError::InvalidPayload(format!("malformed webhook body: {e}")))?;

    if body.object != "page" {
        return Err(ChannelError::InvalidPayload(format!(
            "unsupported webhook object '{}'",
            body.object
        )));
    }

    let mut messages = Vec::new();
    for event in body.entry.into_iter().flat_map(|e| e.messaging) {
        let Some(message) = event.message else {
            debug!("Skipping non-message event");
            continue;
        };
        if message.is_echo {
            continue;
        }

        let sender_id = event
            .sender
            .and_then(|s| s.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ChannelError::InvalidPayload("message event without sender.id".into()))?;

        // Prefer the message-level referral, but a blank one must not hide
        // a usable event-level ref
        let referral = [message.referral, event.referral]
            .into_iter()
            .flatten()
            .find(|r| r.token().is_some());

        messages.push(InboundMessage {
            sender_id,
            text: message.text,
            attachments: message.attachments,
            referral,
        });
    }

    Ok(messages)
}

/// Answer the webhook subscription handshake.
///
/// Returns the challenge to echo back when `mode` is `subscribe` and the
/// token matches the configured verify token.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    if expected_token.is_empty() {
        return None;
    }
    match (mode, token, challenge) {
        (Some("subscribe"), Some(token), Some(challenge)) if token == expected_token => {
            Some(challenge.to_string())
        }
        _ => None,
    }
}

/// Validate an `X-Hub-Signature-256` header against the app secret.
///
/// Accepts `sha256=<hex>`. With no secret configured every request passes.
/// The digest comparison is constant-time.
pub fn validate_signature(secret: Option<&str>, payload: &[u8], header: Option<&str>) -> bool {
    let secret = match secret {
        None | Some("") => return true,
        Some(secret) => secret,
    };

    let Some(sig_hex) = header.and_then(|h| h.trim().strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(provided) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(payload);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn parses_message_with_referral() {
        let payload = body(json!({
            "object": "page",
            "entry": [{
                "id": "page-1",
                "time": 1700000000,
                "messaging": [{
                    "sender": { "id": "fb-42" },
                    "recipient": { "id": "page-1" },
                    "timestamp": 1700000000,
                    "message": {
                        "mid": "m-1",
                        "text": "Hi",
                        "referral": { "ref": "tok-123", "source": "SHORTLINK", "type": "OPEN_THREAD" }
                    }
                }]
            }]
        }));

        let messages = parse_webhook(&payload).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, "fb-42");
        assert_eq!(messages[0].text.as_deref(), Some("Hi"));
        assert_eq!(messages[0].referral_token(), Some("tok-123"));
    }

    #[test]
    fn event_level_referral_is_used() {
        let payload = body(json!({
            "object": "page",
            "entry": [{
                "messaging": [{
                    "sender": { "id": "fb-42" },
                    "referral": { "ref": "tok-9" },
                    "message": { "text": "Hello" }
                }]
            }]
        }));

        let messages = parse_webhook(&payload).unwrap();
        assert_eq!(messages[0].referral_token(), Some("tok-9"));
    }

    #[test]
    fn attachments_pass_through() {
        let payload = body(json!({
            "object": "page",
            "entry": [{
                "messaging": [{
                    "sender": { "id": "fb-42" },
                    "message": {
                        "attachments": [{ "type": "file", "payload": { "url": "https://cdn.example.com/cv.pdf" } }]
                    }
                }]
            }]
        }));

        let messages = parse_webhook(&payload).unwrap();
        assert!(messages[0].text.is_none());
        assert_eq!(messages[0].attachments[0].kind, "file");
        assert_eq!(
            messages[0].attachments[0].payload().unwrap()["url"],
            "https://cdn.example.com/cv.pdf"
        );
    }

    #[test]
    fn fallback_attachment_fields_survive() {
        let attachment = json!({
            "type": "fallback",
            "title": "My CV",
            "URL": "https://example.com/cv.pdf",
            "payload": null
        });
        let payload = body(json!({
            "object": "page",
            "entry": [{
                "messaging": [{
                    "sender": { "id": "fb-42" },
                    "message": { "attachments": [attachment.clone()] }
                }]
            }]
        }));

        let messages = parse_webhook(&payload).unwrap();
        let forwarded = serde_json::to_value(&messages[0].attachments).unwrap();
        assert_eq!(forwarded, json!([attachment]));
        assert_eq!(forwarded[0]["title"], "My CV");
    }

    #[test]
    fn null_ref_and_untyped_attachment_do_not_reject_delivery() {
        let payload = body(json!({
            "object": "page",
            "entry": [{
                "messaging": [
                    {
                        "sender": { "id": "fb-42" },
                        "message": {
                            "text": "From an ad",
                            "referral": { "ref": null, "source": "ADS", "type": "OPEN_THREAD" }
                        }
                    },
                    {
                        "sender": { "id": "fb-7" },
                        "message": { "attachments": [{ "payload": { "url": "https://x" } }] }
                    }
                ]
            }]
        }));

        let messages = parse_webhook(&payload).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].referral_token(), None);
        assert_eq!(messages[1].attachments[0].kind, "");
    }

    #[test]
    fn blank_message_referral_falls_back_to_event_referral() {
        let payload = body(json!({
            "object": "page",
            "entry": [{
                "messaging": [{
                    "sender": { "id": "fb-42" },
                    "referral": { "ref": "tok-9" },
                    "message": { "text": "Hello", "referral": { "ref": "  " } }
                }]
            }]
        }));

        let messages = parse_webhook(&payload).unwrap();
        assert_eq!(messages[0].referral_token(), Some("tok-9"));
    }

    #[test]
    fn skips_echoes_and_receipts() {
        let payload = body(json!({
            "object": "page",
            "entry": [{
                "messaging": [
                    { "sender": { "id": "page-1" }, "message": { "text": "Thanks!", "is_echo": true } },
                    { "sender": { "id": "fb-42" }, "delivery": { "watermark": 1700000000 } },
                    { "sender": { "id": "fb-42" }, "read": { "watermark": 1700000000 } },
                    { "sender": { "id": "fb-42" }, "message": { "text": "Real one" } }
                ]
            }, {
                "messaging": [
                    { "sender": { "id": "fb-7" }, "message": { "text": "Other entry" } }
                ]
            }]
        }));

        let messages = parse_webhook(&payload).unwrap();
        let senders: Vec<_> = messages.iter().map(|m| m.sender_id.as_str()).collect();
        assert_eq!(senders, vec!["fb-42", "fb-7"]);
    }

    #[test]
    fn rejects_non_page_object() {
        let err = parse_webhook(&body(json!({ "object": "instagram", "entry": [] }))).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidPayload(_)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            parse_webhook(b"{not json"),
            Err(ChannelError::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_message_without_sender() {
        let payload = body(json!({
            "object": "page",
            "entry": [{ "messaging": [{ "message": { "text": "who am I" } }] }]
        }));
        assert!(matches!(
            parse_webhook(&payload),
            Err(ChannelError::InvalidPayload(_))
        ));
    }

    #[test]
    fn subscription_handshake() {
        assert_eq!(
            verify_subscription(Some("subscribe"), Some("verify-me"), Some("12345"), "verify-me"),
            Some("12345".to_string())
        );
        assert_eq!(
            verify_subscription(Some("subscribe"), Some("wrong"), Some("12345"), "verify-me"),
            None
        );
        assert_eq!(
            verify_subscription(Some("unsubscribe"), Some("verify-me"), Some("12345"), "verify-me"),
            None
        );
        assert_eq!(
            verify_subscription(Some("subscribe"), Some(""), Some("12345"), ""),
            None
        );
    }

    #[test]
    fn signature_validation() {
        let payload = br#"{"object":"page","entry":[]}"#;
        let good = sign("app-secret", payload);

        assert!(validate_signature(Some("app-secret"), payload, Some(&good)));
        assert!(!validate_signature(Some("app-secret"), payload, Some(&sign("other", payload))));
        assert!(!validate_signature(Some("app-secret"), payload, None));
        assert!(!validate_signature(Some("app-secret"), payload, Some("sha256=zz")));
        assert!(!validate_signature(
            Some("app-secret"),
            b"tampered",
            Some(&good)
        ));
    }

    #[test]
    fn no_secret_accepts_everything() {
        assert!(validate_signature(None, b"anything", None));
        assert!(validate_signature(Some(""), b"anything", Some("sha256=00")));
    }
}
