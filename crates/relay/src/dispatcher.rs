//! Outbound dispatchers.
//!
//! `WebhookDispatcher` POSTs each envelope as JSON to the automation
//! endpoint exactly once, bounded by a timeout. When a signing secret is
//! configured the request carries `X-Relay-Signature: sha256=<hex>`, an
//! HMAC-SHA256 of the raw body.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use jobrelay_core::envelope::{Dispatcher, Envelope};
use jobrelay_core::error::DispatchError;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the outbound body signature.
pub const SIGNATURE_HEADER: &str = "X-Relay-Signature";

/// Longest response body kept in a `DispatchError::Status`.
const MAX_ERROR_BODY: usize = 512;

/// POSTs envelopes to an HTTP endpoint.
pub struct WebhookDispatcher {
    endpoint_url: String,
    timeout: Duration,
    signing_secret: Option<String>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn try_new(
        endpoint_url: impl Into<String>,
        timeout: Duration,
        signing_secret: Option<String>,
    ) -> Result<Self, DispatchError> {
        let endpoint_url = endpoint_url.into();
        if endpoint_url.trim().is_empty() {
            return Err(DispatchError::NotConfigured(
                "dispatch endpoint URL is empty".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint_url,
            timeout,
            signing_secret: signing_secret.filter(|s| !s.is_empty()),
            client,
        })
    }

    fn map_transport_error(&self, e: reqwest::Error) -> DispatchError {
        if e.is_timeout() {
            DispatchError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            DispatchError::Network(e.to_string())
        }
    }
}

/// Hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn dispatch(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        let body =
            serde_json::to_vec(envelope).map_err(|e| DispatchError::Serialization(e.to_string()))?;

        let mut request = self
            .client
            .post(&self.endpoint_url)
            .header("Content-Type", "application/json")
            .header(
                "User-Agent",
                concat!("jobrelay/", env!("CARGO_PKG_VERSION")),
            );

        if let Some(secret) = &self.signing_secret {
            request = request.header(SIGNATURE_HEADER, format!("sha256={}", sign_body(secret, &body)));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(DispatchError::Status {
                status_code: status.as_u16(),
                body,
            });
        }

        debug!(
            endpoint = %self.endpoint_url,
            status = %status,
            sender = %envelope.sender_id,
            "Envelope delivered"
        );
        Ok(())
    }
}

/// Dispatcher used when no endpoint is configured. Drops every envelope.
pub struct NoopDispatcher;

#[async_trait]
impl Dispatcher for NoopDispatcher {
    fn name(&self) -> &str {
        "noop"
    }

    async fn dispatch(&self, envelope: &Envelope) -> Result<(), DispatchError> {
        debug!(sender = %envelope.sender_id, "No dispatch endpoint configured, dropping envelope");
        Ok(())
    }
}
