//! Context resolution: which job a conversation belongs to.
//!
//! Resolution runs in strict priority order:
//!
//! 1. **Referral**: the message carries a deep-link token. A resolvable
//!    session with that token is bound to the sender (overwriting any
//!    previous binding) and wins.
//! 2. **Fallback**: the most recently accessed resolvable session already
//!    bound to the sender.
//! 3. **Unresolved**: no context. Organic messages land here; it is not an
//!    error.
//!
//! Store failures never abort resolution. A failing lookup or mutation
//! degrades that path to "not found" and resolution continues with the next
//! one, so a message is always forwarded even during a store outage.
//!
//! Two concurrent messages carrying different referral tokens for the same
//! sender bind in whichever order their updates land (last write wins).

use std::sync::Arc;

use jobrelay_core::session::{ContextSession, ContextSessionStore, JobContext};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Which path produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Referral,
    Fallback,
    Unresolved,
}

/// The outcome of resolving one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub source: ResolutionSource,
    pub session_token: Option<String>,
    pub context: Option<JobContext>,
}

impl Resolution {
    pub fn unresolved() -> Self {
        Self {
            source: ResolutionSource::Unresolved,
            session_token: None,
            context: None,
        }
    }

    fn from_session(source: ResolutionSource, session: ContextSession) -> Self {
        Self {
            source,
            session_token: Some(session.session_token),
            context: Some(session.context_data),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.source != ResolutionSource::Unresolved
    }
}

/// Resolves inbound messages against an injected session store.
#[derive(Clone)]
pub struct ContextResolver {
    store: Arc<dyn ContextSessionStore>,
}

impl ContextResolver {
    pub fn new(store: Arc<dyn ContextSessionStore>) -> Self {
        Self { store }
    }

    /// Resolve the context for a message from `sender`.
    ///
    /// Blank referral tokens are treated as absent.
    pub async fn resolve(&self, sender: &str, referral: Option<&str>) -> Resolution {
        let referral = referral.map(str::trim).filter(|t| !t.is_empty());

        if let Some(token) = referral
            && let Some(resolution) = self.resolve_referral(sender, token).await
        {
            return resolution;
        }

        if let Some(resolution) = self.resolve_fallback(sender).await {
            return resolution;
        }

        debug!(sender = %sender, referral = ?referral, "No context found for sender");
        Resolution::unresolved()
    }

    async fn resolve_referral(&self, sender: &str, token: &str) -> Option<Resolution> {
        let session = match self.store.find_by_token(token).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                info!(token = %token, sender = %sender, "No active context session for referral");
                return None;
            }
            Err(e) => {
                warn!(
                    token = %token,
                    sender = %sender,
                    store = self.store.name(),
                    error = %e,
                    "Referral lookup failed, falling back"
                );
                return None;
            }
        };

        match self.store.bind_and_touch(&session.id, sender).await {
            Ok(true) => {
                if let Some(previous) = session.bound_identity.as_deref()
                    && previous != sender
                {
                    info!(
                        token = %token,
                        previous = %previous,
                        sender = %sender,
                        "Referral rebinds session to a new sender"
                    );
                }
                info!(
                    token = %token,
                    sender = %sender,
                    job_title = ?session.context_data.job_title,
                    company = ?session.context_data.company,
                    "Context resolved from referral"
                );
                Some(Resolution::from_session(ResolutionSource::Referral, session))
            }
            Ok(false) => {
                info!(token = %token, sender = %sender, "Referral session expired before binding");
                None
            }
            Err(e) => {
                warn!(
                    token = %token,
                    sender = %sender,
                    store = self.store.name(),
                    error = %e,
                    "Binding referral session failed, falling back"
                );
                None
            }
        }
    }

    async fn resolve_fallback(&self, sender: &str) -> Option<Resolution> {
        let session = match self.store.find_latest_by_identity(sender).await {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                warn!(
                    sender = %sender,
                    store = self.store.name(),
                    error = %e,
                    "Fallback lookup failed, forwarding without context"
                );
                return None;
            }
        };

        match self.store.touch(&session.id).await {
            Ok(true) => {
                info!(
                    token = %session.session_token,
                    sender = %sender,
                    job_title = ?session.context_data.job_title,
                    company = ?session.context_data.company,
                    "Context resolved from sender's latest session"
                );
                Some(Resolution::from_session(ResolutionSource::Fallback, session))
            }
            Ok(false) => {
                info!(
                    token = %session.session_token,
                    sender = %sender,
                    "Fallback session expired before touch"
                );
                None
            }
            Err(e) => {
                warn!(
                    token = %session.session_token,
                    sender = %sender,
                    store = self.store.name(),
                    error = %e,
                    "Touching fallback session failed, forwarding without context"
                );
                None
            }
        }
    }
}
