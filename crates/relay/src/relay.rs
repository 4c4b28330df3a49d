//! The relay pipeline: resolve, build, dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use jobrelay_core::envelope::Dispatcher;
use jobrelay_core::message::InboundMessage;
use jobrelay_core::session::ContextSessionStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::envelope::build_envelope_now;
use crate::resolver::{ContextResolver, ResolutionSource};

/// Running counters for the relay.
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    referral: AtomicU64,
    fallback: AtomicU64,
    unresolved: AtomicU64,
    dispatched: AtomicU64,
    dispatch_failures: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelayStatsSnapshot {
    pub received: u64,
    pub referral: u64,
    pub fallback: u64,
    pub unresolved: u64,
    pub dispatched: u64,
    pub dispatch_failures: u64,
}

impl RelayStats {
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            referral: self.referral.load(Ordering::Relaxed),
            fallback: self.fallback.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }

    fn record_source(&self, source: ResolutionSource) {
        let counter = match source {
            ResolutionSource::Referral => &self.referral,
            ResolutionSource::Fallback => &self.fallback,
            ResolutionSource::Unresolved => &self.unresolved,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayOutcome {
    pub source: ResolutionSource,
    pub session_token: Option<String>,
    /// Whether the dispatcher accepted the envelope
    pub delivered: bool,
}

/// Handles inbound messages end to end.
///
/// `handle` never fails: resolution degrades to "unresolved" and dispatch
/// failures are logged, so the caller can always acknowledge the platform.
pub struct MessageRelay {
    resolver: ContextResolver,
    dispatcher: Arc<dyn Dispatcher>,
    stats: Arc<RelayStats>,
}

impl MessageRelay {
    pub fn new(store: Arc<dyn ContextSessionStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            resolver: ContextResolver::new(store),
            dispatcher,
            stats: Arc::new(RelayStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    pub async fn handle(&self, message: InboundMessage) -> RelayOutcome {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let resolution = self
            .resolver
            .resolve(&message.sender_id, message.referral_token())
            .await;
        self.stats.record_source(resolution.source);

        let envelope = build_envelope_now(
            &message.sender_id,
            resolution.session_token.as_deref(),
            resolution.context.as_ref(),
            &message,
        );

        let delivered = match self.dispatcher.dispatch(&envelope).await {
            Ok(()) => {
                self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
                info!(
                    sender = %message.sender_id,
                    source = ?resolution.source,
                    session = ?resolution.session_token,
                    dispatcher = self.dispatcher.name(),
                    "Message relayed"
                );
                true
            }
            Err(e) => {
                self.stats.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    sender = %message.sender_id,
                    session = ?resolution.session_token,
                    dispatcher = self.dispatcher.name(),
                    error = %e,
                    "Dispatch failed, message dropped"
                );
                false
            }
        };

        RelayOutcome {
            source: resolution.source,
            session_token: resolution.session_token,
            delivered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::WebhookDispatcher;
    use crate::test_helpers::{FlakyStore, RecordingDispatcher, session};
    use chrono::{Duration, Utc};
    use jobrelay_core::error::DispatchError;
    use jobrelay_core::session::JobContext;
    use jobrelay_store::InMemorySessionStore;
    use std::sync::atomic::Ordering;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn referral_message_is_relayed_with_context() {
        let store = InMemorySessionStore::new();
        store
            .insert(session("s1", "tok-123", JobContext::new("Carpenter", "Acme")))
            .await
            .unwrap();
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let relay = MessageRelay::new(Arc::new(store.clone()), dispatcher.clone());

        let outcome = relay
            .handle(InboundMessage::text("fb-42", "Hi").with_referral("tok-123"))
            .await;

        assert_eq!(outcome.source, ResolutionSource::Referral);
        assert!(outcome.delivered);

        let envelope = dispatcher.last().unwrap();
        assert_eq!(envelope.sender_id, "fb-42");
        assert_eq!(envelope.session_id.as_deref(), Some("tok-123"));
        assert_eq!(envelope.message.text, "Hi");
        let context = envelope.job_context.unwrap();
        assert_eq!(context.job_title.as_deref(), Some("Carpenter"));
        assert_eq!(context.company.as_deref(), Some("Acme"));

        let stored = store.get_by_token("tok-123").await.unwrap().unwrap();
        assert_eq!(stored.bound_identity.as_deref(), Some("fb-42"));
        assert!(stored.conversation_started);
    }

    #[tokio::test]
    async fn follow_up_uses_most_recent_session() {
        let store = InMemorySessionStore::new();
        let mut first = session("s1", "tok-a", JobContext::new("Painter", "Old Co"));
        first.bound_identity = Some("fb-42".into());
        first.last_accessed_at = Utc::now() - Duration::minutes(20);
        store.insert(first).await.unwrap();

        let mut second = session("s2", "tok-b", JobContext::new("Carpenter", "Acme"));
        second.bound_identity = Some("fb-42".into());
        second.last_accessed_at = Utc::now() - Duration::minutes(2);
        store.insert(second).await.unwrap();

        let dispatcher = Arc::new(RecordingDispatcher::new());
        let relay = MessageRelay::new(Arc::new(store), dispatcher.clone());

        let outcome = relay.handle(InboundMessage::text("fb-42", "Any news?")).await;
        assert_eq!(outcome.source, ResolutionSource::Fallback);
        assert_eq!(outcome.session_token.as_deref(), Some("tok-b"));
        assert_eq!(
            dispatcher.last().unwrap().job_context.unwrap().company.as_deref(),
            Some("Acme")
        );
    }

    #[tokio::test]
    async fn expired_referral_still_dispatches_without_context() {
        let store = InMemorySessionStore::new();
        let mut expired = session("s1", "tok-123", JobContext::new("Carpenter", "Acme"));
        expired.expires_at = Utc::now() - Duration::hours(1);
        store.insert(expired).await.unwrap();

        let dispatcher = Arc::new(RecordingDispatcher::new());
        let relay = MessageRelay::new(Arc::new(store), dispatcher.clone());

        let outcome = relay
            .handle(InboundMessage::text("fb-42", "Hi").with_referral("tok-123"))
            .await;

        assert_eq!(outcome.source, ResolutionSource::Unresolved);
        assert_eq!(dispatcher.attempts.load(Ordering::SeqCst), 1);
        let envelope = dispatcher.last().unwrap();
        assert!(envelope.session_id.is_none());
        assert!(envelope.job_context.is_none());
    }

    #[tokio::test]
    async fn dispatch_timeout_is_absorbed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::try_new(
            server.uri(),
            std::time::Duration::from_millis(200),
            None,
        )
        .unwrap();
        let relay = MessageRelay::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(dispatcher),
        );

        let outcome = relay.handle(InboundMessage::text("fb-42", "Hi")).await;
        assert!(!outcome.delivered);
        assert_eq!(relay.stats().snapshot().dispatch_failures, 1);
    }

    #[tokio::test]
    async fn failing_dispatcher_does_not_fail_handle() {
        let dispatcher = Arc::new(RecordingDispatcher::failing(DispatchError::Status {
            status_code: 502,
            body: "bad gateway".into(),
        }));
        let relay = MessageRelay::new(Arc::new(InMemorySessionStore::new()), dispatcher.clone());

        let outcome = relay.handle(InboundMessage::text("fb-42", "Hi")).await;
        assert!(!outcome.delivered);
        assert_eq!(dispatcher.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_outage_still_dispatches() {
        let store = FlakyStore::new(InMemorySessionStore::new());
        store.fail_token_lookup.store(true, Ordering::SeqCst);
        store.fail_identity_lookup.store(true, Ordering::SeqCst);

        let dispatcher = Arc::new(RecordingDispatcher::new());
        let relay = MessageRelay::new(Arc::new(store), dispatcher.clone());

        let outcome = relay
            .handle(InboundMessage::text("fb-42", "Hi").with_referral("tok-123"))
            .await;
        assert_eq!(outcome.source, ResolutionSource::Unresolved);
        assert!(outcome.delivered);
        assert!(dispatcher.last().unwrap().job_context.is_none());
    }

    #[tokio::test]
    async fn stats_count_each_path() {
        let store = InMemorySessionStore::new();
        store
            .insert(session("s1", "tok-123", JobContext::new("Carpenter", "Acme")))
            .await
            .unwrap();
        let relay = MessageRelay::new(Arc::new(store), Arc::new(RecordingDispatcher::new()));

        relay
            .handle(InboundMessage::text("fb-42", "Hi").with_referral("tok-123"))
            .await;
        relay.handle(InboundMessage::text("fb-42", "Still there?")).await;
        relay.handle(InboundMessage::text("fb-99", "Hello")).await;

        assert_eq!(
            relay.stats().snapshot(),
            RelayStatsSnapshot {
                received: 3,
                referral: 1,
                fallback: 1,
                unresolved: 1,
                dispatched: 3,
                dispatch_failures: 0,
            }
        );
    }
}
