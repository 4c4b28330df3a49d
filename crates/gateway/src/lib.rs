//! HTTP gateway for JobRelay.
//!
//! Exposes the Messenger webhook (subscription handshake and event
//! delivery), a health check, and relay counters.
//!
//! Built on Axum. Every inbound message is handed to its own task so the
//! platform always gets a fast acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::{Router, routing::get};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use jobrelay_config::{AppConfig, DispatchConfig, StoreConfig};
use jobrelay_core::envelope::Dispatcher;
use jobrelay_core::error::{ChannelError, DispatchError, StoreError};
use jobrelay_core::session::ContextSessionStore;
use jobrelay_relay::{MessageRelay, NoopDispatcher, RelayStatsSnapshot, WebhookDispatcher};
use jobrelay_store::{InMemorySessionStore, SqliteSessionStore};

/// Body returned to the platform for every accepted delivery.
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub relay: Arc<MessageRelay>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.config.gateway.body_limit_bytes;
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/webhook", get(verify_handler).post(webhook_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the session store selected by `[store]`.
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn ContextSessionStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory session store; sessions are lost on restart");
            Ok(Arc::new(InMemorySessionStore::new()))
        }
        _ => {
            let path = config.database_path();
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Unavailable(format!(
                        "cannot create database directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            Ok(Arc::new(SqliteSessionStore::open(&path).await?))
        }
    }
}

/// Build the dispatcher selected by `[dispatch]`.
///
/// Without an endpoint every envelope is dropped by a no-op dispatcher.
pub fn build_dispatcher(config: &DispatchConfig) -> Result<Arc<dyn Dispatcher>, DispatchError> {
    match config.endpoint_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => Ok(Arc::new(WebhookDispatcher::try_new(
            url,
            Duration::from_secs(config.timeout_secs),
            config.signing_secret.clone(),
        )?)),
        None => {
            warn!("No dispatch endpoint configured; envelopes will be dropped");
            Ok(Arc::new(NoopDispatcher))
        }
    }
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> jobrelay_core::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let store = build_store(&config.store).await?;
    let dispatcher = build_dispatcher(&config.dispatch)?;
    info!(
        store = store.name(),
        dispatcher = dispatcher.name(),
        "Relay pipeline ready"
    );
    if config.messenger.app_secret.is_none() {
        warn!("No Messenger app secret configured; webhook signatures are not checked");
    }

    let state = Arc::new(GatewayState {
        relay: Arc::new(MessageRelay::new(store, dispatcher)),
        config,
    });
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn stats_handler(State(state): State<SharedState>) -> Json<RelayStatsSnapshot> {
    Json(state.relay.stats().snapshot())
}

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

async fn verify_handler(
    State(state): State<SharedState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    let expected = state.config.messenger.verify_token.as_deref().unwrap_or("");
    match jobrelay_channels::verify_subscription(
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        params.challenge.as_deref(),
        expected,
    ) {
        Some(challenge) => {
            info!("Webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(mode = ?params.mode, "Webhook verification rejected");
            channel_rejection(ChannelError::VerificationFailed)
        }
    }
}

async fn webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(jobrelay_channels::messenger::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if !jobrelay_channels::validate_signature(
        state.config.messenger.app_secret.as_deref(),
        &body,
        signature,
    ) {
        warn!("Webhook signature mismatch");
        return channel_rejection(ChannelError::SignatureMismatch);
    }

    let messages = match jobrelay_channels::parse_webhook(&body) {
        Ok(messages) => messages,
        Err(e) => {
            warn!(error = %e, "Rejecting malformed webhook delivery");
            return channel_rejection(e);
        }
    };

    debug!(count = messages.len(), "Webhook delivery accepted");

    for message in messages {
        let relay = Arc::clone(&state.relay);
        tokio::spawn(async move {
            relay.handle(message).await;
        });
    }

    (StatusCode::OK, EVENT_RECEIVED).into_response()
}

/// The only errors the platform ever sees.
fn channel_rejection(error: ChannelError) -> Response {
    let status = match error {
        ChannelError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        ChannelError::SignatureMismatch | ChannelError::VerificationFailed => StatusCode::FORBIDDEN,
    };
    (status, error.to_string()).into_response()
}
