//! # JobRelay Relay
//!
//! Turns an inbound message into exactly one outbound envelope:
//! resolve the job context, build the envelope, dispatch it.

pub mod dispatcher;
pub mod envelope;
pub mod relay;
pub mod resolver;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{NoopDispatcher, WebhookDispatcher};
pub use envelope::{build_envelope, build_envelope_now};
pub use relay::{MessageRelay, RelayOutcome, RelayStats, RelayStatsSnapshot};
pub use resolver::{ContextResolver, Resolution, ResolutionSource};
