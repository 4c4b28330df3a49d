//! # JobRelay Core
//!
//! Domain types, traits, and error definitions for the JobRelay message
//! context resolver. This crate has **zero framework dependencies**; it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The session store and the outbound dispatcher are traits here.
//! Implementations live in their respective crates. This enables:
//! - Swapping the store backend via configuration
//! - Easy testing with in-memory fakes
//! - Clean dependency graph (all crates depend inward on core)

pub mod envelope;
pub mod error;
pub mod message;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use envelope::{Dispatcher, Envelope, EnvelopeMessage};
pub use error::{Error, Result};
pub use message::{Attachment, InboundMessage, Referral};
pub use session::{ContextSession, ContextSessionStore, JobContext, NewContextSession};
