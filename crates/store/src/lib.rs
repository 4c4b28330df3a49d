//! Context session store implementations for JobRelay.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemorySessionStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;

/// The expiry of a session issued at `now` with lifetime `ttl`.
pub(crate) fn expiry_after(
    now: chrono::DateTime<chrono::Utc>,
    ttl: chrono::Duration,
) -> Result<chrono::DateTime<chrono::Utc>, jobrelay_core::error::StoreError> {
    now.checked_add_signed(ttl).ok_or_else(|| {
        jobrelay_core::error::StoreError::WriteFailed(format!(
            "session lifetime of {} hours is out of range",
            ttl.num_hours()
        ))
    })
}

/// Generate an opaque referral token.
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
