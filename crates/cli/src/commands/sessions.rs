//! `jobrelay sessions`: Context session administration.

use chrono::Duration;
use jobrelay_config::{AppConfig, MAX_TTL_HOURS};
use jobrelay_core::session::{JobContext, NewContextSession};
use jobrelay_store::SqliteSessionStore;

/// Parse a `key=value` job attribute.
pub fn parse_attr(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

/// Convert `--ttl-hours` into a session lifetime, rejecting values outside
/// `1..=MAX_TTL_HOURS`.
pub fn ttl_from_hours(hours: i64) -> Result<Duration, String> {
    if !(1..=MAX_TTL_HOURS).contains(&hours) {
        return Err(format!("--ttl-hours must be between 1 and {MAX_TTL_HOURS}, got {hours}"));
    }
    Duration::try_hours(hours).ok_or_else(|| format!("--ttl-hours {hours} is out of range"))
}

async fn open_store(config: &AppConfig) -> Result<SqliteSessionStore, Box<dyn std::error::Error>> {
    if config.store.backend != "sqlite" {
        return Err(format!(
            "session administration needs the sqlite backend (store.backend = '{}')",
            config.store.backend
        )
        .into());
    }
    let path = config.store.database_path();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(SqliteSessionStore::open(&path).await?)
}

pub async fn issue(
    job_title: String,
    company: String,
    attrs: Vec<(String, String)>,
    ttl_hours: Option<i64>,
    token: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let ttl = ttl_from_hours(ttl_hours.unwrap_or(config.sessions.default_ttl_hours))?;

    let context = attrs
        .into_iter()
        .fold(JobContext::new(job_title, company), |ctx, (k, v)| {
            ctx.with_attribute(k, v)
        });
    let mut new = NewContextSession::new(context, ttl);
    if let Some(token) = token {
        new = new.with_token(token);
    }

    let store = open_store(&config).await?;
    let session = store.issue(new).await?;
    store.close().await;

    println!("✅ Session issued");
    println!("   Token:   {}", session.session_token);
    println!("   Expires: {}", session.expires_at.to_rfc3339());
    println!("\n   Use it as the Messenger link ref: https://m.me/<page>?ref={}", session.session_token);

    Ok(())
}

pub async fn show(token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = open_store(&config).await?;
    let session = store.get_by_token(token).await?;
    store.close().await;

    match session {
        Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
        None => println!("No session with token '{token}'"),
    }

    Ok(())
}

pub async fn deactivate(token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = open_store(&config).await?;
    let changed = store.deactivate(token).await?;
    store.close().await;

    if changed {
        println!("✅ Session '{token}' deactivated");
    } else {
        println!("No active session with token '{token}'");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_parsing() {
        assert_eq!(
            parse_attr("location=Berlin").unwrap(),
            ("location".into(), "Berlin".into())
        );
        assert_eq!(
            parse_attr("note=a=b").unwrap(),
            ("note".into(), "a=b".into())
        );
        assert!(parse_attr("missing").is_err());
        assert!(parse_attr("=value").is_err());
    }

    #[test]
    fn ttl_hours_are_bounded() {
        assert_eq!(ttl_from_hours(24).unwrap(), Duration::hours(24));
        assert_eq!(ttl_from_hours(MAX_TTL_HOURS).unwrap(), Duration::hours(MAX_TTL_HOURS));
        assert!(ttl_from_hours(0).is_err());
        assert!(ttl_from_hours(-5).is_err());
        assert!(ttl_from_hours(3_000_000_000).is_err());
        assert!(ttl_from_hours(i64::MAX).is_err());
    }
}
