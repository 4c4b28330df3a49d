//! `jobrelay serve`: Start the webhook gateway.

use jobrelay_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("JobRelay Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", config.store.backend);
    println!(
        "   Dispatch:  {}",
        config.dispatch.endpoint_url.as_deref().unwrap_or("(none, envelopes dropped)")
    );

    jobrelay_gateway::start(config).await?;

    Ok(())
}
