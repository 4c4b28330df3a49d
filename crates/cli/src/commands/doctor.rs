//! `jobrelay doctor`: Diagnose configuration and store health.

use jobrelay_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("JobRelay Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file — run `jobrelay onboard` (using defaults)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 blocking issue found.");
            return Ok(());
        }
    };

    if config.messenger.verify_token.is_some() {
        println!("  ✅ Messenger verify token configured");
    } else {
        println!("  ⚠️  No messenger.verify_token — the webhook handshake will be rejected");
        issues += 1;
    }

    if config.messenger.app_secret.is_some() {
        println!("  ✅ Messenger app secret configured");
    } else {
        println!("  ⚠️  No messenger.app_secret — webhook signatures are not checked");
        issues += 1;
    }

    match &config.dispatch.endpoint_url {
        Some(url) => println!(
            "  ✅ Dispatch endpoint: {url} (timeout {}s)",
            config.dispatch.timeout_secs
        ),
        None => {
            println!("  ⚠️  No dispatch.endpoint_url — envelopes will be dropped");
            issues += 1;
        }
    }

    match jobrelay_gateway::build_store(&config.store).await {
        Ok(store) => println!("  ✅ Session store reachable ({})", store.name()),
        Err(e) => {
            println!("  ❌ Session store unavailable: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
