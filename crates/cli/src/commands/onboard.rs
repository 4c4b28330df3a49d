//! `jobrelay onboard`: First-time setup.

use jobrelay_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("JobRelay — First-Time Setup");
    println!("===========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Set [messenger] verify_token and app_secret");
        println!("   2. Set [dispatch] endpoint_url to your automation webhook");
        println!("   3. Issue a session: jobrelay sessions issue --job-title ... --company ...");
        println!("   4. Run: jobrelay serve\n");
    }

    Ok(())
}
