//! JobRelay CLI: the main entry point.
//!
//! Commands:
//! - `onboard`:  Initialize config directory and default config
//! - `serve`:    Start the Messenger webhook gateway
//! - `doctor`:   Diagnose configuration and store health
//! - `sessions`: Issue, inspect, and deactivate context sessions

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "jobrelay",
    about = "JobRelay — attach job context to inbound Messenger conversations",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Onboard,

    /// Start the webhook gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose configuration and store health
    Doctor,

    /// Manage context sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

#[derive(Subcommand)]
enum SessionsCommand {
    /// Issue a session for a job posting and print its referral token
    Issue {
        #[arg(long)]
        job_title: String,

        #[arg(long)]
        company: String,

        /// Extra job attribute, repeatable (e.g. --attr location=Berlin)
        #[arg(long = "attr", value_parser = commands::sessions::parse_attr)]
        attrs: Vec<(String, String)>,

        /// Session lifetime; defaults to sessions.default_ttl_hours
        #[arg(long)]
        ttl_hours: Option<i64>,

        /// Use this token instead of generating one
        #[arg(long)]
        token: Option<String>,
    },

    /// Show a session by token
    Show { token: String },

    /// Deactivate a session by token
    Deactivate { token: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "jobrelay starting");

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Doctor => commands::doctor::run().await?,
        Commands::Sessions { command } => match command {
            SessionsCommand::Issue {
                job_title,
                company,
                attrs,
                ttl_hours,
                token,
            } => commands::sessions::issue(job_title, company, attrs, ttl_hours, token).await?,
            SessionsCommand::Show { token } => commands::sessions::show(&token).await?,
            SessionsCommand::Deactivate { token } => {
                commands::sessions::deactivate(&token).await?
            }
        },
    }

    Ok(())
}
