//! # lanes
//!
//! Priority-lane to-do server binary: loads settings, installs telemetry and
//! either serves the RPC surface or mints a bearer token for a user.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;

use lanes_settings::LanesSettings;
use lanes_store::{Database, SessionRepo, UserRepo};
use lanes_telemetry::{init_telemetry, parse_level, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "lanes", about = "Priority-lane to-do server")]
struct Cli {
    /// Settings file (defaults to `~/.lanes/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server. Stops on Ctrl-C.
    Serve {
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (0 for auto-assign).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Register (or find) a user and print a fresh bearer token.
    IssueToken {
        /// Identity provider that vouched for the user, e.g. `github`.
        #[arg(long)]
        provider: String,
        /// The user's account id at that provider.
        #[arg(long)]
        account: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
}

fn load_settings(cli: &Cli) -> Result<LanesSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(lanes_settings::settings_path);
    let mut settings = lanes_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(db_path) = &cli.db_path {
        settings.database.path = db_path.display().to_string();
    }
    Ok(settings)
}

fn open_database(settings: &LanesSettings) -> Result<Database> {
    let path = Path::new(&settings.database.path);
    Database::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let _telemetry = init_telemetry(TelemetryConfig {
        log_level: parse_level(&settings.logging.level),
        module_levels: Vec::new(),
        log_to_sqlite: settings.logging.log_to_sqlite,
        log_db_path: PathBuf::from(&settings.logging.log_db_path),
    });

    match cli.command {
        Command::Serve { host, port } => serve(settings, host, port).await,
        Command::IssueToken {
            provider,
            account,
            name,
            email,
        } => issue_token(&settings, &provider, &account, &name, email.as_deref()),
    }
}

async fn serve(mut settings: LanesSettings, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let db = open_database(&settings)?;
    let purged = SessionRepo::new(db.clone())
        .purge_expired()
        .context("Failed to purge expired sessions")?;
    tracing::info!(purged, "expired sessions removed");

    let config = lanes_server::ServerConfig::from_settings(&settings);
    let handle = lanes_server::start(config, db)
        .await
        .context("Failed to start server")?;
    tracing::info!(port = handle.port, "lanes server ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

fn issue_token(
    settings: &LanesSettings,
    provider: &str,
    account: &str,
    name: &str,
    email: Option<&str>,
) -> Result<()> {
    let db = open_database(settings)?;
    let user = UserRepo::new(db.clone())
        .get_or_create(provider, account, name, email)
        .context("Failed to register user")?;
    let ttl = chrono::Duration::hours(
        i64::try_from(settings.auth.session_ttl_hours).context("session TTL out of range")?,
    );
    let issued = SessionRepo::new(db)
        .issue(&user.id, ttl)
        .context("Failed to issue token")?;

    println!("{}", issued.token.expose_secret());
    eprintln!("user {} ({}), expires {}", user.id, user.name, issued.expires_at);
    Ok(())
}
