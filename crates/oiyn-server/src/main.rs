//! # Oiyn Server
//!
//! Main binary. `oiyn serve` (the default) runs the REST API together with the
//! expiry sweeper in one process; the other subcommands are one-shot
//! maintenance tasks against the same store.

use std::net::SocketAddr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use oiyn_api::{AppState, build_router};
use oiyn_common::config::{AppConfig, AuthConfig, LogFormat};
use oiyn_common::models::user::Role;
use oiyn_db::Database;
use oiyn_engine::Sweeper;
use rand::Rng;
use tokio::signal;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "oiyn", author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API and the expiry sweeper (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Run a single expiry sweep and exit
    Sweep,
    /// Grant the ADMIN role to an existing account
    Promote {
        /// Email of the account to promote
        email: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(config.log.format);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            ensure_jwt_secret(&mut config.auth);
            serve(config).await
        }
        Command::Migrate => {
            let db = Database::connect(&config.database, config.server.request_timeout()).await?;
            if !db.is_persistent() {
                tracing::warn!("In-memory store has no schema, nothing to migrate");
            }
            db.migrate().await?;
            db.close().await;
            Ok(())
        }
        Command::Sweep => {
            let db = connect_persistent(&config, "sweep").await?;
            let report = Sweeper::from_database(&db, config.sweeper.interval())
                .tick()
                .await?;
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                failed = report.failed,
                chats_opened = report.chats_opened,
                "Sweep complete"
            );
            db.close().await;
            Ok(())
        }
        Command::Promote { email } => {
            let db = connect_persistent(&config, "promote").await?;
            let promoted = db.users.set_role(&email, Role::Admin).await?;
            db.close().await;
            match promoted {
                Some(user) => {
                    tracing::info!(user_id = %user.id, "Granted ADMIN to {email}");
                    Ok(())
                }
                None => anyhow::bail!("No account registered with {email}"),
            }
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting Oiyn v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::connect(&config.database, config.server.request_timeout()).await?;
    db.migrate().await?;

    // Flipped to true once the HTTP server has drained
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = if config.sweeper.enabled {
        Some(Sweeper::from_database(&db, config.sweeper.interval()).spawn(shutdown_rx))
    } else {
        tracing::info!("Sweeper disabled");
        None
    };

    let state = AppState::new(db.clone(), config.auth.clone(), config.limits.clone());
    let router = build_router(state, config.server.request_timeout());
    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("REST API listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            tracing::error!("Sweeper task failed: {e}");
        }
    }
    db.close().await;

    tracing::info!("Oiyn stopped");
    Ok(())
}

/// One-shot maintenance commands only make sense against PostgreSQL: an
/// in-memory store would be created empty and discarded on exit.
async fn connect_persistent(config: &AppConfig, command: &str) -> anyhow::Result<Database> {
    let db = Database::connect(&config.database, config.server.request_timeout()).await?;
    require_persistent(&db, command)?;
    Ok(db)
}

fn require_persistent(db: &Database, command: &str) -> anyhow::Result<()> {
    if !db.is_persistent() {
        anyhow::bail!("`oiyn {command}` needs database.url (OIYN__DATABASE__URL) to be set");
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "oiyn=debug,tower_http=debug".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_thread_ids(true).init(),
    }
}

/// Tokens signed with a generated secret stop validating after a restart.
fn ensure_jwt_secret(auth: &mut AuthConfig) {
    if auth.jwt_secret.is_empty() {
        let key: Vec<u8> = (0..32).map(|_| rand::rng().random::<u8>()).collect();
        auth.jwt_secret = hex::encode(key);
        tracing::warn!("No auth.jwt_secret configured, generated an ephemeral one");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
