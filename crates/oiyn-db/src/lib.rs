//! # oiyn-db
//!
//! Persistence layer for Oiyn. Every aggregate is reached through a repository
//! trait with two implementations:
//! - **PostgreSQL**: production store; embedded snapshots live in JSONB columns
//!   and every membership/status mutation is a single conditional `UPDATE`
//! - **In-memory**: lite mode and tests; the same conditions are checked
//!   under a write lock

pub mod memory;
pub mod postgres;
pub mod repository;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use oiyn_common::config::DatabaseConfig;
use sqlx::PgPool;

use memory::MemoryStore;
use repository::{
    ConversationRepository, PgConversations, PgPostings, PgUsers, PgVenues, PostingRepository,
    UserRepository, VenueRepository,
};

/// Shared persistence handle passed through Axum state and into the engine.
///
/// Constructed once at process start; cloning only bumps reference counts.
#[derive(Clone)]
pub struct Database {
    pub users: Arc<dyn UserRepository>,
    pub postings: Arc<dyn PostingRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub venues: Arc<dyn VenueRepository>,
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    Postgres(PgPool),
    Memory,
}

impl Database {
    /// Connect to PostgreSQL, or fall back to the in-memory store when no URL is configured.
    ///
    /// PostgreSQL statements are bounded by `statement_timeout`, see [`postgres::connect`].
    pub async fn connect(config: &DatabaseConfig, statement_timeout: Duration) -> Result<Self> {
        match config.url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => {
                tracing::info!("Connecting to PostgreSQL...");
                let pg = postgres::connect(url, config, statement_timeout).await?;
                tracing::info!(
                    statement_timeout_ms = statement_timeout.as_millis() as u64,
                    "Connected to PostgreSQL"
                );
                Ok(Self::postgres(pg))
            }
            None => {
                tracing::warn!("No database URL configured, running with the in-memory store");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn postgres(pg: PgPool) -> Self {
        Self {
            users: Arc::new(PgUsers::new(pg.clone())),
            postings: Arc::new(PgPostings::new(pg.clone())),
            conversations: Arc::new(PgConversations::new(pg.clone())),
            venues: Arc::new(PgVenues::new(pg.clone())),
            backend: Backend::Postgres(pg),
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            users: store.clone(),
            postings: store.clone(),
            conversations: store.clone(),
            venues: store,
            backend: Backend::Memory,
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, Backend::Postgres(_))
    }

    /// Run database migrations. A no-op for the in-memory store.
    pub async fn migrate(&self) -> Result<()> {
        if let Backend::Postgres(pg) = &self.backend {
            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(pg).await?;
            tracing::info!("Migrations complete");
        }
        Ok(())
    }

    /// Health check: verify the store is reachable.
    pub async fn health_check(&self) -> bool {
        match &self.backend {
            Backend::Postgres(pg) => postgres::health_check(pg).await,
            Backend::Memory => true,
        }
    }

    /// Close pooled connections. Called once during shutdown.
    pub async fn close(&self) {
        if let Backend::Postgres(pg) = &self.backend {
            pg.close().await;
            tracing::info!("PostgreSQL pool closed");
        }
    }
}
