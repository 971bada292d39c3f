//! PostgreSQL setup and connection helpers.

use std::time::Duration;

use oiyn_common::config::DatabaseConfig;
use oiyn_common::error::OiynError;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};

/// Open a pool whose connections carry a server-side `statement_timeout`.
///
/// Dropping a query future does not cancel the statement on the server. The
/// timeout makes PostgreSQL abort anything still running past the request
/// deadline, so an abandoned statement cannot commit long after its caller
/// gave up.
pub async fn connect(
    url: &str,
    config: &DatabaseConfig,
    statement_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    let timeout_ms = statement_timeout.as_millis() as u64;
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET statement_timeout = {timeout_ms}").as_str())
                    .await?;
                Ok(())
            })
        })
        .connect(url)
        .await
}

/// Health check: verify the database is reachable.
pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}

/// Map a unique-constraint violation to `AlreadyExists`, everything else to `Database`.
pub(crate) fn unique_violation(err: sqlx::Error, resource: &str) -> OiynError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => OiynError::AlreadyExists {
            resource: resource.into(),
        },
        _ => OiynError::Database(err),
    }
}
