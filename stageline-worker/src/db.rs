use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Creates the shared store connection pool
///
/// The schema is owned by the authoring service; the worker never migrates.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
}
