use std::time::Duration;
use sqlx::{
    migrate::MigrateDatabase,
    postgres::PgPoolOptions,
    Pool, Postgres,
};
use tracing::{debug, error, info, warn};

use super::{DatabaseConfig, DatabaseError, DatabaseResult};

/// Type alias for the database pool
pub type DbPool = Pool<Postgres>;

/// Create a new connection pool with the given configuration
pub async fn create_connection_pool(config: &DatabaseConfig) -> DatabaseResult<DbPool> {
    info!("Creating database connection pool...");
    debug!(
        "Database config: host={}, port={}, database={}, explicit_url={}",
        config.host,
        config.port,
        config.database_name,
        config.url.is_some()
    );

    let database_url = config.database_url();

    if config.create_if_missing {
        ensure_database_exists(&database_url).await?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .idle_timeout(Some(Duration::from_secs(config.idle_timeout)))
        .max_lifetime(Some(Duration::from_secs(1800))) // 30 minutes
        .test_before_acquire(true)
        .connect(&database_url)
        .await
        .map_err(|e| {
            error!("Failed to create connection pool: {}", e);
            DatabaseError::Connection(e)
        })?;

    info!(
        "Database connection pool created successfully with {} max connections",
        config.max_connections
    );

    Ok(pool)
}

/// Test database connection
pub async fn test_connection(pool: &DbPool) -> DatabaseResult<()> {
    debug!("Testing database connection...");

    let row: (i32,) = sqlx::query_as("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| {
            error!("Database connection test failed: {}", e);
            DatabaseError::Connection(e)
        })?;

    if row.0 != 1 {
        return Err(DatabaseError::Query(
            "Unexpected result from connection test".to_string(),
        ));
    }

    debug!("Database connection test successful");
    Ok(())
}

/// Ensure the database exists, create if it doesn't
async fn ensure_database_exists(database_url: &str) -> DatabaseResult<()> {
    if Postgres::database_exists(database_url).await.unwrap_or(false) {
        debug!("Database already exists");
        return Ok(());
    }

    info!("Database does not exist, creating...");
    Postgres::create_database(database_url).await.map_err(|e| {
        error!("Failed to create database: {}", e);
        DatabaseError::Create(e.to_string())
    })?;

    info!("Database created successfully");
    Ok(())
}

/// Connection health check
pub async fn health_check(pool: &DbPool) -> bool {
    match test_connection(pool).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Database health check failed: {}", e);
            false
        }
    }
}

/// Close database connections gracefully
pub async fn close_connections(pool: &DbPool) {
    info!("Closing database connections...");
    pool.close().await;
    info!("Database connections closed");
}
