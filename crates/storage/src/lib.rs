//! SQLite persistence for guild configs, user standing and relay history.

mod sqlite;

use {
    crosschat_config::DatabaseConfig,
    crosschat_relay::{Error, Result},
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
};

pub use sqlite::SqliteStore;

/// Open the connection pool described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
        .map_err(|e| Error::storage(format!("connect to {}", config.url), e))
}

/// Create or upgrade the `guilds`, `users` and `messages` tables.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::storage("run migrations", e))
}
