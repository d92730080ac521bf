//! Database access for curio-rec
//!
//! SQLite holds the two pieces of state the recommender reads and writes
//! outside the warm cache: user preferences and popularity counters.

pub mod preferences;

pub use preferences::{PopularTitle, PreferenceStore, SqlitePreferenceStore};

use curio_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the file (and its parent directory) on first use.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// A single connection, since every SQLite `:memory:` connection is its own
/// database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create preference and popularity tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_preferences (
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            content_type TEXT NOT NULL,
            comment TEXT,
            seen INTEGER NOT NULL DEFAULT 0,
            rating REAL,
            genres TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (user_id, title, content_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS popular_titles (
            title TEXT NOT NULL,
            content_type TEXT NOT NULL,
            recommendation_count INTEGER NOT NULL DEFAULT 0,
            last_recommended TEXT NOT NULL,
            PRIMARY KEY (title, content_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_popular_last_recommended ON popular_titles(last_recommended)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (user_preferences, popular_titles)");

    Ok(())
}
