mod models;
mod seeders;
#[cfg(test)]
pub mod test_support;

pub use models::*;
pub use seeders::{seed_demo_data, SeedReport};

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub type DbPool = SqlitePool;

/// Current time in the format stored in every `*_at` column.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        // Strip SQL comment lines (lines starting with --)
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    let db_path = data_dir.join("campus-requests.db");
    let db_url = format!("sqlite:{}", db_path.display());

    info!("Initializing database at {}", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Open a private in-memory database with the full schema.
///
/// A single connection is used because every SQLite memory connection is
/// its own database.
pub async fn init_memory() -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: users, sessions, courses
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: accommodation requests and absence notices
    let has_absences_table: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='absences'"
    )
    .fetch_optional(pool)
    .await?;
    if has_absences_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/002_requests.sql")).await?;
    }

    // Migration 003: status column on absences
    let has_absence_status: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM pragma_table_info('absences') WHERE name = 'status'"
    )
    .fetch_optional(pool)
    .await?;
    if has_absence_status.is_none() {
        execute_sql(pool, include_str!("../../migrations/003_absence_status.sql")).await?;
    }

    Ok(())
}
