use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};

pub mod seed;

pub async fn init() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    Ok(pool)
}

/// Opens a transaction that holds the database write lock from its first
/// statement, like `BEGIN IMMEDIATE`.
///
/// SQLite answers a deferred transaction that reads and then tries to write
/// with `SQLITE_BUSY` straight away when another connection is writing; it
/// never waits on the busy timeout for that upgrade. Touching `write_lock`
/// first makes the lock acquisition wait instead.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE write_lock SET taken_at = ? WHERE id = 1")
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}
