use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::protocol::CachedSnapshotRecord;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        // Every pooled connection to an in-memory database is its own database.
        let max_connections = if is_in_memory(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run snapshot cache migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn save_snapshot_record(
        &self,
        cache_key: &str,
        record: &CachedSnapshotRecord,
    ) -> Result<()> {
        let payload_json =
            serde_json::to_string(record).context("failed to encode cached snapshot")?;
        sqlx::query(
            "INSERT INTO snapshot_cache (cache_key, payload_json, saved_at_ms)
             VALUES (?, ?, ?)
             ON CONFLICT(cache_key) DO UPDATE SET
                payload_json=excluded.payload_json,
                saved_at_ms=excluded.saved_at_ms,
                updated_at=CURRENT_TIMESTAMP",
        )
        .bind(cache_key)
        .bind(payload_json)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write snapshot cache entry '{cache_key}'"))?;
        debug!(
            cache_key,
            horses = record.horses.len(),
            "storage: cached snapshot"
        );
        Ok(())
    }

    pub async fn load_snapshot_record(
        &self,
        cache_key: &str,
    ) -> Result<Option<CachedSnapshotRecord>> {
        let row = sqlx::query("SELECT payload_json FROM snapshot_cache WHERE cache_key = ?")
            .bind(cache_key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read snapshot cache entry '{cache_key}'"))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let payload_json: String = row.try_get("payload_json")?;
        let record = serde_json::from_str(&payload_json)
            .with_context(|| format!("snapshot cache entry '{cache_key}' is corrupt"))?;
        Ok(Some(record))
    }

    /// Returns whether an entry was removed.
    pub async fn clear_snapshot_record(&self, cache_key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM snapshot_cache WHERE cache_key = ?")
            .bind(cache_key)
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to clear snapshot cache entry '{cache_key}'"))?;
        Ok(result.rows_affected() > 0)
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
