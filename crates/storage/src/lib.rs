use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{Tutor, TutorId};

/// Key under which the favorited tutor records are persisted, as one
/// JSON-encoded array. Absence of the key means "no favorites yet".
pub const FAVORITES_KEY: &str = "favorites";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
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

    pub async fn read_entry(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM local_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<String, _>(0)))
    }

    pub async fn write_entry(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO local_entries (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_entry(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM local_entries WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn entry_updated_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT updated_at FROM local_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<DateTime<Utc>, _>(0)))
    }

    /// Raw favorites entry. `None` is the valid "no favorites yet" state.
    pub async fn load_favorites_json(&self) -> Result<Option<String>> {
        self.read_entry(FAVORITES_KEY).await
    }

    /// Typed view of the favorites entry. Unlike the screen-side reader this
    /// is strict: a malformed entry is an error, not an empty list.
    pub async fn list_favorites(&self) -> Result<Vec<Tutor>> {
        let Some(raw) = self.load_favorites_json().await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).context("malformed favorites entry")
    }

    pub async fn replace_favorites(&self, tutors: &[Tutor]) -> Result<()> {
        let encoded = serde_json::to_string(tutors).context("failed to encode favorites")?;
        self.write_entry(FAVORITES_KEY, &encoded).await
    }

    /// Appends one record to the favorites entry. Returns `false` when the
    /// tutor is already favorited; the stored record is left untouched.
    pub async fn add_favorite(&self, tutor: &Tutor) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query("SELECT value FROM local_entries WHERE key = ?")
            .bind(FAVORITES_KEY)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get::<String, _>(0));

        let mut favorites: Vec<Tutor> = match current {
            Some(raw) => serde_json::from_str(&raw).context("malformed favorites entry")?,
            None => Vec::new(),
        };
        if favorites.iter().any(|existing| existing.id == tutor.id) {
            return Ok(false);
        }
        favorites.push(tutor.clone());

        let encoded = serde_json::to_string(&favorites).context("failed to encode favorites")?;
        sqlx::query(
            "INSERT INTO local_entries (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(FAVORITES_KEY)
        .bind(encoded)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Removes one record from the favorites entry. Returns `false` when the
    /// tutor was not favorited.
    pub async fn remove_favorite(&self, tutor_id: TutorId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query("SELECT value FROM local_entries WHERE key = ?")
            .bind(FAVORITES_KEY)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.get::<String, _>(0));

        let Some(raw) = current else {
            return Ok(false);
        };
        let mut favorites: Vec<Tutor> =
            serde_json::from_str(&raw).context("malformed favorites entry")?;
        let before = favorites.len();
        favorites.retain(|existing| existing.id != tutor_id);
        if favorites.len() == before {
            return Ok(false);
        }

        let encoded = serde_json::to_string(&favorites).context("failed to encode favorites")?;
        sqlx::query(
            "UPDATE local_entries SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?",
        )
        .bind(encoded)
        .bind(FAVORITES_KEY)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }
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
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
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
