//! SQLite durable store (embedded, no external dependencies)

use super::{
    database_error, insert_error, single_profile, ProfileRow, CREATE_TABLE_SQL, INSERT_SQL,
    LOOKUP_SQL,
};
use crate::config::SqlConfig;
use async_trait::async_trait;
use cachestore_core::{DurableStore, Profile, Result, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

const IN_MEMORY: &str = ":memory:";

pub struct SqliteDatabase {
    pool: SqlitePool,
    path: String,
}

impl SqliteDatabase {
    /// Build the pool without connecting. Nothing touches disk until
    /// [`DurableStore::ensure_schema`].
    pub fn new(config: &SqlConfig) -> Result<Self> {
        let pool = if config.path == IN_MEMORY {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::Config(e.to_string()))?;

            // Every connection to :memory: is a separate database, so keep exactly one alive
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(config.connect_timeout())
                .connect_lazy_with(options)
        } else {
            let options = SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);

            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.connect_timeout())
                .connect_lazy_with(options)
        };

        Ok(Self {
            pool,
            path: config.path.clone(),
        })
    }
}

#[async_trait]
impl DurableStore for SqliteDatabase {
    async fn ensure_schema(&self) -> Result<()> {
        tracing::info!("Opening SQLite database at: {}", self.path);

        if self.path != IN_MEMORY {
            if let Some(parent) = Path::new(&self.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        StoreError::Database(format!(
                            "Failed to create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        sqlx::query(CREATE_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        tracing::info!("SQLite schema ready");
        Ok(())
    }

    async fn insert(&self, profile: &Profile) -> Result<()> {
        sqlx::query(INSERT_SQL)
            .bind(&profile.uid)
            .bind(&profile.name)
            .bind(&profile.email)
            .bind(i64::from(profile.age))
            .execute(&self.pool)
            .await
            .map_err(|e| insert_error(&profile.uid, e))?;

        tracing::debug!("Inserted profile {} into SQLite", profile.uid);
        Ok(())
    }

    async fn lookup(&self, uid: &str) -> Result<Option<Profile>> {
        let rows: Vec<ProfileRow> = sqlx::query_as(LOOKUP_SQL)
            .bind(uid)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        single_profile(uid, rows)
    }
}
