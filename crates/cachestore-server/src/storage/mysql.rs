//! MySQL durable store

use super::{
    database_error, insert_error, single_profile, ProfileRow, CREATE_TABLE_SQL, INSERT_SQL,
    LOOKUP_SQL,
};
use crate::config::SqlConfig;
use async_trait::async_trait;
use cachestore_core::{DurableStore, Profile, Result, StoreError};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{ConnectOptions, Connection, Executor, MySqlPool};
use std::time::Duration;

pub struct MySqlDatabase {
    /// Server-level options with no default database, for `CREATE DATABASE`
    server: MySqlConnectOptions,
    pool: MySqlPool,
    database: String,
    address: String,
    connect_timeout: Duration,
}

impl MySqlDatabase {
    /// Build the pool without connecting. The database it is bound to may not
    /// exist until [`DurableStore::ensure_schema`] runs.
    pub fn new(config: &SqlConfig) -> Result<Self> {
        validate_identifier(&config.database)?;

        let server = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(server.clone().database(&config.database));

        Ok(Self {
            server,
            pool,
            database: config.database.clone(),
            address: format!("{}:{}", config.host, config.port),
            connect_timeout: config.connect_timeout(),
        })
    }
}

#[async_trait]
impl DurableStore for MySqlDatabase {
    async fn ensure_schema(&self) -> Result<()> {
        tracing::info!("Connecting to MySQL at {}...", self.address);

        let mut conn = tokio::time::timeout(self.connect_timeout, self.server.connect())
            .await
            .map_err(|_| StoreError::Timeout {
                tier: "durable",
                elapsed: self.connect_timeout,
            })?
            .map_err(database_error)?;

        // Identifiers cannot be bound; the name was checked by validate_identifier
        let statement = format!("CREATE DATABASE IF NOT EXISTS `{}`", self.database);
        conn.execute(statement.as_str())
            .await
            .map_err(database_error)?;
        let _ = conn.close().await;

        sqlx::query(CREATE_TABLE_SQL)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

        tracing::info!(
            "Successfully connected to MySQL database {} at {}",
            self.database,
            self.address
        );
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

        tracing::debug!("Inserted profile {} into MySQL", profile.uid);
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

fn validate_identifier(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid {
        return Err(StoreError::Config(format!(
            "invalid database name {:?}: use 1-64 ASCII letters, digits or underscores",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_validate_identifier() {
        assert_ok!(validate_identifier("cachestore"));
        assert_ok!(validate_identifier("my_db_2"));

        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("db`; DROP DATABASE x; --").is_err());
        assert!(validate_identifier("my-db").is_err());
        assert!(validate_identifier(&"d".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_new_does_not_connect() {
        let config = SqlConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..SqlConfig::default()
        };
        assert_ok!(MySqlDatabase::new(&config));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_ensure_schema() {
        let config = SqlConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_ms: 500,
            ..SqlConfig::default()
        };
        let db = MySqlDatabase::new(&config).unwrap();

        let err = db.ensure_schema().await.unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_rejects_bad_database_name() {
        let config = SqlConfig {
            database: "bad name".to_string(),
            ..SqlConfig::default()
        };
        assert!(matches!(
            MySqlDatabase::new(&config),
            Err(StoreError::Config(_))
        ));
    }
}
