//! Storage layer
//!
//! Durable tier: MySQL, or embedded SQLite for single-node runs.
//! Cache tier: Redis, or DashMap (in-memory) for single-node runs.

pub mod memory;
pub mod mysql;
pub mod redis_cache;
pub mod sqlite;

pub use self::memory::MemoryCache;
pub use self::mysql::MySqlDatabase;
pub use self::redis_cache::RedisCache;
pub use self::sqlite::SqliteDatabase;

use cachestore_core::{Profile, Result, StoreError};

pub(crate) const TABLE: &str = "profiles";

pub(crate) const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS profiles (
        uid VARCHAR(64) NOT NULL PRIMARY KEY,
        name VARCHAR(128) NOT NULL,
        email VARCHAR(254) NOT NULL,
        age BIGINT NOT NULL
    )
"#;

pub(crate) const INSERT_SQL: &str = r#"
    INSERT INTO profiles (uid, name, email, age)
    VALUES (?, ?, ?, ?)
"#;

// LIMIT 2 is enough to tell "exactly one" from "more than one"
pub(crate) const LOOKUP_SQL: &str = r#"
    SELECT uid, name, email, age FROM profiles WHERE uid = ? LIMIT 2
"#;

// Helper struct for sqlx query_as
#[derive(sqlx::FromRow)]
pub(crate) struct ProfileRow {
    uid: String,
    name: String,
    email: String,
    age: i64,
}

impl ProfileRow {
    fn into_profile(self) -> Result<Profile> {
        let age = u32::try_from(self.age).map_err(|_| StoreError::Integrity {
            uid: self.uid.clone(),
            reason: format!("stored age {} is out of range", self.age),
        })?;

        Ok(Profile {
            uid: self.uid,
            name: self.name,
            email: self.email,
            age,
        })
    }
}

/// Collapse a `LIMIT 2` result into zero or one profile.
pub(crate) fn single_profile(uid: &str, rows: Vec<ProfileRow>) -> Result<Option<Profile>> {
    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (None, _) => Ok(None),
        (Some(row), None) => row.into_profile().map(Some),
        (Some(_), Some(_)) => {
            tracing::error!("Multiple rows in {} for uid {}", TABLE, uid);
            Err(StoreError::Integrity {
                uid: uid.to_string(),
                reason: "more than one row shares this uid".to_string(),
            })
        }
    }
}

pub(crate) fn database_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

pub(crate) fn insert_error(uid: &str, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(uid.to_string())
        }
        _ => database_error(e),
    }
}
