// SPDX-License-Identifier: MIT

//! Postgres-backed store and checkpoint saver.
//!
//! Both keep their own `sqlx` pool, so closing one never affects the other.
//! Schema changes are versioned migrations applied under an advisory lock
//! and recorded in a `*_migrations` table, which makes `setup()` idempotent
//! and safe to run from several processes at once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;

use super::checkpoint::{require_thread_id, Checkpoint, CheckpointMetadata, Checkpointer};
use super::store::{
    namespace_to_prefix, prefix_to_namespace, validate_namespace, BaseStore, Item,
};
use crate::adk::error::{CheckpointError, StoreError};
use crate::adk::graph::RunnableConfig;

const MAX_CONNECTIONS: u32 = 5;

const STORE_MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS store (
        prefix TEXT NOT NULL,
        key TEXT NOT NULL,
        value JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (prefix, key)
    )",
    "CREATE INDEX IF NOT EXISTS store_prefix_idx ON store USING btree (prefix text_pattern_ops)",
];

const CHECKPOINT_MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS checkpoints (
        thread_id TEXT NOT NULL,
        checkpoint_id TEXT NOT NULL,
        parent_checkpoint_id TEXT,
        step BIGINT NOT NULL,
        checkpoint JSONB NOT NULL,
        metadata JSONB NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (thread_id, checkpoint_id)
    )",
    "CREATE INDEX IF NOT EXISTS checkpoints_thread_step_idx ON checkpoints (thread_id, step DESC)",
];

async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(database_url)
        .await
}

/// Apply every migration newer than the recorded version, in one transaction.
async fn run_migrations(
    pool: &PgPool,
    version_table: &str,
    migrations: &[&str],
) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;

    // Serialize concurrent setup() calls across processes.
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(version_table)
        .execute(&mut *tx)
        .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {} (v INTEGER PRIMARY KEY)",
        version_table
    ))
    .execute(&mut *tx)
    .await?;

    let current: Option<i32> = sqlx::query_scalar(&format!(
        "SELECT v FROM {} ORDER BY v DESC LIMIT 1",
        version_table
    ))
    .fetch_optional(&mut *tx)
    .await?;
    let next = current.map(|v| v as usize + 1).unwrap_or(0);

    let insert_version = format!("INSERT INTO {} (v) VALUES ($1)", version_table);
    let mut applied = 0;
    for (version, sql) in migrations.iter().enumerate().skip(next) {
        sqlx::query(sql).execute(&mut *tx).await?;
        sqlx::query(&insert_version)
            .bind(version as i32)
            .execute(&mut *tx)
            .await?;
        applied += 1;
    }

    tx.commit().await?;
    Ok(applied)
}

/// Escape `%`, `_` and `\` so a prefix matches literally in `LIKE`
fn escape_like(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Postgres-backed key-value store
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect using a `postgres://` URL
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let pool = connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    fn pool(&self) -> Result<&PgPool, StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(&self.pool)
    }
}

#[async_trait]
impl BaseStore for PostgresStore {
    async fn setup(&self) -> Result<(), StoreError> {
        let applied = run_migrations(self.pool()?, "store_migrations", STORE_MIGRATIONS)
            .await
            .map_err(|e| StoreError::Setup(e.to_string()))?;
        log::info!("Store setup complete ({} migrations applied)", applied);
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn put(&self, namespace: &[String], key: &str, value: Value) -> Result<(), StoreError> {
        validate_namespace(namespace)?;
        sqlx::query(
            "INSERT INTO store (prefix, key, value) VALUES ($1, $2, $3)
             ON CONFLICT (prefix, key)
             DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(namespace_to_prefix(namespace))
        .bind(key)
        .bind(Json(value))
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    async fn get(&self, namespace: &[String], key: &str) -> Result<Option<Item>, StoreError> {
        validate_namespace(namespace)?;
        let row: Option<(Json<Value>, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT value, created_at, updated_at FROM store WHERE prefix = $1 AND key = $2",
        )
        .bind(namespace_to_prefix(namespace))
        .bind(key)
        .fetch_optional(self.pool()?)
        .await?;

        Ok(row.map(|(value, created_at, updated_at)| Item {
            namespace: namespace.to_vec(),
            key: key.to_string(),
            value: value.0,
            created_at,
            updated_at,
        }))
    }

    async fn delete(&self, namespace: &[String], key: &str) -> Result<(), StoreError> {
        validate_namespace(namespace)?;
        sqlx::query("DELETE FROM store WHERE prefix = $1 AND key = $2")
            .bind(namespace_to_prefix(namespace))
            .bind(key)
            .execute(self.pool()?)
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        namespace_prefix: &[String],
        limit: usize,
    ) -> Result<Vec<Item>, StoreError> {
        validate_namespace(namespace_prefix)?;
        let prefix = namespace_to_prefix(namespace_prefix);
        let rows: Vec<(String, String, Json<Value>, DateTime<Utc>, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT prefix, key, value, created_at, updated_at FROM store
                 WHERE prefix = $1 OR prefix LIKE $2
                 ORDER BY updated_at DESC
                 LIMIT $3",
            )
            .bind(&prefix)
            .bind(format!("{}.%", escape_like(&prefix)))
            .bind(limit as i64)
            .fetch_all(self.pool()?)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(prefix, key, value, created_at, updated_at)| Item {
                namespace: prefix_to_namespace(&prefix),
                key,
                value: value.0,
                created_at,
                updated_at,
            })
            .collect())
    }
}

type CheckpointRow = (
    String,
    String,
    Option<String>,
    i64,
    Json<Map<String, Value>>,
    Json<CheckpointMetadata>,
    DateTime<Utc>,
);

fn row_to_checkpoint(row: CheckpointRow) -> Checkpoint {
    let (thread_id, id, parent_id, step, values, metadata, created_at) = row;
    Checkpoint {
        id,
        thread_id,
        parent_id,
        step,
        values: values.0,
        metadata: metadata.0,
        created_at,
    }
}

/// Postgres-backed checkpoint saver
pub struct PostgresSaver {
    pool: PgPool,
}

impl PostgresSaver {
    /// Connect using a `postgres://` URL
    pub async fn open(database_url: &str) -> Result<Self, CheckpointError> {
        let pool = connect(database_url)
            .await
            .map_err(|e| CheckpointError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    fn pool(&self) -> Result<&PgPool, CheckpointError> {
        if self.pool.is_closed() {
            return Err(CheckpointError::Closed);
        }
        Ok(&self.pool)
    }
}

#[async_trait]
impl Checkpointer for PostgresSaver {
    async fn setup(&self) -> Result<(), CheckpointError> {
        let applied = run_migrations(self.pool()?, "checkpoint_migrations", CHECKPOINT_MIGRATIONS)
            .await
            .map_err(|e| CheckpointError::Setup(e.to_string()))?;
        log::info!("Checkpointer setup complete ({} migrations applied)", applied);
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        sqlx::query(
            "INSERT INTO checkpoints
                (thread_id, checkpoint_id, parent_checkpoint_id, step, checkpoint, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (thread_id, checkpoint_id)
             DO UPDATE SET checkpoint = EXCLUDED.checkpoint, metadata = EXCLUDED.metadata",
        )
        .bind(&checkpoint.thread_id)
        .bind(&checkpoint.id)
        .bind(&checkpoint.parent_id)
        .bind(checkpoint.step)
        .bind(Json(&checkpoint.values))
        .bind(Json(&checkpoint.metadata))
        .bind(checkpoint.created_at)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    async fn get_latest(
        &self,
        config: &RunnableConfig,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let thread_id = require_thread_id(config)?;
        let row: Option<CheckpointRow> = sqlx::query_as(
            "SELECT thread_id, checkpoint_id, parent_checkpoint_id, step, checkpoint, metadata, created_at
             FROM checkpoints
             WHERE thread_id = $1
             ORDER BY step DESC, created_at DESC
             LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row.map(row_to_checkpoint))
    }

    async fn list(
        &self,
        config: &RunnableConfig,
        limit: Option<usize>,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let thread_id = require_thread_id(config)?;
        let rows: Vec<CheckpointRow> = sqlx::query_as(
            "SELECT thread_id, checkpoint_id, parent_checkpoint_id, step, checkpoint, metadata, created_at
             FROM checkpoints
             WHERE thread_id = $1
             ORDER BY step DESC, created_at DESC
             LIMIT $2",
        )
        .bind(thread_id)
        .bind(limit.map(|l| l as i64))
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows.into_iter().map(row_to_checkpoint).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("memories.u1"), "memories.u1");
        assert_eq!(escape_like("100%_off"), "100\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_migrations_are_idempotent_statements() {
        for sql in STORE_MIGRATIONS.iter().chain(CHECKPOINT_MIGRATIONS) {
            assert!(sql.contains("IF NOT EXISTS"), "not idempotent: {}", sql);
        }
    }

    #[tokio::test]
    async fn test_open_fails_fast_on_bad_url() {
        let err = PostgresStore::open("not-a-url").await.err().unwrap();
        assert!(matches!(err, StoreError::Connection(_)));

        let err = PostgresSaver::open("not-a-url").await.err().unwrap();
        assert!(matches!(err, CheckpointError::Connection(_)));
    }
}
