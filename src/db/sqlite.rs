//! SQLite-backed key-value state.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use super::StateStore;

/// Durable JSON values keyed by `(namespace, key)`.
///
/// The namespace is the bot id, so several bots can share one file
/// without touching each other's slots.
pub struct SqliteStateStore {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteStateStore {
    /// Open (creating if needed) the database at `database_url`.
    pub async fn new(database_url: &str, namespace: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self {
            pool,
            namespace: namespace.to_string(),
        };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_state (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (namespace, key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create kv_state table")?;

        Ok(())
    }
}

const UPSERT: &str = r#"
    INSERT INTO kv_state (namespace, key, value, updated_at)
    VALUES (?, ?, ?, datetime('now'))
    ON CONFLICT(namespace, key) DO UPDATE SET
        value = excluded.value,
        updated_at = excluded.updated_at
"#;

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_state WHERE namespace = ? AND key = ?")
                .bind(&self.namespace)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to read '{}'", key))?;

        row.map(|(raw,)| {
            serde_json::from_str(&raw).with_context(|| format!("Corrupt JSON under '{}'", key))
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        sqlx::query(UPSERT)
            .bind(&self.namespace)
            .bind(key)
            .bind(value.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to write '{}'", key))?;

        Ok(())
    }

    async fn merge(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for (key, value) in &entries {
            sqlx::query(UPSERT)
                .bind(&self.namespace)
                .bind(key)
                .bind(value.to_string())
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to write '{}'", key))?;
        }

        tx.commit().await.context("Failed to commit state")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(dir: &tempfile::TempDir) -> String {
        format!("sqlite://{}", dir.path().join("state.db").display())
    }

    #[tokio::test]
    async fn test_set_get_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStateStore::new(&url(&dir), "001").await.unwrap();

        assert_eq!(store.get("stick").await.unwrap(), None);

        store.set("lastFilledOrderPrice", json!("101.5")).await.unwrap();
        assert_eq!(
            store.get("lastFilledOrderPrice").await.unwrap(),
            Some(json!("101.5"))
        );

        store.set("lastFilledOrderPrice", json!("99")).await.unwrap();
        assert_eq!(store.get("lastFilledOrderPrice").await.unwrap(), Some(json!("99")));
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SqliteStateStore::new(&url(&dir), "001").await.unwrap();
            store
                .merge(vec![
                    ("a".to_string(), json!({"x": 1})),
                    ("b".to_string(), json!(null)),
                ])
                .await
                .unwrap();
        }

        let store = SqliteStateStore::new(&url(&dir), "001").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({"x": 1})));
        assert_eq!(store.get("b").await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let one = SqliteStateStore::new(&url(&dir), "001").await.unwrap();
        one.set("k", json!(1)).await.unwrap();
        drop(one);

        let two = SqliteStateStore::new(&url(&dir), "002").await.unwrap();
        assert_eq!(two.get("k").await.unwrap(), None);
    }
}
