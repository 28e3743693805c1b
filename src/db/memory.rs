//! In-memory state store for tests.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::StateStore;

#[derive(Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn merge(&self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut values = self.values.write().await;
        values.extend(entries);
        Ok(())
    }
}
