//! Durable state for crash recovery.
//!
//! The bot persists exactly two things per account:
//! - the stick (descriptor of the one order currently in flight)
//! - the anchor price (price of the last completed trade)
//!
//! They live in a [`StateStore`], a small key-value interface with
//! synchronous-commit semantics and a single writer per account.

#[cfg(test)]
mod memory;
mod sqlite;
mod stick_store;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;
pub use stick_store::StickStateStore;

/// Durable mapping from keys to JSON values.
///
/// Writes must be committed before the call returns.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Write several keys atomically.
    async fn merge(&self, entries: Vec<(String, Value)>) -> Result<()>;
}
