//! Document store abstraction and backends for tally.
//!
//! This crate provides:
//! - Point reads and writes on JSON documents addressed by path
//! - Atomic single-field increments floored at zero
//! - All-or-nothing batch commits of up to 500 operations
//! - Paginated collection scans with resumable cursors
//! - Backends: SQLite and in-memory

pub mod backends;
pub mod cursor;
pub mod error;
pub mod traits;

pub use backends::{memory::MemoryStore, sqlite::SqliteStore};
pub use error::{StoreError, StoreResult};
pub use traits::{
    DocumentPage, DocumentStore, PageStream, ScanCursor, ScanOptions, WriteKind, WriteOp,
};

use std::sync::Arc;
use tally_core::config::StoreConfig;

/// Create a document store from configuration.
pub async fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn DocumentStore>> {
    match config {
        StoreConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store))
        }
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::DocRef;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_sqlite_ok() {
        let temp = tempdir().unwrap();
        let config = StoreConfig::Sqlite {
            path: temp.path().join("nested").join("tally.db"),
            query_timeout_secs: Some(30),
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "sqlite");

        let doc = DocRef::parse("users/alice").unwrap();
        store.set(&doc, Default::default()).await.unwrap();
        assert!(store.get(&doc).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn from_config_memory_ok() {
        let store = from_config(&StoreConfig::Memory).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        store.health_check().await.unwrap();
    }
}
