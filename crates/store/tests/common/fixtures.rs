use serde_json::Value;
use std::sync::Arc;
use tally_core::{CollectionPath, DocRef, Fields};
use tally_store::{DocumentStore, MemoryStore, SqliteStore};
use tempfile::TempDir;

/// A store under test. Keeps the SQLite temp dir alive for the test's duration.
pub struct TestBackend {
    pub store: Arc<dyn DocumentStore>,
    _temp_dir: Option<TempDir>,
}

impl TestBackend {
    pub fn name(&self) -> &'static str {
        self.store.backend_name()
    }
}

/// One instance of every backend, so contract tests run against each.
pub async fn all_backends() -> Vec<TestBackend> {
    let temp_dir = TempDir::new().unwrap();
    let sqlite = SqliteStore::new(temp_dir.path().join("tally.db"), None)
        .await
        .unwrap();

    vec![
        TestBackend {
            store: Arc::new(MemoryStore::new()),
            _temp_dir: None,
        },
        TestBackend {
            store: Arc::new(sqlite),
            _temp_dir: Some(temp_dir),
        },
    ]
}

/// Convert a `json!` object literal into a field map.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Create `count` documents named `doc-00000`, `doc-00001`, ... in `collection`.
pub async fn seed_collection(
    store: &dyn DocumentStore,
    collection: &str,
    count: usize,
) -> Vec<DocRef> {
    let collection = CollectionPath::parse(collection).unwrap();
    let mut docs = Vec::with_capacity(count);
    for i in 0..count {
        let doc = collection.doc(&format!("doc-{i:05}")).unwrap();
        store
            .set(&doc, fields(serde_json::json!({ "index": i })))
            .await
            .unwrap();
        docs.push(doc);
    }
    docs
}
