// Consistency tests for concurrent writers
// Ensures increments never lose updates and batches stay atomic

mod common;

use common::{all_backends, fields, seed_collection};
use futures::StreamExt;
use serde_json::json;
use std::collections::HashSet;
use tally_core::{CollectionPath, DocRef, FieldPath};
use tally_store::{ScanOptions, WriteOp};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() {
    for backend in all_backends().await {
        let doc = DocRef::parse("waves/w1").unwrap();
        backend
            .store
            .set(&doc, fields(json!({"counts": {"splashes": 0}})))
            .await
            .unwrap();

        let field = FieldPath::parse("counts.splashes").unwrap();
        let mut handles = Vec::new();
        for _ in 0..100 {
            let store = backend.store.clone();
            let doc = doc.clone();
            let field = field.clone();
            handles.push(tokio::spawn(async move {
                store.atomic_increment(&doc, &field, 1).await.unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let data = backend.store.get(&doc).await.unwrap().unwrap();
        assert_eq!(data["counts"]["splashes"], json!(100), "{}", backend.name());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decrements_floor_at_zero() {
    for backend in all_backends().await {
        let doc = DocRef::parse("waves/w1").unwrap();
        backend
            .store
            .set(&doc, fields(json!({"counts": {"hugs": 5}})))
            .await
            .unwrap();

        let field = FieldPath::parse("counts.hugs").unwrap();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = backend.store.clone();
            let doc = doc.clone();
            let field = field.clone();
            handles.push(tokio::spawn(async move {
                store.atomic_increment(&doc, &field, -1).await.unwrap()
            }));
        }
        for handle in handles {
            let value = handle.await.unwrap();
            assert!(value >= 0, "{}: observed {value}", backend.name());
        }

        let data = backend.store.get(&doc).await.unwrap().unwrap();
        assert_eq!(data["counts"]["hugs"], json!(0), "{}", backend.name());
    }
}

#[tokio::test]
async fn test_failed_batch_leaves_no_partial_writes() {
    for backend in all_backends().await {
        let docs = seed_collection(backend.store.as_ref(), "users", 10).await;
        let field = FieldPath::parse("username_lc").unwrap();

        let mut ops: Vec<WriteOp> = docs
            .iter()
            .map(|doc| WriteOp::update(doc.clone(), field.clone(), json!("x")))
            .collect();
        ops.push(WriteOp::update(
            DocRef::parse("users/ghost").unwrap(),
            field.clone(),
            json!("x"),
        ));

        let err = backend.store.commit_batch(&ops).await.unwrap_err();
        assert!(err.is_missing(), "{}: {err}", backend.name());

        for doc in &docs {
            let data = backend.store.get(doc).await.unwrap().unwrap();
            assert!(
                !data.contains_key("username_lc"),
                "{}: {doc} was partially written",
                backend.name()
            );
        }
    }
}

#[tokio::test]
async fn test_oversized_batch_is_rejected_before_writing() {
    for backend in all_backends().await {
        let docs = seed_collection(backend.store.as_ref(), "users", 501).await;
        let ops: Vec<WriteOp> = docs.iter().cloned().map(WriteOp::delete).collect();

        let err = backend.store.commit_batch(&ops).await.unwrap_err();
        assert!(err.to_string().contains("exceeds the limit of 500"));

        let users = CollectionPath::parse("users").unwrap();
        let mut stream = backend
            .store
            .scan_pages(&users, ScanOptions::new(1000), None);
        let page = stream.next().await.unwrap().unwrap();
        assert_eq!(page.documents.len(), 501, "{}", backend.name());
    }
}

#[tokio::test]
async fn test_create_during_scan_does_not_duplicate() {
    for backend in all_backends().await {
        seed_collection(backend.store.as_ref(), "users", 40).await;
        let users = CollectionPath::parse("users").unwrap();

        let mut stream = backend
            .store
            .scan_pages(&users, ScanOptions::new(10), None);
        let mut seen = HashSet::new();
        let mut pages = 0;
        while let Some(page) = stream.next().await {
            for snapshot in page.unwrap().documents {
                assert!(seen.insert(snapshot.id().to_string()));
            }
            pages += 1;
            if pages == 1 {
                // Sorts after everything already seeded.
                let late = users.doc("zz-late").unwrap();
                backend.store.set(&late, Default::default()).await.unwrap();
            }
        }

        assert!(seen.contains("zz-late"), "{}", backend.name());
        assert_eq!(seen.len(), 41, "{}", backend.name());
    }
}
