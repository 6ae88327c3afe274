use serde_json::{Value, json};
use tally_core::config::JobsConfig;
use tally_core::{DocRef, Fields};
use tally_store::DocumentStore;

pub fn doc(path: &str) -> DocRef {
    DocRef::parse(path).unwrap()
}

pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Job settings with a custom batch size and no retry delay.
pub fn jobs_config(batch_size: usize) -> JobsConfig {
    JobsConfig {
        batch_size,
        retry_backoff_ms: 1,
        ..Default::default()
    }
}

/// Create `count` users `users/u00000`... with mixed-case `@`-prefixed names.
pub async fn seed_users(store: &dyn DocumentStore, count: usize) {
    for i in 0..count {
        store
            .set(
                &doc(&format!("users/u{i:05}")),
                fields(json!({ "username": format!("@User{i}") })),
            )
            .await
            .unwrap();
    }
}

/// Create `parents` waves, each with `children` splashes and `children` echoes.
///
/// Every wave carries a `views` counter that resets must leave alone.
pub async fn seed_waves(store: &dyn DocumentStore, parents: usize, children: usize) -> Vec<DocRef> {
    let mut waves = Vec::with_capacity(parents);
    for p in 0..parents {
        let wave = doc(&format!("waves/w{p}"));
        store
            .set(
                &wave,
                fields(json!({
                    "title": format!("wave {p}"),
                    "counts": {
                        "splashes": children,
                        "echoes": children,
                        "hugs": 2,
                        "regularSplashes": 1,
                        "views": 17
                    }
                })),
            )
            .await
            .unwrap();
        for sub in ["splashes", "echoes"] {
            let collection = wave.collection(sub).unwrap();
            for c in 0..children {
                store
                    .set(&collection.doc(&format!("c{c}")).unwrap(), Default::default())
                    .await
                    .unwrap();
            }
        }
        waves.push(wave);
    }
    waves
}
