//! Test fixtures.

use serde_json::{Value, json};
use tally_core::{DocRef, Fields};
use tally_store::DocumentStore;

#[allow(dead_code)]
pub fn doc(path: &str) -> DocRef {
    DocRef::parse(path).unwrap()
}

#[allow(dead_code)]
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Create a wave with zeroed counts and `children` splashes.
#[allow(dead_code)]
pub async fn seed_wave(store: &dyn DocumentStore, path: &str, children: usize) -> DocRef {
    let wave = doc(path);
    store
        .set(
            &wave,
            fields(json!({
                "counts": {"splashes": children, "hugs": 0, "echoes": 0, "regularSplashes": 0}
            })),
        )
        .await
        .unwrap();
    let splashes = wave.collection("splashes").unwrap();
    for i in 0..children {
        store
            .set(&splashes.doc(&format!("s{i}")).unwrap(), Fields::new())
            .await
            .unwrap();
    }
    wave
}
