//! Exactly-once retrieval under concurrent takes, for both backends.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use serde_json::json;

use handoff::{CodeHasher, HandoffStore, MemoryStore, RetrievalMode, SqliteStore, Taken};

const RACERS: usize = 8;

fn count_hits(results: Vec<Taken>) -> (usize, usize) {
    let hits = results.iter().filter(|t| matches!(t, Taken::Found(_))).count();
    let misses = results.iter().filter(|t| matches!(t, Taken::Missing)).count();
    (hits, misses)
}

#[test]
fn test_concurrent_takes_on_separate_sqlite_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let hash = CodeHasher::new("pepper").hash_code("AbC123xYz890");

    // Every racer gets its own connection to the same file, like separate
    // server processes sharing one database.
    let stores: Vec<SqliteStore> = (0..RACERS)
        .map(|_| SqliteStore::open(&path, RetrievalMode::SingleUse).unwrap())
        .collect();
    stores[0]
        .put(&hash, json!({ "ciphertext": "abc", "v": 1 }), Utc::now() + Duration::minutes(5))
        .unwrap();

    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = stores
        .into_iter()
        .map(|store| {
            let barrier = Arc::clone(&barrier);
            let hash = hash.clone();
            thread::spawn(move || {
                barrier.wait();
                store.take(&hash).unwrap().outcome
            })
        })
        .collect();

    let results = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(count_hits(results), (1, RACERS - 1));
}

#[test]
fn test_concurrent_takes_on_shared_memory_store() {
    let store = Arc::new(MemoryStore::new(RetrievalMode::SingleUse));
    let hash = CodeHasher::new("pepper").hash_code("AbC123xYz890");
    store
        .put(&hash, json!("once"), Utc::now() + Duration::minutes(5))
        .unwrap();

    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            let hash = hash.clone();
            thread::spawn(move || {
                barrier.wait();
                store.take(&hash).unwrap().outcome
            })
        })
        .collect();

    let results = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(count_hits(results), (1, RACERS - 1));
}

#[test]
fn test_backends_agree_on_lifecycle() {
    let stores: Vec<Box<dyn HandoffStore>> = vec![
        Box::new(MemoryStore::new(RetrievalMode::SingleUse)),
        Box::new(SqliteStore::open_in_memory(RetrievalMode::SingleUse).unwrap()),
    ];
    let hasher = CodeHasher::new("pepper");

    for store in stores {
        let live = hasher.hash_code("live-code-01");
        let stale = hasher.hash_code("stale-code-1");
        store.put(&live, json!("a"), Utc::now() + Duration::minutes(5)).unwrap();
        store.put(&stale, json!("b"), Utc::now() - Duration::minutes(5)).unwrap();

        let first = store.take(&live).unwrap();
        assert!(first.found(), "{}", store.backend());
        assert_eq!(first.backend, store.backend());
        assert!(!store.take(&live).unwrap().found());

        let expired = store.take(&stale).unwrap();
        assert!(!expired.found() && expired.expired());
        let after = store.take(&stale).unwrap();
        assert!(!after.found() && !after.expired());

        assert_eq!(store.cleanup_expired().unwrap().purged, 0);
    }
}
