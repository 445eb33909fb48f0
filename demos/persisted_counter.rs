//! Persisted counter example
//!
//! Run it twice: the second run starts from where the first one stopped.

use serde_json::json;
use stowage::{Config, PersistOptions, PersistentStore};

fn main() {
    println!("=== Persisted Counter Example ===\n");

    let config = Config::from_env();
    println!("Storage directory: {}", config.storage_dir.display());

    // Create a store backed by the default file storage
    let store = PersistentStore::new(
        json!({"count": 0, "label": "clicks"}),
        PersistOptions::new("counter").config(config),
    );
    println!("Loaded state under key {}: {}", store.storage_key(), store.get());

    // Re-render only when the count changes
    store.watch(
        |state| state["count"].as_i64().unwrap_or_default(),
        |count| println!("Count is now {count}"),
    );

    // Bump the count three times; only the `count` key is touched
    for _ in 0..3 {
        store.update(|state| {
            let count = state["count"].as_i64().unwrap_or_default();
            json!({ "count": count + 1 })
        });
    }

    // Renaming the label does not re-render the watcher
    store.set(json!({"label": "taps"}));

    println!("\nFinal state: {}", store.get());
}
