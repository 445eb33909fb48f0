//! Persistence tests: synchronous and delayed backends.

use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;
use stowage::{
    CodecError, Config, MemoryStorage, PersistOptions, PersistentStore, Phase, Spawner,
    StorageAdapter, StorageError, StorageFuture,
};

/// Answers reads after a delay, with the value present at call time.
///
/// Writes land immediately, in call order, and acknowledge later.
#[derive(Clone)]
struct DelayedStorage {
    inner: MemoryStorage,
    delay: Duration,
    fail_reads: bool,
}

impl DelayedStorage {
    fn new(inner: MemoryStorage, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            fail_reads: false,
        }
    }
}

impl StorageAdapter for DelayedStorage {
    fn get_item(&self, key: &str) -> StorageFuture<Option<String>> {
        let value = self.inner.peek(key);
        let delay = self.delay;
        let fail = self.fail_reads;
        StorageFuture::pending(async move {
            tokio::time::sleep(delay).await;
            if fail {
                return Err(StorageError::Backend("connection reset".into()));
            }
            Ok(value)
        })
    }

    fn set_item(&self, key: &str, value: String) -> StorageFuture<()> {
        self.inner.insert(key, value);
        StorageFuture::pending(async {
            tokio::task::yield_now().await;
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> StorageFuture<()> {
        let inner = self.inner.clone();
        let key = key.to_string();
        StorageFuture::pending(async move {
            tokio::task::yield_now().await;
            inner.remove_item(&key).await
        })
    }
}

#[test]
fn round_trip_through_shared_memory() {
    let backend = MemoryStorage::new();

    let first = PersistentStore::new(
        json!({"v": 0}),
        PersistOptions::new("x").storage(backend.clone()),
    );
    first.set(json!({"v": 1}));

    let second = PersistentStore::new(
        json!({"v": 0}),
        PersistOptions::new("x").storage(backend.clone()),
    );
    assert_eq!(second.get(), json!({"v": 1}));
    assert_eq!(second.phase(), Phase::Ready);
}

#[test]
fn round_trip_through_default_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default().with_storage_dir(dir.path());

    let first = PersistentStore::new(
        json!({"v": 0}),
        PersistOptions::new("x").config(config.clone()),
    );
    first.set(json!({"v": 1}));

    let second = PersistentStore::new(json!({"v": 0}), PersistOptions::new("x").config(config));
    assert_eq!(second.get(), json!({"v": 1}));
    assert!(dir.path().join("stowage-x.json").exists());
}

#[test]
fn stores_with_different_names_do_not_collide() {
    let backend = MemoryStorage::new();
    let a = PersistentStore::new(1, PersistOptions::new("a").storage(backend.clone()));
    let b = PersistentStore::new(2, PersistOptions::new("b").storage(backend.clone()));

    a.set(10);
    b.set(20);

    assert_eq!(backend.peek("stowage-a").as_deref(), Some("10"));
    assert_eq!(backend.peek("stowage-b").as_deref(), Some("20"));
}

#[test]
fn corrupt_payload_falls_back_to_initial() {
    let backend = MemoryStorage::new();
    backend.insert("stowage-x", "\u{1}not json");

    let store: PersistentStore<Value> = PersistentStore::new(
        json!({"v": "initial"}),
        PersistOptions::new("x").storage(backend.clone()),
    );

    assert_eq!(store.get(), json!({"v": "initial"}));
    assert_eq!(backend.peek("stowage-x").as_deref(), Some(r#"{"v":"initial"}"#));
}

#[test]
fn remove_storage_deletes_entry_only() {
    let backend = MemoryStorage::new();
    let store = PersistentStore::new(
        json!({"v": 1}),
        PersistOptions::new("x").storage(backend.clone()),
    );

    store.remove_storage().now_or_never().unwrap().unwrap();
    assert!(!backend.contains("stowage-x"));
    assert_eq!(store.get(), json!({"v": 1}));

    store.set(json!({"v": 2}));
    assert_eq!(backend.peek("stowage-x").as_deref(), Some(r#"{"v":2}"#));
}

#[tokio::test]
async fn late_load_is_applied_when_untouched() {
    let backend = MemoryStorage::new();
    backend.insert("stowage-prefs", r#"{"v":"saved"}"#);
    let storage = DelayedStorage::new(backend.clone(), Duration::from_millis(20));

    let notified = Arc::new(AtomicUsize::new(0));
    let store = PersistentStore::new(
        json!({"v": "initial", "theme": "dark"}),
        PersistOptions::new("prefs").storage(storage),
    );
    let notified_clone = notified.clone();
    store.subscribe(move |_, _| {
        notified_clone.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(store.phase(), Phase::Loading);
    assert_eq!(store.get(), json!({"v": "initial", "theme": "dark"}));

    store.hydrated().await;

    assert_eq!(store.phase(), Phase::Ready);
    assert_eq!(store.get(), json!({"v": "saved", "theme": "dark"}));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert_eq!(
        backend.peek("stowage-prefs").as_deref(),
        Some(r#"{"theme":"dark","v":"saved"}"#)
    );
}

#[tokio::test]
async fn local_write_beats_late_load() {
    let backend = MemoryStorage::new();
    backend.insert("stowage-race", r#"{"v":"stale"}"#);
    let storage = DelayedStorage::new(backend.clone(), Duration::from_millis(20));

    let store = PersistentStore::new(
        json!({"v": "initial"}),
        PersistOptions::new("race").storage(storage),
    );
    store.set(json!({"v": "local"}));

    store.hydrated().await;

    assert_eq!(store.get(), json!({"v": "local"}));
    assert_eq!(backend.peek("stowage-race").as_deref(), Some(r#"{"v":"local"}"#));
}

#[tokio::test]
async fn late_corrupt_payload_is_removed() {
    let backend = MemoryStorage::new();
    backend.insert("stowage-x", "garbage");
    let storage = DelayedStorage::new(backend.clone(), Duration::from_millis(5));

    let store = PersistentStore::new(json!({"v": 0}), PersistOptions::new("x").storage(storage));
    store.hydrated().await;
    // Let the spawned removal finish.
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(store.get(), json!({"v": 0}));
    assert!(!backend.contains("stowage-x"));
}

#[tokio::test]
async fn late_read_failure_keeps_initial_state() {
    let backend = MemoryStorage::new();
    backend.insert("stowage-x", r#"{"v":9}"#);
    let mut storage = DelayedStorage::new(backend.clone(), Duration::from_millis(5));
    storage.fail_reads = true;

    let store = PersistentStore::new(json!({"v": 0}), PersistOptions::new("x").storage(storage));
    store.hydrated().await;

    assert_eq!(store.get(), json!({"v": 0}));
    assert_eq!(store.phase(), Phase::Ready);
    assert_eq!(backend.peek("stowage-x").as_deref(), Some(r#"{"v":9}"#));
}

#[test]
fn pending_load_without_runtime_uses_worker_thread() {
    /// Resolves reads from a plain thread, no tokio involved.
    struct ThreadStorage(MemoryStorage);

    impl StorageAdapter for ThreadStorage {
        fn get_item(&self, key: &str) -> StorageFuture<Option<String>> {
            let value = self.0.peek(key);
            let (tx, rx) = futures::channel::oneshot::channel();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                let _ = tx.send(value);
            });
            StorageFuture::pending(async move {
                rx.await
                    .map_err(|_| StorageError::Backend("reader dropped".into()))
            })
        }

        fn set_item(&self, key: &str, value: String) -> StorageFuture<()> {
            self.0.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> StorageFuture<()> {
            self.0.remove_item(key)
        }
    }

    let backend = MemoryStorage::new();
    backend.insert("stowage-n", "41");

    let store = PersistentStore::new(
        0_u32,
        PersistOptions::new("n").storage(ThreadStorage(backend)),
    );
    assert_eq!(store.phase(), Phase::Loading);

    futures::executor::block_on(store.hydrated());

    assert_eq!(store.get(), 41);
}

/// Hands out a read that stays pending until its sender fires.
struct GatedStorage {
    inner: MemoryStorage,
    read: Mutex<Option<futures::channel::oneshot::Receiver<Option<String>>>>,
}

impl StorageAdapter for GatedStorage {
    fn get_item(&self, _key: &str) -> StorageFuture<Option<String>> {
        let read = self.read.lock().unwrap().take();
        StorageFuture::pending(async move {
            match read {
                Some(read) => read
                    .await
                    .map_err(|_| StorageError::Backend("read abandoned".into())),
                None => Ok(None),
            }
        })
    }

    fn set_item(&self, key: &str, value: String) -> StorageFuture<()> {
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> StorageFuture<()> {
        self.inner.remove_item(key)
    }
}

#[test]
fn local_write_beats_load_finishing_on_another_thread() {
    for _ in 0..2000 {
        let (tx, rx) = futures::channel::oneshot::channel();
        let backend = MemoryStorage::new();
        let storage = GatedStorage {
            inner: backend.clone(),
            read: Mutex::new(Some(rx)),
        };

        // Hydration starts on its own thread the moment the barrier opens.
        let barrier = Arc::new(Barrier::new(2));
        let spawner = Spawner::new({
            let barrier = barrier.clone();
            move |future| {
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    futures::executor::block_on(future);
                });
            }
        });

        let store = PersistentStore::new(
            json!({"v": "initial"}),
            PersistOptions::new("race").storage(storage).spawner(spawner),
        );
        tx.send(Some(r#"{"v":"stale"}"#.to_string())).unwrap();

        barrier.wait();
        store.set(json!({"v": "local"}));
        futures::executor::block_on(store.hydrated());

        assert_eq!(store.get(), json!({"v": "local"}));
        assert_eq!(backend.peek("stowage-race").as_deref(), Some(r#"{"v":"local"}"#));
    }
}

/// Applies each write inside its future, later writes finishing sooner.
#[derive(Clone)]
struct SlowWriteStorage {
    inner: MemoryStorage,
    issued: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl StorageAdapter for SlowWriteStorage {
    fn get_item(&self, key: &str) -> StorageFuture<Option<String>> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: String) -> StorageFuture<()> {
        let nth = self.issued.fetch_add(1, Ordering::SeqCst) as u64;
        let delay = Duration::from_millis(40u64.saturating_sub(nth * 4));
        let inner = self.inner.clone();
        let completed = self.completed.clone();
        let key = key.to_string();
        StorageFuture::pending(async move {
            tokio::time::sleep(delay).await;
            inner.insert(key, value);
            completed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn remove_item(&self, key: &str) -> StorageFuture<()> {
        self.inner.remove_item(key)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pending_writes_land_in_commit_order() {
    let storage = SlowWriteStorage {
        inner: MemoryStorage::new(),
        issued: Arc::new(AtomicUsize::new(0)),
        completed: Arc::new(AtomicUsize::new(0)),
    };

    let store = PersistentStore::new(0_u32, PersistOptions::new("n").storage(storage.clone()));
    for n in 1..=9 {
        store.set(n);
    }

    let all_written = async {
        while storage.completed.load(Ordering::SeqCst) < 10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), all_written)
        .await
        .expect("writes did not finish");

    assert_eq!(storage.inner.peek("stowage-n").as_deref(), Some("9"));
}

#[tokio::test]
async fn hydration_panic_still_reaches_ready() {
    let backend = MemoryStorage::new();
    backend.insert("stowage-x", "1");
    let storage = DelayedStorage::new(backend, Duration::from_millis(5));

    let store = PersistentStore::new(
        0_u32,
        PersistOptions::new("x")
            .storage(storage)
            .deserializer(|_| -> Result<u32, CodecError> { panic!("deserializer bug") }),
    );

    tokio::time::timeout(Duration::from_secs(5), store.hydrated())
        .await
        .expect("hydration never finished");

    assert_eq!(store.phase(), Phase::Ready);
    assert_eq!(store.get(), 0);
}
