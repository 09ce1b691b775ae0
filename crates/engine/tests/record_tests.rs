//! Record batches against a shared store: id allocation, atomicity and retries

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use recordkv_concurrency::RetryConfig;
use recordkv_core::{Error, Mode, Record, Result, TransactionKind};
use recordkv_engine::{Cache, CacheConfig, Effect, RecordCoordinator};
use recordkv_storage::{Command, MemoryStore, Reply, StoreClient, StoreSession};

fn patient_retry() -> RetryConfig {
    RetryConfig::new()
        .with_max_retries(1000)
        .with_base_delay_ms(1)
        .with_max_delay_ms(4)
}

/// Store whose sessions see a write to `key` right before every EXEC
struct ContendedStore {
    inner: MemoryStore,
    key: String,
    only_once: bool,
    fired: AtomicBool,
}

impl ContendedStore {
    fn always(key: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            key: key.to_string(),
            only_once: false,
            fired: AtomicBool::new(false),
        }
    }

    fn once(key: &str) -> Self {
        Self {
            only_once: true,
            ..Self::always(key)
        }
    }
}

struct ContendedSession<'a> {
    inner: Box<dyn StoreSession + 'a>,
    store: &'a ContendedStore,
}

impl StoreClient for ContendedStore {
    fn execute(&self, command: Command) -> Result<Reply> {
        self.inner.execute(command)
    }

    fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.inner.pipeline(commands)
    }

    fn atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.inner.atomic(commands)
    }

    fn session(&self) -> Result<Box<dyn StoreSession + '_>> {
        Ok(Box::new(ContendedSession {
            inner: self.inner.session()?,
            store: self,
        }))
    }
}

impl StoreSession for ContendedSession<'_> {
    fn watch(&mut self, keys: &[String]) -> Result<()> {
        self.inner.watch(keys)
    }

    fn execute(&mut self, command: Command) -> Result<Reply> {
        self.inner.execute(command)
    }

    fn exec(&mut self, commands: Vec<Command>) -> Result<Option<Vec<Reply>>> {
        let already = self.store.fired.swap(true, Ordering::SeqCst);
        if !(self.store.only_once && already) {
            self.store.inner.execute(Command::Incr {
                key: self.store.key.clone(),
            })?;
        }
        self.inner.exec(commands)
    }

    fn discard(&mut self) -> Result<()> {
        self.inner.discard()
    }
}

#[test]
fn test_concurrent_transaction_inserts_get_distinct_ids() {
    let store = MemoryStore::new();
    let num_threads = 8;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let retry = patient_retry();
                let coordinator = RecordCoordinator::new(&store, &retry);
                let mut records = vec![Record::insert("jobs").field("worker", t as i64)];
                barrier.wait();
                coordinator.process(&mut records, Mode::Transaction).unwrap();
                records[0].id().unwrap().parse::<u64>().unwrap()
            })
        })
        .collect();

    let ids: BTreeSet<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let expected: BTreeSet<u64> = (1..=num_threads as u64).collect();
    assert_eq!(ids, expected);
    assert_eq!(
        store.execute(Command::Get { key: "jobs:id".into() }).unwrap(),
        Reply::bulk(num_threads.to_string())
    );
}

#[test]
fn test_concurrent_pipeline_inserts_reserve_disjoint_ranges() {
    let store = MemoryStore::new();
    let num_threads = 4;
    let per_thread = 5;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let retry = RetryConfig::no_retry();
                let coordinator = RecordCoordinator::new(&store, &retry);
                let mut records: Vec<Record> = (0..per_thread)
                    .map(|i| Record::insert("events").field("n", i as i64))
                    .collect();
                barrier.wait();
                coordinator.process(&mut records, Mode::Pipeline).unwrap();
                records
                    .iter()
                    .map(|r| r.id().unwrap().parse::<u64>().unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        let batch = handle.join().unwrap();
        assert!(batch.windows(2).all(|w| w[1] == w[0] + 1));
        ids.extend(batch);
    }
    ids.sort_unstable();
    let expected: Vec<u64> = (1..=(num_threads * per_thread) as u64).collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_transaction_batch_is_all_or_nothing() {
    let store = MemoryStore::new();
    let retry = RetryConfig::default();
    let coordinator = RecordCoordinator::new(&store, &retry);
    let mut records = vec![
        Record::insert("t").field("a", 1),
        Record::new("t", TransactionKind::Update).field("a", 2),
        Record::insert("t").with_id("x").field("a", 3),
    ];

    let err = coordinator.process(&mut records, Mode::Transaction).unwrap_err();
    assert!(matches!(err, Error::MissingKey { ref table, kind: TransactionKind::Update } if table == "t"));
    assert_eq!(store.commands_applied(), 0);
    assert_eq!(store.key_count(), 0);
}

#[test]
fn test_pipeline_stops_at_invalid_record() {
    let store = MemoryStore::new();
    let retry = RetryConfig::default();
    let coordinator = RecordCoordinator::new(&store, &retry);
    let mut records = vec![
        Record::insert("t").with_id("a").field("v", 1),
        Record::insert("t").with_id("b").field("v", 2),
        Record::insert("t").with_id("c"),
        Record::insert("t").with_id("d").field("v", 4),
    ];

    let err = coordinator.process(&mut records, Mode::Pipeline).unwrap_err();
    assert!(matches!(err, Error::EmptyRecord { .. }));
    assert_eq!(store.key_count(), 2);
    assert_eq!(
        store.execute(Command::Exists { key: "t:d".into() }).unwrap(),
        Reply::Int(0)
    );
}

#[test]
fn test_retry_exhaustion_writes_nothing() {
    let store = ContendedStore::always("t:id");
    let retry = RetryConfig::new().with_max_retries(2).with_base_delay_ms(1);
    let coordinator = RecordCoordinator::new(&store, &retry);
    let mut records = vec![Record::insert("t").field("a", 1)];

    let err = coordinator.process(&mut records, Mode::Transaction).unwrap_err();
    assert!(matches!(err, Error::TransactionRetryExhausted { attempts: 3 }));
    assert_eq!(records[0].id(), None);
    // only the out-of-band counter bumps landed
    assert_eq!(store.inner.key_count(), 1);
    assert_eq!(
        store.execute(Command::Get { key: "t:id".into() }).unwrap(),
        Reply::bulk("3")
    );
}

#[test]
fn test_conflict_then_success_uses_fresh_counter() {
    let store = ContendedStore::once("t:id");
    let retry = RetryConfig::new().with_max_retries(1).with_base_delay_ms(1);
    let coordinator = RecordCoordinator::new(&store, &retry);
    let mut records = vec![Record::insert("t").field("a", 1)];

    let outcomes = coordinator.process(&mut records, Mode::Transaction).unwrap();
    assert_eq!(records[0].id(), Some("2"));
    assert_eq!(outcomes[0].key, "t:2");
    assert_eq!(outcomes[0].effect, Effect::Written { new_fields: 1 });
}

#[test]
fn test_retried_update_sees_state_left_by_conflict() {
    let store = ContendedStore::once("profile:1");
    let retry = RetryConfig::new().with_max_retries(1).with_base_delay_ms(1);
    let coordinator = RecordCoordinator::new(&store, &retry);

    // the conflicting INCR leaves a string at the key; the retried HSET
    // runs against it and the wrong-type reply surfaces
    let mut records = vec![Record::update("profile", "1").field("name", "x")];
    let err = coordinator.process(&mut records, Mode::Transaction).unwrap_err();
    assert!(matches!(err, Error::Store(_)));
}

#[test]
fn test_cache_processes_records_with_config() {
    let mut config = CacheConfig::default();
    config.batch.read_back = true;
    config.transaction = RetryConfig::no_retry();
    let cache = Cache::new(MemoryStore::new(), config);

    let mut records = vec![
        Record::insert("users").field("name", "ada").expire_after(60),
        Record::insert("users").field("name", "bob"),
    ];
    let outcomes = cache.process_records(&mut records, Mode::Transaction).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].key, "users:1");
    assert_eq!(
        outcomes[1].stored.as_ref().unwrap()["name"],
        recordkv_core::Value::from("bob")
    );
    let ttl = cache
        .client()
        .execute(Command::Ttl { key: "users:1".into() })
        .unwrap();
    assert!(matches!(ttl, Reply::Int(t) if t > 0 && t <= 60));
}

#[test]
fn test_outcomes_serialize_for_callers() {
    let cache = Cache::new(MemoryStore::new(), CacheConfig::default());
    let mut records = vec![Record::insert("users").field("name", "ada")];
    let options = recordkv_engine::ProcessOptions {
        mode: Mode::Pipeline,
        read_back: true,
    };
    let outcomes = cache.process_records_with(&mut records, options).unwrap();

    let json = serde_json::to_value(&outcomes[0]).unwrap();
    assert_eq!(json["key"], "users:1");
    assert_eq!(json["id"], "1");
    let back: recordkv_engine::RecordOutcome = serde_json::from_value(json).unwrap();
    assert_eq!(back, outcomes[0]);
}
