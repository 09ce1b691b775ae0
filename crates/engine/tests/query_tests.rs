//! Key listing and typed fetches through the cache facade

use std::collections::BTreeMap;

use recordkv_core::{DataType, Error, Mode, Record, Result, Value};
use recordkv_engine::{Cache, CacheConfig, Fetched, KeyQuery, ListAppend, ScoredMember, SortedSetUpsert};
use recordkv_storage::{Command, MemoryStore, Reply, StoreClient, StoreSession};

fn seeded(prefix: &str) -> Cache<MemoryStore> {
    let mut config = CacheConfig::default();
    config.store.key_prefix = prefix.to_string();
    config.batch.scan_count = 3;
    let cache = Cache::new(config.memory_store(), config);

    let mut records = vec![
        Record::insert("user").field("name", "ada").field("age", 36),
        Record::insert("user").field("name", "bob"),
    ];
    cache.process_records(&mut records, Mode::Transaction).unwrap();
    cache
        .add_to_list(&[ListAppend::new("user:log", vec![Value::from("login")])])
        .unwrap();
    cache
        .upsert_sorted_set(&[SortedSetUpsert::new("user:rank", vec![("ada".into(), 1.0)])])
        .unwrap();
    cache
}

#[test]
fn test_get_keys_strips_prefix() {
    let cache = seeded("app:");
    let mut keys = cache.get_keys("user:*").unwrap();
    keys.sort();
    assert_eq!(keys, vec!["user:1", "user:2", "user:id", "user:log", "user:rank"]);
    assert!(cache.get_keys("other:*").unwrap().is_empty());
}

#[test]
fn test_keys_of_type() {
    let cache = seeded("");
    let mut hashes = cache.get_keys_of_type("user:*", DataType::Hash).unwrap();
    hashes.sort();
    assert_eq!(hashes, vec!["user:1", "user:2"]);
    assert_eq!(
        cache.get_keys_of_type("*", DataType::String).unwrap(),
        vec!["user:id"]
    );
    assert!(cache.get_keys_of_type("*", DataType::Set).unwrap().is_empty());
}

#[test]
fn test_keys_and_types_in_discovery_order() {
    let cache = seeded("");
    let typed = cache.get_keys_and_types("user:*").unwrap();
    let listed = cache.get_keys("user:*").unwrap();
    assert_eq!(typed.keys().collect::<Vec<_>>(), listed);
    assert_eq!(typed.get("user:log"), Some(DataType::List));
    assert_eq!(typed.get("user:rank"), Some(DataType::SortedSet));
    assert_eq!(typed.get("missing"), None);
}

#[test]
fn test_keys_and_values() {
    let cache = seeded("svc:");
    let values: BTreeMap<String, Fetched> = cache
        .get_keys_and_values("user:*", None)
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(values.len(), 5);
    assert_eq!(values["user:id"], Fetched::String(Value::from("2")));
    assert_eq!(values["user:log"], Fetched::List(vec![Value::from("login")]));
    assert_eq!(
        values["user:rank"],
        Fetched::SortedSet(vec![ScoredMember::new("ada", 1.0)])
    );
    match &values["user:1"] {
        Fetched::Hash(fields) => {
            assert_eq!(fields["name"], Value::from("ada"));
            assert_eq!(fields["age"], Value::from("36"));
        }
        other => panic!("expected a hash, got {:?}", other),
    }

    let only_lists = cache
        .get_keys_and_values("*", Some(DataType::List))
        .unwrap();
    assert_eq!(only_lists.len(), 1);
    assert_eq!(only_lists[0].0, "user:log");
}

#[test]
fn test_fetch_with_and_without_type() {
    let cache = seeded("");
    assert_eq!(
        cache.fetch("user:log", Some(DataType::List)).unwrap(),
        Fetched::List(vec![Value::from("login")])
    );
    assert!(cache.fetch("nope", None).unwrap().is_nil());
    assert!(matches!(
        cache.fetch("user:id", Some(DataType::Hash)),
        Err(Error::Store(ref message)) if message.contains("WRONGTYPE")
    ));
}

/// Client that answers TYPE with a bulk string instead of a status
struct BulkTypeStore(MemoryStore);

impl StoreClient for BulkTypeStore {
    fn execute(&self, command: Command) -> Result<Reply> {
        self.0.execute(command)
    }

    fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        let replies = self.0.pipeline(commands)?;
        Ok(replies
            .into_iter()
            .map(|reply| match reply {
                Reply::Status(s) => Reply::bulk(s),
                other => other,
            })
            .collect())
    }

    fn atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        self.0.atomic(commands)
    }

    fn session(&self) -> Result<Box<dyn StoreSession + '_>> {
        self.0.session()
    }
}

#[test]
fn test_type_reply_shape_is_checked() {
    let store = MemoryStore::new();
    store
        .execute(Command::Set {
            key: "a".into(),
            value: b"1".to_vec(),
        })
        .unwrap();
    let client = BulkTypeStore(store);
    let err = KeyQuery::new(&client, 10).get_keys_and_types("*").unwrap_err();
    assert!(matches!(err, Error::ResponseShape { position: 0, .. }));
}
