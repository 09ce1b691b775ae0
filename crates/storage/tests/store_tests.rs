//! MemoryStore behavior under concurrency and against a list model

use proptest::prelude::*;
use recordkv_storage::{Command, MemoryStore, Reply, StoreClient};
use std::collections::VecDeque;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_concurrent_incr_yields_unique_values() {
    let store = MemoryStore::new();
    let num_threads = 8;
    let per_thread = 50;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..per_thread)
                    .map(|_| {
                        store
                            .execute(Command::Incr { key: "c".into() })
                            .unwrap()
                            .as_int()
                            .unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    let expected: Vec<i64> = (1..=(num_threads * per_thread) as i64).collect();
    assert_eq!(all, expected);
}

#[test]
fn test_atomic_block_is_not_interleaved() {
    let store = MemoryStore::new();
    let num_threads = 4;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|t| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..20 {
                    let value = format!("{}-{}", t, i).into_bytes();
                    store
                        .atomic(vec![
                            Command::RPush {
                                key: "log".into(),
                                values: vec![value.clone()],
                            },
                            Command::RPush {
                                key: "log".into(),
                                values: vec![value],
                            },
                        ])
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let Reply::Array(items) = store
        .execute(Command::LRange {
            key: "log".into(),
            start: 0,
            stop: -1,
        })
        .unwrap()
    else {
        panic!("LRANGE must return an array");
    };
    assert_eq!(items.len(), num_threads * 20 * 2);
    for pair in items.chunks(2) {
        assert_eq!(pair[0], pair[1]);
    }
}

fn scan_page(store: &MemoryStore, cursor: u64, count: usize) -> (u64, Vec<String>) {
    let reply = store
        .execute(Command::Scan {
            cursor,
            pattern: "*".into(),
            count,
        })
        .unwrap();
    let Reply::Array(parts) = reply else {
        panic!("SCAN must return an array, got {:?}", reply);
    };
    let (Reply::Bulk(next), Reply::Array(keys)) = (&parts[0], &parts[1]) else {
        panic!("unexpected SCAN shape {:?}", parts);
    };
    let next = String::from_utf8(next.clone()).unwrap().parse().unwrap();
    let keys = keys
        .iter()
        .map(|k| match k {
            Reply::Bulk(b) => String::from_utf8(b.clone()).unwrap(),
            other => panic!("unexpected key {:?}", other),
        })
        .collect();
    (next, keys)
}

#[test]
fn test_scan_keeps_live_keys_after_delete_between_pages() {
    let store = MemoryStore::new();
    for key in ["a", "b", "c", "d"] {
        store
            .execute(Command::Set {
                key: key.into(),
                value: b"1".to_vec(),
            })
            .unwrap();
    }

    let (mut cursor, first) = scan_page(&store, 0, 2);
    assert_eq!(first, vec!["a", "b"]);
    assert_ne!(cursor, 0);
    store
        .execute(Command::Del {
            keys: vec!["a".into()],
        })
        .unwrap();

    let mut seen = first;
    while cursor != 0 {
        let (next, keys) = scan_page(&store, cursor, 2);
        seen.extend(keys);
        cursor = next;
    }
    assert_eq!(seen, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_scan_sees_keys_added_ahead_of_cursor() {
    let store = MemoryStore::new();
    for key in ["b", "d"] {
        store
            .execute(Command::Set {
                key: key.into(),
                value: b"1".to_vec(),
            })
            .unwrap();
    }
    let (cursor, first) = scan_page(&store, 0, 1);
    assert_eq!(first, vec!["b"]);
    store
        .execute(Command::Set {
            key: "c".into(),
            value: b"1".to_vec(),
        })
        .unwrap();
    let (next, rest) = scan_page(&store, cursor, 10);
    assert_eq!(rest, vec!["c", "d"]);
    assert_eq!(next, 0);
}

fn model_range(list: &VecDeque<u8>, start: i64, stop: i64) -> Vec<u8> {
    let len = list.len() as i64;
    let s = if start < 0 { (len + start).max(0) } else { start };
    let e = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if s > e || s >= len {
        return Vec::new();
    }
    list.iter().skip(s as usize).take((e - s + 1) as usize).copied().collect()
}

proptest! {
    #[test]
    fn prop_ltrim_matches_model(
        values in proptest::collection::vec(any::<u8>(), 0..20),
        start in -25i64..25,
        stop in -25i64..25,
    ) {
        let store = MemoryStore::new();
        let model: VecDeque<u8> = values.iter().copied().collect();
        if !values.is_empty() {
            store.execute(Command::RPush {
                key: "l".into(),
                values: values.iter().map(|v| vec![*v]).collect(),
            }).unwrap();
        }
        store.execute(Command::LTrim { key: "l".into(), start, stop }).unwrap();
        let reply = store.execute(Command::LRange { key: "l".into(), start: 0, stop: -1 }).unwrap();
        let got: Vec<u8> = match reply {
            Reply::Array(items) => items.into_iter().map(|r| match r {
                Reply::Bulk(b) => b[0],
                other => panic!("unexpected {:?}", other),
            }).collect(),
            other => panic!("unexpected {:?}", other),
        };
        prop_assert_eq!(got, model_range(&model, start, stop));
    }
}
