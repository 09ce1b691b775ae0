//! recordkv - record transactions over a Redis-style key/value store
//!
//! recordkv maps table records onto hashes (`<table>:<id>`) with per-table
//! auto-increment ids (`<table>:id`), and adds batched list and sorted-set
//! operations plus SCAN-based key queries.
//!
//! # Quick Start
//!
//! ```
//! use recordkv::{Cache, CacheConfig, Mode, Record};
//!
//! let config = CacheConfig::default();
//! let cache = Cache::new(config.memory_store(), config);
//!
//! let mut records = vec![Record::insert("users").field("name", "ada")];
//! cache.process_records(&mut records, Mode::Transaction)?;
//! assert_eq!(records[0].id(), Some("1"));
//! # Ok::<(), recordkv::Error>(())
//! ```
//!
//! # Architecture
//!
//! - `recordkv-core`: records, values, key naming, errors
//! - `recordkv-storage`: the `StoreClient` abstraction and an in-memory store
//! - `recordkv-concurrency`: the WATCH / MULTI / EXEC retry loop
//! - `recordkv-engine`: record processing, batch operations, queries, `Cache`

pub use recordkv_concurrency::{run_transaction, MultiExec, RetryConfig};
pub use recordkv_core::{
    counter_key, record_key, DataType, Error, Mode, Record, Result, TransactionKind, Value,
};
pub use recordkv_engine::*;
pub use recordkv_storage::{
    glob_match, Command, MemorySession, MemoryStore, Reply, StoreClient, StoreSession,
};
