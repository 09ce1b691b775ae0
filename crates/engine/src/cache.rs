//! Cache facade
//!
//! `Cache` bundles a store client with its [`CacheConfig`] and exposes the
//! plain key operations (exists, get, set, counters, database selection)
//! next to the record, batch and query engines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use recordkv_core::{DataType, Error, Mode, Record, Result, TransactionKind, Value};
use recordkv_storage::{Command, StoreClient};

use crate::batch::{BatchOps, ListAppend, ListPop, SortedSetRangeRemove, SortedSetUpsert};
use crate::config::CacheConfig;
use crate::decode::{self, Fetched, ScoredMember};
use crate::query::{KeyQuery, TypedKeys};
use crate::records::{ProcessOptions, RecordCoordinator, RecordOutcome};

/// Expiry of a plain `set`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Expire after this many seconds (EXPIRE)
    In(u64),
    /// Expire at this instant (EXPIREAT)
    At(DateTime<Utc>),
}

/// Store client plus configuration
pub struct Cache<S: StoreClient> {
    client: S,
    config: CacheConfig,
    database: Mutex<u32>,
}

impl<S: StoreClient> Cache<S> {
    /// Wrap `client`; the client is assumed to be on database 0
    pub fn new(client: S, config: CacheConfig) -> Self {
        Self {
            client,
            config,
            database: Mutex::new(0),
        }
    }

    /// Underlying store client
    pub fn client(&self) -> &S {
        &self.client
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ========================================================================
    // Engines
    // ========================================================================

    /// Record coordinator using the configured retry policy
    pub fn records(&self) -> RecordCoordinator<'_, S> {
        RecordCoordinator::new(&self.client, &self.config.transaction)
    }

    /// Batch list / sorted-set operations
    pub fn batch(&self) -> BatchOps<'_, S> {
        BatchOps::new(&self.client, self.config.batch.echo_keys)
    }

    /// Key / type / value queries
    pub fn query(&self) -> KeyQuery<'_, S> {
        KeyQuery::new(&self.client, self.config.batch.scan_count)
    }

    // ========================================================================
    // Plain keys
    // ========================================================================

    /// Whether `key` exists
    pub fn exists(&self, key: &str) -> Result<bool> {
        let reply = self.client.execute(Command::Exists {
            key: key.to_string(),
        })?;
        Ok(decode::count(0, reply)? > 0)
    }

    /// Delete `key`; returns whether it existed
    pub fn delete(&self, key: &str) -> Result<bool> {
        let reply = self.client.execute(Command::Del {
            keys: vec![key.to_string()],
        })?;
        Ok(decode::count(0, reply)? > 0)
    }

    /// String value of `key`
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let reply = self.client.execute(Command::Get {
            key: key.to_string(),
        })?;
        decode::optional_value(0, reply)
    }

    /// Set a string value; returns the key's TTL afterwards (-1 = none)
    pub fn set(&self, key: &str, value: impl Into<Value>, expiry: Option<Expiry>) -> Result<i64> {
        let mut commands = vec![Command::Set {
            key: key.to_string(),
            value: value.into().to_store_bytes()?,
        }];
        match expiry {
            Some(Expiry::In(secs)) => commands.push(Command::Expire {
                key: key.to_string(),
                secs,
            }),
            Some(Expiry::At(at)) => commands.push(Command::ExpireAt {
                key: key.to_string(),
                timestamp: at.timestamp(),
            }),
            None => {}
        }
        commands.push(Command::Ttl {
            key: key.to_string(),
        });

        let replies = self.client.pipeline(commands)?;
        let last = replies.len().saturating_sub(1);
        let mut ttl = None;
        for (position, reply) in replies.into_iter().enumerate() {
            if position == last {
                ttl = Some(decode::int(position, reply)?);
            } else {
                decode::check_error(position, reply)?;
            }
        }
        ttl.ok_or_else(|| Error::response_shape(0, "a TTL reply", "no replies"))
    }

    /// Add `by` to an integer key; returns the new value
    pub fn incr(&self, key: &str, by: i64) -> Result<i64> {
        let reply = self.client.execute(Command::IncrBy {
            key: key.to_string(),
            by,
        })?;
        decode::int(0, reply)
    }

    /// Subtract `by` from an integer key; returns the new value
    pub fn decr(&self, key: &str, by: i64) -> Result<i64> {
        let reply = self.client.execute(Command::DecrBy {
            key: key.to_string(),
            by,
        })?;
        decode::int(0, reply)
    }

    /// Set several string values in one round trip
    pub fn set_multiple(&self, entries: &[(String, Value)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let commands = entries
            .iter()
            .map(|(key, value)| {
                Ok(Command::Set {
                    key: key.clone(),
                    value: value.to_store_bytes()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        for (position, reply) in self.client.pipeline(commands)?.into_iter().enumerate() {
            decode::ok_status(position, reply)?;
        }
        Ok(())
    }

    /// Get several string values in one round trip; missing keys are absent
    pub fn get_multiple(&self, keys: &[String]) -> Result<BTreeMap<String, Value>> {
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }
        let commands = keys
            .iter()
            .map(|key| Command::Get { key: key.clone() })
            .collect();
        let mut found = BTreeMap::new();
        let replies = self.client.pipeline(commands)?;
        for (position, key, reply) in crate::tagged::pair_replies(keys.to_vec(), replies)? {
            if let Some(value) = decode::optional_value(position, reply)? {
                found.insert(key, value);
            }
        }
        Ok(found)
    }

    /// Flush the selected database, or every database with `flush_all`
    pub fn clear_data(&self, flush_all: bool) -> Result<()> {
        let command = if flush_all {
            Command::FlushAll
        } else {
            Command::FlushDb
        };
        decode::ok_status(0, self.client.execute(command)?)?;
        info!(target: "recordkv::store", flush_all, "Cleared data");
        Ok(())
    }

    // ========================================================================
    // Database selection
    // ========================================================================

    /// Number of databases the store offers (CONFIG GET databases)
    pub fn max_database_count(&self) -> Result<u32> {
        let reply = self.client.execute(Command::ConfigGet {
            parameter: "databases".to_string(),
        })?;
        let pair = decode::values(0, reply)?;
        pair.get(1)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| {
                Error::response_shape(0, "[\"databases\", count]", format!("{:?}", pair))
            })
    }

    /// Switch to database `index`
    pub fn select_database(&self, index: u32) -> Result<()> {
        let mut current = self.database.lock();
        let max = self.max_database_count()?;
        if index >= max {
            return Err(Error::invalid_input(format!(
                "database index {} out of range (store has {})",
                index, max
            )));
        }
        decode::ok_status(0, self.client.execute(Command::Select { index })?)?;
        info!(target: "recordkv::store", from = *current, to = index, "Selected database");
        *current = index;
        Ok(())
    }

    /// Database most recently selected through this cache
    pub fn current_database(&self) -> u32 {
        *self.database.lock()
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Apply a record batch; read-back follows `batch.read_back`
    pub fn process_records(&self, records: &mut [Record], mode: Mode) -> Result<Vec<RecordOutcome>> {
        self.process_records_with(
            records,
            ProcessOptions::new(mode).with_read_back(self.config.batch.read_back),
        )
    }

    /// Apply a record batch with explicit options
    pub fn process_records_with(
        &self,
        records: &mut [Record],
        options: ProcessOptions,
    ) -> Result<Vec<RecordOutcome>> {
        self.records().process_with(records, options)
    }

    /// Insert one record; an id-less record gets the next table id
    pub fn add_record(&self, record: Record) -> Result<RecordOutcome> {
        if record.kind() != TransactionKind::Insert {
            return Err(Error::invalid_input(format!(
                "add_record expects an insert, got {}",
                record.kind()
            )));
        }
        self.single(record)
    }

    /// Overwrite fields of an existing record
    pub fn update_record(&self, record: Record) -> Result<RecordOutcome> {
        if record.kind() != TransactionKind::Update {
            return Err(Error::invalid_input(format!(
                "update_record expects an update, got {}",
                record.kind()
            )));
        }
        self.single(record)
    }

    /// Delete one record; returns whether it existed
    pub fn delete_record(&self, table: &str, id: &str) -> Result<bool> {
        let outcome = self.single(Record::delete(table, id))?;
        Ok(matches!(
            outcome.effect,
            crate::records::Effect::Deleted { removed } if removed > 0
        ))
    }

    fn single(&self, record: Record) -> Result<RecordOutcome> {
        let mut records = [record];
        let mut outcomes = self.process_records(&mut records, Mode::Transaction)?;
        debug!(target: "recordkv::txn", key = ?records[0].key(), "Applied single record");
        outcomes
            .pop()
            .ok_or_else(|| Error::response_shape(0, "one record outcome", "none"))
    }

    // ========================================================================
    // Batch operations
    // ========================================================================

    /// See [`BatchOps::add_to_list`]
    pub fn add_to_list(&self, groups: &[ListAppend]) -> Result<BTreeMap<String, Vec<Value>>> {
        self.batch().add_to_list(groups)
    }

    /// See [`BatchOps::add_to_list_args`]
    pub fn add_to_list_args(&self, args: &[Value]) -> Result<BTreeMap<String, Vec<Value>>> {
        self.batch().add_to_list_args(args)
    }

    /// See [`BatchOps::pop_from_list`]
    pub fn pop_from_list(&self, groups: &[ListPop]) -> Result<BTreeMap<String, Vec<Value>>> {
        self.batch().pop_from_list(groups)
    }

    /// See [`BatchOps::pop_from_list_args`]
    pub fn pop_from_list_args(&self, args: &[Value]) -> Result<BTreeMap<String, Vec<Value>>> {
        self.batch().pop_from_list_args(args)
    }

    /// See [`BatchOps::upsert_sorted_set`]
    pub fn upsert_sorted_set(
        &self,
        groups: &[SortedSetUpsert],
    ) -> Result<BTreeMap<String, Vec<ScoredMember>>> {
        self.batch().upsert_sorted_set(groups)
    }

    /// See [`BatchOps::upsert_sorted_set_args`]
    pub fn upsert_sorted_set_args(&self, args: &[Value]) -> Result<BTreeMap<String, Vec<ScoredMember>>> {
        self.batch().upsert_sorted_set_args(args)
    }

    /// See [`BatchOps::remove_from_sorted_set_by_index`]
    pub fn remove_from_sorted_set_by_index(
        &self,
        groups: &[SortedSetRangeRemove],
    ) -> Result<BTreeMap<String, Vec<ScoredMember>>> {
        self.batch().remove_from_sorted_set_by_index(groups)
    }

    /// See [`BatchOps::remove_from_sorted_set_by_index_args`]
    pub fn remove_from_sorted_set_by_index_args(
        &self,
        args: &[Value],
    ) -> Result<BTreeMap<String, Vec<ScoredMember>>> {
        self.batch().remove_from_sorted_set_by_index_args(args)
    }

    /// See [`BatchOps::remove_from_sorted_set`]
    pub fn remove_from_sorted_set(&self, key: &str, members: &[Value]) -> Result<u64> {
        self.batch().remove_from_sorted_set(key, members)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// See [`KeyQuery::get_keys`]
    pub fn get_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.query().get_keys(pattern)
    }

    /// See [`KeyQuery::get_keys_of_type`]
    pub fn get_keys_of_type(&self, pattern: &str, data_type: DataType) -> Result<Vec<String>> {
        self.query().get_keys_of_type(pattern, data_type)
    }

    /// See [`KeyQuery::get_keys_and_types`]
    pub fn get_keys_and_types(&self, pattern: &str) -> Result<TypedKeys> {
        self.query().get_keys_and_types(pattern)
    }

    /// See [`KeyQuery::get_keys_and_values`]
    pub fn get_keys_and_values(
        &self,
        pattern: &str,
        data_type: Option<DataType>,
    ) -> Result<Vec<(String, Fetched)>> {
        self.query().get_keys_and_values(pattern, data_type)
    }

    /// See [`KeyQuery::get`]
    pub fn fetch(&self, key: &str, data_type: Option<DataType>) -> Result<Fetched> {
        self.query().get(key, data_type)
    }
}
