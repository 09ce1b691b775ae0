//! Transaction coordinator
//!
//! Processes a batch of records in one of two modes:
//!
//! - **Transaction**: everything is validated first, then one optimistic
//!   WATCH / MULTI / EXEC section is run (and re-run on conflict). Either
//!   every record is applied or none is.
//! - **Pipeline**: the valid prefix of the batch is sent in one round trip
//!   without atomicity. A record that fails validation stops the batch
//!   there; earlier records are still written.
//!
//! Ids of id-less INSERTs come from the per-table counter `<table>:id`. In
//! transaction mode they are predicted from the watched counter and claimed
//! by an INCR inside the block; in pipeline mode they are reserved up front
//! with one INCRBY per table.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use recordkv_concurrency::{run_transaction, MultiExec, RetryConfig};
use recordkv_core::{assign_allocated_id, Error, Mode, Record, Result, TransactionKind};
use recordkv_storage::{Command, Reply, StoreClient};

use super::executor::{self, Allocation, RecordBatch, RecordSlot};
use super::outcome::{Effect, ProcessOptions, RecordOutcome};
use crate::decode;
use crate::tagged::pair_replies;

/// Applies record batches to a store
pub struct RecordCoordinator<'a, C: StoreClient + ?Sized> {
    client: &'a C,
    retry: &'a RetryConfig,
}

impl<'a, C: StoreClient + ?Sized> RecordCoordinator<'a, C> {
    /// Create a coordinator over `client`
    pub fn new(client: &'a C, retry: &'a RetryConfig) -> Self {
        Self { client, retry }
    }

    /// Process `records` in `mode` without read-back
    pub fn process(&self, records: &mut [Record], mode: Mode) -> Result<Vec<RecordOutcome>> {
        self.process_with(records, ProcessOptions::new(mode))
    }

    /// Process `records` with explicit options
    ///
    /// On success every id-less INSERT record has been given its id.
    pub fn process_with(
        &self,
        records: &mut [Record],
        options: ProcessOptions,
    ) -> Result<Vec<RecordOutcome>> {
        debug!(
            target: "recordkv::txn",
            records = records.len(),
            mode = %options.mode,
            read_back = options.read_back,
            "Processing record batch"
        );
        match options.mode {
            Mode::Transaction => self.process_transaction(records, options.read_back),
            Mode::Pipeline => self.process_pipeline(records, options.read_back),
        }
    }

    fn process_transaction(&self, records: &mut [Record], read_back: bool) -> Result<Vec<RecordOutcome>> {
        for record in records.iter() {
            executor::validate(record)?;
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let watch = watch_keys(records);
        let batch_records: &[Record] = records;
        let ((allocations, outcomes, tags), replies) =
            run_transaction(self.client, self.retry, |txn| {
                txn.watch(&watch)?;
                let allocations = predict_ids(txn, batch_records)?;
                let (batch, outcomes) = build_batch(batch_records, &allocations, read_back)?;
                let (commands, tags) = batch.into_parts();
                for command in commands {
                    txn.queue(command);
                }
                Ok((allocations, outcomes, tags))
            })?;

        let outcomes = decode_outcomes(outcomes, tags, replies)?;
        assign_ids(records, &allocations);
        Ok(outcomes)
    }

    fn process_pipeline(&self, records: &mut [Record], read_back: bool) -> Result<Vec<RecordOutcome>> {
        let mut failure = None;
        let mut valid = records.len();
        for (index, record) in records.iter().enumerate() {
            if let Err(e) = executor::validate(record) {
                failure = Some(e);
                valid = index;
                break;
            }
        }

        let prefix = &records[..valid];
        let outcomes = if prefix.is_empty() {
            Vec::new()
        } else {
            let allocations = self.reserve_ids(prefix)?;
            let (batch, outcomes) = build_batch(prefix, &allocations, read_back)?;
            let (commands, tags) = batch.into_parts();
            let replies = self.client.pipeline(commands)?;
            let outcomes = decode_outcomes(outcomes, tags, replies)?;
            assign_ids(&mut records[..valid], &allocations);
            outcomes
        };

        match failure {
            Some(e) => {
                if valid > 0 {
                    warn!(
                        target: "recordkv::txn",
                        applied = valid,
                        failed_at = valid,
                        error = %e,
                        "Pipeline stopped at an invalid record after sending the records before it"
                    );
                }
                Err(e)
            }
            None => Ok(outcomes),
        }
    }

    /// Reserve ids with one INCRBY per table, in one round trip
    fn reserve_ids(&self, records: &[Record]) -> Result<Vec<Allocation>> {
        let mut needed: Vec<(String, u64)> = Vec::new();
        for record in records.iter().filter(|r| r.needs_allocated_id()) {
            match needed.iter_mut().find(|(table, _)| table == record.table()) {
                Some((_, n)) => *n += 1,
                None => needed.push((record.table().to_string(), 1)),
            }
        }
        if needed.is_empty() {
            return Ok(vec![Allocation::Supplied; records.len()]);
        }

        let commands = needed
            .iter()
            .map(|(table, n)| Command::IncrBy {
                key: recordkv_core::counter_key(table),
                by: *n as i64,
            })
            .collect();
        let replies = self.client.pipeline(commands)?;
        let pairs = pair_replies(needed, replies)?;

        let mut next: BTreeMap<String, u64> = BTreeMap::new();
        for (position, (table, n), reply) in pairs {
            let last = decode::count(position, reply)?;
            let first = (last + 1).checked_sub(n).ok_or_else(|| {
                Error::store(format!("counter of table '{}' is below zero", table))
            })?;
            next.insert(table, first);
        }
        debug!(target: "recordkv::txn", tables = next.len(), "Reserved record ids");

        Ok(records
            .iter()
            .map(|record| {
                if !record.needs_allocated_id() {
                    return Allocation::Supplied;
                }
                match next.get_mut(record.table()) {
                    Some(id) => {
                        *id += 1;
                        Allocation::Reserved(*id - 1)
                    }
                    None => Allocation::Supplied,
                }
            })
            .collect())
    }
}

/// Counter keys of tables with id-less INSERTs, then keys of UPDATE records
fn watch_keys(records: &[Record]) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    let mut add = |key: String| {
        if !keys.contains(&key) {
            keys.push(key);
        }
    };
    for record in records.iter().filter(|r| r.needs_allocated_id()) {
        add(record.counter_key());
    }
    for record in records.iter().filter(|r| r.kind() == TransactionKind::Update) {
        if let Some(key) = record.key() {
            add(key);
        }
    }
    keys
}

/// Read each watched counter once and hand out the ids that follow it
fn predict_ids(txn: &mut MultiExec<'_>, records: &[Record]) -> Result<Vec<Allocation>> {
    let mut next: BTreeMap<String, u64> = BTreeMap::new();
    let mut allocations = Vec::with_capacity(records.len());
    for record in records {
        if !record.needs_allocated_id() {
            allocations.push(Allocation::Supplied);
            continue;
        }
        let current = match next.get(record.table()) {
            Some(&current) => current,
            None => {
                let counter = record.counter_key();
                read_counter(&counter, txn.read(Command::Get { key: counter.clone() })?)?
            }
        };
        next.insert(record.table().to_string(), current + 1);
        allocations.push(Allocation::Predicted(current + 1));
    }
    Ok(allocations)
}

fn read_counter(key: &str, reply: Reply) -> Result<u64> {
    match decode::optional_value(0, reply)? {
        None => Ok(0),
        Some(value) => value
            .as_str()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| Error::store(format!("counter key '{}' does not hold a valid id", key))),
    }
}

fn build_batch(
    records: &[Record],
    allocations: &[Allocation],
    read_back: bool,
) -> Result<(RecordBatch, Vec<RecordOutcome>)> {
    let mut batch = RecordBatch::new();
    let mut outcomes = Vec::with_capacity(records.len());
    for (index, (record, allocation)) in records.iter().zip(allocations).enumerate() {
        let (key, id) = executor::queue_record(index, record, *allocation, &mut batch)?;
        if read_back {
            batch.push(
                Command::HGetAll { key: key.clone() },
                RecordSlot::ReadBack { record: index },
            );
        }
        outcomes.push(RecordOutcome::new(key, record.kind(), id));
    }
    Ok((batch, outcomes))
}

fn decode_outcomes(
    mut outcomes: Vec<RecordOutcome>,
    tags: Vec<RecordSlot>,
    replies: Vec<Reply>,
) -> Result<Vec<RecordOutcome>> {
    for (position, tag, reply) in pair_replies(tags, replies)? {
        match tag {
            RecordSlot::Counter { expected, .. } => {
                let got = decode::count(position, reply)?;
                if got != expected {
                    return Err(Error::response_shape(
                        position,
                        "the predicted record id",
                        format!("id {} (predicted {})", got, expected),
                    ));
                }
            }
            RecordSlot::FieldWrite { record } => {
                let added = decode::count(position, reply)?;
                if let Effect::Written { new_fields } = &mut outcomes[record].effect {
                    *new_fields += added;
                }
            }
            RecordSlot::Expire { .. } => {
                decode::int(position, reply)?;
            }
            RecordSlot::Delete { record } => {
                outcomes[record].effect = Effect::Deleted {
                    removed: decode::count(position, reply)?,
                };
            }
            RecordSlot::ReadBack { record } => {
                outcomes[record].stored = Some(decode::hash(position, reply)?);
            }
        }
    }
    Ok(outcomes)
}

fn assign_ids(records: &mut [Record], allocations: &[Allocation]) {
    for (record, allocation) in records.iter_mut().zip(allocations) {
        if let Allocation::Reserved(id) | Allocation::Predicted(id) = *allocation {
            assign_allocated_id(record, id);
        }
    }
}
