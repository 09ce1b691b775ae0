//! Upsert/delete executor
//!
//! Turns one validated record into tagged commands. Nothing here talks to
//! the store; the coordinator decides when and how the batch is sent.

use recordkv_core::{Error, Record, Result, TransactionKind};
use recordkv_storage::Command;

use crate::tagged::TaggedBatch;

/// How to read the reply of a record command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordSlot {
    /// INCR of the table counter; must equal the predicted id
    Counter { record: usize, expected: u64 },
    /// HSET; 1 when the field is new
    FieldWrite { record: usize },
    /// EXPIRE; ignored unless it is an error
    Expire { record: usize },
    /// DEL; number of keys removed
    Delete { record: usize },
    /// HGETALL of the record key
    ReadBack { record: usize },
}

/// Tagged commands for a batch of records
pub(crate) type RecordBatch = TaggedBatch<RecordSlot>;

/// Where an id-less INSERT gets its id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Allocation {
    /// The record carries its own id
    Supplied,
    /// Already reserved by an INCRBY round trip
    Reserved(u64),
    /// Predicted from the watched counter; an INCR is queued to claim it
    Predicted(u64),
}

/// Check a record before anything is queued for it
pub(crate) fn validate(record: &Record) -> Result<()> {
    let kind = record.kind();
    if kind == TransactionKind::Select {
        return Err(Error::UnsupportedTransactionKind(kind));
    }
    if kind.requires_id() && record.id().is_none() {
        return Err(Error::MissingKey {
            table: record.table().to_string(),
            kind,
        });
    }
    if kind.writes_fields() && record.fields().is_empty() {
        return Err(Error::EmptyRecord {
            table: record.table().to_string(),
        });
    }
    Ok(())
}

/// Queue an INSERT or UPDATE; returns the key and id written
pub(crate) fn upsert(
    index: usize,
    record: &Record,
    allocation: Allocation,
    batch: &mut RecordBatch,
) -> Result<(String, String)> {
    let id = match (record.id(), allocation) {
        (Some(id), _) => id.to_string(),
        (None, _) if record.kind() == TransactionKind::Update => {
            return Err(Error::MissingKey {
                table: record.table().to_string(),
                kind: record.kind(),
            })
        }
        (None, Allocation::Reserved(id)) => id.to_string(),
        (None, Allocation::Predicted(id)) => {
            batch.push(
                Command::Incr {
                    key: record.counter_key(),
                },
                RecordSlot::Counter {
                    record: index,
                    expected: id,
                },
            );
            id.to_string()
        }
        (None, Allocation::Supplied) => {
            return Err(Error::invalid_input(format!(
                "no id allocated for insert into '{}'",
                record.table()
            )))
        }
    };

    let key = recordkv_core::record_key(record.table(), &id);
    for (field, value) in record.fields() {
        batch.push(
            Command::HSet {
                key: key.clone(),
                field: field.clone(),
                value: value.to_store_bytes()?,
            },
            RecordSlot::FieldWrite { record: index },
        );
    }
    if let Some(secs) = record.expire_secs() {
        batch.push(
            Command::Expire {
                key: key.clone(),
                secs,
            },
            RecordSlot::Expire { record: index },
        );
    }
    Ok((key, id))
}

/// Queue a DELETE; returns the key and id removed
pub(crate) fn delete(index: usize, record: &Record, batch: &mut RecordBatch) -> Result<(String, String)> {
    let Some(id) = record.id() else {
        return Err(Error::MissingKey {
            table: record.table().to_string(),
            kind: record.kind(),
        });
    };
    let key = recordkv_core::record_key(record.table(), id);
    batch.push(
        Command::Del {
            keys: vec![key.clone()],
        },
        RecordSlot::Delete { record: index },
    );
    Ok((key, id.to_string()))
}

/// Queue whatever the record's kind calls for
pub(crate) fn queue_record(
    index: usize,
    record: &Record,
    allocation: Allocation,
    batch: &mut RecordBatch,
) -> Result<(String, String)> {
    match record.kind() {
        TransactionKind::Insert | TransactionKind::Update => upsert(index, record, allocation, batch),
        TransactionKind::Delete => delete(index, record, batch),
        TransactionKind::Select => Err(Error::UnsupportedTransactionKind(TransactionKind::Select)),
    }
}
