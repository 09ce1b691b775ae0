//! Records: typed field sets mapped onto store hashes
//!
//! A `Record` names a table, the operation to perform, an optional id and
//! expiry, and an ordered list of fields. The coordinator turns it into
//! one hash-field write per field on the key `<table>:<id>`.
//!
//! # Example
//!
//! ```
//! use recordkv_core::{Record, TransactionKind};
//!
//! let record = Record::insert("users")
//!     .field("name", "ada")
//!     .field("age", 36)
//!     .expire_after(60);
//!
//! assert_eq!(record.kind(), TransactionKind::Insert);
//! assert_eq!(record.id(), None);
//! assert_eq!(record.fields().len(), 2);
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{counter_key, record_key, TransactionKind};
use crate::value::Value;

/// A table row destined for a store hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    table: String,
    kind: TransactionKind,
    id: Option<String>,
    expire_secs: Option<u64>,
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create a record of any kind
    pub fn new(table: impl Into<String>, kind: TransactionKind) -> Self {
        Self {
            table: table.into(),
            kind,
            id: None,
            expire_secs: None,
            fields: Vec::new(),
        }
    }

    /// INSERT record; the id is allocated at execution unless overridden
    pub fn insert(table: impl Into<String>) -> Self {
        Self::new(table, TransactionKind::Insert)
    }

    /// UPDATE record of an existing id
    pub fn update(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(table, TransactionKind::Update).with_id(id)
    }

    /// DELETE record of an existing id
    pub fn delete(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(table, TransactionKind::Delete).with_id(id)
    }

    /// Supply the id (overrides auto-increment for INSERT)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Expire the record key after `secs` seconds
    pub fn expire_after(mut self, secs: u64) -> Self {
        self.expire_secs = Some(secs);
        self
    }

    /// Builder form of [`Record::set_field`]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_field(name, value);
        self
    }

    /// Set a field; an existing field keeps its position and takes the new value
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Get a field value by name
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Remove a field, returning its value
    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    /// Table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Requested operation
    pub fn kind(&self) -> TransactionKind {
        self.kind
    }

    /// Supplied or allocated id
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Expiry in seconds, if any
    pub fn expire_secs(&self) -> Option<u64> {
        self.expire_secs
    }

    /// Fields in insertion order
    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    /// Storage key, known once the record has an id
    pub fn key(&self) -> Option<String> {
        self.id.as_deref().map(|id| record_key(&self.table, id))
    }

    /// Counter key of the record's table
    pub fn counter_key(&self) -> String {
        counter_key(&self.table)
    }

    /// True for an INSERT that relies on the table counter
    pub fn needs_allocated_id(&self) -> bool {
        self.kind == TransactionKind::Insert && self.id.is_none()
    }

    /// Record the id allocated during execution
    pub(crate) fn assign_id(&mut self, id: String) {
        self.id = Some(id);
    }
}

/// Hand an allocated id back to a committed INSERT record
///
/// Only the record coordinator calls this, after the batch committed.
pub fn assign_allocated_id(record: &mut Record, id: u64) {
    record.assign_id(id.to_string());
}
