//! Core enums and key naming for recordkv
//!
//! This module defines:
//! - TransactionKind: what a record asks the engine to do
//! - Mode: how a batch of records reaches the store
//! - DataType: the store-native type tag of a key
//! - record_key / counter_key: the key naming convention
//!
//! ## Key Naming (bit-exact)
//!
//! - Record storage key: `<table>:<id>`
//! - Auto-increment counter key: `<table>:id`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between table name and id in every derived key
pub const KEY_SEPARATOR: char = ':';

/// Suffix of the per-table auto-increment counter key
pub const COUNTER_SUFFIX: &str = "id";

/// Build the storage key of a record
pub fn record_key(table: &str, id: &str) -> String {
    format!("{}{}{}", table, KEY_SEPARATOR, id)
}

/// Build the auto-increment counter key of a table
pub fn counter_key(table: &str) -> String {
    format!("{}{}{}", table, KEY_SEPARATOR, COUNTER_SUFFIX)
}

/// The operation a record requests
///
/// `Select` is part of the enumeration but is never processed by the
/// record coordinator (reads go through the query layer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Read request (not processable as a write)
    Select,
    /// Create a record, allocating an id when none is supplied
    Insert,
    /// Overwrite fields of an existing record (id required)
    Update,
    /// Remove a record (id required)
    Delete,
}

impl TransactionKind {
    /// Whether this kind requires an explicit id
    pub fn requires_id(&self) -> bool {
        matches!(self, TransactionKind::Update | TransactionKind::Delete)
    }

    /// Whether this kind writes hash fields
    pub fn writes_fields(&self) -> bool {
        matches!(self, TransactionKind::Insert | TransactionKind::Update)
    }

    /// Lowercase name used in messages
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Select => "select",
            TransactionKind::Insert => "insert",
            TransactionKind::Update => "update",
            TransactionKind::Delete => "delete",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a batch of records is sent to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One round trip, no atomicity, never retried
    Pipeline,
    /// WATCH / MULTI / EXEC with retry on watched-key conflict
    #[default]
    Transaction,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Pipeline => f.write_str("pipeline"),
            Mode::Transaction => f.write_str("transaction"),
        }
    }
}

/// Store-native type of a key, as reported by TYPE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Plain string value
    String,
    /// List of values
    List,
    /// Field-value map
    Hash,
    /// Unordered set
    Set,
    /// Set ordered by score
    SortedSet,
    /// Key does not exist
    None,
}

impl DataType {
    /// The tag the store uses for this type
    pub fn as_tag(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::List => "list",
            DataType::Hash => "hash",
            DataType::Set => "set",
            DataType::SortedSet => "zset",
            DataType::None => "none",
        }
    }

    /// Parse a TYPE reply tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(DataType::String),
            "list" => Some(DataType::List),
            "hash" => Some(DataType::Hash),
            "set" => Some(DataType::Set),
            "zset" => Some(DataType::SortedSet),
            "none" => Some(DataType::None),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}
