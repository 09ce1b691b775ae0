//! Per-record results of a processed batch

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use recordkv_core::{Mode, TransactionKind, Value};

/// What a record did to its key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// INSERT / UPDATE: hash fields written
    Written {
        /// Fields that did not exist before
        new_fields: u64,
    },
    /// DELETE: keys removed (0 when the record was already gone)
    Deleted {
        /// Keys removed
        removed: u64,
    },
}

/// Result of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Storage key `<table>:<id>`
    pub key: String,
    /// Operation performed
    pub kind: TransactionKind,
    /// Supplied or allocated id
    pub id: String,
    /// Effect on the key
    pub effect: Effect,
    /// Hash contents after the batch, when read-back was requested
    pub stored: Option<BTreeMap<String, Value>>,
}

impl RecordOutcome {
    pub(crate) fn new(key: String, kind: TransactionKind, id: String) -> Self {
        let effect = match kind {
            TransactionKind::Delete => Effect::Deleted { removed: 0 },
            _ => Effect::Written { new_fields: 0 },
        };
        Self {
            key,
            kind,
            id,
            effect,
            stored: None,
        }
    }
}

/// Options for [`crate::RecordCoordinator::process_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// How the batch reaches the store
    pub mode: Mode,
    /// Append an HGETALL of every record key
    pub read_back: bool,
}

impl ProcessOptions {
    /// Options for `mode` without read-back
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            read_back: false,
        }
    }

    /// Enable or disable read-back
    pub fn with_read_back(mut self, read_back: bool) -> Self {
        self.read_back = read_back;
        self
    }
}
