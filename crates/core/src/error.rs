//! Error types for recordkv
//!
//! This module defines the single error type shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Propagation
//!
//! - Record validation errors (`MissingKey`, `UnsupportedTransactionKind`,
//!   `EmptyRecord`) abort a whole transaction-mode batch before anything is
//!   sent, but only the remaining work of a pipeline-mode batch.
//! - `ArgumentType` is raised while decoding batch arguments, before any
//!   command of that call reaches the store.
//! - `ResponseShape` means the reply stream did not line up with what was
//!   queued. It is never recoverable for the call that saw it.
//! - `TransactionAborted` is the internal conflict signal consumed by the
//!   retry loop; callers only ever observe `TransactionRetryExhausted`.

use std::io;
use thiserror::Error;

use crate::types::TransactionKind;

/// Result type alias for recordkv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the record transaction engine
#[derive(Debug, Error)]
pub enum Error {
    /// A positional slot of a batch call had the wrong type, or the
    /// trailing argument group was incomplete
    #[error("({collection}: {key}) Argument {slot} has to be {expected}")]
    ArgumentType {
        /// Collection family of the call ("list" or "sorted_set")
        collection: &'static str,
        /// Last successfully parsed key (best effort, empty if none)
        key: String,
        /// 1-based slot index within the argument group
        slot: usize,
        /// Human readable description of the expected slot type
        expected: &'static str,
    },

    /// UPDATE or DELETE record submitted without an identifier
    #[error("Must provide unique key/id to {kind} the record in table '{table}'")]
    MissingKey {
        /// Table of the offending record
        table: String,
        /// Transaction kind of the offending record
        kind: TransactionKind,
    },

    /// Record kind that the coordinator cannot process
    #[error("Process transaction can only support INSERT / UPDATE / DELETE operations, got {0}")]
    UnsupportedTransactionKind(TransactionKind),

    /// INSERT or UPDATE record carrying no fields
    #[error("Record for table '{table}' has no fields to write")]
    EmptyRecord {
        /// Table of the offending record
        table: String,
    },

    /// A reply did not match the status/data shape expected at its position
    #[error("Unexpected reply at position {position}: expected {expected}, got {found}")]
    ResponseShape {
        /// 0-based position in the reply stream
        position: usize,
        /// What the decoder expected
        expected: &'static str,
        /// Short description of what arrived
        found: String,
    },

    /// Optimistic transaction retries exceeded the configured ceiling
    #[error("Transaction aborted after {attempts} attempt(s): watched keys kept changing")]
    TransactionRetryExhausted {
        /// Total attempts made (initial run plus retries)
        attempts: usize,
    },

    /// EXEC was refused because a watched key changed
    #[error("Transaction aborted: watched key changed before EXEC")]
    TransactionAborted,

    /// The store answered with an error reply or a non-OK status
    #[error("Store error: {0}")]
    Store(String),

    /// Caller supplied an invalid argument outside batch decoding
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an `ArgumentType` error
    pub fn argument_type(
        collection: &'static str,
        key: impl Into<String>,
        slot: usize,
        expected: &'static str,
    ) -> Self {
        Error::ArgumentType {
            collection,
            key: key.into(),
            slot,
            expected,
        }
    }

    /// Create a `ResponseShape` error
    pub fn response_shape(position: usize, expected: &'static str, found: impl Into<String>) -> Self {
        Error::ResponseShape {
            position,
            expected,
            found: found.into(),
        }
    }

    /// Create a `Store` error
    pub fn store(message: impl Into<String>) -> Self {
        Error::Store(message.into())
    }

    /// Create an `InvalidInput` error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// True when the error is a watched-key conflict that may succeed on retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::TransactionAborted)
    }

    /// True for per-record validation failures raised before any command is queued
    pub fn is_record_validation(&self) -> bool {
        matches!(
            self,
            Error::MissingKey { .. } | Error::UnsupportedTransactionKind(_) | Error::EmptyRecord { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
