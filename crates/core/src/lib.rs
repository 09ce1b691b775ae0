//! Core types for recordkv
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: Unified value enum and its store encoding
//! - Record: Table row mapped onto a store hash
//! - TransactionKind / Mode / DataType: operation, batching and type tags
//! - Key naming: `<table>:<id>` records, `<table>:id` counters
//! - Error: Error type shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use record::{assign_allocated_id, Record};
pub use types::{counter_key, record_key, DataType, Mode, TransactionKind};
pub use value::Value;
