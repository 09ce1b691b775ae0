//! Concurrency control for recordkv
//!
//! This crate implements optimistic transactions on top of a store client:
//! - RetryConfig: retry ceiling and exponential backoff
//! - MultiExec: one WATCH / read / MULTI / EXEC attempt
//! - run_transaction: the retry loop around attempts

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod retry;
pub mod transaction;

pub use retry::RetryConfig;
pub use transaction::{run_transaction, MultiExec};
