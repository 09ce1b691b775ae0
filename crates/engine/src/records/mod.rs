//! Record processing
//!
//! - executor: turns one record into tagged HSET / EXPIRE / DEL commands
//! - coordinator: validates, allocates ids, sends and decodes a batch
//! - outcome: per-record results

mod coordinator;
mod executor;
mod outcome;

pub use coordinator::RecordCoordinator;
pub use outcome::{Effect, ProcessOptions, RecordOutcome};
