//! Record transaction engine for recordkv
//!
//! This crate sits on top of a [`StoreClient`] and provides:
//! - Records: INSERT / UPDATE / DELETE batches in pipeline or transaction
//!   mode, with per-table auto-increment ids
//! - Batch: list and sorted-set operations over many keys in one atomic
//!   block, from typed groups or flat argument lists
//! - Query: SCAN-based key listing with type and value fetches
//! - Cache: a facade bundling all of the above with plain key operations
//!   and `recordkv.toml` configuration
//!
//! Every queued command carries a decode tag chosen when it is queued, so
//! replies are matched to their purpose without positional bookkeeping.
//!
//! [`StoreClient`]: recordkv_storage::StoreClient

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cache;
pub mod config;
pub mod decode;
pub mod query;
pub mod records;
pub mod tagged;

pub use batch::{BatchOps, ListAppend, ListPop, SortedSetRangeRemove, SortedSetUpsert};
pub use cache::{Cache, Expiry};
pub use config::{BatchConfig, CacheConfig, StoreConfig, CONFIG_FILE_NAME};
pub use decode::{Fetched, ScoredMember};
pub use query::{KeyQuery, TypedKeys};
pub use records::{Effect, ProcessOptions, RecordCoordinator, RecordOutcome};
pub use tagged::TaggedBatch;
