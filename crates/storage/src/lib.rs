//! Storage layer for recordkv
//!
//! This crate defines how the engine reaches a key/value store:
//! - Command / Reply: the store command set and its reply shapes
//! - StoreClient / StoreSession: execute, pipeline, atomic block and
//!   optimistic WATCH / MULTI / EXEC sessions
//! - MemoryStore: in-process implementation with multiple databases,
//!   per-key versions for WATCH, lazy TTL expiry and a key prefix
//! - glob_match: SCAN pattern matching

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod command;
mod keyspace;
pub mod memory;
pub mod pattern;
pub mod reply;
pub mod ttl;

pub use client::{StoreClient, StoreSession};
pub use command::Command;
pub use memory::{MemorySession, MemoryStore};
pub use pattern::glob_match;
pub use reply::Reply;
pub use ttl::TtlIndex;
