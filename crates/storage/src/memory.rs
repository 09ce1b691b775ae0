//! MemoryStore: in-process store client
//!
//! Implements [`StoreClient`] over a fixed set of logical databases, each a
//! [`Keyspace`] behind a `parking_lot::Mutex`. Cloning a `MemoryStore`
//! yields another handle on the same data.
//!
//! # Design Notes
//!
//! - **Selected database is shared**: SELECT changes the database for every
//!   handle of the store, the way a single shared connection behaves.
//! - **Atomic blocks hold one lock**: `atomic` and `exec` apply the whole
//!   block under the selected database's lock, so no other command
//!   interleaves.
//! - **WATCH via versions**: a session records each watched key's version;
//!   `exec` refuses the block if any of them moved.
//! - **Key prefix**: applied to every key on the way in and stripped from
//!   SCAN results on the way out.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use recordkv_core::Result;

use crate::client::{StoreClient, StoreSession};
use crate::command::Command;
use crate::keyspace::Keyspace;
use crate::reply::Reply;

#[derive(Debug)]
struct Shared {
    databases: Vec<Mutex<Keyspace>>,
    selected: AtomicUsize,
    /// Global modification clock for per-key versions
    version: AtomicU64,
    /// Commands applied through any path
    commands: AtomicU64,
}

/// In-memory store with Redis-style commands
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    prefix: String,
}

impl MemoryStore {
    /// Database count of a default server
    pub const DEFAULT_DATABASES: u32 = 16;

    /// Create a store with the default number of databases
    pub fn new() -> Self {
        Self::with_databases(Self::DEFAULT_DATABASES)
    }

    /// Create a store with `count` logical databases (at least one)
    pub fn with_databases(count: u32) -> Self {
        let count = count.max(1) as usize;
        Self {
            shared: Arc::new(Shared {
                databases: (0..count).map(|_| Mutex::new(Keyspace::new())).collect(),
                selected: AtomicUsize::new(0),
                version: AtomicU64::new(0),
                commands: AtomicU64::new(0),
            }),
            prefix: String::new(),
        }
    }

    /// Handle on the same data that prefixes every key with `prefix`
    pub fn with_prefix(&self, prefix: impl Into<String>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            prefix: prefix.into(),
        }
    }

    /// Key prefix of this handle
    pub fn key_prefix(&self) -> &str {
        &self.prefix
    }

    /// Number of logical databases
    pub fn database_count(&self) -> usize {
        self.shared.databases.len()
    }

    /// Index of the selected database
    pub fn selected_database(&self) -> usize {
        self.shared.selected.load(Ordering::SeqCst)
    }

    /// Total commands applied so far, across every handle and path
    pub fn commands_applied(&self) -> u64 {
        self.shared.commands.load(Ordering::SeqCst)
    }

    /// Live keys in the selected database
    pub fn key_count(&self) -> usize {
        self.shared.databases[self.selected_database()].lock().len()
    }

    /// Remove expired keys from every database
    pub fn purge_expired(&self) -> usize {
        let removed: usize = self
            .shared
            .databases
            .iter()
            .map(|db| db.lock().purge_expired(&self.shared.version))
            .sum();
        if removed > 0 {
            debug!(target: "recordkv::store", removed, "Purged expired keys");
        }
        removed
    }

    fn select(&self, index: u32) -> Reply {
        let index = index as usize;
        if index >= self.shared.databases.len() {
            return Reply::error("ERR DB index is out of range");
        }
        self.shared.selected.store(index, Ordering::SeqCst);
        Reply::ok()
    }

    fn config_get(&self, parameter: &str) -> Reply {
        match parameter {
            "databases" => Reply::Array(vec![
                Reply::bulk("databases"),
                Reply::bulk(self.shared.databases.len().to_string()),
            ]),
            _ => Reply::Array(Vec::new()),
        }
    }

    fn flush_all(&self) -> Reply {
        for db in &self.shared.databases {
            db.lock().flush(&self.shared.version);
        }
        Reply::ok()
    }

    fn strip_prefix(&self, reply: Reply) -> Reply {
        if self.prefix.is_empty() {
            return reply;
        }
        match reply {
            Reply::Array(mut parts) if parts.len() == 2 => {
                if let Reply::Array(keys) = &mut parts[1] {
                    for key in keys.iter_mut() {
                        if let Reply::Bulk(bytes) = key {
                            if bytes.starts_with(self.prefix.as_bytes()) {
                                bytes.drain(..self.prefix.len());
                            }
                        }
                    }
                }
                Reply::Array(parts)
            }
            other => other,
        }
    }

    /// Apply a command against an already locked database
    fn apply_locked(&self, keyspace: &mut Keyspace, mut command: Command) -> Reply {
        self.shared.commands.fetch_add(1, Ordering::SeqCst);
        command.prefix_keys(&self.prefix);
        trace!(target: "recordkv::store", command = command.name(), "Applying command");
        match command {
            Command::Select { .. } | Command::FlushAll => Reply::error(format!(
                "ERR {} is not allowed in a transaction block",
                command.name()
            )),
            Command::ConfigGet { ref parameter } => self.config_get(parameter),
            Command::Scan { .. } => self.strip_prefix(keyspace.apply(&command, &self.shared.version)),
            _ => keyspace.apply(&command, &self.shared.version),
        }
    }

    /// Apply a single command outside any block
    fn apply_in(&self, db: usize, command: Command) -> Reply {
        match command {
            Command::Select { index } => {
                self.shared.commands.fetch_add(1, Ordering::SeqCst);
                self.select(index)
            }
            Command::FlushAll => {
                self.shared.commands.fetch_add(1, Ordering::SeqCst);
                self.flush_all()
            }
            command => {
                let mut keyspace = self.shared.databases[db].lock();
                self.apply_locked(&mut keyspace, command)
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreClient for MemoryStore {
    fn execute(&self, command: Command) -> Result<Reply> {
        Ok(self.apply_in(self.selected_database(), command))
    }

    fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        // SELECT inside a pipeline redirects the commands after it
        Ok(commands
            .into_iter()
            .map(|command| self.apply_in(self.selected_database(), command))
            .collect())
    }

    fn atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        let mut keyspace = self.shared.databases[self.selected_database()].lock();
        Ok(commands
            .into_iter()
            .map(|command| self.apply_locked(&mut keyspace, command))
            .collect())
    }

    fn session(&self) -> Result<Box<dyn StoreSession + '_>> {
        Ok(Box::new(MemorySession {
            store: self,
            db: self.selected_database(),
            watched: Vec::new(),
        }))
    }
}

/// Optimistic transaction session on a [`MemoryStore`]
#[derive(Debug)]
pub struct MemorySession<'a> {
    store: &'a MemoryStore,
    db: usize,
    /// Prefixed key and its version at WATCH time
    watched: Vec<(String, u64)>,
}

impl StoreSession for MemorySession<'_> {
    fn watch(&mut self, keys: &[String]) -> Result<()> {
        let mut keyspace = self.store.shared.databases[self.db].lock();
        for key in keys {
            let key = format!("{}{}", self.store.prefix, key);
            let version = keyspace.version_of(&key, &self.store.shared.version);
            self.watched.push((key, version));
        }
        Ok(())
    }

    fn execute(&mut self, command: Command) -> Result<Reply> {
        Ok(self.store.apply_in(self.db, command))
    }

    fn exec(&mut self, commands: Vec<Command>) -> Result<Option<Vec<Reply>>> {
        let mut keyspace = self.store.shared.databases[self.db].lock();
        let watched = std::mem::take(&mut self.watched);
        for (key, version) in &watched {
            if keyspace.version_of(key, &self.store.shared.version) != *version {
                debug!(target: "recordkv::store", key = %key, "EXEC refused: watched key changed");
                return Ok(None);
            }
        }
        Ok(Some(
            commands
                .into_iter()
                .map(|command| self.store.apply_locked(&mut keyspace, command))
                .collect(),
        ))
    }

    fn discard(&mut self) -> Result<()> {
        self.watched.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(key: &str, value: &str) -> Command {
        Command::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    fn get(key: &str) -> Command {
        Command::Get { key: key.into() }
    }

    #[test]
    fn test_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryStore>();
    }

    #[test]
    fn test_execute_and_pipeline() {
        let store = MemoryStore::new();
        assert_eq!(store.execute(set("a", "1")).unwrap(), Reply::ok());
        let replies = store.pipeline(vec![get("a"), get("missing")]).unwrap();
        assert_eq!(replies, vec![Reply::bulk("1"), Reply::Nil]);
        assert_eq!(store.commands_applied(), 3);
    }

    #[test]
    fn test_select_isolates_databases() {
        let store = MemoryStore::with_databases(4);
        store.execute(set("k", "db0")).unwrap();
        assert_eq!(store.execute(Command::Select { index: 2 }).unwrap(), Reply::ok());
        assert_eq!(store.execute(get("k")).unwrap(), Reply::Nil);
        assert!(store.execute(Command::Select { index: 4 }).unwrap().is_error());
        assert_eq!(store.selected_database(), 2);
    }

    #[test]
    fn test_prefix_applied_and_stripped() {
        let store = MemoryStore::new();
        let app = store.with_prefix("app:");
        app.execute(set("user", "x")).unwrap();
        assert_eq!(store.execute(get("app:user")).unwrap(), Reply::bulk("x"));

        let reply = app
            .execute(Command::Scan {
                cursor: 0,
                pattern: "*".into(),
                count: 100,
            })
            .unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![Reply::bulk("0"), Reply::Array(vec![Reply::bulk("user")])])
        );
    }

    #[test]
    fn test_session_exec_applies_when_unchanged() {
        let store = MemoryStore::new();
        let mut session = store.session().unwrap();
        session.watch(&["counter".to_string()]).unwrap();
        assert_eq!(session.execute(get("counter")).unwrap(), Reply::Nil);
        let replies = session
            .exec(vec![Command::Incr {
                key: "counter".into(),
            }])
            .unwrap();
        assert_eq!(replies, Some(vec![Reply::Int(1)]));
    }

    #[test]
    fn test_session_exec_refused_after_concurrent_write() {
        let store = MemoryStore::new();
        let mut session = store.session().unwrap();
        session.watch(&["counter".to_string()]).unwrap();

        store.execute(Command::Incr { key: "counter".into() }).unwrap();

        let replies = session.exec(vec![set("other", "1")]).unwrap();
        assert_eq!(replies, None);
        assert_eq!(store.execute(get("other")).unwrap(), Reply::Nil);
    }

    #[test]
    fn test_session_exec_refused_after_watched_key_deleted() {
        let store = MemoryStore::new();
        store.execute(set("profile", "x")).unwrap();
        let mut session = store.session().unwrap();
        session.watch(&["profile".to_string()]).unwrap();

        store
            .execute(Command::Del {
                keys: vec!["profile".into()],
            })
            .unwrap();

        assert_eq!(session.exec(vec![set("profile", "y")]).unwrap(), None);
        assert_eq!(store.execute(get("profile")).unwrap(), Reply::Nil);
    }

    #[test]
    fn test_atomic_block_rejects_select() {
        let store = MemoryStore::new();
        let replies = store
            .atomic(vec![set("a", "1"), Command::Select { index: 1 }])
            .unwrap();
        assert_eq!(replies[0], Reply::ok());
        assert!(replies[1].is_error());
    }

    #[test]
    fn test_flush_all_clears_every_database() {
        let store = MemoryStore::with_databases(2);
        store.execute(set("a", "1")).unwrap();
        store.execute(Command::Select { index: 1 }).unwrap();
        store.execute(set("b", "1")).unwrap();
        store.execute(Command::FlushAll).unwrap();
        assert_eq!(store.key_count(), 0);
        store.execute(Command::Select { index: 0 }).unwrap();
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn test_config_get_databases() {
        let store = MemoryStore::with_databases(8);
        let reply = store
            .execute(Command::ConfigGet {
                parameter: "databases".into(),
            })
            .unwrap();
        assert_eq!(
            reply,
            Reply::Array(vec![Reply::bulk("databases"), Reply::bulk("8")])
        );
    }

    #[test]
    fn test_purge_expired() {
        let store = MemoryStore::new();
        store.execute(set("a", "1")).unwrap();
        store
            .execute(Command::Expire {
                key: "a".into(),
                secs: 1,
            })
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.key_count(), 0);
    }
}
