//! Store client abstraction
//!
//! The engine never talks to a concrete store. It is handed a
//! [`StoreClient`] and uses four access paths:
//!
//! - `execute`: one command, one reply
//! - `pipeline`: many commands, one round trip, no atomicity
//! - `atomic`: many commands applied as one MULTI/EXEC block, nothing watched
//! - `session`: a dedicated connection for WATCH / MULTI / EXEC
//!
//! Transport failures are `Err`; error replies from the server are
//! returned as [`Reply::Error`] values in their position.

use recordkv_core::Result;

use crate::command::Command;
use crate::reply::Reply;

/// Client for a Redis-style key/value store
pub trait StoreClient: Send + Sync {
    /// Run a single command
    fn execute(&self, command: Command) -> Result<Reply>;

    /// Send all commands in one round trip; replies come back in order
    fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>>;

    /// Apply all commands as one atomic block without watching anything
    fn atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>>;

    /// Open a session for an optimistic transaction
    fn session(&self) -> Result<Box<dyn StoreSession + '_>>;
}

/// One optimistic transaction attempt
///
/// Usage order: `watch`, any number of `execute` reads, then exactly one
/// `exec` or `discard`.
pub trait StoreSession {
    /// Watch keys; `exec` fails if any of them changes before it runs
    fn watch(&mut self, keys: &[String]) -> Result<()>;

    /// Run a command immediately, outside the MULTI block
    fn execute(&mut self, command: Command) -> Result<Reply>;

    /// Apply the queued block
    ///
    /// Returns `None` when a watched key changed and nothing was applied.
    fn exec(&mut self, commands: Vec<Command>) -> Result<Option<Vec<Reply>>>;

    /// Abandon the attempt and release all watches
    fn discard(&mut self) -> Result<()>;
}

impl<T: StoreClient + ?Sized> StoreClient for std::sync::Arc<T> {
    fn execute(&self, command: Command) -> Result<Reply> {
        (**self).execute(command)
    }

    fn pipeline(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        (**self).pipeline(commands)
    }

    fn atomic(&self, commands: Vec<Command>) -> Result<Vec<Reply>> {
        (**self).atomic(commands)
    }

    fn session(&self) -> Result<Box<dyn StoreSession + '_>> {
        (**self).session()
    }
}
