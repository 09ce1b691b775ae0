//! Optimistic WATCH / MULTI / EXEC transactions
//!
//! `run_transaction` drives one logical transaction to completion:
//!
//! 1. Open a store session
//! 2. Hand a [`MultiExec`] to the caller's body, which watches keys, reads
//!    what it needs, then queues the block
//! 3. EXEC the block; if a watched key changed, start over from step 1
//!
//! The body runs once per attempt and must derive everything it queues
//! from what it read in that attempt.

use tracing::{debug, warn};

use recordkv_core::{Error, Result};
use recordkv_storage::{Command, Reply, StoreClient, StoreSession};

use crate::retry::RetryConfig;

/// One attempt of an optimistic transaction
///
/// Reads are only allowed before the first queued command, the same
/// ordering a server enforces between WATCH and MULTI.
pub struct MultiExec<'a> {
    session: Box<dyn StoreSession + 'a>,
    queued: Vec<Command>,
    watched: usize,
}

impl<'a> MultiExec<'a> {
    /// Wrap an open session
    pub fn new(session: Box<dyn StoreSession + 'a>) -> Self {
        Self {
            session,
            queued: Vec::new(),
            watched: 0,
        }
    }

    /// Watch keys for modification until EXEC
    pub fn watch(&mut self, keys: &[String]) -> Result<()> {
        if !self.queued.is_empty() {
            return Err(Error::invalid_input("WATCH after commands were queued"));
        }
        if keys.is_empty() {
            return Ok(());
        }
        self.watched += keys.len();
        self.session.watch(keys)
    }

    /// Run a command immediately, before the block starts
    pub fn read(&mut self, command: Command) -> Result<Reply> {
        if !self.queued.is_empty() {
            return Err(Error::invalid_input(format!(
                "{} issued inside a MULTI block",
                command.name()
            )));
        }
        self.session.execute(command)
    }

    /// Queue a command for the block; returns its reply position
    pub fn queue(&mut self, command: Command) -> usize {
        self.queued.push(command);
        self.queued.len() - 1
    }

    /// Number of queued commands
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Number of watched keys
    pub fn watched(&self) -> usize {
        self.watched
    }

    /// EXEC the block; `None` means a watched key changed
    fn exec(mut self) -> Result<Option<Vec<Reply>>> {
        let commands = std::mem::take(&mut self.queued);
        let expected = commands.len();
        match self.session.exec(commands)? {
            Some(replies) if replies.len() != expected => Err(Error::response_shape(
                replies.len().min(expected),
                "one reply per queued command",
                format!("{} replies for {} commands", replies.len(), expected),
            )),
            other => Ok(other),
        }
    }

    fn discard(mut self) -> Result<()> {
        self.session.discard()
    }
}

/// Run `body` as an optimistic transaction, retrying on watched-key conflicts
///
/// Returns the body's value from the attempt that committed, together with
/// the replies of its block in queue order.
///
/// An `Err` from the body discards the attempt and is returned as is; it
/// is never retried. When every allowed attempt loses its race the result
/// is [`Error::TransactionRetryExhausted`].
pub fn run_transaction<C, T, F>(client: &C, retry: &RetryConfig, mut body: F) -> Result<(T, Vec<Reply>)>
where
    C: StoreClient + ?Sized,
    F: FnMut(&mut MultiExec<'_>) -> Result<T>,
{
    let attempts = retry.max_attempts();
    for attempt in 0..attempts {
        let mut txn = MultiExec::new(client.session()?);
        let value = match body(&mut txn) {
            Ok(value) => value,
            Err(e) => {
                if let Err(discard_err) = txn.discard() {
                    warn!(target: "recordkv::txn", error = %discard_err, "DISCARD failed");
                }
                return Err(e);
            }
        };

        let queued = txn.queued();
        match txn.exec()? {
            Some(replies) => {
                debug!(target: "recordkv::txn", attempt, queued, "Transaction committed");
                return Ok((value, replies));
            }
            None => {
                warn!(
                    target: "recordkv::txn",
                    attempt,
                    max_retries = retry.max_retries,
                    "Watched key changed, transaction aborted"
                );
                if attempt + 1 < attempts {
                    std::thread::sleep(retry.calculate_delay(attempt));
                }
            }
        }
    }

    Err(Error::TransactionRetryExhausted { attempts })
}
