//! Command batches with build-time decode tags
//!
//! Every queued command is paired with a tag that says how its reply must
//! be read. Decoding then walks `(tag, reply)` pairs instead of re-deriving
//! positions from the input.

use recordkv_core::{Error, Result};
use recordkv_storage::{Command, Reply};

/// Commands and their decode tags, in queue order
#[derive(Debug, Clone)]
pub struct TaggedBatch<T> {
    commands: Vec<Command>,
    tags: Vec<T>,
}

impl<T> Default for TaggedBatch<T> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            tags: Vec::new(),
        }
    }
}

impl<T> TaggedBatch<T> {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command with its tag
    pub fn push(&mut self, command: Command, tag: T) {
        self.commands.push(command);
        self.tags.push(tag);
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands in queue order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Split into the commands to send and the tags to decode with
    pub fn into_parts(self) -> (Vec<Command>, Vec<T>) {
        (self.commands, self.tags)
    }
}

/// Pair tags with replies, requiring exactly one reply per tag
pub fn pair_replies<T>(tags: Vec<T>, replies: Vec<Reply>) -> Result<Vec<(usize, T, Reply)>> {
    if tags.len() != replies.len() {
        return Err(Error::response_shape(
            tags.len().min(replies.len()),
            "one reply per queued command",
            format!("{} replies for {} commands", replies.len(), tags.len()),
        ));
    }
    Ok(tags
        .into_iter()
        .zip(replies)
        .enumerate()
        .map(|(position, (tag, reply))| (position, tag, reply))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_order() {
        let mut batch = TaggedBatch::new();
        batch.push(Command::Echo { message: "a".into() }, 'a');
        batch.push(Command::Echo { message: "b".into() }, 'b');
        assert_eq!(batch.len(), 2);
        let (commands, tags) = batch.into_parts();
        assert_eq!(commands[1], Command::Echo { message: "b".into() });
        assert_eq!(tags, vec!['a', 'b']);
    }

    #[test]
    fn test_pair_replies_length_mismatch() {
        let err = pair_replies(vec![1, 2], vec![Reply::Nil]).unwrap_err();
        assert!(matches!(err, Error::ResponseShape { position: 1, .. }));
    }

    #[test]
    fn test_pair_replies_positions() {
        let pairs = pair_replies(vec!["x", "y"], vec![Reply::Int(1), Reply::Nil]).unwrap();
        assert_eq!(pairs[1], (1, "y", Reply::Nil));
    }
}
