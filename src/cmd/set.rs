use crate::cmd::Command;

use bytes::Bytes;

/// Set `key` to hold `value`.
///
/// If the key already holds a value it is overwritten, and any time to live
/// previously associated with the key is discarded. The server acknowledges
/// with the simple string `OK`.
#[derive(Debug)]
pub struct Set {
    /// The lookup key.
    key: String,

    /// The value to store. May contain arbitrary bytes.
    value: Bytes,
}

impl Set {
    /// Create a new `Set` command.
    pub fn new(key: impl ToString, value: Bytes) -> Set {
        Set {
            key: key.to_string(),
            value,
        }
    }

    /// Get the key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the value.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub(crate) fn into_command(self) -> Command {
        let mut command = Command::new("SET");
        command.push(self.key);
        command.push(self.value);
        command
    }
}
