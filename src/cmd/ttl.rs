use crate::cmd::Command;

/// Query the remaining time to live of `key`.
///
/// The reply is the remaining whole seconds, `-1` when the key exists but
/// has no timeout, and `-2` when the key does not exist.
#[derive(Debug)]
pub struct Ttl {
    key: String,
}

impl Ttl {
    /// Create a new `Ttl` command.
    pub fn new(key: impl ToString) -> Ttl {
        Ttl {
            key: key.to_string(),
        }
    }

    /// Get the key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn into_command(self) -> Command {
        let mut command = Command::new("TTL");
        command.push(self.key);
        command
    }
}
