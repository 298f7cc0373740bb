use crate::cmd::Command;

/// Remove one or more keys.
///
/// The server replies with the number of keys actually removed; keys that
/// do not exist are skipped without error.
#[derive(Debug)]
pub struct Del {
    keys: Vec<String>,
}

impl Del {
    /// Create a new `Del` command covering `keys`.
    pub fn new(keys: &[&str]) -> Del {
        Del {
            keys: keys.iter().map(|key| key.to_string()).collect(),
        }
    }

    /// The keys to remove.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub(crate) fn into_command(self) -> Command {
        let mut command = Command::new("DEL");
        for key in self.keys {
            command.push(key);
        }
        command
    }
}
