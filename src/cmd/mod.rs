//! Commands understood by the server under test.
//!
//! Each verb gets its own builder type that lowers into the generic
//! [`Command`] representation framed on the wire.

mod del;
pub use del::Del;

mod expire;
pub use expire::Expire;

mod get;
pub use get::Get;

mod metrics;
pub use metrics::Metrics;

mod persist;
pub use persist::Persist;

mod set;
pub use set::Set;

mod ttl;
pub use ttl::Ttl;

use bytes::Bytes;
use std::fmt;
use std::io::Write;

/// A full request: one verb followed by its arguments.
///
/// On the wire a command is a RESP array of bulk strings, one per part.
/// Parts are framed by explicit byte lengths, so they may contain any byte
/// value, including `\r`, `\n` and NUL; nothing is ever escaped.
#[derive(Debug, Clone)]
pub struct Command {
    parts: Vec<Bytes>,
}

impl Command {
    pub(crate) fn new(verb: &'static str) -> Command {
        Command {
            parts: vec![Bytes::from_static(verb.as_bytes())],
        }
    }

    /// Build a command from raw parts. The first part is the verb.
    ///
    /// An empty part list is representable but not sendable; `encode`
    /// rejects it before any I/O happens.
    pub fn from_parts(parts: Vec<Bytes>) -> Command {
        Command { parts }
    }

    pub(crate) fn push(&mut self, part: impl Into<Bytes>) {
        self.parts.push(part.into());
    }

    /// The raw parts of this command, verb first.
    pub fn parts(&self) -> &[Bytes] {
        &self.parts
    }

    /// Encode the command into its wire frame: `*<argc>\r\n` followed by
    /// `$<len>\r\n<bytes>\r\n` per part.
    ///
    /// Encoding is deterministic; the same command always produces
    /// identical bytes. A command with no parts fails with
    /// `Error::InvalidCommand`.
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        if self.parts.is_empty() {
            return Err(crate::Error::InvalidCommand);
        }

        let mut frame = Vec::new();

        write!(frame, "*{}\r\n", self.parts.len())?;
        for part in &self.parts {
            write!(frame, "${}\r\n", part.len())?;
            frame.extend_from_slice(part);
            frame.extend_from_slice(b"\r\n");
        }

        Ok(frame)
    }
}

impl fmt::Display for Command {
    /// Renders the command the way a user would type it: parts separated
    /// by spaces, non-UTF-8 bytes replaced.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(fmt, " ")?;
            }
            write!(fmt, "{}", String::from_utf8_lossy(part))?;
        }

        Ok(())
    }
}
