//! A conformance harness for RESP key-value servers.
//!
//! The server under test is an external process reachable over TCP. This
//! crate encodes commands as RESP arrays of bulk strings, decodes whatever
//! reply comes back, and drives a scripted scenario that checks each reply
//! against an expected shape, collecting per-step results instead of
//! aborting on the first mismatch.

pub mod client;
pub mod cmd;
mod connection;
pub mod frame;
pub mod harness;

#[doc(inline)]
pub use client::Client;

#[doc(inline)]
pub use cmd::Command;

#[doc(inline)]
pub use connection::Connection;

#[doc(inline)]
pub use frame::Frame;

use std::fmt;
use std::io;

/// Default host a RESP server is expected to run on.
pub const DEFAULT_HOST: &str = "localhost";

/// Default port that a RESP server listens on.
pub const DEFAULT_PORT: &str = "6379";

/// Error raised while driving commands against a live server.
///
/// Expectation mismatches are not represented here. A reply that decodes
/// but fails its step's predicate is an outcome in the run report, not an
/// error; only transport and usage failures surface as `Error`.
#[derive(Debug)]
pub enum Error {
    /// TCP connect to the target address was refused or timed out.
    Unreachable(io::Error),

    /// The peer closed the connection before a full reply was read.
    ConnectionClosed,

    /// The peer sent bytes that cannot form a valid reply. Carries the
    /// offset of the offending byte and the frame tag being decoded.
    Protocol {
        offset: usize,
        tag: u8,
        message: String,
    },

    /// The read deadline elapsed while waiting for a reply.
    TimedOut,

    /// A command with no arguments cannot be framed. Raised before any
    /// bytes are written to the socket.
    InvalidCommand,

    /// The server answered with an error reply.
    Server(String),

    /// The server answered with a reply of the wrong type for the command.
    UnexpectedReply(String),

    /// Any other socket-level failure.
    Io(io::Error),
}

/// A specialized `Result` type for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unreachable(err) => write!(fmt, "server unreachable: {}", err),
            Error::ConnectionClosed => "server closed the connection mid-reply".fmt(fmt),
            Error::Protocol {
                offset,
                tag,
                message,
            } => write!(
                fmt,
                "protocol error at byte {} (tag {:?}): {}",
                offset, *tag as char, message
            ),
            Error::TimedOut => "timed out waiting for a reply".fmt(fmt),
            Error::InvalidCommand => "a command must have at least one argument".fmt(fmt),
            Error::Server(msg) => write!(fmt, "server error: {}", msg),
            Error::UnexpectedReply(msg) => msg.fmt(fmt),
            Error::Io(err) => err.fmt(fmt),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Unreachable(err) | Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(src: io::Error) -> Error {
        match src.kind() {
            // The peer going away mid-conversation is reported distinctly
            // from other socket failures so the harness can tell "server
            // hung up" from "socket broke".
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(src),
        }
    }
}

impl From<frame::Error> for Error {
    fn from(src: frame::Error) -> Error {
        match src {
            // `Incomplete` escaping the read loop means the stream ended
            // before the frame did.
            frame::Error::Incomplete => Error::ConnectionClosed,
            frame::Error::Malformed {
                offset,
                tag,
                message,
            } => Error::Protocol {
                offset,
                tag,
                message,
            },
        }
    }
}
