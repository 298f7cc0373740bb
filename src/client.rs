//! Client for a RESP key-value server.

use crate::cmd::{Command, Del, Expire, Get, Metrics, Persist, Set, Ttl};
use crate::{Connection, Error, Frame};

use bytes::Bytes;
use std::io;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{self, Duration};
use tracing::{debug, instrument};

/// Established connection with the server under test.
///
/// Requests are strictly sequential: the reply to one command is fully
/// decoded before the next command is sent. Dropping the client closes the
/// connection.
pub struct Client {
    connection: Connection,
}

/// How long the initial TCP connect may take before the server is
/// considered unreachable.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Establish a connection with the server located at `addr`.
///
/// Connection refusal and connect timeouts both surface as
/// `Error::Unreachable`; there is nothing to retry against.
pub async fn connect<T: ToSocketAddrs>(addr: T) -> crate::Result<Client> {
    let socket = match time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(socket)) => socket,
        Ok(Err(err)) => return Err(Error::Unreachable(err)),
        Err(_) => {
            let err = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
            return Err(Error::Unreachable(err));
        }
    };

    let connection = Connection::new(socket);

    Ok(Client { connection })
}

impl Client {
    /// Replace the deadline applied while waiting for each reply.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.connection.set_read_timeout(timeout);
    }

    /// Send `command` and decode exactly one reply.
    ///
    /// Error replies are returned as values, not converted to `Err`: the
    /// caller decides whether an error frame satisfies its expectation.
    /// Only transport-level failures surface as `Err`.
    pub async fn request(&mut self, command: Command) -> crate::Result<Frame> {
        debug!(request = %command);

        self.connection.write_command(&command).await?;

        match self.connection.read_frame().await? {
            Some(frame) => {
                debug!(reply = %frame);
                Ok(frame)
            }
            // The server closed the connection while a reply was owed.
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Get the value of the given `key`.
    #[instrument(skip(self))]
    pub async fn get(&mut self, key: &str) -> crate::Result<Option<Bytes>> {
        match self.reply_for(Get::new(key).into_command()).await? {
            Frame::Simple(value) => Ok(Some(value.into())),
            Frame::Bulk(value) => Ok(Some(value)),
            Frame::Null => Ok(None),
            frame => Err(frame.to_error()),
        }
    }

    /// Set `key` to hold the given `value`.
    #[instrument(skip(self))]
    pub async fn set(&mut self, key: &str, value: Bytes) -> crate::Result<()> {
        match self.reply_for(Set::new(key, value).into_command()).await? {
            Frame::Simple(response) if response == "OK" => Ok(()),
            frame => Err(frame.to_error()),
        }
    }

    /// Remove the given `keys`, returning how many actually existed.
    #[instrument(skip(self))]
    pub async fn del(&mut self, keys: &[&str]) -> crate::Result<i64> {
        match self.reply_for(Del::new(keys).into_command()).await? {
            Frame::Integer(removed) => Ok(removed),
            frame => Err(frame.to_error()),
        }
    }

    /// Set a timeout of `seconds` on `key`.
    ///
    /// Returns `true` when the timeout was set and `false` when the key
    /// does not exist.
    #[instrument(skip(self))]
    pub async fn expire(&mut self, key: &str, seconds: u64) -> crate::Result<bool> {
        match self
            .reply_for(Expire::new(key, seconds).into_command())
            .await?
        {
            Frame::Integer(1) => Ok(true),
            Frame::Integer(0) => Ok(false),
            frame => Err(frame.to_error()),
        }
    }

    /// Query the remaining time to live of `key`, in seconds.
    ///
    /// `-1` means the key has no timeout; `-2` means the key is absent.
    #[instrument(skip(self))]
    pub async fn ttl(&mut self, key: &str) -> crate::Result<i64> {
        match self.reply_for(Ttl::new(key).into_command()).await? {
            Frame::Integer(remaining) => Ok(remaining),
            frame => Err(frame.to_error()),
        }
    }

    /// Remove the timeout from `key`.
    ///
    /// Returns `true` when a timeout was removed, `false` when the key had
    /// no timeout or does not exist.
    #[instrument(skip(self))]
    pub async fn persist(&mut self, key: &str) -> crate::Result<bool> {
        match self.reply_for(Persist::new(key).into_command()).await? {
            Frame::Integer(1) => Ok(true),
            Frame::Integer(0) => Ok(false),
            frame => Err(frame.to_error()),
        }
    }

    /// Fetch the server's metrics snapshot. The payload is opaque.
    #[instrument(skip(self))]
    pub async fn metrics(&mut self) -> crate::Result<Frame> {
        self.reply_for(Metrics::new().into_command()).await
    }

    /// `request`, with error replies lifted into `Error::Server` for the
    /// typed methods above.
    async fn reply_for(&mut self, command: Command) -> crate::Result<Frame> {
        match self.request(command).await? {
            Frame::Error(msg) => Err(Error::Server(msg)),
            frame => Ok(frame),
        }
    }
}
