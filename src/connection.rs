use crate::cmd::Command;
use crate::frame::{self, Frame};

use bytes::{Buf, BytesMut};
use std::io::Cursor;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time::{self, Duration};

/// Send commands to and receive reply frames from a remote peer.
///
/// Replies may arrive split at arbitrary byte boundaries; reads are buffered
/// and retried until a full frame is available. Every socket read is bounded
/// by the read timeout so an unresponsive peer fails the operation instead
/// of hanging it.
#[derive(Debug)]
pub struct Connection {
    /// The `TcpStream`, decorated with write-level buffering.
    stream: BufWriter<TcpStream>,
    /// Bytes received but not yet decoded into a frame.
    buffer: BytesMut,
    /// Deadline applied to each socket read while waiting for a reply.
    read_timeout: Duration,
}

/// How long a single reply may take before the read is abandoned.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

impl Connection {
    /// Create a new `Connection` over an established socket.
    pub fn new(socket: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(socket),
            buffer: BytesMut::with_capacity(4 * 1024),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Replace the per-read reply deadline.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Read a single reply frame from the underlying stream.
    ///
    /// # Returns
    ///
    /// On success, the decoded frame. If the stream is closed cleanly
    /// between frames, `None`. A close that splits a frame in half is
    /// `Error::ConnectionClosed`, and a read that outlives the timeout is
    /// `Error::TimedOut`.
    pub async fn read_frame(&mut self) -> crate::Result<Option<Frame>> {
        loop {
            // Attempt to decode a frame from the data buffered so far.
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            // Not enough buffered data; pull more from the socket. `0`
            // indicates end of stream.
            let read = time::timeout(self.read_timeout, self.stream.read_buf(&mut self.buffer))
                .await
                .map_err(|_| crate::Error::TimedOut)??;

            if read == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(crate::Error::ConnectionClosed);
            }
        }
    }

    /// Tries to decode one frame from the buffered bytes, consuming them
    /// on success. Returns `Ok(None)` when only a prefix of a frame has
    /// been buffered so far.
    fn parse_frame(&mut self) -> crate::Result<Option<Frame>> {
        let mut cursor = Cursor::new(&self.buffer[..]);

        match Frame::parse(&mut cursor) {
            Ok(frame) => {
                let len = cursor.position() as usize;
                self.buffer.advance(len);
                Ok(Some(frame))
            }
            Err(frame::Error::Incomplete) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Encode `command` and write it to the stream, flushing so the frame
    /// is actually on the wire before the reply is awaited.
    pub async fn write_command(&mut self, command: &Command) -> crate::Result<()> {
        let bytes = command.encode()?;

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;

        Ok(())
    }
}
