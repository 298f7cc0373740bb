//! Reply frames in the RESP wire protocol.
//!
//! The protocol is described at <https://redis.io/topics/protocol>. The
//! first byte of a reply determines its type; every other byte is either
//! line data terminated by `\r\n` or a length-prefixed payload.

use bytes::{Buf, Bytes};
use std::convert::TryFrom;
use std::fmt;
use std::io::Cursor;

/// A single reply decoded off the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR unknown command\r\n`
    Error(String),
    /// `:1000\r\n`; signed, since TTL replies use `-1` and `-2`.
    Integer(i64),
    /// `$5\r\nvalue\r\n`; the payload may contain any byte value.
    Bulk(Bytes),
    /// `$-1\r\n`, the nil bulk string.
    Null,
    /// `*2\r\n...`; a count of `0` is a legal empty array.
    Array(Vec<Frame>),
    /// `*-1\r\n`, the nil array. Distinct from an empty array.
    NullArray,
}

/// Error encountered while decoding a frame.
#[derive(Debug)]
pub enum Error {
    /// More bytes are needed before a full frame can be decoded. The
    /// caller should buffer further input and retry from the start.
    Incomplete,

    /// The bytes can never form a valid frame.
    Malformed {
        /// Byte offset of the offending data, relative to the start of
        /// the buffer handed to `parse`.
        offset: usize,
        /// Type tag of the frame being decoded when the error occurred.
        tag: u8,
        message: String,
    },
}

impl Frame {
    /// Decodes one frame from `src`, advancing the cursor past it.
    ///
    /// # Returns
    ///
    /// `Err(Error::Incomplete)` when `src` holds only a prefix of a frame;
    /// the cursor position is unspecified in that case and the caller is
    /// expected to retry with more data. `Err(Error::Malformed)` when the
    /// data can never decode, regardless of further input.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, Error> {
        let offset = src.position() as usize;
        let tag = next_u8(src)?;

        match tag {
            // "+OK\r\n"
            b'+' => {
                let line = read_line(src)?;
                Ok(Frame::Simple(text(line, offset, tag)?))
            }
            // "-ERR unknown command\r\n"
            b'-' => {
                let line = read_line(src)?;
                Ok(Frame::Error(text(line, offset, tag)?))
            }
            // ":1000\r\n" or ":-2\r\n"
            b':' => Ok(Frame::Integer(read_int(src, tag)?)),
            // "$-1\r\n" (nil) or "$5\r\nvalue\r\n"
            b'$' => {
                let len = read_int(src, tag)?;

                if len == -1 {
                    return Ok(Frame::Null);
                }

                let len = usize::try_from(len)
                    .map_err(|_| malformed(offset, tag, "negative bulk length"))?;

                // payload plus the trailing "\r\n"
                if src.remaining() < len + 2 {
                    return Err(Error::Incomplete);
                }

                let data = Bytes::copy_from_slice(&src.chunk()[..len]);
                src.advance(len);

                let term_at = src.position() as usize;
                let term = [next_u8(src)?, next_u8(src)?];
                if term != *b"\r\n" {
                    return Err(malformed(term_at, tag, "bulk payload not terminated by CRLF"));
                }

                Ok(Frame::Bulk(data))
            }
            // "*-1\r\n" (nil), "*0\r\n" (empty) or "*2\r\n<frame><frame>"
            b'*' => {
                let count = read_int(src, tag)?;

                if count == -1 {
                    return Ok(Frame::NullArray);
                }

                let count = usize::try_from(count)
                    .map_err(|_| malformed(offset, tag, "negative array length"))?;

                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Frame::parse(src)?);
                }

                Ok(Frame::Array(items))
            }
            _ => Err(malformed(offset, tag, "unknown frame type tag")),
        }
    }

    pub(crate) fn to_error(&self) -> crate::Error {
        crate::Error::UnexpectedReply(format!("unexpected reply: {}", self))
    }
}

fn malformed(offset: usize, tag: u8, message: &str) -> Error {
    Error::Malformed {
        offset,
        tag,
        message: message.to_string(),
    }
}

fn next_u8(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }

    Ok(src.get_u8())
}

/// Returns the bytes up to the next `\r\n`, leaving the cursor after the
/// terminator.
fn read_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf = *src.get_ref();

    for i in start..buf.len().saturating_sub(1) {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            src.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }

    Err(Error::Incomplete)
}

/// Reads a `\r\n`-terminated line and parses it as a signed decimal.
fn read_int(src: &mut Cursor<&[u8]>, tag: u8) -> Result<i64, Error> {
    use atoi::atoi;

    let at = src.position() as usize;
    let line = read_line(src)?;

    atoi::<i64>(line).ok_or_else(|| malformed(at, tag, "invalid decimal integer"))
}

fn text(line: &[u8], offset: usize, tag: u8) -> Result<String, Error> {
    String::from_utf8(line.to_vec()).map_err(|_| malformed(offset, tag, "line is not valid UTF-8"))
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Incomplete => "stream ended early".fmt(fmt),
            Error::Malformed {
                offset,
                tag,
                message,
            } => write!(
                fmt,
                "malformed frame at byte {} (tag {:?}): {}",
                offset, *tag as char, message
            ),
        }
    }
}

impl fmt::Display for Frame {
    /// Renders the frame in a compact, tag-prefixed form suitable for
    /// run reports, e.g. `+OK`, `:1`, `$5 "value"`, `(nil)`.
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(text) => write!(fmt, "+{}", text),
            Frame::Error(text) => write!(fmt, "-{}", text),
            Frame::Integer(value) => write!(fmt, ":{}", value),
            Frame::Bulk(data) => {
                write!(fmt, "${} \"{}\"", data.len(), data.escape_ascii())
            }
            Frame::Null => "(nil)".fmt(fmt),
            Frame::Array(items) => {
                write!(fmt, "*{} [", items.len())?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ", ")?;
                    }
                    item.fmt(fmt)?;
                }
                write!(fmt, "]")
            }
            Frame::NullArray => "(nil array)".fmt(fmt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Result<Frame, Error> {
        Frame::parse(&mut Cursor::new(input))
    }

    #[test]
    fn parses_simple_string() {
        assert_eq!(parse(b"+OK\r\n").unwrap(), Frame::Simple("OK".into()));
    }

    #[test]
    fn parses_error() {
        assert_eq!(
            parse(b"-ERR unknown command\r\n").unwrap(),
            Frame::Error("ERR unknown command".into())
        );
    }

    #[test]
    fn parses_signed_integers() {
        assert_eq!(parse(b":1000\r\n").unwrap(), Frame::Integer(1000));
        assert_eq!(parse(b":-2\r\n").unwrap(), Frame::Integer(-2));
        assert_eq!(parse(b":0\r\n").unwrap(), Frame::Integer(0));
    }

    #[test]
    fn parses_bulk_string() {
        assert_eq!(
            parse(b"$5\r\nvalue\r\n").unwrap(),
            Frame::Bulk(Bytes::from_static(b"value"))
        );
    }

    #[test]
    fn bulk_payload_is_binary_safe() {
        assert_eq!(
            parse(b"$7\r\na\r\nb\0c\r\n").unwrap(),
            Frame::Bulk(Bytes::from_static(b"a\r\nb\0c"))
        );
    }

    #[test]
    fn nil_bulk_is_not_an_empty_bulk() {
        assert_eq!(parse(b"$-1\r\n").unwrap(), Frame::Null);
        assert_eq!(parse(b"$0\r\n\r\n").unwrap(), Frame::Bulk(Bytes::new()));
    }

    #[test]
    fn empty_array_is_not_the_nil_array() {
        assert_eq!(parse(b"*0\r\n").unwrap(), Frame::Array(vec![]));
        assert_eq!(parse(b"*-1\r\n").unwrap(), Frame::NullArray);
    }

    #[test]
    fn parses_nested_array() {
        let frame = parse(b"*3\r\n:1\r\n$3\r\nfoo\r\n*1\r\n+OK\r\n").unwrap();
        assert_eq!(
            frame,
            Frame::Array(vec![
                Frame::Integer(1),
                Frame::Bulk(Bytes::from_static(b"foo")),
                Frame::Array(vec![Frame::Simple("OK".into())]),
            ])
        );
    }

    #[test]
    fn unknown_tag_is_malformed_at_its_offset() {
        match parse(b"!oops\r\n") {
            Err(Error::Malformed { offset, tag, .. }) => {
                assert_eq!(offset, 0);
                assert_eq!(tag, b'!');
            }
            other => panic!("expected malformed error, got {:?}", other),
        }
    }

    #[test]
    fn non_numeric_integer_is_malformed() {
        assert!(matches!(
            parse(b":twelve\r\n"),
            Err(Error::Malformed { tag: b':', .. })
        ));
    }

    #[test]
    fn bulk_without_crlf_terminator_is_malformed() {
        assert!(matches!(
            parse(b"$5\r\nvalueXX"),
            Err(Error::Malformed { tag: b'$', .. })
        ));
    }

    #[test]
    fn bad_length_is_malformed() {
        assert!(matches!(
            parse(b"$-7\r\n"),
            Err(Error::Malformed { tag: b'$', .. })
        ));
        assert!(matches!(
            parse(b"*-3\r\n"),
            Err(Error::Malformed { tag: b'*', .. })
        ));
    }

    #[test]
    fn every_proper_prefix_is_incomplete() {
        // Chunking must never change the decoded result: any split point
        // leaves a prefix that reports `Incomplete` rather than decoding
        // to something else or erroring.
        let frames: &[&[u8]] = &[
            b"+OK\r\n",
            b"-ERR bad\r\n",
            b":-1\r\n",
            b"$5\r\nvalue\r\n",
            b"$-1\r\n",
            b"*2\r\n$3\r\nfoo\r\n:42\r\n",
        ];

        for full in frames {
            for cut in 0..full.len() {
                assert!(
                    matches!(parse(&full[..cut]), Err(Error::Incomplete)),
                    "prefix of {:?} at {} did not report incomplete",
                    full,
                    cut
                );
            }
            assert!(parse(full).is_ok());
        }
    }

    #[test]
    fn parse_leaves_cursor_after_the_frame() {
        let mut cursor = Cursor::new(&b"+OK\r\n:7\r\n"[..]);
        assert_eq!(Frame::parse(&mut cursor).unwrap(), Frame::Simple("OK".into()));
        assert_eq!(cursor.position(), 5);
        assert_eq!(Frame::parse(&mut cursor).unwrap(), Frame::Integer(7));
    }
}
