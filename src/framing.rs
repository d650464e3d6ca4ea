//! Transport framing.
//!
//! [`Framing`] is the one place the stream and datagram transports differ on
//! the way out. [`FrameDecoder`] reassembles length prefixed frames from the
//! arbitrary chunks a stream socket hands back.

use crate::codec::{self, LENGTH_PREFIX_LEN};
use crate::error::FrameError;
use byteorder::{BigEndian, ByteOrder};
use std::fmt::Debug;
use tracing::trace;

/// Turns a serialized message into bytes ready for the socket.
pub trait Framing: Send + Sync + Debug {
    /// Short transport name used in logs.
    fn name(&self) -> &'static str;

    /// Frames one serialized message.
    ///
    /// # Arguments
    ///
    /// * `payload` - The encoded message.
    ///
    /// # Returns
    ///
    /// The bytes to hand to the socket, or a `FrameError` if the payload
    /// cannot be framed by this transport.
    fn frame(&self, payload: Vec<u8>) -> Result<Vec<u8>, FrameError>;
}

/// Length prefixed framing for TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamFraming;

impl Framing for StreamFraming {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn frame(&self, payload: Vec<u8>) -> Result<Vec<u8>, FrameError> {
        codec::frame_stream(&payload)
    }
}

/// One message per datagram, no prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatagramFraming;

impl Framing for DatagramFraming {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn frame(&self, payload: Vec<u8>) -> Result<Vec<u8>, FrameError> {
        Ok(payload)
    }
}

/// Incremental decoder for length prefixed frames.
///
/// Bytes are appended with [`feed`](Self::feed) and complete payloads are
/// taken out with [`next_frame`](Self::next_frame). Once the prefix of a frame
/// has been read, `expected` holds its length until the payload is complete.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    expected: Option<usize>,
    max_frame_len: usize,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    ///
    /// # Arguments
    ///
    /// * `max_frame_len` - The largest payload a length prefix may announce.
    ///   A larger prefix makes [`next_frame`](Self::next_frame) fail.
    ///
    /// # Examples
    ///
    /// ```
    /// use riemann_adapter::codec::frame_stream;
    /// use riemann_adapter::framing::FrameDecoder;
    ///
    /// let framed = frame_stream(b"payload").unwrap();
    /// let mut decoder = FrameDecoder::new(1024);
    ///
    /// decoder.feed(&framed[..6]);
    /// assert_eq!(decoder.next_frame().unwrap(), None);
    ///
    /// decoder.feed(&framed[6..]);
    /// assert_eq!(decoder.next_frame().unwrap(), Some(b"payload".to_vec()));
    /// ```
    pub fn new(max_frame_len: usize) -> Self {
        FrameDecoder {
            buffer: Vec::with_capacity(4096),
            expected: None,
            max_frame_len,
        }
    }

    /// Appends bytes read from the socket. Nothing is decoded until
    /// [`next_frame`](Self::next_frame) is called.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete payload, or `None` if more bytes are needed.
    ///
    /// Call repeatedly after each [`feed`](Self::feed) until it returns
    /// `None`, since one read may complete several frames.
    ///
    /// # Errors
    ///
    /// `FrameError::TooLarge` if a prefix exceeds the configured limit. The
    /// stream cannot be resynchronised after this.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let expected = match self.expected {
            Some(expected) => expected,
            None => {
                if self.buffer.len() < LENGTH_PREFIX_LEN {
                    return Ok(None);
                }
                let length = BigEndian::read_u32(&self.buffer[..LENGTH_PREFIX_LEN]) as usize;
                if length > self.max_frame_len {
                    return Err(FrameError::TooLarge {
                        length,
                        limit: self.max_frame_len,
                    });
                }
                self.buffer.drain(..LENGTH_PREFIX_LEN);
                self.expected = Some(length);
                length
            }
        };

        if self.buffer.len() < expected {
            trace!(
                "Waiting for {} more bytes of frame",
                expected - self.buffer.len()
            );
            return Ok(None);
        }

        self.expected = None;
        let rest = self.buffer.split_off(expected);
        Ok(Some(std::mem::replace(&mut self.buffer, rest)))
    }

    /// Bytes held for the frame in progress, prefix excluded once read.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Length of the frame in progress, if its prefix has been read.
    pub fn expected(&self) -> Option<usize> {
        self.expected
    }

    /// Drops any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.expected = None;
    }
}
