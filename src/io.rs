//! Async I/O helpers for length prefixed Riemann messages.
//!
//! These are used where a whole frame can be awaited at once, such as reading
//! replies on an outbound TCP connection. Inbound connections feed raw chunks
//! to a [`FrameDecoder`](crate::framing::FrameDecoder) instead so that framing
//! state is visible without a socket.

use crate::codec::{self, LENGTH_PREFIX_LEN};
use crate::proto::Msg;
use async_std::io::{self, Read, ReadExt, Write, WriteExt};
use byteorder::{BigEndian, ByteOrder};
use prost::Message;
use tracing::{debug, error, instrument, trace};

/// Writes `payload` preceded by its big-endian `u32` length.
///
/// # Arguments
///
/// * `payload` - The serialized message.
/// * `w` - The writer to write the frame to.
///
/// # Returns
///
/// A `Result` indicating success or an I/O error. A payload too large for
/// the prefix fails with `InvalidInput` before anything is written.
#[instrument(skip(payload, w))]
pub async fn write_frame<W: Write + Unpin>(payload: &[u8], w: &mut W) -> io::Result<()> {
    let framed = codec::frame_stream(payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    w.write_all(&framed).await?;
    trace!("Wrote frame of {} bytes", payload.len());
    Ok(())
}

/// Encodes `msg` and writes it as a single frame.
///
/// # Examples
///
/// ```
/// use async_std::io::Cursor;
/// use riemann_adapter::io::write_message;
/// use riemann_adapter::proto::Msg;
///
/// # async_std::task::block_on(async {
/// let mut out = Cursor::new(Vec::new());
/// write_message(&Msg::ack(), &mut out).await.unwrap();
/// assert_eq!(&out.get_ref()[..4], &[0, 0, 0, 2]);
/// # })
/// ```
pub async fn write_message<W: Write + Unpin>(msg: &Msg, w: &mut W) -> io::Result<()> {
    let data = msg.encode_to_vec();
    debug!("Encoded message length: {}", data.len());
    write_frame(&data, w).await
}

/// Reads one frame into `buf`, replacing its contents.
///
/// # Arguments
///
/// * `buf` - A buffer to hold the payload, reused across calls.
/// * `r` - The reader to read the frame from.
/// * `max_len` - The largest payload accepted.
///
/// # Returns
///
/// A `Result` indicating success or an I/O error. A prefix announcing more
/// than `max_len` bytes fails with `InvalidData`; end of stream before a
/// complete frame fails with `UnexpectedEof`.
#[instrument(skip(buf, r))]
pub async fn read_frame<R: Read + Unpin>(
    buf: &mut Vec<u8>,
    r: &mut R,
    max_len: usize,
) -> io::Result<()> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    r.read_exact(&mut prefix).await?;
    let size = BigEndian::read_u32(&prefix) as usize;
    debug!("Reading frame of size: {}", size);

    if size > max_len {
        error!("Frame of {} bytes exceeds limit of {}", size, max_len);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit of {} bytes", size, max_len),
        ));
    }

    buf.resize(size, 0);
    r.read_exact(buf).await?;
    trace!("Read {} bytes into buffer", size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::io::Cursor;

    #[async_std::test]
    async fn frames_round_trip() {
        let mut out = Cursor::new(Vec::new());
        write_message(&Msg::ack(), &mut out).await.unwrap();
        write_message(&Msg::nack("nope"), &mut out).await.unwrap();

        let mut r = Cursor::new(out.into_inner());
        let mut buf = Vec::new();

        read_frame(&mut buf, &mut r, 1024).await.unwrap();
        assert!(codec::decode(&buf).unwrap().is_ok());

        read_frame(&mut buf, &mut r, 1024).await.unwrap();
        let msg = codec::decode(&buf).unwrap();
        assert_eq!(msg.error.as_deref(), Some("nope"));

        let err = read_frame(&mut buf, &mut r, 1024).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[async_std::test]
    async fn oversized_frame_is_invalid_data() {
        let mut out = Cursor::new(Vec::new());
        write_frame(&[0u8; 32], &mut out).await.unwrap();

        let mut r = Cursor::new(out.into_inner());
        let mut buf = Vec::new();
        let err = read_frame(&mut buf, &mut r, 16).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
