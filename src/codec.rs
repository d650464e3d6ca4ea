//! Encoding and decoding of Riemann messages.
//!
//! The codec only deals in whole messages. Stream reassembly lives in
//! [`crate::framing`].

use crate::error::FrameError;
use crate::proto::{Event, Msg};
use byteorder::{BigEndian, ByteOrder};
use prost::Message;
use tracing::trace;

/// Size of the stream length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Serializes `events` as an outbound message with neither `ok` nor `error`.
///
/// # Arguments
///
/// * `events` - The events to carry, in the order they should be delivered.
///
/// # Returns
///
/// The encoded message, without any length prefix.
///
/// # Examples
///
/// ```
/// use riemann_adapter::codec::{decode, encode_batch};
/// use riemann_adapter::proto::Event;
///
/// let event = Event {
///     service: Some("cpu".to_owned()),
///     ..Default::default()
/// };
/// let data = encode_batch(vec![event.clone()]);
/// assert_eq!(decode(&data).unwrap().events, vec![event]);
/// ```
pub fn encode_batch(events: Vec<Event>) -> Vec<u8> {
    let data = Msg::with_events(events).encode_to_vec();
    trace!("Encoded batch of {} bytes", data.len());
    data
}

/// Serializes a message carrying exactly one event.
///
/// Equivalent to `encode_batch(vec![event])`.
pub fn encode_single(event: Event) -> Vec<u8> {
    encode_batch(vec![event])
}

/// Serializes any message, replies included.
pub fn encode_message(msg: &Msg) -> Vec<u8> {
    msg.encode_to_vec()
}

/// Checks that a payload of `len` bytes fits the `u32` length prefix.
pub fn prefix_len(len: usize) -> Result<u32, FrameError> {
    u32::try_from(len).map_err(|_| FrameError::TooLarge {
        length: len,
        limit: u32::MAX as usize,
    })
}

/// Prefixes `payload` with its length as a big-endian `u32`.
///
/// # Arguments
///
/// * `payload` - A serialized message.
///
/// # Returns
///
/// The prefixed bytes, or `FrameError::TooLarge` if the payload is larger
/// than a `u32` can describe.
pub fn frame_stream(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = prefix_len(payload.len())?;
    let mut framed = vec![0u8; LENGTH_PREFIX_LEN + payload.len()];
    BigEndian::write_u32(&mut framed[..LENGTH_PREFIX_LEN], len);
    framed[LENGTH_PREFIX_LEN..].copy_from_slice(payload);
    Ok(framed)
}

/// Decodes exactly one message. Any length prefix must already be stripped.
///
/// # Errors
///
/// Returns the prost `DecodeError` if `data` is not a valid message.
pub fn decode(data: &[u8]) -> Result<Msg, prost::DecodeError> {
    Msg::decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::Attribute;

    fn event(service: &str) -> Event {
        Event {
            service: Some(service.to_owned()),
            host: Some("a".to_owned()),
            metric_d: Some(0.25),
            tags: vec!["prod".to_owned()],
            attributes: vec![Attribute {
                key: "dc".to_owned(),
                value: Some("us".to_owned()),
            }],
            ..Default::default()
        }
    }

    fn strip(framed: &[u8]) -> &[u8] {
        let len = BigEndian::read_u32(&framed[..LENGTH_PREFIX_LEN]) as usize;
        assert_eq!(len, framed.len() - LENGTH_PREFIX_LEN);
        &framed[LENGTH_PREFIX_LEN..]
    }

    #[test]
    fn framed_batches() {
        for size in [0usize, 1, 5] {
            let events: Vec<Event> = (0..size).map(|i| event(&format!("svc{}", i))).collect();
            let framed = frame_stream(&encode_batch(events.clone())).unwrap();
            let msg = decode(strip(&framed)).unwrap();
            assert_eq!(msg.events, events);
            assert_eq!(msg.ok, None);
            assert_eq!(msg.error, None);
        }
    }

    #[test]
    fn single_equals_batch_of_one() {
        assert_eq!(encode_single(event("cpu")), encode_batch(vec![event("cpu")]));
    }

    #[test]
    fn empty_frame_prefix() {
        assert_eq!(frame_stream(&[]).unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn prefix_fits_u32() {
        assert_eq!(prefix_len(0), Ok(0));
        assert_eq!(prefix_len(u32::MAX as usize), Ok(u32::MAX));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn prefix_rejects_over_4gib() {
        let len = u32::MAX as usize + 1;
        assert_eq!(
            prefix_len(len),
            Err(FrameError::TooLarge {
                length: len,
                limit: u32::MAX as usize,
            })
        );
    }

    #[test]
    fn replies() {
        let msg = decode(&encode_message(&Msg::nack("boom"))).unwrap();
        assert!(!msg.is_ok());
        assert_eq!(msg.error.as_deref(), Some("boom"));
        assert!(msg.events.is_empty());

        assert!(decode(&encode_message(&Msg::ack())).unwrap().is_ok());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
