//! The input path: Riemann messages in, generic events out.
//!
//! Connections here are plain state machines. They are handed bytes and a
//! [`Sink`] and return the bytes to write back, so they can be driven without
//! a socket.

use crate::codec;
use crate::error::{FrameError, Result};
use crate::framing::FrameDecoder;
use crate::proto::Msg;
use crate::traits::Sink;
use crate::translate::to_generic;
use tracing::{debug, error, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Open,
    Closed,
}

/// Translates every event in `msg` and pushes them to `sink`, in order.
///
/// The whole message is translated before anything is pushed, so a message
/// with an untranslatable event contributes nothing.
fn forward<S: Sink + ?Sized>(msg: &Msg, sink: &mut S) -> Result<usize> {
    let events = msg
        .events
        .iter()
        .map(to_generic)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let count = events.len();
    for event in events {
        sink.push(event)?;
    }
    Ok(count)
}

fn receive_object<S: Sink + ?Sized>(payload: &[u8], sink: &mut S) -> Result<usize> {
    let msg = codec::decode(payload)?;
    forward(&msg, sink)
}

/// Server side of a TCP connection.
///
/// Every complete frame is answered with `ok = true`, or with `ok = false` and
/// the failure if the message could not be decoded or forwarded. A bad message
/// never closes the connection; a broken length prefix does.
#[derive(Debug)]
pub struct StreamConnection {
    decoder: FrameDecoder,
    state: ConnState,
}

impl StreamConnection {
    /// Creates an open connection with an empty receive buffer.
    ///
    /// # Arguments
    ///
    /// * `max_frame_len` - The largest message a peer may announce. A larger
    ///   length prefix closes the connection.
    pub fn new(max_frame_len: usize) -> Self {
        StreamConnection {
            decoder: FrameDecoder::new(max_frame_len),
            state: ConnState::Open,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Bytes of an incomplete frame held by this connection.
    pub fn buffered(&self) -> usize {
        self.decoder.buffered()
    }

    /// Consumes `data` and returns one reply per completed message.
    ///
    /// # Arguments
    ///
    /// * `data` - Bytes as read from the socket, split at any boundary.
    /// * `sink` - Where decoded events are pushed, in message order.
    ///
    /// # Returns
    ///
    /// The replies to send back, in order, each to be written as one frame.
    /// An incomplete trailing frame is kept for the next call and produces
    /// no reply yet.
    ///
    /// # Errors
    ///
    /// On a framing error the connection closes and the error is returned;
    /// replies for messages completed earlier in `data` are lost with it.
    pub fn receive_data<S: Sink + ?Sized>(
        &mut self,
        data: &[u8],
        sink: &mut S,
    ) -> std::result::Result<Vec<Msg>, FrameError> {
        if self.state == ConnState::Closed {
            warn!("Dropping {} bytes received after close", data.len());
            return Ok(Vec::new());
        }

        self.decoder.feed(data);

        let mut replies = Vec::new();
        loop {
            let payload = match self.decoder.next_frame() {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(e) => {
                    error!("Closing connection: {}", e);
                    self.close();
                    return Err(e);
                }
            };

            let reply = match receive_object(&payload, sink) {
                Ok(count) => {
                    trace!("Forwarded {} events", count);
                    Msg::ack()
                }
                Err(e) => {
                    error!("Failed to receive object: {}", e);
                    Msg::nack(e.to_string())
                }
            };
            replies.push(reply);
        }

        Ok(replies)
    }

    /// Closes the connection, discarding any partial frame.
    pub fn close(&mut self) {
        if self.decoder.buffered() > 0 {
            debug!("Discarding {} buffered bytes", self.decoder.buffered());
        }
        self.decoder.clear();
        self.state = ConnState::Closed;
    }
}

/// Server side of a UDP socket. Each datagram is one message; nothing is ever
/// sent back.
#[derive(Debug)]
pub struct DatagramConnection {
    state: ConnState,
}

impl Default for DatagramConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl DatagramConnection {
    pub fn new() -> Self {
        DatagramConnection {
            state: ConnState::Open,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Handles one datagram.
    ///
    /// # Arguments
    ///
    /// * `data` - The whole datagram payload, one message without prefix.
    /// * `sink` - Where decoded events are pushed, in message order.
    ///
    /// # Returns
    ///
    /// Whether the datagram was forwarded. A failed datagram is logged and
    /// dropped.
    pub fn receive_datagram<S: Sink + ?Sized>(&mut self, data: &[u8], sink: &mut S) -> bool {
        if self.state == ConnState::Closed {
            return false;
        }

        match receive_object(data, sink) {
            Ok(count) => {
                trace!("Forwarded {} events", count);
                true
            }
            Err(e) => {
                error!("Failed to receive object, dropping datagram: {}", e);
                false
            }
        }
    }

    pub fn close(&mut self) {
        self.state = ConnState::Closed;
    }
}
