//! The output path: generic events out to a Riemann collector.
//!
//! [`OutputHandler`] turns events into socket ready bytes and accounts for the
//! collector's replies. [`RiemannOutput`] owns the socket a handler writes to.

use crate::codec;
use crate::config::{Endpoint, Family, HandlerConfig};
use crate::error::{Error, Result};
use crate::event::GenericEvent;
use crate::framing::{DatagramFraming, Framing, StreamFraming};
use crate::io::read_frame;
use crate::traits::Emitter;
use crate::translate::to_structured;
use async_std::{
    io::{self, Read, WriteExt},
    net::{TcpStream, ToSocketAddrs, UdpSocket},
    sync::Arc,
    task::{self, JoinHandle},
};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, instrument, trace, warn};

/// Outcome of a successfully decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyStatus {
    /// The collector accepted the message.
    Ok,
    /// The collector rejected the message, with its reason if it gave one.
    Rejected(Option<String>),
}

/// Serializes outgoing events and tracks replies for one connection.
///
/// Negative acknowledgements and replies that fail to decode are counted
/// separately. Neither triggers a resend.
#[derive(Debug)]
pub struct OutputHandler<F: Framing> {
    config: Arc<HandlerConfig>,
    framing: F,
    negative_acks: AtomicU64,
    malformed_replies: AtomicU64,
}

/// Length prefixed handler for TCP.
pub type TcpHandler = OutputHandler<StreamFraming>;

/// Unframed handler for UDP.
pub type UdpHandler = OutputHandler<DatagramFraming>;

impl<F: Framing> OutputHandler<F> {
    /// Creates a handler with zeroed counters.
    ///
    /// # Arguments
    ///
    /// * `config` - Default tags and attributes merged into every event. Only
    ///   ever read, so one config may back many handlers.
    /// * `framing` - `StreamFraming` for TCP, `DatagramFraming` for UDP.
    pub fn new(config: Arc<HandlerConfig>, framing: F) -> Self {
        OutputHandler {
            config,
            framing,
            negative_acks: AtomicU64::new(0),
            malformed_replies: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Serializes `event` as a message of its own.
    ///
    /// # Arguments
    ///
    /// * `event` - The event to send, merged with the handler defaults.
    ///
    /// # Returns
    ///
    /// Bytes ready for the socket, length prefixed on TCP. Fails with
    /// `Error::Translate` if the event has a non numeric text metric.
    ///
    /// # Examples
    ///
    /// ```
    /// use async_std::sync::Arc;
    /// use riemann_adapter::config::HandlerConfig;
    /// use riemann_adapter::framing::DatagramFraming;
    /// use riemann_adapter::output::OutputHandler;
    /// use riemann_adapter::{codec, GenericEvent};
    ///
    /// let config = Arc::new(HandlerConfig::new(["env"], [("dc", "us")]));
    /// let handler = OutputHandler::new(config, DatagramFraming);
    ///
    /// let data = handler
    ///     .serialize_event(&GenericEvent::new().with_key("cpu").with_value(0.5))
    ///     .unwrap();
    /// let msg = codec::decode(&data).unwrap();
    /// assert_eq!(msg.events[0].tags, vec!["env".to_owned()]);
    /// ```
    pub fn serialize_event(&self, event: &GenericEvent) -> Result<Vec<u8>> {
        let e = to_structured(&self.config, event)?;
        Ok(self.framing.frame(codec::encode_single(e))?)
    }

    /// Serializes `events` as one message. A single untranslatable event fails
    /// the whole batch.
    pub fn serialize_events(&self, events: &[GenericEvent]) -> Result<Vec<u8>> {
        let events = events
            .iter()
            .map(|event| to_structured(&self.config, event))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        trace!(
            "Serializing batch of {} events for {}",
            events.len(),
            self.framing.name()
        );
        Ok(self.framing.frame(codec::encode_batch(events))?)
    }

    /// Handles one reply payload, length prefix already stripped.
    ///
    /// # Returns
    ///
    /// `ReplyStatus::Ok` or `ReplyStatus::Rejected` for a decoded reply, the
    /// latter counted as a negative acknowledgement. A reply that does not
    /// decode is counted as malformed and returned as `Error::Decode`.
    pub fn on_reply_received(&self, data: &[u8]) -> Result<ReplyStatus> {
        let msg = match codec::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                self.malformed_replies.fetch_add(1, Ordering::Relaxed);
                warn!("Malformed reply from collector: {}", e);
                return Err(Error::Decode(e));
            }
        };

        if msg.is_ok() {
            trace!("Collector acknowledged message");
            return Ok(ReplyStatus::Ok);
        }

        self.negative_acks.fetch_add(1, Ordering::Relaxed);
        debug!("Collector rejected message: {:?}", msg.error);
        Ok(ReplyStatus::Rejected(msg.error))
    }

    pub fn negative_ack_count(&self) -> u64 {
        self.negative_acks.load(Ordering::Relaxed)
    }

    pub fn malformed_reply_count(&self) -> u64 {
        self.malformed_replies.load(Ordering::Relaxed)
    }
}

/// A connected output, one per configured collector.
#[derive(Debug)]
pub enum RiemannOutput {
    Tcp(TcpOutput),
    Udp(UdpOutput),
}

impl RiemannOutput {
    /// Connects to `endpoint` with the handler matching its family.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - The collector address and transport family.
    /// * `config` - Defaults shared by every event sent through this output.
    /// * `max_frame_len` - The largest reply accepted on TCP.
    #[instrument(skip(config))]
    pub async fn connect(
        endpoint: &Endpoint,
        config: Arc<HandlerConfig>,
        max_frame_len: usize,
    ) -> Result<Self> {
        match endpoint.family {
            Family::Tcp => Ok(RiemannOutput::Tcp(
                TcpOutput::connect(endpoint, config, max_frame_len).await?,
            )),
            Family::Udp => Ok(RiemannOutput::Udp(
                UdpOutput::connect(endpoint, config).await?,
            )),
        }
    }

    /// Closes the output. On TCP this waits for outstanding replies.
    pub async fn close(self) -> Result<()> {
        match self {
            RiemannOutput::Tcp(output) => output.close().await,
            RiemannOutput::Udp(_) => Ok(()),
        }
    }

    pub fn negative_ack_count(&self) -> u64 {
        match self {
            RiemannOutput::Tcp(output) => output.handler.negative_ack_count(),
            RiemannOutput::Udp(output) => output.handler.negative_ack_count(),
        }
    }

    pub fn malformed_reply_count(&self) -> u64 {
        match self {
            RiemannOutput::Tcp(output) => output.handler.malformed_reply_count(),
            RiemannOutput::Udp(output) => output.handler.malformed_reply_count(),
        }
    }
}

#[async_trait]
impl Emitter for RiemannOutput {
    async fn send_event(&self, event: &GenericEvent) -> Result<()> {
        match self {
            RiemannOutput::Tcp(output) => output.send_event(event).await,
            RiemannOutput::Udp(output) => output.send_event(event).await,
        }
    }

    async fn send_events(&self, events: &[GenericEvent]) -> Result<()> {
        match self {
            RiemannOutput::Tcp(output) => output.send_events(events).await,
            RiemannOutput::Udp(output) => output.send_events(events).await,
        }
    }
}

/// TCP output. Replies are read by a background task for as long as the
/// connection is open. Dropping the output shuts the socket down, which also
/// ends that task.
#[derive(Debug)]
pub struct TcpOutput {
    stream: TcpStream,
    handler: Arc<TcpHandler>,
    replies: Option<JoinHandle<()>>,
}

impl TcpOutput {
    pub async fn connect(
        endpoint: &Endpoint,
        config: Arc<HandlerConfig>,
        max_frame_len: usize,
    ) -> Result<Self> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        info!("Connected to {}", endpoint);
        Ok(Self::from_stream(
            stream,
            Arc::new(OutputHandler::new(config, StreamFraming)),
            max_frame_len,
        ))
    }

    /// Wraps an already connected stream and starts reading its replies.
    ///
    /// # Arguments
    ///
    /// * `stream` - The connection to the collector.
    /// * `handler` - Serializes outgoing events and counts replies.
    /// * `max_frame_len` - The largest reply accepted. A larger one stops the
    ///   reply reader.
    pub fn from_stream(stream: TcpStream, handler: Arc<TcpHandler>, max_frame_len: usize) -> Self {
        let reader = stream.clone();
        let reply_handler = Arc::clone(&handler);
        let replies = task::spawn(Self::reply_loop(reader, reply_handler, max_frame_len));

        TcpOutput {
            stream,
            handler,
            replies: Some(replies),
        }
    }

    pub fn handler(&self) -> &TcpHandler {
        &self.handler
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut stream = &self.stream;
        stream.write_all(data).await?;
        trace!("Wrote {} bytes", data.len());
        Ok(())
    }

    /// Closes the write side and waits for the reply reader to drain.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown(std::net::Shutdown::Write)?;
        if let Some(replies) = self.replies.take() {
            replies.await;
        }
        Ok(())
    }

    async fn reply_loop<R: Read + Unpin>(
        mut reader: R,
        handler: Arc<TcpHandler>,
        max_frame_len: usize,
    ) {
        let mut buf = Vec::with_capacity(64);
        loop {
            match read_frame(&mut buf, &mut reader, max_frame_len).await {
                Ok(()) => {
                    // Malformed replies are counted by the handler.
                    let _ = handler.on_reply_received(&buf);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("Collector closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Error reading reply: {}", e);
                    break;
                }
            }
        }
    }
}

impl Drop for TcpOutput {
    fn drop(&mut self) {
        // Already shut down by `close`, or by the peer.
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

#[async_trait]
impl Emitter for TcpOutput {
    async fn send_event(&self, event: &GenericEvent) -> Result<()> {
        let data = self.handler.serialize_event(event)?;
        self.write(&data).await
    }

    async fn send_events(&self, events: &[GenericEvent]) -> Result<()> {
        let data = self.handler.serialize_events(events)?;
        self.write(&data).await
    }
}

/// UDP output. Datagrams are never acknowledged.
#[derive(Debug)]
pub struct UdpOutput {
    socket: UdpSocket,
    handler: Arc<UdpHandler>,
}

impl UdpOutput {
    pub async fn connect(endpoint: &Endpoint, config: Arc<HandlerConfig>) -> Result<Self> {
        let target = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("{} did not resolve", endpoint.host),
                )
            })?;

        let local: SocketAddr = if target.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(target).await?;
        info!("Sending datagrams to {}", target);

        Ok(UdpOutput {
            socket,
            handler: Arc::new(OutputHandler::new(config, DatagramFraming)),
        })
    }

    pub fn handler(&self) -> &UdpHandler {
        &self.handler
    }
}

#[async_trait]
impl Emitter for UdpOutput {
    async fn send_event(&self, event: &GenericEvent) -> Result<()> {
        let data = self.handler.serialize_event(event)?;
        self.socket.send(&data).await?;
        Ok(())
    }

    async fn send_events(&self, events: &[GenericEvent]) -> Result<()> {
        let data = self.handler.serialize_events(events)?;
        self.socket.send(&data).await?;
        Ok(())
    }
}
