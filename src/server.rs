//! Listening side of the adapter.
//!
//! [`TcpServer`] accepts connections and hands each one to an [`Accepter`];
//! the default [`ConnectionAccepter`] runs a [`StreamConnection`] per
//! connection on its own task. [`UdpServer`] reads datagrams from a single
//! socket into a [`DatagramConnection`]. Both stop when their [`StopHandle`]
//! is triggered, either directly or on a termination signal.
//!
//! # Examples
//!
//! ```no_run
//! use async_std::channel;
//! use riemann_adapter::config::AdapterConfig;
//! use riemann_adapter::GenericEvent;
//! use riemann_adapter::transport::input_setup;
//! use signal_hook::consts::signal::{SIGINT, SIGTERM};
//!
//! # async fn run() -> riemann_adapter::error::Result<()> {
//! let (tx, rx) = channel::bounded::<GenericEvent>(1024);
//! let mut input = input_setup(&AdapterConfig::default(), tx).await?;
//! input.stop_handle().stop_on_signals(&[SIGINT, SIGTERM])?;
//! input.serve().await?;
//! # drop(rx);
//! # Ok(())
//! # }
//! ```

use crate::input::{DatagramConnection, StreamConnection};
use crate::io::write_message;
use crate::traits::{Accepter, SharedSink, Sink};
use async_std::{
    channel::{self, Receiver, Sender},
    io::{self, ReadExt},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::Arc,
    task,
};
use futures::{
    future::{select, Either},
    pin_mut,
};
use futures_util::stream::StreamExt;
use signal_hook::consts::signal::*;
use signal_hook_async_std::Signals;
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::{debug, error, info, instrument, trace, warn};

/// Largest UDP payload over IPv4.
const MAX_DATAGRAM_LEN: usize = 65_507;

const READ_BUFFER_LEN: usize = 8192;

/// Stops a running server from any task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    wake: Sender<()>,
}

impl StopHandle {
    fn new() -> (Self, Receiver<()>) {
        let (wake, woken) = channel::bounded(1);
        (
            StopHandle {
                stopped: Arc::new(AtomicBool::new(false)),
                wake,
            },
            woken,
        )
    }

    /// Stops the server. Connections already accepted are left to finish.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            warn!("Server is already in the process of stopping");
            return;
        }
        let _ = self.wake.try_send(());
        info!("Server stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Spawns a task that calls [`stop`](Self::stop) on SIGINT or SIGTERM.
    #[instrument(skip(self, signals))]
    pub fn stop_on_signals(&self, signals: &[i32]) -> io::Result<()> {
        info!("Setting up signal handling for server stop");
        if self.is_stopped() {
            warn!("Server is already stopped");
            return Ok(());
        }

        let mut signals = Signals::new(signals)?;
        let handle = self.clone();

        task::spawn(async move {
            while let Some(signal) = signals.next().await {
                match signal {
                    SIGINT | SIGTERM => {
                        info!("Received termination signal: {}", signal);
                        handle.stop();
                        break;
                    }
                    _ => {
                        debug!("Received unhandled signal: {}", signal);
                    }
                }
            }
        });

        Ok(())
    }
}

/// Runs a [`StreamConnection`] on its own task for every accepted connection,
/// pushing into a clone of `sink`.
///
/// Only a [`SharedSink`] is accepted, so every connection's events reach the
/// same destination.
#[derive(Debug, Clone)]
pub struct ConnectionAccepter<S> {
    sink: S,
    max_frame_len: usize,
}

impl<S> ConnectionAccepter<S> {
    pub fn new(sink: S, max_frame_len: usize) -> Self {
        ConnectionAccepter {
            sink,
            max_frame_len,
        }
    }
}

impl<S: SharedSink> Accepter for ConnectionAccepter<S> {
    fn accept(&self, conn: TcpStream, peer: SocketAddr) {
        let sink = self.sink.clone();
        let max_frame_len = self.max_frame_len;
        task::spawn(async move {
            if let Err(e) = serve_connection(conn, peer, sink, max_frame_len).await {
                warn!("Connection from {} failed: {}", peer, e);
            }
        });
    }
}

#[instrument(skip(stream, sink))]
async fn serve_connection<S: Sink>(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut sink: S,
    max_frame_len: usize,
) -> io::Result<()> {
    let mut conn = StreamConnection::new(max_frame_len);
    let mut buf = vec![0u8; READ_BUFFER_LEN];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            debug!("Peer closed the connection");
            break;
        }
        trace!("Read {} bytes", n);

        match conn.receive_data(&buf[..n], &mut sink) {
            Ok(replies) => {
                for reply in &replies {
                    write_message(reply, &mut stream).await?;
                }
            }
            // Already logged by the connection.
            Err(_) => break,
        }
    }

    conn.close();
    Ok(())
}

/// TCP listener for Riemann clients.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    accepter: Arc<dyn Accepter>,
    stop: StopHandle,
    woken: Receiver<()>,
}

impl TcpServer {
    /// Creates a server over an already bound `listener`.
    #[instrument(skip(accepter))]
    pub fn new(listener: TcpListener, accepter: impl Accepter + 'static) -> Self {
        info!("Creating new TcpServer instance");
        let (stop, woken) = StopHandle::new();
        TcpServer {
            listener,
            accepter: Arc::new(accepter),
            stop,
            woken,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Accepts connections until stopped or until accepting fails.
    #[instrument(skip(self))]
    pub async fn serve(&self) -> io::Result<()> {
        info!("Starting server");
        if self.stop.is_stopped() {
            warn!("Server is already stopped");
            return Ok(());
        }

        while !self.stop.is_stopped() {
            let accepted = {
                let accept = self.listener.accept();
                let woken = self.woken.recv();
                pin_mut!(accept, woken);
                match select(accept, woken).await {
                    Either::Left((result, _)) => Some(result),
                    Either::Right(_) => None,
                }
            };

            match accepted {
                Some(Ok((stream, peer))) => {
                    debug!("Accepted new connection from {}", peer);
                    self.accepter.accept(stream, peer);
                }
                Some(Err(e)) if e.kind() == io::ErrorKind::ConnectionAborted => {
                    debug!("Listener closed, stopping accept loop");
                    break;
                }
                Some(Err(e)) => {
                    error!("Error accepting connection: {}", e);
                    return Err(e);
                }
                None => break,
            }
        }

        info!("Server stop signal received, exiting accept loop");
        Ok(())
    }
}

/// UDP listener for Riemann clients.
#[derive(Debug)]
pub struct UdpServer<S> {
    socket: UdpSocket,
    sink: S,
    conn: DatagramConnection,
    stop: StopHandle,
    woken: Receiver<()>,
}

impl<S: Sink> UdpServer<S> {
    pub fn new(socket: UdpSocket, sink: S) -> Self {
        info!("Creating new UdpServer instance");
        let (stop, woken) = StopHandle::new();
        UdpServer {
            socket,
            sink,
            conn: DatagramConnection::new(),
            stop,
            woken,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Receives datagrams until stopped or until the socket fails.
    #[instrument(skip(self))]
    pub async fn serve(&mut self) -> io::Result<()> {
        info!("Starting server");
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];

        while !self.stop.is_stopped() {
            let received = {
                let recv = self.socket.recv_from(&mut buf);
                let woken = self.woken.recv();
                pin_mut!(recv, woken);
                match select(recv, woken).await {
                    Either::Left((result, _)) => Some(result),
                    Either::Right(_) => None,
                }
            };

            match received {
                Some(Ok((n, peer))) => {
                    trace!("Received {} byte datagram from {}", n, peer);
                    self.conn.receive_datagram(&buf[..n], &mut self.sink);
                }
                Some(Err(e)) => {
                    error!("Error receiving datagram: {}", e);
                    self.conn.close();
                    return Err(e);
                }
                None => break,
            }
        }

        self.conn.close();
        info!("Server stop signal received, exiting receive loop");
        Ok(())
    }
}

/// A bound input, TCP or UDP.
#[derive(Debug)]
pub enum RiemannInput<S> {
    Tcp(TcpServer),
    Udp(UdpServer<S>),
}

impl<S: Sink> RiemannInput<S> {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            RiemannInput::Tcp(server) => server.local_addr(),
            RiemannInput::Udp(server) => server.local_addr(),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        match self {
            RiemannInput::Tcp(server) => server.stop_handle(),
            RiemannInput::Udp(server) => server.stop_handle(),
        }
    }

    pub async fn serve(&mut self) -> io::Result<()> {
        match self {
            RiemannInput::Tcp(server) => server.serve().await,
            RiemannInput::Udp(server) => server.serve().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::GenericEvent;
    use std::sync::Mutex;

    fn shared_sink() -> Arc<Mutex<Vec<GenericEvent>>> {
        Arc::default()
    }

    #[async_std::test]
    async fn stop_ends_accept_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = TcpServer::new(listener, ConnectionAccepter::new(shared_sink(), 1024));
        let handle = server.stop_handle();

        let serving = task::spawn(async move { server.serve().await });
        handle.stop();
        assert!(handle.is_stopped());
        serving.await.unwrap();
    }

    #[async_std::test]
    async fn stop_is_idempotent() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut server = UdpServer::new(socket, Vec::<GenericEvent>::new());
        let handle = server.stop_handle();
        handle.stop();
        handle.stop();
        server.serve().await.unwrap();
    }
}
