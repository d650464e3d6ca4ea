use crate::error::{Result, SinkError};
use crate::event::GenericEvent;
use async_std::channel::{Sender, TrySendError};
use async_std::net::TcpStream;
use async_trait::async_trait;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Destination for events decoded on the input path.
///
/// `push` is called once per event, in message order, from the task serving
/// the connection. It must not block.
pub trait Sink: Send {
    /// Accepts one decoded event.
    ///
    /// # Arguments
    ///
    /// * `event` - The event, always of type `event`.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the event was taken, or the `SinkError` that fails the
    /// message it belongs to.
    fn push(&mut self, event: GenericEvent) -> std::result::Result<(), SinkError>;
}

/// A sink whose clones all deliver to the same destination.
///
/// Required wherever a sink is cloned per connection, as the TCP input does.
pub trait SharedSink: Sink + Clone + Sync + Debug + 'static {}

impl SharedSink for Sender<GenericEvent> {}

impl SharedSink for Arc<Mutex<Vec<GenericEvent>>> {}

/// Collects events in place. Owned by a single connection; not a
/// [`SharedSink`], since each clone collects on its own.
impl Sink for Vec<GenericEvent> {
    fn push(&mut self, event: GenericEvent) -> std::result::Result<(), SinkError> {
        Vec::push(self, event);
        Ok(())
    }
}

/// Forwards into a channel without waiting. A full channel rejects the event.
impl Sink for Sender<GenericEvent> {
    fn push(&mut self, event: GenericEvent) -> std::result::Result<(), SinkError> {
        self.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::Full,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

/// Collects into a vector shared by every clone.
impl Sink for Arc<Mutex<Vec<GenericEvent>>> {
    fn push(&mut self, event: GenericEvent) -> std::result::Result<(), SinkError> {
        let mut events = self.lock().map_err(|_| SinkError::Closed)?;
        events.push(event);
        Ok(())
    }
}

/// The sending side of an output.
///
/// Implementors serialize events with the defaults of their handler and write
/// them to the collector. A failed send is reported once and never retried.
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Sends one event as a message of its own.
    async fn send_event(&self, event: &GenericEvent) -> Result<()>;

    /// Sends `events` as a single message.
    async fn send_events(&self, events: &[GenericEvent]) -> Result<()>;
}

/// Trait for types that can accept TCP connections.
///
/// Called by the [`TcpServer`](crate::server::TcpServer) accept loop for every
/// new connection. Implementations are expected to hand the connection off to
/// a task and return immediately.
pub trait Accepter: Send + Sync + Debug {
    fn accept(&self, conn: TcpStream, peer: SocketAddr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::channel;

    #[test]
    fn channel_sink_reports_full_and_closed() {
        let (mut tx, rx) = channel::bounded::<GenericEvent>(1);
        assert!(Sink::push(&mut tx, GenericEvent::new()).is_ok());
        assert_eq!(Sink::push(&mut tx, GenericEvent::new()), Err(SinkError::Full));

        drop(rx);
        assert_eq!(Sink::push(&mut tx, GenericEvent::new()), Err(SinkError::Closed));
    }

    #[test]
    fn shared_vec_sink_collects_across_clones() {
        let shared: Arc<Mutex<Vec<GenericEvent>>> = Arc::default();
        let mut first = shared.clone();
        let mut second = shared.clone();

        Sink::push(&mut first, GenericEvent::new().with_key("a")).unwrap();
        Sink::push(&mut second, GenericEvent::new().with_key("b")).unwrap();

        let events = shared.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].key.as_deref(), Some("b"));
    }
}
