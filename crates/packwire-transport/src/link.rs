use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// One whole message on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl Message {
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        Message::Binary(b.into())
    }

    pub fn len(&self) -> usize {
        match self {
            Message::Text(s) => s.len(),
            Message::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Something that happened on the inbound side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(Message),
    /// The transport reported an error. A `Closed` event follows.
    Error(String),
    /// The peer closed the connection or it dropped.
    Closed,
}

/// An open connection, as a pair of channels.
///
/// Dropping every [`LinkSender`] or calling [`LinkSender::close`] shuts the
/// connection down.
#[derive(Debug)]
pub struct Link {
    sender: LinkSender,
    events: LinkEvents,
}

impl Link {
    /// Assemble a link from the channels a connector pumps.
    pub fn new(
        outbound: mpsc::UnboundedSender<Message>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sender: LinkSender { outbound, shutdown },
            events: LinkEvents {
                inbound,
                closed: false,
            },
        }
    }

    pub fn split(self) -> (LinkSender, LinkEvents) {
        (self.sender, self.events)
    }
}

/// Outbound half of a [`Link`].
#[derive(Debug, Clone)]
pub struct LinkSender {
    outbound: mpsc::UnboundedSender<Message>,
    shutdown: CancellationToken,
}

impl LinkSender {
    /// Queue a message for delivery.
    pub fn send(&self, message: Message) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.outbound.is_closed()
    }
}

/// Inbound half of a [`Link`].
#[derive(Debug)]
pub struct LinkEvents {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    closed: bool,
}

impl LinkEvents {
    /// Next inbound event. A dropped transport reads as `Closed`; nothing
    /// follows a `Closed`.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }
        let event = self.inbound.recv().await.unwrap_or(TransportEvent::Closed);
        if event == TransportEvent::Closed {
            self.closed = true;
        }
        Some(event)
    }
}

/// Opens links to endpoints.
///
/// The returned future resolves once the connection is open.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &Endpoint, path: &str) -> BoxFuture<'static, Result<Link>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_after_close_fails() {
        let (tx, mut out_rx) = mpsc::unbounded_channel();
        let (_in_tx, in_rx) = mpsc::unbounded_channel();
        let (sender, _events) = Link::new(tx, in_rx, CancellationToken::new()).split();

        sender.send(Message::text("ping")).unwrap();
        assert_eq!(out_rx.recv().await, Some(Message::text("ping")));

        sender.close();
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(Message::text("ping")),
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn dropped_transport_reads_as_closed() {
        let (tx, _out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (_sender, mut events) = Link::new(tx, in_rx, CancellationToken::new()).split();

        in_tx
            .send(TransportEvent::Message(Message::binary(vec![1, 2])))
            .unwrap();
        drop(in_tx);

        assert_eq!(
            events.recv().await,
            Some(TransportEvent::Message(Message::binary(vec![1, 2])))
        );
        assert_eq!(events.recv().await, Some(TransportEvent::Closed));
        assert_eq!(events.recv().await, None);
    }
}
