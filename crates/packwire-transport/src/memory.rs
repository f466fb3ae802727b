use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::link::{Connector, Link, Message, TransportEvent};

#[derive(Debug)]
struct Shared {
    accepting: AtomicBool,
    attempts: AtomicUsize,
}

/// In-process connector. Every successful `connect` hands a [`MemoryPeer`]
/// to the paired [`MemoryServer`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side of a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryServer {
    shared: Arc<Shared>,
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    /// Create a connector and the server that receives its connections.
    pub fn pair() -> (MemoryConnector, MemoryServer) {
        let shared = Arc::new(Shared {
            accepting: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
        });
        let (peers, incoming) = mpsc::unbounded_channel();
        (
            MemoryConnector {
                shared: Arc::clone(&shared),
                peers,
            },
            MemoryServer { shared, incoming },
        )
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, endpoint: &Endpoint, path: &str) -> BoxFuture<'static, Result<Link>> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        let url = endpoint.url(path);
        let result = if self.shared.accepting.load(Ordering::SeqCst) {
            let (to_server, from_client) = mpsc::unbounded_channel();
            let (to_client, from_server) = mpsc::unbounded_channel();
            let shutdown = CancellationToken::new();
            let peer = MemoryPeer {
                endpoint: endpoint.clone(),
                path: path.to_string(),
                to_client,
                from_client,
                shutdown: shutdown.clone(),
            };
            match self.peers.send(peer) {
                Ok(()) => {
                    debug!(url = %url, "memory link opened");
                    Ok(Link::new(to_server, from_server, shutdown))
                }
                Err(_) => Err(TransportError::Refused { url }),
            }
        } else {
            Err(TransportError::Refused { url })
        };
        Box::pin(async move { result })
    }
}

impl MemoryServer {
    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// Take a pending connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }

    /// Refuse (or accept again) new connections.
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Connection attempts seen so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// Server end of one in-memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    endpoint: Endpoint,
    path: String,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<Message>,
    shutdown: CancellationToken,
}

impl MemoryPeer {
    /// The endpoint the client dialled.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The path the client asked for.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Next message from the client; `None` once the client closed.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::select! {
            biased;
            message = self.from_client.recv() => message,
            _ = self.shutdown.cancelled() => None,
        }
    }

    /// Send a message to the client.
    pub fn send(&self, message: Message) -> Result<()> {
        self.to_client
            .send(TransportEvent::Message(message))
            .map_err(|_| TransportError::Closed)
    }

    /// Report a transport error to the client.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Error(reason.into()));
    }

    /// Close from the server side.
    pub fn close(self) {
        let _ = self.to_client.send(TransportEvent::Closed);
        self.shutdown.cancel();
    }

    /// True once the client closed its side.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
