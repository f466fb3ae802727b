use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::link::{Connector, Link, Message, TransportEvent};

/// Default bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket client connector.
///
/// Each link is served by two tasks: a writer draining the outbound channel
/// into the socket, and a reader turning socket frames into
/// [`TransportEvent`]s. Cancelling the link's token stops both and sends a
/// close frame.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Connector for WsConnector {
    fn connect(&self, endpoint: &Endpoint, path: &str) -> BoxFuture<'static, Result<Link>> {
        let url = endpoint.url(path);
        let connect_timeout = self.connect_timeout;
        Box::pin(async move {
            debug!(url = %url, "opening websocket");
            let (stream, _response) = tokio::time::timeout(connect_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| TransportError::Timeout { url: url.clone() })?
                .map_err(|e| TransportError::Connect {
                    url: url.clone(),
                    source: Box::new(e),
                })?;

            let (mut write, mut read) = stream.split();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();
            let shutdown = CancellationToken::new();

            let writer_shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = writer_shutdown.cancelled() => {
                            // Frames queued before the close still go out.
                            while let Ok(message) = out_rx.try_recv() {
                                if write.send(ws_message(message)).await.is_err() {
                                    break;
                                }
                            }
                            break;
                        }
                        outbound = out_rx.recv() => {
                            let Some(message) = outbound else { break };
                            if let Err(e) = write.send(ws_message(message)).await {
                                warn!(error = %e, "websocket write failed");
                                writer_shutdown.cancel();
                                return;
                            }
                        }
                    }
                }
                let _ = write.send(WsMessage::Close(None)).await;
            });

            let reader_shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = reader_shutdown.cancelled() => break,
                        frame = read.next() => match frame {
                            Some(Ok(WsMessage::Text(text))) => {
                                let _ = in_tx.send(TransportEvent::Message(Message::Text(
                                    text.as_str().to_owned(),
                                )));
                            }
                            Some(Ok(WsMessage::Binary(bytes))) => {
                                let _ = in_tx.send(TransportEvent::Message(Message::Binary(bytes)));
                            }
                            Some(Ok(WsMessage::Close(reason))) => {
                                debug!(?reason, "websocket closed by peer");
                                let _ = in_tx.send(TransportEvent::Closed);
                                break;
                            }
                            // Control frames are answered by tungstenite.
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                warn!(error = %e, "websocket read failed");
                                let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                                let _ = in_tx.send(TransportEvent::Closed);
                                break;
                            }
                            None => {
                                let _ = in_tx.send(TransportEvent::Closed);
                                break;
                            }
                        }
                    }
                }
                reader_shutdown.cancel();
            });

            Ok(Link::new(out_tx, in_rx, shutdown))
        })
    }
}

fn ws_message(message: Message) -> WsMessage {
    match message {
        Message::Text(text) => WsMessage::Text(text.into()),
        Message::Binary(bytes) => WsMessage::Binary(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::DEFAULT_API_PATH;

    #[test]
    fn connect_timeout_is_configurable() {
        assert_eq!(WsConnector::new().connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        let connector = WsConnector::new().with_connect_timeout(Duration::from_millis(250));
        assert_eq!(connector.connect_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn refused_connection_is_an_error() {
        // Nothing listens on this port of the loopback address.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::parse("127.0.0.1", &port.to_string()).unwrap();
        let err = WsConnector::default()
            .with_connect_timeout(Duration::from_secs(2))
            .connect(&endpoint, DEFAULT_API_PATH)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Timeout { .. }
        ));
    }
}
