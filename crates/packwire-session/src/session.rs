use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::{Bytes, BytesMut};
use packwire_codec::Value;
use packwire_frame::{
    classify_binary, classify_text, encode_request, Event, Inbound, RequestId, Response,
};
use packwire_transport::{
    Connector, Endpoint, Link, LinkSender, Message, TransportEvent, WsConnector,
};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SendOptions, SessionConfig, SettingsSource};
use crate::control::{SubscribeMessage, CONTROL_PING, SUBSCRIBE_COMMAND};
use crate::error::{Result, SessionError};
use crate::hooks::{LogHooks, SessionHooks};
use crate::pending::PendingCalls;
use crate::registry::{ReceivedEvent, Subscription, SubscriptionRegistry};
use crate::state::ConnectionState;

/// A client session: one logical connection with request/response calls,
/// event subscriptions, liveness pings and automatic reconnection.
///
/// `Session` is a cheap handle; clones share the same connection, pending
/// calls and subscriptions. Background tasks stop once every handle is
/// dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    settings: Box<dyn SettingsSource>,
    hooks: Box<dyn SessionHooks>,
    shared: Mutex<Shared>,
    state: watch::Sender<ConnectionState>,
}

/// Everything mutated by both callers and connection tasks. One lock
/// guards it all; handlers and hooks run outside it.
#[derive(Default)]
struct Shared {
    /// Bumped whenever a connection is replaced or torn down. Tasks carry
    /// the generation they were started for and go quiet once it changes.
    generation: u64,
    endpoint: Option<Endpoint>,
    link: Option<LinkSender>,
    token: Option<CancellationToken>,
    pending: PendingCalls,
    registry: SubscriptionRegistry,
    waiters: Vec<oneshot::Sender<()>>,
    retries: u32,
    inert: bool,
    ping_scheduled: bool,
}

impl Shared {
    /// Stop the current connection's tasks, close its link and reject every
    /// pending call. Returns the number of rejected calls.
    fn teardown(&mut self) -> usize {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.ping_scheduled = false;
        self.generation += 1;
        self.pending.reject_all(|| SessionError::Disconnected)
    }
}

enum AfterClose {
    Retry {
        attempt: u32,
        token: CancellationToken,
    },
    GiveUp,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        connector: impl Connector,
        settings: impl SettingsSource,
        hooks: impl SessionHooks,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector: Box::new(connector),
                settings: Box::new(settings),
                hooks: Box::new(hooks),
                shared: Mutex::new(Shared::default()),
                state,
            }),
        }
    }

    /// WebSocket session with default configuration and logging hooks.
    pub fn websocket(settings: impl SettingsSource) -> Self {
        Self::new(
            SessionConfig::default(),
            WsConnector::default(),
            settings,
            LogHooks,
        )
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Start connecting to the configured server.
    ///
    /// Reads host and port from the settings source and validates them; an
    /// invalid address fires `needs_configuration` and no attempt is made.
    /// Otherwise any previous connection is dropped (its pending calls are
    /// rejected) and a new attempt starts in the background; await
    /// [`Session::on_connected`] to know when it is open.
    ///
    /// Without `force`, a connection (open or in progress) to the same
    /// address is kept as is instead of being replaced, so repeated calls do
    /// not reject pending requests. Once reconnection has given up, an
    /// unforced call fails with [`SessionError::Exhausted`]. A changed
    /// address or `force` always replaces the connection.
    pub fn connect(&self, force: bool) -> Result<()> {
        self.inner.connect(force)
    }

    /// Close the connection and reject all pending calls. No reconnect
    /// follows. Idempotent.
    pub fn disconnect(&self) {
        let rejected = {
            let mut shared = self.inner.lock();
            shared.retries = 0;
            shared.inert = false;
            shared.endpoint = None;
            shared.teardown()
        };
        self.inner.set_state(ConnectionState::Disconnected);
        info!(rejected, "disconnected");
    }

    /// Resolves once the connection is open.
    ///
    /// Waiters registered while not open are released in registration order
    /// when the next connection opens.
    pub fn on_connected(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let waiter = {
            let mut shared = self.inner.lock();
            if shared.link.is_some() {
                None
            } else {
                let (tx, rx) = oneshot::channel();
                shared.waiters.push(tx);
                Some(rx)
            }
        };
        async move {
            match waiter {
                None => Ok(()),
                Some(rx) => rx.await.map_err(|_| SessionError::Disconnected),
            }
        }
    }

    /// Send a request.
    ///
    /// With `no_response` the request is fire-and-forget and resolves to
    /// `None`. Otherwise it resolves to the decoded response payload, or
    /// fails on timeout, remote error status or disconnect.
    ///
    /// Nothing is queued while disconnected: a fire-and-forget send resolves
    /// immediately, anything else fails with [`SessionError::NotConnected`].
    pub async fn send(
        &self,
        command: &str,
        params: Value,
        options: SendOptions,
    ) -> Result<Option<Value>> {
        let timeout = options.timeout.unwrap_or(self.inner.config.request_timeout);
        let (id, reply) = {
            let mut shared = self.inner.lock();
            let Some(link) = shared.link.clone() else {
                debug!(command, "send while not connected");
                return if options.no_response {
                    Ok(None)
                } else {
                    Err(SessionError::NotConnected)
                };
            };
            let (id, bytes) = frame(command, &params)?;
            if options.no_response {
                link.send(Message::Binary(bytes))?;
                debug!(id = %id, command, "notification sent");
                return Ok(None);
            }
            let (tx, rx) = oneshot::channel();
            shared.pending.insert(id, command, tx);
            if let Err(err) = link.send(Message::Binary(bytes)) {
                shared.pending.remove(&id);
                return Err(err.into());
            }
            (id, rx)
        };
        debug!(id = %id, command, "request sent");

        let _guard = PendingGuard {
            inner: &self.inner,
            id,
        };
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result.map(Some),
            Ok(Err(_)) => Err(SessionError::Disconnected),
            Err(_) => {
                self.inner.lock().pending.remove(&id);
                warn!(id = %id, command, "request timed out");
                self.inner.hooks.notify(&format!("request timeout {id}"));
                Err(SessionError::Timeout { id, after: timeout })
            }
        }
    }

    /// Send a request and wait for its response payload.
    pub async fn request(&self, command: &str, params: Value) -> Result<Value> {
        Ok(self
            .send(command, params, SendOptions::default())
            .await?
            .unwrap_or_default())
    }

    /// Fire-and-forget request.
    pub async fn notify(&self, command: &str, params: Value) -> Result<()> {
        self.send(command, params, SendOptions::no_response())
            .await
            .map(|_| ())
    }

    /// Register `handler` for the events named by `subscription` and
    /// announce the interest to the server.
    ///
    /// Registrations survive reconnects and are re-announced on every open.
    /// A sub-type needs at least one argument to qualify.
    pub fn receive_event<F>(&self, subscription: Subscription, handler: F) -> Result<()>
    where
        F: Fn(&ReceivedEvent) + Send + Sync + 'static,
    {
        if subscription.event_list().is_empty() {
            return Err(SessionError::EmptySubscription);
        }
        if let (Some(subtype), []) = (subscription.subtype_filter(), subscription.argument_list()) {
            return Err(SessionError::SubtypeWithoutArgument { subtype });
        }
        let mut shared = self.inner.lock();
        shared.registry.register(&subscription, Arc::new(handler));
        if let Some(link) = &shared.link {
            announce(link, &subscription.messages(true));
        }
        Ok(())
    }

    /// Remove handlers and withdraw the interest from the server. Returns
    /// the number of handlers removed.
    pub fn remove_event(&self, subscription: Subscription) -> Result<usize> {
        if subscription.event_list().is_empty() {
            return Err(SessionError::EmptySubscription);
        }
        let mut shared = self.inner.lock();
        let removed = shared.registry.remove(&subscription);
        if let Some(link) = &shared.link {
            announce(link, &subscription.messages(false));
        }
        Ok(removed)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// The address of the current (or last attempted) connection.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.lock().endpoint.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.inner.lock().pending.contains(id)
    }

    /// Number of registered handler keys.
    pub fn handler_count(&self) -> usize {
        self.inner.lock().registry.len()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn connect(self: &Arc<Self>, force: bool) -> Result<()> {
        if !force && self.lock().inert {
            return Err(SessionError::Exhausted {
                attempts: self.config.max_retries,
            });
        }

        let host = self.settings.server_host();
        let port = self.settings.server_port();
        let endpoint = match Endpoint::parse(&host, &port) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                warn!(host = %host, port = %port, error = %err, "server address invalid");
                self.lock().teardown();
                self.set_state(ConnectionState::Disconnected);
                self.hooks.needs_configuration();
                return Err(SessionError::Unconfigured(err));
            }
        };

        if !force {
            let shared = self.lock();
            if shared.token.is_some() && shared.endpoint.as_ref() == Some(&endpoint) {
                return Ok(());
            }
        }
        self.open(endpoint);
        Ok(())
    }

    fn open(self: &Arc<Self>, endpoint: Endpoint) {
        let (generation, token) = {
            let mut shared = self.lock();
            let dropped = shared.teardown();
            if dropped > 0 {
                debug!(dropped, "pending requests dropped by reconnect");
            }
            let token = CancellationToken::new();
            shared.token = Some(token.clone());
            shared.endpoint = Some(endpoint.clone());
            shared.inert = false;
            (shared.generation, token)
        };
        self.set_state(ConnectionState::Connecting);
        info!(endpoint = %endpoint, generation, "connecting");

        let connecting = self.connector.connect(&endpoint, &self.config.api_path);
        tokio::spawn(run_connection(
            Arc::downgrade(self),
            generation,
            connecting,
            token,
        ));
    }

    fn reconnect(self: &Arc<Self>, generation: u64) {
        if self.lock().generation != generation {
            return;
        }
        if let Err(err) = self.connect(true) {
            debug!(error = %err, "reconnect not attempted");
        }
    }

    fn on_open(&self, generation: u64, sender: LinkSender) -> bool {
        let waiters = {
            let mut shared = self.lock();
            if shared.generation != generation {
                sender.close();
                return false;
            }
            if let Err(err) = sender.send(Message::text(CONTROL_PING)) {
                warn!(error = %err, "ping failed");
            }
            announce(&sender, &shared.registry.announcements());
            shared.retries = 0;
            shared.ping_scheduled = false;
            shared.link = Some(sender);
            self.set_state(ConnectionState::Open);
            std::mem::take(&mut shared.waiters)
        };
        info!(generation, waiters = waiters.len(), "connected");
        for waiter in waiters {
            let _ = waiter.send(());
        }
        true
    }

    fn on_error(&self, generation: u64) {
        if self.lock().generation != generation {
            return;
        }
        self.set_state(ConnectionState::Errored);
        self.hooks.needs_configuration();
    }

    fn on_closed(self: &Arc<Self>, generation: u64) {
        let after = {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            if let Some(link) = shared.link.take() {
                link.close();
            }
            shared.ping_scheduled = false;
            let dropped = shared.pending.reject_all(|| SessionError::Disconnected);
            if dropped > 0 {
                debug!(dropped, "pending requests dropped by close");
            }
            let token = shared.token.clone();
            match token {
                Some(token) if shared.retries < self.config.max_retries => {
                    shared.retries += 1;
                    AfterClose::Retry {
                        attempt: shared.retries,
                        token,
                    }
                }
                _ => {
                    shared.retries = 0;
                    shared.inert = true;
                    if let Some(token) = shared.token.take() {
                        token.cancel();
                    }
                    AfterClose::GiveUp
                }
            }
        };

        match after {
            AfterClose::Retry { attempt, token } => {
                self.set_state(ConnectionState::Closed);
                info!(attempt, generation, "connection closed, retrying");
                let weak = Arc::downgrade(self);
                let delay = self.config.retry_delay;
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {
                            if let Some(inner) = weak.upgrade() {
                                inner.reconnect(generation);
                            }
                        }
                    }
                });
            }
            AfterClose::GiveUp => {
                self.set_state(ConnectionState::Disconnected);
                warn!(attempts = self.config.max_retries, "reconnect attempts exhausted");
                self.hooks.needs_configuration();
            }
        }
    }

    fn on_message(self: &Arc<Self>, generation: u64, message: Message) {
        let inbound = match message {
            Message::Text(text) => classify_text(&text),
            Message::Binary(bytes) => classify_binary(bytes),
        };
        match inbound {
            Ok(Inbound::Pong) => self.schedule_ping(generation),
            Ok(Inbound::Response(response)) => self.on_response(response),
            Ok(Inbound::Event(event)) => self.on_event(event),
            Err(err) => warn!(error = %err, "dropping malformed frame"),
        }
    }

    /// Ping cadence follows pongs: one ping per pong, after the idle
    /// interval.
    fn schedule_ping(self: &Arc<Self>, generation: u64) {
        let token = {
            let mut shared = self.lock();
            if shared.generation != generation || shared.ping_scheduled {
                return;
            }
            let Some(token) = shared.token.clone() else {
                return;
            };
            shared.ping_scheduled = true;
            token
        };
        let weak = Arc::downgrade(self);
        let interval = self.config.ping_interval;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(interval) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.send_ping(generation);
                    }
                }
            }
        });
    }

    fn send_ping(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation != generation {
            return;
        }
        shared.ping_scheduled = false;
        if let Some(link) = &shared.link {
            if let Err(err) = link.send(Message::text(CONTROL_PING)) {
                warn!(error = %err, "ping failed");
            }
        }
    }

    fn on_response(&self, response: Response) {
        let id = response.id;
        let status = response.status;

        if response.is_ok() {
            let result = response.decode_payload().map_err(SessionError::from);
            if let Err(err) = &result {
                warn!(id = %id, error = %err, "undecodable response payload");
            }
            if self.lock().pending.settle(&id, result).is_none() {
                debug!(id = %id, "response for unknown request");
            }
            return;
        }

        if id.is_broadcast() {
            warn!(code = status, "server error broadcast");
            self.hooks.notify(&format!("Received error:{status}"));
            return;
        }

        let data = response.decode_payload().unwrap_or_default();
        let settled = self.lock().pending.settle(
            &id,
            Err(SessionError::Remote {
                code: status,
                id,
                data,
            }),
        );
        match settled {
            Some(command) => {
                warn!(id = %id, command = %command, code = status, "request failed");
                self.hooks.notify(&format!("Received error:{status} ({id})"));
            }
            None => debug!(id = %id, code = status, "error for unknown request"),
        }
    }

    fn on_event(&self, event: Event) {
        let handlers = self
            .lock()
            .registry
            .matching(event.command, event.subtype, event.argument);
        if handlers.is_empty() {
            debug!(
                command = event.command,
                subtype = event.subtype,
                argument = event.argument,
                "event without handlers"
            );
            return;
        }
        let payload = match event.decode_payload() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(command = event.command, error = %err, "dropping undecodable event");
                return;
            }
        };
        let received = ReceivedEvent {
            command: event.command,
            subtype: event.subtype,
            argument: event.argument,
            payload,
        };
        for handler in handlers {
            handler(&received);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shared
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .teardown();
    }
}

/// Removes a pending call when its caller stops waiting.
struct PendingGuard<'a> {
    inner: &'a Inner,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock().pending.remove(&self.id);
    }
}

async fn run_connection(
    inner: Weak<Inner>,
    generation: u64,
    connecting: impl Future<Output = packwire_transport::Result<Link>>,
    token: CancellationToken,
) {
    let link = tokio::select! {
        _ = token.cancelled() => return,
        link = connecting => link,
    };

    let mut events = {
        let Some(session) = inner.upgrade() else {
            return;
        };
        match link {
            Ok(link) => {
                let (sender, events) = link.split();
                if !session.on_open(generation, sender) {
                    return;
                }
                events
            }
            Err(err) => {
                warn!(error = %err, generation, "connection failed");
                session.on_error(generation);
                session.on_closed(generation);
                return;
            }
        }
    };

    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        let Some(session) = inner.upgrade() else {
            break;
        };
        match event {
            TransportEvent::Message(message) => session.on_message(generation, message),
            TransportEvent::Error(reason) => {
                warn!(reason = %reason, generation, "transport error");
                session.on_error(generation);
            }
            TransportEvent::Closed => {
                session.on_closed(generation);
                break;
            }
        }
    }
}

fn frame(command: &str, params: &Value) -> Result<(RequestId, Bytes)> {
    let id = RequestId::generate();
    let mut buf = BytesMut::new();
    encode_request(&id, command, params, &mut buf)?;
    Ok((id, buf.freeze()))
}

fn announce(link: &LinkSender, messages: &[SubscribeMessage]) {
    for message in messages {
        let sent = frame(SUBSCRIBE_COMMAND, &message.to_value())
            .and_then(|(_, bytes)| {
                link.send(Message::Binary(bytes))
                    .map_err(SessionError::from)
            });
        if let Err(err) = sent {
            warn!(error = %err, events = ?message.events, "subscribe announcement failed");
        }
    }
}
