use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use packwire_codec::Value;
use packwire_frame::{
    decode_request, encode_event, encode_response, encode_text_response, Request, RequestId,
    STATUS_OK,
};
use packwire_session::{
    ConnectionState, ReceivedEvent, Session, SessionConfig, SessionError, SessionHooks,
    SharedSettings, StaticSettings, Subscription,
};
use packwire_transport::{MemoryConnector, MemoryPeer, MemoryServer, Message};
use tokio::sync::mpsc;

#[derive(Clone, Default)]
struct Recorder {
    notices: Arc<Mutex<Vec<String>>>,
    configure: Arc<AtomicUsize>,
}

impl Recorder {
    fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    fn configure_calls(&self) -> usize {
        self.configure.load(Ordering::SeqCst)
    }
}

impl SessionHooks for Recorder {
    fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }

    fn needs_configuration(&self) {
        self.configure.fetch_add(1, Ordering::SeqCst);
    }
}

fn session_with(config: SessionConfig) -> (Session, MemoryServer, Recorder) {
    let (connector, server) = MemoryConnector::pair();
    let hooks = Recorder::default();
    let session = Session::new(
        config,
        connector,
        StaticSettings::new("127.0.0.1", "8080"),
        hooks.clone(),
    );
    (session, server, hooks)
}

fn session() -> (Session, MemoryServer, Recorder) {
    session_with(SessionConfig::default())
}

async fn open(session: &Session, server: &mut MemoryServer) -> MemoryPeer {
    session.connect(true).unwrap();
    session.on_connected().await.unwrap();
    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.recv().await, Some(Message::text("ping")));
    peer
}

async fn next_request(peer: &mut MemoryPeer) -> Request {
    match peer.recv().await {
        Some(Message::Binary(frame)) => decode_request(&frame).unwrap(),
        other => panic!("expected a request frame, got {other:?}"),
    }
}

fn reply(peer: &MemoryPeer, id: &RequestId, status: u8, payload: Option<&Value>) {
    let mut buf = BytesMut::new();
    encode_response(id, status, payload, &mut buf).unwrap();
    peer.send(Message::Binary(buf.freeze())).unwrap();
}

fn event(peer: &MemoryPeer, command: u8, subtype: u8, argument: u8, payload: &Value) {
    let mut buf = BytesMut::new();
    encode_event(command, subtype, argument, payload, &mut buf).unwrap();
    peer.send(Message::Binary(buf.freeze())).unwrap();
}

/// Round-trip one request so every frame sent before it has been handled.
async fn barrier(session: &Session, peer: &mut MemoryPeer) {
    let call = tokio::spawn({
        let session = session.clone();
        async move { session.request("sync", Value::empty_map()).await }
    });
    let req = next_request(peer).await;
    reply(peer, &req.id, STATUS_OK, None);
    call.await.unwrap().unwrap();
}

fn xy() -> Value {
    [("x", 1)].into_iter().collect()
}

#[tokio::test(start_paused = true)]
async fn request_resolves_with_response() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;
    assert_eq!(session.state(), ConnectionState::Open);

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.request("echoTest", xy()).await }
    });
    let req = next_request(&mut peer).await;
    assert_eq!(req.command, "echoTest");
    assert_eq!(req.params, xy());

    reply(&peer, &req.id, STATUS_OK, Some(&req.params));
    assert_eq!(call.await.unwrap().unwrap(), xy());
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_resolve_independently() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;

    let first = tokio::spawn({
        let session = session.clone();
        async move { session.request("a", Value::from(1)).await }
    });
    let second = tokio::spawn({
        let session = session.clone();
        async move { session.request("b", Value::from(2)).await }
    });
    let req_a = next_request(&mut peer).await;
    let req_b = next_request(&mut peer).await;
    assert_ne!(req_a.id, req_b.id);

    // Answer out of order.
    reply(&peer, &req_b.id, STATUS_OK, Some(&req_b.params));
    reply(&peer, &req_a.id, STATUS_OK, Some(&req_a.params));

    let (a, b) = (first.await.unwrap().unwrap(), second.await.unwrap().unwrap());
    let mut got = [a, b];
    got.sort_by_key(|v| v.as_i64());
    assert_eq!(got, [Value::from(1), Value::from(2)]);
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out() {
    let (session, mut server, hooks) = session();
    let mut peer = open(&session, &mut server).await;

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.request("neverReplies", Value::empty_map()).await }
    });
    let req = next_request(&mut peer).await;
    assert!(session.is_pending(&req.id));

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Timeout { id, .. } if id == req.id));
    assert!(!session.is_pending(&req.id));
    assert_eq!(hooks.notices(), vec![format!("request timeout {}", req.id)]);

    // A response after the timeout settles nothing.
    reply(&peer, &req.id, STATUS_OK, None);
    barrier(&session, &mut peer).await;
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn remote_error_rejects_with_code() {
    let (session, mut server, hooks) = session();
    let mut peer = open(&session, &mut server).await;

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.request("setVolume", xy()).await }
    });
    let req = next_request(&mut peer).await;
    reply(&peer, &req.id, 9, None);

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Remote { code: 9, id, .. } if id == req.id));
    assert_eq!(hooks.notices(), vec![format!("Received error:9 ({})", req.id)]);
}

#[tokio::test(start_paused = true)]
async fn text_response_resolves_with_string() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.request("version", Value::empty_map()).await }
    });
    let req = next_request(&mut peer).await;
    peer.send(Message::Text(encode_text_response(&req.id, STATUS_OK, "1.4.2")))
        .unwrap();
    assert_eq!(call.await.unwrap().unwrap(), Value::from("1.4.2"));
}

#[tokio::test(start_paused = true)]
async fn broadcast_error_only_notifies() {
    let (session, mut server, hooks) = session();
    let mut peer = open(&session, &mut server).await;

    peer.send(Message::Text(encode_text_response(&RequestId::broadcast(), 4, "")))
        .unwrap();
    // Status 0 on the broadcast id is not an error.
    peer.send(Message::Text(encode_text_response(&RequestId::broadcast(), 0, "")))
        .unwrap();
    barrier(&session, &mut peer).await;

    assert_eq!(hooks.notices(), vec!["Received error:4".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn send_fails_fast_while_disconnected() {
    let (session, _server, _) = session();
    assert_eq!(session.state(), ConnectionState::Disconnected);

    let err = session.request("echoTest", xy()).await.unwrap_err();
    assert!(matches!(err, SessionError::NotConnected));
    // Fire-and-forget resolves without sending.
    session.notify("echoTest", xy()).await.unwrap();
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fire_and_forget_registers_nothing() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;

    session.notify("setMute", xy()).await.unwrap();
    let req = next_request(&mut peer).await;
    assert_eq!(req.command, "setMute");
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn event_fans_out_to_every_match() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let by_argument = tx.clone();
    session
        .receive_event(Subscription::event(3).argument(7), move |e: &ReceivedEvent| {
            let _ = by_argument.send(("argument", e.clone()));
        })
        .unwrap();
    let bare = tx;
    session
        .receive_event(Subscription::event(3), move |e: &ReceivedEvent| {
            let _ = bare.send(("bare", e.clone()));
        })
        .unwrap();

    let announce = next_request(&mut peer).await;
    assert_eq!(announce.command, "subscribe");
    assert_eq!(announce.params.get("evt"), Some(&Value::Integer(3)));
    assert_eq!(announce.params.get("act"), Some(&Value::Boolean(true)));
    assert_eq!(announce.params.get("arg"), Some(&Value::Integer(7)));
    let announce = next_request(&mut peer).await;
    assert_eq!(announce.params.get("arg"), None);

    let payload: Value = [("volume", 42)].into_iter().collect();
    event(&peer, 3, 0, 7, &payload);

    let mut labels = Vec::new();
    for _ in 0..2 {
        let (label, received) = rx.recv().await.unwrap();
        assert_eq!(received.payload, payload);
        assert_eq!((received.command, received.subtype, received.argument), (3, 0, 7));
        labels.push(label);
    }
    labels.sort_unstable();
    assert_eq!(labels, ["argument", "bare"]);

    // Another argument reaches only the bare handler.
    event(&peer, 3, 0, 8, &payload);
    assert_eq!(rx.recv().await.unwrap().0, "bare");
    barrier(&session, &mut peer).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn remove_event_withdraws_interest() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;

    session
        .receive_event(Subscription::event(2).arguments([1, 2]), |_: &ReceivedEvent| {})
        .unwrap();
    assert_eq!(session.handler_count(), 2);
    next_request(&mut peer).await;
    next_request(&mut peer).await;

    assert_eq!(session.remove_event(Subscription::event(2)).unwrap(), 2);
    assert_eq!(session.handler_count(), 0);
    let withdraw = next_request(&mut peer).await;
    assert_eq!(withdraw.command, "subscribe");
    assert_eq!(withdraw.params.get("act"), Some(&Value::Boolean(false)));

    assert!(matches!(
        session.remove_event(Subscription::events([])),
        Err(SessionError::EmptySubscription)
    ));
}

#[tokio::test(start_paused = true)]
async fn subtype_needs_an_argument() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;

    let err = session
        .receive_event(Subscription::event(3).subtype(4), |_| {})
        .unwrap_err();
    assert!(matches!(err, SessionError::SubtypeWithoutArgument { subtype: 4 }));
    assert_eq!(session.handler_count(), 0);

    session
        .receive_event(Subscription::event(3).argument(1).subtype(4), |_| {})
        .unwrap();
    let announce = next_request(&mut peer).await;
    assert_eq!(announce.params.get("arg"), Some(&Value::Integer(1)));

    assert_eq!(session.remove_event(Subscription::event(3).subtype(4)).unwrap(), 1);
    assert_eq!(session.handler_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_do_not_break_the_session() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    session
        .receive_event(Subscription::event(1), move |e: &ReceivedEvent| {
            let _ = tx.send(e.payload.clone());
        })
        .unwrap();
    next_request(&mut peer).await;

    peer.send(Message::binary(vec![1, 2, 3])).unwrap();
    peer.send(Message::text("garbage")).unwrap();
    // Event with a truncated payload.
    peer.send(Message::binary(b"event\x01\x00\x00\x51\x02".to_vec()))
        .unwrap();
    event(&peer, 1, 0, 0, &Value::from("ok"));

    assert_eq!(rx.recv().await.unwrap(), Value::from("ok"));
    barrier(&session, &mut peer).await;
    assert_eq!(session.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn disconnect_rejects_pending_and_ignores_stale_response() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.request("slow", Value::empty_map()).await }
    });
    let req = next_request(&mut peer).await;

    session.disconnect();
    session.disconnect();
    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::Disconnected));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(peer.recv().await, None);

    // Deliberate disconnects are not retried.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(server.try_accept().is_none());

    // A stale response on a fresh connection settles nothing.
    let mut peer = open(&session, &mut server).await;
    reply(&peer, &req.id, STATUS_OK, Some(&Value::from("late")));
    let call = tokio::spawn({
        let session = session.clone();
        async move { session.request("echoTest", xy()).await }
    });
    let fresh = next_request(&mut peer).await;
    reply(&peer, &fresh.id, STATUS_OK, Some(&fresh.params));
    assert_eq!(call.await.unwrap().unwrap(), xy());
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnects_after_close() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;
    let mut states = session.watch_state();

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.request("slow", Value::empty_map()).await }
    });
    next_request(&mut peer).await;
    peer.close();

    assert!(matches!(
        call.await.unwrap().unwrap_err(),
        SessionError::Disconnected
    ));
    states
        .wait_for(|state| *state == ConnectionState::Closed)
        .await
        .unwrap();

    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.recv().await, Some(Message::text("ping")));
    session.on_connected().await.unwrap();
    assert_eq!(session.state(), ConnectionState::Open);
    assert_eq!(server.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn subscriptions_are_announced_on_every_open() {
    let (session, mut server, _) = session();
    session
        .receive_event(Subscription::event(5), |_: &ReceivedEvent| {})
        .unwrap();

    let mut peer = open(&session, &mut server).await;
    let announce = next_request(&mut peer).await;
    assert_eq!(announce.command, "subscribe");
    assert_eq!(announce.params.get("evt"), Some(&Value::Integer(5)));

    peer.close();
    let mut peer = server.accept().await.unwrap();
    assert_eq!(peer.recv().await, Some(Message::text("ping")));
    let announce = next_request(&mut peer).await;
    assert_eq!(announce.params.get("evt"), Some(&Value::Integer(5)));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_retry_budget() {
    let (session, mut server, hooks) = session_with(SessionConfig {
        max_retries: 3,
        ..SessionConfig::default()
    });
    server.set_accepting(false);

    session.connect(true).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(server.attempts(), 4);
    assert_eq!(session.state(), ConnectionState::Disconnected);
    // One prompt per failed attempt plus one for giving up.
    assert_eq!(hooks.configure_calls(), 5);
    assert!(matches!(
        session.connect(false),
        Err(SessionError::Exhausted { attempts: 3 })
    ));

    server.set_accepting(true);
    open(&session, &mut server).await;
    assert_eq!(server.attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn invalid_address_asks_for_configuration() {
    let (connector, server) = MemoryConnector::pair();
    let hooks = Recorder::default();
    let settings = SharedSettings::new("", "8080");
    let session = Session::new(
        SessionConfig::default(),
        connector,
        settings.clone(),
        hooks.clone(),
    );

    assert!(matches!(
        session.connect(false),
        Err(SessionError::Unconfigured(_))
    ));
    settings.set("10.0.0.5", "65535");
    assert!(matches!(
        session.connect(true),
        Err(SessionError::Unconfigured(_))
    ));
    assert_eq!(hooks.configure_calls(), 2);
    assert_eq!(server.attempts(), 0);

    settings.set("10.0.0.5", "8080");
    session.connect(false).unwrap();
    session.on_connected().await.unwrap();
    assert_eq!(server.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_without_force_keeps_a_live_connection() {
    let (connector, mut server) = MemoryConnector::pair();
    let settings = SharedSettings::new("10.0.0.5", "8080");
    let session = Session::new(
        SessionConfig::default(),
        connector,
        settings.clone(),
        Recorder::default(),
    );

    session.connect(false).unwrap();
    session.on_connected().await.unwrap();
    session.connect(false).unwrap();
    assert_eq!(server.attempts(), 1);

    // A changed address replaces the connection.
    settings.set("10.0.0.6", "8080");
    session.connect(false).unwrap();
    session.on_connected().await.unwrap();
    assert_eq!(server.attempts(), 2);
    let _first = server.accept().await.unwrap();
    let second = server.accept().await.unwrap();
    assert_eq!(second.endpoint().to_string(), "10.0.0.6:8080");
    assert_eq!(session.endpoint(), Some(second.endpoint().clone()));
}

#[tokio::test(start_paused = true)]
async fn pong_drives_the_next_ping() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;

    peer.send(Message::text("pong")).unwrap();
    peer.send(Message::text("pong")).unwrap();
    barrier(&session, &mut peer).await;

    assert!(tokio::time::timeout(Duration::from_secs(29), peer.recv())
        .await
        .is_err());
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), peer.recv()).await,
        Ok(Some(Message::text("ping")))
    );
    // One ping per pong round, not a free-running timer.
    assert!(tokio::time::timeout(Duration::from_secs(120), peer.recv())
        .await
        .is_err());
}

#[tokio::test(start_paused = true)]
async fn waiters_release_in_registration_order() {
    let (session, mut server, _) = session();
    let (tx, mut released) = mpsc::unbounded_channel();
    let waiters: Vec<_> = (1..=3).map(|n| (n, session.on_connected())).collect();

    // Spawned in reverse so only the release order decides the result.
    for (n, waiter) in waiters.into_iter().rev() {
        let tx = tx.clone();
        tokio::spawn(async move {
            waiter.await.unwrap();
            tx.send(n).unwrap();
        });
    }
    drop(tx);
    tokio::task::yield_now().await;

    let peer = open(&session, &mut server).await;
    let mut order = Vec::new();
    while let Some(n) = released.recv().await {
        order.push(n);
    }
    assert_eq!(order, vec![1, 2, 3]);

    // Once open, a new waiter resolves at once.
    session.on_connected().await.unwrap();
    drop(peer);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_session_closes_the_link() {
    let (session, mut server, _) = session();
    let mut peer = open(&session, &mut server).await;
    drop(session);
    assert_eq!(peer.recv().await, None);
}
