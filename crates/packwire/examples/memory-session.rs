//! A session against an in-process server: one request, one event.
//!
//! Run with:
//!   cargo run --example memory-session
//!
//! Against a real server:
//!   cargo run --features cli -- send echoTest --host 192.168.1.20 --json '{"x":1}'

use bytes::BytesMut;
use packwire::codec::Value;
use packwire::frame::{decode_request, encode_event, encode_response, STATUS_OK};
use packwire::session::{
    LogHooks, ReceivedEvent, Session, SessionConfig, StaticSettings, Subscription,
};
use packwire::transport::{MemoryConnector, Message};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (connector, mut server) = MemoryConnector::pair();
    let session = Session::new(
        SessionConfig::default(),
        connector,
        StaticSettings::new("127.0.0.1", "8080"),
        LogHooks,
    );

    session.receive_event(Subscription::event(3).argument(7), |event: &ReceivedEvent| {
        eprintln!(
            "event {}/{}/{}: {:?}",
            event.command, event.subtype, event.argument, event.payload
        );
    })?;
    session.connect(false)?;
    session.on_connected().await?;

    let mut peer = server.accept().await.ok_or("server closed")?;
    eprintln!("peer connected to {}{}", peer.endpoint(), peer.path());

    // Server side: answer every request with its parameters.
    let server_task = tokio::spawn(async move {
        while let Some(message) = peer.recv().await {
            let Message::Binary(frame) = message else {
                continue;
            };
            let Ok(request) = decode_request(&frame) else {
                continue;
            };
            eprintln!("server got {} {:?}", request.command, request.params);
            let mut buf = BytesMut::new();
            if request.command == "subscribe" {
                let payload: Value = [("volume", 42)].into_iter().collect();
                if encode_event(3, 0, 7, &payload, &mut buf).is_ok() {
                    let _ = peer.send(Message::Binary(buf.freeze()));
                }
                continue;
            }
            if encode_response(&request.id, STATUS_OK, Some(&request.params), &mut buf).is_ok() {
                let _ = peer.send(Message::Binary(buf.freeze()));
            }
        }
    });

    let params: Value = [("x", 1), ("y", 2)].into_iter().collect();
    let response = session.request("echoTest", params).await?;
    eprintln!("response: {response:?}");

    session.disconnect();
    server_task.await?;
    Ok(())
}
