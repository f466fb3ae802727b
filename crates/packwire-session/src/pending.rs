use std::collections::HashMap;

use packwire_codec::Value;
use packwire_frame::RequestId;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{Result, SessionError};

/// Resolution channel of one in-flight request.
pub(crate) type Reply = oneshot::Sender<Result<Value>>;

#[derive(Debug)]
struct PendingCall {
    command: String,
    reply: Reply,
    sent_at: Instant,
}

/// In-flight requests keyed by request id.
///
/// Each entry settles at most once: the first settle removes it, so a late
/// or duplicate response finds nothing.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: HashMap<RequestId, PendingCall>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: RequestId, command: &str, reply: Reply) {
        self.calls.insert(
            id,
            PendingCall {
                command: command.to_string(),
                reply,
                sent_at: Instant::now(),
            },
        );
    }

    /// Settle and remove a call. Returns the command name, or `None` if the
    /// id is not pending.
    pub(crate) fn settle(&mut self, id: &RequestId, result: Result<Value>) -> Option<String> {
        let call = self.calls.remove(id)?;
        tracing::debug!(
            id = %id,
            command = %call.command,
            elapsed_ms = call.sent_at.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "request settled"
        );
        // The caller may have stopped waiting.
        let _ = call.reply.send(result);
        Some(call.command)
    }

    /// Drop a call without settling it.
    pub fn remove(&mut self, id: &RequestId) -> bool {
        self.calls.remove(id).is_some()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.calls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Reject every call with a fresh error; returns how many were rejected.
    pub(crate) fn reject_all(&mut self, error: impl Fn() -> SessionError) -> usize {
        let count = self.calls.len();
        for (_, call) in self.calls.drain() {
            let _ = call.reply.send(Err(error()));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RequestId {
        RequestId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn settles_once() {
        let mut pending = PendingCalls::new();
        let (tx, rx) = oneshot::channel();
        pending.insert(id("aaaaaaaaaaa"), "echoTest", tx);
        assert!(pending.contains(&id("aaaaaaaaaaa")));

        let command = pending.settle(&id("aaaaaaaaaaa"), Ok(Value::from(1)));
        assert_eq!(command.as_deref(), Some("echoTest"));
        assert_eq!(rx.await.unwrap().unwrap(), Value::from(1));

        // A duplicate response finds nothing.
        assert!(pending
            .settle(&id("aaaaaaaaaaa"), Ok(Value::from(2)))
            .is_none());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn reject_all_drains() {
        let mut pending = PendingCalls::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        pending.insert(id("aaaaaaaaaaa"), "a", tx1);
        pending.insert(id("bbbbbbbbbbb"), "b", tx2);

        assert_eq!(pending.reject_all(|| SessionError::Disconnected), 2);
        assert!(pending.is_empty());
        assert!(matches!(rx1.await.unwrap(), Err(SessionError::Disconnected)));
        assert!(matches!(rx2.await.unwrap(), Err(SessionError::Disconnected)));
    }

    #[tokio::test]
    async fn settle_after_caller_gave_up() {
        let mut pending = PendingCalls::new();
        let (tx, rx) = oneshot::channel();
        pending.insert(id("ccccccccccc"), "slow", tx);
        drop(rx);
        assert!(pending
            .settle(&id("ccccccccccc"), Ok(Value::empty_map()))
            .is_some());
    }
}
