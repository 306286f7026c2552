use quire_common::protocol::push::PushMessage;
use tokio::sync::broadcast;
use tracing::trace;

pub const DEFAULT_PUSH_CAPACITY: usize = 256;

/// Delivery endpoint for push messages. Delivery is fire-and-forget: an absent
/// or closed recipient is not an error.
pub trait PushSink: Send + Sync {
    fn push(&self, message: PushMessage);
}

/// Fans push messages out to every live transport connection.
#[derive(Debug, Clone)]
pub struct BroadcastPushSink {
    tx: broadcast::Sender<PushMessage>,
}

impl BroadcastPushSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushMessage> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPushSink {
    fn default() -> Self {
        Self::new(DEFAULT_PUSH_CAPACITY)
    }
}

impl PushSink for BroadcastPushSink {
    fn push(&self, message: PushMessage) {
        if self.tx.send(message).is_err() {
            trace!("push dropped: no connected receivers");
        }
    }
}
