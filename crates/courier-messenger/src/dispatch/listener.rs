use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use courier_core::error::Result;
use courier_core::{MessageEnvelope, TypedEnvelope};

use crate::transport::Outbound;

/// Receives every non-reply message delivered to the messenger.
///
/// Errors and panics are caught per listener; the remaining listeners still
/// run.
#[async_trait]
pub trait Listener: Send + Sync {
    async fn message_received(&self, ctx: &ListenerCtx, msg: &MessageEnvelope) -> Result<()>;
}

/// Handle returned by `add_listener`, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// What a listener may do while handling a message.
#[derive(Clone)]
pub struct ListenerCtx {
    outbound: Arc<Outbound>,
}

impl ListenerCtx {
    pub(crate) fn new(outbound: Arc<Outbound>) -> Self {
        Self { outbound }
    }

    /// Process id of the receiving messenger.
    pub fn messenger_id(&self) -> &str {
        self.outbound.sender()
    }

    /// Answer `request`. The reply goes to the requester's identity channel.
    pub async fn reply(&self, request: &MessageEnvelope, payload: TypedEnvelope) -> Result<()> {
        let reply = self.outbound.reply_envelope(request, payload);
        self.outbound.publish(&reply).await.map(|_| ())
    }

    pub fn reply_detached(&self, request: &MessageEnvelope, payload: TypedEnvelope) {
        let reply = self.outbound.reply_envelope(request, payload);
        self.outbound.publish_detached(reply);
    }

    pub async fn send(&self, channel: &str, payload: TypedEnvelope) -> Result<MessageEnvelope> {
        let msg = self.outbound.envelope(channel, payload);
        self.outbound.publish(&msg).await?;
        Ok(msg)
    }
}
