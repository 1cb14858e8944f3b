//! Publishing side of a messenger.
//!
//! Encodes envelopes and writes them through the commands connection. Shared by
//! the messenger handle, listener contexts and pending reply handles.

use std::sync::Arc;

use tokio::runtime::Handle;

use courier_core::error::{CourierError, Result};
use courier_core::{MessageEnvelope, TypedEnvelope};

use super::Connection;
use crate::obs::MessengerMetrics;

pub struct Outbound {
    sender: String,
    conn: Arc<dyn Connection>,
    runtime: Handle,
    metrics: Arc<MessengerMetrics>,
}

impl Outbound {
    pub fn new(
        sender: impl Into<String>,
        conn: Arc<dyn Connection>,
        runtime: Handle,
        metrics: Arc<MessengerMetrics>,
    ) -> Self {
        Self {
            sender: sender.into(),
            conn,
            runtime,
            metrics,
        }
    }

    /// Process id stamped as `sender` on every outgoing frame.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Fresh envelope from this sender.
    pub fn envelope(&self, channel: &str, payload: TypedEnvelope) -> MessageEnvelope {
        MessageEnvelope::new(self.sender.as_str(), channel, payload)
    }

    /// Reply envelope addressed to the identity channel of `request`'s sender.
    pub fn reply_envelope(
        &self,
        request: &MessageEnvelope,
        payload: TypedEnvelope,
    ) -> MessageEnvelope {
        MessageEnvelope::reply_for(request, self.sender.as_str(), payload)
    }

    /// Encode and publish. Returns the number of receivers.
    pub async fn publish(&self, msg: &MessageEnvelope) -> Result<usize> {
        if !self.conn.is_open() {
            return Err(CourierError::NotOpen);
        }
        let frame = msg.to_frame()?;
        let receivers = self.conn.publish(msg.channel(), &frame).await?;

        let kind = if msg.is_reply() { "reply" } else { "message" };
        self.metrics.frames_published.inc(&[("kind", kind)]);
        tracing::debug!(channel = %msg.channel(), id = %msg.id(), kind, receivers, "published");
        Ok(receivers)
    }

    /// Publish on the runtime without waiting. Failures are logged.
    pub fn publish_detached(self: &Arc<Self>, msg: MessageEnvelope) {
        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            if let Err(e) = this.publish(&msg).await {
                tracing::warn!(
                    channel = %msg.channel(),
                    id = %msg.id(),
                    error = %e,
                    "detached publish failed"
                );
            }
        });
    }
}
