//! Request awaiting a correlated reply.
//!
//! Nothing is published until one of the retrieval methods is called. Each of
//! them registers the pending entry first and publishes second, so a reply can
//! never arrive before its entry exists.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use courier_core::error::Result;
use courier_core::MessageEnvelope;

use super::correlation::PendingReplies;
use crate::transport::Outbound;

#[must_use = "a ReplyHandle publishes nothing until callback, get or blocking_get is called"]
pub struct ReplyHandle {
    request: MessageEnvelope,
    timeout: Duration,
    outbound: Arc<Outbound>,
    pending: Arc<PendingReplies>,
}

impl ReplyHandle {
    pub(crate) fn new(
        request: MessageEnvelope,
        timeout: Duration,
        outbound: Arc<Outbound>,
        pending: Arc<PendingReplies>,
    ) -> Self {
        Self {
            request,
            timeout,
            outbound,
            pending,
        }
    }

    /// The request as it will be published.
    pub fn request(&self) -> &MessageEnvelope {
        &self.request
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register `f` and publish. `f` gets the reply, or `None` on timeout.
    pub async fn callback<F>(self, f: F) -> Result<()>
    where
        F: FnOnce(Option<MessageEnvelope>) + Send + 'static,
    {
        let id = self.request.id();
        self.pending.register(id, self.timeout, Box::new(f))?;
        if let Err(e) = self.outbound.publish(&self.request).await {
            self.pending.cancel(id);
            return Err(e);
        }
        Ok(())
    }

    /// Publish and wait for the reply. `Ok(None)` means the deadline passed
    /// (or the messenger was disabled) first.
    pub async fn get(self) -> Result<Option<MessageEnvelope>> {
        let rx = self.arm()?;
        let id = self.request.id();
        if let Err(e) = self.outbound.publish(&self.request).await {
            self.pending.cancel(id);
            return Err(e);
        }
        Ok(rx.await.ok().flatten())
    }

    /// Blocking form of [`get`](Self::get) for threads outside the runtime.
    ///
    /// Panics if called from within an async execution context, as
    /// `Handle::block_on` does.
    pub fn blocking_get(self) -> Result<Option<MessageEnvelope>> {
        let rx = self.arm()?;
        let id = self.request.id();
        let published = self
            .outbound
            .runtime()
            .block_on(self.outbound.publish(&self.request));
        if let Err(e) = published {
            self.pending.cancel(id);
            return Err(e);
        }
        Ok(rx.blocking_recv().ok().flatten())
    }

    fn arm(&self) -> Result<oneshot::Receiver<Option<MessageEnvelope>>> {
        let (tx, rx) = oneshot::channel();
        self.pending.register(
            self.request.id(),
            self.timeout,
            Box::new(move |reply| {
                // Receiver gone means the waiter gave up.
                let _ = tx.send(reply);
            }),
        )?;
        Ok(rx)
    }
}
