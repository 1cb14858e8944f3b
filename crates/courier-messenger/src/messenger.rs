//! Messenger handle.
//!
//! Owns the two bus connections, the dispatcher and the pending reply table.
//! Cheap to clone; every clone drives the same instance. Lifecycle is
//! `Active -> Disabled`, and disabling is terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use courier_core::error::{CourierError, Result};
use courier_core::{MessageEnvelope, TypedEnvelope};

use crate::config::{MessengerConfig, MessengerSection};
use crate::dispatch::{Dispatcher, Listener, ListenerCtx, ListenerId};
use crate::obs::MessengerMetrics;
use crate::reply::{PendingReplies, ReplyHandle, Scheduler, TimeoutTask};
use crate::transport::{Connection, Connector, FrameSink, Outbound};

#[derive(Clone)]
pub struct Messenger {
    inner: Arc<MessengerInner>,
}

struct MessengerInner {
    cfg: MessengerSection,
    connector: Arc<dyn Connector>,
    inbound: Arc<dyn Connection>,
    outbound: Arc<Outbound>,
    dispatcher: Arc<Dispatcher>,
    pending: Arc<PendingReplies>,
    metrics: Arc<MessengerMetrics>,
    disabled: AtomicBool,
}

impl Messenger {
    /// Validate `cfg`, claim its process id on `connector` and open both
    /// connections.
    ///
    /// Fails with `AlreadyInitialized` while another messenger with the same
    /// id is active on the same connector. Must be called inside a tokio
    /// runtime; that runtime drives timers and detached publishes.
    pub async fn start(cfg: MessengerConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        cfg.validate()?;
        let cfg = cfg.messenger;

        let runtime = Handle::try_current()
            .map_err(|e| CourierError::Transport(format!("messenger needs a tokio runtime: {e}")))?;

        if !connector.claim(&cfg.id) {
            return Err(CourierError::AlreadyInitialized(cfg.id));
        }

        match Self::open(cfg.clone(), Arc::clone(&connector), runtime).await {
            Ok(inner) => {
                tracing::info!(
                    id = %inner.cfg.id,
                    inbound = %inner.inbound.name(),
                    "messenger started"
                );
                Ok(Self {
                    inner: Arc::new(inner),
                })
            }
            Err(e) => {
                connector.release(&cfg.id);
                Err(e)
            }
        }
    }

    async fn open(
        cfg: MessengerSection,
        connector: Arc<dyn Connector>,
        runtime: Handle,
    ) -> Result<MessengerInner> {
        let metrics = Arc::new(MessengerMetrics::default());
        let pending = Arc::new(PendingReplies::new(
            Scheduler::Runtime(runtime.clone()),
            Arc::clone(&metrics),
        ));

        // Outbound first: the dispatcher hands it to listeners for replies.
        let commands = connector.connect(&cfg.commands_name(), None).await?;
        let outbound = Arc::new(Outbound::new(
            cfg.id.as_str(),
            commands,
            runtime.clone(),
            Arc::clone(&metrics),
        ));

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&pending),
            ListenerCtx::new(Arc::clone(&outbound)),
            Arc::clone(&metrics),
            &runtime,
        ));
        let sink: Arc<dyn FrameSink> = dispatcher.clone();

        let inbound = match connector.connect(&cfg.listener_name(), Some(sink)).await {
            Ok(conn) => conn,
            Err(e) => {
                outbound.close().await;
                return Err(e);
            }
        };
        if let Err(e) = inbound.subscribe(&cfg.id).await {
            inbound.close().await;
            outbound.close().await;
            return Err(e);
        }

        Ok(MessengerInner {
            cfg,
            connector,
            inbound,
            outbound,
            dispatcher,
            pending,
            metrics,
            disabled: AtomicBool::new(false),
        })
    }

    /// Process id (also the identity channel).
    pub fn id(&self) -> &str {
        &self.inner.cfg.id
    }

    pub fn is_active(&self) -> bool {
        !self.inner.disabled.load(Ordering::Acquire)
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.cfg.reply_timeout()
    }

    pub fn metrics(&self) -> &MessengerMetrics {
        &self.inner.metrics
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.inner.pending.len()
    }

    /// Publish `payload` on `channel`. Returns the envelope as published.
    pub async fn send(&self, channel: &str, payload: TypedEnvelope) -> Result<MessageEnvelope> {
        self.ensure_active()?;
        let msg = self.inner.outbound.envelope(channel, payload);
        self.inner.outbound.publish(&msg).await?;
        Ok(msg)
    }

    /// Fire-and-forget [`send`](Self::send). Publish failures are logged.
    pub fn send_detached(&self, channel: &str, payload: TypedEnvelope) -> Result<MessageEnvelope> {
        self.ensure_active()?;
        let msg = self.inner.outbound.envelope(channel, payload);
        self.inner.outbound.publish_detached(msg.clone());
        Ok(msg)
    }

    /// Prepare a request whose reply is awaited for at most `timeout`.
    pub fn send_with_reply(
        &self,
        channel: &str,
        payload: TypedEnvelope,
        timeout: Duration,
    ) -> Result<ReplyHandle> {
        self.ensure_active()?;
        let request = self.inner.outbound.envelope(channel, payload);
        Ok(ReplyHandle::new(
            request,
            timeout,
            Arc::clone(&self.inner.outbound),
            Arc::clone(&self.inner.pending),
        ))
    }

    /// [`send_with_reply`](Self::send_with_reply) with the configured timeout.
    pub fn send_with_default_reply(
        &self,
        channel: &str,
        payload: TypedEnvelope,
    ) -> Result<ReplyHandle> {
        self.send_with_reply(channel, payload, self.default_timeout())
    }

    /// Answer `request` on its sender's identity channel.
    pub async fn reply(&self, request: &MessageEnvelope, payload: TypedEnvelope) -> Result<()> {
        self.ensure_active()?;
        let reply = self.inner.outbound.reply_envelope(request, payload);
        self.inner.outbound.publish(&reply).await.map(|_| ())
    }

    pub fn reply_detached(&self, request: &MessageEnvelope, payload: TypedEnvelope) -> Result<()> {
        self.ensure_active()?;
        let reply = self.inner.outbound.reply_envelope(request, payload);
        self.inner.outbound.publish_detached(reply);
        Ok(())
    }

    pub async fn subscribe(&self, channel: &str) -> Result<()> {
        self.ensure_active()?;
        self.inner.inbound.subscribe(channel).await?;
        tracing::debug!(id = %self.id(), %channel, "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.ensure_active()?;
        self.inner.inbound.unsubscribe(channel).await?;
        tracing::debug!(id = %self.id(), %channel, "unsubscribed");
        Ok(())
    }

    pub fn add_listener(&self, listener: Arc<dyn Listener>) -> Result<ListenerId> {
        self.ensure_inbound_open()?;
        Ok(self.inner.dispatcher.add_listener(listener))
    }

    /// Returns false if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        self.ensure_inbound_open()?;
        Ok(self.inner.dispatcher.remove_listener(id))
    }

    /// Replace the deadline scheduler for subsequent requests.
    pub fn set_scheduler<F>(&self, f: F)
    where
        F: Fn(TimeoutTask, Duration) + Send + Sync + 'static,
    {
        self.inner.pending.set_scheduler(Scheduler::custom(f));
    }

    /// Close both connections, complete every pending request with `None` and
    /// release the process id. Idempotent.
    pub async fn disable(&self) {
        if self.inner.disabled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.dispatcher.deactivate();
        self.inner.inbound.close().await;
        self.inner.outbound.close().await;
        let drained = self.inner.pending.drain();
        self.inner.connector.release(&self.inner.cfg.id);
        tracing::info!(id = %self.id(), drained, "messenger disabled");
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CourierError::NotOpen)
        }
    }

    fn ensure_inbound_open(&self) -> Result<()> {
        if self.inner.inbound.is_open() {
            Ok(())
        } else {
            Err(CourierError::NotOpen)
        }
    }
}

impl Drop for MessengerInner {
    fn drop(&mut self) {
        if !self.disabled.load(Ordering::Acquire) {
            self.dispatcher.deactivate();
            self.connector.release(&self.cfg.id);
        }
    }
}
