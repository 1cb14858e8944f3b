use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use courier_core::MessageEnvelope;

use super::listener::{Listener, ListenerCtx, ListenerId};
use crate::obs::MessengerMetrics;
use crate::reply::PendingReplies;
use crate::transport::FrameSink;

/// Inbound router.
///
/// Decoding and reply resolution run on the transport's delivery task.
/// Messages are queued to a separate fan-out task, so a listener that awaits
/// (even on a reply to its own request) never holds up reply routing.
/// Listeners still see messages one at a time, in arrival order, and in
/// registration order per message.
pub struct Dispatcher {
    fanout: Arc<Fanout>,
    queue: mpsc::UnboundedSender<MessageEnvelope>,
    next_id: AtomicU64,
    pending: Arc<PendingReplies>,
    metrics: Arc<MessengerMetrics>,
}

struct Fanout {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn Listener>)>>,
    active: AtomicBool,
    ctx: ListenerCtx,
    metrics: Arc<MessengerMetrics>,
}

impl Dispatcher {
    /// Spawns the fan-out task on `runtime`. It ends when the dispatcher is
    /// dropped or deactivated.
    pub fn new(
        pending: Arc<PendingReplies>,
        ctx: ListenerCtx,
        metrics: Arc<MessengerMetrics>,
        runtime: &Handle,
    ) -> Self {
        let fanout = Arc::new(Fanout {
            listeners: RwLock::new(Vec::new()),
            active: AtomicBool::new(true),
            ctx,
            metrics: Arc::clone(&metrics),
        });

        let (queue, mut rx) = mpsc::unbounded_channel::<MessageEnvelope>();
        let worker = Arc::clone(&fanout);
        runtime.spawn(async move {
            while let Some(msg) = rx.recv().await {
                if !worker.is_active() {
                    break;
                }
                worker.deliver(&msg).await;
            }
        });

        Self {
            fanout,
            queue,
            next_id: AtomicU64::new(1),
            pending,
            metrics,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.fanout.listeners.write().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.fanout.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.fanout.listeners.read().len()
    }

    /// Frames and messages still queued after this are dropped.
    pub fn deactivate(&self) {
        self.fanout.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.fanout.is_active()
    }

    pub async fn handle_frame(&self, channel: &str, frame: &str) {
        if !self.is_active() {
            tracing::debug!(%channel, "dispatcher inactive; frame dropped");
            return;
        }

        let msg = match MessageEnvelope::from_frame(channel, frame) {
            Ok(m) => m,
            Err(e) => {
                self.metrics.decode_errors.inc(&[("code", e.code().as_str())]);
                tracing::warn!(%channel, error = %e, "dropping undecodable frame");
                return;
            }
        };

        if let Some(target) = msg.reply_to() {
            self.metrics.frames_received.inc(&[("kind", "reply")]);
            tracing::debug!(%channel, id = %msg.id(), request = %target, "reply received");
            self.pending.resolve(target, msg);
            return;
        }

        self.metrics.frames_received.inc(&[("kind", "message")]);
        tracing::debug!(%channel, id = %msg.id(), sender = %msg.sender(), "message received");

        if let Err(e) = self.queue.send(msg) {
            tracing::debug!(id = %e.0.id(), "fan-out stopped; message dropped");
        }
    }
}

impl Fanout {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    async fn deliver(&self, msg: &MessageEnvelope) {
        // Snapshot so listeners may add or remove listeners while running.
        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        for (id, listener) in listeners {
            let run = AssertUnwindSafe(listener.message_received(&self.ctx, msg)).catch_unwind();
            match run.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.metrics.listener_failures.inc(&[("reason", "error")]);
                    tracing::warn!(listener = %id, msg = %msg.id(), error = %e, "listener failed");
                }
                Err(_) => {
                    self.metrics.listener_failures.inc(&[("reason", "panic")]);
                    tracing::warn!(listener = %id, msg = %msg.id(), "listener panicked");
                }
            }
        }
    }
}

#[async_trait]
impl FrameSink for Dispatcher {
    async fn on_frame(&self, channel: &str, payload: &str) {
        self.handle_frame(channel, payload).await;
    }
}
