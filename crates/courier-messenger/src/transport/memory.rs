//! In-process bus.
//!
//! Channel membership is kept in two indexes (`channel -> connections` and
//! `connection -> channels`) so closing a connection can clean up without a
//! full scan. Each sink-backed connection owns one unbounded FIFO queue and one
//! delivery task, which gives per-subscriber ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use courier_core::error::{CourierError, Result};

use super::{Connection, Connector, FrameSink};

struct Delivery {
    channel: String,
    payload: String,
}

type Inbox = mpsc::UnboundedSender<Delivery>;

#[derive(Default)]
struct BusInner {
    channels: DashMap<String, HashMap<u64, Inbox>>,
    memberships: DashMap<u64, DashSet<String>>,
    claimed: DashSet<String>,
    seq: AtomicU64,
}

impl BusInner {
    fn join(&self, conn_id: u64, channel: &str, inbox: Inbox) {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .insert(conn_id, inbox);
        self.memberships
            .entry(conn_id)
            .or_insert_with(DashSet::new)
            .insert(channel.to_string());
    }

    fn leave(&self, conn_id: u64, channel: &str) {
        if let Some(mut subs) = self.channels.get_mut(channel) {
            subs.remove(&conn_id);
            if subs.is_empty() {
                drop(subs);
                self.channels.remove_if(channel, |_, subs| subs.is_empty());
            }
        }
        if let Some(set) = self.memberships.get(&conn_id) {
            set.remove(channel);
        }
    }

    fn cleanup(&self, conn_id: u64) {
        if let Some((_, channels)) = self.memberships.remove(&conn_id) {
            for ch in channels.iter() {
                if let Some(mut subs) = self.channels.get_mut(ch.key()) {
                    subs.remove(&conn_id);
                    if subs.is_empty() {
                        drop(subs);
                        self.channels.remove_if(ch.key(), |_, subs| subs.is_empty());
                    }
                }
            }
        }
    }

    fn inboxes(&self, channel: &str) -> Vec<Inbox> {
        self.channels
            .get(channel)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Cloneable handle to one in-process bus. Clones share channels and claims.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections subscribed to `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_claimed(&self, process_id: &str) -> bool {
        self.inner.claimed.contains(process_id)
    }
}

#[async_trait]
impl Connector for MemoryBus {
    async fn connect(
        &self,
        client_name: &str,
        sink: Option<Arc<dyn FrameSink>>,
    ) -> Result<Arc<dyn Connection>> {
        let id = self.inner.seq.fetch_add(1, Ordering::Relaxed);

        let inbox = sink.map(|sink| {
            let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
            tokio::spawn(async move {
                while let Some(d) = rx.recv().await {
                    sink.on_frame(&d.channel, &d.payload).await;
                }
            });
            tx
        });

        tracing::debug!(
            conn = id,
            name = %client_name,
            sink = inbox.is_some(),
            "memory connection opened"
        );

        Ok(Arc::new(MemoryConnection {
            id,
            name: client_name.to_string(),
            bus: Arc::clone(&self.inner),
            open: AtomicBool::new(true),
            inbox: Mutex::new(inbox),
        }))
    }

    fn claim(&self, process_id: &str) -> bool {
        self.inner.claimed.insert(process_id.to_string())
    }

    fn release(&self, process_id: &str) {
        self.inner.claimed.remove(process_id);
    }
}

struct MemoryConnection {
    id: u64,
    name: String,
    bus: Arc<BusInner>,
    open: AtomicBool,
    // Taken on close so the delivery task ends once its queue is drained.
    inbox: Mutex<Option<Inbox>>,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CourierError::NotOpen)
        }
    }

    fn shutdown(&self) -> bool {
        if !self.open.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.bus.cleanup(self.id);
        self.inbox.lock().take();
        true
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        self.ensure_open()?;

        let mut delivered = 0;
        for inbox in self.bus.inboxes(channel) {
            let d = Delivery {
                channel: channel.to_string(),
                payload: payload.to_string(),
            };
            // A closed receiver just means that subscriber went away.
            if inbox.send(d).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> Result<()> {
        self.ensure_open()?;
        let inbox = self.inbox.lock().clone().ok_or_else(|| {
            CourierError::Transport(format!("connection {} has no delivery sink", self.name))
        })?;
        self.bus.join(self.id, channel, inbox);
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.ensure_open()?;
        self.bus.leave(self.id, channel);
        Ok(())
    }

    async fn close(&self) {
        if self.shutdown() {
            tracing::debug!(conn = self.id, name = %self.name, "memory connection closed");
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.shutdown();
    }
}
