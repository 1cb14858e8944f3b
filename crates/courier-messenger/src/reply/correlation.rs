//! Pending reply table.
//!
//! ```text
//! register(id) ──► table[id] = callback ──► schedule(expire(id), timeout)
//!
//! resolve(id, env) ─┐
//!                   ├─ remove(id) under lock ─► callback(Some(env)) | callback(None)
//! expire(id) ───────┘      (loser finds nothing and returns)
//! ```
//!
//! Removal is the only terminal event. Whichever path removes the entry owns
//! the callback and invokes it after the lock is released, so the callback runs
//! exactly once.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use courier_core::error::{CourierError, Result};
use courier_core::MessageEnvelope;

use super::scheduler::{Scheduler, TimeoutTask};
use crate::obs::MessengerMetrics;

/// Receives the reply, or `None` on timeout or shutdown.
pub type ReplyCallback = Box<dyn FnOnce(Option<MessageEnvelope>) + Send + 'static>;

struct Pending {
    callback: ReplyCallback,
    registered_at: Instant,
}

pub struct PendingReplies {
    table: Mutex<HashMap<Uuid, Pending>>,
    scheduler: RwLock<Scheduler>,
    metrics: Arc<MessengerMetrics>,
}

impl PendingReplies {
    pub fn new(scheduler: Scheduler, metrics: Arc<MessengerMetrics>) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            scheduler: RwLock::new(scheduler),
            metrics,
        }
    }

    /// Applies to registrations made after the call.
    pub fn set_scheduler(&self, scheduler: Scheduler) {
        *self.scheduler.write() = scheduler;
    }

    /// Insert an entry and arm its deadline.
    pub fn register(
        self: &Arc<Self>,
        request_id: Uuid,
        timeout: Duration,
        callback: ReplyCallback,
    ) -> Result<()> {
        match self.table.lock().entry(request_id) {
            Entry::Occupied(_) => return Err(CourierError::DuplicateCorrelation(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(Pending {
                    callback,
                    registered_at: Instant::now(),
                });
            }
        }
        self.metrics.pending_replies.inc(&[]);

        // The timer must not keep the table alive.
        let weak = Arc::downgrade(self);
        let task = TimeoutTask::new(move || {
            if let Some(table) = weak.upgrade() {
                table.expire(request_id);
            }
        });
        let scheduler = self.scheduler.read().clone();
        scheduler.schedule(task, timeout);
        Ok(())
    }

    /// Deliver a reply. Returns false if nothing was waiting for it.
    pub fn resolve(&self, request_id: Uuid, reply: MessageEnvelope) -> bool {
        let Some(pending) = self.take(request_id) else {
            self.metrics.reply_outcomes.inc(&[("outcome", "unmatched")]);
            tracing::debug!(request = %request_id, "reply matched no pending request");
            return false;
        };
        self.metrics.reply_outcomes.inc(&[("outcome", "resolved")]);
        self.metrics.reply_latency.observe(&[], pending.registered_at.elapsed());
        tracing::debug!(request = %request_id, "reply resolved");
        invoke(request_id, pending.callback, Some(reply));
        true
    }

    /// Deadline path. Returns false if the entry was already gone.
    pub fn expire(&self, request_id: Uuid) -> bool {
        let Some(pending) = self.take(request_id) else {
            return false;
        };
        self.metrics.reply_outcomes.inc(&[("outcome", "timed_out")]);
        tracing::debug!(request = %request_id, "reply timed out");
        invoke(request_id, pending.callback, None);
        true
    }

    /// Remove without invoking the callback.
    pub fn cancel(&self, request_id: Uuid) -> bool {
        if self.take(request_id).is_none() {
            return false;
        }
        self.metrics.reply_outcomes.inc(&[("outcome", "cancelled")]);
        true
    }

    /// Complete every pending entry with `None`. Returns how many there were.
    pub fn drain(&self) -> usize {
        let drained = std::mem::take(&mut *self.table.lock());
        let n = drained.len();
        if n > 0 {
            self.metrics.pending_replies.add(&[], -(n as i64));
            self.metrics.reply_outcomes.add(&[("outcome", "drained")], n as u64);
        }
        for (request_id, pending) in drained {
            invoke(request_id, pending.callback, None);
        }
        n
    }

    pub fn contains(&self, request_id: Uuid) -> bool {
        self.table.lock().contains_key(&request_id)
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, request_id: Uuid) -> Option<Pending> {
        let pending = self.table.lock().remove(&request_id)?;
        self.metrics.pending_replies.dec(&[]);
        Some(pending)
    }
}

fn invoke(request_id: Uuid, callback: ReplyCallback, reply: Option<MessageEnvelope>) {
    if catch_unwind(AssertUnwindSafe(move || callback(reply))).is_err() {
        tracing::warn!(request = %request_id, "reply callback panicked");
    }
}
