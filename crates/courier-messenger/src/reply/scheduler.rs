//! Deadline scheduling for pending replies.
//!
//! By default deadlines run on the tokio timer. A custom scheduler receives the
//! task and its delay and decides when (or on which thread) to run it, which
//! lets tests and embedders drive timeouts by hand.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

/// Deferred timeout action. Running it after the entry was resolved is a no-op.
pub struct TimeoutTask(Box<dyn FnOnce() + Send + 'static>);

impl TimeoutTask {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for TimeoutTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TimeoutTask")
    }
}

pub type ScheduleFn = dyn Fn(TimeoutTask, Duration) + Send + Sync + 'static;

#[derive(Clone)]
pub enum Scheduler {
    /// Sleep on the given runtime, then run the task.
    Runtime(Handle),
    Custom(Arc<ScheduleFn>),
}

impl Scheduler {
    pub fn custom(f: impl Fn(TimeoutTask, Duration) + Send + Sync + 'static) -> Self {
        Scheduler::Custom(Arc::new(f))
    }

    pub fn schedule(&self, task: TimeoutTask, after: Duration) {
        match self {
            Scheduler::Runtime(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(after).await;
                    task.run();
                });
            }
            Scheduler::Custom(f) => f(task, after),
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheduler::Runtime(_) => f.write_str("Scheduler::Runtime"),
            Scheduler::Custom(_) => f.write_str("Scheduler::Custom"),
        }
    }
}
