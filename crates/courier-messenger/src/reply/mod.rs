//! Reply correlation: pending table, deadline scheduling and the caller-facing
//! handle.

pub mod correlation;
pub mod handle;
pub mod scheduler;

pub use correlation::{PendingReplies, ReplyCallback};
pub use handle::ReplyHandle;
pub use scheduler::{Scheduler, TimeoutTask};
