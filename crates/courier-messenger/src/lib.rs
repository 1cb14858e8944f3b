//! courier messenger library entry.
//!
//! This crate wires the transport, dispatcher and reply correlation engine
//! into a request/reply layer over publish/subscribe. It is intended to be
//! consumed by the binary (`main.rs`) and by integration tests.
//!
//! ```text
//! send_with_reply ──► PendingReplies::register ──► Outbound::publish ──► bus
//!                                                                         │
//! Dispatcher::handle_frame <── FrameSink::on_frame <──────────────────────┘
//!          │ (isReply) ──► PendingReplies::resolve ──► waiter
//!          └──► fan-out queue ──► listeners (own task)
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod dispatch;
pub mod messenger;
pub mod obs;
pub mod reply;
pub mod transport;

pub use config::{MessengerConfig, MessengerSection};
pub use dispatch::{Listener, ListenerCtx, ListenerId};
pub use messenger::Messenger;
pub use reply::{ReplyHandle, Scheduler, TimeoutTask};
pub use transport::{Connection, Connector, FrameSink, MemoryBus};
