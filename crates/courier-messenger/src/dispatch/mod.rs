//! Dispatcher module exports.
//!
//! Re-exports the dispatcher and listener types so downstream consumers can
//! depend on this module directly.

pub mod dispatcher;
pub mod listener;

pub use dispatcher::Dispatcher;
pub use listener::{Listener, ListenerCtx, ListenerId};
