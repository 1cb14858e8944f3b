//! Top-level facade crate for courier.
//!
//! Re-exports core types and the messenger library so users can depend on a single crate.

pub mod core {
    pub use courier_core::*;
}

pub mod messenger {
    pub use courier_messenger::*;
}

pub use courier_core::{CourierError, MessageEnvelope, Result, TypedEnvelope};
pub use courier_messenger::{Listener, ListenerCtx, MemoryBus, Messenger, MessengerConfig};
