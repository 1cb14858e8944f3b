//! courier core: typed data envelopes, message frames and the shared error type.
//!
//! This crate defines the wire-level contracts shared by the messenger and any
//! peer speaking the same JSON frames. It carries no transport or runtime
//! dependencies so it can be reused wherever frames are produced or consumed.
//!
//! # Panic policy
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed frames surface as `CourierError::Codec` so a delivery task never
//! dies on bad traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{CourierError, ErrorCode, Result};
pub use protocol::data::{JsonCodec, ObjectCodec, TypeTag, TypedEnvelope, TypedValue};
pub use protocol::message::MessageEnvelope;
