//! Protocol modules (typed data + message frame).
//!
//! Two nested JSON formats:
//! - Data envelope: a labelled map of type-tagged fields.
//! - Message frame: identity, timing and reply metadata around a data envelope
//!   that travels string-encoded in the `data` property.
//!
//! All decoders are panic-free: malformed input is reported as `CourierError`
//! instead of panicking.

pub mod data;
pub mod message;
