//! Transport layer (publish/subscribe).
//!
//! The messenger talks to the bus only through these traits. A connector hands
//! out named connections; a connection built with a sink receives every frame
//! published on the channels it subscribes, in publish order.

pub mod memory;
pub mod outbound;

use std::sync::Arc;

use async_trait::async_trait;

use courier_core::error::Result;

pub use memory::MemoryBus;
pub use outbound::Outbound;

/// Push delivery target for inbound frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn on_frame(&self, channel: &str, payload: &str);
}

/// One logical connection to the bus.
#[async_trait]
pub trait Connection: Send + Sync {
    fn name(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Publish `payload` on `channel`. Returns the number of receivers.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize>;

    async fn subscribe(&self, channel: &str) -> Result<()>;

    async fn unsubscribe(&self, channel: &str) -> Result<()>;

    /// Idempotent. Frames already queued for the sink are still delivered.
    async fn close(&self);
}

/// Factory for connections plus the registry of active process ids.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection named `client_name`. Without a sink the connection
    /// can only publish.
    async fn connect(
        &self,
        client_name: &str,
        sink: Option<Arc<dyn FrameSink>>,
    ) -> Result<Arc<dyn Connection>>;

    /// Mark `process_id` as active. Returns false if it already is.
    fn claim(&self, process_id: &str) -> bool;

    fn release(&self, process_id: &str);
}
