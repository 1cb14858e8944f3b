//! courier demo node.
//!
//! - Loads `courier.yaml` (or the path given as the first argument)
//! - Starts a messenger on an in-process bus
//! - Registers an echo responder on the `echo` channel
//! - Performs one request/reply round trip, then disables

use std::sync::Arc;

use async_trait::async_trait;
use tracing_subscriber::{fmt, EnvFilter};

use courier_core::error::{BoxError, Result};
use courier_core::{MessageEnvelope, TypedEnvelope};
use courier_messenger::{config, Listener, ListenerCtx, MemoryBus, Messenger};

const ECHO_CHANNEL: &str = "echo";

struct EchoResponder;

#[async_trait]
impl Listener for EchoResponder {
    async fn message_received(&self, ctx: &ListenerCtx, msg: &MessageEnvelope) -> Result<()> {
        if msg.channel() != ECHO_CHANNEL {
            return Ok(());
        }
        let mut payload = msg.payload().clone();
        payload.add("echoed_by", ctx.messenger_id());
        ctx.reply(msg, payload).await
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), BoxError> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "courier.yaml".into());
    let cfg = config::load_from_file(&path)?;

    let bus = MemoryBus::new();
    let messenger = Messenger::start(cfg, Arc::new(bus)).await?;
    messenger.add_listener(Arc::new(EchoResponder))?;
    messenger.subscribe(ECHO_CHANNEL).await?;

    let request = TypedEnvelope::new("ping")
        .with("seq", 1_i64)
        .with("note", "hello from courier");

    let reply = messenger
        .send_with_default_reply(ECHO_CHANNEL, request)?
        .get()
        .await?;

    match reply {
        Some(reply) => {
            let echoed_by: String = reply.payload().get("echoed_by")?;
            tracing::info!(%reply, %echoed_by, "round trip complete");
        }
        None => {
            let timeout_ms = messenger.default_timeout().as_millis() as u64;
            tracing::warn!(timeout_ms, "no reply before timeout");
        }
    }

    tracing::debug!(metrics = %messenger.metrics().render(), "final metrics");
    messenger.disable().await;
    Ok(())
}
