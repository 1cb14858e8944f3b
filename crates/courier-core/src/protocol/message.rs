//! Message frame (JSON) wrapping a data envelope.
//!
//! ```text
//! {"uuid":"<uuid>","timeSent":"<ISO-8601>","sender":"<id>","data":"<json>","isReply":false}
//! ```
//!
//! `replyUUID` is present iff `isReply` is true. The channel is never carried in
//! the frame; the receiving side takes it from the transport.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CourierError, Result};
use crate::protocol::data::TypedEnvelope;

/// Data envelope plus identity, timing and reply-correlation metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageEnvelope {
    sender: String,
    channel: String,
    payload: TypedEnvelope,
    sent_at: DateTime<Utc>,
    id: Uuid,
    received_at: Option<DateTime<Utc>>,
    reply_to: Option<Uuid>,
}

impl MessageEnvelope {
    /// New outbound message with a fresh id, stamped now.
    pub fn new(
        sender: impl Into<String>,
        channel: impl Into<String>,
        payload: TypedEnvelope,
    ) -> Self {
        Self {
            sender: sender.into(),
            channel: channel.into(),
            payload,
            sent_at: Utc::now(),
            id: Uuid::new_v4(),
            received_at: None,
            reply_to: None,
        }
    }

    /// Reply to `request` from `sender`, addressed to the requester's
    /// identity channel and correlated by the request id.
    pub fn reply_for(
        request: &MessageEnvelope,
        sender: impl Into<String>,
        payload: TypedEnvelope,
    ) -> Self {
        Self {
            reply_to: Some(request.id),
            ..Self::new(sender, request.sender.as_str(), payload)
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn payload(&self) -> &TypedEnvelope {
        &self.payload
    }

    pub fn into_payload(self) -> TypedEnvelope {
        self.payload
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Set only on messages decoded from a frame.
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Request id this message answers, if it is a reply.
    pub fn reply_to(&self) -> Option<Uuid> {
        self.reply_to
    }

    /// Encode to the wire frame.
    pub fn to_frame(&self) -> Result<String> {
        let frame = WireFrame {
            uuid: self.id,
            time_sent: self.sent_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            sender: self.sender.clone(),
            data: self.payload.to_json()?,
            is_reply: self.is_reply(),
            reply_uuid: self.reply_to,
        };
        serde_json::to_string(&frame)
            .map_err(|e| CourierError::codec_with("encode message frame", e))
    }

    /// Decode a frame delivered on `channel`, stamping `received_at`.
    pub fn from_frame(channel: &str, frame: &str) -> Result<Self> {
        let wire: WireFrame = serde_json::from_str(frame)
            .map_err(|e| CourierError::codec_with("invalid message frame json", e))?;

        let sent_at = DateTime::parse_from_rfc3339(&wire.time_sent)
            .map_err(|e| CourierError::codec_with("invalid timeSent", e))?
            .with_timezone(&Utc);

        let reply_to = match (wire.is_reply, wire.reply_uuid) {
            (true, Some(target)) => Some(target),
            (true, None) => return Err(CourierError::codec("isReply set but replyUUID missing")),
            (false, _) => None,
        };

        let payload = TypedEnvelope::from_json(&wire.data)?;

        Ok(Self {
            sender: wire.sender,
            channel: channel.to_owned(),
            payload,
            sent_at,
            id: wire.uuid,
            received_at: Some(Utc::now()),
            reply_to,
        })
    }
}

impl fmt::Display for MessageEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MessageEnvelope[sender={}, channel={}, id={}, data={}, fields={}",
            self.sender,
            self.channel,
            self.id,
            self.payload.id(),
            self.payload.len()
        )?;
        if let Some(target) = self.reply_to {
            write!(f, ", reply_to={target}")?;
        }
        f.write_str("]")
    }
}

#[derive(Serialize, Deserialize)]
struct WireFrame {
    uuid: Uuid,
    #[serde(rename = "timeSent")]
    time_sent: String,
    sender: String,
    data: String,
    #[serde(rename = "isReply")]
    is_reply: bool,
    #[serde(rename = "replyUUID", default, skip_serializing_if = "Option::is_none")]
    reply_uuid: Option<Uuid>,
}
