use std::time::Duration;

use serde::Deserialize;

use courier_core::error::{CourierError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessengerConfig {
    pub version: u32,

    pub messenger: MessengerSection,
}

impl MessengerConfig {
    /// Defaults for everything but the process id.
    pub fn for_id(id: impl Into<String>) -> Self {
        Self {
            version: 1,
            messenger: MessengerSection::new(id),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(CourierError::UnsupportedVersion);
        }

        self.messenger.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessengerSection {
    /// Process id. Also the identity channel replies are addressed to.
    pub id: String,

    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    #[serde(default = "default_listener_suffix")]
    pub listener_suffix: String,

    #[serde(default = "default_commands_suffix")]
    pub commands_suffix: String,
}

impl MessengerSection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            reply_timeout_ms: default_reply_timeout_ms(),
            listener_suffix: default_listener_suffix(),
            commands_suffix: default_commands_suffix(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(CourierError::Config("messenger.id must not be empty".into()));
        }
        if self.id.chars().any(char::is_whitespace) {
            return Err(CourierError::Config(
                "messenger.id must not contain whitespace".into(),
            ));
        }
        if !(10..=600000).contains(&self.reply_timeout_ms) {
            return Err(CourierError::Config(
                "messenger.reply_timeout_ms must be between 10 and 600000".into(),
            ));
        }
        if self.listener_suffix.is_empty() || self.commands_suffix.is_empty() {
            return Err(CourierError::Config(
                "messenger connection suffixes must not be empty".into(),
            ));
        }
        if self.listener_suffix == self.commands_suffix {
            return Err(CourierError::Config(
                "messenger.listener_suffix and commands_suffix must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    /// Name of the inbound (subscribing) connection.
    pub fn listener_name(&self) -> String {
        format!("{}{}", self.id, self.listener_suffix)
    }

    /// Name of the outbound (publishing) connection.
    pub fn commands_name(&self) -> String {
        format!("{}{}", self.id, self.commands_suffix)
    }
}

fn default_reply_timeout_ms() -> u64 {
    5000
}
fn default_listener_suffix() -> String {
    "-listener".into()
}
fn default_commands_suffix() -> String {
    "-commands".into()
}
