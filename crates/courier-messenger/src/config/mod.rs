//! Messenger config loader (strict parsing).

pub mod schema;

use std::fs;

use courier_core::error::{CourierError, Result};

pub use schema::{MessengerConfig, MessengerSection};

pub fn load_from_file(path: &str) -> Result<MessengerConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| CourierError::Config(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MessengerConfig> {
    let cfg: MessengerConfig = serde_yaml::from_str(s)
        .map_err(|e| CourierError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
