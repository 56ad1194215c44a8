//! Codec configuration.
//!
//! Loaded from TOML, for example:
//! ```toml
//! protocol_version = 5
//! max_packet_size = 1048576
//! ```

use config::{File, FileFormat};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::packet::ProtocolVersion;
use crate::varint;

/// Default maximum inbound packet size (1MB).
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 1024 * 1024;

/// Largest frame the remaining length can describe: fixed header byte, four
/// length bytes and the maximum body.
pub const MAX_FRAME_SIZE: u32 = (1 + varint::MAX_LEN + varint::MAX_VALUE) as u32;

/// Codec configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Protocol level: 4 = MQTT 3.1.1, 5 = MQTT 5.0.
    #[serde(default)]
    pub protocol_version: ProtocolVersion,

    /// Maximum inbound packet size in bytes, fixed header included.
    /// 0 = no limit beyond what the remaining length can express.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: u32,
}

fn default_max_packet_size() -> u32 {
    DEFAULT_MAX_PACKET_SIZE
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            protocol_version: ProtocolVersion::default(),
            max_packet_size: default_max_packet_size(),
        }
    }
}

impl CodecConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: CodecConfig = config::Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate().map_err(Error::Config)?;
        Ok(config)
    }

    /// Validate the codec configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_packet_size > MAX_FRAME_SIZE {
            return Err(format!(
                "max_packet_size must be at most {}, got {}",
                MAX_FRAME_SIZE, self.max_packet_size
            ));
        }
        Ok(())
    }
}
