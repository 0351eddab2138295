//! TOML-based node configuration.

use std::path::Path;

use serde::Deserialize;

use airlink_core::constants::MAX_CHANNELS;
use airlink_protocol::files::{FILE_HEADER_LEN, MAX_FILE_DATA, MAX_PATH_LEN};

use crate::error::NodeError;

/// Per-channel queue and block limits.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChannelConfig {
    /// Completed inbound blocks held for the consumer.
    #[serde(default = "default_queue_len")]
    pub rx_queue_len: usize,
    /// Pending outbound blocks.
    #[serde(default = "default_queue_len")]
    pub tx_queue_len: usize,
    /// Largest block accepted for transmit and reassembly.
    #[serde(default = "default_small_block")]
    pub max_block_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            rx_queue_len: default_queue_len(),
            tx_queue_len: default_queue_len(),
            max_block_size: default_small_block(),
        }
    }
}

fn default_queue_len() -> usize {
    5
}

fn default_small_block() -> usize {
    512
}

/// The files channel must fit a full header + path + data frame.
fn default_files_channel() -> ChannelConfig {
    ChannelConfig {
        max_block_size: FILE_HEADER_LEN + MAX_PATH_LEN + MAX_FILE_DATA,
        ..ChannelConfig::default()
    }
}

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub channels: ChannelsSection,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }
}

/// The `[engine]` section.
#[derive(Debug, Deserialize)]
pub struct EngineSection {
    /// Depth of the inbound frame queue between the link and the engine.
    #[serde(default = "default_event_queue_len")]
    pub event_queue_len: usize,
}

fn default_event_queue_len() -> usize {
    30
}

impl Default for EngineSection {
    fn default() -> Self {
        EngineSection {
            event_queue_len: default_event_queue_len(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            level: default_log_level(),
        }
    }
}

/// The `[channels]` section: one entry per fixed channel.
#[derive(Debug, Deserialize)]
pub struct ChannelsSection {
    #[serde(default)]
    pub system: ChannelConfig,
    #[serde(default)]
    pub sensors: ChannelConfig,
    #[serde(default)]
    pub params: ChannelConfig,
    #[serde(default = "default_files_channel")]
    pub files: ChannelConfig,
}

impl Default for ChannelsSection {
    fn default() -> Self {
        ChannelsSection {
            system: ChannelConfig::default(),
            sensors: ChannelConfig::default(),
            params: ChannelConfig::default(),
            files: default_files_channel(),
        }
    }
}

impl ChannelsSection {
    /// The fixed channel-index order: system, sensors, params, files.
    pub fn as_array(&self) -> [ChannelConfig; MAX_CHANNELS] {
        [self.system, self.sensors, self.params, self.files]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gets_defaults() {
        let config = NodeConfig::parse("").unwrap();
        assert_eq!(config.engine.event_queue_len, 30);
        assert_eq!(config.logging.level, "info");
        let channels = config.channels.as_array();
        assert_eq!(channels[0].rx_queue_len, 5);
        assert_eq!(channels[0].max_block_size, 512);
        assert_eq!(channels[3].max_block_size, 16 + 128 + 4096);
    }

    #[test]
    fn partial_channel_override() {
        let config = NodeConfig::parse(
            r#"
            [channels.params]
            max_block_size = 8192

            [engine]
            event_queue_len = 64
            "#,
        )
        .unwrap();
        let channels = config.channels.as_array();
        assert_eq!(channels[2].max_block_size, 8192);
        assert_eq!(channels[2].rx_queue_len, 5);
        assert_eq!(config.engine.event_queue_len, 64);
        // Untouched sections keep their defaults.
        assert_eq!(channels[3].max_block_size, 16 + 128 + 4096);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = NodeConfig::parse("not = [valid").unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
