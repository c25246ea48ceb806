use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::net::MAX_REDUNDANT_BYTES;

pub const DEFAULT_SETTINGS_PATH: &str = "settings.toml";
pub const DEFAULT_PORT: u16 = 9500;
pub const CHANNELS: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub headless: bool,
    pub width: u16,
    pub height: u16,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            headless: false,
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub framerate_limit: u32,
    pub vsync: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            framerate_limit: 60,
            vsync: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub transport: String,
    pub ip: String,
    pub port: u16,
    pub channels: u8,
    pub send_rate: u32,
    pub redundant_bytes: usize,
    /// Outbound loss injected by the adapter, in percent.
    pub simulated_loss: f32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            transport: "udp".to_string(),
            ip: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            channels: CHANNELS,
            send_rate: 15,
            redundant_bytes: 0,
            simulated_loss: 0.0,
        }
    }
}

/// Settings file contents: `[display]`, `[renderer]` and `[network]` tables, every key optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub display: DisplaySettings,
    pub renderer: RendererSettings,
    pub network: NetworkSettings,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    /// Rejects values the session cannot run with and clamps the padding size.
    pub fn validate(mut self) -> Result<Self, SettingsError> {
        if self.network.send_rate == 0 {
            return Err(SettingsError::Invalid("network.send_rate must be above 0".into()));
        }
        if self.renderer.framerate_limit == 0 {
            return Err(SettingsError::Invalid(
                "renderer.framerate_limit must be above 0".into(),
            ));
        }
        if self.network.channels != CHANNELS {
            return Err(SettingsError::Invalid(format!(
                "network.channels must be {CHANNELS}, got {}",
                self.network.channels
            )));
        }
        if !(0.0..=100.0).contains(&self.network.simulated_loss) {
            return Err(SettingsError::Invalid(
                "network.simulated_loss must be within 0-100".into(),
            ));
        }

        if self.network.redundant_bytes > MAX_REDUNDANT_BYTES {
            log::warn!(
                "network.redundant_bytes {} clamped to {}",
                self.network.redundant_bytes,
                MAX_REDUNDANT_BYTES
            );
            self.network.redundant_bytes = MAX_REDUNDANT_BYTES;
        }

        Ok(self)
    }
}

impl std::str::FromStr for Settings {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let settings: Settings = toml::from_str(s)?;
        settings.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let settings: Settings = "".parse().unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.network.channels, 2);
    }

    #[test]
    fn reads_all_tables() {
        let settings: Settings = r#"
            [display]
            headless = true
            width = 1280
            height = 720

            [renderer]
            framerate_limit = 144
            vsync = true

            [network]
            transport = "udp"
            ip = "10.0.0.2"
            port = 7000
            channels = 2
            send_rate = 20
            redundant_bytes = 64
        "#
        .parse()
        .unwrap();

        assert!(settings.display.headless);
        assert_eq!((settings.display.width, settings.display.height), (1280, 720));
        assert_eq!(settings.renderer.framerate_limit, 144);
        assert!(settings.renderer.vsync);
        assert_eq!(settings.network.ip, "10.0.0.2");
        assert_eq!(settings.network.port, 7000);
        assert_eq!(settings.network.send_rate, 20);
        assert_eq!(settings.network.redundant_bytes, 64);
    }

    #[test]
    fn rejects_zero_send_rate() {
        let result = "[network]\nsend_rate = 0".parse::<Settings>();
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn rejects_other_channel_counts() {
        let result = "[network]\nchannels = 3".parse::<Settings>();
        assert!(matches!(result, Err(SettingsError::Invalid(_))));
    }

    #[test]
    fn clamps_redundant_bytes() {
        let settings: Settings = "[network]\nredundant_bytes = 99999999".parse().unwrap();
        assert_eq!(settings.network.redundant_bytes, MAX_REDUNDANT_BYTES);
    }

    #[test]
    fn padding_above_one_datagram_is_clamped() {
        let settings: Settings = "[network]\nredundant_bytes = 100000".parse().unwrap();
        assert_eq!(settings.network.redundant_bytes, MAX_REDUNDANT_BYTES);
        assert!(settings.network.redundant_bytes < crate::net::udp::MAX_PAYLOAD_SIZE);

        let settings: Settings = "[network]\nredundant_bytes = 60000".parse().unwrap();
        assert_eq!(settings.network.redundant_bytes, 60000);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let result = "[network\nport = 1".parse::<Settings>();
        assert!(matches!(result, Err(SettingsError::Parse(_))));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = Settings::load("/nonexistent/settings.toml");
        assert!(matches!(result, Err(SettingsError::Read { .. })));
    }
}
