//! Configuration management for strtc
//!
//! Provides loading, saving and validation of the engine configuration:
//! signaling endpoints and timeouts, ICE servers, the default local stream,
//! render and capture options.

use crate::errors::RtcError;
use crate::types::StreamConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Largest capture width or height accepted.
pub const MAX_DIMENSION: u32 = 8192;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub signaling: SignalingConfig,
    pub ice: IceConfig,
    pub stream: StreamConfig,
    pub render: RenderConfig,
    pub capture: CaptureConfig,
}

/// Signaling HTTP exchange configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// Whole-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Path appended to the relay host for publish channels
    pub publish_path: String,
    /// Path appended to the relay host for subscribe channels
    pub play_path: String,
}

/// ICE configuration handed to the session backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceConfig {
    pub servers: Vec<IceServer>,
}

/// ICE server entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Presentation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Letterbox background as [r, g, b]
    pub fill_color: [u8; 3],
}

/// Capture backend options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Offer a synthetic test-pattern device after the real devices
    pub test_pattern: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signaling: SignalingConfig {
                timeout_ms: 5000,
                connect_timeout_ms: 5000,
                publish_path: "/rtc/v1/publish/".to_string(),
                play_path: "/rtc/v1/play/".to_string(),
            },
            ice: IceConfig {
                servers: vec![IceServer {
                    urls: vec!["stun:stun.l.google.com:19302".to_string()],
                    username: None,
                    credential: None,
                }],
            },
            stream: StreamConfig::default(),
            render: RenderConfig {
                fill_color: [0, 0, 0],
            },
            capture: CaptureConfig {
                test_pattern: false,
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, RtcError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| RtcError::Config(format!("Failed to read config file: {}", e)))?;

        let config: EngineConfig = toml::from_str(&contents)
            .map_err(|e| RtcError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(RtcError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RtcError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                RtcError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RtcError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| RtcError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("strtc.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.signaling.timeout_ms == 0 || self.signaling.connect_timeout_ms == 0 {
            return Err("Signaling timeouts must be positive".to_string());
        }
        for path in [&self.signaling.publish_path, &self.signaling.play_path] {
            if !path.starts_with('/') {
                return Err(format!("Signaling path must start with '/': {:?}", path));
            }
        }

        if self.ice.servers.iter().any(|s| s.urls.is_empty()) {
            return Err("ICE server entry without urls".to_string());
        }

        if self.stream.width == 0 || self.stream.height == 0 {
            return Err("Invalid default resolution".to_string());
        }
        if self.stream.width > MAX_DIMENSION || self.stream.height > MAX_DIMENSION {
            return Err(format!(
                "Default resolution {}x{} exceeds {}",
                self.stream.width, self.stream.height, MAX_DIMENSION
            ));
        }
        if self.stream.fps == 0 || self.stream.fps > 240 {
            return Err("Invalid default FPS (must be 1-240)".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.signaling.timeout_ms, 5000);
        assert_eq!(config.signaling.publish_path, "/rtc/v1/publish/");
        assert_eq!(config.signaling.play_path, "/rtc/v1/play/");
        assert_eq!(config.ice.servers.len(), 1);
        assert_eq!(config.stream, StreamConfig::default());
    }

    #[test]
    fn test_config_validation() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());

        let mut bad_stream = config.clone();
        bad_stream.stream.width = 0;
        assert!(bad_stream.validate().is_err());

        let mut too_wide = EngineConfig::default();
        too_wide.stream.width = MAX_DIMENSION + 1;
        assert!(too_wide.validate().is_err());

        let mut bad_fps = EngineConfig::default();
        bad_fps.stream.fps = 500;
        assert!(bad_fps.validate().is_err());

        let mut bad_path = EngineConfig::default();
        bad_path.signaling.play_path = "rtc/v1/play/".to_string();
        assert!(bad_path.validate().is_err());

        let mut bad_timeout = EngineConfig::default();
        bad_timeout.signaling.timeout_ms = 0;
        assert!(bad_timeout.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("strtc.toml");

        let mut config = EngineConfig::default();
        config.render.fill_color = [16, 32, 48];
        config.capture.test_pattern = true;
        assert!(config.save_to_file(&config_path).is_ok());

        let loaded = EngineConfig::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_toml_format() {
        let config = EngineConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[signaling]"));
        assert!(toml_string.contains("[stream]"));
        assert!(toml_string.contains("[render]"));
        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("publish_path"));
    }

    #[test]
    fn test_load_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("broken.toml");
        fs::write(&config_path, "signaling = 12").unwrap();
        assert!(matches!(
            EngineConfig::load_from_file(&config_path),
            Err(RtcError::Config(_))
        ));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = EngineConfig::load_from_file("nonexistent_file.toml");
        assert!(result.is_ok());
        assert_eq!(result.unwrap().stream.fps, 25);
    }
}
