use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub url: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_quality")]
    pub quality: u32,
    #[serde(default = "default_poll_fps")]
    pub poll_fps: f64,
    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,
    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_sensitivity")]
    pub sensitivity: u32,
    #[serde(default = "default_min_pixels")]
    pub min_pixels: u32,
    #[serde(default)]
    pub sound_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_player")]
    pub player: String,
    #[serde(default = "default_sound_file")]
    pub sound_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sensitivity: default_sensitivity(),
            min_pixels: default_min_pixels(),
            sound_enabled: false,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            player: default_player(),
            sound_file: default_sound_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

// Default value functions
fn default_mode() -> String {
    "mjpeg".into()
}
fn default_quality() -> u32 {
    80
}
fn default_poll_fps() -> f64 {
    10.0
}
fn default_ideal_width() -> u32 {
    640
}
fn default_ideal_height() -> u32 {
    480
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_sensitivity() -> u32 {
    50
}
fn default_min_pixels() -> u32 {
    1000
}
fn default_player() -> String {
    "aplay".into()
}
fn default_sound_file() -> String {
    "/usr/share/sounds/alsa/Front_Center.wav".into()
}
fn default_log_level() -> String {
    "info".into()
}
