//! Application configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where projects are created by default.
    pub projects_dir: PathBuf,

    /// Export encoding defaults.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Font lookup.
    #[serde(default)]
    pub fonts: FontConfig,

    /// External speech-recognition command.
    #[serde(default)]
    pub transcription: TranscriptionSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Capture frame rate.
    pub fps: u32,

    /// Bitrate cap for the captured stream, in kbps.
    pub video_bitrate_kbps: u32,

    /// x264 constant rate factor for the final container.
    pub crf: u32,

    /// x264 preset for the final container.
    pub preset: String,

    /// AAC bitrate for the original audio track, in kbps.
    pub audio_bitrate_kbps: u32,

    /// Pace capture at playback speed (export wall time equals clip duration).
    pub realtime: bool,
}

/// Where to find caption fonts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Directories scanned for `.ttf` / `.otf` files.
    pub dirs: Vec<PathBuf>,

    /// Explicit family name -> font file overrides.
    pub files: BTreeMap<String, PathBuf>,
}

/// External ASR command. The command reads mono 16 kHz f32le PCM on stdin
/// and prints the transcription JSON on stdout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub command: Option<String>,
    pub args: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reelcap=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            projects_dir: dirs_default_projects(),
            export: ExportDefaults::default(),
            fonts: FontConfig::default(),
            transcription: TranscriptionSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            video_bitrate_kbps: 6000,
            crf: 28,
            preset: "ultrafast".to_string(),
            audio_bitrate_kbps: 128,
            realtime: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl FontConfig {
    /// Configured directories followed by the usual system font locations.
    pub fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = self.dirs.clone();
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(&home).join(".local/share/fonts"));
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        dirs
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("reelcap").join("config.json")
}

/// Default projects directory.
fn dirs_default_projects() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("reelcap").join("projects")
}
