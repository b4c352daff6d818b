//! TOML configuration file loading
//!
//! Supports `~/.config/voicelink/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct VoicelinkConfigFile {
    /// Microphone capture configuration
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Connection configuration
    #[serde(default)]
    pub transport: TransportFileConfig,

    /// Speech playback configuration
    #[serde(default)]
    pub playback: PlaybackFileConfig,
}

/// Capture pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Capture sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Input channel count
    pub channels: Option<u16>,

    /// Frame duration in milliseconds
    pub time_slice_ms: Option<u32>,

    /// Gate policy: "mean", "decibel" or "off"
    pub gate: Option<String>,

    /// Gate threshold (0–255 for "mean", dB for "decibel")
    pub gate_threshold: Option<f32>,

    /// Analyser transform size
    pub fft_size: Option<usize>,

    /// Spectrum buckets averaged by the gate
    pub buckets: Option<usize>,

    /// Analyser smoothing constant
    pub smoothing: Option<f32>,
}

/// Transport configuration
#[derive(Debug, Default, Deserialize)]
pub struct TransportFileConfig {
    /// WebSocket base URL; the session id is appended as the last path segment
    pub url: Option<String>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Pause between consecutive chunks in milliseconds
    pub settle_ms: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `VoicelinkConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VoicelinkConfigFile {
    let Some(path) = config_file_path() else {
        return VoicelinkConfigFile::default();
    };

    load_config_file_from(&path)
}

/// Load a TOML config file from an explicit path
///
/// Returns `VoicelinkConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file_from(path: &Path) -> VoicelinkConfigFile {
    if !path.exists() {
        return VoicelinkConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoicelinkConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoicelinkConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voicelink/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voicelink").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[capture]\nsample_rate = 24000\ngate = \"decibel\"\n\n[transport]\nurl = \"wss://voice.example.com/ws\"\n",
        )
        .unwrap();

        let fc = load_config_file_from(&path);
        assert_eq!(fc.capture.sample_rate, Some(24000));
        assert_eq!(fc.capture.gate.as_deref(), Some("decibel"));
        assert_eq!(fc.capture.time_slice_ms, None);
        assert_eq!(fc.transport.url.as_deref(), Some("wss://voice.example.com/ws"));
        assert_eq!(fc.playback.settle_ms, None);
    }

    #[test]
    fn test_missing_or_broken_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_config_file_from(&dir.path().join("nope.toml"));
        assert!(missing.capture.sample_rate.is_none());

        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[capture\nsample_rate = ").unwrap();
        let broken = load_config_file_from(&path);
        assert!(broken.transport.url.is_none());
    }
}
