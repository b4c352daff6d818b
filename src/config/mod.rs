//! Configuration management for voicelink
//!
//! Values resolve as CLI override > environment > TOML file > default.

pub mod file;

use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::voice::{DEFAULT_BUCKETS, DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING, GatePolicy, frame_size};
use crate::{Error, Result};

use self::file::VoicelinkConfigFile;

/// Default capture sample rate (16kHz for speech)
pub const DEFAULT_SAMPLE_RATE: u32 = 16000;

/// Default frame duration (100ms)
pub const DEFAULT_TIME_SLICE_MS: u32 = 100;

/// Default voice service endpoint
pub const DEFAULT_URL: &str = "ws://localhost:8000/ws/audio";

/// Default pause between consecutive playback chunks
pub const DEFAULT_SETTLE_MS: u64 = 50;

/// voicelink configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Microphone capture configuration
    pub capture: CaptureConfig,

    /// Connection configuration
    pub transport: TransportConfig,

    /// Speech playback configuration
    pub playback: PlaybackConfig,
}

/// Capture pipeline configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count requested from the device (frames are always mono)
    pub channels: u16,

    /// Frame duration in milliseconds
    pub time_slice_ms: u32,

    /// Voice-activity gate policy
    pub gate: GatePolicy,

    /// Analyser transform size
    pub fft_size: usize,

    /// Spectrum buckets averaged by the gate (lowest bins of the transform)
    pub buckets: usize,

    /// Analyser smoothing constant
    pub smoothing: f32,

    /// Input processing requested from the host
    pub constraints: MicrophoneConstraints,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            time_slice_ms: DEFAULT_TIME_SLICE_MS,
            gate: GatePolicy::default(),
            fft_size: DEFAULT_FFT_SIZE,
            buckets: DEFAULT_BUCKETS,
            smoothing: DEFAULT_SMOOTHING,
            constraints: MicrophoneConstraints::default(),
        }
    }
}

impl CaptureConfig {
    /// Samples per frame
    ///
    /// # Errors
    ///
    /// Returns error if the frame would be empty
    pub fn frame_size(&self) -> Result<usize> {
        frame_size(self.time_slice_ms, self.sample_rate)
    }

    /// Check the values are usable
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::Config("sample rate must be positive".to_string()));
        }
        if self.channels == 0 {
            return Err(Error::Config("channel count must be positive".to_string()));
        }
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "fft size must be a power of two >= 32, got {}",
                self.fft_size
            )));
        }
        if self.buckets == 0 || self.buckets > self.fft_size / 2 {
            return Err(Error::Config(format!(
                "buckets must be within 1..={}, got {}",
                self.fft_size / 2,
                self.buckets
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(Error::Config(format!(
                "smoothing must be within [0, 1], got {}",
                self.smoothing
            )));
        }
        self.frame_size().map(|_| ())
    }
}

/// Input processing requested when opening the microphone
///
/// Fixed policy: all enabled. Applied by the host audio stack where supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MicrophoneConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for MicrophoneConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base WebSocket URL
    pub url: String,

    /// Per-session identifier appended to the URL
    pub session_id: Uuid,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            session_id: Uuid::new_v4(),
        }
    }
}

impl TransportConfig {
    /// Full endpoint: `<url>/<session_id>`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or not `ws`/`wss`
    pub fn endpoint(&self) -> Result<Url> {
        let joined = format!("{}/{}", self.url.trim_end_matches('/'), self.session_id);
        let url = Url::parse(&joined)
            .map_err(|e| Error::Config(format!("invalid url {}: {e}", self.url)))?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(Error::Config(format!(
                "unsupported url scheme {other}, expected ws or wss"
            ))),
        }
    }
}

/// Playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Pause after each chunk before the next one starts
    pub settle_delay: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub sample_rate: Option<u32>,
    pub time_slice_ms: Option<u32>,
    pub gate: Option<String>,
    pub gate_threshold: Option<f32>,
}

impl Config {
    /// Load configuration from the standard file, environment and overrides
    ///
    /// # Errors
    ///
    /// Returns error if any resolved value is invalid
    pub fn load(overrides: &Overrides) -> Result<Self> {
        Self::resolve(file::load_config_file(), overrides)
    }

    /// Resolve configuration from an already-loaded file
    ///
    /// # Errors
    ///
    /// Returns error if any resolved value is invalid
    pub fn resolve(fc: VoicelinkConfigFile, overrides: &Overrides) -> Result<Self> {
        let gate_name = overrides
            .gate
            .clone()
            .or_else(|| env_var("VOICELINK_GATE"))
            .or(fc.capture.gate);
        let gate_threshold = overrides
            .gate_threshold
            .or(env_parse("VOICELINK_GATE_THRESHOLD")?)
            .or(fc.capture.gate_threshold);

        let gate = match (gate_name, gate_threshold) {
            (Some(name), threshold) => GatePolicy::from_parts(&name, threshold)?,
            (None, Some(threshold)) => GatePolicy::default().with_threshold(threshold),
            (None, None) => GatePolicy::default(),
        };

        let capture = CaptureConfig {
            sample_rate: overrides
                .sample_rate
                .or(env_parse("VOICELINK_SAMPLE_RATE")?)
                .or(fc.capture.sample_rate)
                .unwrap_or(DEFAULT_SAMPLE_RATE),
            channels: fc.capture.channels.unwrap_or(1),
            time_slice_ms: overrides
                .time_slice_ms
                .or(env_parse("VOICELINK_TIME_SLICE_MS")?)
                .or(fc.capture.time_slice_ms)
                .unwrap_or(DEFAULT_TIME_SLICE_MS),
            gate,
            fft_size: fc.capture.fft_size.unwrap_or(DEFAULT_FFT_SIZE),
            buckets: fc.capture.buckets.unwrap_or(DEFAULT_BUCKETS),
            smoothing: fc.capture.smoothing.unwrap_or(DEFAULT_SMOOTHING),
            constraints: MicrophoneConstraints::default(),
        };
        capture.validate()?;

        let transport = TransportConfig {
            url: overrides
                .url
                .clone()
                .or_else(|| env_var("VOICELINK_URL"))
                .or(fc.transport.url)
                .unwrap_or_else(|| DEFAULT_URL.to_string()),
            session_id: Uuid::new_v4(),
        };
        transport.endpoint()?;

        let playback = PlaybackConfig {
            settle_delay: Duration::from_millis(
                env_parse("VOICELINK_SETTLE_MS")?
                    .or(fc.playback.settle_ms)
                    .unwrap_or(DEFAULT_SETTLE_MS),
            ),
        };

        Ok(Self {
            capture,
            transport,
            playback,
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    env_var(key)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| Error::Config(format!("invalid value for {key}: {v}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::file::{CaptureFileConfig, PlaybackFileConfig, TransportFileConfig};
    use super::*;

    #[test]
    fn test_defaults() {
        let config =
            Config::resolve(VoicelinkConfigFile::default(), &Overrides::default()).unwrap();

        assert_eq!(config.capture.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(config.capture.frame_size().unwrap(), 1600);
        assert_eq!(config.capture.gate, GatePolicy::default());
        assert!(config.capture.constraints.echo_cancellation);
        assert_eq!(config.playback.settle_delay, Duration::from_millis(50));
    }

    #[test]
    fn test_overrides_beat_file() {
        let fc = VoicelinkConfigFile {
            capture: CaptureFileConfig {
                sample_rate: Some(48000),
                time_slice_ms: Some(250),
                gate: Some("decibel".to_string()),
                ..CaptureFileConfig::default()
            },
            transport: TransportFileConfig {
                url: Some("ws://file.example/ws".to_string()),
            },
            playback: PlaybackFileConfig { settle_ms: Some(0) },
        };
        let overrides = Overrides {
            url: Some("wss://cli.example/ws/".to_string()),
            sample_rate: Some(8000),
            gate_threshold: Some(-30.0),
            ..Overrides::default()
        };

        let config = Config::resolve(fc, &overrides).unwrap();
        assert_eq!(config.capture.sample_rate, 8000);
        assert_eq!(config.capture.frame_size().unwrap(), 2000);
        assert_eq!(config.capture.gate, GatePolicy::Decibel { threshold_db: -30.0 });
        assert_eq!(config.playback.settle_delay, Duration::ZERO);

        let endpoint = config.transport.endpoint().unwrap();
        assert_eq!(endpoint.scheme(), "wss");
        assert_eq!(
            endpoint.path(),
            format!("/ws/{}", config.transport.session_id)
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_url = Overrides {
            url: Some("http://example.com".to_string()),
            ..Overrides::default()
        };
        assert!(Config::resolve(VoicelinkConfigFile::default(), &bad_url).is_err());

        let empty_frame = Overrides {
            time_slice_ms: Some(0),
            ..Overrides::default()
        };
        assert!(Config::resolve(VoicelinkConfigFile::default(), &empty_frame).is_err());

        let capture = CaptureConfig {
            fft_size: 1000,
            ..CaptureConfig::default()
        };
        assert!(capture.validate().is_err());

        // More buckets than the transform produces
        let capture = CaptureConfig {
            fft_size: 256,
            ..CaptureConfig::default()
        };
        assert!(capture.validate().is_err());

        let capture = CaptureConfig {
            buckets: 0,
            ..CaptureConfig::default()
        };
        assert!(capture.validate().is_err());
    }
}
