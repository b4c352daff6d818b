//! Voice-activity gate
//!
//! Stateless per-frame decision from the mean of a byte spectrum snapshot.

use std::fmt;

use crate::{Error, Result};

/// Default threshold for [`GatePolicy::MeanEnergy`] on the 0–255 scale
pub const DEFAULT_MEAN_THRESHOLD: f32 = 5.0;

/// Default threshold for [`GatePolicy::Decibel`], relative to full scale 255
pub const DEFAULT_DECIBEL_THRESHOLD: f32 = -45.0;

/// How a spectrum snapshot is scored
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GatePolicy {
    /// Forward every frame
    Off,
    /// Voice when the mean bucket value exceeds `threshold`
    MeanEnergy { threshold: f32 },
    /// Voice when `20·log10(mean / 255)` exceeds `threshold_db`
    Decibel { threshold_db: f32 },
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::MeanEnergy {
            threshold: DEFAULT_MEAN_THRESHOLD,
        }
    }
}

impl GatePolicy {
    /// Build a policy from its name (`off`, `mean`, `decibel`) and optional threshold
    ///
    /// # Errors
    ///
    /// Returns error if the name is unknown
    pub fn from_parts(name: &str, threshold: Option<f32>) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "mean" | "mean_energy" | "average" => Ok(Self::MeanEnergy {
                threshold: threshold.unwrap_or(DEFAULT_MEAN_THRESHOLD),
            }),
            "decibel" | "db" => Ok(Self::Decibel {
                threshold_db: threshold.unwrap_or(DEFAULT_DECIBEL_THRESHOLD),
            }),
            other => Err(Error::Config(format!("unknown gate policy: {other}"))),
        }
    }

    /// Same policy kind with a different threshold
    #[must_use]
    pub const fn with_threshold(self, value: f32) -> Self {
        match self {
            Self::Off => Self::Off,
            Self::MeanEnergy { .. } => Self::MeanEnergy { threshold: value },
            Self::Decibel { .. } => Self::Decibel {
                threshold_db: value,
            },
        }
    }
}

impl fmt::Display for GatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::MeanEnergy { threshold } => write!(f, "mean > {threshold}"),
            Self::Decibel { threshold_db } => write!(f, "level > {threshold_db} dB"),
        }
    }
}

/// Classifies a frame as speech or silence from its frequency-energy profile
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceActivityGate {
    policy: GatePolicy,
}

impl VoiceActivityGate {
    /// Create a gate with the given policy
    #[must_use]
    pub const fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    /// The active policy
    #[must_use]
    pub const fn policy(&self) -> GatePolicy {
        self.policy
    }

    /// Whether a spectrum snapshot counts as voice
    #[must_use]
    pub fn is_voice(&self, spectrum: &[u8]) -> bool {
        match self.policy {
            GatePolicy::Off => true,
            GatePolicy::MeanEnergy { threshold } => mean_energy(spectrum) > threshold,
            GatePolicy::Decibel { threshold_db } => level_db(spectrum) > threshold_db,
        }
    }
}

/// Mean bucket value, 0 for an empty spectrum
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_energy(spectrum: &[u8]) -> f32 {
    if spectrum.is_empty() {
        return 0.0;
    }

    let sum: u64 = spectrum.iter().map(|&b| u64::from(b)).sum();
    sum as f32 / spectrum.len() as f32
}

/// Mean bucket value in decibels relative to 255
#[must_use]
pub fn level_db(spectrum: &[u8]) -> f32 {
    let mean = mean_energy(spectrum);
    if mean <= 0.0 {
        return f32::NEG_INFINITY;
    }
    20.0 * (mean / 255.0).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_zero_is_silence() {
        let silent = [0u8; 256];
        for policy in [
            GatePolicy::default(),
            GatePolicy::Decibel {
                threshold_db: DEFAULT_DECIBEL_THRESHOLD,
            },
            GatePolicy::MeanEnergy { threshold: 0.0 },
        ] {
            assert!(!VoiceActivityGate::new(policy).is_voice(&silent), "{policy}");
        }
    }

    #[test]
    fn test_all_max_is_voice() {
        let loud = [255u8; 256];
        for policy in [
            GatePolicy::default(),
            GatePolicy::Decibel {
                threshold_db: DEFAULT_DECIBEL_THRESHOLD,
            },
            GatePolicy::MeanEnergy { threshold: 254.0 },
        ] {
            assert!(VoiceActivityGate::new(policy).is_voice(&loud), "{policy}");
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let gate = VoiceActivityGate::new(GatePolicy::MeanEnergy { threshold: 5.0 });
        assert!(!gate.is_voice(&[5u8; 16]));
        assert!(gate.is_voice(&[6u8; 16]));
    }

    #[test]
    fn test_off_forwards_everything() {
        let gate = VoiceActivityGate::new(GatePolicy::Off);
        assert!(gate.is_voice(&[]));
        assert!(gate.is_voice(&[0u8; 8]));
    }

    #[test]
    fn test_policy_from_parts() {
        assert_eq!(
            GatePolicy::from_parts("Decibel", Some(-40.0)).unwrap(),
            GatePolicy::Decibel { threshold_db: -40.0 }
        );
        assert_eq!(GatePolicy::from_parts("mean", None).unwrap(), GatePolicy::default());
        assert_eq!(GatePolicy::from_parts("off", Some(3.0)).unwrap(), GatePolicy::Off);
        assert!(GatePolicy::from_parts("loudness", None).is_err());
    }

    #[test]
    fn test_level_db() {
        assert!((level_db(&[255u8; 4])).abs() < f32::EPSILON);
        assert!(level_db(&[0u8; 4]).is_infinite());
    }
}
