//! 16-bit PCM frames
//!
//! Float samples in `[-1, 1]` are clamped, then scaled by 32768 when negative
//! and 32767 otherwise, truncating toward zero.

use crate::{Error, Result};

/// Number of samples in one frame: `floor(time_slice_ms * sample_rate / 1000)`
///
/// # Errors
///
/// Returns error if the resulting frame would be empty
pub fn frame_size(time_slice_ms: u32, sample_rate: u32) -> Result<usize> {
    let size = u64::from(time_slice_ms) * u64::from(sample_rate) / 1000;
    if size == 0 {
        return Err(Error::Config(format!(
            "time slice {time_slice_ms}ms at {sample_rate}Hz yields an empty frame"
        )));
    }

    usize::try_from(size).map_err(|_| Error::Config(format!("frame size {size} too large")))
}

/// Convert one float sample to signed 16-bit PCM
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }

    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// A fixed-length block of 16-bit PCM samples, ready to be sent upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Encode float samples into a frame
    #[must_use]
    pub fn from_f32(samples: &[f32]) -> Self {
        Self {
            samples: samples.iter().copied().map(sample_to_i16).collect(),
        }
    }

    /// The PCM samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Raw little-endian bytes, two per sample, no header
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

/// Encode float samples as a mono 16-bit WAV file
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(sample_to_i16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
