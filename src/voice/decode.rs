//! Decoding of synthesized speech chunks
//!
//! Chunks arrive as WAV or MP3 bytes; both are decoded to mono f32 and
//! resampled to the output rate.

use std::io::Cursor;

use crate::{Error, Result};

/// Decoded mono audio ready for an output device
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Playback duration
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// Container detected from the leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

/// Detect the container of an encoded chunk
#[must_use]
pub fn detect_format(data: &[u8]) -> AudioFormat {
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE" {
        AudioFormat::Wav
    } else {
        AudioFormat::Mp3
    }
}

/// Decode an encoded chunk and resample it to `target_rate`
///
/// # Errors
///
/// Returns error if the bytes hold no decodable audio
pub fn decode_audio(data: &[u8], target_rate: u32) -> Result<DecodedAudio> {
    let format = detect_format(data);
    let decoded = match format {
        AudioFormat::Wav => decode_wav(data)?,
        AudioFormat::Mp3 => decode_mp3(data)?,
    };

    if decoded.samples.is_empty() {
        return Err(Error::Decode(format!("no audio frames in {format:?} chunk")));
    }

    tracing::trace!(
        ?format,
        samples = decoded.samples.len(),
        sample_rate = decoded.sample_rate,
        "decoded audio chunk"
    );

    if decoded.sample_rate == target_rate {
        return Ok(decoded);
    }

    let samples = resample_audio(&decoded.samples, decoded.sample_rate, target_rate)?;
    Ok(DecodedAudio {
        samples,
        sample_rate: target_rate,
    })
}

/// Decode WAV bytes to mono f32 samples
#[allow(clippy::cast_precision_loss)]
fn decode_wav(data: &[u8]) -> Result<DecodedAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(data)).map_err(|e| Error::Decode(e.to_string()))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Decode(e.to_string()))?
        }
    };

    Ok(DecodedAudio {
        samples: to_mono(&interleaved, usize::from(spec.channels)),
        sample_rate: spec.sample_rate,
    })
}

/// Decode MP3 bytes to mono f32 samples
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                let data: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(to_mono(&data, frame.channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Decode(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels into mono
#[allow(clippy::cast_precision_loss)]
fn to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample audio using rubato
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Decode(format!(
            "cannot resample {from_rate}Hz to {to_rate}Hz"
        )));
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Decode(format!("resampler init failed: {e}")))?;

    let expected =
        (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round() as usize;

    let mut output = Vec::with_capacity(expected + chunk_size);

    // Zero-pad the tail so no input is lost, then trim to the expected length
    for chunk in samples.chunks(chunk_size) {
        let mut block: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        block.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Decode(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    // Flush the resampler delay
    let delay = resampler.output_delay();
    let flushed = resampler
        .process(&[vec![0.0; chunk_size]], None)
        .map_err(|e| Error::Decode(format!("resample failed: {e}")))?;
    output.extend(flushed[0].iter().map(|&s| s as f32));

    let start = delay.min(output.len());
    let mut trimmed = output.split_off(start);
    trimmed.truncate(expected);
    Ok(trimmed)
}
