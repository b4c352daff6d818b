//! Audio capture from microphone
//!
//! A [`Recorder`] owns an [`AudioInput`] and a [`CapturePipeline`]. The input
//! pushes mono sample blocks into a channel; the pipeline frames them, gates
//! each frame on its spectrum and encodes the retained ones as PCM.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::framer::FrameAccumulator;
use super::gate::VoiceActivityGate;
use super::pcm::AudioFrame;
use super::spectrum::SpectrumAnalyser;
use crate::config::CaptureConfig;
use crate::{Error, Result};

/// Sender half for mono sample blocks
pub type SampleSender = mpsc::UnboundedSender<Vec<f32>>;

/// Receiver half for mono sample blocks
pub type SampleReceiver = mpsc::UnboundedReceiver<Vec<f32>>;

/// A source of microphone samples
pub trait AudioInput {
    /// Start delivering mono sample blocks to `blocks`
    ///
    /// # Errors
    ///
    /// Returns error if the device is unavailable or access is denied
    fn open(&mut self, config: &CaptureConfig, blocks: SampleSender) -> Result<()>;

    /// Release the device; idempotent, safe when never opened
    fn close(&mut self);
}

/// Captures audio from the default input device
#[derive(Default)]
pub struct CpalMicrophone {
    stream: Option<Stream>,
}

impl CpalMicrophone {
    /// Create an unopened microphone handle
    #[must_use]
    pub const fn new() -> Self {
        Self { stream: None }
    }

    /// Check if the device stream is open
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl AudioInput for CpalMicrophone {
    fn open(&mut self, config: &CaptureConfig, blocks: SampleSender) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let rate = SampleRate(config.sample_rate);
        let supports = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
        };

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| c.channels() == config.channels && supports(c))
            .or_else(|| {
                // Fallback: any channel count, downmixed below
                device.supported_input_configs().ok()?.find(|c| supports(c))
            })
            .ok_or_else(|| Error::Device("no suitable audio config found".to_string()))?;

        let stream_config: StreamConfig = supported_config.with_sample_rate(rate).config();
        let channels = usize::from(stream_config.channels.max(1));

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate,
            channels = stream_config.channels,
            echo_cancellation = config.constraints.echo_cancellation,
            noise_suppression = config.constraints.noise_suppression,
            auto_gain_control = config.constraints.auto_gain_control,
            "audio capture initialized"
        );

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    // Receiver gone means the recorder stopped
                    let _ = blocks.send(downmix(data, channels));
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.close();
    }
}

/// Average interleaved channels into mono
#[allow(clippy::cast_precision_loss)]
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Frames, gates and encodes a mono sample stream
#[derive(Debug)]
pub struct CapturePipeline {
    framer: FrameAccumulator,
    analyser: SpectrumAnalyser,
    gate: VoiceActivityGate,
    retained: u64,
    dropped: u64,
}

impl CapturePipeline {
    /// Create a pipeline for the given capture configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            framer: FrameAccumulator::new(config.frame_size()?),
            analyser: SpectrumAnalyser::with_buckets(
                config.fft_size,
                config.buckets,
                config.smoothing,
            ),
            gate: VoiceActivityGate::new(config.gate),
            retained: 0,
            dropped: 0,
        })
    }

    /// Feed a block of samples; `on_frame` runs once per retained frame, in order
    pub fn push_samples(&mut self, mut block: &[f32], mut on_frame: impl FnMut(AudioFrame)) {
        while !block.is_empty() {
            let take = self.framer.remaining().min(block.len());
            let (head, tail) = block.split_at(take);
            block = tail;

            self.analyser.push(head);

            for frame in self.framer.push(head) {
                let spectrum = self.analyser.byte_frequency_data();
                if self.gate.is_voice(&spectrum) {
                    self.retained += 1;
                    on_frame(AudioFrame::from_f32(&frame));
                } else {
                    self.dropped += 1;
                    tracing::trace!(
                        energy = super::gate::mean_energy(&spectrum),
                        "frame below gate, dropped"
                    );
                }
            }
        }
    }

    /// Feed a block and collect the retained frames
    pub fn process(&mut self, block: &[f32]) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        self.push_samples(block, |frame| frames.push(frame));
        frames
    }

    /// Frames forwarded so far
    #[must_use]
    pub const fn retained(&self) -> u64 {
        self.retained
    }

    /// Frames dropped by the gate so far
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Samples per frame
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        self.framer.frame_size()
    }

    /// Discard the partial frame and analyser state
    pub fn reset(&mut self) {
        self.framer.reset();
        self.analyser.reset();
    }
}

/// Recording session over an [`AudioInput`]
pub struct Recorder<I: AudioInput> {
    input: I,
    config: CaptureConfig,
    pipeline: CapturePipeline,
    blocks: Option<SampleReceiver>,
}

impl<I: AudioInput> Recorder<I> {
    /// Create a stopped recorder
    ///
    /// # Errors
    ///
    /// Returns error if the capture configuration is invalid
    pub fn new(input: I, config: CaptureConfig) -> Result<Self> {
        let pipeline = CapturePipeline::new(&config)?;
        Ok(Self {
            input,
            config,
            pipeline,
            blocks: None,
        })
    }

    /// Open the input and start receiving samples
    ///
    /// # Errors
    ///
    /// Returns error if the input cannot be opened; nothing is left running
    pub fn start(&mut self) -> Result<()> {
        if self.blocks.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.input.open(&self.config, tx) {
            self.input.close();
            return Err(e);
        }

        self.blocks = Some(rx);
        tracing::info!(
            sample_rate = self.config.sample_rate,
            frame_size = self.pipeline.frame_size(),
            gate = %self.config.gate,
            "recording started"
        );
        Ok(())
    }

    /// Close the input and discard any partial frame; idempotent
    pub fn stop(&mut self) {
        if self.blocks.take().is_some() {
            self.input.close();
            self.pipeline.reset();
            tracing::info!("recording stopped");
        }
    }

    /// Wait for the next sample block and return its retained frames
    ///
    /// Pends forever while stopped. Returns `None` when the input hung up.
    pub async fn next_frames(&mut self) -> Option<Vec<AudioFrame>> {
        let Some(blocks) = self.blocks.as_mut() else {
            return std::future::pending().await;
        };

        let block = blocks.recv().await?;
        Some(self.pipeline.process(&block))
    }

    /// Check if currently recording
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.blocks.is_some()
    }

    /// The capture pipeline
    #[must_use]
    pub const fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    /// The underlying input
    #[must_use]
    pub const fn input(&self) -> &I {
        &self.input
    }
}

impl<I: AudioInput> Drop for Recorder<I> {
    fn drop(&mut self) {
        self.stop();
    }
}
