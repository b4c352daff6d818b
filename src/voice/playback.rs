//! Audio playback to speakers
//!
//! Speech chunks play strictly one at a time in arrival order. A single task
//! owns the [`PlaybackQueue`]; the chunk it is currently playing is the only
//! thing allowed to drive the output device.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::decode::{DecodedAudio, decode_audio};
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Shared flag asking an in-flight clip to stop early
#[derive(Debug, Clone, Default)]
pub struct HaltSignal(Arc<AtomicBool>);

impl HaltSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An output device that plays decoded clips
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    /// Rate clips must be decoded to
    fn sample_rate(&self) -> u32;

    /// Play a clip, resolving once it finished or `halt` fired
    async fn play(&self, clip: DecodedAudio, halt: &HaltSignal) -> Result<()>;
}

/// Plays audio to the default output device
pub struct CpalSpeaker {
    config: StreamConfig,
}

impl CpalSpeaker {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        let rate = SampleRate(PLAYBACK_SAMPLE_RATE);
        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .find(|c| {
                c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            })
            .ok_or_else(|| Error::Device("no suitable output config found".to_string()))?;

        let config = supported_config.with_sample_rate(rate).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }
}

#[async_trait]
impl AudioSink for CpalSpeaker {
    fn sample_rate(&self) -> u32 {
        PLAYBACK_SAMPLE_RATE
    }

    async fn play(&self, clip: DecodedAudio, halt: &HaltSignal) -> Result<()> {
        let config = self.config.clone();
        let halt = halt.clone();

        tokio::task::spawn_blocking(move || play_blocking(&config, clip, &halt))
            .await
            .map_err(|e| Error::Playback(e.to_string()))?
    }
}

/// Play samples on a fresh output stream, blocking until done or halted
fn play_blocking(config: &StreamConfig, clip: DecodedAudio, halt: &HaltSignal) -> Result<()> {
    if clip.samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Device("no output device".to_string()))?;

    let channels = usize::from(config.channels.max(1));
    let sample_count = clip.samples.len();
    let duration = clip.duration();

    let finished = Arc::new(AtomicBool::new(false));
    let finished_cb = Arc::clone(&finished);
    let samples = clip.samples;
    let mut pos = 0usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = if let Some(&s) = samples.get(pos) {
                        pos += 1;
                        s
                    } else {
                        finished_cb.store(true, Ordering::SeqCst);
                        0.0
                    };
                    frame.fill(sample);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    // Poll for completion with timeout
    let start = Instant::now();
    let timeout = duration + Duration::from_millis(500);

    while !finished.load(Ordering::SeqCst) {
        if halt.is_halted() {
            tracing::debug!(samples = sample_count, "playback halted");
            return Ok(());
        }
        if start.elapsed() > timeout {
            tracing::warn!(samples = sample_count, "playback did not report completion");
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    // Let the device drain its last buffer
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = sample_count, "playback complete");

    Ok(())
}

/// FIFO of encoded chunks with a single playing slot
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    pending: VecDeque<(u64, Vec<u8>)>,
    playing: bool,
    next_seq: u64,
}

impl PlaybackQueue {
    /// Append a chunk, returning its sequence number
    pub fn push(&mut self, chunk: Vec<u8>) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push_back((seq, chunk));
        seq
    }

    /// Pop the head chunk if nothing is playing, marking it as playing
    pub fn begin_next(&mut self) -> Option<(u64, Vec<u8>)> {
        if self.playing {
            return None;
        }

        let next = self.pending.pop_front()?;
        self.playing = true;
        Some(next)
    }

    /// Mark the playing chunk as done
    pub fn finish(&mut self) {
        self.playing = false;
    }

    /// Chunks waiting to play
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    /// Drop every waiting chunk, returning how many were discarded
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }
}

/// Progress notifications from the playback task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Chunk `seq` began decoding and playing
    Started(u64),
    /// Chunk `seq` played to the end
    Finished(u64),
    /// Chunk `seq` was skipped
    Failed { seq: u64, error: String },
    /// Nothing left to play
    Idle,
}

enum Command {
    Enqueue(Vec<u8>),
    Stop,
}

/// Handle to the playback task
pub struct PlaybackPipeline {
    commands: mpsc::UnboundedSender<Command>,
    halt: HaltSignal,
    task: Option<JoinHandle<()>>,
}

impl PlaybackPipeline {
    /// Spawn the playback task over `sink`
    ///
    /// `settle` is the pause after each chunk before the next one starts.
    /// The returned receiver reports progress; dropping it is fine.
    pub fn spawn<S: AudioSink>(
        sink: Arc<S>,
        settle: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let halt = HaltSignal::new();

        let task = tokio::spawn(run_queue(sink, commands_rx, events_tx, halt.clone(), settle));

        let pipeline = Self {
            commands,
            halt,
            task: Some(task),
        };
        (pipeline, events_rx)
    }

    /// Queue an encoded chunk; returns false once the pipeline has stopped
    pub fn enqueue(&self, chunk: Vec<u8>) -> bool {
        if self.task.is_none() {
            return false;
        }
        self.commands.send(Command::Enqueue(chunk)).is_ok()
    }

    /// Check if the playback task is still accepting chunks
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Halt the current clip, discard the queue and wait for the task; idempotent
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.halt.trigger();
        let _ = self.commands.send(Command::Stop);

        if let Err(e) = task.await {
            tracing::warn!(error = %e, "playback task ended abnormally");
        }
        tracing::debug!("playback stopped");
    }
}

impl Drop for PlaybackPipeline {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.halt.trigger();
            task.abort();
        }
    }
}

async fn run_queue<S: AudioSink>(
    sink: Arc<S>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    halt: HaltSignal,
    settle: Duration,
) {
    let mut queue = PlaybackQueue::default();
    let mut current: Option<(u64, BoxFuture<'static, Result<()>>)> = None;

    loop {
        if current.is_none() && !halt.is_halted() {
            if let Some((seq, chunk)) = queue.begin_next() {
                let _ = events.send(PlaybackEvent::Started(seq));
                let playing = play_chunk(Arc::clone(&sink), chunk, halt.clone(), settle).boxed();
                current = Some((seq, playing));
            }
        }

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Enqueue(chunk)) => {
                    let seq = queue.push(chunk);
                    tracing::trace!(seq, queued = queue.len(), "audio chunk queued");
                }
                Some(Command::Stop) | None => break,
            },
            result = async {
                match current.as_mut() {
                    Some((_, playing)) => playing.await,
                    None => std::future::pending().await,
                }
            } => {
                let seq = current.take().map_or(0, |(seq, _)| seq);
                queue.finish();

                match result {
                    Ok(()) => {
                        let _ = events.send(PlaybackEvent::Finished(seq));
                    }
                    Err(e) => {
                        tracing::error!(seq, error = %e, "audio chunk skipped");
                        let _ = events.send(PlaybackEvent::Failed {
                            seq,
                            error: e.to_string(),
                        });
                    }
                }

                if queue.is_empty() {
                    let _ = events.send(PlaybackEvent::Idle);
                }
            }
        }
    }

    let discarded = queue.clear();
    if discarded > 0 {
        tracing::debug!(discarded, "discarded queued audio chunks");
    }
}

async fn play_chunk<S: AudioSink>(
    sink: Arc<S>,
    chunk: Vec<u8>,
    halt: HaltSignal,
    settle: Duration,
) -> Result<()> {
    let target_rate = sink.sample_rate();
    let clip = tokio::task::spawn_blocking(move || decode_audio(&chunk, target_rate))
        .await
        .map_err(|e| Error::Decode(e.to_string()))??;

    sink.play(clip, &halt).await?;

    if !settle.is_zero() && !halt.is_halted() {
        tokio::time::sleep(settle).await;
    }
    Ok(())
}
