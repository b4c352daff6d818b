//! Shared test utilities
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;

use voicelink::config::{CaptureConfig, Config};
use voicelink::voice::{
    AudioInput, AudioSink, DecodedAudio, GatePolicy, HaltSignal, SampleSender, samples_to_wav,
};
use voicelink::{Error, Result};

/// Server side of a test connection
pub type ServerSocket = WebSocketStream<TcpStream>;

/// Accept one WebSocket connection on a free local port and hand it to `handler`
///
/// Returns the base URL to connect to and the handler's task.
pub async fn spawn_server<F, Fut, T>(handler: F) -> (String, JoinHandle<T>)
where
    F: FnOnce(ServerSocket) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");

    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept failed");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake failed");
        handler(ws).await
    });

    (format!("ws://{addr}/ws/audio"), task)
}

/// A port with nothing listening on it
pub async fn unused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("no local addr");
    drop(listener);
    format!("ws://{addr}/ws/audio")
}

/// Configuration pointing at `url` with the gate off and small frames
pub fn test_config(url: &str) -> Config {
    let mut config = Config::default();
    config.transport.url = url.to_string();
    config.capture = CaptureConfig {
        sample_rate: 16000,
        time_slice_ms: 10,
        gate: GatePolicy::Off,
        ..CaptureConfig::default()
    };
    config.playback.settle_delay = Duration::ZERO;
    config
}

/// Open/close counts of a [`FakeInput`]
#[derive(Debug, Clone, Default)]
pub struct InputProbe {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

impl InputProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Microphone stand-in that delivers scripted blocks on open
pub struct FakeInput {
    blocks: Vec<Vec<f32>>,
    sender: Option<SampleSender>,
    probe: InputProbe,
    deny: bool,
}

impl FakeInput {
    pub fn new(blocks: Vec<Vec<f32>>) -> (Self, InputProbe) {
        let probe = InputProbe::default();
        let input = Self {
            blocks,
            sender: None,
            probe: probe.clone(),
            deny: false,
        };
        (input, probe)
    }

    /// An input whose open always fails with a permission error
    pub fn denied() -> (Self, InputProbe) {
        let (mut input, probe) = Self::new(Vec::new());
        input.deny = true;
        (input, probe)
    }
}

impl AudioInput for FakeInput {
    fn open(&mut self, _config: &CaptureConfig, blocks: SampleSender) -> Result<()> {
        if self.deny {
            return Err(Error::Device("permission denied".to_string()));
        }

        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        for block in self.blocks.drain(..) {
            let _ = blocks.send(block);
        }
        self.sender = Some(blocks);
        Ok(())
    }

    fn close(&mut self) {
        if self.sender.take().is_some() {
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Everything a [`MemorySink`] observed
#[derive(Debug, Default)]
pub struct SinkLog {
    /// Clip lengths in the order playback started
    pub started: Mutex<Vec<usize>>,
    /// Clip lengths in the order playback ended, with whether they were halted
    pub finished: Mutex<Vec<(usize, bool)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl SinkLog {
    pub fn started(&self) -> Vec<usize> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<(usize, bool)> {
        self.finished.lock().unwrap().clone()
    }

    /// Highest number of clips ever playing at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Output device stand-in; clips are identified by their sample count
#[derive(Clone)]
pub struct MemorySink {
    sample_rate: u32,
    delays: Arc<HashMap<usize, Duration>>,
    default_delay: Duration,
    pub log: Arc<SinkLog>,
}

impl MemorySink {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            delays: Arc::new(HashMap::new()),
            default_delay: Duration::from_millis(20),
            log: Arc::new(SinkLog::default()),
        }
    }

    /// Make clips of `len` samples take `delay` to play
    pub fn with_delay(mut self, len: usize, delay: Duration) -> Self {
        Arc::make_mut(&mut self.delays).insert(len, delay);
        self
    }
}

#[async_trait]
impl AudioSink for MemorySink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    async fn play(&self, clip: DecodedAudio, halt: &HaltSignal) -> Result<()> {
        let len = clip.samples.len();
        let now = self.log.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_active.fetch_max(now, Ordering::SeqCst);
        self.log.started.lock().unwrap().push(len);

        let delay = self.delays.get(&len).copied().unwrap_or(self.default_delay);
        let step = Duration::from_millis(5);
        let mut waited = Duration::ZERO;
        while waited < delay && !halt.is_halted() {
            tokio::time::sleep(step).await;
            waited += step;
        }

        self.log.active.fetch_sub(1, Ordering::SeqCst);
        self.log
            .finished
            .lock()
            .unwrap()
            .push((len, halt.is_halted()));
        Ok(())
    }
}

/// A mono 16-bit WAV clip of `len` samples of a quiet tone
#[allow(clippy::cast_precision_loss)]
pub fn wav_clip(len: usize, sample_rate: u32) -> Vec<u8> {
    let samples: Vec<f32> = (0..len)
        .map(|i| (i as f32 * 0.05).sin() * 0.25)
        .collect();
    samples_to_wav(&samples, sample_rate).expect("wav encoding failed")
}

/// Deterministic white noise in `[-amplitude, amplitude]`
#[allow(clippy::cast_precision_loss)]
pub fn noise(len: usize, amplitude: f32, seed: u32) -> Vec<f32> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state as f32 / u32::MAX as f32).mul_add(2.0, -1.0) * amplitude
        })
        .collect()
}

/// Wait until `check` passes, polling every 10ms, or panic after `timeout`
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
