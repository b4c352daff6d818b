//! Voice session
//!
//! Runs one conversation with the voice service: opens the connection,
//! starts recording, forwards every retained frame upstream, and dispatches
//! inbound messages, queueing synthesized audio for playback.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::Result;
use crate::config::Config;
use crate::transport::{
    InboundFrame, InboundMessage, TransportChannel, TransportEvent, decode_audio_payload,
};
use crate::voice::{AudioInput, AudioSink, PlaybackEvent, PlaybackPipeline, Recorder};

/// Interactive control of a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Stop or restart recording; playback continues either way
    ToggleMute,
    /// End the session
    Stop,
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionEnd {
    /// Stopped on request
    #[default]
    Stopped,
    /// The service closed the connection
    RemoteClosed(Option<String>),
    /// The connection failed
    ConnectionError(String),
    /// The audio input stopped delivering samples
    InputEnded,
}

/// Counters and surfaced errors from a finished session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Frames transmitted upstream
    pub frames_sent: u64,
    /// Retained frames that could not be sent
    pub frames_unsent: u64,
    /// Frames dropped by the voice-activity gate
    pub frames_gated: u64,
    /// Audio chunks handed to playback
    pub chunks_enqueued: u64,
    /// Audio chunks played to the end
    pub chunks_played: u64,
    /// Audio chunks skipped after a decode or playback failure
    pub chunks_failed: u64,
    /// `audio_stream_end` messages received
    pub utterances: u64,
    /// User-visible error messages, in order
    pub errors: Vec<String>,
    /// How the session ended
    pub end: SessionEnd,
}

/// One capture + transport + playback session
pub struct Session<I: AudioInput, S: AudioSink> {
    recorder: Recorder<I>,
    transport: TransportChannel,
    sink: Arc<S>,
    settle: Duration,
    muted: bool,
    summary: SessionSummary,
}

impl<I: AudioInput, S: AudioSink> Session<I, S> {
    /// Create a session; nothing is opened until [`Session::run`]
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: &Config, input: I, sink: S) -> Result<Self> {
        let recorder = Recorder::new(input, config.capture.clone())?;
        let transport = TransportChannel::new(config.transport.endpoint()?);

        Ok(Self {
            recorder,
            transport,
            sink: Arc::new(sink),
            settle: config.playback.settle_delay,
            muted: false,
            summary: SessionSummary::default(),
        })
    }

    /// The connection used by this session
    #[must_use]
    pub const fn transport(&self) -> &TransportChannel {
        &self.transport
    }

    /// Start, run until stopped or disconnected, then release everything
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be opened or the microphone
    /// cannot be started; nothing is left running in that case
    #[allow(clippy::future_not_send)]
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<SessionSummary> {
        let mut events = self.transport.connect().await?;

        if let Err(e) = self.recorder.start() {
            tracing::error!(error = %e, "microphone unavailable");
            self.transport.disconnect().await;
            return Err(e);
        }

        let (mut playback, mut playback_events) =
            PlaybackPipeline::spawn(Arc::clone(&self.sink), self.settle);

        tracing::info!(url = %self.transport.url(), "session started");

        let end = self
            .event_loop(&mut commands, &mut events, &mut playback_events, &playback)
            .await;

        self.recorder.stop();
        self.transport.disconnect().await;
        playback.stop().await;

        // Count outcomes reported before the task stopped
        while let Ok(event) = playback_events.try_recv() {
            self.on_playback_event(&event);
        }

        self.summary.frames_gated = self.recorder.pipeline().dropped();
        self.summary.end = end;

        tracing::info!(
            frames_sent = self.summary.frames_sent,
            frames_gated = self.summary.frames_gated,
            chunks_played = self.summary.chunks_played,
            end = ?self.summary.end,
            "session ended"
        );

        Ok(self.summary)
    }

    #[allow(clippy::future_not_send)]
    async fn event_loop(
        &mut self,
        commands: &mut mpsc::Receiver<SessionCommand>,
        events: &mut mpsc::UnboundedReceiver<TransportEvent>,
        playback_events: &mut mpsc::UnboundedReceiver<PlaybackEvent>,
        playback: &PlaybackPipeline,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::ToggleMute) => self.toggle_mute(),
                    Some(SessionCommand::Stop) | None => {
                        tracing::info!("stop requested");
                        return SessionEnd::Stopped;
                    }
                },
                frames = self.recorder.next_frames() => {
                    let Some(frames) = frames else {
                        tracing::warn!("audio input ended");
                        return SessionEnd::InputEnded;
                    };
                    for frame in frames {
                        if self.transport.send(&frame).await {
                            self.summary.frames_sent += 1;
                        } else {
                            self.summary.frames_unsent += 1;
                        }
                    }
                },
                event = events.recv() => {
                    let Some(event) = event else {
                        return SessionEnd::RemoteClosed(None);
                    };
                    if let Some(end) = self.on_transport_event(event, playback) {
                        return end;
                    }
                },
                Some(event) = playback_events.recv() => self.on_playback_event(&event),
            }
        }
    }

    fn toggle_mute(&mut self) {
        if self.muted {
            match self.recorder.start() {
                Ok(()) => {
                    self.muted = false;
                    tracing::info!("unmuted");
                }
                Err(e) => self.surface(format!("could not resume recording: {e}")),
            }
        } else {
            self.recorder.stop();
            self.muted = true;
            tracing::info!("muted");
        }
    }

    fn on_transport_event(
        &mut self,
        event: TransportEvent,
        playback: &PlaybackPipeline,
    ) -> Option<SessionEnd> {
        match event {
            TransportEvent::Opened => {
                tracing::debug!("transport open");
                None
            }
            TransportEvent::Frame(InboundFrame::Text(text)) => {
                self.on_message(&text, playback);
                None
            }
            TransportEvent::Frame(InboundFrame::Binary(data)) => {
                tracing::debug!(bytes = data.len(), "binary message ignored");
                None
            }
            TransportEvent::Closed { reason } => {
                let detail = reason.clone().unwrap_or_else(|| "no reason given".to_string());
                self.surface(format!("connection closed: {detail}"));
                Some(SessionEnd::RemoteClosed(reason))
            }
            TransportEvent::Error(e) => {
                self.surface(format!("connection error: {e}"));
                Some(SessionEnd::ConnectionError(e))
            }
        }
    }

    fn on_message(&mut self, text: &str, playback: &PlaybackPipeline) {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "malformed message discarded");
                return;
            }
        };

        match message {
            InboundMessage::Connected { client_id } => {
                tracing::info!(?client_id, "voice service ready");
            }
            InboundMessage::AudioStreamStart { text } => {
                tracing::debug!(?text, "audio stream started");
            }
            InboundMessage::AudioChunk { data, chunk_number } => {
                match decode_audio_payload(&data) {
                    Ok(bytes) => {
                        if playback.enqueue(bytes) {
                            self.summary.chunks_enqueued += 1;
                        }
                    }
                    Err(e) => tracing::warn!(?chunk_number, error = %e, "audio chunk discarded"),
                }
            }
            InboundMessage::AudioStreamEnd {
                text,
                remaining_sentence_chunk_count,
                total_chunks,
            } => {
                self.summary.utterances += 1;
                tracing::info!(
                    ?text,
                    ?remaining_sentence_chunk_count,
                    ?total_chunks,
                    "audio stream ended"
                );
            }
            InboundMessage::AudioStreamError { error, chunk_number } => {
                tracing::debug!(?chunk_number, "audio stream error");
                self.surface(error);
            }
            InboundMessage::AudioStreamStopped => {
                tracing::info!("audio stream stopped by service");
            }
            InboundMessage::Error { error } => self.surface(error),
            InboundMessage::Unknown => {
                tracing::debug!("unrecognized message ignored");
            }
        }
    }

    fn on_playback_event(&mut self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::Finished(_) => self.summary.chunks_played += 1,
            PlaybackEvent::Failed { .. } => self.summary.chunks_failed += 1,
            PlaybackEvent::Started(seq) => tracing::trace!(seq, "chunk playing"),
            PlaybackEvent::Idle => tracing::trace!("playback idle"),
        }
    }

    fn surface(&mut self, message: String) {
        tracing::error!("{message}");
        self.summary.errors.push(message);
    }
}
