//! Voice processing module
//!
//! Handles microphone capture, voice-activity gating, PCM encoding and
//! sequential playback of synthesized speech.

mod capture;
mod decode;
mod framer;
mod gate;
mod pcm;
mod playback;
mod spectrum;

pub use capture::{
    AudioInput, CapturePipeline, CpalMicrophone, Recorder, SampleReceiver, SampleSender,
};
pub use decode::{AudioFormat, DecodedAudio, decode_audio, detect_format};
pub use framer::FrameAccumulator;
pub use gate::{
    DEFAULT_DECIBEL_THRESHOLD, DEFAULT_MEAN_THRESHOLD, GatePolicy, VoiceActivityGate, level_db,
    mean_energy,
};
pub use pcm::{AudioFrame, frame_size, sample_to_i16, samples_to_wav};
pub use playback::{
    AudioSink, CpalSpeaker, HaltSignal, PLAYBACK_SAMPLE_RATE, PlaybackEvent, PlaybackPipeline,
    PlaybackQueue,
};
pub use spectrum::{
    DEFAULT_BUCKETS, DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING, MAX_DECIBELS, MIN_DECIBELS,
    SpectrumAnalyser,
};
