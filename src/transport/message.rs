//! Inbound JSON messages from the voice service
//!
//! Every text frame is a JSON object tagged by `type`. Unrecognized tags
//! parse as [`InboundMessage::Unknown`] so the session can ignore them.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A message received from the voice service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Connection readiness marker
    #[serde(alias = "connection_established", alias = "ready")]
    Connected {
        #[serde(default)]
        client_id: Option<String>,
    },

    /// A synthesized utterance is about to stream
    AudioStreamStart {
        #[serde(default)]
        text: Option<String>,
    },

    /// One base64-encoded piece of synthesized audio
    AudioChunk {
        data: String,
        #[serde(default)]
        chunk_number: Option<u64>,
    },

    /// The current utterance finished streaming
    AudioStreamEnd {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        remaining_sentence_chunk_count: Option<u64>,
        #[serde(default)]
        total_chunks: Option<u64>,
    },

    /// The service failed while synthesizing
    AudioStreamError {
        error: String,
        #[serde(default)]
        chunk_number: Option<u64>,
    },

    /// The service cancelled the current stream
    AudioStreamStopped,

    /// Generic service error
    Error { error: String },

    /// Any other tag
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Parse a text frame
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a tagged JSON object
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Wire tag of this message
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::AudioStreamStart { .. } => "audio_stream_start",
            Self::AudioChunk { .. } => "audio_chunk",
            Self::AudioStreamEnd { .. } => "audio_stream_end",
            Self::AudioStreamError { .. } => "audio_stream_error",
            Self::AudioStreamStopped => "audio_stream_stopped",
            Self::Error { .. } => "error",
            Self::Unknown => "unknown",
        }
    }
}

/// Decode the base64 payload of an `audio_chunk`
///
/// # Errors
///
/// Returns error if the payload is not valid base64
pub fn decode_audio_payload(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| Error::Message(format!("invalid base64 audio payload: {e}")))
}

/// Encode audio bytes as an `audio_chunk` payload
#[must_use]
pub fn encode_audio_payload(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
