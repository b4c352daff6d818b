//! Connection to the voice service
//!
//! Outbound: raw little-endian 16-bit PCM frames, one binary message each.
//! Inbound: JSON tagged messages (see [`InboundMessage`]).

mod channel;
mod message;

pub use channel::{ConnectionState, InboundFrame, TransportChannel, TransportEvent};
pub use message::{InboundMessage, decode_audio_payload, encode_audio_payload};
