//! voicelink - Real-time voice client for conversational AI services
//!
//! This library provides the client side of a streaming voice conversation:
//! - Microphone capture, framing and voice-activity gating
//! - A persistent WebSocket channel carrying PCM upstream and JSON downstream
//! - Ordered, non-overlapping playback of synthesized speech
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  PCM frames  ┌──────────────────┐
//! │   Capture   │─────────────▶│                  │
//! │ mic → gate  │              │    Transport     │◀────▶ voice service
//! └─────────────┘              │  (WebSocket)     │
//!                              │                  │
//! ┌─────────────┐  audio_chunk │                  │
//! │  Playback   │◀─────────────│                  │
//! │ queue → spk │              └──────────────────┘
//! └─────────────┘
//!        ▲              Session (one select loop)
//! ```

pub mod config;
pub mod error;
pub mod session;
pub mod transport;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{Session, SessionCommand, SessionEnd, SessionSummary};
pub use transport::{ConnectionState, InboundMessage, TransportChannel, TransportEvent};
