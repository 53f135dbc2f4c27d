//! # TTS Module
//!
//! Speech synthesis through a VOICEVOX engine.
//!
//! - [`client`]: HTTP client for `/speakers`, `/audio_query` and `/synthesis`
//! - [`params`]: per-guild voice parameters and the profile handed to each synthesis call

pub mod client;
pub mod params;

pub use client::{SpeechSynthesizer, VoicevoxClient};
pub use params::VoiceProfile;
