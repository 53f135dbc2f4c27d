//! Error taxonomy shared by the synthesis, voice and command layers.

use std::fmt;
use thiserror::Error;

/// Which VOICEVOX call produced an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStage {
    Speakers,
    AudioQuery,
    Synthesis,
}

impl fmt::Display for SynthesisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SynthesisStage::Speakers => "speakers",
            SynthesisStage::AudioQuery => "audio_query",
            SynthesisStage::Synthesis => "synthesis",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("VOICEVOX {stage} failed with status {status}: {body}")]
    Upstream {
        stage: SynthesisStage,
        status: u16,
        body: String,
    },

    #[error("VOICEVOX request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("VOICEVOX returned malformed JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("VOICEVOX returned an audio query that is not a JSON object")]
    InvalidRecipe,

    #[error("VOICEVOX has no speakers installed")]
    NoSpeakers,
}

/// Failure reported by a voice transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("voice handshake timed out")]
    Timeout,

    /// The gateway or the voice websocket closed mid-handshake (e.g. 4006).
    #[error("voice session closed: {0}")]
    SessionClosed(String),

    #[error("no voice connection for this guild")]
    NotConnected,

    #[error("voice transport rejected the request: {0}")]
    Rejected(String),

    #[error("audio source unavailable: {0}")]
    Io(String),
}

impl TransportError {
    /// Timeouts and abrupt session closes are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout | TransportError::SessionClosed(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not connect to the voice channel after {attempts} attempt(s): {last_cause}")]
pub struct ConnectError {
    pub last_cause: TransportError,
    pub attempts: u32,
}

/// Failure while preparing or playing a single queued item.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("could not stage audio in a temporary file: {0}")]
    TempFile(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("the requesting user is not in a voice channel")]
    NotInVoiceChannel,

    #[error("the bot is not connected to a voice channel")]
    NotConnected,

    #[error("nothing to read")]
    EmptyText,

    #[error("unknown voice parameter: {0}")]
    UnknownParameter(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}
