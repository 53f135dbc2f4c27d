use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{path::Path, time::Duration};
use tokio::sync::oneshot;

use crate::error::TransportError;

/// A live voice connection as recorded by the connection manager.
///
/// `generation` is unique per successful connect, so two handles compare equal only
/// when they describe the very same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceSession {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub generation: u64,
}

/// Resolves when the transport has finished (or abandoned) one playback.
pub type PlaybackCompletion = oneshot::Receiver<()>;

/// Everything the bot needs from a Discord voice backend.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Performs the voice handshake for `channel_id`, giving up after `timeout`.
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Moves an existing session to another channel of the same guild.
    async fn move_to(
        &self,
        session: &VoiceSession,
        channel_id: ChannelId,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Leaves the channel. `force` also discards any half-open call state.
    async fn disconnect(&self, guild_id: GuildId, force: bool);

    async fn is_connected(&self, session: &VoiceSession) -> bool;

    async fn is_playing(&self, session: &VoiceSession) -> bool;

    /// Starts playing the audio file at `source`; the file must outlive the returned completion.
    async fn play(
        &self,
        session: &VoiceSession,
        source: &Path,
    ) -> Result<PlaybackCompletion, TransportError>;

    /// Stops whatever is playing in the guild.
    async fn stop(&self, guild_id: GuildId);

    /// The channel the backend is actually connected to, regardless of what was requested.
    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId>;
}
