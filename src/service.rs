//! Command surface used by the Discord front-end.
//!
//! Every operation returns a typed outcome; turning it into a reply is the caller's job.

use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

use crate::{
    audio::{player::AudioPlayer, transport::VoiceSession, transport::VoiceTransport},
    error::CommandError,
    tts::{
        client::{Speaker, SpeechSynthesizer},
        params::{ParamKind, VoiceParameters, VoiceProfile},
    },
    voice::{
        connection::{ConnectionManager, RetryPolicy},
        state::GuildRegistry,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub session: VoiceSession,
    /// The guild was already connected to this channel.
    pub reused: bool,
    pub driver_started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SayOutcome {
    pub sequence: u64,
    pub pending: usize,
    pub truncated: bool,
}

pub struct VoiceService {
    registry: Arc<GuildRegistry>,
    connections: ConnectionManager,
    player: AudioPlayer,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    max_text_length: usize,
}

impl VoiceService {
    pub fn new(
        registry: Arc<GuildRegistry>,
        transport: Arc<dyn VoiceTransport>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        policy: RetryPolicy,
        poll_interval: Duration,
        max_text_length: usize,
    ) -> Self {
        Self {
            registry,
            connections: ConnectionManager::new(transport.clone(), policy),
            player: AudioPlayer::new(transport, poll_interval),
            synthesizer,
            max_text_length,
        }
    }

    /// Joins (or moves to) the requesting user's channel and makes sure playback runs.
    pub async fn join(
        &self,
        guild_id: GuildId,
        user_channel: Option<ChannelId>,
    ) -> Result<JoinOutcome, CommandError> {
        let channel_id = user_channel.ok_or(CommandError::NotInVoiceChannel)?;
        let state = self.registry.get_or_create(guild_id);

        let mut slot = state.lock_session().await;
        let previous = *slot;
        if previous.is_some() && self.connections.is_live(&slot).await.is_none() {
            // La sesión murió sin aviso; su audio no pasa a la nueva
            let (_, drained) = state.discard_audio();
            info!(
                "🧹 Sesión caída en guild {}, {} audios descartados antes de reconectar",
                guild_id, drained
            );
        }
        let session = self
            .connections
            .ensure_connected(guild_id, &mut slot, channel_id)
            .await?;
        let driver_started = self.player.ensure_running(&state, session);

        Ok(JoinOutcome {
            session,
            reused: previous == Some(session),
            driver_started,
        })
    }

    /// Leaves the channel, discarding anything still queued.
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), CommandError> {
        let state = self
            .registry
            .get(guild_id)
            .ok_or(CommandError::NotConnected)?;

        let mut slot = state.lock_session().await;
        if slot.is_none() {
            return Err(CommandError::NotConnected);
        }

        state.discard_audio();
        self.connections.disconnect(guild_id, &mut slot).await;

        info!("👋 Sesión de voz cerrada en guild {}", guild_id);
        Ok(())
    }

    /// Synthesizes `text` with the guild's current voice and queues it for playback.
    ///
    /// The audio is only queued if the session that was live before synthesis is still
    /// live afterwards; otherwise it is dropped and the guild is reported as not connected.
    pub async fn say(&self, guild_id: GuildId, text: &str) -> Result<SayOutcome, CommandError> {
        let (text, truncated) = prepare_text(text, self.max_text_length)?;
        let state = self
            .registry
            .get(guild_id)
            .ok_or(CommandError::NotConnected)?;

        let requested_for = {
            let slot = state.lock_session().await;
            self.connections
                .is_live(&slot)
                .await
                .ok_or(CommandError::NotConnected)?
        };

        let profile = state.profile();
        let audio = self.synthesizer.synthesize(&text, &profile).await?;

        let slot = state.lock_session().await;
        match self.connections.is_live(&slot).await {
            Some(session) if session.generation == requested_for.generation => {
                let sequence = state.queue().push(audio);
                self.player.ensure_running(&state, session);

                Ok(SayOutcome {
                    sequence,
                    pending: state.queue().len(),
                    truncated,
                })
            }
            _ => {
                warn!(
                    "🗑️ Audio descartado en guild {}: la sesión #{} terminó durante la síntesis",
                    guild_id, requested_for.generation
                );
                Err(CommandError::NotConnected)
            }
        }
    }

    pub fn set_voice(&self, guild_id: GuildId, speaker_name: &str, style_name: &str) -> VoiceProfile {
        let state = self.registry.get_or_create(guild_id);
        state.update_profile(|profile| {
            profile.speaker_name = speaker_name.to_string();
            profile.style_name = style_name.to_string();
            profile.clone()
        })
    }

    /// Sets one parameter by name, returning the value actually stored after clamping.
    pub fn set_param(
        &self,
        guild_id: GuildId,
        name: &str,
        value: f64,
    ) -> Result<(ParamKind, f64), CommandError> {
        let kind: ParamKind = name
            .parse()
            .map_err(CommandError::UnknownParameter)?;
        let state = self.registry.get_or_create(guild_id);
        let effective = state.update_profile(|profile| profile.params.set(kind, value));
        Ok((kind, effective))
    }

    pub fn reset_params(&self, guild_id: GuildId) -> VoiceParameters {
        let state = self.registry.get_or_create(guild_id);
        state.update_profile(|profile| {
            profile.params = VoiceParameters::PRESET;
            profile.params
        })
    }

    pub fn show_params(&self, guild_id: GuildId) -> VoiceProfile {
        match self.registry.get(guild_id) {
            Some(state) => state.profile(),
            None => self.registry.default_profile().clone(),
        }
    }

    pub async fn speakers(&self) -> Result<Vec<Speaker>, CommandError> {
        Ok(self.synthesizer.speakers().await?)
    }
}

/// Trims and length-limits user text. Returns the text and whether it was cut.
fn prepare_text(text: &str, max_chars: usize) -> Result<(String, bool), CommandError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CommandError::EmptyText);
    }

    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => Ok((trimmed[..cut].to_string(), true)),
        None => Ok((trimmed.to_string(), false)),
    }
}
