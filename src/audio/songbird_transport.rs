use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{File as FileInput, Input},
    tracks::{PlayMode, Track, TrackHandle},
    Event, Songbird, TrackEvent,
};
use std::{path::Path, sync::Arc, time::Duration};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{
    events::{register_voice_events, PlaybackFinishedHandler},
    transport::{PlaybackCompletion, VoiceSession, VoiceTransport},
};
use crate::error::TransportError;

/// [`VoiceTransport`] backed by songbird's serenity integration.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    current_tracks: DashMap<GuildId, TrackHandle>,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            current_tracks: DashMap::new(),
        }
    }

    fn current_track(&self, guild_id: GuildId) -> Option<TrackHandle> {
        self.current_tracks.get(&guild_id).map(|t| t.clone())
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let call = match tokio::time::timeout(timeout, self.manager.join(guild_id, channel_id)).await {
            Err(_) => return Err(TransportError::Timeout),
            Ok(result) => result.map_err(classify_join_error)?,
        };

        let mut handler = call.lock().await;
        register_voice_events(&mut handler, guild_id);

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn move_to(
        &self,
        session: &VoiceSession,
        channel_id: ChannelId,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let call = self
            .manager
            .get(session.guild_id)
            .ok_or(TransportError::NotConnected)?;

        // El lock de la llamada debe soltarse antes de esperar el handshake
        let stage = {
            let mut handler = call.lock().await;
            handler.join(channel_id).await
        };
        let join = stage.map_err(classify_join_error)?;

        match tokio::time::timeout(timeout, join).await {
            Err(_) => Err(TransportError::Timeout),
            Ok(result) => result.map_err(classify_join_error),
        }
    }

    async fn disconnect(&self, guild_id: GuildId, force: bool) {
        self.current_tracks.remove(&guild_id);

        if force {
            if let Err(e) = self.manager.remove(guild_id).await {
                debug!("Llamada de guild {} ya no existía: {:?}", guild_id, e);
            }
        } else if let Some(call) = self.manager.get(guild_id) {
            let mut handler = call.lock().await;
            handler.stop();
            if let Err(e) = handler.leave().await {
                warn!("Error al salir del canal en guild {}: {:?}", guild_id, e);
            }
        }

        info!("👋 Desconectado del canal de voz en guild {} (forzado: {})", guild_id, force);
    }

    async fn is_connected(&self, session: &VoiceSession) -> bool {
        let Some(call) = self.manager.get(session.guild_id) else {
            return false;
        };

        let handler = call.lock().await;
        handler.current_connection().is_some()
            && handler.current_channel().map(|c| ChannelId::new(c.0.get()))
                == Some(session.channel_id)
    }

    async fn is_playing(&self, session: &VoiceSession) -> bool {
        match self.current_track(session.guild_id) {
            Some(track) => match track.get_info().await {
                Ok(info) => matches!(info.playing, PlayMode::Play | PlayMode::Pause),
                Err(_) => false,
            },
            None => false,
        }
    }

    async fn play(
        &self,
        session: &VoiceSession,
        source: &Path,
    ) -> Result<PlaybackCompletion, TransportError> {
        let call = self
            .manager
            .get(session.guild_id)
            .ok_or(TransportError::NotConnected)?;

        tokio::fs::metadata(source)
            .await
            .map_err(|e| TransportError::Io(format!("{}: {}", source.display(), e)))?;
        let input: Input = FileInput::new(source.to_path_buf()).into();

        // Se crea en pausa para registrar los eventos antes de que pueda terminar
        let handle = {
            let mut handler = call.lock().await;
            handler.play(Track::from(input).pause())
        };

        let (sender, completion) = oneshot::channel();
        let (on_end, on_error) = PlaybackFinishedHandler::pair(session.guild_id, sender);

        handle
            .add_event(Event::Track(TrackEvent::End), on_end)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), on_error)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        handle
            .play()
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        self.current_tracks.insert(session.guild_id, handle);
        Ok(completion)
    }

    async fn stop(&self, guild_id: GuildId) {
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            let _ = track.stop();
        }

        if let Some(call) = self.manager.get(guild_id) {
            call.lock().await.stop();
        }
    }

    async fn current_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let call = self.manager.get(guild_id)?;
        let handler = call.lock().await;
        handler
            .current_connection()
            .and(handler.current_channel())
            .map(|c| ChannelId::new(c.0.get()))
    }
}

fn classify_join_error(err: JoinError) -> TransportError {
    match err {
        JoinError::TimedOut => TransportError::Timeout,
        JoinError::Dropped => {
            TransportError::SessionClosed("gateway dropped the join request".to_string())
        }
        // Incluye el cierre 4006 del websocket de voz durante el handshake
        JoinError::Driver(e) => TransportError::SessionClosed(e.to_string()),
        other => TransportError::Rejected(other.to_string()),
    }
}
