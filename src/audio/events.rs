use parking_lot::Mutex;
use serenity::{async_trait, model::id::GuildId};
use songbird::{
    events::CoreEvent, Event as VoiceEvent, EventContext, EventHandler as VoiceEventHandler,
};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Resuelve la espera del driver cuando un track termina o falla
pub struct PlaybackFinishedHandler {
    pub guild_id: GuildId,
    pub sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl PlaybackFinishedHandler {
    /// Builds the End/Error handler pair sharing one completion sender.
    pub fn pair(guild_id: GuildId, sender: oneshot::Sender<()>) -> (Self, Self) {
        let sender = Arc::new(Mutex::new(Some(sender)));
        (
            Self {
                guild_id,
                sender: sender.clone(),
            },
            Self { guild_id, sender },
        )
    }
}

#[async_trait]
impl VoiceEventHandler for PlaybackFinishedHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                debug!("🎵 Track finalizado en guild {}: {:?}", self.guild_id, state.playing);
            }
        }

        if let Some(sender) = self.sender.lock().take() {
            let _ = sender.send(());
        }

        Some(VoiceEvent::Cancel)
    }
}

/// Handler para desconexiones del driver de voz
pub struct DriverDisconnectHandler {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Driver de voz desconectado en guild {} ({:?}, motivo: {:?})",
                self.guild_id, data.kind, data.reason
            );
        }

        None
    }
}

/// Handler para reconexiones automáticas del driver
pub struct ReconnectHandler {
    pub guild_id: GuildId,
}

#[async_trait]
impl VoiceEventHandler for ReconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<VoiceEvent> {
        info!("🔄 Driver de voz reconectado en guild {}", self.guild_id);
        None
    }
}

/// Registra los handlers globales de una llamada, reemplazando los anteriores
pub fn register_voice_events(handler: &mut songbird::Call, guild_id: GuildId) {
    handler.remove_all_global_events();

    handler.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverDisconnect),
        DriverDisconnectHandler { guild_id },
    );

    handler.add_global_event(
        VoiceEvent::Core(CoreEvent::DriverReconnect),
        ReconnectHandler { guild_id },
    );
}
