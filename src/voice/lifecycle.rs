use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{debug, info};

use super::state::GuildRegistry;
use crate::audio::transport::VoiceTransport;

/// What a reset threw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub drained: usize,
    pub task_cancelled: bool,
    pub session_cleared: bool,
}

/// Clears pending and playing audio after the bot is dropped from a voice channel.
///
/// The guild's voice profile survives; only audio is discarded, so nothing queued before
/// a kick is played after the next join.
pub struct LifecycleReset {
    registry: Arc<GuildRegistry>,
    transport: Arc<dyn VoiceTransport>,
}

impl LifecycleReset {
    pub fn new(registry: Arc<GuildRegistry>, transport: Arc<dyn VoiceTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Handles the bot's own voice state moving to "no channel".
    pub async fn on_disconnected(&self, guild_id: GuildId) -> ResetReport {
        let Some(state) = self.registry.get(guild_id) else {
            debug!("Guild {} sin estado de audio, nada que limpiar", guild_id);
            return ResetReport::default();
        };

        let (task_cancelled, drained) = state.discard_audio();

        // Si alguien tiene el lock, reconciliará la sesión por su cuenta
        let session_cleared = match state.try_lock_session() {
            Ok(mut slot) => slot.take().is_some(),
            Err(_) => false,
        };

        self.transport.stop(guild_id).await;

        let report = ResetReport {
            drained,
            task_cancelled,
            session_cleared,
        };
        info!(
            "🧹 Estado de voz reiniciado en guild {}: {} audios descartados, driver cancelado: {}, sesión liberada: {}",
            guild_id, report.drained, report.task_cancelled, report.session_cleared
        );
        report
    }
}
