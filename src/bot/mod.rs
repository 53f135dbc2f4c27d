//! # Bot Module
//!
//! Discord front-end of the VOICEVOX speaker bot.
//!
//! This module contains:
//! - Command registration ([`commands`])
//! - Command handling and reply rendering ([`handlers`])
//! - Event handling (ready, interactions, voice state updates)
//!
//! The [`SpeakerBot`] struct implements Serenity's [`EventHandler`] trait and forwards
//! everything voice-related to [`VoiceService`] and [`LifecycleReset`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{config::Config, service::VoiceService, voice::lifecycle::LifecycleReset};

/// Main Discord bot handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (token, VOICEVOX endpoint, retry policy)
/// - `service`: Command surface shared by every guild
/// - `reset`: Cleanup run when the bot is dropped from a voice channel
pub struct SpeakerBot {
    config: Arc<Config>,
    pub service: Arc<VoiceService>,
    reset: LifecycleReset,
}

impl SpeakerBot {
    pub fn new(config: Config, service: Arc<VoiceService>, reset: LifecycleReset) -> Self {
        Self {
            config: Arc::new(config),
            service,
            reset,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set the commands are registered for that guild only
    /// (propagation in ~1 second), otherwise globally (~1 hour).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for SpeakerBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Resets the guild's audio state once the bot itself ends up in no channel,
    /// whether it was kicked, the channel was deleted or the session dropped.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        debug!(
            "🔌 Bot sin canal de voz en guild {} (antes: {:?})",
            guild_id,
            old.and_then(|state| state.channel_id)
        );
        self.reset.on_disconnected(guild_id).await;
    }
}
