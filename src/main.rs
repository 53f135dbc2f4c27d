use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod config;
mod error;
mod service;
mod tts;
mod voice;

#[cfg(test)]
mod testing;

use crate::audio::songbird_transport::SongbirdTransport;
use crate::bot::SpeakerBot;
use crate::config::Config;
use crate::service::VoiceService;
use crate::tts::{SpeechSynthesizer, VoiceProfile, VoicevoxClient};
use crate::voice::{lifecycle::LifecycleReset, state::GuildRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("voicevox_speaker=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🗣️ Iniciando VOICEVOX Speaker v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let synthesizer = Arc::new(VoicevoxClient::new(
        &config.voicevox_url,
        config.voicevox_timeout(),
    )?);

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(synthesizer.as_ref()).await;
    }

    // El timeout del gateway de songbird acota cada intento de conexión
    let songbird = Songbird::serenity_from_config(
        songbird::Config::default().gateway_timeout(Some(config.retry_policy().connect_timeout)),
    );
    let transport = Arc::new(SongbirdTransport::new(songbird.clone()));

    let registry = Arc::new(GuildRegistry::new(VoiceProfile::new(
        &config.default_speaker_name,
        &config.default_style_name,
    )));
    let service = Arc::new(VoiceService::new(
        registry.clone(),
        transport.clone(),
        synthesizer,
        config.retry_policy(),
        config.playback_poll_interval(),
        config.max_text_length,
    ));
    let reset = LifecycleReset::new(registry, transport);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let handler = SpeakerBot::new(config.clone(), service, reset);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(synthesizer: &dyn SpeechSynthesizer) -> Result<()> {
    // VOICEVOX debe responder con al menos un hablante
    let speakers = synthesizer.speakers().await?;
    if speakers.is_empty() {
        anyhow::bail!("VOICEVOX no tiene hablantes disponibles");
    }

    println!("OK ({} hablantes)", speakers.len());
    Ok(())
}
