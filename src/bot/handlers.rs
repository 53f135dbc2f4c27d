use anyhow::Result;
use serenity::{
    builder::{
        CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandDataOption, CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    bot::SpeakerBot,
    error::CommandError,
    service::{JoinOutcome, SayOutcome},
    tts::{
        client::Speaker,
        params::{ParamKind, VoiceProfile},
    },
};

const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &SpeakerBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await?,
        "say" => handle_say(ctx, &command, bot, guild_id).await?,
        "vv" => handle_vv(ctx, &command, bot, guild_id).await?,
        _ => respond(ctx, &command, "❌ 不明なコマンドです", true).await?,
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &SpeakerBot,
    guild_id: GuildId,
) -> Result<()> {
    let user_channel = user_voice_channel(ctx, guild_id, command.user.id);
    if user_channel.is_none() {
        return respond(ctx, command, render_error(&CommandError::NotInVoiceChannel), true).await;
    }

    // El handshake con reintentos puede tardar más que el plazo de respuesta
    defer(ctx, command).await?;

    let reply = match bot.service.join(guild_id, user_channel).await {
        Ok(outcome) => {
            if outcome.driver_started {
                debug!("▶️ Driver iniciado para la sesión #{}", outcome.session.generation);
            }
            render_join(&outcome)
        }
        Err(e) => {
            warn!("No se pudo conectar en guild {}: {}", guild_id, e);
            render_error(&e)
        }
    };
    edit(ctx, command, reply).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &SpeakerBot,
    guild_id: GuildId,
) -> Result<()> {
    match bot.service.leave(guild_id).await {
        Ok(()) => respond(ctx, command, "👋 切断しました。", false).await,
        Err(e) => respond(ctx, command, render_error(&e), true).await,
    }
}

async fn handle_say(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &SpeakerBot,
    guild_id: GuildId,
) -> Result<()> {
    let text = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "text")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default()
        .to_string();

    defer(ctx, command).await?;

    let reply = match bot.service.say(guild_id, &text).await {
        Ok(outcome) => {
            debug!("📣 Audio #{} encolado en guild {}", outcome.sequence, guild_id);
            render_say(&outcome)
        }
        Err(e) => {
            warn!("No se pudo leer el texto en guild {}: {}", guild_id, e);
            render_error(&e)
        }
    };
    edit(ctx, command, reply).await
}

async fn handle_vv(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &SpeakerBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(subcommand) = command.data.options.first() else {
        return respond(ctx, command, render_help(), true).await;
    };
    let options: &[CommandDataOption] = match &subcommand.value {
        CommandDataOptionValue::SubCommand(options) => options,
        _ => &[],
    };
    let option = |name: &str| {
        options
            .iter()
            .find(|opt| opt.name == name)
            .map(|opt| &opt.value)
    };

    match subcommand.name.as_str() {
        "help" => respond(ctx, command, render_help(), true).await,
        "voice" => {
            let speaker = option("speaker").and_then(|v| v.as_str()).unwrap_or_default();
            let style = option("style").and_then(|v| v.as_str()).unwrap_or_default();
            let profile = bot.service.set_voice(guild_id, speaker, style);
            respond(
                ctx,
                command,
                format!(
                    "🎙️ 声を `{} / {}` に切替えました。",
                    profile.speaker_name, profile.style_name
                ),
                false,
            )
            .await
        }
        "reset" => {
            bot.service.reset_params(guild_id);
            respond(ctx, command, "♻️ パラメータを初期プリセットにリセットしました。", false).await
        }
        "show" => {
            let profile = bot.service.show_params(guild_id);
            respond(ctx, command, render_profile(&profile), true).await
        }
        "speakers" => {
            defer(ctx, command).await?;
            let reply = match bot.service.speakers().await {
                Ok(speakers) => render_speakers(&speakers),
                Err(e) => render_error(&e),
            };
            edit(ctx, command, reply).await
        }
        name => {
            let Some(value) = option("value").and_then(|v| v.as_f64()) else {
                return respond(ctx, command, render_help(), true).await;
            };
            let reply = match bot.service.set_param(guild_id, name, value) {
                Ok((kind, effective)) => render_param(kind, effective),
                Err(e) => render_error(&e),
            };
            respond(ctx, command, reply, false).await
        }
    }
}

// Funciones auxiliares

async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;

    Ok(())
}

async fn defer(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, content: String) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

// Respuestas

fn render_join(outcome: &JoinOutcome) -> String {
    if outcome.reused {
        format!("✅ すでに <#{}> に接続済みです。", outcome.session.channel_id)
    } else {
        format!("🔊 <#{}> に接続しました。", outcome.session.channel_id)
    }
}

fn render_say(outcome: &SayOutcome) -> String {
    let mut reply = String::from("📣");
    if outcome.pending > 1 {
        reply.push_str(&format!(" (待ち {} 件)", outcome.pending));
    }
    if outcome.truncated {
        reply.push_str(" ✂️ 長いので途中までにしました。");
    }
    reply
}

fn render_param(kind: ParamKind, value: f64) -> String {
    let icon = match kind {
        ParamKind::Speed => "⏩",
        ParamKind::Pitch => "🎵",
        ParamKind::Intonation => "📈",
        ParamKind::Volume => "🔊",
        ParamKind::PreSilence | ParamKind::PostSilence => "⏱️",
    };
    format!("{} {} = {}", icon, kind, value)
}

fn render_profile(profile: &VoiceProfile) -> String {
    let mut reply = format!(
        "🎙️ `{} / {}`",
        profile.speaker_name, profile.style_name
    );
    for kind in ParamKind::ALL {
        reply.push_str(&format!("\n・{} = {}", kind, profile.params.get(kind)));
    }
    reply
}

fn render_speakers(speakers: &[Speaker]) -> String {
    let mut reply = String::from("🎙️ 利用できる話者:");
    for speaker in speakers {
        let styles: Vec<&str> = speaker.styles.iter().map(|st| st.name.as_str()).collect();
        let line = format!("\n・{} ({})", speaker.name, styles.join(" / "));
        if reply.chars().count() + line.chars().count() > DISCORD_MESSAGE_LIMIT - 4 {
            reply.push_str("\n…");
            break;
        }
        reply.push_str(&line);
    }
    reply
}

fn render_help() -> String {
    let mut help = String::from("VOICEVOX設定:\n`/vv voice <speaker> <style>`");
    for kind in [ParamKind::Speed, ParamKind::Pitch, ParamKind::Intonation, ParamKind::Volume] {
        let (min, max) = kind.range();
        help.push_str(&format!(" / `/vv {} <{}-{}>`", kind, min, max));
    }
    help.push_str(" / `/vv reset` / `/vv show` / `/vv speakers`\n例) `/vv voice 春日部つむぎ ノーマル`");
    help
}

fn render_error(error: &CommandError) -> String {
    match error {
        CommandError::NotInVoiceChannel => "VCに入ってから呼んでください。".to_string(),
        CommandError::NotConnected => "先に `/join` でVCに入れてください。".to_string(),
        CommandError::EmptyText => "読み上げるテキストがありません。".to_string(),
        CommandError::UnknownParameter(name) => format!("❌ 不明なパラメータです: `{}`", name),
        CommandError::Connect(e) => format!(
            "❌ VCに接続できませんでした（{}回試行）。少し待ってからもう一度お試しください。",
            e.attempts
        ),
        CommandError::Synthesis(e) => format!("❌ 音声合成に失敗しました: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::transport::VoiceSession,
        error::{ConnectError, TransportError},
        tts::client::SpeakerStyle,
    };

    #[test]
    fn test_render_join() {
        let session = VoiceSession {
            guild_id: GuildId::new(1),
            channel_id: ChannelId::new(77),
            generation: 1,
        };
        let fresh = JoinOutcome {
            session,
            reused: false,
            driver_started: true,
        };
        assert_eq!(render_join(&fresh), "🔊 <#77> に接続しました。");
        assert!(render_join(&JoinOutcome { reused: true, ..fresh }).contains("すでに"));
    }

    #[test]
    fn test_render_say_mentions_backlog_and_truncation() {
        let outcome = SayOutcome {
            sequence: 3,
            pending: 1,
            truncated: false,
        };
        assert_eq!(render_say(&outcome), "📣");

        let busy = SayOutcome {
            pending: 4,
            truncated: true,
            ..outcome
        };
        let reply = render_say(&busy);
        assert!(reply.contains("待ち 4 件"));
        assert!(reply.contains("途中まで"));
    }

    #[test]
    fn test_render_param() {
        assert_eq!(render_param(ParamKind::Speed, 2.0), "⏩ speed = 2");
        assert_eq!(render_param(ParamKind::Pitch, -0.5), "🎵 pitch = -0.5");
    }

    #[test]
    fn test_render_speakers_respects_message_limit() {
        let speakers: Vec<Speaker> = (0..500)
            .map(|i| Speaker {
                name: format!("話者{}", i),
                styles: vec![SpeakerStyle {
                    name: "ノーマル".to_string(),
                    id: i,
                }],
            })
            .collect();

        let reply = render_speakers(&speakers);
        assert!(reply.chars().count() <= DISCORD_MESSAGE_LIMIT);
        assert!(reply.ends_with('…'));
    }

    #[test]
    fn test_render_error_for_connect_failure() {
        let err = CommandError::Connect(ConnectError {
            last_cause: TransportError::Timeout,
            attempts: 4,
        });
        assert!(render_error(&err).contains("4回試行"));
    }

    #[test]
    fn test_help_lists_parameter_ranges() {
        let help = render_help();
        assert!(help.contains("/vv speed <0.5-2>"));
        assert!(help.contains("/vv pitch <-1-1>"));
    }
}
