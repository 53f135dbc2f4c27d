use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::tts::params::ParamKind;

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![join_command(), leave_command(), say_command(), vv_command()]
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("呼んだ人のVCに参加します")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("VCから退出します")
}

// Lectura

fn say_command() -> CreateCommand {
    CreateCommand::new("say")
        .description("テキストを合成して読み上げキューに追加します")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "text", "読み上げるテキスト")
                .max_length(2000)
                .required(true),
        )
}

// Configuración de VOICEVOX

fn vv_command() -> CreateCommand {
    CreateCommand::new("vv")
        .description("VOICEVOXの設定")
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "help",
            "設定コマンドの一覧を表示します",
        ))
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "voice", "話者とスタイルを切り替えます")
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "speaker", "話者名 (例: 春日部つむぎ)")
                        .required(true),
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "style", "スタイル名 (例: ノーマル)")
                        .required(true),
                ),
        )
        .add_option(param_subcommand(ParamKind::Speed, "話速"))
        .add_option(param_subcommand(ParamKind::Pitch, "音高"))
        .add_option(param_subcommand(ParamKind::Intonation, "抑揚"))
        .add_option(param_subcommand(ParamKind::Volume, "音量"))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "reset",
            "パラメータを初期プリセットに戻します",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "show",
            "現在の声とパラメータを表示します",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "speakers",
            "利用できる話者の一覧を表示します",
        ))
}

fn param_subcommand(kind: ParamKind, label: &str) -> CreateCommandOption {
    let (min, max) = kind.range();
    CreateCommandOption::new(
        CommandOptionType::SubCommand,
        kind.name(),
        format!("{}を設定します ({} 〜 {})", label, min, max),
    )
    .add_sub_option(
        CreateCommandOption::new(CommandOptionType::Number, "value", format!("{} 〜 {}", min, max))
            .required(true),
    )
}
