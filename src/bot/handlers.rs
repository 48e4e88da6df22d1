use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::worker::Added,
    bot::JukeboxBot,
    error::QueueError,
    ui::{
        embeds,
        i18n::{tr, Languages, Locale, Text},
    },
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    // El idioma personal también se puede cambiar por mensaje directo
    if command.data.name == "language" {
        return handle_language(ctx, &command, bot).await;
    }

    let Some(guild_id) = command.guild_id else {
        let locale = bot.languages.resolve(command.user.id, None);
        return reply_ephemeral(ctx, &command, Text::ServerOnly.get(locale)).await;
    };
    let locale = bot.languages.resolve(command.user.id, Some(guild_id));

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id, locale, false).await?,
        "playnext" => handle_play(ctx, &command, bot, guild_id, locale, true).await?,
        "pause" => {
            let result = bot.registry.pause(guild_id).await;
            respond(ctx, &command, locale, result.map(|_| Text::Paused.get(locale).to_string()))
                .await?
        }
        "resume" => {
            let result = bot.registry.resume(guild_id).await;
            respond(ctx, &command, locale, result.map(|_| Text::Resumed.get(locale).to_string()))
                .await?
        }
        "skip" => {
            let result = bot.registry.skip(guild_id).await.map(|skipped| match skipped {
                Some(track) => tr(locale, Text::Skipped, &[("title", &track.title())]),
                None => Text::NothingPlayingNow.get(locale).to_string(),
            });
            respond(ctx, &command, locale, result).await?
        }
        "stop" => {
            bot.forget_voice_target(guild_id);
            let result = bot
                .registry
                .stop(guild_id)
                .await
                .map(|dropped| tr(locale, Text::Stopped, &[("count", &dropped)]));
            respond(ctx, &command, locale, result).await?
        }
        "clear" => {
            let result = bot
                .registry
                .clear(guild_id)
                .await
                .map(|cleared| tr(locale, Text::Cleared, &[("count", &cleared)]));
            respond(ctx, &command, locale, result).await?
        }
        "shuffle" => {
            let result = bot.registry.shuffle(guild_id).await;
            respond(ctx, &command, locale, result.map(|_| Text::Shuffled.get(locale).to_string()))
                .await?
        }
        "remove" => {
            let position = position_option(&command, "position");
            let result = bot
                .registry
                .remove_at(guild_id, position)
                .await
                .map(|track| tr(locale, Text::Removed, &[("title", &track.title())]));
            respond(ctx, &command, locale, result).await?
        }
        "move" => {
            let from = position_option(&command, "from");
            let to = position_option(&command, "to");
            let result = bot
                .registry
                .move_track(guild_id, from, to)
                .await
                .map(|_| tr(locale, Text::Moved, &[("from", &from), ("to", &to)]));
            respond(ctx, &command, locale, result).await?
        }
        "queue" => handle_queue(ctx, &command, bot, guild_id, locale).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id, locale).await?,
        _ => reply_ephemeral(ctx, &command, Text::UnknownCommand.get(locale)).await?,
    }

    Ok(())
}

/// Por qué un `/play` no llegó a agregar nada.
#[derive(Debug)]
enum PlayError {
    NoVoiceChannel,
    JoinFailed(anyhow::Error),
    Queue(QueueError),
}

impl PlayError {
    /// Título y descripción del embed de error.
    fn message(&self, locale: Locale) -> (&'static str, String) {
        match self {
            PlayError::NoVoiceChannel => (
                Text::NoVoiceChannelTitle.get(locale),
                Text::NeedVoiceChannel.get(locale).to_string(),
            ),
            PlayError::JoinFailed(_) => (
                Text::VoiceJoinFailedTitle.get(locale),
                Text::VoiceJoinFailed.get(locale).to_string(),
            ),
            PlayError::Queue(e) => (
                Text::AddFailedTitle.get(locale),
                embeds::error_message(e, locale),
            ),
        }
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
    locale: Locale,
    next: bool,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?
        .to_string();

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    // Desde aquí toda salida edita la respuesta diferida
    let embed = match play(ctx, command, bot, guild_id, &query, next).await {
        Ok(added) => embeds::create_track_added_embed(&added, locale),
        Err(e) => {
            if let PlayError::JoinFailed(cause) = &e {
                warn!("No se pudo entrar a voz en guild {}: {:?}", guild_id, cause);
            }
            let (title, description) = e.message(locale);
            embeds::create_error_embed(title, &description)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
    query: &str,
    next: bool,
) -> Result<Added, PlayError> {
    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)
        .ok_or(PlayError::NoVoiceChannel)?;

    bot.ensure_voice(ctx, guild_id, voice_channel_id)
        .await
        .map_err(PlayError::JoinFailed)?;
    bot.announce_in(guild_id, command.channel_id);

    let added = if next {
        bot.registry.enqueue_next(guild_id, query, command.user.id).await
    } else {
        bot.registry.enqueue(guild_id, query, command.user.id).await
    };

    added.map_err(PlayError::Queue)
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
    locale: Locale,
) -> Result<()> {
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64())
        .unwrap_or(1)
        .max(1) as usize;

    let snapshot = bot.registry.status(guild_id).await?;
    let embed = embeds::create_queue_embed(&snapshot, page, locale);

    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
    locale: Locale,
) -> Result<()> {
    let snapshot = bot.registry.status(guild_id).await?;

    let message = match &snapshot.current {
        Some(current) => CreateInteractionResponseMessage::new()
            .embed(embeds::create_now_playing_embed(current, snapshot.status, locale)),
        None => CreateInteractionResponseMessage::new()
            .content(Text::NothingPlayingNow.get(locale))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

async fn handle_language(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let code = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "language")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default();
    let personal = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "personal")
        .and_then(|opt| opt.value.as_bool())
        .unwrap_or(true);
    let can_manage_guild = command
        .member
        .as_ref()
        .and_then(|member| member.permissions)
        .is_some_and(|permissions| permissions.manage_guild());

    let (content, ephemeral) = set_language(
        &bot.languages,
        command.user.id,
        command.guild_id,
        code,
        personal,
        can_manage_guild,
    );

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

/// Aplica un `/language` y devuelve la respuesta y si es sólo para el usuario.
///
/// El idioma del servidor pide el permiso de gestionar el servidor.
fn set_language(
    languages: &Languages,
    user_id: UserId,
    guild_id: Option<GuildId>,
    code: &str,
    personal: bool,
    can_manage_guild: bool,
) -> (String, bool) {
    let current = languages.resolve(user_id, guild_id);
    let locale: Locale = match code.parse() {
        Ok(locale) => locale,
        Err(_) => {
            let available = Locale::available();
            return (
                tr(current, Text::InvalidLanguage, &[("languages", &available)]),
                true,
            );
        }
    };

    if personal {
        languages.set_user(user_id, locale);
        info!("🌐 Usuario {} cambió su idioma a {}", user_id, locale);
        return (
            tr(locale, Text::LanguageSetPersonal, &[("language", &locale.name())]),
            true,
        );
    }

    let Some(guild_id) = guild_id else {
        return (Text::ServerOnly.get(current).to_string(), true);
    };
    if !can_manage_guild {
        return (Text::NeedManageGuild.get(current).to_string(), true);
    }

    languages.set_guild(guild_id, locale);
    info!("🌐 Guild {} cambió su idioma a {}", guild_id, locale);
    (
        tr(locale, Text::LanguageSetGuild, &[("language", &locale.name())]),
        false,
    )
}

// Funciones auxiliares

/// Responde con `content`, o con un embed de error visible solo para el
/// usuario.
async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    locale: Locale,
    result: Result<String, QueueError>,
) -> Result<()> {
    let message = match result {
        Ok(content) => CreateInteractionResponseMessage::new().content(content),
        Err(e) => CreateInteractionResponseMessage::new()
            .embed(embeds::create_error_embed(
                Text::ErrorTitle.get(locale),
                &embeds::error_message(&e, locale),
            ))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;

    Ok(())
}

/// Posición 1-based; valores negativos quedan en 0 y la cola los rechaza.
fn position_option(command: &CommandInteraction, name: &str) -> usize {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(0)
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
