use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{engine::QueueSnapshot, error::PlaybackError},
    bot::JukeboxBot,
    sources::{self, spotify, CatalogError},
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Sólo /stats funciona mientras otra guild usa el bot
    if command.data.name != "stats" && bot.serves_other_guild(guild_id) {
        warn!("🚫 Guild {} rechazada: la sesión pertenece a otra", guild_id);
        return respond(ctx, &command, guild_busy_embed()).await;
    }

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "playlist" => handle_playlist(ctx, &command, bot, guild_id).await?,
        "pause" => handle_pause(ctx, &command, bot, guild_id).await?,
        "resume" => handle_resume(ctx, &command, bot, guild_id).await?,
        "skip" => handle_skip(ctx, &command, bot, guild_id).await?,
        "skipto" => handle_skipto(ctx, &command, bot, guild_id).await?,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "disconnect" => handle_disconnect(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "stats" => handle_stats(ctx, &command, bot).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Comando no reconocido")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, playback_error_embed(&PlaybackError::NotInChannel)).await;
    };

    // Defer la respuesta ya que la descarga puede tomar tiempo
    defer(ctx, command).await?;

    let session = match bot.session(ctx, guild_id).await {
        Ok(session) => session,
        Err(e) => return edit(ctx, command, session_error_embed(&e)).await,
    };
    session
        .engine
        .bind_channels(voice_channel, Some(command.channel_id));

    let embed = match session.engine.enqueue(query).await {
        Ok(queued) => embeds::create_track_added_embed(
            &queued.entry,
            queued.position,
            queued.started_immediately(),
        ),
        Err(e) => playback_error_embed(&e),
    };

    edit(ctx, command, embed).await
}

async fn handle_playlist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let url = string_option(command, "url")
        .ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?;

    let Some(catalog) = bot.catalog() else {
        return respond(ctx, command, spotify_disabled_embed()).await;
    };

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, playback_error_embed(&PlaybackError::NotInChannel)).await;
    };

    defer(ctx, command).await?;

    let tracks = match sources::playlist_queries(&**catalog, url).await {
        Ok(tracks) => tracks,
        Err(CatalogError::EmptyPlaylist) => {
            return edit(
                ctx,
                command,
                embeds::create_error_embed("Playlist vacía", "No se encontraron canciones en la playlist."),
            )
            .await;
        }
        Err(e) => {
            warn!("Error cargando playlist {}: {}", url, e);
            return edit(
                ctx,
                command,
                embeds::create_error_embed("Error cargando playlist", &e.to_string()),
            )
            .await;
        }
    };

    let session = match bot.session(ctx, guild_id).await {
        Ok(session) => session,
        Err(e) => return edit(ctx, command, session_error_embed(&e)).await,
    };
    session
        .engine
        .bind_channels(voice_channel, Some(command.channel_id));

    let embed = match session.engine.enqueue_many(tracks).await {
        Ok(batch) => {
            let link = spotify::playlist_link(url);
            embeds::create_playlist_added_embed(batch.added, link.as_deref(), batch.started.as_ref())
        }
        Err(e) => playback_error_embed(&e),
    };

    edit(ctx, command, embed).await
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match bot.existing_session(guild_id) {
        Some(session) => session.engine.pause().await,
        None => Err(PlaybackError::NothingPlaying),
    };

    let embed = match result {
        Ok(()) => embeds::create_success_embed("⏸️ Pausado", "Usa `/resume` para continuar."),
        Err(e) => playback_error_embed(&e),
    };

    respond(ctx, command, embed).await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match bot.existing_session(guild_id) {
        Some(session) => session.engine.resume().await,
        None => Err(PlaybackError::NothingPaused),
    };

    let embed = match result {
        Ok(()) => embeds::create_success_embed("▶️ Reanudado", "La reproducción continúa."),
        Err(e) => playback_error_embed(&e),
    };

    respond(ctx, command, embed).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match bot.existing_session(guild_id) {
        Some(session) => session.engine.skip_current().await,
        None => Err(PlaybackError::NothingPlaying),
    };

    let embed = match result {
        Ok(skipped) => {
            embeds::create_success_embed("⏭️ Saltada", &format!("**{}**", skipped.query))
        }
        Err(PlaybackError::NothingPlaying) => embeds::create_warning_embed("No hay nada que saltar."),
        Err(e) => playback_error_embed(&e),
    };

    respond(ctx, command, embed).await
}

async fn handle_skipto(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let target = string_option(command, "target")
        .ok_or_else(|| anyhow::anyhow!("Destino no proporcionado"))?;

    let Some(session) = bot.existing_session(guild_id) else {
        return respond(
            ctx,
            command,
            playback_error_embed(&PlaybackError::NotFound(target.to_string())),
        )
        .await;
    };

    // Si no suena nada, saltar arranca una descarga
    defer(ctx, command).await?;

    let embed = match session.engine.skip_to(target).await {
        Ok(skipped) => embeds::create_success_embed(
            "⏭️ Saltando",
            &format!(
                "Siguiente: **{}** ({} descartadas)",
                skipped.target.query, skipped.discarded
            ),
        ),
        Err(e) => playback_error_embed(&e),
    };

    edit(ctx, command, embed).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    if let Some(session) = bot.existing_session(guild_id) {
        session.engine.stop_and_clear().await;
    }

    respond(
        ctx,
        command,
        embeds::create_success_embed("⏹️ Detenido", "Reproducción detenida y cola limpiada."),
    )
    .await
}

async fn handle_disconnect(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let result = match bot.existing_session(guild_id) {
        Some(session) => session.engine.disconnect().await,
        None => Err(PlaybackError::NotConnected),
    };

    let embed = match result {
        Ok(()) => embeds::create_success_embed("👋 Desconectado", "Salí del canal de voz."),
        Err(e) => playback_error_embed(&e),
    };

    respond(ctx, command, embed).await
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = bot
        .existing_session(guild_id)
        .map(|session| session.engine.snapshot())
        .unwrap_or_else(QueueSnapshot::empty);

    respond(
        ctx,
        command,
        embeds::create_queue_embed(&snapshot, bot.config().queue_display_limit),
    )
    .await
}

async fn handle_stats(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let url = string_option(command, "url")
        .ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?;

    let Some(catalog) = bot.catalog() else {
        return respond(ctx, command, spotify_disabled_embed()).await;
    };

    defer(ctx, command).await?;

    let embed = match catalog.stats_of(url).await {
        Ok(stats) => embeds::create_stats_embed(&stats),
        Err(e) => embeds::create_error_embed("Error", &e.to_string()),
    };

    edit(ctx, command, embed).await
}

// Funciones auxiliares

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Estados que no son fallos se muestran como advertencia
fn is_soft_error(error: &PlaybackError) -> bool {
    matches!(
        error,
        PlaybackError::NothingPlaying
            | PlaybackError::NothingPaused
            | PlaybackError::NotConnected
            | PlaybackError::AlreadyInProgress
    )
}

fn playback_error_embed(error: &PlaybackError) -> CreateEmbed {
    let message = capitalize(&error.to_string());
    if is_soft_error(error) {
        embeds::create_warning_embed(&format!("{}.", message))
    } else {
        embeds::create_error_embed("Error", &format!("{}.", message))
    }
}

fn guild_busy_embed() -> CreateEmbed {
    embeds::create_error_embed(
        "Bot ocupado",
        "El bot ya está en uso en otro servidor. Intenta más tarde.",
    )
}

fn session_error_embed(error: &anyhow::Error) -> CreateEmbed {
    warn!("No se pudo obtener la sesión: {:?}", error);
    embeds::create_error_embed("Sesión no disponible", &capitalize(&error.to_string()))
}

fn spotify_disabled_embed() -> CreateEmbed {
    embeds::create_error_embed(
        "Spotify no configurado",
        "Define SPOTIFY_CLIENT_ID y SPOTIFY_CLIENT_SECRET para usar playlists.",
    )
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
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

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn control_states_are_warnings_not_failures() {
        assert!(is_soft_error(&PlaybackError::NothingPlaying));
        assert!(is_soft_error(&PlaybackError::NotConnected));
        assert!(!is_soft_error(&PlaybackError::NotInChannel));
        assert!(!is_soft_error(&PlaybackError::Connection("timeout".to_string())));
        assert!(!is_soft_error(&PlaybackError::NotFound("x".to_string())));
    }

    #[test]
    fn capitalize_handles_accents_and_empty() {
        assert_eq!(capitalize("no hay nada"), "No hay nada");
        assert_eq!(capitalize("él"), "Él");
        assert_eq!(capitalize(""), "");
    }
}
