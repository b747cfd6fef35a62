use chrono::{DateTime, Utc};
use num_format::{Locale, ToFormattedString};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{engine::QueueSnapshot, queue::QueueEntry, session::PlaybackPhase},
    sources::PlaylistStats,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Open Jukebox";

/// Artistas que muestra `/stats` antes de cortar con "..."
pub const STATS_ARTIST_LIMIT: usize = 5;

/// Crea un embed para anunciar la canción que empieza a sonar
pub fn create_now_playing_embed(entry: &QueueEntry) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", entry.query))
        .color(colors::SUCCESS_GREEN)
        .field("⏳ Esperó en cola", format_wait(entry.added_at, Utc::now()), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Respuesta de `/play`
pub fn create_track_added_embed(entry: &QueueEntry, position: usize, started: bool) -> CreateEmbed {
    if started {
        return CreateEmbed::default()
            .title("🎵 Reproduciendo")
            .description(format!("**{}**", entry.query))
            .color(colors::SUCCESS_GREEN)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** (Posición: {})", entry.query, position))
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando llegue su turno",
        ))
}

/// Respuesta de `/playlist`
pub fn create_playlist_added_embed(
    track_count: usize,
    playlist_link: Option<&str>,
    started: Option<&QueueEntry>,
) -> CreateEmbed {
    let mut description = if track_count == 1 {
        "Se agregó **1 canción** de la playlist a la cola".to_string()
    } else {
        format!(
            "Se agregaron **{} canciones** de la playlist a la cola",
            track_count.to_formatted_string(&Locale::es)
        )
    };

    if let Some(entry) = started {
        description.push_str(&format!("\n\n🎵 Reproduciendo: **{}**", entry.query));
    }

    let embed = CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    // Discord rechaza embeds con URLs que no sean http(s)
    match playlist_link {
        Some(link) => embed.url(link),
        None => embed,
    }
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, limit: usize) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.now_playing.is_none() && snapshot.pending.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let mut embed = embed;

    if let Some(current) = &snapshot.now_playing {
        let status = match snapshot.phase {
            PlaybackPhase::Paused => "⏸️ En pausa",
            PlaybackPhase::Downloading | PlaybackPhase::Connecting => "⬇️ Preparando",
            _ => "▶️ Reproduciendo",
        };
        embed = embed.field(status, format!("**{}**", current.query), false);
    }

    let upcoming = if snapshot.pending.is_empty() {
        "No hay canciones en cola.".to_string()
    } else {
        format_queue_listing(&snapshot.pending, limit)
    };

    embed
        .field("Próximas canciones", upcoming, false)
        .footer(CreateEmbedFooter::new(format!(
            "Total: {} en cola • Open Jukebox",
            snapshot.pending.len()
        )))
        .timestamp(Timestamp::now())
}

/// Crea un embed con las estadísticas de una playlist
pub fn create_stats_embed(stats: &PlaylistStats) -> CreateEmbed {
    let artists = if stats.artists.is_empty() {
        "Desconocidos".to_string()
    } else {
        format_top_artists(&stats.artists, STATS_ARTIST_LIMIT)
    };

    CreateEmbed::default()
        .title("🎧 Estadísticas de Playlist")
        .description(format!("**{}**", stats.name))
        .color(colors::MUSIC_PURPLE)
        .field(
            "🎵 Canciones",
            stats.total.to_formatted_string(&Locale::es),
            true,
        )
        .field("⏱️ Duración", format_minutes(stats.duration_minutes), true)
        .field("🎤 Artistas principales", artists, false)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia (estado que no es un fallo)
pub fn create_warning_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .description(format!("⚠️ {}", description))
        .color(colors::WARNING_ORANGE)
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Aviso corto para una canción que no se pudo reproducir
pub fn format_skipped_notice(entry: &QueueEntry, reason: &str) -> String {
    format!("⏭️ No se pudo reproducir **{}**: {}", entry.query, reason)
}

/// Líneas numeradas de la cola, cortadas en `limit`
pub fn format_queue_listing(pending: &[QueueEntry], limit: usize) -> String {
    let mut listing = String::new();

    for (i, entry) in pending.iter().take(limit).enumerate() {
        listing.push_str(&format!("**{}**. {}\n", i + 1, entry.query));
    }

    if pending.len() > limit {
        listing.push_str(&format!(
            "... y {} canciones más",
            pending.len() - limit
        ));
    }

    listing
}

/// Primeros `max` artistas separados por coma, con "..." si hay más
pub fn format_top_artists(artists: &[String], max: usize) -> String {
    let shown = artists
        .iter()
        .take(max)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    if artists.len() > max {
        format!("{}...", shown)
    } else {
        shown
    }
}

fn format_minutes(minutes: u64) -> String {
    format!("{} min", minutes.to_formatted_string(&Locale::es))
}

/// Cuánto esperó una entrada, redondeado a segundos
fn format_wait(added_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - added_at).num_seconds().max(0) as u64;
    humantime::format_duration(Duration::from_secs(seconds)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entries(queries: &[&str]) -> Vec<QueueEntry> {
        queries
            .iter()
            .enumerate()
            .map(|(i, q)| QueueEntry {
                query: q.to_string(),
                seq: i as u64,
                added_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn queue_listing_truncates_with_remainder() {
        let names: Vec<String> = (1..=13).map(|i| format!("song {}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let listing = format_queue_listing(&entries(&refs), 10);

        assert!(listing.starts_with("**1**. song 1\n"));
        assert!(listing.contains("**10**. song 10\n"));
        assert!(!listing.contains("song 11"));
        assert!(listing.ends_with("... y 3 canciones más"));
    }

    #[test]
    fn queue_listing_without_overflow_has_no_remainder() {
        let listing = format_queue_listing(&entries(&["a", "b"]), 10);
        assert_eq!(listing, "**1**. a\n**2**. b\n");
    }

    #[test]
    fn top_artists_are_capped() {
        let artists: Vec<String> = ["A", "B", "C", "D", "E", "F"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(format_top_artists(&artists, 5), "A, B, C, D, E...");
        assert_eq!(format_top_artists(&artists[..5], 5), "A, B, C, D, E");
    }

    #[test]
    fn minutes_use_spanish_grouping() {
        assert_eq!(format_minutes(12_345), "12.345 min");
        assert_eq!(format_minutes(42), "42 min");
    }

    #[test]
    fn wait_is_rounded_to_seconds() {
        let now = Utc::now();
        let added = now - chrono::Duration::milliseconds(90_500);
        assert_eq!(format_wait(added, now), "1m 30s");
        assert_eq!(format_wait(now, added), "0s");
    }

    #[test]
    fn playlist_embed_only_links_web_urls() {
        let linked = serde_json::to_value(create_playlist_added_embed(
            2,
            Some("https://open.spotify.com/playlist/xyz"),
            None,
        ))
        .unwrap();
        assert_eq!(linked["url"], "https://open.spotify.com/playlist/xyz");

        let bare = serde_json::to_value(create_playlist_added_embed(2, None, None)).unwrap();
        assert!(bare.get("url").map_or(true, |url| url.is_null()));
    }
}
