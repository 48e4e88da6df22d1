use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use super::i18n::{tr, Locale, Text};
use crate::{
    audio::{
        queue::{PlaybackStatus, QueuePage, QueuePosition, QueueSnapshot},
        track::{format_duration, Track},
        worker::Added,
    },
    error::QueueError,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Jukebox";

pub const ITEMS_PER_PAGE: usize = 10;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track, status: PlaybackStatus, locale: Locale) -> CreateEmbed {
    let title = match status {
        PlaybackStatus::Paused => Text::PausedTitle,
        _ => Text::NowPlayingTitle,
    };

    CreateEmbed::default()
        .title(title.get(locale))
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field(Text::DurationField.get(locale), track_duration(track, locale), true)
        .field(
            Text::RequestedByField.get(locale),
            format!("<@{}>", track.requested_by()),
            true,
        )
        .field(
            Text::AddedAtField.get(locale),
            format!("<t:{}:R>", track.added_at().timestamp()),
            true,
        )
        .url(track.source())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(added: &Added, locale: Locale) -> CreateEmbed {
    let track = &added.track;
    let (title, footer) = match added.position {
        QueuePosition::NowPlaying => (Text::NowPlayingTitle, STANDARD_FOOTER.to_string()),
        QueuePosition::Pending(position) => (
            Text::TrackAddedTitle,
            tr(locale, Text::QueuePositionFooter, &[("position", &position)]),
        ),
    };

    CreateEmbed::default()
        .title(title.get(locale))
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN)
        .field(Text::DurationField.get(locale), track_duration(track, locale), true)
        .field(
            Text::RequestedByField.get(locale),
            format!("<@{}>", track.requested_by()),
            true,
        )
        .url(track.source())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot, page: usize, locale: Locale) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(Text::QueueTitle.get(locale))
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.pending.is_empty() {
        return embed
            .description(Text::QueueEmpty.get(locale))
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.current {
        embed = embed.field(
            format!("{} {}", status_emoji(snapshot.status), Text::PlayingField.get(locale)),
            format!("**{}** `[{}]`", current.title(), track_duration(current, locale)),
            false,
        );
    }

    let queue_page = snapshot.get_page(page, ITEMS_PER_PAGE);
    if !queue_page.items.is_empty() {
        embed = embed.field(
            Text::UpNextField.get(locale),
            queue_lines(&queue_page, locale),
            false,
        );
    }

    embed = embed.field(Text::InfoField.get(locale), summary_line(snapshot, locale), false);

    if let Some(reason) = &snapshot.last_error {
        embed = embed.field(Text::LastErrorField.get(locale), reason, false);
    }

    let footer = if queue_page.total_pages > 1 {
        tr(
            locale,
            Text::PageFooter,
            &[
                ("page", &queue_page.current_page),
                ("pages", &queue_page.total_pages),
            ],
        )
    } else {
        STANDARD_FOOTER.to_string()
    };

    embed
        .footer(CreateEmbedFooter::new(footer))
        .timestamp(Timestamp::now())
}

/// Aviso de una pista que no se pudo reproducir
pub fn create_track_failed_embed(track: &Track, reason: &str, locale: Locale) -> CreateEmbed {
    CreateEmbed::default()
        .title(Text::TrackSkippedTitle.get(locale))
        .description(tr(
            locale,
            Text::TrackFailedDescription,
            &[("title", &track.title())],
        ))
        .field(Text::ReasonField.get(locale), reason, false)
        .color(colors::WARNING_ORANGE)
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

/// Mensaje para el usuario según el error de la cola
pub fn error_message(err: &QueueError, locale: Locale) -> String {
    match err {
        QueueError::OutOfRange { position, len } if *len == 0 => {
            tr(locale, Text::OutOfRangeEmpty, &[("position", position)])
        }
        QueueError::OutOfRange { position, len } => {
            tr(locale, Text::OutOfRange, &[("position", position), ("len", len)])
        }
        QueueError::InvalidState { status } => match status {
            PlaybackStatus::Idle => Text::NothingPlaying,
            PlaybackStatus::Playing => Text::NotPaused,
            PlaybackStatus::Paused => Text::AlreadyPaused,
        }
        .get(locale)
        .to_string(),
        QueueError::NotFound(query) => tr(locale, Text::NotFound, &[("query", query)]),
        QueueError::Resolution(reason) => tr(locale, Text::ResolutionFailed, &[("reason", reason)]),
        QueueError::Driver(reason) => tr(locale, Text::DriverFailed, &[("reason", reason)]),
        QueueError::QueueFull { max } => tr(locale, Text::QueueFull, &[("max", max)]),
        QueueError::Cancelled => Text::Cancelled.get(locale).to_string(),
        QueueError::Closed => Text::Closed.get(locale).to_string(),
    }
}

/// Líneas numeradas de una página de la cola
pub fn queue_lines(page: &QueuePage, locale: Locale) -> String {
    page.items
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "**{}**. {} `[{}]`\n",
                page.first_position + i,
                track.title(),
                track_duration(track, locale)
            )
        })
        .collect()
}

fn summary_line(snapshot: &QueueSnapshot, locale: Locale) -> String {
    let mut info = tr(
        locale,
        Text::PendingSummary,
        &[("count", &snapshot.pending.len())],
    );

    if snapshot.total_duration > Duration::ZERO {
        info.push_str(&tr(
            locale,
            Text::DurationSummary,
            &[("duration", &format_duration(snapshot.total_duration))],
        ));
    }

    if let Some(last) = &snapshot.last_played {
        info.push_str(&tr(
            locale,
            Text::LastPlayedSummary,
            &[("title", &last.title()), ("count", &snapshot.history_len)],
        ));
    }

    info
}

fn track_duration(track: &Track, locale: Locale) -> String {
    track
        .format_duration()
        .unwrap_or_else(|| Text::Live.get(locale).to_string())
}

fn status_emoji(status: PlaybackStatus) -> &'static str {
    match status {
        PlaybackStatus::Playing => "▶️",
        PlaybackStatus::Paused => "⏸️",
        PlaybackStatus::Idle => "⏹️",
    }
}
