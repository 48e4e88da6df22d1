//! User-facing text in every supported language.
//!
//! Responses are looked up through [`Languages`]: a user's own choice wins
//! over the guild's, which wins over the configured default. Nothing is
//! persisted; preferences live as long as the process.

use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    #[default]
    Es,
    En,
}

impl Locale {
    pub const ALL: [Locale; 2] = [Locale::Es, Locale::En];

    pub fn code(self) -> &'static str {
        match self {
            Locale::Es => "es",
            Locale::En => "en",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Locale::Es => "Español",
            Locale::En => "English",
        }
    }

    /// Códigos aceptados, separados por coma.
    pub fn available() -> String {
        Self::ALL
            .iter()
            .map(|locale| locale.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("idioma no soportado: {0}")]
pub struct UnknownLocale(pub String);

impl FromStr for Locale {
    type Err = UnknownLocale;

    /// Acepta el código corto o una variante regional (`es-ES`, `en_US`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lang = s
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match lang.as_str() {
            "es" => Ok(Locale::Es),
            "en" => Ok(Locale::En),
            _ => Err(UnknownLocale(s.to_string())),
        }
    }
}

/// Idioma elegido por cada usuario y cada guild.
#[derive(Debug)]
pub struct Languages {
    users: DashMap<UserId, Locale>,
    guilds: DashMap<GuildId, Locale>,
    default: Locale,
}

impl Languages {
    pub fn new(default: Locale) -> Self {
        Self {
            users: DashMap::new(),
            guilds: DashMap::new(),
            default,
        }
    }

    pub fn set_user(&self, user_id: UserId, locale: Locale) {
        self.users.insert(user_id, locale);
    }

    pub fn set_guild(&self, guild_id: GuildId, locale: Locale) {
        self.guilds.insert(guild_id, locale);
    }

    /// Idioma de los avisos que no responden a nadie en particular.
    pub fn for_guild(&self, guild_id: GuildId) -> Locale {
        self.guilds
            .get(&guild_id)
            .map(|locale| *locale)
            .unwrap_or(self.default)
    }

    /// Idioma de la respuesta a `user_id`.
    pub fn resolve(&self, user_id: UserId, guild_id: Option<GuildId>) -> Locale {
        if let Some(locale) = self.users.get(&user_id) {
            return *locale;
        }
        match guild_id {
            Some(guild_id) => self.for_guild(guild_id),
            None => self.default,
        }
    }

    /// La guild ya no existe para el bot.
    pub fn forget_guild(&self, guild_id: GuildId) {
        self.guilds.remove(&guild_id);
    }
}

/// Textos traducibles. Los `{nombre}` se rellenan con [`tr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    // Embeds
    NowPlayingTitle,
    PausedTitle,
    DurationField,
    RequestedByField,
    AddedAtField,
    TrackAddedTitle,
    QueuePositionFooter,
    QueueTitle,
    QueueEmpty,
    PlayingField,
    UpNextField,
    InfoField,
    LastErrorField,
    PageFooter,
    PendingSummary,
    DurationSummary,
    LastPlayedSummary,
    Live,
    TrackSkippedTitle,
    TrackFailedDescription,
    ReasonField,
    DisconnectedTitle,
    DisconnectedDescription,
    ErrorTitle,

    // Errores de la cola
    OutOfRangeEmpty,
    OutOfRange,
    NothingPlaying,
    NotPaused,
    AlreadyPaused,
    NotFound,
    ResolutionFailed,
    DriverFailed,
    QueueFull,
    Cancelled,
    Closed,

    // Respuestas a comandos
    Paused,
    Resumed,
    Skipped,
    NothingPlayingNow,
    Stopped,
    Cleared,
    Shuffled,
    Removed,
    Moved,
    UnknownCommand,
    ServerOnly,
    NoVoiceChannelTitle,
    NeedVoiceChannel,
    VoiceJoinFailedTitle,
    VoiceJoinFailed,
    AddFailedTitle,
    InvalidLanguage,
    LanguageSetPersonal,
    LanguageSetGuild,
    NeedManageGuild,
}

impl Text {
    pub fn get(self, locale: Locale) -> &'static str {
        match locale {
            Locale::Es => self.es(),
            Locale::En => self.en(),
        }
    }

    fn es(self) -> &'static str {
        match self {
            Text::NowPlayingTitle => "🎵 Reproduciendo Ahora",
            Text::PausedTitle => "⏸️ En Pausa",
            Text::DurationField => "⏱️ Duración",
            Text::RequestedByField => "👤 Solicitado por",
            Text::AddedAtField => "🕒 Agregada",
            Text::TrackAddedTitle => "✅ Canción Agregada",
            Text::QueuePositionFooter => "📋 Posición {position} en la cola",
            Text::QueueTitle => "📋 Cola de Reproducción",
            Text::QueueEmpty => {
                "😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música"
            }
            Text::PlayingField => "Reproduciendo",
            Text::UpNextField => "Próximas canciones",
            Text::InfoField => "Información",
            Text::LastErrorField => "⚠️ Último error",
            Text::PageFooter => "Página {page} de {pages} • Jukebox",
            Text::PendingSummary => "**En espera:** {count} canciones",
            Text::DurationSummary => " • **Duración:** {duration}",
            Text::LastPlayedSummary => "\n**Última reproducida:** {title} ({count} en el historial)",
            Text::Live => "🔴 En vivo",
            Text::TrackSkippedTitle => "⚠️ Canción Saltada",
            Text::TrackFailedDescription => "No se pudo reproducir **{title}**",
            Text::ReasonField => "Motivo",
            Text::DisconnectedTitle => "Desconectado",
            Text::DisconnectedDescription => {
                "Se perdió la conexión de voz. La cola se conserva, usa `/play` para volver."
            }
            Text::ErrorTitle => "Error",

            Text::OutOfRangeEmpty => "La posición {position} no existe: no hay canciones en espera",
            Text::OutOfRange => "La posición {position} no existe, usa un número entre 1 y {len}",
            Text::NothingPlaying => "No hay nada reproduciéndose",
            Text::NotPaused => "La reproducción no está en pausa",
            Text::AlreadyPaused => "La reproducción ya está en pausa",
            Text::NotFound => "No se encontraron resultados para: {query}",
            Text::ResolutionFailed => "Error al resolver audio: {reason}",
            Text::DriverFailed => "Error de reproducción: {reason}",
            Text::QueueFull => "La cola está llena (máximo {max} canciones)",
            Text::Cancelled => "Operación cancelada",
            Text::Closed => "La cola de esta guild fue cerrada",

            Text::Paused => "⏸️ Reproducción pausada",
            Text::Resumed => "▶️ Reproducción reanudada",
            Text::Skipped => "⏭️ Saltada: **{title}**",
            Text::NothingPlayingNow => "❌ No hay nada reproduciéndose actualmente",
            Text::Stopped => "⏹️ Reproducción detenida, {count} canciones quitadas de la cola",
            Text::Cleared => "🧹 {count} canciones quitadas de la cola",
            Text::Shuffled => "🔀 Cola mezclada",
            Text::Removed => "🗑️ Quitada de la cola: **{title}**",
            Text::Moved => "↕️ Canción movida de la posición {from} a la {to}",
            Text::UnknownCommand => "❌ Comando no reconocido",
            Text::ServerOnly => "❌ Este comando solo funciona dentro de un servidor",
            Text::NoVoiceChannelTitle => "Sin canal de voz",
            Text::NeedVoiceChannel => "Debes estar en un canal de voz",
            Text::VoiceJoinFailedTitle => "No se pudo conectar",
            Text::VoiceJoinFailed => "No pude unirme a tu canal de voz. Revisa mis permisos.",
            Text::AddFailedTitle => "No se pudo agregar",
            Text::InvalidLanguage => "Idioma no soportado. Disponibles: {languages}",
            Text::LanguageSetPersonal => "🌐 Tu idioma ahora es **{language}**",
            Text::LanguageSetGuild => "🌐 El idioma del servidor ahora es **{language}**",
            Text::NeedManageGuild => {
                "❌ Necesitas el permiso *Gestionar servidor* para cambiar el idioma del servidor"
            }
        }
    }

    fn en(self) -> &'static str {
        match self {
            Text::NowPlayingTitle => "🎵 Now Playing",
            Text::PausedTitle => "⏸️ Paused",
            Text::DurationField => "⏱️ Duration",
            Text::RequestedByField => "👤 Requested by",
            Text::AddedAtField => "🕒 Added",
            Text::TrackAddedTitle => "✅ Track Added",
            Text::QueuePositionFooter => "📋 Position {position} in the queue",
            Text::QueueTitle => "📋 Queue",
            Text::QueueEmpty => "😴 **The queue is empty**\n\n💡 Use `/play <song>` to add music",
            Text::PlayingField => "Playing",
            Text::UpNextField => "Up next",
            Text::InfoField => "Info",
            Text::LastErrorField => "⚠️ Last error",
            Text::PageFooter => "Page {page} of {pages} • Jukebox",
            Text::PendingSummary => "**Pending:** {count} tracks",
            Text::DurationSummary => " • **Duration:** {duration}",
            Text::LastPlayedSummary => "\n**Last played:** {title} ({count} in history)",
            Text::Live => "🔴 Live",
            Text::TrackSkippedTitle => "⚠️ Track Skipped",
            Text::TrackFailedDescription => "Could not play **{title}**",
            Text::ReasonField => "Reason",
            Text::DisconnectedTitle => "Disconnected",
            Text::DisconnectedDescription => {
                "The voice connection was lost. The queue is kept, use `/play` to come back."
            }
            Text::ErrorTitle => "Error",

            Text::OutOfRangeEmpty => "Position {position} does not exist: nothing is pending",
            Text::OutOfRange => "Position {position} does not exist, use a number from 1 to {len}",
            Text::NothingPlaying => "Nothing is playing",
            Text::NotPaused => "Playback is not paused",
            Text::AlreadyPaused => "Playback is already paused",
            Text::NotFound => "No results found for: {query}",
            Text::ResolutionFailed => "Could not resolve audio: {reason}",
            Text::DriverFailed => "Playback error: {reason}",
            Text::QueueFull => "The queue is full (at most {max} tracks)",
            Text::Cancelled => "Operation cancelled",
            Text::Closed => "This guild's queue was closed",

            Text::Paused => "⏸️ Playback paused",
            Text::Resumed => "▶️ Playback resumed",
            Text::Skipped => "⏭️ Skipped: **{title}**",
            Text::NothingPlayingNow => "❌ Nothing is playing right now",
            Text::Stopped => "⏹️ Playback stopped, {count} tracks removed from the queue",
            Text::Cleared => "🧹 {count} tracks removed from the queue",
            Text::Shuffled => "🔀 Queue shuffled",
            Text::Removed => "🗑️ Removed from the queue: **{title}**",
            Text::Moved => "↕️ Track moved from position {from} to {to}",
            Text::UnknownCommand => "❌ Unknown command",
            Text::ServerOnly => "❌ This command only works inside a server",
            Text::NoVoiceChannelTitle => "No voice channel",
            Text::NeedVoiceChannel => "You must be in a voice channel",
            Text::VoiceJoinFailedTitle => "Could not connect",
            Text::VoiceJoinFailed => "I could not join your voice channel. Check my permissions.",
            Text::AddFailedTitle => "Could not add",
            Text::InvalidLanguage => "Unsupported language. Available: {languages}",
            Text::LanguageSetPersonal => "🌐 Your language is now **{language}**",
            Text::LanguageSetGuild => "🌐 The server language is now **{language}**",
            Text::NeedManageGuild => {
                "❌ You need the *Manage Server* permission to change the server language"
            }
        }
    }
}

/// Texto de `text` en `locale` con los `{nombre}` de `args` sustituidos.
pub fn tr(locale: Locale, text: Text, args: &[(&str, &dyn fmt::Display)]) -> String {
    let mut out = text.get(locale).to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{}}}", name), &value.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use regex::Regex;
    use std::collections::BTreeSet;

    const ALL_TEXTS: &[Text] = &[
        Text::NowPlayingTitle,
        Text::PausedTitle,
        Text::DurationField,
        Text::RequestedByField,
        Text::AddedAtField,
        Text::TrackAddedTitle,
        Text::QueuePositionFooter,
        Text::QueueTitle,
        Text::QueueEmpty,
        Text::PlayingField,
        Text::UpNextField,
        Text::InfoField,
        Text::LastErrorField,
        Text::PageFooter,
        Text::PendingSummary,
        Text::DurationSummary,
        Text::LastPlayedSummary,
        Text::Live,
        Text::TrackSkippedTitle,
        Text::TrackFailedDescription,
        Text::ReasonField,
        Text::DisconnectedTitle,
        Text::DisconnectedDescription,
        Text::ErrorTitle,
        Text::OutOfRangeEmpty,
        Text::OutOfRange,
        Text::NothingPlaying,
        Text::NotPaused,
        Text::AlreadyPaused,
        Text::NotFound,
        Text::ResolutionFailed,
        Text::DriverFailed,
        Text::QueueFull,
        Text::Cancelled,
        Text::Closed,
        Text::Paused,
        Text::Resumed,
        Text::Skipped,
        Text::NothingPlayingNow,
        Text::Stopped,
        Text::Cleared,
        Text::Shuffled,
        Text::Removed,
        Text::Moved,
        Text::UnknownCommand,
        Text::ServerOnly,
        Text::NoVoiceChannelTitle,
        Text::NeedVoiceChannel,
        Text::VoiceJoinFailedTitle,
        Text::VoiceJoinFailed,
        Text::AddFailedTitle,
        Text::InvalidLanguage,
        Text::LanguageSetPersonal,
        Text::LanguageSetGuild,
        Text::NeedManageGuild,
    ];

    fn placeholders(template: &str) -> BTreeSet<String> {
        let pattern = Regex::new(r"\{(\w+)\}").unwrap();
        pattern
            .captures_iter(template)
            .map(|c| c[1].to_string())
            .collect()
    }

    #[test]
    fn test_parse_locale_codes() {
        assert_eq!("es".parse::<Locale>(), Ok(Locale::Es));
        assert_eq!("EN".parse::<Locale>(), Ok(Locale::En));
        assert_eq!("es-ES".parse::<Locale>(), Ok(Locale::Es));
        assert_eq!("en_US".parse::<Locale>(), Ok(Locale::En));
        assert_eq!("de".parse::<Locale>(), Err(UnknownLocale("de".into())));
        assert!("".parse::<Locale>().is_err());
        assert_eq!(Locale::available(), "es, en");
    }

    #[test]
    fn test_user_choice_beats_guild_and_default() {
        let languages = Languages::new(Locale::Es);
        let user = UserId::new(1);
        let other = UserId::new(2);
        let guild = GuildId::new(10);

        assert_eq!(languages.resolve(user, Some(guild)), Locale::Es);

        languages.set_guild(guild, Locale::En);
        assert_eq!(languages.resolve(user, Some(guild)), Locale::En);
        assert_eq!(languages.resolve(user, None), Locale::Es);

        languages.set_user(user, Locale::Es);
        assert_eq!(languages.resolve(user, Some(guild)), Locale::Es);
        assert_eq!(languages.resolve(other, Some(guild)), Locale::En);
        assert_eq!(languages.for_guild(guild), Locale::En);

        languages.forget_guild(guild);
        assert_eq!(languages.resolve(other, Some(guild)), Locale::Es);
    }

    #[test]
    fn test_translations_share_placeholders() {
        for text in ALL_TEXTS {
            let es = text.get(Locale::Es);
            let en = text.get(Locale::En);
            assert!(!es.is_empty() && !en.is_empty(), "{:?} vacío", text);
            assert_eq!(placeholders(es), placeholders(en), "{:?}", text);
        }
    }

    #[test]
    fn test_tr_fills_arguments() {
        assert_eq!(
            tr(Locale::En, Text::Moved, &[("from", &3), ("to", &1)]),
            "↕️ Track moved from position 3 to 1"
        );
        assert_eq!(
            tr(Locale::Es, Text::Skipped, &[("title", &"Song")]),
            "⏭️ Saltada: **Song**"
        );
    }
}
