use serenity::model::id::GuildId;

use super::track::Track;

/// Notificaciones que publican las colas para la capa del bot.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    NowPlaying {
        guild_id: GuildId,
        track: Track,
    },
    /// Una pista no se pudo reproducir; la cola siguió con la siguiente.
    TrackFailed {
        guild_id: GuildId,
        track: Track,
        reason: String,
    },
    /// La cola se quedó sin pistas y soltó la conexión de voz.
    Idle {
        guild_id: GuildId,
    },
    /// Se perdió la conexión de voz; lo pendiente se conserva.
    Disconnected {
        guild_id: GuildId,
        reason: String,
    },
}

impl QueueEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            QueueEvent::NowPlaying { guild_id, .. }
            | QueueEvent::TrackFailed { guild_id, .. }
            | QueueEvent::Idle { guild_id }
            | QueueEvent::Disconnected { guild_id, .. } => *guild_id,
        }
    }
}
