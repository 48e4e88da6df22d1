use thiserror::Error;

use crate::audio::queue::PlaybackStatus;
use crate::sources::ResolveError;

/// Errores de operaciones sobre la cola de una guild.
///
/// Ninguno es fatal: como máximo afecta a la cola de una sola guild.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Posición inválida (entrada del usuario). La cola no cambia.
    #[error("posición {position} fuera de rango (la cola tiene {len} canciones)")]
    OutOfRange { position: usize, len: usize },

    /// El resolver no encontró contenido para la búsqueda.
    #[error("no se encontraron resultados para: {0}")]
    NotFound(String),

    /// Fallo de red o de yt-dlp al resolver la pista.
    #[error("error al resolver audio: {0}")]
    Resolution(String),

    /// Fallo del driver de reproducción (conexión de voz).
    #[error("error de reproducción: {0}")]
    Driver(String),

    /// Pausa/reanudación pedida en un estado que no la admite.
    #[error("operación no válida en estado {status:?}")]
    InvalidState { status: PlaybackStatus },

    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    /// La operación fue cancelada por un `stop` antes de completarse.
    #[error("operación cancelada")]
    Cancelled,

    /// El worker de la guild ya no existe.
    #[error("la cola de esta guild fue cerrada")]
    Closed,
}

impl From<ResolveError> for QueueError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(query) => QueueError::NotFound(query),
            other => QueueError::Resolution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_resolve_errors_map_to_queue_errors() {
        assert_eq!(
            QueueError::from(ResolveError::NotFound("nada".into())),
            QueueError::NotFound("nada".into())
        );
        assert!(matches!(
            QueueError::from(ResolveError::Timeout(Duration::from_secs(30))),
            QueueError::Resolution(_)
        ));
        assert!(matches!(
            QueueError::from(ResolveError::Failed("exit 1".into())),
            QueueError::Resolution(_)
        ));
    }
}
