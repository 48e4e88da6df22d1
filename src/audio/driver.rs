use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc::WeakSender;
use tracing::debug;

use super::worker::Command;
use crate::sources::StreamHandle;

/// Identifica un stream iniciado en el driver. Los eventos que llegan con un
/// token viejo (de una pista ya saltada) se descartan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackToken(pub(crate) u64);

impl fmt::Display for PlaybackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Notificaciones del driver hacia la cola de la guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Finished {
        token: PlaybackToken,
    },
    Errored {
        token: PlaybackToken,
        reason: String,
        /// La conexión de voz ya no existe
        connection_lost: bool,
    },
}

impl DriverEvent {
    pub fn token(&self) -> PlaybackToken {
        match self {
            DriverEvent::Finished { token } | DriverEvent::Errored { token, .. } => *token,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct DriverError {
    pub reason: String,
    pub connection_lost: bool,
}

impl DriverError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            connection_lost: false,
        }
    }

    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            connection_lost: true,
        }
    }
}

/// Canal por el que el driver avisa que un stream terminó o falló.
///
/// Los eventos entran en la misma cola de comandos que las operaciones de
/// control, así que se aplican en orden con ellas.
#[derive(Clone)]
pub struct DriverEvents {
    token: PlaybackToken,
    tx: WeakSender<Command>,
}

impl DriverEvents {
    pub(crate) fn new(token: PlaybackToken, tx: WeakSender<Command>) -> Self {
        Self { token, tx }
    }

    pub fn token(&self) -> PlaybackToken {
        self.token
    }

    pub async fn finished(&self) {
        self.send(DriverEvent::Finished { token: self.token }).await;
    }

    pub async fn errored(&self, reason: impl Into<String>, connection_lost: bool) {
        self.send(DriverEvent::Errored {
            token: self.token,
            reason: reason.into(),
            connection_lost,
        })
        .await;
    }

    async fn send(&self, event: DriverEvent) {
        match self.tx.upgrade() {
            Some(tx) => {
                if tx.send(Command::Driver(event)).await.is_err() {
                    debug!("Cola cerrada, evento de {} descartado", self.token);
                }
            }
            None => debug!("Cola cerrada, evento de {} descartado", self.token),
        }
    }
}

/// Conexión de voz que emite el audio de una guild.
///
/// Tras `play`, el driver debe enviar exactamente un `finished` o `errored`
/// por el [`DriverEvents`] recibido.
#[async_trait]
pub trait PlaybackDriver: Send + Sync {
    /// Reemplaza lo que esté sonando por `stream`.
    async fn play(&self, stream: StreamHandle, events: DriverEvents) -> Result<(), DriverError>;

    async fn pause(&self) -> Result<(), DriverError>;

    async fn resume(&self) -> Result<(), DriverError>;

    /// Corta el stream actual sin soltar la conexión.
    async fn halt(&self);

    /// Corta el stream y libera la conexión de voz.
    async fn stop(&self);
}
