use serenity::model::id::GuildId;
use std::{fmt::Display, future::Future, time::Duration};
use tracing::{info, warn};

/// Reintentos para volver al canal de voz tras una desconexión inesperada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    /// Espera antes de cada intento
    pub delay: Duration,
}

impl ReconnectPolicy {
    /// Llama a `join` hasta que funcione o se agoten los intentos.
    ///
    /// Devuelve `true` si algún intento volvió a conectar.
    pub async fn run<F, Fut, E>(&self, guild_id: GuildId, mut join: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        for attempt in 1..=self.max_attempts {
            info!(
                "🔄 Reconectando a voz ({}/{}) en guild {}",
                attempt, self.max_attempts, guild_id
            );
            tokio::time::sleep(self.delay).await;

            match join().await {
                Ok(()) => {
                    info!("✅ Reconectado en guild {}", guild_id);
                    return true;
                }
                Err(e) => warn!(
                    "❌ Intento {} de reconexión falló en guild {}: {}",
                    attempt, guild_id, e
                ),
            }
        }

        warn!(
            "⚠️ Reconexión abandonada en guild {} tras {} intentos",
            guild_id, self.max_attempts
        );
        false
    }
}
