//! # Sources Module
//!
//! Media resolution for the jukebox: turning a user query (URL or free-text
//! search) into a [`Track`] plus a playable [`StreamHandle`].
//!
//! The queue core only sees the [`AudioResolver`] trait and never branches on
//! the kind of source. The production implementation is [`YtDlpResolver`],
//! which shells out to `yt-dlp`.

pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

use crate::audio::track::Track;

pub use ytdlp::YtDlpResolver;

/// Errores del resolver de audio.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("sin resultados para '{0}'")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),

    #[error("tiempo de espera agotado ({0:?})")]
    Timeout(Duration),
}

/// Handle opaco de un stream reproducible.
///
/// Las URLs de medios que entrega yt-dlp caducan, por eso se guarda cuándo se
/// obtuvo.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    url: String,
    resolved_at: Instant,
}

impl StreamHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resolved_at: Instant::now(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.resolved_at.elapsed() >= ttl
    }
}

/// Una pista resuelta junto con su stream.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub track: Track,
    pub stream: StreamHandle,
}

/// Capacidad de resolver una búsqueda en una pista reproducible.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioResolver: Send + Sync {
    /// Resuelve `query` (URL o texto de búsqueda) para `requested_by`.
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Resolved, ResolveError>;

    /// Nombre de la fuente, para logs
    fn name(&self) -> &'static str;
}

/// Ejecuta `resolve` con un límite de tiempo.
pub async fn resolve_with_timeout(
    resolver: &dyn AudioResolver,
    query: &str,
    requested_by: UserId,
    limit: Duration,
) -> Result<Resolved, ResolveError> {
    match tokio::time::timeout(limit, resolver.resolve(query, requested_by)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("⏱️ {} no respondió en {:?} para: {}", resolver.name(), limit, query);
            Err(ResolveError::Timeout(limit))
        }
    }
}

/// Verifica si la búsqueda es una URL http(s).
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("http://example.com/song.mp3"));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/song.mp3"));
    }

    #[test]
    fn test_stream_staleness() {
        let stream = StreamHandle::new("https://cdn.example.com/a.webm");
        assert!(!stream.is_stale(Duration::from_secs(3600)));
        assert!(stream.is_stale(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_timeout() {
        struct Slow;

        #[async_trait]
        impl AudioResolver for Slow {
            async fn resolve(&self, _: &str, _: UserId) -> Result<Resolved, ResolveError> {
                tokio::time::sleep(Duration::from_secs(120)).await;
                Err(ResolveError::Failed("unreachable".into()))
            }

            fn name(&self) -> &'static str {
                "slow"
            }
        }

        let result =
            resolve_with_timeout(&Slow, "query", UserId::new(1), Duration::from_secs(5)).await;
        assert_eq!(result.unwrap_err(), ResolveError::Timeout(Duration::from_secs(5)));
    }
}
