use anyhow::{Context as _, Result};
use std::{str::FromStr, time::Duration};

use crate::{audio::worker::WorkerSettings, bot::reconnect::ReconnectPolicy, ui::i18n::Locale};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Cola
    pub max_queue_size: usize,
    pub max_history: usize,
    pub command_buffer: usize,

    // Resolución
    pub ytdlp_path: String,
    pub resolve_timeout: Duration,
    pub stream_ttl: Duration,

    // Audio
    pub default_volume: f32,
    pub auto_leave_empty: bool,

    // Reconexión de voz
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,

    // Idioma por defecto de las respuestas
    pub default_locale: Locale,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración leyendo cada variable con `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            // Cola
            max_queue_size: parse_or(&lookup, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_history: parse_or(&lookup, "MAX_HISTORY", defaults.max_history)?,
            command_buffer: parse_or(&lookup, "COMMAND_BUFFER", defaults.command_buffer)?,

            // Resolución
            ytdlp_path: lookup("YTDLP_PATH")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.ytdlp_path),
            resolve_timeout: duration_or(&lookup, "RESOLVE_TIMEOUT", defaults.resolve_timeout)?,
            stream_ttl: duration_or(&lookup, "STREAM_TTL", defaults.stream_ttl)?,

            // Audio
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            auto_leave_empty: parse_or(&lookup, "AUTO_LEAVE_EMPTY", defaults.auto_leave_empty)?,

            // Reconexión de voz
            reconnect_attempts: parse_or(&lookup, "RECONNECT_ATTEMPTS", defaults.reconnect_attempts)?,
            reconnect_delay: duration_or(&lookup, "RECONNECT_DELAY", defaults.reconnect_delay)?,

            default_locale: parse_or(&lookup, "DEFAULT_LOCALE", defaults.default_locale)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue size and command buffer must be > 0
    /// - The resolve timeout must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.command_buffer == 0 {
            anyhow::bail!("Command buffer must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        Ok(())
    }

    /// Parámetros para cada cola de guild.
    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            max_queue_size: self.max_queue_size,
            max_history: self.max_history,
            resolve_timeout: self.resolve_timeout,
            stream_ttl: self.stream_ttl,
            command_buffer: self.command_buffer,
        }
    }

    /// Reintentos de reconexión de voz.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect_attempts,
            delay: self.reconnect_delay,
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Queue: {} max, {} history, {} buffered commands\n  \
            Resolver: {} (timeout {}, stream TTL {})\n  \
            Audio: {}% vol, auto-leave={}\n  \
            Voice: {} reconnect attempts every {}\n  \
            Locale: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.max_history,
            self.command_buffer,
            self.ytdlp_path,
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.stream_ttl),
            (self.default_volume * 100.0) as u32,
            self.auto_leave_empty,
            self.reconnect_attempts,
            humantime::format_duration(self.reconnect_delay),
            self.default_locale
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            max_queue_size: 1000,
            max_history: 50,
            command_buffer: 64,

            ytdlp_path: "yt-dlp".to_string(),
            resolve_timeout: Duration::from_secs(30),
            stream_ttl: Duration::from_secs(4 * 3600), // las URLs de YouTube caducan a las ~6h

            default_volume: 0.5,
            auto_leave_empty: true,

            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(2),

            default_locale: Locale::Es,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, val)),
        _ => Ok(default),
    }
}

fn duration_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    match lookup(key) {
        Some(val) if !val.trim().is_empty() => humantime::parse_duration(val.trim())
            .with_context(|| format!("{} inválido (ej: 30s, 4h): {}", key, val)),
        _ => Ok(default),
    }
}
