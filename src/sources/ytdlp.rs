use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{is_url, AudioResolver, ResolveError, Resolved, StreamHandle};
use crate::audio::track::Track;

/// Mensajes de yt-dlp que significan "no existe", no un fallo transitorio.
static NOT_FOUND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(no video results|video unavailable|private video|unsupported url|is not a valid url|http error 404|does not exist)",
    )
    .expect("regex válida")
});

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    duration: Option<f64>,
    is_live: Option<bool>,
    /// URL del formato seleccionado con `-f`
    url: Option<String>,
    formats: Option<Vec<Format>>,
}

#[derive(Debug, Deserialize)]
struct Format {
    url: Option<String>,
    acodec: Option<String>,
}

/// Resolver basado en `yt-dlp`: busca o extrae la pista y la URL del mejor
/// formato de audio.
pub struct YtDlpResolver {
    program: String,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            rate_limiter: Semaphore::new(3),
        }
    }

    fn target(query: &str) -> String {
        let query = query.trim();
        if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }
}

#[async_trait]
impl AudioResolver for YtDlpResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Resolved, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Failed(e.to_string()))?;

        let target = Self::target(query);
        info!("🔍 Resolviendo con yt-dlp: {}", target);

        let output = Command::new(&self.program)
            .args([
                "--dump-json",
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--no-warnings",
                "--socket-timeout",
                "15",
                &target,
            ])
            // Un resolve cancelado (stop o timeout) no deja yt-dlp corriendo
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolveError::Failed(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp falló para '{}': {}", query, stderr.trim());
            return Err(classify_failure(&stderr, query));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_output(&stdout, query, requested_by)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Interpreta la salida `--dump-json` (una línea JSON por entrada).
fn parse_output(stdout: &str, query: &str, requested_by: UserId) -> Result<Resolved, ResolveError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| ResolveError::NotFound(query.to_string()))?;

    let info: YtDlpInfo = serde_json::from_str(line)
        .map_err(|e| ResolveError::Failed(format!("respuesta inválida de yt-dlp: {}", e)))?;

    let stream_url = info
        .url
        .clone()
        .or_else(|| best_audio_format(info.formats.as_deref()))
        .ok_or_else(|| ResolveError::Failed("yt-dlp no devolvió un formato de audio".into()))?;

    let source = info
        .webpage_url
        .or(info.original_url)
        .unwrap_or_else(|| query.to_string());
    let duration = match info.is_live {
        Some(true) => None,
        _ => info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(Duration::from_secs_f64),
    };
    let title = info.title.unwrap_or_else(|| "Unknown".to_string());

    debug!("🎯 '{}' resuelto a {}", title, source);

    Ok(Resolved {
        track: Track::new(source, title, duration, requested_by),
        stream: StreamHandle::new(stream_url),
    })
}

fn best_audio_format(formats: Option<&[Format]>) -> Option<String> {
    formats?
        .iter()
        .rev()
        .filter(|f| f.acodec.as_deref() != Some("none"))
        .find_map(|f| f.url.clone())
}

fn classify_failure(stderr: &str, query: &str) -> ResolveError {
    if NOT_FOUND_PATTERN.is_match(stderr) {
        ResolveError::NotFound(query.to_string())
    } else {
        let reason = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("yt-dlp terminó con error")
            .trim()
            .to_string();
        ResolveError::Failed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user() -> UserId {
        UserId::new(42)
    }

    #[test]
    fn test_search_queries_use_ytsearch() {
        assert_eq!(YtDlpResolver::target("  lofi beats "), "ytsearch1:lofi beats");
        assert_eq!(
            YtDlpResolver::target("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_parse_selected_format() {
        let json = r#"{"title":"Song A","webpage_url":"https://www.youtube.com/watch?v=a","duration":215.0,"url":"https://cdn.example.com/a.webm"}"#;

        let resolved = parse_output(json, "song a", user()).unwrap();
        assert_eq!(resolved.track.title(), "Song A");
        assert_eq!(resolved.track.source(), "https://www.youtube.com/watch?v=a");
        assert_eq!(resolved.track.duration(), Some(Duration::from_secs(215)));
        assert_eq!(resolved.track.requested_by(), user());
        assert_eq!(resolved.stream.url(), "https://cdn.example.com/a.webm");
    }

    #[test]
    fn test_parse_falls_back_to_audio_formats() {
        let json = r#"{"title":"Live","original_url":"https://example.com/live","is_live":true,"duration":10,
            "formats":[{"url":"https://cdn/audio.m4a","acodec":"mp4a"},{"url":"https://cdn/video.mp4","acodec":"none"}]}"#
            .replace('\n', "");

        let resolved = parse_output(&json, "live", user()).unwrap();
        assert_eq!(resolved.stream.url(), "https://cdn/audio.m4a");
        assert_eq!(resolved.track.source(), "https://example.com/live");
        assert_eq!(resolved.track.duration(), None);
    }

    #[test]
    fn test_empty_output_is_not_found() {
        assert_eq!(
            parse_output("\n", "asdfghjkl", user()).unwrap_err(),
            ResolveError::NotFound("asdfghjkl".into())
        );
    }

    #[test]
    fn test_missing_stream_is_failure() {
        let json = r#"{"title":"Sin formatos"}"#;
        assert!(matches!(parse_output(json, "x", user()), Err(ResolveError::Failed(_))));
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            classify_failure("ERROR: [youtube] abc: Video unavailable\n", "q"),
            ResolveError::NotFound("q".into())
        );
        assert_eq!(
            classify_failure("WARNING: retrying\nERROR: Unable to download webpage: timed out\n", "q"),
            ResolveError::Failed("ERROR: Unable to download webpage: timed out".into())
        );
    }

    /// Escribe un `yt-dlp` falso con el cuerpo `script` en un directorio propio.
    #[cfg(unix)]
    fn fake_ytdlp(name: &str, script: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let dir = std::env::temp_dir().join(format!("jukebox-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_runs_ytdlp() {
        let program = fake_ytdlp(
            "ok",
            r#"echo '{"title":"Fake","webpage_url":"https://example.com/fake","duration":60,"url":"https://cdn.example.com/fake.m4a"}'"#,
        );
        let resolver = YtDlpResolver::new(program.to_string_lossy());

        let resolved = resolver.resolve("fake song", user()).await.unwrap();
        assert_eq!(resolved.track.title(), "Fake");
        assert_eq!(resolved.stream.url(), "https://cdn.example.com/fake.m4a");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_resolve_kills_ytdlp() {
        let marker = std::env::temp_dir().join(format!("jukebox-marker-{}", std::process::id()));
        let _ = std::fs::remove_file(&marker);
        let program = fake_ytdlp("slow", &format!("sleep 2\ntouch '{}'", marker.display()));
        let resolver = YtDlpResolver::new(program.to_string_lossy());

        let result = crate::sources::resolve_with_timeout(
            &resolver,
            "slow song",
            user(),
            Duration::from_millis(200),
        )
        .await;
        assert!(matches!(result, Err(ResolveError::Timeout(_))));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "yt-dlp siguió corriendo tras el timeout");
    }
}
