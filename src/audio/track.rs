use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Identificador único de una entrada de la cola dentro del proceso.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(u64);

impl TrackId {
    fn next() -> Self {
        Self(NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Una pista de la cola. Inmutable una vez creada.
///
/// Dos pistas son iguales sólo si son la misma entrada: pedir dos veces la
/// misma URL produce dos `Track` distintos.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    source: String,
    title: String,
    duration: Option<Duration>,
    requested_by: UserId,
    added_at: DateTime<Utc>,
}

impl Track {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        duration: Option<Duration>,
        requested_by: UserId,
    ) -> Self {
        Self {
            id: TrackId::next(),
            source: source.into(),
            title: title.into(),
            duration,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    /// Duración como `M:SS` o `H:MM:SS`; `None` para streams en vivo.
    pub fn format_duration(&self) -> Option<String> {
        self.duration.map(format_duration)
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
