use rand::{seq::SliceRandom, Rng};
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::{Track, TrackId};
use crate::error::QueueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Playing,
    Paused,
}

/// Dónde quedó una pista recién agregada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    NowPlaying,
    /// Posición 1-based dentro de `pending`.
    Pending(usize),
}

/// Resultado de avanzar la cola.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// La pista pasó a ser `current` y hay que reproducirla.
    Play(Track),
    /// No quedan pistas: la cola quedó en `Idle`.
    Idle,
}

#[derive(Debug, Clone)]
pub struct Enqueued {
    pub position: QueuePosition,
    /// Pista que empezó a sonar como efecto del enqueue (cola en `Idle`).
    pub started: Option<Track>,
}

/// Cola de una guild: pistas pendientes, la actual y el estado de reproducción.
///
/// Es una máquina de estados pura; quien la posee (el worker de la guild)
/// ejecuta los efectos sobre el driver y el resolver.
///
/// Se mantiene siempre que `current` existe si y sólo si el estado es
/// `Playing` o `Paused`, y que una pista sale de `pending` exactamente cuando
/// pasa a ser `current`.
#[derive(Debug)]
pub struct RoomQueue {
    pending: VecDeque<Track>,
    current: Option<Track>,
    status: PlaybackStatus,
    history: VecDeque<Track>,
    last_error: Option<String>,
    max_size: usize,
    max_history: usize,
}

impl RoomQueue {
    pub fn new(max_size: usize, max_history: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            status: PlaybackStatus::Idle,
            history: VecDeque::new(),
            last_error: None,
            max_size,
            max_history,
        }
    }

    /// Agrega una pista al final. Si la cola está en `Idle` avanza de inmediato.
    pub fn enqueue(&mut self, track: Track) -> Result<Enqueued, QueueError> {
        self.ensure_capacity()?;
        info!("➕ Agregado a la cola: {}", track.title());
        let id = track.id();
        self.pending.push_back(track);
        Ok(self.start_if_idle(id))
    }

    /// Agrega una pista en la posición 1 de la cola.
    pub fn enqueue_next(&mut self, track: Track) -> Result<Enqueued, QueueError> {
        self.ensure_capacity()?;
        info!("⏫ Agregado como siguiente: {}", track.title());
        let id = track.id();
        self.pending.push_front(track);
        Ok(self.start_if_idle(id))
    }

    /// Pasa la primera pista pendiente a `current`, o deja la cola en `Idle`.
    ///
    /// La pista actual, si había, pasa al historial.
    pub fn advance(&mut self) -> Advance {
        if let Some(previous) = self.current.take() {
            self.push_history(previous);
        }

        match self.pending.pop_front() {
            Some(next) => {
                info!("➡️ Siguiente en cola: {}", next.title());
                self.current = Some(next.clone());
                self.status = PlaybackStatus::Playing;
                Advance::Play(next)
            }
            None => {
                if self.status != PlaybackStatus::Idle {
                    info!("📭 Cola vacía, no hay siguiente track");
                }
                self.status = PlaybackStatus::Idle;
                Advance::Idle
            }
        }
    }

    /// La pista actual terminó con normalidad.
    pub fn finish_current(&mut self) -> Advance {
        self.advance()
    }

    /// La pista actual falló. Se registra el error y la cola sigue.
    pub fn fail_current(&mut self, reason: impl Into<String>) -> Advance {
        let reason = reason.into();
        if let Some(current) = &self.current {
            info!("⚠️ Falló '{}': {}", current.title(), reason);
        }
        self.last_error = Some(reason);
        self.advance()
    }

    pub fn pause(&mut self) -> Result<(), QueueError> {
        match self.status {
            PlaybackStatus::Playing => {
                self.status = PlaybackStatus::Paused;
                info!("⏸️ Reproducción pausada");
                Ok(())
            }
            status => Err(QueueError::InvalidState { status }),
        }
    }

    pub fn resume(&mut self) -> Result<(), QueueError> {
        match self.status {
            PlaybackStatus::Paused => {
                self.status = PlaybackStatus::Playing;
                info!("▶️ Reproducción reanudada");
                Ok(())
            }
            status => Err(QueueError::InvalidState { status }),
        }
    }

    /// Detiene todo: vacía `pending`, quita la actual y vuelve a `Idle`.
    /// Devuelve cuántas pistas pendientes se descartaron.
    pub fn stop(&mut self) -> usize {
        let dropped = self.pending_len();
        self.pending.clear();
        if let Some(current) = self.current.take() {
            self.push_history(current);
        }
        self.status = PlaybackStatus::Idle;
        info!("⏹️ Reproducción detenida ({} pendientes descartadas)", dropped);
        dropped
    }

    /// Se perdió la conexión de voz: la actual se descarta, `pending` se conserva.
    pub fn detach(&mut self, reason: impl Into<String>) {
        self.last_error = Some(reason.into());
        if let Some(current) = self.current.take() {
            self.push_history(current);
        }
        self.status = PlaybackStatus::Idle;
    }

    /// Vacía sólo `pending`. No toca la pista actual.
    pub fn clear(&mut self) -> usize {
        let cleared = self.pending_len();
        self.pending.clear();
        info!("🗑️ Cola limpiada: {} tracks removidos", cleared);
        cleared
    }

    /// Elimina la entrada en `position` (1-based).
    pub fn remove(&mut self, position: usize) -> Result<Track, QueueError> {
        let index = self.index_of(position)?;
        let removed = self
            .pending
            .remove(index)
            .ok_or(QueueError::OutOfRange { position, len: self.pending_len() })?;
        debug!("❌ Track eliminado en posición {}", position);
        Ok(removed)
    }

    /// Mueve una entrada de `from` a `to` (ambas 1-based).
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), QueueError> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;

        if from_index != to_index {
            if let Some(track) = self.pending.remove(from_index) {
                self.pending.insert(to_index, track);
            }
            debug!("📍 Track movido de posición {} a {}", from, to);
        }

        Ok(())
    }

    /// Mezcla `pending` (Fisher-Yates). No toca la pista actual.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.pending_len() < 2 {
            return;
        }
        self.pending.make_contiguous().shuffle(rng);
        info!("🔀 Cola mezclada");
    }

    /// Copia inmutable del estado para mostrar.
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            status: self.status,
            pending: self.pending.iter().cloned().collect(),
            history_len: self.history.len(),
            last_played: self.history().last().cloned(),
            total_duration: self.total_duration(),
            last_error: self.last_error.clone(),
        }
    }

    /// Duración total de las pistas pendientes.
    pub fn total_duration(&self) -> Duration {
        self.pending.iter().filter_map(Track::duration).sum()
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pistas ya reproducidas, la más reciente al final.
    pub fn history(&self) -> impl Iterator<Item = &Track> {
        self.history.iter()
    }

    // Funciones privadas

    fn ensure_capacity(&self) -> Result<(), QueueError> {
        if self.pending_len() >= self.max_size {
            return Err(QueueError::QueueFull { max: self.max_size });
        }
        Ok(())
    }

    fn start_if_idle(&mut self, id: TrackId) -> Enqueued {
        let started = match self.status {
            PlaybackStatus::Idle => match self.advance() {
                Advance::Play(track) => Some(track),
                Advance::Idle => None,
            },
            _ => None,
        };

        let position = if self.current.as_ref().map(Track::id) == Some(id) {
            QueuePosition::NowPlaying
        } else {
            let index = self.pending.iter().position(|t| t.id() == id).unwrap_or(0);
            QueuePosition::Pending(index + 1)
        };

        Enqueued { position, started }
    }

    fn index_of(&self, position: usize) -> Result<usize, QueueError> {
        if position == 0 || position > self.pending_len() {
            return Err(QueueError::OutOfRange {
                position,
                len: self.pending_len(),
            });
        }
        Ok(position - 1)
    }

    fn push_history(&mut self, track: Track) {
        self.history.push_back(track);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }
}

/// Vista inmutable de una cola en un instante dado.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub status: PlaybackStatus,
    pub pending: Vec<Track>,
    pub history_len: usize,
    pub last_played: Option<Track>,
    pub total_duration: Duration,
    pub last_error: Option<String>,
}

impl QueueSnapshot {
    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.pending.len();
        let total_pages = if total_items == 0 {
            1
        } else {
            total_items.div_ceil(items_per_page)
        };
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(total_items);

        QueuePage {
            items: self.pending[start..end].to_vec(),
            first_position: start + 1,
            current_page,
            total_pages,
            total_items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    /// Posición 1-based del primer elemento de la página.
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use serenity::model::id::UserId;

    fn track(title: &str) -> Track {
        Track::new(
            format!("https://example.com/{title}"),
            title,
            Some(Duration::from_secs(120)),
            UserId::new(1),
        )
    }

    fn titles(tracks: &[Track]) -> Vec<String> {
        tracks.iter().map(|t| t.title().to_string()).collect()
    }

    fn assert_invariants(queue: &RoomQueue) {
        let snap = queue.snapshot();
        assert_eq!(snap.status == PlaybackStatus::Idle, snap.current.is_none());
        if let Some(current) = &snap.current {
            assert!(!snap.pending.contains(current));
        }
    }

    fn queue() -> RoomQueue {
        RoomQueue::new(100, 50)
    }

    #[test]
    fn test_first_enqueue_starts_playback() {
        let mut q = queue();
        let a = track("song-A");

        let enqueued = q.enqueue(a.clone()).unwrap();
        assert_eq!(enqueued.position, QueuePosition::NowPlaying);
        assert_eq!(enqueued.started, Some(a.clone()));
        assert_eq!(q.status(), PlaybackStatus::Playing);
        assert_eq!(q.current(), Some(&a));
        assert_invariants(&q);

        let b = q.enqueue(track("song-B")).unwrap();
        let c = q.enqueue(track("song-C")).unwrap();
        assert_eq!(b.position, QueuePosition::Pending(1));
        assert_eq!(c.position, QueuePosition::Pending(2));
        assert!(b.started.is_none() && c.started.is_none());
        assert_eq!(q.status(), PlaybackStatus::Playing);
        assert_invariants(&q);
    }

    #[test]
    fn test_enqueue_remove_stop_scenario() {
        let mut q = queue();
        q.enqueue(track("song-A")).unwrap();
        q.enqueue(track("song-B")).unwrap();
        q.enqueue(track("song-C")).unwrap();

        let snap = q.snapshot();
        assert_eq!(snap.current.as_ref().map(Track::title), Some("song-A"));
        assert_eq!(titles(&snap.pending), vec!["song-B", "song-C"]);

        let removed = q.remove(1).unwrap();
        assert_eq!(removed.title(), "song-B");
        assert_eq!(titles(&q.snapshot().pending), vec!["song-C"]);

        assert_eq!(q.stop(), 1);
        let snap = q.snapshot();
        assert_eq!(snap.status, PlaybackStatus::Idle);
        assert!(snap.current.is_none());
        assert!(snap.pending.is_empty());
    }

    #[test]
    fn test_skip_round_trip() {
        let mut q = queue();
        let t1 = track("T1");
        let t2 = track("T2");
        q.enqueue(t1.clone()).unwrap();
        q.enqueue(t2.clone()).unwrap();

        assert_eq!(q.advance(), Advance::Play(t2.clone()));
        let snap = q.snapshot();
        assert_eq!(snap.current, Some(t2));
        assert!(snap.pending.is_empty());
        assert_eq!(q.history().collect::<Vec<_>>(), vec![&t1]);
    }

    #[test]
    fn test_remove_out_of_range_leaves_queue_untouched() {
        let mut q = queue();
        q.enqueue(track("A")).unwrap();
        q.enqueue(track("B")).unwrap();
        q.enqueue(track("C")).unwrap();
        let before = titles(&q.snapshot().pending);

        for position in [0, 3, 100] {
            assert_eq!(
                q.remove(position),
                Err(QueueError::OutOfRange { position, len: 2 })
            );
            assert_eq!(titles(&q.snapshot().pending), before);
        }
    }

    #[test]
    fn test_removal_reindexes_following_entries() {
        let mut q = queue();
        q.enqueue(track("now")).unwrap();
        for name in ["a", "b", "c", "d"] {
            q.enqueue(track(name)).unwrap();
        }

        q.remove(2).unwrap();
        assert_eq!(titles(&q.snapshot().pending), vec!["a", "c", "d"]);
        assert_eq!(q.remove(3).unwrap().title(), "d");
        assert_eq!(q.remove(2).unwrap().title(), "c");
    }

    #[test]
    fn test_shuffle_preserves_tracks_and_current() {
        let mut q = queue();
        let current = track("current");
        q.enqueue(current.clone()).unwrap();
        for i in 0..20 {
            q.enqueue(track(&format!("t{i}"))).unwrap();
        }

        let mut before = titles(&q.snapshot().pending);
        q.shuffle_with(&mut StdRng::seed_from_u64(42));
        let mut after = titles(&q.snapshot().pending);

        assert_eq!(q.current(), Some(&current));
        before.sort();
        after.sort();
        assert_eq!(before, after);
        assert_invariants(&q);
    }

    #[test]
    fn test_shuffle_small_queue_is_noop() {
        let mut q = queue();
        q.shuffle();
        assert!(q.current().is_none());
        assert_eq!(q.pending_len(), 0);

        q.enqueue(track("now")).unwrap();
        q.enqueue(track("only")).unwrap();
        q.shuffle();
        assert_eq!(titles(&q.snapshot().pending), vec!["only"]);
    }

    #[test]
    fn test_finish_on_empty_queue_goes_idle() {
        let mut q = queue();
        q.enqueue(track("A")).unwrap();

        assert_eq!(q.finish_current(), Advance::Idle);
        assert_eq!(q.status(), PlaybackStatus::Idle);
        assert!(q.current().is_none());

        // Repetir no cambia nada
        assert_eq!(q.advance(), Advance::Idle);
        assert_eq!(q.status(), PlaybackStatus::Idle);
        assert_invariants(&q);
    }

    #[test]
    fn test_failed_track_is_recorded_and_queue_continues() {
        let mut q = queue();
        q.enqueue(track("bad")).unwrap();
        let good = track("good");
        q.enqueue(good.clone()).unwrap();

        assert_eq!(q.fail_current("stream 403"), Advance::Play(good));
        assert_eq!(q.snapshot().last_error.as_deref(), Some("stream 403"));
        assert!(q.snapshot().pending.is_empty());
    }

    #[test]
    fn test_pause_resume_transitions() {
        let mut q = queue();
        assert_eq!(
            q.pause(),
            Err(QueueError::InvalidState { status: PlaybackStatus::Idle })
        );
        assert_eq!(
            q.resume(),
            Err(QueueError::InvalidState { status: PlaybackStatus::Idle })
        );

        q.enqueue(track("A")).unwrap();
        assert_eq!(
            q.resume(),
            Err(QueueError::InvalidState { status: PlaybackStatus::Playing })
        );
        q.pause().unwrap();
        assert_eq!(q.status(), PlaybackStatus::Paused);
        assert_eq!(
            q.pause(),
            Err(QueueError::InvalidState { status: PlaybackStatus::Paused })
        );
        q.resume().unwrap();
        assert_eq!(q.status(), PlaybackStatus::Playing);

        q.pause().unwrap();
        q.stop();
        assert_eq!(q.status(), PlaybackStatus::Idle);
        assert_invariants(&q);
    }

    #[test]
    fn test_clear_keeps_current() {
        let mut q = queue();
        let current = track("A");
        q.enqueue(current.clone()).unwrap();
        q.enqueue(track("B")).unwrap();
        q.enqueue(track("C")).unwrap();

        assert_eq!(q.clear(), 2);
        assert_eq!(q.current(), Some(&current));
        assert_eq!(q.status(), PlaybackStatus::Playing);
        assert_eq!(q.clear(), 0);
    }

    #[test]
    fn test_enqueue_next_goes_to_front() {
        let mut q = queue();
        q.enqueue(track("now")).unwrap();
        q.enqueue(track("a")).unwrap();
        let next = q.enqueue_next(track("urgent")).unwrap();

        assert_eq!(next.position, QueuePosition::Pending(1));
        assert_eq!(titles(&q.snapshot().pending), vec!["urgent", "a"]);
    }

    #[test]
    fn test_move_track() {
        let mut q = queue();
        q.enqueue(track("now")).unwrap();
        for name in ["a", "b", "c"] {
            q.enqueue(track(name)).unwrap();
        }

        q.move_track(3, 1).unwrap();
        assert_eq!(titles(&q.snapshot().pending), vec!["c", "a", "b"]);
        assert_eq!(
            q.move_track(1, 4),
            Err(QueueError::OutOfRange { position: 4, len: 3 })
        );
        assert_eq!(titles(&q.snapshot().pending), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_detach_keeps_pending() {
        let mut q = queue();
        q.enqueue(track("now")).unwrap();
        q.enqueue(track("later")).unwrap();

        q.detach("voice gateway closed");
        assert_eq!(q.status(), PlaybackStatus::Idle);
        assert_eq!(q.snapshot().last_error.as_deref(), Some("voice gateway closed"));
        assert!(q.current().is_none());
        assert_eq!(q.pending_len(), 1);

        // Un enqueue posterior reanuda desde lo pendiente
        let enqueued = q.enqueue(track("new")).unwrap();
        assert_eq!(enqueued.started.as_ref().map(Track::title), Some("later"));
        assert_eq!(enqueued.position, QueuePosition::Pending(1));
        assert_invariants(&q);
    }

    #[test]
    fn test_queue_full() {
        let mut q = RoomQueue::new(2, 50);
        q.enqueue(track("now")).unwrap();
        q.enqueue(track("a")).unwrap();
        q.enqueue(track("b")).unwrap();
        assert_eq!(q.enqueue(track("c")).unwrap_err(), QueueError::QueueFull { max: 2 });
    }

    #[test]
    fn test_history_is_bounded() {
        let mut q = RoomQueue::new(100, 3);
        for i in 0..6 {
            q.enqueue(track(&format!("t{i}"))).unwrap();
        }
        while let Advance::Play(_) = q.advance() {}

        let history: Vec<_> = q.history().map(|t| t.title().to_string()).collect();
        assert_eq!(history, vec!["t3", "t4", "t5"]);

        let snap = q.snapshot();
        assert_eq!(snap.history_len, 3);
        assert_eq!(snap.last_played.as_ref().map(Track::title), Some("t5"));
    }

    #[test]
    fn test_snapshot_pages() {
        let mut q = queue();
        q.enqueue(track("now")).unwrap();
        for i in 1..=12 {
            q.enqueue(track(&format!("t{i}"))).unwrap();
        }

        let snap = q.snapshot();
        assert_eq!(snap.total_duration, Duration::from_secs(12 * 120));

        let page = snap.get_page(2, 10);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.first_position, 11);
        assert_eq!(titles(&page.items), vec!["t11", "t12"]);

        let clamped = snap.get_page(9, 10);
        assert_eq!(clamped.current_page, 2);
    }
}
