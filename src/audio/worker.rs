use serenity::model::id::{GuildId, UserId};
use std::{
    collections::{BTreeMap, HashMap},
    ops::ControlFlow,
    sync::Arc,
    time::Duration,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    driver::{DriverError, DriverEvent, DriverEvents, PlaybackDriver, PlaybackToken},
    events::QueueEvent,
    queue::{Advance, PlaybackStatus, QueuePosition, QueueSnapshot, RoomQueue},
    track::{Track, TrackId},
};
use crate::{
    error::QueueError,
    sources::{resolve_with_timeout, AudioResolver, ResolveError, Resolved, StreamHandle},
};

type Reply<T> = oneshot::Sender<T>;

/// Parámetros de cada cola de guild.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_queue_size: usize,
    pub max_history: usize,
    pub resolve_timeout: Duration,
    pub stream_ttl: Duration,
    pub command_buffer: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_history: 50,
            resolve_timeout: Duration::from_secs(30),
            stream_ttl: Duration::from_secs(4 * 3600),
            command_buffer: 64,
        }
    }
}

/// Pista agregada con éxito y dónde quedó.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Added {
    pub track: Track,
    pub position: QueuePosition,
}

/// Mensajes que procesa el worker de una guild, uno a la vez.
pub(crate) enum Command {
    Enqueue {
        query: String,
        requested_by: UserId,
        next: bool,
        reply: Reply<Result<Added, QueueError>>,
    },
    Resolved {
        ticket: u64,
        result: Result<Resolved, ResolveError>,
    },
    StreamReady {
        token: PlaybackToken,
        result: Result<StreamHandle, ResolveError>,
    },
    Skip {
        reply: Reply<Option<Track>>,
    },
    Pause {
        reply: Reply<Result<(), QueueError>>,
    },
    Resume {
        reply: Reply<Result<(), QueueError>>,
    },
    Stop {
        reply: Reply<usize>,
    },
    Clear {
        reply: Reply<usize>,
    },
    Shuffle {
        reply: Reply<()>,
    },
    Remove {
        position: usize,
        reply: Reply<Result<Track, QueueError>>,
    },
    Move {
        from: usize,
        to: usize,
        reply: Reply<Result<(), QueueError>>,
    },
    Snapshot {
        reply: Reply<QueueSnapshot>,
    },
    AttachDriver {
        driver: Arc<dyn PlaybackDriver>,
        reply: Reply<()>,
    },
    Detach {
        reply: Reply<()>,
    },
    HasDriver {
        reply: Reply<bool>,
    },
    Driver(DriverEvent),
    Shutdown,
}

/// Handle de la cola de una guild. Clonarlo es barato; todas las copias
/// hablan con el mismo worker.
#[derive(Clone)]
pub struct GuildQueue {
    guild_id: GuildId,
    tx: mpsc::Sender<Command>,
}

impl GuildQueue {
    /// Crea la cola y lanza su worker.
    pub fn spawn(
        guild_id: GuildId,
        resolver: Arc<dyn AudioResolver>,
        events: broadcast::Sender<QueueEvent>,
        settings: WorkerSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.command_buffer.max(1));

        let worker = GuildWorker {
            guild_id,
            queue: RoomQueue::new(settings.max_queue_size, settings.max_history),
            resolver,
            driver: None,
            streams: HashMap::new(),
            playback: Playback::Stopped,
            token_seq: 0,
            next_ticket: 0,
            inflight: BTreeMap::new(),
            cancel: CancellationToken::new(),
            tx: tx.downgrade(),
            events,
            settings,
        };
        tokio::spawn(worker.run(rx));

        Self { guild_id, tx }
    }

    /// `true` si ambos handles apuntan al mismo worker.
    #[cfg(test)]
    pub fn same_queue(&self, other: &GuildQueue) -> bool {
        self.tx.same_channel(&other.tx)
    }

    /// Resuelve `query` y la agrega al final. Si la cola estaba en `Idle`
    /// empieza a sonar.
    pub async fn enqueue(
        &self,
        query: impl Into<String>,
        requested_by: UserId,
    ) -> Result<Added, QueueError> {
        let query = query.into();
        self.request(|reply| Command::Enqueue {
            query,
            requested_by,
            next: false,
            reply,
        })
        .await?
    }

    /// Como `enqueue`, pero la deja en la posición 1.
    pub async fn enqueue_next(
        &self,
        query: impl Into<String>,
        requested_by: UserId,
    ) -> Result<Added, QueueError> {
        let query = query.into();
        self.request(|reply| Command::Enqueue {
            query,
            requested_by,
            next: true,
            reply,
        })
        .await?
    }

    /// Salta la pista actual. Devuelve la pista saltada.
    pub async fn skip(&self) -> Result<Option<Track>, QueueError> {
        self.request(|reply| Command::Skip { reply }).await
    }

    pub async fn pause(&self) -> Result<(), QueueError> {
        self.request(|reply| Command::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<(), QueueError> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    /// Detiene todo, cancela resoluciones en curso y suelta la conexión.
    pub async fn stop(&self) -> Result<usize, QueueError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn clear(&self) -> Result<usize, QueueError> {
        self.request(|reply| Command::Clear { reply }).await
    }

    pub async fn shuffle(&self) -> Result<(), QueueError> {
        self.request(|reply| Command::Shuffle { reply }).await
    }

    pub async fn remove(&self, position: usize) -> Result<Track, QueueError> {
        self.request(|reply| Command::Remove { position, reply }).await?
    }

    pub async fn move_track(&self, from: usize, to: usize) -> Result<(), QueueError> {
        self.request(|reply| Command::Move { from, to, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<QueueSnapshot, QueueError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Asigna la conexión de voz que reproducirá esta cola.
    pub async fn attach_driver(&self, driver: Arc<dyn PlaybackDriver>) -> Result<(), QueueError> {
        self.request(|reply| Command::AttachDriver { driver, reply }).await
    }

    /// `true` si la cola tiene una conexión de voz asignada.
    pub async fn has_driver(&self) -> Result<bool, QueueError> {
        self.request(|reply| Command::HasDriver { reply }).await
    }

    /// Avisa que la conexión de voz se perdió.
    pub async fn detach(&self) -> Result<(), QueueError> {
        self.request(|reply| Command::Detach { reply }).await
    }

    pub async fn shutdown(&self) {
        if self.tx.send(Command::Shutdown).await.is_err() {
            debug!("Worker de guild {} ya estaba cerrado", self.guild_id);
        }
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, QueueError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| QueueError::Closed)?;
        rx.await.map_err(|_| QueueError::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playback {
    /// Nada sonando en el driver
    Stopped,
    /// Renovando el stream de la pista actual
    Resolving(PlaybackToken),
    Streaming(PlaybackToken),
}

struct InFlight {
    next: bool,
    reply: Reply<Result<Added, QueueError>>,
    result: Option<Result<Resolved, ResolveError>>,
}

/// Dueño exclusivo del estado de una guild. Procesa los comandos en orden
/// de llegada.
struct GuildWorker {
    guild_id: GuildId,
    queue: RoomQueue,
    resolver: Arc<dyn AudioResolver>,
    driver: Option<Arc<dyn PlaybackDriver>>,
    streams: HashMap<TrackId, StreamHandle>,
    playback: Playback,
    token_seq: u64,
    next_ticket: u64,
    /// Enqueues esperando al resolver, por orden de llegada
    inflight: BTreeMap<u64, InFlight>,
    cancel: CancellationToken,
    tx: mpsc::WeakSender<Command>,
    events: broadcast::Sender<QueueEvent>,
    settings: WorkerSettings,
}

impl GuildWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!("🎛️ Cola iniciada para guild {}", self.guild_id);

        while let Some(command) = rx.recv().await {
            if self.handle(command).await.is_break() {
                break;
            }
        }

        self.shutdown().await;
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Enqueue {
                query,
                requested_by,
                next,
                reply,
            } => self.begin_enqueue(query, requested_by, next, reply),
            Command::Resolved { ticket, result } => self.finish_enqueue(ticket, result).await,
            Command::StreamReady { token, result } => self.stream_ready(token, result).await,
            Command::Skip { reply } => {
                let skipped = self.skip().await;
                let _ = reply.send(skipped);
            }
            Command::Pause { reply } => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let dropped = self.stop().await;
                let _ = reply.send(dropped);
            }
            Command::Clear { reply } => {
                let cleared = self.clear();
                let _ = reply.send(cleared);
            }
            Command::Shuffle { reply } => {
                self.queue.shuffle();
                let _ = reply.send(());
            }
            Command::Remove { position, reply } => {
                let result = self.queue.remove(position);
                if let Ok(track) = &result {
                    self.streams.remove(&track.id());
                }
                let _ = reply.send(result);
            }
            Command::Move { from, to, reply } => {
                let _ = reply.send(self.queue.move_track(from, to));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.queue.snapshot());
            }
            Command::AttachDriver { driver, reply } => {
                self.attach(driver).await;
                let _ = reply.send(());
            }
            Command::Detach { reply } => {
                self.lose_connection("desconectado del canal de voz").await;
                let _ = reply.send(());
            }
            Command::HasDriver { reply } => {
                let _ = reply.send(self.driver.is_some());
            }
            Command::Driver(event) => self.driver_event(event).await,
            Command::Shutdown => return ControlFlow::Break(()),
        }

        ControlFlow::Continue(())
    }

    fn begin_enqueue(
        &mut self,
        query: String,
        requested_by: UserId,
        next: bool,
        reply: Reply<Result<Added, QueueError>>,
    ) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.inflight.insert(
            ticket,
            InFlight {
                next,
                reply,
                result: None,
            },
        );

        let resolver = self.resolver.clone();
        let cancel = self.cancel.clone();
        let tx = self.tx.clone();
        let limit = self.settings.resolve_timeout;

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = resolve_with_timeout(resolver.as_ref(), &query, requested_by, limit) => result,
            };
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::Resolved { ticket, result }).await;
            }
        });
    }

    async fn finish_enqueue(&mut self, ticket: u64, result: Result<Resolved, ResolveError>) {
        match self.inflight.get_mut(&ticket) {
            Some(entry) => entry.result = Some(result),
            None => {
                debug!("Resolución {} descartada (cancelada)", ticket);
                return;
            }
        }

        // Se aplican en el orden en que se pidieron
        while let Some(entry) = self.inflight.first_entry() {
            if entry.get().result.is_none() {
                break;
            }
            let InFlight { next, reply, result } = entry.remove();
            let Some(result) = result else { continue };

            let (outcome, started) = self.apply_resolved(result, next);
            let _ = reply.send(outcome);
            if started {
                self.start_current().await;
            }
        }
    }

    fn apply_resolved(
        &mut self,
        result: Result<Resolved, ResolveError>,
        next: bool,
    ) -> (Result<Added, QueueError>, bool) {
        let Resolved { track, stream } = match result {
            Ok(resolved) => resolved,
            Err(err) => {
                warn!("❌ No se pudo agregar a la cola en guild {}: {}", self.guild_id, err);
                return (Err(err.into()), false);
            }
        };

        let enqueued = if next {
            self.queue.enqueue_next(track.clone())
        } else {
            self.queue.enqueue(track.clone())
        };

        match enqueued {
            Ok(enqueued) => {
                self.streams.insert(track.id(), stream);
                let added = Added {
                    track,
                    position: enqueued.position,
                };
                (Ok(added), enqueued.started.is_some())
            }
            Err(err) => (Err(err), false),
        }
    }

    /// Manda la pista actual al driver. Si falla sigue con las siguientes
    /// hasta que una arranque o la cola quede vacía.
    async fn start_current(&mut self) {
        while let Some(track) = self.queue.current().cloned() {
            let stream = match self.streams.remove(&track.id()) {
                Some(stream) if !stream.is_stale(self.settings.stream_ttl) => stream,
                _ => {
                    self.resolve_stream(&track);
                    return;
                }
            };

            let token = self.next_token();
            let err = match self.play_stream(token, &track, stream).await {
                Ok(()) => return,
                Err(err) => err,
            };

            if err.connection_lost {
                self.lose_connection(err.reason).await;
                return;
            }

            warn!("⏭️ Saltando '{}' por error: {}", track.title(), err.reason);
            self.emit(QueueEvent::TrackFailed {
                guild_id: self.guild_id,
                track,
                reason: err.reason.clone(),
            });
            if self.queue.fail_current(err.reason) == Advance::Idle {
                self.go_idle().await;
                return;
            }
        }
    }

    /// Pide un stream nuevo para la pista actual; el resultado vuelve como
    /// `StreamReady`.
    fn resolve_stream(&mut self, track: &Track) {
        let token = self.next_token();
        self.playback = Playback::Resolving(token);
        info!("🔄 Obteniendo stream para: {}", track.title());

        let resolver = self.resolver.clone();
        let cancel = self.cancel.clone();
        let tx = self.tx.clone();
        let limit = self.settings.resolve_timeout;
        let source = track.source().to_string();
        let requested_by = track.requested_by();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = resolve_with_timeout(resolver.as_ref(), &source, requested_by, limit) => {
                    result.map(|resolved| resolved.stream)
                }
            };
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::StreamReady { token, result }).await;
            }
        });
    }

    async fn stream_ready(&mut self, token: PlaybackToken, result: Result<StreamHandle, ResolveError>) {
        if self.playback != Playback::Resolving(token) {
            debug!("Stream obsoleto {} descartado", token);
            return;
        }
        self.playback = Playback::Stopped;

        let Some(track) = self.queue.current().cloned() else {
            return;
        };

        match result {
            Ok(stream) => {
                if let Err(err) = self.play_stream(token, &track, stream).await {
                    self.handle_play_error(&track, err).await;
                }
            }
            Err(err) => {
                let reason = QueueError::from(err).to_string();
                self.fail_and_continue(&track, reason).await;
            }
        }
    }

    async fn play_stream(
        &mut self,
        token: PlaybackToken,
        track: &Track,
        stream: StreamHandle,
    ) -> Result<(), DriverError> {
        let Some(driver) = self.driver.clone() else {
            warn!(
                "🔇 Sin conexión de voz en guild {}, '{}' queda en espera",
                self.guild_id,
                track.title()
            );
            self.streams.insert(track.id(), stream);
            self.playback = Playback::Stopped;
            return Ok(());
        };

        driver
            .play(stream, DriverEvents::new(token, self.tx.clone()))
            .await?;
        self.playback = Playback::Streaming(token);

        // Se pausó mientras se resolvía el stream
        if self.queue.status() == PlaybackStatus::Paused {
            if let Err(e) = driver.pause().await {
                warn!("No se pudo pausar el driver: {}", e);
            }
        }

        info!("🎵 Reproduciendo: {} ({})", track.title(), token);
        self.emit(QueueEvent::NowPlaying {
            guild_id: self.guild_id,
            track: track.clone(),
        });
        Ok(())
    }

    async fn driver_event(&mut self, event: DriverEvent) {
        if self.playback != Playback::Streaming(event.token()) {
            debug!("Evento obsoleto de {} ignorado", event.token());
            return;
        }
        self.playback = Playback::Stopped;

        let Some(track) = self.queue.current().cloned() else {
            return;
        };

        match event {
            DriverEvent::Finished { .. } => {
                debug!("Track terminado, reproduciendo siguiente...");
                match self.queue.finish_current() {
                    Advance::Play(_) => self.start_current().await,
                    Advance::Idle => self.go_idle().await,
                }
            }
            DriverEvent::Errored {
                reason,
                connection_lost,
                ..
            } => {
                error!(
                    "❌ Error en track '{}' para guild {}: {}",
                    track.title(),
                    self.guild_id,
                    reason
                );
                let err = DriverError {
                    reason,
                    connection_lost,
                };
                self.handle_play_error(&track, err).await;
            }
        }
    }

    async fn handle_play_error(&mut self, track: &Track, err: DriverError) {
        if err.connection_lost {
            self.lose_connection(err.reason).await;
        } else {
            self.fail_and_continue(track, err.reason).await;
        }
    }

    async fn fail_and_continue(&mut self, track: &Track, reason: String) {
        warn!("⏭️ Saltando '{}' por error: {}", track.title(), reason);
        self.emit(QueueEvent::TrackFailed {
            guild_id: self.guild_id,
            track: track.clone(),
            reason: reason.clone(),
        });

        match self.queue.fail_current(reason) {
            Advance::Play(_) => self.start_current().await,
            Advance::Idle => self.go_idle().await,
        }
    }

    async fn skip(&mut self) -> Option<Track> {
        let skipped = self.queue.current().cloned();
        self.halt_stream().await;

        if let Some(track) = &skipped {
            info!("⏭️ Saltando: {}", track.title());
            self.streams.remove(&track.id());
        }

        match self.queue.advance() {
            Advance::Play(_) => self.start_current().await,
            Advance::Idle if skipped.is_some() => self.go_idle().await,
            Advance::Idle => {}
        }

        skipped
    }

    async fn pause(&mut self) -> Result<(), QueueError> {
        self.queue.pause()?;
        if let (Playback::Streaming(_), Some(driver)) = (self.playback, &self.driver) {
            if let Err(e) = driver.pause().await {
                warn!("No se pudo pausar el driver: {}", e);
                self.queue.resume()?;
                return Err(QueueError::Driver(e.reason));
            }
        }
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), QueueError> {
        self.queue.resume()?;
        if let (Playback::Streaming(_), Some(driver)) = (self.playback, &self.driver) {
            if let Err(e) = driver.resume().await {
                warn!("No se pudo reanudar el driver: {}", e);
                self.queue.pause()?;
                return Err(QueueError::Driver(e.reason));
            }
        }
        Ok(())
    }

    async fn stop(&mut self) -> usize {
        self.cancel_inflight(QueueError::Cancelled);
        let dropped = self.queue.stop();
        self.playback = Playback::Stopped;
        self.streams.clear();

        if let Some(driver) = self.driver.take() {
            driver.stop().await;
        }

        self.emit(QueueEvent::Idle {
            guild_id: self.guild_id,
        });
        dropped
    }

    fn clear(&mut self) -> usize {
        let cleared = self.queue.clear();
        let current = self.queue.current().map(Track::id);
        self.streams.retain(|id, _| Some(*id) == current);
        cleared
    }

    async fn attach(&mut self, driver: Arc<dyn PlaybackDriver>) {
        if let Some(previous) = self.driver.replace(driver) {
            if matches!(self.playback, Playback::Streaming(_)) {
                previous.halt().await;
                self.playback = Playback::Stopped;
            }
        }
        info!("🔊 Conexión de voz asignada a guild {}", self.guild_id);

        if self.queue.current().is_some() && self.playback == Playback::Stopped {
            self.start_current().await;
        }
    }

    /// La conexión de voz desapareció: `Idle` sin perder lo pendiente.
    async fn lose_connection(&mut self, reason: impl Into<String>) {
        let had_driver = self.driver.take().is_some();
        self.playback = Playback::Stopped;
        if let Some(id) = self.queue.current().map(Track::id) {
            self.streams.remove(&id);
        }

        if !had_driver && self.queue.current().is_none() {
            return;
        }

        let reason = reason.into();
        warn!("🔌 Conexión de voz perdida en guild {}: {}", self.guild_id, reason);
        self.queue.detach(reason.clone());
        self.emit(QueueEvent::Disconnected {
            guild_id: self.guild_id,
            reason,
        });
    }

    async fn go_idle(&mut self) {
        self.playback = Playback::Stopped;
        self.streams.clear();

        if let Some(driver) = self.driver.take() {
            driver.stop().await;
        }

        info!("📭 Cola terminada en guild {}", self.guild_id);
        self.emit(QueueEvent::Idle {
            guild_id: self.guild_id,
        });
    }

    async fn halt_stream(&mut self) {
        if let (Playback::Streaming(_), Some(driver)) = (self.playback, &self.driver) {
            driver.halt().await;
        }
        self.playback = Playback::Stopped;
    }

    fn cancel_inflight(&mut self, err: QueueError) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();

        let inflight = std::mem::take(&mut self.inflight);
        if !inflight.is_empty() {
            info!("🚫 Canceladas {} búsquedas en curso", inflight.len());
        }
        for (_, entry) in inflight {
            let _ = entry.reply.send(Err(err.clone()));
        }
    }

    async fn shutdown(&mut self) {
        self.cancel_inflight(QueueError::Closed);
        self.queue.stop();
        self.streams.clear();

        if let Some(driver) = self.driver.take() {
            driver.stop().await;
        }

        info!("🧹 Cola de guild {} cerrada", self.guild_id);
    }

    fn next_token(&mut self) -> PlaybackToken {
        self.token_seq += 1;
        PlaybackToken(self.token_seq)
    }

    fn emit(&self, event: QueueEvent) {
        // Sin suscriptores no es un error
        let _ = self.events.send(event);
    }
}
