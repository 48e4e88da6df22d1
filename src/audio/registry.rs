use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::{
    driver::PlaybackDriver,
    events::QueueEvent,
    queue::QueueSnapshot,
    track::Track,
    worker::{Added, GuildQueue, WorkerSettings},
};
use crate::{error::QueueError, sources::AudioResolver};

const EVENT_BUFFER: usize = 256;

/// Colas por guild. Cada guild tiene exactamente una, creada al primer uso.
pub struct QueueRegistry {
    queues: DashMap<GuildId, GuildQueue>,
    resolver: Arc<dyn AudioResolver>,
    events: broadcast::Sender<QueueEvent>,
    settings: WorkerSettings,
}

impl QueueRegistry {
    pub fn new(resolver: Arc<dyn AudioResolver>, settings: WorkerSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            queues: DashMap::new(),
            resolver,
            events,
            settings,
        }
    }

    /// Devuelve la cola de la guild, creándola si no existe.
    pub fn get_or_create(&self, guild_id: GuildId) -> GuildQueue {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| {
                info!("📋 Nueva cola para guild {}", guild_id);
                GuildQueue::spawn(
                    guild_id,
                    self.resolver.clone(),
                    self.events.clone(),
                    self.settings.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<GuildQueue> {
        self.queues.get(&guild_id).map(|queue| queue.clone())
    }

    /// Descarta la cola de la guild y cierra su worker.
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        match self.queues.remove(&guild_id) {
            Some((_, queue)) => {
                queue.shutdown().await;
                info!("🗑️ Cola eliminada para guild {}", guild_id);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        query: &str,
        requested_by: UserId,
    ) -> Result<Added, QueueError> {
        self.get_or_create(guild_id).enqueue(query, requested_by).await
    }

    pub async fn enqueue_next(
        &self,
        guild_id: GuildId,
        query: &str,
        requested_by: UserId,
    ) -> Result<Added, QueueError> {
        self.get_or_create(guild_id)
            .enqueue_next(query, requested_by)
            .await
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<Option<Track>, QueueError> {
        self.get_or_create(guild_id).skip().await
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), QueueError> {
        self.get_or_create(guild_id).pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), QueueError> {
        self.get_or_create(guild_id).resume().await
    }

    pub async fn stop(&self, guild_id: GuildId) -> Result<usize, QueueError> {
        self.get_or_create(guild_id).stop().await
    }

    pub async fn clear(&self, guild_id: GuildId) -> Result<usize, QueueError> {
        self.get_or_create(guild_id).clear().await
    }

    pub async fn shuffle(&self, guild_id: GuildId) -> Result<(), QueueError> {
        self.get_or_create(guild_id).shuffle().await
    }

    pub async fn remove_at(&self, guild_id: GuildId, position: usize) -> Result<Track, QueueError> {
        self.get_or_create(guild_id).remove(position).await
    }

    pub async fn move_track(
        &self,
        guild_id: GuildId,
        from: usize,
        to: usize,
    ) -> Result<(), QueueError> {
        self.get_or_create(guild_id).move_track(from, to).await
    }

    pub async fn status(&self, guild_id: GuildId) -> Result<QueueSnapshot, QueueError> {
        self.get_or_create(guild_id).snapshot().await
    }

    pub async fn attach_driver(
        &self,
        guild_id: GuildId,
        driver: Arc<dyn PlaybackDriver>,
    ) -> Result<(), QueueError> {
        self.get_or_create(guild_id).attach_driver(driver).await
    }

    /// `true` si la cola de la guild existe y tiene driver. No crea colas.
    pub async fn has_driver(&self, guild_id: GuildId) -> bool {
        match self.get(guild_id) {
            Some(queue) => queue.has_driver().await.unwrap_or(false),
            None => false,
        }
    }

    /// La conexión de voz de la guild se cerró. No crea colas nuevas.
    pub async fn detach(&self, guild_id: GuildId) -> Result<(), QueueError> {
        match self.get(guild_id) {
            Some(queue) => queue.detach().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            queue::{PlaybackStatus, QueuePosition},
            testing::{user, FakeDriver, ScriptedResolver},
        },
        sources::{MockAudioResolver, ResolveError, Resolved, StreamHandle},
    };
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn registry() -> Arc<QueueRegistry> {
        Arc::new(QueueRegistry::new(
            Arc::new(ScriptedResolver::new()),
            WorkerSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_concurrent_first_access_creates_one_queue() {
        let registry = registry();
        let guild = GuildId::new(7);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create(guild) })
            })
            .collect();

        let mut queues = Vec::new();
        for handle in handles {
            queues.push(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 1);
        assert!(queues.iter().all(|q| q.same_queue(&queues[0])));
    }

    #[tokio::test]
    async fn test_guilds_are_independent() {
        let registry = registry();
        let (one, two) = (GuildId::new(1), GuildId::new(2));
        registry.attach_driver(one, FakeDriver::new()).await.unwrap();

        registry.enqueue(one, "a", user()).await.unwrap();
        registry.enqueue(one, "b", user()).await.unwrap();

        let other = registry.status(two).await.unwrap();
        assert_eq!(other.status, PlaybackStatus::Idle);
        assert!(other.pending.is_empty());

        registry.stop(two).await.unwrap();
        let first = registry.status(one).await.unwrap();
        assert_eq!(first.status, PlaybackStatus::Playing);
        assert_eq!(first.pending.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_starts_fresh_queue() {
        let registry = registry();
        let guild = GuildId::new(3);
        let driver = FakeDriver::new();
        registry.attach_driver(guild, driver.clone()).await.unwrap();
        registry.enqueue(guild, "a", user()).await.unwrap();

        assert!(registry.remove(guild).await);
        assert!(!registry.remove(guild).await);
        assert!(registry.get(guild).is_none());

        let fresh = registry.status(guild).await.unwrap();
        assert_eq!(fresh.status, PlaybackStatus::Idle);
        assert!(fresh.current.is_none());
        assert_eq!(fresh.history_len, 0);
    }

    #[tokio::test]
    async fn test_detach_does_not_create_queues() {
        let registry = registry();
        registry.detach(GuildId::new(99)).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_remove_through_registry() {
        let registry = registry();
        let guild = GuildId::new(4);
        registry.enqueue(guild, "a", user()).await.unwrap();
        registry.enqueue(guild, "b", user()).await.unwrap();

        assert_eq!(
            registry.remove_at(guild, 5).await.unwrap_err(),
            QueueError::OutOfRange { position: 5, len: 1 }
        );
        assert_eq!(registry.status(guild).await.unwrap().pending.len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_uses_resolver() {
        let mut resolver = MockAudioResolver::new();
        resolver
            .expect_resolve()
            .with(eq("https://www.youtube.com/watch?v=a"), eq(user()))
            .times(1)
            .returning(|query, requested_by| {
                Ok(Resolved {
                    track: Track::new(query, "Song A", Some(Duration::from_secs(200)), requested_by),
                    stream: StreamHandle::new("https://cdn.example.com/a"),
                })
            });
        resolver
            .expect_resolve()
            .with(eq("nada"), eq(user()))
            .returning(|query, _| Err(ResolveError::NotFound(query.to_string())));
        resolver.expect_name().return_const("mock");

        let registry = QueueRegistry::new(Arc::new(resolver), WorkerSettings::default());
        let guild = GuildId::new(5);
        let driver = FakeDriver::new();
        registry.attach_driver(guild, driver.clone()).await.unwrap();

        let added = registry
            .enqueue(guild, "https://www.youtube.com/watch?v=a", user())
            .await
            .unwrap();
        assert_eq!(added.position, QueuePosition::NowPlaying);
        assert_eq!(added.track.title(), "Song A");
        assert_eq!(driver.log(), vec!["play https://cdn.example.com/a"]);

        assert_eq!(
            registry.enqueue(guild, "nada", user()).await.unwrap_err(),
            QueueError::NotFound("nada".into())
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_now_playing() {
        let registry = registry();
        let mut events = registry.subscribe();
        let guild = GuildId::new(6);
        registry.attach_driver(guild, FakeDriver::new()).await.unwrap();

        registry.enqueue(guild, "a", user()).await.unwrap();

        match events.recv().await.unwrap() {
            QueueEvent::NowPlaying { guild_id, track } => {
                assert_eq!(guild_id, guild);
                assert_eq!(track.title(), "a");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
