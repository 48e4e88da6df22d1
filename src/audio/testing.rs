//! Fakes shared by the queue tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::UserId;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::broadcast;

use super::{
    driver::{DriverError, DriverEvents, PlaybackDriver},
    events::QueueEvent,
    track::Track,
};
use crate::sources::{AudioResolver, ResolveError, Resolved, StreamHandle};

const SOURCE_PREFIX: &str = "https://media.test/";

pub fn user() -> UserId {
    UserId::new(42)
}

/// Espera el primer evento que cumpla `pred`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<QueueEvent>,
    pred: impl Fn(&QueueEvent) -> bool,
) -> QueueEvent {
    tokio::time::timeout(Duration::from_secs(300), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event never arrived")
}

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Ok,
    NotFound,
    Fail(&'static str),
}

/// Resolver con respuestas y demoras fijadas por búsqueda.
///
/// Una búsqueda `x` produce la pista `x` con fuente `https://media.test/x` y
/// stream `https://cdn.test/x`. Renovar el stream vuelve a pedir la fuente.
pub struct ScriptedResolver {
    script: HashMap<String, (Duration, Outcome)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(mut self, query: &str, delay: Duration, outcome: Outcome) -> Self {
        self.script.insert(query.to_string(), (delay, outcome));
        self
    }

    pub fn calls_handle(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl AudioResolver for ScriptedResolver {
    async fn resolve(&self, query: &str, requested_by: UserId) -> Result<Resolved, ResolveError> {
        self.calls.lock().push(query.to_string());

        let (delay, outcome) = self
            .script
            .get(query)
            .copied()
            .unwrap_or((Duration::ZERO, Outcome::Ok));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match outcome {
            Outcome::Ok => {
                let title = query.strip_prefix(SOURCE_PREFIX).unwrap_or(query);
                Ok(Resolved {
                    track: Track::new(
                        format!("{SOURCE_PREFIX}{title}"),
                        title,
                        Some(Duration::from_secs(180)),
                        requested_by,
                    ),
                    stream: StreamHandle::new(format!("https://cdn.test/{title}")),
                })
            }
            Outcome::NotFound => Err(ResolveError::NotFound(query.to_string())),
            Outcome::Fail(reason) => Err(ResolveError::Failed(reason.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Driver que anota cada llamada y guarda el canal de eventos del último
/// `play`.
#[derive(Default)]
pub struct FakeDriver {
    log: Mutex<Vec<String>>,
    events: Mutex<Option<DriverEvents>>,
    fail_play: Mutex<Option<DriverError>>,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn events(&self) -> Option<DriverEvents> {
        self.events.lock().clone()
    }

    pub fn fail_next_play(&self, err: DriverError) {
        *self.fail_play.lock() = Some(err);
    }

    pub async fn finish(&self) {
        let events = self.events();
        if let Some(events) = events {
            events.finished().await;
        }
    }

    pub async fn error(&self, reason: &str, connection_lost: bool) {
        let events = self.events();
        if let Some(events) = events {
            events.errored(reason, connection_lost).await;
        }
    }
}

#[async_trait]
impl PlaybackDriver for FakeDriver {
    async fn play(&self, stream: StreamHandle, events: DriverEvents) -> Result<(), DriverError> {
        self.log.lock().push(format!("play {}", stream.url()));
        if let Some(err) = self.fail_play.lock().take() {
            return Err(err);
        }
        *self.events.lock() = Some(events);
        Ok(())
    }

    async fn pause(&self) -> Result<(), DriverError> {
        self.log.lock().push("pause".into());
        Ok(())
    }

    async fn resume(&self) -> Result<(), DriverError> {
        self.log.lock().push("resume".into());
        Ok(())
    }

    async fn halt(&self) {
        self.log.lock().push("halt".into());
    }

    async fn stop(&self) {
        self.log.lock().push("stop".into());
    }
}
