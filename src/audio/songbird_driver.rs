use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::GuildId;
use songbird::{
    input::{HttpRequest, Input},
    tracks::TrackHandle,
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::driver::{DriverError, DriverEvents, PlaybackDriver};
use crate::sources::StreamHandle;

/// Reproduce los streams de una guild en su llamada de songbird.
pub struct SongbirdDriver {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    current: SyncMutex<Option<TrackHandle>>,
}

impl SongbirdDriver {
    pub fn new(guild_id: GuildId, call: Arc<Mutex<Call>>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            guild_id,
            call,
            http,
            volume,
            current: SyncMutex::new(None),
        }
    }

    fn current(&self) -> Option<TrackHandle> {
        self.current.lock().clone()
    }
}

#[async_trait]
impl PlaybackDriver for SongbirdDriver {
    async fn play(&self, stream: StreamHandle, events: DriverEvents) -> Result<(), DriverError> {
        let mut call = self.call.lock().await;

        if call.current_connection().is_none() {
            return Err(DriverError::connection_lost("el bot no está en un canal de voz"));
        }

        call.stop();
        let input: Input = HttpRequest::new(self.http.clone(), stream.url().to_string()).into();
        let track_handle = call.play_input(input);
        drop(call);

        // Configurar volumen por defecto
        let _ = track_handle.set_volume(self.volume);

        track_handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    events: events.clone(),
                },
            )
            .map_err(|e| DriverError::new(format!("Error al agregar event handler: {}", e)))?;
        track_handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorHandler {
                    guild_id: self.guild_id,
                    events,
                },
            )
            .map_err(|e| DriverError::new(format!("Error al agregar event handler: {}", e)))?;

        *self.current.lock() = Some(track_handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), DriverError> {
        if let Some(track) = self.current() {
            track.pause().map_err(|e| DriverError::new(e.to_string()))?;
            info!("⏸️ Reproducción pausada");
        }
        Ok(())
    }

    async fn resume(&self) -> Result<(), DriverError> {
        if let Some(track) = self.current() {
            track.play().map_err(|e| DriverError::new(e.to_string()))?;
            info!("▶️ Reproducción reanudada");
        }
        Ok(())
    }

    async fn halt(&self) {
        self.current.lock().take();
        self.call.lock().await.stop();
    }

    async fn stop(&self) {
        self.current.lock().take();

        let mut call = self.call.lock().await;
        call.stop();
        if let Err(e) = call.leave().await {
            warn!("Error al salir del canal de voz en guild {}: {:?}", self.guild_id, e);
        } else {
            info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        }
    }
}

/// Handler para cuando termina una canción
struct TrackEndHandler {
    events: DriverEvents,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Stream {} terminado", self.events.token());
        self.events.finished().await;
        None
    }
}

/// Handler para errores de tracks
struct TrackErrorHandler {
    guild_id: GuildId,
    events: DriverEvents,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut reason = String::from("error de reproducción");
        if let EventContext::Track(track_list) = ctx {
            if let Some((state, _handle)) = track_list.first() {
                error!(
                    "❌ Error en track para guild {}: {:?}",
                    self.guild_id, state.playing
                );
                reason = format!("{:?}", state.playing);
            }
        }

        self.events.errored(reason, false).await;
        None
    }
}
