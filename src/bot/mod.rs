//! # Bot Module
//!
//! Discord layer of the jukebox: slash command registration and dispatch,
//! voice connections and voice-state tracking.
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`] trait. It owns no
//! queue state itself; every command goes through the [`QueueRegistry`]:
//!
//! - `/play` joins the caller's voice channel and hands a
//!   [`SongbirdDriver`] to the guild's queue
//! - the bot being disconnected mid-playback rejoins the last voice channel
//!   a few times (see [`ReconnectPolicy`]) before detaching the queue;
//!   pending tracks survive either way
//! - the bot being left alone stops the queue when auto-leave is enabled
//! - queue events are announced in the text channel of the last `/play`,
//!   in the guild's language
//!
//! Every reply is looked up through [`Languages`], so `/language` changes
//! take effect on the next command.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{
        ChannelId, Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild,
        VoiceState,
    },
    async_trait,
    builder::CreateMessage,
    http::Http,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use songbird::Call;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    Mutex,
};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod reconnect;

use crate::{
    audio::{
        events::QueueEvent, queue::PlaybackStatus, registry::QueueRegistry,
        songbird_driver::SongbirdDriver,
    },
    config::Config,
    ui::{
        embeds,
        i18n::{Languages, Text},
    },
};

pub use reconnect::ReconnectPolicy;

/// Discord event handler for the jukebox.
pub struct JukeboxBot {
    config: Arc<Config>,
    pub registry: Arc<QueueRegistry>,
    /// Cliente HTTP compartido por los streams de songbird
    http: reqwest::Client,
    /// Canal de texto donde se anuncian los cambios de cada guild
    announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    announcer_started: AtomicBool,
    pub languages: Arc<Languages>,
    /// Último canal de voz pedido con `/play`, destino de las reconexiones
    voice_targets: DashMap<GuildId, ChannelId>,
    reconnect: ReconnectPolicy,
}

impl JukeboxBot {
    pub fn new(config: Config, registry: Arc<QueueRegistry>) -> Self {
        Self {
            languages: Arc::new(Languages::new(config.default_locale)),
            reconnect: config.reconnect_policy(),
            config: Arc::new(config),
            registry,
            http: reqwest::Client::new(),
            announce_channels: Arc::new(DashMap::new()),
            announcer_started: AtomicBool::new(false),
            voice_targets: DashMap::new(),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Guild commands (when `GUILD_ID` is set) propagate in about a second;
    /// global commands can take up to an hour.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Connects to `channel_id` unless the guild already has a live voice
    /// connection, and makes sure the guild's queue has a driver for it.
    ///
    /// A queue can lose its driver while the call stays up (a finished
    /// reconnect, a detach after an error), so an existing connection still
    /// gets a fresh driver when the queue has none.
    pub async fn ensure_voice(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        if let Some(call) = manager.get(guild_id) {
            let connected = call.lock().await.current_channel().is_some();
            if connected {
                // Seguimos en el canal actual aunque el usuario esté en otro
                self.voice_targets.entry(guild_id).or_insert(channel_id);

                if !self.registry.has_driver(guild_id).await {
                    info!("🔁 Reasignando driver de voz en guild {}", guild_id);
                    self.attach_songbird_driver(guild_id, call).await?;
                }
                return Ok(());
            }
        }

        self.join_and_attach(ctx, guild_id, channel_id).await?;
        self.voice_targets.insert(guild_id, channel_id);

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);
        Ok(())
    }

    async fn join_and_attach(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            anyhow::anyhow!("Error al conectar al canal de voz")
        })?;

        self.attach_songbird_driver(guild_id, call).await
    }

    async fn attach_songbird_driver(
        &self,
        guild_id: GuildId,
        call: Arc<Mutex<Call>>,
    ) -> Result<()> {
        let driver = SongbirdDriver::new(
            guild_id,
            call,
            self.http.clone(),
            self.config.default_volume,
        );
        self.registry
            .attach_driver(guild_id, Arc::new(driver))
            .await?;
        Ok(())
    }

    /// Intentional stops must not trigger a reconnect.
    pub fn forget_voice_target(&self, guild_id: GuildId) {
        self.voice_targets.remove(&guild_id);
    }

    /// Handles the bot's own voice connection dropping.
    ///
    /// While something is playing the bot rejoins the last target channel;
    /// if that fails (or nothing was playing) the queue is detached and goes
    /// idle with its pending tracks intact.
    async fn handle_disconnect(&self, ctx: &Context, guild_id: GuildId) {
        let playing = match self.registry.get(guild_id) {
            Some(queue) => queue
                .snapshot()
                .await
                .map(|snapshot| snapshot.status != PlaybackStatus::Idle)
                .unwrap_or(false),
            None => false,
        };
        let target = self.voice_targets.get(&guild_id).map(|c| *c);

        if let (true, Some(channel_id)) = (playing, target) {
            let rejoined = self
                .reconnect
                .run(guild_id, move || self.join_and_attach(ctx, guild_id, channel_id))
                .await;
            if rejoined {
                return;
            }
        }

        self.voice_targets.remove(&guild_id);
        if let Err(e) = self.registry.detach(guild_id).await {
            error!("Error al desconectar la cola: {:?}", e);
        }
    }

    /// Los avisos de la cola de `guild_id` irán a `channel_id`.
    pub fn announce_in(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.announce_channels.insert(guild_id, channel_id);
    }

    /// `true` si el bot está en un canal de voz sin otros usuarios.
    fn bot_is_alone(&self, ctx: &Context, guild_id: GuildId) -> bool {
        let bot_id = ctx.cache.current_user().id;
        let Some(guild) = ctx.cache.guild(guild_id) else {
            return false;
        };
        let Some(channel_id) = guild
            .voice_states
            .get(&bot_id)
            .and_then(|state| state.channel_id)
        else {
            return false;
        };

        !guild
            .voice_states
            .values()
            .any(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión del gateway
        if !self.announcer_started.swap(true, Ordering::SeqCst) {
            let http = ctx.http.clone();
            let events = self.registry.subscribe();
            let channels = self.announce_channels.clone();
            let languages = self.languages.clone();

            tokio::spawn(async move {
                announce_events(http, events, channels, languages).await;
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// The bot left (or was removed from) a guild: its queue goes with it.
    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Una caída temporal de Discord también llega como guild_delete
        if incomplete.unavailable {
            return;
        }

        self.announce_channels.remove(&incomplete.id);
        self.voice_targets.remove(&incomplete.id);
        self.languages.forget_guild(incomplete.id);
        if self.registry.remove(incomplete.id).await {
            if self.registry.is_empty() {
                info!("📊 No quedan colas activas");
            } else {
                info!("📊 Colas activas: {}", self.registry.len());
            }
        }
    }

    /// Tracks the bot's own voice connection and auto-leave.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        // Detectar si el bot fue desconectado
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id == current_user_id {
            if old.is_some() && new.channel_id.is_none() {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.handle_disconnect(&ctx, guild_id).await;
            }
            return;
        }

        // Auto-desconectar si el bot está solo en el canal
        if self.config.auto_leave_empty
            && self.registry.get(guild_id).is_some()
            && self.bot_is_alone(&ctx, guild_id)
        {
            info!("🚪 Bot solo en el canal de voz, deteniendo guild {}", guild_id);
            self.forget_voice_target(guild_id);
            if let Err(e) = self.registry.stop(guild_id).await {
                error!("Error al detener reproducción: {:?}", e);
            }
        }
    }
}

/// Publica los eventos de las colas en el canal de texto de cada guild.
async fn announce_events(
    http: Arc<Http>,
    mut events: broadcast::Receiver<QueueEvent>,
    channels: Arc<DashMap<GuildId, ChannelId>>,
    languages: Arc<Languages>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Se descartaron {} eventos de cola", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(channel_id) = channels.get(&event.guild_id()).map(|c| *c) else {
            continue;
        };

        let locale = languages.for_guild(event.guild_id());
        let embed = match &event {
            QueueEvent::NowPlaying { track, .. } => {
                embeds::create_now_playing_embed(track, PlaybackStatus::Playing, locale)
            }
            QueueEvent::TrackFailed { track, reason, .. } => {
                embeds::create_track_failed_embed(track, reason, locale)
            }
            QueueEvent::Disconnected { .. } => embeds::create_error_embed(
                Text::DisconnectedTitle.get(locale),
                Text::DisconnectedDescription.get(locale),
            ),
            QueueEvent::Idle { guild_id } => {
                debug!("Cola vacía para guild {}", guild_id);
                continue;
            }
        };

        if let Err(e) = channel_id
            .send_message(&http, CreateMessage::new().embed(embed))
            .await
        {
            warn!("No se pudo anunciar en el canal {}: {:?}", channel_id, e);
        }
    }
}
