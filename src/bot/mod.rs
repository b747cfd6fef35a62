//! # Bot Module
//!
//! Discord glue for Open Jukebox.
//!
//! The bot serves exactly one guild at a time. The playback session is created
//! lazily on the first command that needs it and every later command from
//! another guild is rejected.
//!
//! - [`commands`]: slash command definitions and registration
//! - [`handlers`]: one handler per slash command
//! - [`events`]: text-channel announcements for the playback engine

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{
        engine::{EngineSettings, SessionEngine},
        player::SongbirdSink,
        reaper::{count_other_occupants, IdleReaper},
    },
    config::Config,
    sources::{AudioResolver, PlaylistCatalog},
    storage::{run_janitor, AudioCache},
};

/// La sesión de voz única y su guild
pub struct Session {
    pub guild_id: GuildId,
    pub engine: SessionEngine,
    reaper: IdleReaper,
}

/// Main Discord event handler for Open Jukebox.
///
/// Owns the configuration, the resolver and catalog shared by every command,
/// and the lazily created [`Session`].
pub struct JukeboxBot {
    config: Arc<Config>,
    cache: AudioCache,
    resolver: Arc<dyn AudioResolver>,
    catalog: Option<Arc<dyn PlaylistCatalog>>,
    session: OnceCell<Session>,
    janitor_started: AtomicBool,
}

impl JukeboxBot {
    pub fn new(
        config: Config,
        cache: AudioCache,
        resolver: Arc<dyn AudioResolver>,
        catalog: Option<Arc<dyn PlaylistCatalog>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            resolver,
            catalog,
            session: OnceCell::new(),
            janitor_started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> Option<&Arc<dyn PlaylistCatalog>> {
        self.catalog.as_ref()
    }

    /// Devuelve la sesión, creándola si es el primer uso.
    ///
    /// Falla si la sesión ya pertenece a otra guild.
    pub async fn session(&self, ctx: &Context, guild_id: GuildId) -> Result<&Session> {
        let session = self
            .session
            .get_or_try_init(|| async {
                let manager = songbird::get(ctx)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

                let engine = SessionEngine::new(
                    Arc::new(SongbirdSink::new(manager, guild_id)),
                    self.resolver.clone(),
                    Arc::new(events::ChannelAnnouncer::new(ctx.http.clone())),
                    EngineSettings {
                        min_audio_bytes: self.config.min_audio_bytes,
                        advance_debounce: self.config.advance_debounce(),
                    },
                );

                info!("🎛️ Sesión de reproducción creada para guild {}", guild_id);
                Ok::<_, anyhow::Error>(Session {
                    guild_id,
                    reaper: IdleReaper::new(engine.clone()),
                    engine,
                })
            })
            .await?;

        if session.guild_id != guild_id {
            anyhow::bail!("El bot ya está en uso en otro servidor");
        }

        Ok(session)
    }

    /// Si la sesión ya pertenece a otra guild
    pub fn serves_other_guild(&self, guild_id: GuildId) -> bool {
        owned_by_other_guild(self.session.get().map(|s| s.guild_id), guild_id)
    }

    /// La sesión, sólo si ya existe y es de esta guild
    pub fn existing_session(&self, guild_id: GuildId) -> Option<&Session> {
        self.session.get().filter(|s| s.guild_id == guild_id)
    }

    /// Registra comandos slash (por guild si hay GUILD_ID, si no globales)
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
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

    fn start_janitor(&self) {
        // `ready` se repite en cada reconexión del gateway
        if self.janitor_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let cache = self.cache.clone();
        let interval = self.config.janitor_interval();
        let max_age = self.config.cache_max_age();
        tokio::spawn(async move {
            run_janitor(cache, interval, max_age).await;
        });
        info!("🧹 Limpieza periódica de caché iniciada");
    }
}

fn owned_by_other_guild(owner: Option<GuildId>, requested: GuildId) -> bool {
    owner.is_some_and(|owner| owner != requested)
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.start_janitor();
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Detecta desconexiones forzadas y canales vacíos
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(session) = self.existing_session(guild_id) else {
            return;
        };

        let bot_id = ctx.cache.current_user().id;

        // Expulsado o canal borrado
        if new.user_id == bot_id && old.is_some() && new.channel_id.is_none() {
            warn!("🔌 Bot desconectado en guild {}", guild_id);
            session.engine.connection_lost().await;
            return;
        }

        let Some(channel) = session.engine.connected_channel() else {
            return;
        };

        let voice_states: Vec<_> = match ctx.cache.guild(guild_id) {
            Some(guild) => guild
                .voice_states
                .values()
                .map(|state| (state.user_id, state.channel_id))
                .collect(),
            None => {
                debug!("Guild {} no está en caché", guild_id);
                return;
            }
        };

        let others = count_other_occupants(voice_states, channel, bot_id);
        debug!("👥 {} usuarios en el canal de voz", others);
        session.reaper.observe(channel, others).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_different_owner_blocks_the_guild() {
        let home = GuildId::new(1);
        let other = GuildId::new(2);

        assert!(!owned_by_other_guild(None, home));
        assert!(!owned_by_other_guild(Some(home), home));
        assert!(owned_by_other_guild(Some(home), other));
    }
}
