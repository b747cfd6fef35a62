use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{File, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{path::Path, sync::Arc};
use tracing::{debug, error, info, warn};

use super::sink::{AudioSink, CompletionToken};

/// Sink sobre una conexión de voz de Songbird para una sola guild.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Mutex<Option<Arc<tokio::sync::Mutex<Call>>>>,
    current_track: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId) -> Self {
        Self {
            manager,
            guild_id,
            call: Mutex::new(None),
            current_track: Mutex::new(None),
        }
    }

    fn call(&self) -> Option<Arc<tokio::sync::Mutex<Call>>> {
        self.call.lock().clone()
    }

    fn track(&self) -> Option<TrackHandle> {
        self.current_track.lock().clone()
    }

    async fn track_mode(&self) -> Option<PlayMode> {
        let track = self.track()?;
        match track.get_info().await {
            Ok(info) => Some(info.playing),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn connect(&self, channel: ChannelId) -> Result<()> {
        match self.manager.join(self.guild_id, channel).await {
            Ok(call) => {
                *self.call.lock() = Some(call);
                info!("🔊 Conectado al canal de voz {} en guild {}", channel, self.guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                // Songbird deja un Call a medio crear si el join falla
                let _ = self.manager.remove(self.guild_id).await;
                anyhow::bail!("No se pudo conectar al canal de voz: {}", e)
            }
        }
    }

    async fn is_connected(&self) -> bool {
        match self.call() {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn play(&self, resource: &Path, completion: CompletionToken) -> Result<()> {
        let call = self
            .call()
            .ok_or_else(|| anyhow::anyhow!("No hay conexión de voz"))?;

        let input: Input = File::new(resource.to_path_buf()).into();

        let track_handle = {
            let mut handler = call.lock().await;
            handler.play_input(input)
        };

        track_handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    completion: completion.clone(),
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;

        track_handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackEndNotifier { completion },
            )
            .map_err(|e| anyhow::anyhow!("Error al agregar event handler: {}", e))?;

        *self.current_track.lock() = Some(track_handle);
        debug!("▶️ Track adjuntado: {}", resource.display());
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        if let Some(track) = self.track() {
            track.pause()?;
            info!("⏸️ Reproducción pausada");
        }
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        if let Some(track) = self.track() {
            track.play()?;
            info!("▶️ Reproducción reanudada");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // El evento End del track avisa al motor
        if let Some(track) = self.current_track.lock().take() {
            if let Err(e) = track.stop() {
                warn!("El track ya había terminado: {:?}", e);
            }
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        matches!(self.track_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.track_mode().await, Some(PlayMode::Pause))
    }

    async fn disconnect(&self) -> Result<()> {
        self.current_track.lock().take();
        let had_call = self.call.lock().take().is_some();

        if let Err(e) = self.manager.remove(self.guild_id).await {
            if had_call {
                warn!("Error al salir del canal de voz: {:?}", e);
            }
        }

        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }
}

/// Reenvía el fin (o error) de un track al motor como mensaje
struct TrackEndNotifier {
    completion: CompletionToken,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut error = None;

        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    error = Some(format!("{:?}", e));
                }
            }
        }

        debug!(
            "Track terminado (generación {}), avisando al motor",
            self.completion.generation()
        );
        self.completion.complete(error);

        None
    }
}
