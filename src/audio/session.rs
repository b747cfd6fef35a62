use serenity::model::id::ChannelId;

use super::queue::QueueEntry;

/// Fase del ciclo descarga/reproducción
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Connecting,
    Downloading,
    Playing,
    Paused,
}

impl PlaybackPhase {
    /// Fases en las que existe una canción actual
    pub fn has_current(self) -> bool {
        matches!(self, Self::Downloading | Self::Playing | Self::Paused)
    }

    /// Fases en las que hay algo adjunto al sink
    pub fn is_audible(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

/// Conexión de voz activa. El `Call` real vive en el sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHandle {
    pub channel_id: ChannelId,
}

/// Qué está pasando ahora mismo en la sesión de voz.
///
/// Siempre se muta bajo el lock del motor y nunca se retiene a través de un `.await`.
#[derive(Debug)]
pub struct SessionState {
    pub connection: Option<ConnectionHandle>,
    pub now_playing: Option<QueueEntry>,
    pub phase: PlaybackPhase,
    /// Activo mientras una secuencia resolver-y-reproducir está en curso
    pub in_flight: bool,
    /// Canal de voz del último usuario que pidió música
    pub voice_channel: Option<ChannelId>,
    /// Canal de texto donde se anuncian las canciones
    pub announce_channel: Option<ChannelId>,
    /// Identifica el track adjunto al sink; las notificaciones de tracks viejos se ignoran
    pub generation: u64,
    /// Se incrementa en cada stop/desconexión para invalidar resoluciones en curso
    pub epoch: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            connection: None,
            now_playing: None,
            phase: PlaybackPhase::Idle,
            in_flight: false,
            voice_channel: None,
            announce_channel: None,
            generation: 0,
            epoch: 0,
        }
    }

    /// Entra en Idle sin canción actual
    pub fn settle_idle(&mut self) {
        self.now_playing = None;
        self.phase = PlaybackPhase::Idle;
    }

    /// Termina la secuencia en curso y libera el guard
    pub fn release(&mut self) {
        self.settle_idle();
        self.in_flight = false;
    }

    /// Reinicia la reproducción tras un stop explícito.
    ///
    /// Sólo se libera el guard si había algo adjunto al sink. En cualquier
    /// otro caso lo tiene una resolución en curso, que verá el `epoch` nuevo,
    /// descartará su resultado y lo soltará ella misma.
    pub fn reset_playback(&mut self) {
        let attached = self.phase.is_audible();
        self.epoch += 1;
        // Cualquier notificación del track actual queda obsoleta
        self.generation += 1;
        self.settle_idle();
        if attached {
            self.in_flight = false;
        }
    }

    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn is_consistent(&self) -> bool {
        self.now_playing.is_some() == self.phase.has_current()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(query: &str) -> QueueEntry {
        QueueEntry {
            query: query.to_string(),
            seq: 0,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn reset_while_playing_releases_guard() {
        let mut state = SessionState::new();
        state.in_flight = true;
        state.phase = PlaybackPhase::Playing;
        state.now_playing = Some(entry("a"));

        state.reset_playback();

        assert_eq!(state.phase, PlaybackPhase::Idle);
        assert!(state.now_playing.is_none());
        assert!(!state.in_flight);
        assert!(state.is_consistent());
    }

    #[test]
    fn reset_while_downloading_keeps_guard_for_resolver() {
        let mut state = SessionState::new();
        state.in_flight = true;
        state.phase = PlaybackPhase::Downloading;
        state.now_playing = Some(entry("a"));
        let epoch = state.epoch;

        state.reset_playback();

        assert!(state.in_flight);
        assert_eq!(state.phase, PlaybackPhase::Idle);
        assert_ne!(state.epoch, epoch);
        assert!(state.is_consistent());
    }

    #[test]
    fn second_reset_during_download_still_keeps_guard() {
        let mut state = SessionState::new();
        state.in_flight = true;
        state.phase = PlaybackPhase::Downloading;

        state.reset_playback();
        state.reset_playback();

        assert!(state.in_flight);
        assert_eq!(state.phase, PlaybackPhase::Idle);
    }
}
