//! Motor de la cola de reproducción.
//!
//! Serializa los pedidos en una cola FIFO y garantiza que como mucho una
//! secuencia resolver-y-reproducir esté activa a la vez (el guard `in_flight`
//! de [`SessionState`]). Los avisos de fin de track llegan desde el sink como
//! mensajes a un bucle de eventos propio, que espera un debounce corto y
//! vuelve a avanzar la cola.
//!
//! Reglas de locking: `state` siempre se toma antes que `queue`, ninguno de los
//! dos se retiene a través de un `.await`, y toda llamada al sink que cambia lo
//! que suena pasa por `control`.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::ChannelId;
use std::{
    path::PathBuf,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{
    error::{PlaybackError, PlaybackResult},
    queue::{QueueEntry, TrackQueue},
    session::{ConnectionHandle, PlaybackPhase, SessionState},
    sink::{AudioSink, CompletionToken, SinkEvent},
};
use crate::sources::{verify_min_size, AudioResolver, ResolveError};

/// Avisos best-effort hacia el canal de texto
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn now_playing(&self, channel: ChannelId, entry: &QueueEntry) -> anyhow::Result<()>;

    async fn skipped(&self, channel: ChannelId, entry: &QueueEntry, reason: &str)
        -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Tamaño mínimo aceptable de un archivo resuelto
    pub min_audio_bytes: u64,
    /// Espera antes de avanzar tras el fin de un track
    pub advance_debounce: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_audio_bytes: 10 * 1024,
            advance_debounce: Duration::from_millis(500),
        }
    }
}

/// Resultado de un intento de avanzar la cola
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Started(QueueEntry),
    Idle,
}

#[derive(Debug, Clone)]
pub struct Enqueued {
    pub entry: QueueEntry,
    /// Posición 1-based entre las pendientes al momento de encolar
    pub position: usize,
    /// Qué empezó a sonar si este pedido disparó el avance
    pub started: Option<QueueEntry>,
}

impl Enqueued {
    pub fn started_immediately(&self) -> bool {
        self.started.as_ref().map(|e| e.seq) == Some(self.entry.seq)
    }
}

#[derive(Debug, Clone)]
pub struct BatchEnqueued {
    pub added: usize,
    pub started: Option<QueueEntry>,
}

#[derive(Debug, Clone)]
pub struct SkippedTo {
    pub target: QueueEntry,
    pub discarded: usize,
}

/// Foto consistente de la sesión
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub phase: PlaybackPhase,
    pub now_playing: Option<QueueEntry>,
    pub pending: Vec<QueueEntry>,
}

impl QueueSnapshot {
    /// Sesión que todavía no existe
    pub fn empty() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            now_playing: None,
            pending: Vec::new(),
        }
    }
}

enum Claim {
    Busy,
    Empty,
    Entry(QueueEntry, u64),
}

enum Attempt {
    Started,
    Skipped(PlaybackError),
    Cancelled,
}

struct EngineInner {
    state: Mutex<SessionState>,
    queue: Mutex<TrackQueue>,
    control: tokio::sync::Mutex<()>,
    sink: Arc<dyn AudioSink>,
    resolver: Arc<dyn AudioResolver>,
    announcer: Arc<dyn Announcer>,
    events: mpsc::UnboundedSender<SinkEvent>,
    settings: EngineSettings,
}

/// Handle clonable a la única sesión de reproducción
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    /// Crea el motor y arranca su bucle de eventos. Requiere un runtime de Tokio.
    pub fn new(
        sink: Arc<dyn AudioSink>,
        resolver: Arc<dyn AudioResolver>,
        announcer: Arc<dyn Announcer>,
        settings: EngineSettings,
    ) -> Self {
        let (events, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(EngineInner {
            state: Mutex::new(SessionState::new()),
            queue: Mutex::new(TrackQueue::new()),
            control: tokio::sync::Mutex::new(()),
            sink,
            resolver,
            announcer,
            events,
            settings,
        });

        tokio::spawn(run_event_loop(Arc::downgrade(&inner), rx));

        Self { inner }
    }

    /// Recuerda a dónde conectarse y dónde anunciar
    pub fn bind_channels(&self, voice: ChannelId, announce: Option<ChannelId>) {
        let mut state = self.inner.state.lock();
        state.voice_channel = Some(voice);
        if announce.is_some() {
            state.announce_channel = announce;
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.inner.state.lock().phase
    }

    pub fn connected_channel(&self) -> Option<ChannelId> {
        self.inner.state.lock().connection.map(|c| c.channel_id)
    }

    /// Agrega un pedido y, si no suena nada, arranca la reproducción
    pub async fn enqueue(&self, query: impl Into<String>) -> PlaybackResult<Enqueued> {
        let (entry, position, idle) = {
            let state = self.inner.state.lock();
            let mut queue = self.inner.queue.lock();
            let (position, entry) = queue.push(query);
            (entry, position, is_idle(&state))
        };

        let started = if idle { self.kick().await? } else { None };

        Ok(Enqueued {
            entry,
            position,
            started,
        })
    }

    /// Agrega un lote de una sola vez; nadie puede intercalarse
    pub async fn enqueue_many<I, S>(&self, queries: I) -> PlaybackResult<BatchEnqueued>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (added, idle) = {
            let state = self.inner.state.lock();
            let mut queue = self.inner.queue.lock();
            (queue.push_many(queries), is_idle(&state))
        };

        let started = if idle && added > 0 {
            self.kick().await?
        } else {
            None
        };

        Ok(BatchEnqueued { added, started })
    }

    /// Avanza ignorando el caso "ya hay algo en curso"
    async fn kick(&self) -> PlaybackResult<Option<QueueEntry>> {
        match self.advance_queue().await {
            Ok(AdvanceOutcome::Started(entry)) => Ok(Some(entry)),
            Ok(AdvanceOutcome::Idle) => Ok(None),
            Err(PlaybackError::AlreadyInProgress) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Saca la siguiente entrada, la resuelve y la manda al sink.
    ///
    /// Las entradas que no se pueden resolver se descartan y se prueba la
    /// siguiente; el bucle termina a lo sumo cuando la cola se vacía.
    pub async fn advance_queue(&self) -> PlaybackResult<AdvanceOutcome> {
        let (mut entry, mut epoch) = match self.claim_next() {
            Claim::Busy => return Err(PlaybackError::AlreadyInProgress),
            Claim::Empty => return Ok(AdvanceOutcome::Idle),
            Claim::Entry(entry, epoch) => (entry, epoch),
        };

        loop {
            match self.try_start(&entry, epoch).await? {
                Attempt::Started => {
                    self.announce_now_playing(&entry).await;
                    return Ok(AdvanceOutcome::Started(entry));
                }
                Attempt::Skipped(reason) => {
                    self.announce_skipped(&entry, &reason.to_string()).await;
                }
                Attempt::Cancelled => {
                    info!("🚫 Descartado tras stop: {}", entry.query);
                }
            }

            match self.next_while_holding() {
                Some((next, next_epoch)) => {
                    entry = next;
                    epoch = next_epoch;
                }
                None => return Ok(AdvanceOutcome::Idle),
            }
        }
    }

    /// Pasos 1-3: guard, cola vacía, pop
    fn claim_next(&self) -> Claim {
        let mut state = self.inner.state.lock();
        if state.in_flight {
            debug!("Avance ignorado: ya hay una secuencia en curso");
            return Claim::Busy;
        }

        let mut queue = self.inner.queue.lock();
        match queue.pop_front() {
            None => {
                state.settle_idle();
                Claim::Empty
            }
            Some(entry) => {
                state.in_flight = true;
                state.phase = PlaybackPhase::Connecting;
                Claim::Entry(entry, state.epoch)
            }
        }
    }

    /// Siguiente entrada sin soltar el guard; lo libera si la cola está vacía
    fn next_while_holding(&self) -> Option<(QueueEntry, u64)> {
        let mut state = self.inner.state.lock();
        let mut queue = self.inner.queue.lock();
        match queue.pop_front() {
            None => {
                state.release();
                None
            }
            Some(entry) => {
                state.now_playing = None;
                state.phase = PlaybackPhase::Connecting;
                Some((entry, state.epoch))
            }
        }
    }

    async fn try_start(&self, entry: &QueueEntry, epoch: u64) -> PlaybackResult<Attempt> {
        // 4. Conexión
        if let Err(e) = self.ensure_connected().await {
            warn!("❌ Sin conexión de voz, descartando: {} ({})", entry.query, e);
            self.inner.state.lock().release();
            return Err(e);
        }

        // 5. Descarga
        {
            let mut state = self.inner.state.lock();
            if state.epoch == epoch {
                state.phase = PlaybackPhase::Downloading;
                state.now_playing = Some(entry.clone());
            }
        }

        info!("⬇️ Resolviendo: {}", entry.query);
        let resolved = self.resolve_checked(&entry.query).await;

        if self.inner.state.lock().epoch != epoch {
            return Ok(Attempt::Cancelled);
        }

        let path = match resolved {
            Ok(path) => path,
            Err(e) => {
                warn!("⏭️ No se pudo resolver '{}': {}", entry.query, e);
                return Ok(Attempt::Skipped(PlaybackError::ResolveFailure(
                    e.to_string(),
                )));
            }
        };

        // 6. La conexión pudo caerse mientras descargábamos
        if !self.connection_alive().await {
            warn!("🔌 Conexión perdida durante la descarga de: {}", entry.query);
            let mut state = self.inner.state.lock();
            state.connection = None;
            state.release();
            return Err(PlaybackError::Connection(
                "se perdió la conexión de voz".to_string(),
            ));
        }

        // 7-8. Adjuntar al sink sin que un stop pueda colarse en medio
        let _control = self.inner.control.lock().await;

        if self.inner.sink.is_playing().await || self.inner.sink.is_paused().await {
            warn!("⚠️ El sink seguía sonando, deteniéndolo antes de continuar");
            if let Err(e) = self.inner.sink.stop().await {
                error!("Error deteniendo el track anterior: {:?}", e);
            }
        }

        let token = {
            let mut state = self.inner.state.lock();
            if state.epoch != epoch {
                return Ok(Attempt::Cancelled);
            }
            state.phase = PlaybackPhase::Playing;
            state.now_playing = Some(entry.clone());
            CompletionToken::new(state.next_generation(), self.inner.events.clone())
        };

        if let Err(e) = self.inner.sink.play(&path, token).await {
            error!("❌ El sink rechazó '{}': {:?}", entry.query, e);
            let mut state = self.inner.state.lock();
            // Cualquier aviso de este intento queda obsoleto
            state.generation += 1;
            state.now_playing = None;
            state.phase = PlaybackPhase::Connecting;
            return Ok(Attempt::Skipped(PlaybackError::ResolveFailure(
                e.to_string(),
            )));
        }

        info!("🎵 Reproduciendo: {}", entry.query);
        Ok(Attempt::Started)
    }

    async fn resolve_checked(&self, query: &str) -> Result<PathBuf, ResolveError> {
        let path = self.inner.resolver.resolve(query).await?;
        let size = verify_min_size(&path, self.inner.settings.min_audio_bytes).await?;
        debug!("📊 {} ({} bytes)", path.display(), size);
        Ok(path)
    }

    async fn ensure_connected(&self) -> PlaybackResult<()> {
        let (connection, voice_channel) = {
            let state = self.inner.state.lock();
            (state.connection, state.voice_channel)
        };

        if connection.is_some() && self.inner.sink.is_connected().await {
            return Ok(());
        }

        let channel = connection
            .map(|c| c.channel_id)
            .or(voice_channel)
            .ok_or(PlaybackError::NotInChannel)?;

        {
            let mut state = self.inner.state.lock();
            state.phase = PlaybackPhase::Connecting;
        }

        self.inner
            .sink
            .connect(channel)
            .await
            .map_err(|e| PlaybackError::Connection(e.to_string()))?;

        self.inner.state.lock().connection = Some(ConnectionHandle {
            channel_id: channel,
        });
        Ok(())
    }

    async fn connection_alive(&self) -> bool {
        let has_connection = self.inner.state.lock().connection.is_some();
        has_connection && self.inner.sink.is_connected().await
    }

    /// Detiene lo que suena; el aviso de fin del sink avanza la cola
    pub async fn skip_current(&self) -> PlaybackResult<QueueEntry> {
        let _control = self.inner.control.lock().await;

        let current = {
            let state = self.inner.state.lock();
            if !state.phase.is_audible() {
                return Err(PlaybackError::NothingPlaying);
            }
            state.now_playing.clone()
        };

        self.inner
            .sink
            .stop()
            .await
            .map_err(|e| PlaybackError::Connection(e.to_string()))?;

        let current = current.ok_or(PlaybackError::NothingPlaying)?;
        info!("⏭️ Saltada: {}", current.query);
        Ok(current)
    }

    /// Descarta todo lo anterior a `target` y salta a él
    pub async fn skip_to(&self, target: &str) -> PlaybackResult<SkippedTo> {
        let (skipped, audible) = {
            let state = self.inner.state.lock();
            let mut queue = self.inner.queue.lock();
            let index = queue
                .find_target(target)
                .ok_or_else(|| PlaybackError::NotFound(target.to_string()))?;
            let entry = queue
                .get(index)
                .cloned()
                .ok_or_else(|| PlaybackError::NotFound(target.to_string()))?;
            let discarded = queue.discard_before(index);
            (
                SkippedTo {
                    target: entry,
                    discarded,
                },
                state.phase.is_audible(),
            )
        };

        if audible {
            match self.skip_current().await {
                Ok(_) | Err(PlaybackError::NothingPlaying) => {}
                Err(e) => return Err(e),
            }
        } else {
            self.kick().await?;
        }

        Ok(skipped)
    }

    pub async fn pause(&self) -> PlaybackResult<()> {
        let _control = self.inner.control.lock().await;
        let generation = self.current_generation(PlaybackPhase::Playing)?;

        self.inner
            .sink
            .pause()
            .await
            .map_err(|e| PlaybackError::Connection(e.to_string()))?;

        // El track pudo terminar mientras el sink atendía la pausa
        if !self.shift_phase(generation, PlaybackPhase::Playing, PlaybackPhase::Paused) {
            return Err(PlaybackError::NothingPlaying);
        }
        Ok(())
    }

    pub async fn resume(&self) -> PlaybackResult<()> {
        let _control = self.inner.control.lock().await;
        let generation = self.current_generation(PlaybackPhase::Paused)?;

        self.inner
            .sink
            .resume()
            .await
            .map_err(|e| PlaybackError::Connection(e.to_string()))?;

        if !self.shift_phase(generation, PlaybackPhase::Paused, PlaybackPhase::Playing) {
            return Err(PlaybackError::NothingPaused);
        }
        Ok(())
    }

    /// Generación del track actual, si la fase es la esperada
    fn current_generation(&self, expected: PlaybackPhase) -> PlaybackResult<u64> {
        let state = self.inner.state.lock();
        if state.phase == expected {
            Ok(state.generation)
        } else if expected == PlaybackPhase::Paused {
            Err(PlaybackError::NothingPaused)
        } else {
            Err(PlaybackError::NothingPlaying)
        }
    }

    /// Cambia de fase sólo si sigue sonando el mismo track
    fn shift_phase(&self, generation: u64, from: PlaybackPhase, to: PlaybackPhase) -> bool {
        let mut state = self.inner.state.lock();
        if state.generation != generation || state.phase != from {
            debug!("El track cambió durante {:?} → {:?}, se ignora", from, to);
            return false;
        }
        state.phase = to;
        true
    }

    /// Vacía la cola, detiene el sink y vuelve a Idle. Idempotente.
    pub async fn stop_and_clear(&self) -> usize {
        let _control = self.inner.control.lock().await;
        let (cleared, audible) = self.reset_session();

        if audible {
            if let Err(e) = self.inner.sink.stop().await {
                error!("Error al detener reproducción: {:?}", e);
            }
        }

        info!("⏹️ Reproducción detenida ({} pendientes descartadas)", cleared);
        cleared
    }

    /// Sale del canal de voz. Devuelve `NotConnected` si no había conexión.
    pub async fn disconnect(&self) -> PlaybackResult<()> {
        if self.teardown().await {
            Ok(())
        } else {
            Err(PlaybackError::NotConnected)
        }
    }

    /// Stop + clear + desconexión. Sólo el primer llamador ve la conexión.
    pub(crate) async fn teardown(&self) -> bool {
        let _control = self.inner.control.lock().await;

        let connection = self.inner.state.lock().connection.take();
        let Some(connection) = connection else {
            return false;
        };

        let (_, audible) = self.reset_session();
        if audible {
            if let Err(e) = self.inner.sink.stop().await {
                error!("Error al detener reproducción: {:?}", e);
            }
        }

        if let Err(e) = self.inner.sink.disconnect().await {
            error!("Error al desconectar: {:?}", e);
        }

        info!("👋 Sesión cerrada en canal {}", connection.channel_id);
        true
    }

    /// La conexión se cayó desde afuera (bot expulsado o canal borrado)
    pub async fn connection_lost(&self) {
        if self.teardown().await {
            warn!("🔌 Conexión de voz perdida, sesión reiniciada");
        }
    }

    fn reset_session(&self) -> (usize, bool) {
        let mut state = self.inner.state.lock();
        let mut queue = self.inner.queue.lock();
        let cleared = queue.clear();
        let audible = state.phase.is_audible();
        state.reset_playback();
        (cleared, audible)
    }

    /// Copia de lo que suena y lo pendiente, bajo el mismo lock de las escrituras
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock();
        let queue = self.inner.queue.lock();
        debug_assert!(state.is_consistent(), "fase {:?} sin canción actual", state.phase);
        QueueSnapshot {
            phase: state.phase,
            now_playing: state.now_playing.clone(),
            pending: queue.snapshot(),
        }
    }

    async fn handle_sink_event(&self, event: SinkEvent) {
        let SinkEvent::Finished { generation, error } = event;

        let finished = {
            let mut state = self.inner.state.lock();
            if generation != state.generation || !state.phase.is_audible() {
                debug!("Aviso de fin obsoleto (generación {}), ignorado", generation);
                return;
            }
            let finished = state.now_playing.take();
            state.release();
            finished
        };

        match (&finished, &error) {
            (Some(entry), None) => info!("✅ Terminó: {}", entry.query),
            (Some(entry), Some(e)) => warn!("❌ Error reproduciendo {}: {}", entry.query, e),
            (None, _) => debug!("Track terminado sin entrada actual"),
        }

        tokio::time::sleep(self.inner.settings.advance_debounce).await;

        match self.advance_queue().await {
            Ok(_) | Err(PlaybackError::AlreadyInProgress) => {}
            Err(e) => warn!("No se pudo continuar con la cola: {}", e),
        }
    }

    async fn announce_now_playing(&self, entry: &QueueEntry) {
        let channel = self.inner.state.lock().announce_channel;
        if let Some(channel) = channel {
            if let Err(e) = self.inner.announcer.now_playing(channel, entry).await {
                debug!("No se pudo anunciar la canción: {:?}", e);
            }
        }
    }

    async fn announce_skipped(&self, entry: &QueueEntry, reason: &str) {
        let channel = self.inner.state.lock().announce_channel;
        if let Some(channel) = channel {
            if let Err(e) = self.inner.announcer.skipped(channel, entry, reason).await {
                debug!("No se pudo anunciar el salto: {:?}", e);
            }
        }
    }
}

fn is_idle(state: &SessionState) -> bool {
    state.phase == PlaybackPhase::Idle && !state.in_flight
}

async fn run_event_loop(engine: Weak<EngineInner>, mut rx: mpsc::UnboundedReceiver<SinkEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(inner) = engine.upgrade() else {
            break;
        };
        SessionEngine { inner }.handle_sink_event(event).await;
    }
    debug!("Bucle de eventos del motor terminado");
}
