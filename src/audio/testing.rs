//! Dobles de prueba para el motor: un sink en memoria, un resolver sobre
//! archivos temporales y un anunciador que sólo registra.

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::ChannelId;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::Semaphore;

use super::{engine::Announcer, queue::QueueEntry, sink::AudioSink, sink::CompletionToken};
use crate::sources::{AudioResolver, ResolveError};

#[derive(Default)]
struct FakeSinkState {
    connected: bool,
    fail_connects: bool,
    end_on_control: bool,
    current: Option<CompletionToken>,
    paused: bool,
    played: Vec<PathBuf>,
    connects: usize,
    stops: usize,
    disconnects: usize,
}

/// Sink que no reproduce nada; los tracks terminan cuando el test lo dice
#[derive(Default)]
pub struct FakeSink {
    state: Mutex<FakeSinkState>,
}

impl FakeSink {
    pub fn fail_connects(&self, fail: bool) {
        self.state.lock().fail_connects = fail;
    }

    /// Hace que el track termine justo mientras se pausa o reanuda
    pub fn end_track_on_control(&self, enabled: bool) {
        self.state.lock().end_on_control = enabled;
    }

    /// Termina el track si así se pidió y da tiempo a que el motor lo procese
    async fn maybe_end_during_control(&self) {
        let token = {
            let mut state = self.state.lock();
            if !state.end_on_control {
                return;
            }
            state.current.take()
        };
        if let Some(token) = token {
            token.complete(None);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Simula que Discord cortó la conexión
    pub fn drop_connection(&self) {
        self.state.lock().connected = false;
    }

    /// Termina el track actual como si hubiera llegado al final
    pub fn finish_current(&self) {
        let token = {
            let mut state = self.state.lock();
            state.paused = false;
            state.current.take()
        };
        if let Some(token) = token {
            token.complete(None);
        }
    }

    /// Nombres (sin extensión) de los archivos reproducidos, en orden
    pub fn played(&self) -> Vec<String> {
        self.state
            .lock()
            .played
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .collect()
    }

    pub fn played_paths(&self) -> Vec<PathBuf> {
        self.state.lock().played.clone()
    }

    pub fn is_paused_now(&self) -> bool {
        self.state.lock().paused
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn connect(&self, _channel: ChannelId) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_connects {
            bail!("join rechazado");
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn play(&self, resource: &Path, completion: CompletionToken) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            bail!("sin conexión");
        }
        state.played.push(resource.to_path_buf());
        state.current = Some(completion);
        state.paused = false;
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.state.lock().paused = true;
        self.maybe_end_during_control().await;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.state.lock().paused = false;
        self.maybe_end_during_control().await;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let token = {
            let mut state = self.state.lock();
            state.stops += 1;
            state.paused = false;
            state.current.take()
        };
        if let Some(token) = token {
            token.complete(None);
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && !state.paused
    }

    async fn is_paused(&self) -> bool {
        let state = self.state.lock();
        state.current.is_some() && state.paused
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.disconnects += 1;
        state.current = None;
        Ok(())
    }
}

/// Resuelve cada consulta a `<dir>/<consulta>.opus`, creándolo al vuelo
pub struct FileResolver {
    dir: tempfile::TempDir,
    tiny: HashSet<String>,
    failing: HashSet<String>,
    gated: HashSet<String>,
    gate: Semaphore,
}

impl FileResolver {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            tiny: HashSet::new(),
            failing: HashSet::new(),
            gated: HashSet::new(),
            gate: Semaphore::new(0),
        }
    }

    /// La consulta produce un archivo truncado
    pub fn with_tiny(mut self, query: &str) -> Self {
        self.tiny.insert(query.to_string());
        self
    }

    pub fn with_failing<'a>(mut self, queries: impl IntoIterator<Item = &'a str>) -> Self {
        self.failing.extend(queries.into_iter().map(str::to_string));
        self
    }

    /// La consulta queda bloqueada hasta `open_gate`
    pub fn with_gate(mut self, query: &str) -> Self {
        self.gated.insert(query.to_string());
        self
    }

    pub fn open_gate(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl AudioResolver for FileResolver {
    async fn resolve(&self, query: &str) -> Result<PathBuf, ResolveError> {
        if self.gated.contains(query) {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| ResolveError::Download(e.to_string()))?;
        }

        if self.failing.contains(query) {
            return Err(ResolveError::NotFound(query.to_string()));
        }

        let path = self.dir.path().join(format!("{}.opus", query));
        let size = if self.tiny.contains(query) { 4 } else { 64 };
        tokio::fs::write(&path, vec![0u8; size]).await?;
        Ok(path)
    }
}

/// Guarda las consultas anunciadas
#[derive(Default)]
pub struct RecordingAnnouncer {
    announced: Mutex<Vec<String>>,
    skipped: Mutex<Vec<String>>,
}

impl RecordingAnnouncer {
    pub fn announced(&self) -> Vec<String> {
        self.announced.lock().clone()
    }

    pub fn skipped_queries(&self) -> Vec<String> {
        self.skipped.lock().clone()
    }
}

#[async_trait]
impl Announcer for RecordingAnnouncer {
    async fn now_playing(&self, _channel: ChannelId, entry: &QueueEntry) -> Result<()> {
        self.announced.lock().push(entry.query.clone());
        Ok(())
    }

    async fn skipped(&self, _channel: ChannelId, entry: &QueueEntry, _reason: &str) -> Result<()> {
        self.skipped.lock().push(entry.query.clone());
        Ok(())
    }
}

/// Espera hasta que `condition` se cumpla o falla a los dos segundos
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condición no alcanzada a tiempo");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}
