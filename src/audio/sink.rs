use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::ChannelId;
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;
use tracing::debug;

/// Notificaciones que el sink envía de vuelta al motor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Finished {
        generation: u64,
        error: Option<String>,
    },
}

/// Aviso de fin de un track concreto.
///
/// Se entrega como mensaje al bucle de eventos del motor; el sink puede
/// dispararlo desde cualquier tarea. Sólo el primer `complete` cuenta.
#[derive(Debug, Clone)]
pub struct CompletionToken {
    generation: u64,
    fired: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl CompletionToken {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<SinkEvent>) -> Self {
        Self {
            generation,
            fired: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn complete(&self, error: Option<String>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        let event = SinkEvent::Finished {
            generation: self.generation,
            error,
        };
        if self.tx.send(event).is_err() {
            debug!("Motor ya cerrado, notificación de fin descartada");
        }
    }
}

/// Salida de audio: la conexión de voz real.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn connect(&self, channel: ChannelId) -> Result<()>;

    async fn is_connected(&self) -> bool;

    /// Adjunta un recurso ya codificado. `completion` se dispara al terminar,
    /// al fallar o al llamar a `stop`.
    async fn play(&self, resource: &Path, completion: CompletionToken) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    async fn disconnect(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn completion_fires_once_across_clones() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let token = CompletionToken::new(7, tx);
        let end_handler = token.clone();
        let error_handler = token.clone();

        end_handler.complete(None);
        error_handler.complete(Some("boom".to_string()));

        assert_eq!(
            rx.recv().await,
            Some(SinkEvent::Finished {
                generation: 7,
                error: None
            })
        );
        assert!(rx.try_recv().is_err());
    }
}
