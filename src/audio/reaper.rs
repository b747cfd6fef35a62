use serenity::model::id::{ChannelId, UserId};
use tracing::{debug, info};

use super::engine::SessionEngine;

/// Cuenta quién más está en `channel` además del propio bot
pub fn count_other_occupants<I>(voice_states: I, channel: ChannelId, bot_id: UserId) -> usize
where
    I: IntoIterator<Item = (UserId, Option<ChannelId>)>,
{
    voice_states
        .into_iter()
        .filter(|(user, current)| *user != bot_id && *current == Some(channel))
        .count()
}

/// Sale del canal de voz cuando el bot se queda solo
#[derive(Clone)]
pub struct IdleReaper {
    engine: SessionEngine,
}

impl IdleReaper {
    pub fn new(engine: SessionEngine) -> Self {
        Self { engine }
    }

    /// Evalúa un cambio de membresía. Devuelve `true` sólo en la llamada que
    /// efectivamente cerró la sesión.
    pub async fn observe(&self, channel: ChannelId, other_occupants: usize) -> bool {
        if other_occupants > 0 {
            return false;
        }

        if self.engine.connected_channel() != Some(channel) {
            debug!("Canal {} vacío pero no es el nuestro", channel);
            return false;
        }

        let closed = self.engine.teardown().await;
        if closed {
            info!("🚪 Canal de voz vacío, bot desconectado");
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        engine::EngineSettings,
        session::PlaybackPhase,
        testing::{FakeSink, FileResolver, RecordingAnnouncer},
    };
    use pretty_assertions::assert_eq;
    use std::{sync::Arc, time::Duration};

    const VOICE: u64 = 42;

    async fn playing_engine(sink: Arc<FakeSink>) -> SessionEngine {
        let engine = SessionEngine::new(
            sink,
            Arc::new(FileResolver::new()),
            Arc::new(RecordingAnnouncer::default()),
            EngineSettings {
                min_audio_bytes: 16,
                advance_debounce: Duration::from_millis(5),
            },
        );
        engine.bind_channels(ChannelId::new(VOICE), None);
        engine.enqueue_many(["a", "b"]).await.unwrap();
        engine
    }

    #[test]
    fn occupants_exclude_the_bot_and_other_channels() {
        let bot = UserId::new(1);
        let channel = ChannelId::new(VOICE);
        let states = vec![
            (bot, Some(channel)),
            (UserId::new(2), Some(channel)),
            (UserId::new(3), Some(ChannelId::new(7))),
            (UserId::new(4), None),
        ];

        assert_eq!(count_other_occupants(states.clone(), channel, bot), 1);
        assert_eq!(count_other_occupants(states[..1].to_vec(), channel, bot), 0);
    }

    #[tokio::test]
    async fn occupied_channel_is_left_alone() {
        let sink = Arc::new(FakeSink::default());
        let reaper = IdleReaper::new(playing_engine(sink.clone()).await);

        assert!(!reaper.observe(ChannelId::new(VOICE), 2).await);
        assert_eq!(sink.disconnects(), 0);
    }

    #[tokio::test]
    async fn empty_foreign_channel_is_ignored() {
        let sink = Arc::new(FakeSink::default());
        let reaper = IdleReaper::new(playing_engine(sink.clone()).await);

        assert!(!reaper.observe(ChannelId::new(999), 0).await);
        assert_eq!(sink.disconnects(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_empty_notifications_tear_down_once() {
        let sink = Arc::new(FakeSink::default());
        let engine = playing_engine(sink.clone()).await;
        let reaper = IdleReaper::new(engine.clone());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let reaper = reaper.clone();
                tokio::spawn(async move { reaper.observe(ChannelId::new(VOICE), 0).await })
            })
            .collect();

        let mut closed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                closed += 1;
            }
        }

        assert_eq!(closed, 1);
        assert_eq!(sink.disconnects(), 1);
        assert_eq!(sink.stops(), 1);
        assert_eq!(engine.phase(), PlaybackPhase::Idle);
        assert!(engine.snapshot().pending.is_empty());
    }
}
