use anyhow::Result;
use serenity::{async_trait, builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::debug;

use crate::{
    audio::{engine::Announcer, queue::QueueEntry},
    ui::embeds,
};

/// Publica los avisos del motor en el canal de texto del último pedido
pub struct ChannelAnnouncer {
    http: Arc<Http>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn now_playing(&self, channel: ChannelId, entry: &QueueEntry) -> Result<()> {
        channel
            .send_message(
                &self.http,
                CreateMessage::new().embed(embeds::create_now_playing_embed(entry)),
            )
            .await?;
        Ok(())
    }

    async fn skipped(&self, channel: ChannelId, entry: &QueueEntry, reason: &str) -> Result<()> {
        debug!("Avisando salto de '{}' en canal {}", entry.query, channel);
        channel
            .say(&self.http, embeds::format_skipped_notice(entry, reason))
            .await?;
        Ok(())
    }
}
