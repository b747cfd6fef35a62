use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod sources;
mod storage;
mod ui;

use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::{AudioResolver, PlaylistCatalog, SpotifyCatalog, YtDlpResolver};
use crate::storage::AudioCache;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Jukebox v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config.ytdlp_path).await;
    }

    // Caché de audio y resolver
    let cache = AudioCache::new(config.download_dir.clone()).await?;
    let ytdlp = YtDlpResolver::new(cache.clone(), config.ytdlp_path.clone(), config.audio_quality)
        .with_min_audio_bytes(config.min_audio_bytes);
    if let Err(e) = ytdlp.verify_dependencies().await {
        warn!("⚠️ Dependencias incompletas, las descargas fallarán: {:?}", e);
    }
    let resolver: Arc<dyn AudioResolver> = Arc::new(ytdlp);

    // Catálogo de Spotify opcional
    let catalog: Option<Arc<dyn PlaylistCatalog>> =
        match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => {
                info!("🎧 Catálogo de Spotify habilitado");
                Some(Arc::new(SpotifyCatalog::new(id.clone(), secret.clone())?))
            }
            _ => {
                info!("ℹ️ Sin credenciales de Spotify: /playlist y /stats deshabilitados");
                None
            }
        };

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let token = config.discord_token.clone();
    let handler = JukeboxBot::new(config, cache, resolver, catalog);

    // Construir cliente
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                shard_manager.shutdown_all().await;
            }
            Err(e) => error!("Error al registrar Ctrl+C: {:?}", e),
        }
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check(ytdlp_path: &str) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
