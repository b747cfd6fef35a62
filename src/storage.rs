use anyhow::Result;
use sha2::{Digest, Sha256};
use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Extensiones que yt-dlp puede dejar tras extraer el audio
pub const AUDIO_EXTENSIONS: [&str; 5] = ["opus", "webm", "m4a", "mp3", "ogg"];

/// Carpeta de audio descargado, direccionada por el hash de la consulta
#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
}

impl AudioCache {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("📁 Caché de audio en: {}", dir.display());
        Ok(Self { dir })
    }

    #[cfg(test)]
    pub fn new_unchecked(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Clave estable para una consulta: SHA-256 del texto en hex
    pub fn key_for(query: &str) -> String {
        hex::encode(Sha256::digest(query.as_bytes()))
    }

    /// Ruta sin extensión donde se guarda el audio de `query`
    pub fn base_path(&self, query: &str) -> PathBuf {
        self.dir.join(Self::key_for(query))
    }

    /// Devuelve el archivo ya descargado para `query`, si existe
    pub async fn find_cached(&self, query: &str) -> Option<PathBuf> {
        let base = self.base_path(query);
        for ext in AUDIO_EXTENSIONS {
            let candidate = base.with_extension(ext);
            if fs::metadata(&candidate).await.map(|m| m.is_file()).unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }

    /// Borra los archivos más viejos que `max_age` y devuelve cuántos se borraron
    pub async fn sweep(&self, max_age: Duration) -> Result<usize> {
        let mut files = fs::read_dir(&self.dir).await?;
        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    warn!("No se pudo leer {}: {}", path.display(), e);
                    continue;
                }
            };

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            if age >= max_age {
                match fs::remove_file(&path).await {
                    Ok(_) => {
                        removed += 1;
                        info!("🧹 Archivo viejo eliminado: {}", path.display());
                    }
                    Err(e) => error!("Error eliminando {}: {}", path.display(), e),
                }
            }
        }

        Ok(removed)
    }
}

/// Limpieza periódica de la caché de audio.
///
/// Corre para siempre; un fallo en una pasada sólo se registra.
pub async fn run_janitor(cache: AudioCache, interval: Duration, max_age: Duration) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        match cache.sweep(max_age).await {
            Ok(0) => debug!("🧹 Caché sin archivos viejos"),
            Ok(removed) => info!("🧹 Limpieza completada: {} archivos eliminados", removed),
            Err(e) => warn!("Error limpiando la caché de audio: {:?}", e),
        }
    }
}
