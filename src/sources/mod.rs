pub mod spotify;
pub mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use spotify::{PlaylistStats, SpotifyCatalog};
pub use ytdlp::YtDlpResolver;

/// Por qué una petición no se pudo convertir en un archivo reproducible
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("sin resultados para `{0}`")]
    NotFound(String),

    #[error("falló la descarga: {0}")]
    Download(String),

    #[error("el archivo {0} no existe")]
    Missing(PathBuf),

    #[error("archivo {path} demasiado pequeño ({size} bytes, mínimo {min})")]
    TooSmall { path: PathBuf, size: u64, min: u64 },

    #[error("audio ilegible en {path}: {reason}")]
    Unplayable { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convierte una consulta de texto en un archivo de audio local.
///
/// Debe ser idempotente: la misma consulta devuelve el mismo archivo en caché
/// sin volver a descargarlo.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<PathBuf, ResolveError>;
}

/// Errores del catálogo de playlists
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("credenciales de Spotify no configuradas")]
    MissingCredentials,

    #[error("URL de playlist inválida: {0}")]
    InvalidUrl(String),

    #[error("la playlist no tiene canciones")]
    EmptyPlaylist,

    #[error("Spotify respondió {status}: {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Servicio externo que expande playlists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaylistCatalog: Send + Sync {
    /// Consultas "título - artista principal", en el orden de la playlist
    async fn tracks_of(&self, playlist_url: &str) -> Result<Vec<String>, CatalogError>;

    async fn stats_of(&self, playlist_url: &str) -> Result<PlaylistStats, CatalogError>;
}

/// Consultas de una playlist listas para encolar; una playlist vacía es un error
pub async fn playlist_queries(
    catalog: &dyn PlaylistCatalog,
    playlist_url: &str,
) -> Result<Vec<String>, CatalogError> {
    let queries = catalog.tracks_of(playlist_url).await?;
    if queries.is_empty() {
        return Err(CatalogError::EmptyPlaylist);
    }
    Ok(queries)
}

/// Rechaza archivos inexistentes o truncados antes de mandarlos al sink
pub async fn verify_min_size(path: &Path, min_bytes: u64) -> Result<u64, ResolveError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ResolveError::Missing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let size = metadata.len();
    if !metadata.is_file() || size < min_bytes {
        return Err(ResolveError::TooSmall {
            path: path.to_path_buf(),
            size,
            min: min_bytes,
        });
    }

    Ok(size)
}
