use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64_ENGINE, Engine};
use parking_lot::Mutex;
use serde::Deserialize;
use std::{
    collections::HashSet,
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use super::{CatalogError, PlaylistCatalog};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct PlaylistInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    name: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

impl TrackObject {
    /// `None` para entradas sin datos (tracks locales o borrados)
    fn usable_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(|a| a.name.as_str())
    }

    fn to_query(&self) -> Option<String> {
        let name = self.usable_name()?;
        let artist = self.primary_artist().unwrap_or("Unknown Artist");
        Some(format!("{} - {}", name, artist))
    }
}

/// Resumen de una playlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistStats {
    pub name: String,
    pub total: usize,
    pub duration_minutes: u64,
    /// Artistas principales distintos, en orden de aparición
    pub artists: Vec<String>,
}

impl PlaylistStats {
    fn from_tracks<'a>(name: String, tracks: impl IntoIterator<Item = &'a TrackObject>) -> Self {
        let mut total = 0;
        let mut duration_ms = 0u64;
        let mut seen = HashSet::new();
        let mut artists = Vec::new();

        for track in tracks {
            if track.usable_name().is_none() {
                continue;
            }
            total += 1;
            duration_ms += track.duration_ms.unwrap_or(0);
            if let Some(artist) = track.primary_artist() {
                if seen.insert(artist.to_string()) {
                    artists.push(artist.to_string());
                }
            }
        }

        Self {
            name,
            total,
            duration_minutes: duration_ms / 60_000,
            artists,
        }
    }
}

/// Extrae el ID de una URL de playlist de Spotify.
///
/// Acepta `https://open.spotify.com/playlist/<id>?si=...`, URIs
/// `spotify:playlist:<id>` o el ID directamente.
pub fn extract_playlist_id(input: &str) -> Result<String, CatalogError> {
    let input = input.trim();

    if let Some(id) = input.strip_prefix("spotify:playlist:") {
        return non_empty_id(id, input);
    }

    if input.starts_with("http://") || input.starts_with("https://") {
        let parsed =
            url::Url::parse(input).map_err(|_| CatalogError::InvalidUrl(input.to_string()))?;
        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        let id = match segments.iter().position(|seg| *seg == "playlist") {
            Some(index) => segments.get(index + 1).copied(),
            None => segments.last().copied(),
        };

        return non_empty_id(id.unwrap_or(""), input);
    }

    non_empty_id(input, input)
}

/// Enlace canónico `https://open.spotify.com/playlist/<id>` para cualquier forma aceptada
pub fn playlist_link(input: &str) -> Option<String> {
    extract_playlist_id(input)
        .ok()
        .map(|id| format!("https://open.spotify.com/playlist/{}", id))
}

fn non_empty_id(id: &str, original: &str) -> Result<String, CatalogError> {
    let id = id.split(['?', '&', '/']).next().unwrap_or("");
    if id.is_empty() {
        Err(CatalogError::InvalidUrl(original.to_string()))
    } else {
        Ok(id.to_string())
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Catálogo de playlists sobre la Web API de Spotify (client credentials)
pub struct SpotifyCatalog {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyCatalog {
    pub fn new(client_id: String, client_secret: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, CatalogError> {
        if let Some(token) = self.token.lock().as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(CatalogError::MissingCredentials);
        }

        let credentials = B64_ENGINE.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .client
            .post(TOKEN_URL)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", credentials))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let token: TokenResponse = Self::parse(response).await?;
        debug!("🔑 Token de Spotify renovado (expira en {}s)", token.expires_in);

        // Margen para no usar un token que expira en pleno request
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *self.token.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, CatalogError> {
        let token = self.access_token().await?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Self::parse(response).await
    }

    async fn parse<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, CatalogError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!("❌ Spotify respondió {}: {}", status, message);
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    async fn playlist_name(&self, playlist_id: &str) -> Result<String, CatalogError> {
        let url = format!("{}/playlists/{}?fields=name", API_BASE, playlist_id);
        let info: PlaylistInfo = self.get_json(&url).await?;
        Ok(info.name)
    }

    /// Todas las entradas de la playlist, siguiendo la paginación
    async fn all_tracks(&self, playlist_id: &str) -> Result<Vec<TrackObject>, CatalogError> {
        let mut next = Some(format!(
            "{}/playlists/{}/tracks?limit=100",
            API_BASE, playlist_id
        ));
        let mut tracks = Vec::new();

        while let Some(url) = next {
            let page: TracksPage = self.get_json(&url).await?;
            tracks.extend(page.items.into_iter().filter_map(|item| item.track));
            next = page.next;
        }

        Ok(tracks)
    }
}

#[async_trait]
impl PlaylistCatalog for SpotifyCatalog {
    async fn tracks_of(&self, playlist_url: &str) -> Result<Vec<String>, CatalogError> {
        let playlist_id = extract_playlist_id(playlist_url)?;
        let name = self.playlist_name(&playlist_id).await?;
        info!("📋 Cargando playlist: {}", name);

        let queries: Vec<String> = self
            .all_tracks(&playlist_id)
            .await?
            .iter()
            .filter_map(TrackObject::to_query)
            .collect();

        info!("✅ {} canciones encontradas en la playlist", queries.len());
        Ok(queries)
    }

    async fn stats_of(&self, playlist_url: &str) -> Result<PlaylistStats, CatalogError> {
        let playlist_id = extract_playlist_id(playlist_url)?;
        let name = self.playlist_name(&playlist_id).await?;
        let tracks = self.all_tracks(&playlist_id).await?;
        Ok(PlaylistStats::from_tracks(name, &tracks))
    }
}
