use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

const SECS_PER_HOUR: u64 = 3600;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Descargas
    pub download_dir: PathBuf,
    pub ytdlp_path: String,
    pub audio_quality: u32,
    pub min_audio_bytes: u64,

    // Reproducción
    pub advance_debounce_ms: u64,
    pub queue_display_limit: usize,

    // Mantenimiento
    pub cache_max_age_days: u64,
    pub janitor_interval_hours: u64,

    // Spotify (opcional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Descargas
            download_dir: std::env::var("DOWNLOAD_DIR")
                .unwrap_or_else(|_| "songs".to_string())
                .into(),
            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
            audio_quality: std::env::var("AUDIO_QUALITY")
                .unwrap_or_else(|_| "192".to_string())
                .parse()?,
            min_audio_bytes: std::env::var("MIN_AUDIO_BYTES")
                .unwrap_or_else(|_| "10240".to_string()) // 10 KiB
                .parse()?,

            // Reproducción
            advance_debounce_ms: std::env::var("ADVANCE_DEBOUNCE_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()?,
            queue_display_limit: std::env::var("QUEUE_DISPLAY_LIMIT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            // Mantenimiento
            cache_max_age_days: std::env::var("CACHE_MAX_AGE_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            janitor_interval_hours: std::env::var("JANITOR_INTERVAL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()?,

            // Spotify
            spotify_client_id: non_empty_var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: non_empty_var("SPOTIFY_CLIENT_SECRET"),
        };

        // La carpeta de descargas debe existir antes del primer yt-dlp
        std::fs::create_dir_all(&config.download_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Audio quality must be a sane yt-dlp bitrate (8..=512 kbps)
    /// - Display limit, cache age and janitor interval must be > 0
    /// - Spotify credentials are all-or-nothing
    pub fn validate(&self) -> Result<()> {
        if self.audio_quality < 8 || self.audio_quality > 512 {
            anyhow::bail!("Audio quality must be between 8 and 512 kbps, got: {}", self.audio_quality);
        }

        if self.queue_display_limit == 0 {
            anyhow::bail!("Queue display limit must be greater than 0");
        }

        if self.cache_max_age_days == 0 {
            anyhow::bail!("Cache max age must be greater than 0 days");
        }

        if self.janitor_interval_hours == 0 {
            anyhow::bail!("Janitor interval must be greater than 0 hours");
        }

        if self.cache_max_age_days.checked_mul(SECS_PER_DAY).is_none() {
            anyhow::bail!("Cache max age is too large: {} days", self.cache_max_age_days);
        }

        if self.janitor_interval_hours.checked_mul(SECS_PER_HOUR).is_none() {
            anyhow::bail!("Janitor interval is too large: {} hours", self.janitor_interval_hours);
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set together");
        }

        Ok(())
    }

    pub fn advance_debounce(&self) -> Duration {
        Duration::from_millis(self.advance_debounce_ms)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_hours.saturating_mul(SECS_PER_HOUR))
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Downloads: {} ({}kbps, min {} bytes)\n  \
            Playback: debounce {}, queue display {}\n  \
            Janitor: every {}, max age {}\n  \
            Spotify: {}",
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.download_dir.display(),
            self.audio_quality,
            self.min_audio_bytes,
            humantime::format_duration(self.advance_debounce()),
            self.queue_display_limit,
            humantime::format_duration(self.janitor_interval()),
            humantime::format_duration(self.cache_max_age()),
            if self.spotify_enabled() { "enabled" } else { "disabled" },
        )
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,

            download_dir: "songs".into(),
            ytdlp_path: "yt-dlp".to_string(),
            audio_quality: 192,
            min_audio_bytes: 10 * 1024,

            advance_debounce_ms: 500,
            queue_display_limit: 10,

            cache_max_age_days: 30,
            janitor_interval_hours: 24,

            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn half_configured_spotify_is_rejected() {
        let config = Config {
            spotify_client_id: Some("id".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_periods_are_rejected() {
        let config = Config {
            cache_max_age_days: u64::MAX / 2,
            ..Config::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.cache_max_age(), Duration::from_secs(u64::MAX));

        let config = Config {
            janitor_interval_hours: u64::MAX,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_display_limit_is_rejected() {
        let config = Config {
            queue_display_limit: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("Spotify: disabled"));
    }
}
