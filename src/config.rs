use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::voice::connection::RetryPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para registrar comandos en una sola guild

    // VOICEVOX
    pub voicevox_url: String,
    pub default_speaker_name: String,
    pub default_style_name: String,
    pub voicevox_timeout_secs: u64,

    // Conexión de voz
    pub connect_timeout_secs: u64,
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,

    // Reproducción
    pub playback_poll_ms: u64,
    pub max_text_length: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN is not set"))?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // VOICEVOX
            voicevox_url: std::env::var("VOICEVOX_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:50021".to_string()),
            default_speaker_name: std::env::var("VV_SPEAKER_NAME")
                .unwrap_or_else(|_| "春日部つむぎ".to_string()),
            default_style_name: std::env::var("VV_STYLE_NAME")
                .unwrap_or_else(|_| "ノーマル".to_string()),
            voicevox_timeout_secs: std::env::var("VOICEVOX_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            // Conexión de voz
            connect_timeout_secs: std::env::var("CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            connect_attempts: std::env::var("CONNECT_ATTEMPTS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
            connect_backoff_ms: std::env::var("CONNECT_BACKOFF_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,

            // Reproducción
            playback_poll_ms: std::env::var("PLAYBACK_POLL_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            max_text_length: std::env::var("MAX_TEXT_LENGTH")
                .unwrap_or_else(|_| "200".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - `VOICEVOX_URL` must be an absolute http(s) URL
    /// - Connect attempts and timeouts must be greater than zero
    /// - The maximum text length must be greater than zero
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.voicevox_url)
            .map_err(|e| anyhow::anyhow!("Invalid VOICEVOX_URL '{}': {}", self.voicevox_url, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("VOICEVOX_URL must use http or https, got: {}", url.scheme());
        }

        if self.connect_attempts == 0 {
            anyhow::bail!("Connect attempts must be greater than 0");
        }

        if self.connect_timeout_secs == 0 {
            anyhow::bail!("Connect timeout must be greater than 0");
        }

        if self.voicevox_timeout_secs == 0 {
            anyhow::bail!("VOICEVOX timeout must be greater than 0");
        }

        if self.max_text_length == 0 {
            anyhow::bail!("Max text length must be greater than 0");
        }

        Ok(())
    }

    /// Retry policy handed to the connection manager.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_attempts,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            backoff_base: Duration::from_millis(self.connect_backoff_ms),
        }
    }

    pub fn playback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.playback_poll_ms)
    }

    pub fn voicevox_timeout(&self) -> Duration {
        Duration::from_secs(self.voicevox_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The Discord token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            VOICEVOX: {} ({} / {}), timeout {}s\n  \
            Voice: {} attempts, {}s connect timeout, {}ms backoff base\n  \
            Playback: {}ms poll, {} chars max",
            self.guild_id
                .map_or("global".to_string(), |id| format!("in guild {}", id)),
            self.voicevox_url,
            self.default_speaker_name,
            self.default_style_name,
            self.voicevox_timeout_secs,
            self.connect_attempts,
            self.connect_timeout_secs,
            self.connect_backoff_ms,
            self.playback_poll_ms,
            self.max_text_length,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,

            voicevox_url: "http://127.0.0.1:50021".to_string(),
            default_speaker_name: "春日部つむぎ".to_string(),
            default_style_name: "ノーマル".to_string(),
            voicevox_timeout_secs: 30,

            connect_timeout_secs: 10,
            connect_attempts: 4,
            connect_backoff_ms: 1000,

            playback_poll_ms: 100,
            max_text_length: 200,
        }
    }
}
