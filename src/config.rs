//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special-cased environment variables (OPENAI_API_KEY, HOST, PORT)
//! 2. Environment variables (APP_SERVER_HOST, APP_UPSTREAM_VOICE, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The upstream API key is deliberately never given a default: a missing key
//! fails validation and terminates the process at startup, which is the only
//! fatal error path in the service.

use crate::audio::codec::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub audio: AudioConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
/// - `static_dir`: directory holding the built browser frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

/// Realtime API upstream configuration.
///
/// ## Fields:
/// - `url`: WebSocket endpoint of the realtime API, including the model query
/// - `api_key`: bearer credential; taken from the OPENAI_API_KEY environment
///   variable and required at startup
/// - `voice`: voice used for the spoken translation
/// - `temperature`: sampling temperature sent in `session.update`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub url: String,
    pub api_key: String,
    pub voice: String,
    pub temperature: f32,
}

/// Audio pipeline configuration.
///
/// ## Fields:
/// - `sample_rate`: sample rate of audio returned to the client (Hz)
/// - `channels`: channel count of audio returned to the client
/// - `max_turn_bytes`: cap on the per-turn base64 accumulator; a turn that
///   exceeds it is failed explicitly instead of growing without limit
/// - `turn_timeout_secs`: inactivity deadline since the last audio delta
///   before an in-flight turn is abandoned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub max_turn_bytes: usize,
    pub turn_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                static_dir: "./dist".to_string(),
            },
            upstream: UpstreamConfig {
                url: "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview-2024-10-01"
                    .to_string(),
                api_key: String::new(), // must come from the environment
                voice: "alloy".to_string(),
                temperature: 0.8,
            },
            audio: AudioConfig {
                sample_rate: OUTPUT_SAMPLE_RATE,
                channels: OUTPUT_CHANNELS,
                max_turn_bytes: 8 * 1024 * 1024,
                turn_timeout_secs: 120,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly set these without the APP_ prefix.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // The upstream credential only ever comes from the environment.
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("upstream.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// A missing API key is the single startup-fatal condition in the
    /// system; everything past startup is log-and-continue.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "OpenAI API key is missing. Set OPENAI_API_KEY in the environment or .env file"
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.channels == 0 {
            return Err(anyhow::anyhow!("Audio channel count must be greater than 0"));
        }

        if self.audio.max_turn_bytes == 0 {
            return Err(anyhow::anyhow!("Max turn bytes must be greater than 0"));
        }

        Ok(())
    }
}
