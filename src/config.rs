use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::error::SplitError;

pub const DEFAULT_SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo-16k";

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub spotify_api_base: String,
    pub openai_base_url: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    /// Per-call timeout for the Spotify API
    pub http_timeout: Duration,
    /// Per-call timeout for the classification request
    pub classify_timeout: Duration,
    /// Extra attempts for a page fetch that failed at the transport level
    pub max_fetch_retries: u32,
    /// Pause between consecutive track windows written to one playlist
    pub write_pause: Duration,
}

/// Load configuration from `.env` and environment
pub fn load_config() -> Result<Config> {
    // Load `.env` file if present
    dotenv::dotenv().ok();

    let openai_api_key =
        std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;

    Ok(Config {
        spotify_api_base: env_or("SPOTIFY_API_BASE", DEFAULT_SPOTIFY_API_BASE.to_string())?,
        openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL.to_string())?,
        openai_api_key,
        openai_model: env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL.to_string())?,
        openai_temperature: env_or("OPENAI_TEMPERATURE", 0.6)?,
        http_timeout: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 30)?),
        classify_timeout: Duration::from_secs(env_or("CLASSIFY_TIMEOUT_SECS", 120)?),
        max_fetch_retries: env_or("MAX_FETCH_RETRIES", 2)?,
        write_pause: Duration::from_millis(env_or("WRITE_PAUSE_MS", 500)?),
    })
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T>(key: &str, raw: Option<&str>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", value, key, e)),
    }
}

/// Supplies the bearer token for the streaming service.
///
/// The pipeline asks for the token on every request instead of reading
/// process state, so a token refreshed elsewhere is picked up mid-run.
pub trait CredentialProvider: Send + Sync {
    fn current_token(&self) -> Result<String, SplitError>;
}

/// Reads the token from an environment variable (`SPOTIFY_TOKEN` by default)
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self::with_var("SPOTIFY_TOKEN")
    }

    pub fn with_var(var: &str) -> Self {
        Self {
            var: var.to_string(),
        }
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn current_token(&self) -> Result<String, SplitError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(SplitError::Credential(format!("{} is not set", self.var))),
        }
    }
}

/// A fixed token, e.g. one passed on the command line
pub struct StaticCredentialProvider(pub String);

impl CredentialProvider for StaticCredentialProvider {
    fn current_token(&self) -> Result<String, SplitError> {
        if self.0.is_empty() {
            return Err(SplitError::Credential("empty token".to_string()));
        }
        Ok(self.0.clone())
    }
}
