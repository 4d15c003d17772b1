//! Runtime configuration read from the environment

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Context, Result};
use chrono::Utc;
use rspotify::Token;

const DEFAULT_TICK_MS: u64 = 1000;
const DEFAULT_POLL_MS: u64 = 1000;
const DEFAULT_LOG_DIR: &str = ".logs";
const DEFAULT_TOKEN_FILE: &str = ".cache/token.json";

/// Scopes an externally issued token is expected to carry
pub const SCOPES: &str =
    "user-read-playback-state user-modify-playback-state user-read-currently-playing user-library-modify user-library-read";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenSource {
    /// A bare access token, valid for the usual hour
    AccessToken(String),
    /// A serialized `rspotify::Token`
    File(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// How often the playback clock advances by one second
    pub tick_period: Duration,
    /// How often the remote player is polled for changes
    pub poll_interval: Duration,
    pub log_dir: PathBuf,
    /// Device to command when none is active
    pub preferred_device: Option<String>,
    pub token: TokenSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(DEFAULT_TICK_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            preferred_device: None,
            token: TokenSource::File(PathBuf::from(DEFAULT_TOKEN_FILE)),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let tick_period = parse_millis(get("REMOTE_SYNC_TICK_MS"), "REMOTE_SYNC_TICK_MS", DEFAULT_TICK_MS)?;
        let poll_interval = parse_millis(get("REMOTE_SYNC_POLL_MS"), "REMOTE_SYNC_POLL_MS", DEFAULT_POLL_MS)?;

        let token = match get("SPOTIFY_ACCESS_TOKEN") {
            Some(access_token) => TokenSource::AccessToken(access_token.trim().to_string()),
            None => TokenSource::File(PathBuf::from(
                get("REMOTE_SYNC_TOKEN_FILE").unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_string()),
            )),
        };

        Ok(Self {
            tick_period,
            poll_interval,
            log_dir: PathBuf::from(get("REMOTE_SYNC_LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())),
            preferred_device: get("REMOTE_SYNC_DEVICE"),
            token,
        })
    }

    pub fn load_token(&self) -> Result<Token> {
        match &self.token {
            TokenSource::AccessToken(access_token) => Ok(Token {
                access_token: access_token.clone(),
                expires_in: chrono::Duration::seconds(3600),
                expires_at: Some(Utc::now() + chrono::Duration::seconds(3600)),
                scopes: SCOPES
                    .split_whitespace()
                    .map(|s| s.to_string())
                    .collect::<HashSet<String>>(),
                refresh_token: None,
            }),
            TokenSource::File(path) => {
                tracing::debug!(path = %path.display(), "Loading token from file");
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read token file {}", path.display()))?;
                let token: Token = serde_json::from_str(&contents)
                    .with_context(|| format!("Invalid token file {}", path.display()))?;
                if token.is_expired() {
                    tracing::warn!(path = %path.display(), "Token from file is already expired");
                }
                Ok(token)
            }
        }
    }
}

fn parse_millis(value: Option<String>, key: &str, default: u64) -> Result<Duration> {
    let Some(value) = value else {
        return Ok(Duration::from_millis(default));
    };

    let millis: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("{} must be a number of milliseconds, got {:?}", key, value))?;
    if millis == 0 {
        anyhow::bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_millis(millis))
}
