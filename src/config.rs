// ABOUTME: Configuration loading for gog-lite.
// ABOUTME: Reads config.toml from the config tree and resolves OAuth client credentials (env, .env, credentials.json).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GovernanceResult;
use crate::governance::ratelimit::RateLimitRule;
use crate::store::{self, ConfigDir};

pub const CLIENT_ID_ENV: &str = "GOG_LITE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "GOG_LITE_CLIENT_SECRET";

/// Top-level configuration (`config.toml`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Audit log used when `--audit-log` is not given.
    pub audit_log: Option<PathBuf>,
    /// Per-action rate limits applied by governed commands.
    pub rate_limits: BTreeMap<String, RateLimitConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let read_limit = RateLimitConfig {
            limit: 120,
            window_seconds: 60,
        };
        Self {
            audit_log: None,
            rate_limits: ["calendar.list", "sheets.get", "slides.get"]
                .into_iter()
                .map(|action| (action.to_string(), read_limit))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window_seconds: u64,
}

impl RateLimitConfig {
    pub fn rule(&self) -> RateLimitRule {
        RateLimitRule {
            limit: self.limit,
            window: Duration::from_secs(self.window_seconds),
        }
    }
}

impl Config {
    /// Load config from `<config>/config.toml`, falling back to defaults.
    pub fn load(cfg: &ConfigDir) -> anyhow::Result<Self> {
        let path = cfg.config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn rate_limit_for(&self, action: &str) -> Option<RateLimitRule> {
        self.rate_limits
            .get(&action.trim().to_lowercase())
            .map(RateLimitConfig::rule)
    }
}

/// OAuth client ID/secret pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("credentials.json not found at {}; place your Google OAuth credentials there", path.display())]
    Missing { path: PathBuf },
    #[error("credentials.json is missing client_id or client_secret")]
    Incomplete,
    #[error("read credentials: {0}")]
    Io(#[from] std::io::Error),
    #[error("decode credentials: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Google's downloaded client file wraps the pair in `installed` or `web`.
#[derive(Debug, Deserialize)]
struct GoogleCredentialsFile {
    installed: Option<ClientCredentials>,
    web: Option<ClientCredentials>,
}

/// Load a `.env` from the working directory, if there is one.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

/// Resolve client credentials from the process environment or `credentials.json`.
pub fn read_credentials(cfg: &ConfigDir) -> Result<ClientCredentials, CredentialsError> {
    read_credentials_with(cfg, |key| std::env::var(key).ok())
}

/// As [`read_credentials`], with an explicit environment lookup.
///
/// The env pair wins only when both values are non-blank.
pub fn read_credentials_with(
    cfg: &ConfigDir,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientCredentials, CredentialsError> {
    let from_env = |key: &str| env(key).map(|v| v.trim().to_string()).unwrap_or_default();
    let (client_id, client_secret) = (from_env(CLIENT_ID_ENV), from_env(CLIENT_SECRET_ENV));
    if !client_id.is_empty() && !client_secret.is_empty() {
        return Ok(ClientCredentials {
            client_id,
            client_secret,
        });
    }

    let path = cfg.credentials_path();
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CredentialsError::Missing { path });
        }
        Err(e) => return Err(e.into()),
    };

    if let Ok(google) = serde_json::from_str::<GoogleCredentialsFile>(&content)
        && let Some(creds) = google.installed.or(google.web)
        && !creds.client_id.is_empty()
        && !creds.client_secret.is_empty()
    {
        return Ok(creds);
    }

    let creds: ClientCredentials = serde_json::from_str(&content)?;
    if creds.client_id.is_empty() || creds.client_secret.is_empty() {
        return Err(CredentialsError::Incomplete);
    }
    Ok(creds)
}

/// Persist credentials to `<config>/credentials.json` (0600, atomic).
pub fn write_credentials(cfg: &ConfigDir, creds: &ClientCredentials) -> GovernanceResult<()> {
    cfg.ensure()?;
    store::write_json_atomic(&cfg.credentials_path(), creds, true, "credentials")
}
