// ABOUTME: Secret store boundary for per-account refresh tokens.
// ABOUTME: SecretStore trait plus a file backend keeping one owner-only JSON record per account under keyring/.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GovernanceError;
use crate::governance::policy::normalize_id;
use crate::output::{CliError, ExitCode};
use crate::store::{self, ConfigDir};

/// Refresh-token-bearing record for one account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    pub refresh_token: String,
}

impl fmt::Debug for StoredToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredToken")
            .field("email", &self.email)
            .field("services", &self.services)
            .field("scopes", &self.scopes)
            .field("created_at", &self.created_at)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("missing email")]
    MissingEmail,
    #[error("missing refresh token")]
    MissingRefreshToken,
    #[error("no stored token for {email}")]
    NotFound { email: String },
    #[error(transparent)]
    Store(#[from] GovernanceError),
}

impl SecretError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::NotFound { .. } => ExitCode::Auth,
            Self::Store(e) => e.exit_code(),
            _ => ExitCode::Error,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingEmail | Self::MissingRefreshToken => "invalid_input",
            Self::NotFound { .. } => "auth_required",
            Self::Store(e) => e.code(),
        }
    }
}

impl From<SecretError> for CliError {
    fn from(err: SecretError) -> Self {
        Self::new(err.exit_code(), err.code(), err.to_string())
    }
}

pub type SecretResult<T> = Result<T, SecretError>;

/// Storage for account refresh tokens, keyed by normalized email.
pub trait SecretStore {
    fn get_token(&self, email: &str) -> SecretResult<StoredToken>;
    fn set_token(&self, token: &StoredToken) -> SecretResult<()>;
    /// Returns whether a record existed.
    fn delete_token(&self, email: &str) -> SecretResult<bool>;
    /// All records, sorted by email.
    fn list_tokens(&self) -> SecretResult<Vec<StoredToken>>;
}

/// File backend rooted at `<config>/keyring/`.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    dir: PathBuf,
}

impl FileSecretStore {
    pub fn open(cfg: &ConfigDir) -> SecretResult<Self> {
        let dir = cfg.ensure_subdir("keyring")?;
        Ok(Self { dir })
    }

    fn record_path(&self, email: &str) -> SecretResult<PathBuf> {
        let email = normalize_id(email);
        if email.is_empty() {
            return Err(SecretError::MissingEmail);
        }
        Ok(self
            .dir
            .join(format!("token-{}.json", URL_SAFE_NO_PAD.encode(email.as_bytes()))))
    }
}

impl SecretStore for FileSecretStore {
    fn get_token(&self, email: &str) -> SecretResult<StoredToken> {
        let path = self.record_path(email)?;
        store::read_json_if_exists(&path, "stored token")?.ok_or_else(|| SecretError::NotFound {
            email: normalize_id(email),
        })
    }

    fn set_token(&self, token: &StoredToken) -> SecretResult<()> {
        if token.refresh_token.trim().is_empty() {
            return Err(SecretError::MissingRefreshToken);
        }
        let mut record = token.clone();
        record.email = normalize_id(&record.email);
        if record.created_at.is_none() {
            record.created_at = Some(Utc::now());
        }
        let path = self.record_path(&record.email)?;
        store::write_json_atomic(&path, &record, false, "stored token")?;
        Ok(())
    }

    fn delete_token(&self, email: &str) -> SecretResult<bool> {
        let path = self.record_path(email)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(GovernanceError::io("delete stored token", e).into()),
        }
    }

    fn list_tokens(&self) -> SecretResult<Vec<StoredToken>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| GovernanceError::io("list stored tokens", e))?;
        let mut tokens = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| GovernanceError::io("list stored tokens", e))?
                .path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("token-") && n.ends_with(".json"));
            if !is_record {
                continue;
            }
            if let Some(token) = store::read_json_if_exists::<StoredToken>(&path, "stored token")? {
                tokens.push(token);
            }
        }
        tokens.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(email: &str) -> StoredToken {
        StoredToken {
            email: email.to_string(),
            services: vec!["gmail".to_string()],
            scopes: Vec::new(),
            created_at: None,
            refresh_token: "1//refresh".to_string(),
        }
    }

    #[test]
    fn set_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(&ConfigDir::new(dir.path())).unwrap();

        store.set_token(&token("B@example.com")).unwrap();
        store.set_token(&token("a@example.com")).unwrap();

        let got = store.get_token("b@EXAMPLE.com").unwrap();
        assert_eq!(got.email, "b@example.com");
        assert!(got.created_at.is_some());

        let emails: Vec<_> = store.list_tokens().unwrap().into_iter().map(|t| t.email).collect();
        assert_eq!(emails, vec!["a@example.com", "b@example.com"]);

        assert!(store.delete_token("a@example.com").unwrap());
        assert!(!store.delete_token("a@example.com").unwrap());
        assert!(matches!(
            store.get_token("a@example.com"),
            Err(SecretError::NotFound { .. })
        ));
    }

    #[test]
    fn rejects_incomplete_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::open(&ConfigDir::new(dir.path())).unwrap();

        let mut no_refresh = token("a@example.com");
        no_refresh.refresh_token = " ".to_string();
        assert!(matches!(
            store.set_token(&no_refresh),
            Err(SecretError::MissingRefreshToken)
        ));
        assert!(matches!(store.set_token(&token("")), Err(SecretError::MissingEmail)));
    }

    #[test]
    fn missing_account_maps_to_auth_exit() {
        let err = SecretError::NotFound {
            email: "a@example.com".to_string(),
        };
        let cli = CliError::from(err);
        assert_eq!(cli.exit, ExitCode::Auth);
        assert_eq!(cli.code, "auth_required");
    }

    #[test]
    fn debug_redacts_refresh_token() {
        let rendered = format!("{:?}", token("a@example.com"));
        assert!(!rendered.contains("1//refresh"));
        assert!(rendered.contains("<redacted>"));
    }
}
