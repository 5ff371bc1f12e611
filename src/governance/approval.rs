// ABOUTME: Approval token manager — single-use, time-boxed tokens gating dangerous actions.
// ABOUTME: One JSON file per token under approvals/; consumption flips `used` and persists before returning.

use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SubsecRound, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{GovernanceError, GovernanceResult, TokenError};
use crate::governance::policy::normalize_id;
use crate::store::{self, ConfigDir, rfc3339_secs};

/// Random bytes per token before encoding.
pub const TOKEN_BYTES: usize = 24;

/// A persisted approval token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalToken {
    pub token: String,
    pub account: String,
    pub action: String,
    #[serde(with = "rfc3339_secs")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub used: bool,
}

impl ApprovalToken {
    /// Expired at or after `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What the caller gets back from a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and consumes approval tokens stored in `<config>/approvals/`.
#[derive(Debug, Clone)]
pub struct ApprovalManager<C = SystemClock> {
    cfg: ConfigDir,
    clock: C,
}

impl ApprovalManager<SystemClock> {
    pub fn with_system_clock(cfg: ConfigDir) -> Self {
        Self::new(cfg, SystemClock)
    }
}

impl<C: Clock> ApprovalManager<C> {
    pub fn new(cfg: ConfigDir, clock: C) -> Self {
        Self { cfg, clock }
    }

    /// Issue a fresh token for `(account, action)` valid for `ttl`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a zero TTL or an empty account/action; storage
    /// errors if the record cannot be written.
    pub fn issue(&self, account: &str, action: &str, ttl: Duration) -> GovernanceResult<IssuedToken> {
        if ttl.is_zero() {
            return Err(GovernanceError::invalid("ttl must be positive"));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| GovernanceError::invalid("ttl is out of range"))?;

        let account = normalize_id(account);
        let action = normalize_id(action);
        if account.is_empty() || action.is_empty() {
            return Err(GovernanceError::invalid("account and action are required"));
        }

        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| GovernanceError::invalid("ttl is out of range"))?
            .trunc_subsecs(0);
        let token = random_token();
        let record = ApprovalToken {
            token: token.clone(),
            account,
            action,
            expires_at,
            used: false,
        };

        self.cfg.ensure_subdir("approvals")?;
        store::write_json_atomic(&self.token_path(&token)?, &record, false, "approval token")?;
        tracing::debug!(account = %record.account, action = %record.action, expires_at = %record.expires_at, "issued approval token");

        Ok(IssuedToken { token, expires_at })
    }

    /// Consume `token` for `(account, action)`.
    ///
    /// Checks run in order: not found, already used, account/action
    /// mismatch, expired. On success the record is marked used on disk
    /// before this returns.
    pub fn consume(&self, account: &str, action: &str, token: &str) -> GovernanceResult<()> {
        let account = normalize_id(account);
        let action = normalize_id(action);
        let token = token.trim();
        if account.is_empty() || action.is_empty() || token.is_empty() {
            return Err(GovernanceError::invalid(
                "approval token, account, and action are required",
            ));
        }

        let path = self.token_path(token)?;
        let mut record: ApprovalToken =
            store::read_json_if_exists(&path, "approval token")?.ok_or(TokenError::NotFound)?;

        let verdict = if record.used {
            Err(TokenError::AlreadyUsed)
        } else if record.account != account || record.action != action {
            Err(TokenError::Mismatch)
        } else if record.is_expired_at(self.clock.now()) {
            Err(TokenError::Expired)
        } else {
            Ok(())
        };
        if let Err(e) = verdict {
            tracing::warn!(%account, %action, error = %e, "approval token rejected");
            return Err(e.into());
        }

        record.used = true;
        store::write_json_atomic(&path, &record, false, "approval token")?;
        tracing::debug!(%account, %action, "consumed approval token");
        Ok(())
    }

    /// Read a token record without changing it.
    pub fn load(&self, token: &str) -> GovernanceResult<Option<ApprovalToken>> {
        store::read_json_if_exists(&self.token_path(token.trim())?, "approval token")
    }

    /// Token values are URL-safe base64; anything else could not have been
    /// issued here and must not be used to build a path.
    fn token_path(&self, token: &str) -> GovernanceResult<PathBuf> {
        let well_formed = !token.is_empty()
            && token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !well_formed {
            return Err(TokenError::NotFound.into());
        }
        Ok(self.cfg.approvals_dir().join(format!("{token}.json")))
    }
}

fn random_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
