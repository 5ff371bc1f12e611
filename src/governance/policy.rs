// ABOUTME: Policy engine — allow/deny decisions keyed by account and action identifier.
// ABOUTME: Reads policy.json fresh on every call; blocked accounts veto everything, empty allow-list is fail-open.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, GovernanceResult};
use crate::store::{self, ConfigDir};

/// Actions that need an approval token when the policy names none of its own.
pub const DEFAULT_APPROVAL_ACTIONS: &[&str] =
    &["calendar.delete", "docs.write.replace", "docs.find_replace"];

/// Lowercase and trim an account or action identifier.
pub fn normalize_id(value: &str) -> String {
    value.trim().to_lowercase()
}

/// The on-disk policy document (`policy.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// Empty means no restriction.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allowed_actions: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub blocked_accounts: BTreeSet<String>,
    /// Replaces [`DEFAULT_APPROVAL_ACTIONS`] wholesale when non-empty.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub require_approval_actions: BTreeSet<String>,
}

/// Outcome of a policy decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    AccountBlocked { account: String },
    ActionNotAllowed { action: String },
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccountBlocked { account } => {
                write!(f, "account {account:?} is blocked by policy")
            }
            Self::ActionNotAllowed { action } => {
                write!(f, "action {action:?} is not allowed by policy")
            }
        }
    }
}

impl PolicyDocument {
    /// Lowercase, trim, and drop empty entries in all three sets.
    pub fn normalize(&mut self) {
        for set in [
            &mut self.allowed_actions,
            &mut self.blocked_accounts,
            &mut self.require_approval_actions,
        ] {
            *set = std::mem::take(set)
                .into_iter()
                .map(|v| normalize_id(&v))
                .filter(|v| !v.is_empty())
                .collect();
        }
    }

    /// Decide whether `account` may perform `action`.
    pub fn decide(&self, account: &str, action: &str) -> Decision {
        let account = normalize_id(account);
        let action = normalize_id(action);

        if self.blocked_accounts.contains(&account) {
            return Decision::Deny(DenyReason::AccountBlocked { account });
        }
        if self.allowed_actions.is_empty() || self.allowed_actions.contains(&action) {
            return Decision::Allow;
        }
        Decision::Deny(DenyReason::ActionNotAllowed { action })
    }

    /// Whether `action` must carry an approval token.
    pub fn requires_approval(&self, action: &str) -> bool {
        let action = normalize_id(action);
        if self.require_approval_actions.is_empty() {
            return DEFAULT_APPROVAL_ACTIONS.contains(&action.as_str());
        }
        self.require_approval_actions.contains(&action)
    }

    /// Default approval actions an operator override no longer covers.
    pub fn dropped_default_approvals(&self) -> Vec<&'static str> {
        if self.require_approval_actions.is_empty() {
            return Vec::new();
        }
        DEFAULT_APPROVAL_ACTIONS
            .iter()
            .copied()
            .filter(|a| !self.require_approval_actions.contains(*a))
            .collect()
    }
}

/// Load `policy.json`. A missing file yields the permissive default; an
/// unreadable or malformed file is an error.
pub fn read_policy(cfg: &ConfigDir) -> GovernanceResult<PolicyDocument> {
    let mut doc: PolicyDocument =
        store::read_json_if_exists(&cfg.policy_path(), "policy")?.unwrap_or_default();
    doc.normalize();
    Ok(doc)
}

/// Normalize and persist the policy document atomically.
pub fn write_policy(cfg: &ConfigDir, doc: &PolicyDocument) -> GovernanceResult<()> {
    let mut doc = doc.clone();
    doc.normalize();
    cfg.ensure()?;
    store::write_json_atomic(&cfg.policy_path(), &doc, true, "policy")
}

/// Policy decisions against the current on-disk snapshot.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    cfg: ConfigDir,
}

impl PolicyEngine {
    pub fn new(cfg: ConfigDir) -> Self {
        Self { cfg }
    }

    pub fn snapshot(&self) -> GovernanceResult<PolicyDocument> {
        read_policy(&self.cfg)
    }

    pub fn decide(&self, account: &str, action: &str) -> GovernanceResult<Decision> {
        let decision = self.snapshot()?.decide(account, action);
        tracing::debug!(account = %normalize_id(account), action = %normalize_id(action), ?decision, "policy decision");
        Ok(decision)
    }

    /// Like [`decide`](Self::decide), but a denial becomes
    /// [`GovernanceError::PolicyDenied`].
    pub fn enforce(&self, account: &str, action: &str) -> GovernanceResult<()> {
        match self.decide(account, action)? {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                tracing::warn!(%reason, "policy denied action");
                Err(GovernanceError::PolicyDenied { reason })
            }
        }
    }

    pub fn requires_approval(&self, action: &str) -> GovernanceResult<bool> {
        let doc = self.snapshot()?;
        let dropped = doc.dropped_default_approvals();
        if !dropped.is_empty() {
            tracing::debug!(?dropped, "require_approval_actions override drops default approval actions");
        }
        Ok(doc.requires_approval(action))
    }

    /// Administrative write: add `account` to `blocked_accounts`.
    pub fn block_account(&self, account: &str) -> GovernanceResult<PolicyDocument> {
        let account = normalize_id(account);
        if account.is_empty() {
            return Err(GovernanceError::invalid("account is required"));
        }
        let mut doc = self.snapshot()?;
        doc.blocked_accounts.insert(account);
        write_policy(&self.cfg, &doc)?;
        Ok(doc)
    }
}
