// ABOUTME: Error taxonomy for the governance control plane.
// ABOUTME: Validation, policy denial, token, rate-limit, and storage/integrity failures stay distinct.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::governance::policy::DenyReason;
use crate::output::ExitCode;

/// Why an approval token could not be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("approval token not found")]
    NotFound,
    /// Terminal: a consumed token never becomes usable again.
    #[error("approval token already used")]
    AlreadyUsed,
    #[error("approval token does not match account/action")]
    Mismatch,
    #[error("approval token expired")]
    Expired,
}

impl TokenError {
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "approval_token_not_found",
            Self::AlreadyUsed => "approval_token_used",
            Self::Mismatch => "approval_token_mismatch",
            Self::Expired => "approval_token_expired",
        }
    }
}

/// Errors returned by the governance components.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// Rejected before any persistent state was touched.
    #[error("{0}")]
    InvalidInput(String),

    #[error("{reason}")]
    PolicyDenied { reason: DenyReason },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("action {action:?} requires an approval token")]
    ApprovalRequired { action: String },

    #[error("rate limit exceeded for {action}: max {limit} per {window:?}")]
    RateLimited {
        action: String,
        limit: u32,
        window: Duration,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Corrupt {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: invalid timestamp {value:?}")]
    InvalidTimestamp { context: String, value: String },

    #[error("audit log path must be under {}", root.display())]
    AuditPathOutsideConfig { path: PathBuf, root: PathBuf },

    #[error("audit log path cannot be config directory itself")]
    AuditPathIsConfigRoot { path: PathBuf },

    #[error("audit chain broken at line {line}: {reason}")]
    ChainBroken { line: usize, reason: String },

    #[error("could not resolve user config directory")]
    ConfigDirUnavailable,
}

impl GovernanceError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn corrupt(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Corrupt {
            context: context.into(),
            source,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Process exit code the CLI should use for this error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::PolicyDenied { .. }
            | Self::Token(_)
            | Self::ApprovalRequired { .. }
            | Self::RateLimited { .. } => ExitCode::Permission,
            _ => ExitCode::Error,
        }
    }

    /// Machine-readable error code for JSON error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::PolicyDenied { .. } => "policy_denied",
            Self::Token(e) => e.code(),
            Self::ApprovalRequired { .. } => "approval_required",
            Self::RateLimited { .. } => "rate_limited",
            Self::Io { .. } => "storage_error",
            Self::Corrupt { .. } | Self::InvalidTimestamp { .. } => "corrupt_state",
            Self::AuditPathOutsideConfig { .. } | Self::AuditPathIsConfigRoot { .. } => {
                "invalid_audit_log_path"
            }
            Self::ChainBroken { .. } => "audit_chain_broken",
            Self::ConfigDirUnavailable => "config_error",
        }
    }
}

pub type GovernanceResult<T> = Result<T, GovernanceError>;
