// ABOUTME: Governed-action gate — runs policy, approval, rate limit, the real work, then audit.
// ABOUTME: Dry runs are policy-checked and audited but never consume tokens, slots, or call the API.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;
use crate::clock::{Clock, SystemClock};
use crate::error::{GovernanceError, GovernanceResult};
use crate::governance::approval::ApprovalManager;
use crate::governance::audit::{AuditEntry, AuditLog};
use crate::governance::policy::{Decision, PolicyEngine, normalize_id};
use crate::governance::ratelimit::{RateLimitRule, RateLimiter};
use crate::output::CliError;
use crate::store::ConfigDir;

/// One attempt to perform a governed action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionRequest {
    pub account: String,
    pub action: String,
    pub target: String,
    pub dry_run: bool,
    pub approval_token: Option<String>,
    pub rate_limit: Option<RateLimitRule>,
    /// Explicit audit log path; `None` uses the config tree default.
    pub audit_log: Option<PathBuf>,
}

impl ActionRequest {
    pub fn new(account: &str, action: &str) -> Self {
        Self {
            account: normalize_id(account),
            action: normalize_id(action),
            ..Self::default()
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn approval_token(mut self, token: Option<String>) -> Self {
        self.approval_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn rate_limit(mut self, rule: Option<RateLimitRule>) -> Self {
        self.rate_limit = rule;
        self
    }

    pub fn audit_log(mut self, path: Option<PathBuf>) -> Self {
        self.audit_log = path;
        self
    }

    fn audit_entry(&self) -> AuditEntry {
        AuditEntry::new(self.action.clone())
            .account(self.account.clone())
            .target(self.target.clone())
            .dry_run(self.dry_run)
    }
}

/// What a gated run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Nothing was executed; the attempt was audited.
    DryRun(AuditEntry),
    Done { value: T, audit: AuditEntry },
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Governance(#[from] GovernanceError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<GateError> for CliError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Governance(e) => e.into(),
            GateError::Api(e) => e.into(),
        }
    }
}

/// The four governance components over one config tree and one clock.
#[derive(Debug, Clone)]
pub struct Gate<C = SystemClock> {
    policy: PolicyEngine,
    approvals: ApprovalManager<C>,
    limiter: RateLimiter<C>,
    audit: AuditLog<C>,
}

impl Gate<SystemClock> {
    pub fn with_system_clock(cfg: ConfigDir) -> Self {
        Self::new(cfg, SystemClock)
    }
}

impl<C: Clock + Clone> Gate<C> {
    /// Pass `&ManualClock` in tests so all components see the same time.
    pub fn new(cfg: ConfigDir, clock: C) -> Self {
        Self {
            policy: PolicyEngine::new(cfg.clone()),
            approvals: ApprovalManager::new(cfg.clone(), clock.clone()),
            limiter: RateLimiter::new(cfg.clone(), clock.clone()),
            audit: AuditLog::new(cfg, clock),
        }
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn approvals(&self) -> &ApprovalManager<C> {
        &self.approvals
    }

    pub fn limiter(&self) -> &RateLimiter<C> {
        &self.limiter
    }

    pub fn audit(&self) -> &AuditLog<C> {
        &self.audit
    }

    /// Pre-execution checks. Dry runs stop after the policy decision.
    pub fn authorize(&self, req: &ActionRequest) -> GovernanceResult<()> {
        let doc = self.policy.snapshot()?;
        if let Decision::Deny(reason) = doc.decide(&req.account, &req.action) {
            tracing::warn!(account = %req.account, action = %req.action, %reason, "gate: policy denied");
            return Err(GovernanceError::PolicyDenied { reason });
        }
        if req.dry_run {
            return Ok(());
        }

        if doc.requires_approval(&req.action) {
            let token = req
                .approval_token
                .as_deref()
                .ok_or_else(|| GovernanceError::ApprovalRequired {
                    action: req.action.clone(),
                })?;
            self.approvals.consume(&req.account, &req.action, token)?;
        }

        if let Some(rule) = req.rate_limit {
            self.limiter.check(&req.action, rule.limit, rule.window)?;
        }
        Ok(())
    }

    /// Append the audit entry for `req`.
    pub fn record(&self, req: &ActionRequest) -> GovernanceResult<AuditEntry> {
        self.audit.append(req.audit_log.as_deref(), req.audit_entry())
    }

    /// Authorize, execute `work`, and audit.
    ///
    /// There is no two-phase commit: if `work` succeeds and the audit write
    /// then fails, the mutation stands and the audit failure is returned.
    pub fn run<T, F>(&self, req: &ActionRequest, work: F) -> Result<Outcome<T>, GateError>
    where
        F: FnOnce() -> Result<T, ApiError>,
    {
        self.authorize(req)?;
        if req.dry_run {
            let audit = self.record(req)?;
            return Ok(Outcome::DryRun(audit));
        }

        let value = work()?;
        let audit = self.record(req).inspect_err(|e| {
            tracing::error!(action = %req.action, error = %e, "action succeeded but audit write failed");
        })?;
        Ok(Outcome::Done { value, audit })
    }
}
