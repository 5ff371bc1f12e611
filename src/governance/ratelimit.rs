// ABOUTME: Sliding-window rate limiter, one JSON file of accepted timestamps per action.
// ABOUTME: Stale timestamps are pruned on every check; rejected attempts do not consume a slot.

use std::path::PathBuf;
use std::time::Duration;

use chrono::SubsecRound;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{GovernanceError, GovernanceResult};
use crate::store::{self, ConfigDir};

/// On-disk window state: accepted invocations still inside the last window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitState {
    #[serde(default)]
    pub timestamps: Vec<String>,
}

/// A limit of `limit` admissions per trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitRule {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(60),
        }
    }
}

/// File name stem for an action: `/`, space and `:` become `_`.
pub fn sanitize_action(action: &str) -> String {
    let safe = action.replace(['/', ' ', ':'], "_");
    if safe.is_empty() {
        "default".to_string()
    } else {
        safe
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter<C = SystemClock> {
    cfg: ConfigDir,
    clock: C,
}

impl RateLimiter<SystemClock> {
    pub fn with_system_clock(cfg: ConfigDir) -> Self {
        Self::new(cfg, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(cfg: ConfigDir, clock: C) -> Self {
        Self { cfg, clock }
    }

    pub fn state_path(&self, action: &str) -> PathBuf {
        self.cfg
            .ratelimit_dir()
            .join(format!("{}.json", sanitize_action(action.trim())))
    }

    /// Admit one invocation of `action` if fewer than `limit` were admitted
    /// within the trailing `window`.
    ///
    /// A zero limit, zero window, or blank action disables the check and
    /// touches nothing on disk.
    ///
    /// # Errors
    ///
    /// [`GovernanceError::RateLimited`] when the window is full. An
    /// unreadable state file, or one holding a timestamp that does not
    /// parse, is a storage error rather than an empty window.
    pub fn check(&self, action: &str, limit: u32, window: Duration) -> GovernanceResult<()> {
        let action = action.trim();
        if limit == 0 || window.is_zero() || action.is_empty() {
            return Ok(());
        }
        let span = chrono::Duration::from_std(window)
            .map_err(|_| GovernanceError::invalid("rate limit window is out of range"))?;

        let path = self.state_path(action);
        let state: RateLimitState =
            store::read_json_if_exists(&path, "rate limit state")?.unwrap_or_default();

        let now = self.clock.now().trunc_subsecs(0);
        let cutoff = now
            .checked_sub_signed(span)
            .ok_or_else(|| GovernanceError::invalid("rate limit window is out of range"))?;
        let mut kept = Vec::with_capacity(state.timestamps.len() + 1);
        for raw in state.timestamps {
            let Some(t) = store::parse_rfc3339(&raw) else {
                return Err(GovernanceError::InvalidTimestamp {
                    context: format!("rate limit state for {action}"),
                    value: raw,
                });
            };
            if t >= cutoff {
                kept.push(raw);
            }
        }

        if kept.len() >= limit as usize {
            tracing::warn!(%action, limit, window = ?window, "rate limit exceeded");
            return Err(GovernanceError::RateLimited {
                action: action.to_string(),
                limit,
                window,
            });
        }

        kept.push(store::format_rfc3339(now));
        self.cfg.ensure_subdir("ratelimit")?;
        store::write_json_atomic(
            &path,
            &RateLimitState { timestamps: kept },
            false,
            "rate limit state",
        )
    }
}
