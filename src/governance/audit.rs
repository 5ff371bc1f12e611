// ABOUTME: Append-only, hash-chained JSONL audit log of every governed action attempt.
// ABOUTME: Each entry carries the previous entry's hash; the log path must stay inside the config tree.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::{Clock, SystemClock};
use crate::error::{GovernanceError, GovernanceResult};
use crate::store::{self, ConfigDir};

/// One line of the audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// RFC3339 UTC. Filled in at append time when left empty.
    #[serde(default)]
    pub timestamp: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub account: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default)]
    pub dry_run: bool,
    /// Empty for the first entry of a log.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prev_hash: String,
    #[serde(default)]
    pub hash: String,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = account.into();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Pin the timestamp instead of taking it from the log's clock.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = store::format_rfc3339(timestamp);
        self
    }

    /// SHA-256 (hex) over
    /// `timestamp|action|account|target|dry_run|prev_hash`, with `dry_run`
    /// rendered as `true`/`false`.
    pub fn compute_hash(&self) -> String {
        let data = [
            self.timestamp.as_str(),
            self.action.as_str(),
            self.account.as_str(),
            self.target.as_str(),
            if self.dry_run { "true" } else { "false" },
            self.prev_hash.as_str(),
        ]
        .join("|");
        hex::encode(Sha256::digest(data.as_bytes()))
    }

    /// Whether this entry is chain-linked directly after `previous`.
    pub fn follows(&self, previous: &AuditEntry) -> bool {
        self.prev_hash == previous.hash
    }
}

/// Result of walking a whole log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSummary {
    pub entries: usize,
    /// Hash of the tip entry, empty for an empty log.
    pub last_hash: String,
}

/// Writer for the audit log inside a config tree.
#[derive(Debug, Clone)]
pub struct AuditLog<C = SystemClock> {
    cfg: ConfigDir,
    clock: C,
}

impl AuditLog<SystemClock> {
    pub fn with_system_clock(cfg: ConfigDir) -> Self {
        Self::new(cfg, SystemClock)
    }
}

impl<C: Clock> AuditLog<C> {
    pub fn new(cfg: ConfigDir, clock: C) -> Self {
        Self { cfg, clock }
    }

    /// Resolve the log path. `None` (or blank) selects `<config>/audit.log`;
    /// anything else must normalize to a path strictly inside the config tree.
    pub fn resolve_path(&self, requested: Option<&Path>) -> GovernanceResult<PathBuf> {
        let root = store::absolute_clean(self.cfg.root())?;
        let requested = requested.filter(|p| !p.as_os_str().to_string_lossy().trim().is_empty());
        let Some(requested) = requested else {
            return store::absolute_clean(&self.cfg.default_audit_log());
        };

        let candidate = store::absolute_clean(requested)?;
        if candidate == root {
            return Err(GovernanceError::AuditPathIsConfigRoot { path: candidate });
        }
        if !candidate.starts_with(&root) {
            return Err(GovernanceError::AuditPathOutsideConfig {
                path: candidate,
                root,
            });
        }
        Ok(candidate)
    }

    /// Chain `entry` onto the log and append it. Returns the entry as written.
    pub fn append(&self, requested: Option<&Path>, mut entry: AuditEntry) -> GovernanceResult<AuditEntry> {
        let path = self.resolve_path(requested)?;
        if entry.timestamp.is_empty() {
            entry.timestamp = store::format_rfc3339(self.clock.now());
        }
        entry.prev_hash = last_hash(&path)?;
        entry.hash = entry.compute_hash();

        let mut line = serde_json::to_string(&entry)
            .map_err(|e| GovernanceError::corrupt("encode audit log", e))?;
        line.push('\n');

        if let Some(parent) = path.parent() {
            store::create_private_dir_all(parent)
                .map_err(|e| GovernanceError::io("ensure audit log directory", e))?;
        }
        let mut file = store::open_private(&path, true)
            .map_err(|e| GovernanceError::io("open audit log", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .map_err(|e| GovernanceError::io("restrict audit log permissions", e))?;
        }
        file.write_all(line.as_bytes())
            .map_err(|e| GovernanceError::io("write audit log", e))?;

        tracing::debug!(action = %entry.action, dry_run = entry.dry_run, path = %path.display(), "appended audit entry");
        Ok(entry)
    }

    /// Recompute and check the whole chain at the resolved path.
    pub fn verify(&self, requested: Option<&Path>) -> GovernanceResult<ChainSummary> {
        verify_file(&self.resolve_path(requested)?)
    }
}

/// Hash of the last non-blank line in the log, or empty if there is none.
pub fn last_hash(path: &Path) -> GovernanceResult<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(GovernanceError::io("read audit log", e)),
    };
    let Some(tail) = content.lines().rev().find(|l| !l.trim().is_empty()) else {
        return Ok(String::new());
    };
    let entry: AuditEntry = serde_json::from_str(tail.trim())
        .map_err(|e| GovernanceError::corrupt("decode audit log tail", e))?;
    Ok(entry.hash.trim().to_string())
}

/// Walk every entry: each must parse, link to its predecessor, and hash to
/// its stored value. A missing file is an empty chain.
pub fn verify_file(path: &Path) -> GovernanceResult<ChainSummary> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ChainSummary {
                entries: 0,
                last_hash: String::new(),
            });
        }
        Err(e) => return Err(GovernanceError::io("read audit log", e)),
    };

    let mut previous: Option<AuditEntry> = None;
    let mut entries = 0;
    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let entry: AuditEntry = serde_json::from_str(raw.trim()).map_err(|e| {
            GovernanceError::ChainBroken {
                line,
                reason: format!("unparseable entry: {e}"),
            }
        })?;

        let linked = match &previous {
            Some(prev) => entry.follows(prev),
            None => entry.prev_hash.is_empty(),
        };
        if !linked {
            tracing::warn!(line, "audit chain link mismatch");
            return Err(GovernanceError::ChainBroken {
                line,
                reason: "prev_hash does not match previous entry".to_string(),
            });
        }
        if entry.compute_hash() != entry.hash {
            tracing::warn!(line, "audit entry hash mismatch");
            return Err(GovernanceError::ChainBroken {
                line,
                reason: "hash does not match entry contents".to_string(),
            });
        }

        entries += 1;
        previous = Some(entry);
    }

    Ok(ChainSummary {
        entries,
        last_hash: previous.map(|e| e.hash).unwrap_or_default(),
    })
}
