// ABOUTME: Shared persistence primitives for the governed config tree.
// ABOUTME: Owner-only directories, read-if-exists JSON, atomic tmp+rename writes, and path normalization.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{GovernanceError, GovernanceResult};

pub const APP_NAME: &str = "gog-lite";

/// Handle to the managed configuration tree (`~/.config/gog-lite` by default).
///
/// Every governance component is constructed from one of these so tests can
/// point the whole control plane at a temp directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDir {
    root: PathBuf,
}

impl ConfigDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<user config dir>/gog-lite`.
    pub fn default_location() -> GovernanceResult<Self> {
        let base = dirs::config_dir().ok_or(GovernanceError::ConfigDirUnavailable)?;
        Ok(Self::new(base.join(APP_NAME)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the tree root (0700) if missing and return it.
    pub fn ensure(&self) -> GovernanceResult<&Path> {
        create_private_dir_all(&self.root)
            .map_err(|e| GovernanceError::io("ensure config dir", e))?;
        Ok(&self.root)
    }

    /// Create a subdirectory of the tree (0700) if missing and return its path.
    pub fn ensure_subdir(&self, name: &str) -> GovernanceResult<PathBuf> {
        let dir = self.root.join(name);
        create_private_dir_all(&dir)
            .map_err(|e| GovernanceError::io(format!("ensure {name} dir"), e))?;
        Ok(dir)
    }

    pub fn policy_path(&self) -> PathBuf {
        self.root.join("policy.json")
    }

    pub fn approvals_dir(&self) -> PathBuf {
        self.root.join("approvals")
    }

    pub fn ratelimit_dir(&self) -> PathBuf {
        self.root.join("ratelimit")
    }

    pub fn default_audit_log(&self) -> PathBuf {
        self.root.join("audit.log")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root.join("credentials.json")
    }
}

/// `mkdir -p` with owner-only permissions on the directories it creates.
pub fn create_private_dir_all(path: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

/// Open a file for writing with owner-only permissions (0600 on unix).
pub fn open_private(path: &Path, append: bool) -> std::io::Result<fs::File> {
    let mut opts = fs::OpenOptions::new();
    opts.create(true);
    if append {
        opts.append(true);
    } else {
        opts.write(true).truncate(true);
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
}

/// Read and decode a JSON file. A missing file is `Ok(None)`; anything else
/// that goes wrong is a hard error.
pub fn read_json_if_exists<T: DeserializeOwned>(
    path: &Path,
    what: &str,
) -> GovernanceResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(GovernanceError::io(format!("read {what}"), e)),
    };
    let value = serde_json::from_str(&content)
        .map_err(|e| GovernanceError::corrupt(format!("decode {what}"), e))?;
    Ok(Some(value))
}

/// Serialize `value` and replace `path` with it via tmp file + rename.
///
/// Parent directories are created (0700) as needed.
pub fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    pretty: bool,
    what: &str,
) -> GovernanceResult<()> {
    let mut content = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| GovernanceError::corrupt(format!("encode {what}"), e))?;
    if pretty {
        content.push('\n');
    }

    if let Some(parent) = path.parent() {
        create_private_dir_all(parent)
            .map_err(|e| GovernanceError::io(format!("ensure {what} dir"), e))?;
    }

    let tmp_path = tmp_path_for(path);
    let mut file =
        open_private(&tmp_path, false).map_err(|e| GovernanceError::io(format!("write {what}"), e))?;
    file.write_all(content.as_bytes())
        .and_then(|()| file.sync_all())
        .map_err(|e| GovernanceError::io(format!("write {what}"), e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| GovernanceError::io(format!("commit {what}"), e))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Make `path` absolute against the current directory and resolve `.`/`..`
/// lexically. Symlinks are not followed.
pub fn absolute_clean(path: &Path) -> GovernanceResult<PathBuf> {
    let abs = std::path::absolute(path)
        .map_err(|e| GovernanceError::io(format!("resolve absolute path {}", path.display()), e))?;

    let mut out = PathBuf::new();
    for component in abs.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `/..` stays `/`.
                if !matches!(out.components().next_back(), Some(Component::RootDir) | None) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

/// RFC3339 in UTC with whole seconds, e.g. `2026-01-15T10:00:00Z`.
pub fn format_rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Serde adapter for `DateTime<Utc>` fields stored as whole-second RFC3339.
pub mod rfc3339_secs {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_rfc3339(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_rfc3339(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid RFC3339 timestamp {raw:?}")))
    }
}
