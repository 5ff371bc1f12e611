// ABOUTME: Command-line surface — clap command tree, shared invocation context, and dispatch.
// ABOUTME: Handlers return JSON values; failures come back as CliError with exit code and error code.

pub mod audit;
pub mod auth;
pub mod gate;
pub mod policy;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use crate::config::Config;
use crate::governance::{AuditEntry, AuditLog, Gate};
use crate::output::{CliError, ExitCode};
use crate::store::ConfigDir;

/// AI-agent-friendly CLI for Gmail, Calendar, Docs, Sheets and Slides, with a governance control plane.
#[derive(Debug, Parser)]
#[command(name = "gog-lite", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Enable verbose logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print what would be done without executing
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Append audit entries to this file (must be inside the config directory)
    #[arg(long, global = true)]
    pub audit_log: Option<PathBuf>,

    /// Configuration directory (defaults to <user config dir>/gog-lite)
    #[arg(long, global = true, env = "GOG_LITE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage accounts, approval tokens and emergency revocation
    Auth {
        #[command(subcommand)]
        command: auth::AuthCommand,
    },
    /// Inspect and edit the action policy
    Policy {
        #[command(subcommand)]
        command: policy::PolicyCommand,
    },
    /// Inspect the audit log
    Audit {
        #[command(subcommand)]
        command: audit::AuditCommand,
    },
    /// Run the governance checks for an action performed by an external executor
    Gate(gate::GateArgs),
}

/// Everything a handler needs for one invocation.
#[derive(Debug, Clone)]
pub struct Context {
    pub cfg: ConfigDir,
    pub config: Config,
    pub dry_run: bool,
    pub audit_log: Option<PathBuf>,
}

impl Context {
    pub fn from_args(global: &GlobalArgs) -> Result<Self, CliError> {
        let cfg = match &global.config_dir {
            Some(dir) => ConfigDir::new(dir),
            None => ConfigDir::default_location()?,
        };
        let config = Config::load(&cfg)
            .map_err(|e| CliError::new(ExitCode::Error, "config_error", e.to_string()))?;
        Ok(Self {
            cfg,
            config,
            dry_run: global.dry_run,
            audit_log: global.audit_log.clone(),
        })
    }

    pub fn gate(&self) -> Gate {
        Gate::with_system_clock(self.cfg.clone())
    }

    /// `--audit-log` wins over `audit_log` in config.toml.
    pub fn audit_path(&self) -> Option<&Path> {
        self.audit_log
            .as_deref()
            .or(self.config.audit_log.as_deref())
    }

    pub fn audit(&self, entry: AuditEntry) -> Result<AuditEntry, CliError> {
        Ok(AuditLog::with_system_clock(self.cfg.clone()).append(self.audit_path(), entry)?)
    }
}

/// Execute a parsed command line.
pub fn run(cli: Cli) -> Result<Value, CliError> {
    let ctx = Context::from_args(&cli.global)?;
    match cli.command {
        Command::Auth { command } => auth::run(&ctx, command),
        Command::Policy { command } => policy::run(&ctx, command),
        Command::Audit { command } => audit::run(&ctx, command),
        Command::Gate(args) => gate::run(&ctx, args),
    }
}

/// Parse durations like `90s`, `10m`, `1h30m`, `1h 30m`, `500ms`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    humantime::parse_duration(input.trim()).map_err(|e| format!("invalid duration {input:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(" 2h ").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1h 30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_bad_durations() {
        for bad in ["", "10", "m", "5 parsecs", "ten minutes"] {
            assert!(parse_duration(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gog-lite",
            "auth",
            "approval-token",
            "-a",
            "a@example.com",
            "--action",
            "calendar.delete",
            "--dry-run",
            "--config-dir",
            "/tmp/cfg",
        ])
        .unwrap();
        assert!(cli.global.dry_run);
        assert_eq!(cli.global.config_dir, Some(PathBuf::from("/tmp/cfg")));
    }
}
