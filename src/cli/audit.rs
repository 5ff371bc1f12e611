// ABOUTME: `audit` subcommands — verify the hash chain of the audit log.

use clap::Subcommand;
use serde_json::{Value, json};

use super::Context;
use crate::governance::AuditLog;
use crate::output::CliError;

#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Recompute every hash and check each entry links to its predecessor
    Verify,
}

pub fn run(ctx: &Context, command: AuditCommand) -> Result<Value, CliError> {
    match command {
        AuditCommand::Verify => verify(ctx),
    }
}

pub fn verify(ctx: &Context) -> Result<Value, CliError> {
    let log = AuditLog::with_system_clock(ctx.cfg.clone());
    let path = log.resolve_path(ctx.audit_path())?;
    let summary = log.verify(ctx.audit_path())?;
    Ok(json!({
        "valid": true,
        "path": path.display().to_string(),
        "entries": summary.entries,
        "last_hash": summary.last_hash,
    }))
}
