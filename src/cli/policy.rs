// ABOUTME: `policy` subcommands — show, replace, and test the policy document.
// ABOUTME: `policy set` rewrites policy.json atomically and is audited.

use clap::Subcommand;
use serde_json::{Value, json};

use super::Context;
use crate::governance::{
    AuditEntry, Decision, PolicyDocument, PolicyEngine, normalize_id, write_policy,
};
use crate::output::CliError;

#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    /// Print the current policy document
    Show,
    /// Replace the policy document
    Set {
        /// Allowed actions (comma-separated); empty allows everything
        #[arg(long, value_delimiter = ',')]
        allow: Vec<String>,
        /// Blocked accounts (comma-separated)
        #[arg(long, value_delimiter = ',')]
        block: Vec<String>,
        /// Actions needing an approval token; empty keeps the built-in defaults
        #[arg(long, value_delimiter = ',')]
        require_approval: Vec<String>,
    },
    /// Evaluate one account/action pair against the policy
    Check {
        #[arg(short, long)]
        account: String,
        #[arg(long)]
        action: String,
    },
}

pub fn run(ctx: &Context, command: PolicyCommand) -> Result<Value, CliError> {
    match command {
        PolicyCommand::Show => show(ctx),
        PolicyCommand::Set {
            allow,
            block,
            require_approval,
        } => {
            let mut doc = PolicyDocument {
                allowed_actions: allow.into_iter().collect(),
                blocked_accounts: block.into_iter().collect(),
                require_approval_actions: require_approval.into_iter().collect(),
            };
            doc.normalize();
            set(ctx, doc)
        }
        PolicyCommand::Check { account, action } => check(ctx, &account, &action),
    }
}

fn document_json(doc: &PolicyDocument) -> Value {
    let effective: Vec<String> = if doc.require_approval_actions.is_empty() {
        crate::governance::DEFAULT_APPROVAL_ACTIONS
            .iter()
            .map(|a| a.to_string())
            .collect()
    } else {
        doc.require_approval_actions.iter().cloned().collect()
    };
    json!({
        "allowed_actions": doc.allowed_actions,
        "blocked_accounts": doc.blocked_accounts,
        "require_approval_actions": doc.require_approval_actions,
        "effective_approval_actions": effective,
    })
}

pub fn show(ctx: &Context) -> Result<Value, CliError> {
    let doc = PolicyEngine::new(ctx.cfg.clone()).snapshot()?;
    Ok(json!({ "policy": document_json(&doc) }))
}

pub fn set(ctx: &Context, doc: PolicyDocument) -> Result<Value, CliError> {
    let dropped = doc.dropped_default_approvals();
    if !dropped.is_empty() {
        tracing::info!(?dropped, "new policy no longer requires approval for default actions");
    }

    let entry = AuditEntry::new("policy.set");
    if ctx.dry_run {
        ctx.audit(entry.dry_run(true))?;
        return Ok(json!({ "dry_run": true, "policy": document_json(&doc) }));
    }

    write_policy(&ctx.cfg, &doc)?;
    ctx.audit(entry)?;
    Ok(json!({ "updated": true, "policy": document_json(&doc) }))
}

pub fn check(ctx: &Context, account: &str, action: &str) -> Result<Value, CliError> {
    let engine = PolicyEngine::new(ctx.cfg.clone());
    let decision = engine.decide(account, action)?;
    let requires_approval = engine.requires_approval(action)?;
    let reason = match &decision {
        Decision::Allow => None,
        Decision::Deny(reason) => Some(reason.to_string()),
    };
    Ok(json!({
        "account": normalize_id(account),
        "action": normalize_id(action),
        "allowed": decision.is_allowed(),
        "requires_approval": requires_approval,
        "reason": reason,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::governance::read_policy;
    use crate::store::ConfigDir;

    fn ctx(dir: &tempfile::TempDir) -> Context {
        Context {
            cfg: ConfigDir::new(dir.path()),
            config: Config::default(),
            dry_run: false,
            audit_log: None,
        }
    }

    #[test]
    fn set_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        run(
            &ctx,
            PolicyCommand::Set {
                allow: vec!["Gmail.Send".to_string()],
                block: vec!["bad@example.com".to_string()],
                require_approval: Vec::new(),
            },
        )
        .unwrap();

        let stored = read_policy(&ctx.cfg).unwrap();
        assert!(stored.allowed_actions.contains("gmail.send"));

        let ok = check(&ctx, "a@example.com", "gmail.send").unwrap();
        assert_eq!(ok["allowed"], true);
        assert_eq!(ok["reason"], Value::Null);

        let denied = check(&ctx, "a@example.com", "calendar.create").unwrap();
        assert_eq!(denied["allowed"], false);
        assert_eq!(
            denied["reason"],
            "action \"calendar.create\" is not allowed by policy"
        );

        let blocked = check(&ctx, "BAD@example.com", "gmail.send").unwrap();
        assert_eq!(blocked["allowed"], false);
    }

    #[test]
    fn show_reports_effective_approval_actions() {
        let dir = tempfile::tempdir().unwrap();
        let out = show(&ctx(&dir)).unwrap();
        let effective = out["policy"]["effective_approval_actions"].as_array().unwrap();
        assert_eq!(effective.len(), 3);
    }

    #[test]
    fn dry_run_set_leaves_policy_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx(&dir);
        ctx.dry_run = true;

        let doc = PolicyDocument {
            blocked_accounts: ["a@example.com".to_string()].into(),
            ..PolicyDocument::default()
        };
        set(&ctx, doc).unwrap();
        assert!(!ctx.cfg.policy_path().exists());
    }
}
