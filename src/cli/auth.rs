// ABOUTME: `auth` subcommands — approval tokens, emergency revocation, stored accounts, preflight.
// ABOUTME: Mutating commands are audited and honor --dry-run.

use std::time::Duration;

use clap::Subcommand;
use serde_json::{Value, json};

use super::{Context, parse_duration};
use crate::config;
use crate::governance::{AuditEntry, DenyReason, Decision, PolicyEngine, normalize_id};
use crate::output::{CliError, ExitCode};
use crate::secrets::{FileSecretStore, SecretStore};
use crate::store;

/// Policy action every approval-token issuance is checked against.
pub const ISSUE_ACTION: &str = "auth.approval_token";

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Issue a single-use approval token for a dangerous action
    ApprovalToken {
        #[arg(short, long)]
        account: String,
        #[arg(long)]
        action: String,
        /// Token lifetime, e.g. 90s, 10m, 1h30m
        #[arg(long, default_value = "10m", value_parser = parse_duration)]
        ttl: Duration,
    },
    /// Store the OAuth client ID and secret in credentials.json
    Credentials {
        #[arg(long)]
        client_id: String,
        #[arg(long)]
        client_secret: String,
    },
    /// Delete an account's stored token and block it in policy
    EmergencyRevoke {
        #[arg(short, long)]
        account: String,
    },
    /// List accounts with stored tokens
    List,
    /// Remove an account's stored token
    Remove {
        #[arg(short, long)]
        account: String,
    },
    /// Check that an account is ready to run the given actions
    Preflight {
        #[arg(short, long)]
        account: String,
        #[arg(long, value_delimiter = ',')]
        require_actions: Vec<String>,
    },
}

pub fn run(ctx: &Context, command: AuthCommand) -> Result<Value, CliError> {
    match command {
        AuthCommand::ApprovalToken {
            account,
            action,
            ttl,
        } => approval_token(ctx, &account, &action, ttl),
        AuthCommand::Credentials {
            client_id,
            client_secret,
        } => credentials(ctx, &client_id, &client_secret),
        AuthCommand::EmergencyRevoke { account } => emergency_revoke(ctx, &account),
        AuthCommand::List => list(ctx),
        AuthCommand::Remove { account } => remove(ctx, &account),
        AuthCommand::Preflight {
            account,
            require_actions,
        } => preflight(ctx, &account, &require_actions),
    }
}

fn required(value: &str, flag: &str) -> Result<String, CliError> {
    let value = normalize_id(value);
    if value.is_empty() {
        return Err(CliError::new(
            ExitCode::Error,
            "invalid_input",
            format!("{flag} is required"),
        ));
    }
    Ok(value)
}

pub fn approval_token(
    ctx: &Context,
    account: &str,
    action: &str,
    ttl: Duration,
) -> Result<Value, CliError> {
    let account = required(account, "--account")?;
    let action = required(action, "--action")?;

    let gate = ctx.gate();
    gate.policy().enforce(&account, ISSUE_ACTION)?;
    gate.policy().enforce(&account, &action)?;
    if !gate.policy().requires_approval(&action)? {
        return Err(CliError::new(
            ExitCode::Error,
            "approval_not_required",
            format!("action {action:?} does not require an approval token"),
        ));
    }

    let entry = AuditEntry::new(ISSUE_ACTION)
        .account(&account)
        .target(&action);
    if ctx.dry_run {
        ctx.audit(entry.dry_run(true))?;
        return Ok(json!({
            "dry_run": true,
            "account": account,
            "action": action,
            "ttl_seconds": ttl.as_secs(),
        }));
    }

    let issued = gate.approvals().issue(&account, &action, ttl)?;
    ctx.audit(entry)?;
    Ok(json!({
        "issued": true,
        "account": account,
        "action": action,
        "token": issued.token,
        "expires_at": store::format_rfc3339(issued.expires_at),
    }))
}

/// Persist client credentials. The secret is never echoed back.
pub fn credentials(ctx: &Context, client_id: &str, client_secret: &str) -> Result<Value, CliError> {
    let creds = config::ClientCredentials {
        client_id: client_id.trim().to_string(),
        client_secret: client_secret.trim().to_string(),
    };
    if creds.client_id.is_empty() || creds.client_secret.is_empty() {
        return Err(CliError::new(
            ExitCode::Error,
            "invalid_input",
            "--client-id and --client-secret are required",
        ));
    }

    let entry = AuditEntry::new("auth.credentials");
    if ctx.dry_run {
        ctx.audit(entry.dry_run(true))?;
        return Ok(json!({ "dry_run": true, "client_id": creds.client_id }));
    }

    config::write_credentials(&ctx.cfg, &creds)?;
    ctx.audit(entry)?;
    Ok(json!({
        "stored": true,
        "client_id": creds.client_id,
        "path": ctx.cfg.credentials_path().display().to_string(),
    }))
}

/// Kill switch: drop the stored token and block the account. A missing
/// token is fine; the block still lands.
pub fn emergency_revoke(ctx: &Context, account: &str) -> Result<Value, CliError> {
    let account = required(account, "--account")?;
    let entry = AuditEntry::new("auth.emergency_revoke").account(&account);
    if ctx.dry_run {
        ctx.audit(entry.dry_run(true))?;
        return Ok(json!({ "dry_run": true, "account": account }));
    }

    let token_deleted = FileSecretStore::open(&ctx.cfg)?.delete_token(&account)?;
    let policy = PolicyEngine::new(ctx.cfg.clone()).block_account(&account)?;
    ctx.audit(entry)?;
    tracing::warn!(%account, token_deleted, "emergency revoke applied");

    Ok(json!({
        "revoked": true,
        "account": account,
        "token_deleted": token_deleted,
        "blocked_accounts": policy.blocked_accounts,
    }))
}

pub fn list(ctx: &Context) -> Result<Value, CliError> {
    let accounts: Vec<Value> = FileSecretStore::open(&ctx.cfg)?
        .list_tokens()?
        .into_iter()
        .map(|t| {
            json!({
                "email": t.email,
                "services": t.services,
                "scopes": t.scopes,
                "created_at": t.created_at.map(store::format_rfc3339),
            })
        })
        .collect();
    Ok(json!({ "accounts": accounts }))
}

pub fn remove(ctx: &Context, account: &str) -> Result<Value, CliError> {
    let account = required(account, "--account")?;
    let entry = AuditEntry::new("auth.remove").account(&account);
    if ctx.dry_run {
        ctx.audit(entry.dry_run(true))?;
        return Ok(json!({ "dry_run": true, "account": account }));
    }

    if !FileSecretStore::open(&ctx.cfg)?.delete_token(&account)? {
        return Err(CliError::new(
            ExitCode::NotFound,
            "not_found",
            format!("no stored token for {account}"),
        ));
    }
    ctx.audit(entry)?;
    Ok(json!({ "removed": true, "account": account }))
}

fn check(name: impl Into<String>, ok: bool, detail: impl Into<String>) -> Value {
    json!({ "name": name.into(), "ok": ok, "detail": detail.into() })
}

/// Read-only readiness report. Always succeeds; `ready` says whether every
/// check passed.
pub fn preflight(ctx: &Context, account: &str, actions: &[String]) -> Result<Value, CliError> {
    let account = required(account, "--account")?;
    let mut checks = Vec::new();

    checks.push(match config::read_credentials(&ctx.cfg) {
        Ok(_) => check("credentials", true, "client credentials found"),
        Err(e) => check("credentials", false, e.to_string()),
    });

    match FileSecretStore::open(&ctx.cfg) {
        Ok(secrets) => {
            checks.push(check("secret_store", true, "keyring directory available"));
            checks.push(match secrets.get_token(&account) {
                Ok(_) => check("account_token", true, "stored token found"),
                Err(e) => check("account_token", false, e.to_string()),
            });
        }
        Err(e) => checks.push(check("secret_store", false, e.to_string())),
    }

    let policy = PolicyEngine::new(ctx.cfg.clone()).snapshot()?;
    if let Decision::Deny(reason @ DenyReason::AccountBlocked { .. }) = policy.decide(&account, "")
    {
        checks.push(check("account_policy", false, reason.to_string()));
    }
    for action in actions.iter().map(|a| normalize_id(a)).filter(|a| !a.is_empty()) {
        let name = format!("policy:{action}");
        checks.push(match policy.decide(&account, &action) {
            Decision::Allow if policy.requires_approval(&action) => {
                check(name, true, "allowed; requires approval token")
            }
            Decision::Allow => check(name, true, "allowed"),
            Decision::Deny(reason) => check(name, false, reason.to_string()),
        });
    }

    let ready = checks.iter().all(|c| c["ok"] == Value::Bool(true));
    Ok(json!({
        "account": account,
        "ready": ready,
        "checks": checks,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::governance::{PolicyDocument, read_policy, write_policy};
    use crate::secrets::StoredToken;
    use crate::store::ConfigDir;

    fn ctx(dir: &tempfile::TempDir) -> Context {
        Context {
            cfg: ConfigDir::new(dir.path()),
            config: Config::default(),
            dry_run: false,
            audit_log: None,
        }
    }

    fn audit_lines(dir: &tempfile::TempDir) -> usize {
        std::fs::read_to_string(dir.path().join("audit.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[test]
    fn issues_token_for_approval_action() {
        let dir = tempfile::tempdir().unwrap();
        let out = approval_token(
            &ctx(&dir),
            "A@example.com",
            "calendar.delete",
            Duration::from_secs(600),
        )
        .unwrap();

        assert_eq!(out["issued"], true);
        assert_eq!(out["account"], "a@example.com");
        let token = out["token"].as_str().unwrap();
        assert!(dir.path().join("approvals").join(format!("{token}.json")).exists());
        assert_eq!(audit_lines(&dir), 1);
    }

    #[test]
    fn refuses_token_for_unrestricted_action() {
        let dir = tempfile::tempdir().unwrap();
        let err = approval_token(&ctx(&dir), "a@example.com", "gmail.send", Duration::from_secs(60))
            .unwrap_err();
        assert_eq!(err.code, "approval_not_required");
        assert_eq!(audit_lines(&dir), 0);
    }

    #[test]
    fn issuance_is_policy_checked() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        write_policy(
            &ctx.cfg,
            &PolicyDocument {
                allowed_actions: ["calendar.delete".to_string()].into(),
                ..PolicyDocument::default()
            },
        )
        .unwrap();

        let err = approval_token(&ctx, "a@example.com", "calendar.delete", Duration::from_secs(60))
            .unwrap_err();
        assert_eq!(err.exit, ExitCode::Permission);
        assert_eq!(err.code, "policy_denied");
    }

    #[test]
    fn dry_run_issues_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx(&dir);
        ctx.dry_run = true;

        let out =
            approval_token(&ctx, "a@example.com", "calendar.delete", Duration::from_secs(60)).unwrap();
        assert_eq!(out["dry_run"], true);
        assert!(!dir.path().join("approvals").exists());
        assert_eq!(audit_lines(&dir), 1);
    }

    #[test]
    fn credentials_are_stored_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);

        let err = credentials(&ctx, "id", "  ").unwrap_err();
        assert_eq!(err.code, "invalid_input");

        let out = credentials(&ctx, "client-id", "client-secret").unwrap();
        assert_eq!(out["stored"], true);
        assert!(!out.to_string().contains("client-secret"));
        assert_eq!(audit_lines(&dir), 1);

        let creds = config::read_credentials_with(&ctx.cfg, |_| None).unwrap();
        assert_eq!(creds.client_secret, "client-secret");
    }

    #[test]
    fn emergency_revoke_blocks_without_stored_token() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);

        let out = emergency_revoke(&ctx, "a@example.com").unwrap();
        assert_eq!(out["token_deleted"], false);
        let policy = read_policy(&ctx.cfg).unwrap();
        assert!(policy.blocked_accounts.contains("a@example.com"));
        assert_eq!(audit_lines(&dir), 1);

        let err = approval_token(&ctx, "a@example.com", "calendar.delete", Duration::from_secs(60))
            .unwrap_err();
        assert_eq!(err.exit, ExitCode::Permission);
    }

    #[test]
    fn remove_and_list_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        FileSecretStore::open(&ctx.cfg)
            .unwrap()
            .set_token(&StoredToken {
                email: "a@example.com".to_string(),
                services: vec!["gmail".to_string()],
                scopes: Vec::new(),
                created_at: None,
                refresh_token: "1//secret".to_string(),
            })
            .unwrap();

        let listed = list(&ctx).unwrap();
        assert_eq!(listed["accounts"][0]["email"], "a@example.com");
        assert!(!listed.to_string().contains("1//secret"));

        remove(&ctx, "a@example.com").unwrap();
        let err = remove(&ctx, "a@example.com").unwrap_err();
        assert_eq!(err.exit, ExitCode::NotFound);
    }

    #[test]
    fn preflight_reports_each_check() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        write_policy(
            &ctx.cfg,
            &PolicyDocument {
                allowed_actions: ["gmail.send".to_string()].into(),
                ..PolicyDocument::default()
            },
        )
        .unwrap();

        let out = preflight(
            &ctx,
            "a@example.com",
            &["gmail.send".to_string(), "calendar.create".to_string()],
        )
        .unwrap();
        assert_eq!(out["ready"], false);

        let checks = out["checks"].as_array().unwrap();
        let by_name = |name: &str| checks.iter().find(|c| c["name"] == name).unwrap().clone();
        assert_eq!(by_name("credentials")["ok"], false);
        assert_eq!(by_name("secret_store")["ok"], true);
        assert_eq!(by_name("account_token")["ok"], false);
        assert_eq!(by_name("policy:gmail.send")["ok"], true);
        assert_eq!(by_name("policy:calendar.create")["ok"], false);
    }
}
