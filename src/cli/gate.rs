// ABOUTME: `gate` command — run policy, approval, and rate-limit checks for an externally executed action.
// ABOUTME: On success the action is audited; the caller performs the real API call itself.

use std::time::Duration;

use clap::Args;
use serde_json::{Value, json};

use super::{Context, parse_duration};
use crate::api::ApiError;
use crate::governance::{ActionRequest, Outcome, RateLimitRule};
use crate::output::{CliError, ExitCode};

#[derive(Debug, Args)]
pub struct GateArgs {
    #[arg(short, long)]
    pub account: String,
    #[arg(long)]
    pub action: String,
    /// Resource the action touches (event id, document id, ...)
    #[arg(long, default_value = "")]
    pub target: String,
    #[arg(long)]
    pub approval_token: Option<String>,
    /// Override the configured limit for this action
    #[arg(long, requires = "rate_window")]
    pub rate_limit: Option<u32>,
    #[arg(long, value_parser = parse_duration, requires = "rate_limit")]
    pub rate_window: Option<Duration>,
}

pub fn run(ctx: &Context, args: GateArgs) -> Result<Value, CliError> {
    let rule = match (args.rate_limit, args.rate_window) {
        (Some(limit), Some(window)) => Some(RateLimitRule { limit, window }),
        _ => ctx.config.rate_limit_for(&args.action),
    };
    let req = ActionRequest::new(&args.account, &args.action)
        .target(args.target)
        .dry_run(ctx.dry_run)
        .approval_token(args.approval_token)
        .rate_limit(rule)
        .audit_log(ctx.audit_path().map(|p| p.to_path_buf()));
    if req.account.is_empty() || req.action.is_empty() {
        return Err(CliError::new(
            ExitCode::Error,
            "invalid_input",
            "--account and --action are required",
        ));
    }

    let outcome = ctx.gate().run(&req, || Ok::<_, ApiError>(()))?;
    let (dry_run, audit) = match outcome {
        Outcome::DryRun(audit) => (true, audit),
        Outcome::Done { audit, .. } => (false, audit),
    };
    Ok(json!({
        "allowed": true,
        "dry_run": dry_run,
        "account": req.account,
        "action": req.action,
        "audit_hash": audit.hash,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::auth;
    use crate::config::Config;
    use crate::store::ConfigDir;

    fn ctx(dir: &tempfile::TempDir) -> Context {
        Context {
            cfg: ConfigDir::new(dir.path()),
            config: Config::default(),
            dry_run: false,
            audit_log: None,
        }
    }

    fn args(action: &str, token: Option<String>) -> GateArgs {
        GateArgs {
            account: "a@example.com".to_string(),
            action: action.to_string(),
            target: "evt-1".to_string(),
            approval_token: token,
            rate_limit: None,
            rate_window: None,
        }
    }

    #[test]
    fn token_is_single_use_through_gate() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);

        let issued =
            auth::approval_token(&ctx, "a@example.com", "calendar.delete", Duration::from_secs(600))
                .unwrap();
        let token = issued["token"].as_str().unwrap().to_string();

        let out = run(&ctx, args("calendar.delete", Some(token.clone()))).unwrap();
        assert_eq!(out["allowed"], true);

        let err = run(&ctx, args("calendar.delete", Some(token))).unwrap_err();
        assert_eq!(err.exit, ExitCode::Permission);
        assert_eq!(err.code, "approval_token_used");
    }

    #[test]
    fn missing_token_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&ctx(&dir), args("docs.find_replace", None)).unwrap_err();
        assert_eq!(err.code, "approval_required");
    }

    #[test]
    fn explicit_rate_limit_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(&dir);
        let limited = || GateArgs {
            rate_limit: Some(1),
            rate_window: Some(Duration::from_secs(3600)),
            ..args("gmail.send", None)
        };

        run(&ctx, limited()).unwrap();
        let err = run(&ctx, limited()).unwrap_err();
        assert_eq!(err.code, "rate_limited");
        assert_eq!(err.exit, ExitCode::Permission);
    }
}
