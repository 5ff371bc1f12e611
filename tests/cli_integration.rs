// ABOUTME: Integration tests for the command-line surface.
// ABOUTME: Parses real argument vectors and runs them against a temporary config tree.

use std::path::Path;

use clap::Parser;
use gog_lite::cli::{self, Cli};
use gog_lite::output::{CliError, ExitCode};
use serde_json::Value;

fn run(config_dir: &Path, args: &[&str]) -> Result<Value, CliError> {
    let dir = config_dir.to_str().unwrap();
    let mut argv = vec!["gog-lite", "--config-dir", dir];
    argv.extend_from_slice(args);
    cli::run(Cli::try_parse_from(argv).unwrap())
}

/// Approval token issued on the command line gates exactly one `gate` call.
#[test]
fn approval_token_then_gate() {
    let dir = tempfile::tempdir().unwrap();
    let issued = run(
        dir.path(),
        &[
            "auth",
            "approval-token",
            "--account",
            "a@example.com",
            "--action",
            "calendar.delete",
            "--ttl",
            "10m",
        ],
    )
    .unwrap();
    let token = issued["token"].as_str().unwrap();

    let gate_args = [
        "gate",
        "-a",
        "a@example.com",
        "--action",
        "calendar.delete",
        "--target",
        "evt-1",
        "--approval-token",
        token,
    ];
    run(dir.path(), &gate_args).unwrap();
    let err = run(dir.path(), &gate_args).unwrap_err();
    assert_eq!(err.exit, ExitCode::Permission);
    assert_eq!(err.code, "approval_token_used");

    let verified = run(dir.path(), &["audit", "verify"]).unwrap();
    assert_eq!(verified["valid"], true);
    assert_eq!(verified["entries"], 2);
}

/// `policy set` then `policy check` round-trips through policy.json.
#[test]
fn policy_set_and_check() {
    let dir = tempfile::tempdir().unwrap();
    run(
        dir.path(),
        &["policy", "set", "--allow", "gmail.send,calendar.list"],
    )
    .unwrap();

    let allowed = run(
        dir.path(),
        &["policy", "check", "-a", "x@example.com", "--action", "gmail.send"],
    )
    .unwrap();
    assert_eq!(allowed["allowed"], true);

    let denied = run(
        dir.path(),
        &["policy", "check", "-a", "x@example.com", "--action", "calendar.create"],
    )
    .unwrap();
    assert_eq!(denied["allowed"], false);
}

/// Emergency revoke blocks the account for every later governed call.
#[test]
fn emergency_revoke_blocks_gate() {
    let dir = tempfile::tempdir().unwrap();
    run(
        dir.path(),
        &["auth", "emergency-revoke", "--account", "a@example.com"],
    )
    .unwrap();

    let err = run(
        dir.path(),
        &["gate", "-a", "a@example.com", "--action", "gmail.send"],
    )
    .unwrap_err();
    assert_eq!(err.exit, ExitCode::Permission);
    assert_eq!(err.code, "policy_denied");
}

/// An audit log outside the config tree is refused and nothing is written.
#[test]
fn audit_log_outside_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let elsewhere = tempfile::tempdir().unwrap();
    let log = elsewhere.path().join("audit.log");

    let err = run(
        dir.path(),
        &[
            "gate",
            "-a",
            "a@example.com",
            "--action",
            "gmail.send",
            "--audit-log",
            log.to_str().unwrap(),
        ],
    )
    .unwrap_err();
    assert_eq!(err.code, "invalid_audit_log_path");
    assert!(!log.exists());
}

/// Rate limits from config.toml apply to `gate`.
#[test]
fn configured_rate_limit_applies() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[rate_limits.\"sheets.get\"]\nlimit = 1\nwindow_seconds = 60\n",
    )
    .unwrap();

    let args = ["gate", "-a", "a@example.com", "--action", "sheets.get"];
    run(dir.path(), &args).unwrap();
    let err = run(dir.path(), &args).unwrap_err();
    assert_eq!(err.code, "rate_limited");
}

/// Bad durations are rejected by the parser.
#[test]
fn invalid_ttl_is_a_parse_error() {
    let parsed = Cli::try_parse_from([
        "gog-lite",
        "auth",
        "approval-token",
        "-a",
        "a@example.com",
        "--action",
        "calendar.delete",
        "--ttl",
        "ten minutes",
    ]);
    assert!(parsed.is_err());
}

/// A TTL or window too large for the calendar is an input error, not a crash,
/// and leaves no state behind.
#[test]
fn out_of_range_durations_are_input_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = run(
        dir.path(),
        &[
            "auth",
            "approval-token",
            "-a",
            "a@example.com",
            "--action",
            "calendar.delete",
            "--ttl",
            "9999999999h",
        ],
    )
    .unwrap_err();
    assert_eq!(err.code, "invalid_input");
    assert!(!dir.path().join("approvals").exists());

    let err = run(
        dir.path(),
        &[
            "gate",
            "-a",
            "a@example.com",
            "--action",
            "gmail.send",
            "--rate-limit",
            "1",
            "--rate-window",
            "9999999999h",
        ],
    )
    .unwrap_err();
    assert_eq!(err.code, "invalid_input");
    assert!(!dir.path().join("ratelimit").exists());
}
