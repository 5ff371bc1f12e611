// ABOUTME: Machine-readable CLI output — pretty JSON on stdout, JSON error payloads on stderr.
// ABOUTME: Also defines the process exit codes callers branch on.

use std::io::Write;

use serde::Serialize;

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Ok = 0,
    Error = 1,
    /// Credentials or stored account token missing.
    Auth = 2,
    NotFound = 3,
    /// Policy denial, approval token failure, or rate limit.
    Permission = 4,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

/// A failure already shaped for the CLI: exit code, error code, message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    pub exit: ExitCode,
    pub code: String,
    pub message: String,
}

impl CliError {
    pub fn new(exit: ExitCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            exit,
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

impl From<crate::error::GovernanceError> for CliError {
    fn from(err: crate::error::GovernanceError) -> Self {
        Self::new(err.exit_code(), err.code(), err.to_string())
    }
}

impl From<crate::api::ApiError> for CliError {
    fn from(err: crate::api::ApiError) -> Self {
        Self::new(err.exit_code(), err.code(), err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorPayload<'a> {
    error: &'a str,
    code: &'a str,
}

/// Write `value` as indented JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(mut w: W, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut w, value)?;
    writeln!(w)?;
    Ok(())
}

/// Write the `{"error": ..., "code": ...}` payload for `err`.
pub fn write_error<W: Write>(w: W, err: &CliError) -> anyhow::Result<()> {
    write_json(
        w,
        &ErrorPayload {
            error: &err.message,
            code: &err.code,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GovernanceError, TokenError};

    #[test]
    fn error_payload_shape() {
        let mut buf = Vec::new();
        let err = CliError::from(GovernanceError::from(TokenError::Expired));
        write_error(&mut buf, &err).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["error"], "approval token expired");
        assert_eq!(parsed["code"], "approval_token_expired");
        assert_eq!(err.exit, ExitCode::Permission);
    }

    #[test]
    fn json_is_not_html_escaped() {
        let mut buf = Vec::new();
        write_json(&mut buf, &serde_json::json!({"q": "a<b>&c"})).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("a<b>&c"));
        assert!(text.ends_with('\n'));
    }
}
