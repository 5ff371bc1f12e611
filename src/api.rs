// ABOUTME: Error contract expected from Google API collaborators.
// ABOUTME: Distinguishes not-found and forbidden from generic failures so the CLI can pick exit codes.

use thiserror::Error;

use crate::output::ExitCode;

/// Failure reported by an API client performing the real Workspace call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::NotFound(_) => ExitCode::NotFound,
            Self::Forbidden(_) => ExitCode::Permission,
            Self::Other(_) => ExitCode::Error,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "permission_denied",
            Self::Other(_) => "api_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_and_error_codes() {
        let missing = ApiError::NotFound("event evt-1".to_string());
        assert_eq!(missing.exit_code(), ExitCode::NotFound);
        assert_eq!(missing.code(), "not_found");

        let forbidden = ApiError::Forbidden("insufficient scope".to_string());
        assert_eq!(forbidden.exit_code(), ExitCode::Permission);
        assert_eq!(forbidden.code(), "permission_denied");

        let other = ApiError::from(anyhow::anyhow!("HTTP 500: boom"));
        assert_eq!(other.exit_code(), ExitCode::Error);
        assert_eq!(other.to_string(), "HTTP 500: boom");
    }
}
