//! Error types for wsctl.
//!
//! User-actionable failures and environment failures map to different exit
//! codes so that neither collides with the codes relayed from child tools
//! more often than necessary.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for errors the user can fix (bad name, missing workspace, ...).
pub const EXIT_USER_ACTIONABLE: i32 = 2;

/// Exit code for environment and service failures.
pub const EXIT_SYSTEM: i32 = 3;

/// Failures reported by the workspace backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("There is no workspace bound to the current directory. Run `wsctl workspace set --id=<id>` first.")]
    NoWorkspaceBound,

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Invalid resolve options: {0}")]
    ResolveOptionsInvalid(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Application default credentials ({actual}) do not match the current user ({expected}). Run `gcloud auth application-default login`.")]
    CredentialMismatch { expected: String, actual: String },

    #[error("Failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("Remote request failed: {0}")]
    RemoteFetch(#[from] FetchError),

    #[error("Failed to persist workspace context to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn launch(program: &str, reason: impl ToString) -> Self {
        Error::Launch {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the user can fix this by changing input or local state
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Error::NoWorkspaceBound
                | Error::ResourceNotFound(_)
                | Error::ResolveOptionsInvalid(_)
                | Error::InvalidResource(_)
                | Error::CredentialMismatch { .. }
        )
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_user_actionable() {
            EXIT_USER_ACTIONABLE
        } else {
            EXIT_SYSTEM
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_class() {
        assert_eq!(Error::NoWorkspaceBound.exit_code(), EXIT_USER_ACTIONABLE);
        assert_eq!(
            Error::ResolveOptionsInvalid("x".into()).exit_code(),
            EXIT_USER_ACTIONABLE
        );
        assert_eq!(Error::launch("docker", "not found").exit_code(), EXIT_SYSTEM);
        assert_eq!(
            Error::from(FetchError::Unavailable("503".into())).exit_code(),
            EXIT_SYSTEM
        );
    }
}
