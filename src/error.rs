//! Error types for dayplan
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown instance, invalid config)
//! - 3: Blocked by policy (rejected drag placement)
//! - 4: Operation failed (IO, parse, lock contention)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the dayplan CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const POLICY_BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for dayplan operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Vault not found: {0}")]
    VaultNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    // Policy blocks (exit code 3)
    #[error("Move rejected: {0}")]
    MoveRejected(String),

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::VaultNotFound(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::TaskNotFound(_)
            | Error::InstanceNotFound(_) => exit_codes::USER_ERROR,

            // Policy blocks
            Error::MoveRejected(_) => exit_codes::POLICY_BLOCKED,

            // Operation failures
            Error::Io(_)
            | Error::Json(_)
            | Error::Yaml(_)
            | Error::TomlParse(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }
}

/// Result type alias for dayplan operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_group_by_kind() {
        assert_eq!(
            Error::InvalidArgument("x".into()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(
            Error::InstanceNotFound("x".into()).exit_code(),
            exit_codes::USER_ERROR
        );
        assert_eq!(
            Error::MoveRejected("x".into()).exit_code(),
            exit_codes::POLICY_BLOCKED
        );
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.exit_code(), exit_codes::OPERATION_FAILED);
        assert_eq!(
            Error::LockFailed(PathBuf::from("a.lock")).exit_code(),
            exit_codes::OPERATION_FAILED
        );
    }
}
