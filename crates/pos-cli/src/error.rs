//! Dispatch errors.
//!
//! Every failure of a dispatch is a [`CliError`]. Each variant knows the
//! phase it came from and its exit code, and renders as
//! `[<phase>] <command path>: <reason>`.

use std::fmt;

use crate::confirm::AbortReason;
use crate::exit::CliExitCode;
use crate::invoker::{FailureReason, TimeoutCause};
use crate::validator::ValidationError;

/// Where in the pipeline a dispatch stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validation,
    Confirmation,
    Backend,
    Internal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Validation => "validation",
            Phase::Confirmation => "confirmation",
            Phase::Backend => "backend",
            Phase::Internal => "internal",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Missing or unknown subcommand. Carries the help text of the node.
    #[error("[validation] {command}: {message}")]
    Usage {
        command: String,
        message: String,
        help: Option<String>,
    },

    #[error("[validation] {command}: {source}")]
    Validation {
        command: String,
        #[source]
        source: ValidationError,
    },

    /// A handler rejected an argument value.
    #[error("[validation] {command}: {message}")]
    InvalidArgument { command: String, message: String },

    #[error("[confirmation] {command}: aborted by user ({reason}); nothing was sent")]
    Aborted { command: String, reason: AbortReason },

    #[error("[backend] {command}: {operation} failed: {reason}")]
    BackendFailure {
        command: String,
        operation: String,
        reason: FailureReason,
    },

    #[error(
        "[backend] {command}: {operation} outcome UNCONFIRMED ({cause}); \
         the operation may or may not have been applied, verify system state before retrying"
    )]
    BackendTimeout {
        command: String,
        operation: String,
        cause: TimeoutCause,
    },

    #[error("[internal] {0}")]
    Internal(String),
}

impl CliError {
    pub fn phase(&self) -> Phase {
        match self {
            CliError::Usage { .. } | CliError::Validation { .. } | CliError::InvalidArgument { .. } => {
                Phase::Validation
            }
            CliError::Aborted { .. } => Phase::Confirmation,
            CliError::BackendFailure { .. } | CliError::BackendTimeout { .. } => Phase::Backend,
            CliError::Internal(_) => Phase::Internal,
        }
    }

    pub fn exit_code(&self) -> CliExitCode {
        match self {
            CliError::Usage { .. } | CliError::InvalidArgument { .. } => CliExitCode::Usage,
            CliError::Validation { source, .. } => match source {
                ValidationError::ArgumentCount { .. } => CliExitCode::ArgumentCount,
                ValidationError::UnknownFlag { .. } => CliExitCode::UnknownFlag,
                ValidationError::MissingFlagValue { .. }
                | ValidationError::UnexpectedFlagValue { .. }
                | ValidationError::FlagConflict { .. } => CliExitCode::Usage,
            },
            CliError::Aborted { .. } => CliExitCode::Aborted,
            CliError::BackendFailure { .. } => CliExitCode::BackendFailure,
            CliError::BackendTimeout { .. } => CliExitCode::BackendTimeout,
            CliError::Internal(_) => CliExitCode::Internal,
        }
    }

    /// Help text to show along with the error, if any.
    pub fn help_text(&self) -> Option<&str> {
        match self {
            CliError::Usage { help, .. } => help.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validation_exit_codes() {
        let count = CliError::Validation {
            command: "poseidonos-cli devel resetmbr".into(),
            source: ValidationError::ArgumentCount {
                got: 1,
                want_min: 0,
                want_max: Some(0),
            },
        };
        assert_eq!(count.exit_code(), CliExitCode::ArgumentCount);
        assert_eq!(count.phase(), Phase::Validation);
        assert_eq!(
            count.to_string(),
            "[validation] poseidonos-cli devel resetmbr: expected exactly 0 arguments, got 1"
        );

        let flag = CliError::Validation {
            command: "c".into(),
            source: ValidationError::UnknownFlag { flag: "--yes".into() },
        };
        assert_eq!(flag.exit_code(), CliExitCode::UnknownFlag);

        let conflict = CliError::Validation {
            command: "c".into(),
            source: ValidationError::FlagConflict {
                first: "a".into(),
                second: "b".into(),
            },
        };
        assert_eq!(conflict.exit_code(), CliExitCode::Usage);
    }

    #[test]
    fn test_usage_carries_help() {
        let err = CliError::Usage {
            command: "poseidonos-cli devel".into(),
            message: "must specify a subcommand".into(),
            help: Some("Developer commands".into()),
        };
        assert_eq!(err.exit_code(), CliExitCode::Usage);
        assert_eq!(err.help_text(), Some("Developer commands"));
    }

    #[test]
    fn test_abort_names_phase() {
        let err = CliError::Aborted {
            command: "poseidonos-cli devel resetmbr".into(),
            reason: AbortReason::Declined { input: "yes".into() },
        };
        assert_eq!(err.phase(), Phase::Confirmation);
        assert_eq!(err.exit_code(), CliExitCode::Aborted);
        let text = err.to_string();
        assert!(text.starts_with("[confirmation] poseidonos-cli devel resetmbr"));
        assert!(text.contains("\"yes\""));
    }

    #[test]
    fn test_backend_outcomes_distinct() {
        let failure = CliError::BackendFailure {
            command: "c".into(),
            operation: "RESETMBR".into(),
            reason: FailureReason::Rejected {
                code: 2,
                description: "CLI SERVER IS NOW PROCESSING A COMMAND".into(),
            },
        };
        let timeout = CliError::BackendTimeout {
            command: "c".into(),
            operation: "RESETMBR".into(),
            cause: TimeoutCause::NoReply(Duration::from_secs(30)),
        };
        assert_eq!(failure.exit_code(), CliExitCode::BackendFailure);
        assert_eq!(timeout.exit_code(), CliExitCode::BackendTimeout);
        assert!(failure.to_string().contains("CLI SERVER IS NOW PROCESSING A COMMAND"));
        assert!(timeout.to_string().contains("UNCONFIRMED"));
        assert!(!failure.to_string().contains("UNCONFIRMED"));
    }
}
