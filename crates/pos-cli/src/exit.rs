//! Process exit codes.
//!
//! The numeric values are a public contract: calling scripts branch on them
//! to tell "nothing happened" from "definite failure" from "unknown outcome".

use std::fmt;

/// Stable exit codes of the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CliExitCode {
    /// The operation completed.
    Success = 0,
    /// Startup, configuration or output failure. No request was sent.
    Internal = 1,
    /// Missing or unknown subcommand, malformed or conflicting flags, illegal value.
    Usage = 2,
    /// Positional argument count outside the command's bounds.
    ArgumentCount = 3,
    /// A flag the command does not declare.
    UnknownFlag = 4,
    /// The user declined or interrupted the confirmation prompt.
    Aborted = 5,
    /// The control plane did not apply the operation.
    BackendFailure = 6,
    /// The outcome of the operation is unknown.
    BackendTimeout = 7,
}

impl CliExitCode {
    /// Every code, in numeric order.
    pub const ALL: [CliExitCode; 8] = [
        CliExitCode::Success,
        CliExitCode::Internal,
        CliExitCode::Usage,
        CliExitCode::ArgumentCount,
        CliExitCode::UnknownFlag,
        CliExitCode::Aborted,
        CliExitCode::BackendFailure,
        CliExitCode::BackendTimeout,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self == CliExitCode::Success
    }

    /// One-line meaning, used in the root help text.
    pub fn describe(self) -> &'static str {
        match self {
            CliExitCode::Success => "success",
            CliExitCode::Internal => "internal error, nothing sent",
            CliExitCode::Usage => "usage error, nothing sent",
            CliExitCode::ArgumentCount => "wrong number of arguments, nothing sent",
            CliExitCode::UnknownFlag => "unknown flag, nothing sent",
            CliExitCode::Aborted => "aborted at confirmation, nothing sent",
            CliExitCode::BackendFailure => "control plane did not apply the operation",
            CliExitCode::BackendTimeout => "outcome unknown, verify system state",
        }
    }
}

impl fmt::Display for CliExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<CliExitCode> for std::process::ExitCode {
    fn from(code: CliExitCode) -> Self {
        std::process::ExitCode::from(code.code())
    }
}
