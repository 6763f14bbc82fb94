//! Guarded command dispatch for the PoseidonOS admin CLI.
//!
//! An invocation flows through:
//!
//! 1. **[`tree`]** -- resolve the leading words to a [`CommandNode`].
//! 2. **[`validator`]** -- check argument counts and flags ([`ArgumentValidator`]).
//! 3. **[`confirm`]** -- destructive nodes only: [`ConfirmationGate`] asks for the
//!    override flag or the exact confirmation token.
//! 4. **[`invoker`]** -- [`BackendInvoker`] sends the operation to the control
//!    plane and classifies the outcome as success, failure or timeout.
//! 5. **[`dispatch`]** -- [`CommandDispatcher`] drives the steps and maps the
//!    result to a [`CliExitCode`].
//!
//! The command tree itself is composed once in [`commands::build_command_tree`].
//!
//! Supporting modules: [`config`] (options and the TOML file), [`output`]
//! (table/JSON printing), [`error`] and [`exit`] (error taxonomy and exit codes),
//! [`retry`] (back-off for read-only requests), [`timing`] (`--profile`).

pub mod commands;
pub mod config;
pub mod confirm;
pub mod dispatch;
pub mod error;
pub mod exit;
pub mod invoker;
pub mod output;
pub mod retry;
pub mod timing;
pub mod tree;
pub mod validator;

#[cfg(test)]
pub(crate) mod mock;

pub use commands::build_command_tree;
pub use config::{CliConfig, ConnectionOptions};
pub use confirm::{Clearance, ConfirmationGate, ConfirmationInput, StdinInput};
pub use dispatch::{CommandDispatcher, DispatchMode, DispatchOutcome};
pub use error::{CliError, Phase};
pub use exit::CliExitCode;
pub use invoker::{BackendInvoker, BackendOperationResult, OperationDescriptor};
pub use output::{OutputFormat, OutputTable, Printer};
pub use tree::{CommandHandler, CommandNode, CommandTree};
pub use validator::{ArgumentValidator, InvocationRequest};
