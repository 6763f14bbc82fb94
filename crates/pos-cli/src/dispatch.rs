//! Drives one invocation through the pipeline.
//!
//! resolve → validate → prepare → (confirm, destructive only) → invoke → render.
//! Any step may end the run; later steps never run after an earlier failure.

use std::io::Write;

use pos_net::Socket;

use crate::confirm::{Clearance, ConfirmationGate, ConfirmationInput, ConfirmationRequest};
use crate::error::CliError;
use crate::exit::CliExitCode;
use crate::invoker::{BackendInvoker, BackendOperationResult};
use crate::output::{OutputTable, Printer};
use crate::tree::{CommandTree, Resolution, FORCE_FLAG};
use crate::validator::{ArgumentValidator, ValidationError};

/// Whether to execute or only show the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    #[default]
    Execute,
    /// Validate and print the request that would be sent; send nothing.
    PrintRequest,
}

/// A dispatch that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Completed { command: String, table: OutputTable },
    Help(String),
    RequestPreview(String),
}

pub struct CommandDispatcher<'a, S: Socket> {
    tree: &'a CommandTree,
    invoker: &'a BackendInvoker<S>,
    gate: ConfirmationGate,
    mode: DispatchMode,
}

impl<'a, S: Socket> CommandDispatcher<'a, S> {
    pub fn new(tree: &'a CommandTree, invoker: &'a BackendInvoker<S>) -> Self {
        Self {
            tree,
            invoker,
            gate: ConfirmationGate::default(),
            mode: DispatchMode::Execute,
        }
    }

    pub fn with_gate(mut self, gate: ConfirmationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Run `argv` (words after the program name) to an outcome.
    ///
    /// The prompt for destructive commands goes to `prompt`; the answer is
    /// read from `input`.
    pub async fn dispatch(
        &self,
        argv: &[String],
        input: &mut dyn ConfirmationInput,
        prompt: &mut dyn Write,
    ) -> Result<DispatchOutcome, CliError> {
        let resolution = self.tree.resolve(argv);
        let node = resolution.node;
        let command = resolution.display_path();
        tracing::debug!(command = %command, remaining = resolution.rest.len(), "resolved command");

        let Some(handler) = node.handler() else {
            return self.dispatch_group(&resolution, command);
        };

        let request = ArgumentValidator::validate(node, resolution.rest)
            .map_err(|source| self.validation_error(&command, source))?;
        if request.wants_help() {
            return Ok(DispatchOutcome::Help(self.help_for(&resolution)));
        }

        let mut operation = handler.prepare(&request).map_err(|e| {
            tracing::debug!(command = %command, error = %e, "argument rejected");
            CliError::InvalidArgument {
                command: command.clone(),
                message: e.0,
            }
        })?;
        operation.set_destructive(node.is_destructive());

        if self.mode == DispatchMode::PrintRequest {
            let preview = operation
                .to_request()
                .to_pretty_json()
                .map_err(|e| CliError::Internal(format!("cannot render request: {}", e)))?;
            return Ok(DispatchOutcome::RequestPreview(preview));
        }

        let clearance = match node.impact() {
            Some(impact) => {
                let confirmation = ConfirmationRequest {
                    command: &command,
                    description: node.about(),
                    impact,
                    operation: &operation,
                };
                self.gate
                    .request(&confirmation, request.has_flag(FORCE_FLAG), input, prompt)
                    .await
                    .map_err(|reason| CliError::Aborted {
                        command: command.clone(),
                        reason,
                    })?
            }
            None => Clearance::not_required(),
        };

        match self.invoker.invoke(&operation, &clearance).await {
            BackendOperationResult::Success(details) => Ok(DispatchOutcome::Completed {
                table: handler.render(&operation, &details),
                command,
            }),
            BackendOperationResult::Failure(reason) => Err(CliError::BackendFailure {
                command,
                operation: operation.name().to_string(),
                reason,
            }),
            BackendOperationResult::Timeout(cause) => Err(CliError::BackendTimeout {
                command,
                operation: operation.name().to_string(),
                cause,
            }),
        }
    }

    /// A node with subcommands and no handler of its own.
    fn dispatch_group(&self, resolution: &Resolution<'_, '_>, command: String) -> Result<DispatchOutcome, CliError> {
        let request = ArgumentValidator::parse(resolution.node, resolution.rest)
            .map_err(|source| self.validation_error(&command, source))?;
        if request.wants_help() {
            return Ok(DispatchOutcome::Help(self.help_for(resolution)));
        }

        let message = match request.arg(0) {
            None => "must specify a subcommand".to_string(),
            Some(word) => format!("unknown subcommand '{}'", word),
        };
        tracing::debug!(command = %command, %message, "no executable command");
        Err(CliError::Usage {
            command,
            message,
            help: Some(self.help_for(resolution)),
        })
    }

    fn validation_error(&self, command: &str, source: ValidationError) -> CliError {
        tracing::debug!(command, error = %source, "validation failed");
        CliError::Validation {
            command: command.to_string(),
            source,
        }
    }

    fn help_for(&self, resolution: &Resolution<'_, '_>) -> String {
        if resolution.path.is_empty() {
            self.tree.root_help()
        } else {
            resolution.node.help_text(&resolution.display_path())
        }
    }

    /// Dispatch, print the outcome and return the exit code.
    ///
    /// The exit code reflects the dispatch; a failure to write the output
    /// afterwards is logged.
    pub async fn run<W: Write, E: Write>(
        &self,
        argv: &[String],
        input: &mut dyn ConfirmationInput,
        prompt: &mut dyn Write,
        printer: &mut Printer<W, E>,
    ) -> CliExitCode {
        let (printed, code) = match self.dispatch(argv, input, prompt).await {
            Ok(DispatchOutcome::Completed { table, .. }) => (printer.print_table(&table), CliExitCode::Success),
            Ok(DispatchOutcome::Help(text)) | Ok(DispatchOutcome::RequestPreview(text)) => {
                (printer.print_raw(&text), CliExitCode::Success)
            }
            Err(err) => {
                let mut printed = printer.print_error(&err.to_string());
                if printed.is_ok() {
                    if let Some(help) = err.help_text() {
                        printed = printer.print_diagnostic(&format!("\n{}", help));
                    }
                }
                (printed, err.exit_code())
            }
        };
        if let Err(e) = printed {
            tracing::error!(error = %e, "cannot write output");
        }
        code
    }
}
