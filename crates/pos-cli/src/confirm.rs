//! Confirmation gate for destructive commands.
//!
//! A destructive operation proceeds only on the `--force` flag or on the
//! exact confirmation token typed at the prompt. Everything else, including
//! empty input, end of input, a read error or an interrupt, aborts. The gate
//! decides once; there is no re-prompt.

use std::fmt;
use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use crate::invoker::OperationDescriptor;

/// The token that confirms a destructive operation. Matched exactly.
pub const CONFIRMATION_TOKEN: &str = "y";

/// How a destructive operation was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmedBy {
    OverrideFlag,
    Token,
}

/// Why the gate refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Input did not match the token.
    Declined { input: String },
    /// An empty line.
    EmptyInput,
    /// Input closed before a line was read.
    EndOfInput,
    /// Interrupt signal while waiting for input.
    Interrupted,
    /// Prompt or input I/O failed.
    InputError(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Declined { input } => write!(f, "input {:?} is not the confirmation token", input),
            AbortReason::EmptyInput => f.write_str("empty input"),
            AbortReason::EndOfInput => f.write_str("end of input"),
            AbortReason::Interrupted => f.write_str("interrupted"),
            AbortReason::InputError(e) => write!(f, "cannot read confirmation: {}", e),
        }
    }
}

/// Per-invocation confirmation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationState {
    Unconfirmed,
    Confirmed(ConfirmedBy),
    Aborted(AbortReason),
}

/// Proof handed to the invoker that an operation may be sent.
///
/// Only the gate can produce a confirmed clearance; the dispatcher can
/// produce one for non-destructive nodes. Neither constructor is public.
#[derive(Debug)]
pub struct Clearance {
    confirmed_by: Option<ConfirmedBy>,
}

impl Clearance {
    pub(crate) fn not_required() -> Self {
        Self { confirmed_by: None }
    }

    fn confirmed(by: ConfirmedBy) -> Self {
        Self {
            confirmed_by: Some(by),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_by.is_some()
    }

    pub fn confirmed_by(&self) -> Option<ConfirmedBy> {
        self.confirmed_by
    }

    #[cfg(test)]
    pub(crate) fn confirmed_for_test() -> Self {
        Self::confirmed(ConfirmedBy::Token)
    }
}

/// Source of the typed confirmation.
#[async_trait]
pub trait ConfirmationInput: Send {
    /// Read one line, terminator included. `Ok(None)` is end of input; an
    /// error of kind `Interrupted` means the user sent an interrupt.
    async fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Reads the confirmation from stdin, racing it against Ctrl-C.
///
/// The read runs on a detached thread so an abandoned read does not hold
/// up runtime shutdown. Listening for Ctrl-C replaces the default SIGINT
/// action for the rest of the process, so once a request is on the wire
/// an interrupt no longer kills the CLI; the invoker waits for the reply
/// or the request timeout and reports the outcome.
#[derive(Debug, Default)]
pub struct StdinInput;

#[async_trait]
impl ConfirmationInput for StdinInput {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let result = io::stdin()
                .lock()
                .read_line(&mut line)
                .map(|n| (n > 0).then_some(line));
            let _ = tx.send(result);
        });

        tokio::select! {
            result = rx => result.unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::Other, "stdin reader exited"))
            }),
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted")),
                Err(e) => Err(e),
            },
        }
    }
}

/// What the prompt shows.
#[derive(Debug)]
pub struct ConfirmationRequest<'a> {
    pub command: &'a str,
    pub description: &'a str,
    pub impact: &'a str,
    pub operation: &'a OperationDescriptor,
}

/// Decides whether a destructive operation may proceed.
#[derive(Debug, Clone)]
pub struct ConfirmationGate {
    token: String,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(CONFIRMATION_TOKEN)
    }
}

impl ConfirmationGate {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Run the gate once.
    ///
    /// The operation summary goes to `prompt` either way. With
    /// `override_flag` nothing is read; otherwise one line is read from
    /// `input`.
    pub async fn request(
        &self,
        request: &ConfirmationRequest<'_>,
        override_flag: bool,
        input: &mut dyn ConfirmationInput,
        prompt: &mut dyn Write,
    ) -> Result<Clearance, AbortReason> {
        let state = if override_flag {
            tracing::warn!(
                command = request.command,
                operation = request.operation.name(),
                "confirmation skipped by --force"
            );
            let shown = Self::show_summary(request, prompt)
                .and_then(|()| writeln!(prompt, "--force given: proceeding without confirmation."));
            if let Err(e) = shown {
                tracing::warn!(command = request.command, error = %e, "cannot show operation summary");
            }
            ConfirmationState::Confirmed(ConfirmedBy::OverrideFlag)
        } else {
            match self.show_prompt(request, prompt) {
                Ok(()) => self.evaluate(input.read_line().await),
                Err(e) => ConfirmationState::Aborted(AbortReason::InputError(e.to_string())),
            }
        };

        match state {
            ConfirmationState::Confirmed(by) => {
                tracing::info!(command = request.command, ?by, "destructive operation confirmed");
                Ok(Clearance::confirmed(by))
            }
            ConfirmationState::Aborted(reason) => {
                tracing::warn!(command = request.command, %reason, "destructive operation aborted");
                let _ = writeln!(prompt, "Aborted: {}.", reason);
                Err(reason)
            }
            ConfirmationState::Unconfirmed => {
                Err(AbortReason::InputError("no confirmation decision".to_string()))
            }
        }
    }

    /// Map one read result to a terminal state. Only the line terminator is
    /// stripped before the exact comparison.
    pub fn evaluate(&self, line: io::Result<Option<String>>) -> ConfirmationState {
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => return ConfirmationState::Aborted(AbortReason::EndOfInput),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                return ConfirmationState::Aborted(AbortReason::Interrupted)
            }
            Err(e) => return ConfirmationState::Aborted(AbortReason::InputError(e.to_string())),
        };

        let answer = line
            .strip_suffix('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .unwrap_or(&line);

        if answer.is_empty() {
            ConfirmationState::Aborted(AbortReason::EmptyInput)
        } else if answer == self.token {
            ConfirmationState::Confirmed(ConfirmedBy::Token)
        } else {
            ConfirmationState::Aborted(AbortReason::Declined {
                input: answer.to_string(),
            })
        }
    }

    /// What the operation is and what it costs, shown on both paths.
    fn show_summary(request: &ConfirmationRequest<'_>, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "WARNING: '{}' is a destructive operation.", request.command)?;
        writeln!(out, "  {}", request.description)?;
        writeln!(out, "  Operation: {}", request.operation.name())?;
        writeln!(out, "  Target:    {}", request.operation.target())?;
        writeln!(out, "  Impact:    {}", request.impact)
    }

    fn show_prompt(&self, request: &ConfirmationRequest<'_>, out: &mut dyn Write) -> io::Result<()> {
        Self::show_summary(request, out)?;
        write!(
            out,
            "Type '{}' to proceed; any other input aborts: ",
            self.token
        )?;
        out.flush()
    }
}

/// Scripted input for tests.
#[cfg(test)]
pub(crate) struct ScriptedInput {
    lines: std::collections::VecDeque<io::Result<Option<String>>>,
    pub reads: usize,
}

#[cfg(test)]
impl ScriptedInput {
    pub(crate) fn lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| Ok(Some(l.to_string()))).collect(),
            reads: 0,
        }
    }

    pub(crate) fn eof() -> Self {
        Self {
            lines: std::iter::once(Ok(None)).collect(),
            reads: 0,
        }
    }

    pub(crate) fn interrupted() -> Self {
        Self {
            lines: std::iter::once(Err(io::Error::new(io::ErrorKind::Interrupted, "^C"))).collect(),
            reads: 0,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ConfirmationInput for ScriptedInput {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        self.reads += 1;
        self.lines.pop_front().unwrap_or(Ok(None))
    }
}
