//! `devel`: commands for PoseidonOS developers.

use crate::invoker::{OperationDescriptor, SuccessDetails};
use crate::output::{kv_row, table_with_header, OutputTable};
use crate::tree::{CommandHandler, CommandNode, InvalidArgument};
use crate::validator::InvocationRequest;

const DEVEL_LONG_ABOUT: &str = "\
Commands for PoseidonOS developers. This command category will affect
the system seriously. Therefore, this command category must be carefully
used by developers.

Syntax:
  poseidonos-cli devel [resetmbr | stop-rebuilding | list-wbt]";

pub fn devel_commands() -> CommandNode {
    CommandNode::group("devel", "Commands for PoseidonOS developers.")
        .long_about(DEVEL_LONG_ABOUT)
        .subcommand(
            CommandNode::command("resetmbr", "Reset MBR information of PoseidonOS.", ResetMbr)
                .long_about(
                    "Reset the master boot record and every array boot record on all\n\
                     devices. All array definitions are lost.\n\n\
                     Syntax:\n  poseidonos-cli devel resetmbr [--force]",
                )
                .destructive("erases the MBR and all array boot records on every device; arrays cannot be mounted afterwards"),
        )
        .subcommand(
            CommandNode::command(
                "stop-rebuilding",
                "Stop rebuilding of an array.",
                StopRebuilding,
            )
            .args(1, Some(1))
            .usage("<array-name>")
            .destructive("stops the running rebuild; the array stays degraded until a new rebuild completes"),
        )
        .subcommand(
            CommandNode::command("list-wbt", "List available white-box tests.", ListWbt),
        )
}

struct ResetMbr;

impl CommandHandler for ResetMbr {
    fn prepare(&self, _request: &InvocationRequest) -> Result<OperationDescriptor, InvalidArgument> {
        Ok(OperationDescriptor::new("RESETMBR", "all devices"))
    }
}

struct StopRebuilding;

impl CommandHandler for StopRebuilding {
    fn prepare(&self, request: &InvocationRequest) -> Result<OperationDescriptor, InvalidArgument> {
        let name = request.arg(0).unwrap_or_default();
        if name.is_empty() {
            return Err(InvalidArgument("array name must not be empty".to_string()));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(InvalidArgument(format!(
                "array name {:?} must not contain whitespace",
                name
            )));
        }
        Ok(OperationDescriptor::new("STOPREBUILDING", format!("array {}", name)).param("name", name))
    }
}

struct ListWbt;

impl CommandHandler for ListWbt {
    fn prepare(&self, _request: &InvocationRequest) -> Result<OperationDescriptor, InvalidArgument> {
        Ok(OperationDescriptor::new("LISTWBT", "white-box tests"))
    }

    /// One row per test when the server sends `data.testlist`.
    fn render(&self, _operation: &OperationDescriptor, details: &SuccessDetails) -> OutputTable {
        let tests = details
            .data
            .as_ref()
            .and_then(|d| d.get("testlist"))
            .and_then(|t| t.as_array());

        let Some(tests) = tests else {
            return vec![kv_row("Result", &details.description)];
        };

        let mut table = table_with_header(&["Name"]);
        for test in tests {
            let name = test
                .get("testname")
                .and_then(|n| n.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| test.to_string());
            table.push(vec![name]);
        }
        table
    }
}
