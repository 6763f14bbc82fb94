//! Command registration.
//!
//! The whole tree is composed here, once, at startup. Each category lives in
//! its own module and contributes one group node.

pub mod devel;

use crate::tree::{CommandNode, CommandTree, RegistrationError};

/// Program name shown in paths, usage lines and help.
pub const PROGRAM: &str = "poseidonos-cli";

/// Build and check the command tree.
pub fn build_command_tree() -> Result<CommandTree, RegistrationError> {
    let root = CommandNode::group(PROGRAM, "Command-line interface for PoseidonOS.")
        .subcommand(devel::devel_commands());
    CommandTree::new(PROGRAM, root)
}
