//! The static command tree.
//!
//! Nodes are assembled once by a composition function, checked by
//! [`CommandTree::new`], and only read afterwards. Sibling names are unique,
//! so resolving a word sequence is a plain walk with no ambiguity.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::exit::CliExitCode;
use crate::invoker::{OperationDescriptor, SuccessDetails};
use crate::output::{kv_row, OutputTable};
use crate::validator::InvocationRequest;

/// Long name of the built-in help switch, accepted by every node.
pub const HELP_FLAG: &str = "help";

/// Long name of the override switch declared by every destructive node.
pub const FORCE_FLAG: &str = "force";

/// A flag a node accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSpec {
    pub name: &'static str,
    pub short: Option<char>,
    pub takes_value: bool,
    pub help: &'static str,
}

impl FlagSpec {
    /// A boolean switch (`--name`).
    pub const fn switch(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            short: None,
            takes_value: false,
            help,
        }
    }

    /// A flag carrying a value (`--name value` or `--name=value`).
    pub const fn value(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            short: None,
            takes_value: true,
            help,
        }
    }

    pub const fn short(mut self, c: char) -> Self {
        self.short = Some(c);
        self
    }
}

const HELP_SPEC: FlagSpec = FlagSpec::switch(HELP_FLAG, "Print help for this command").short('h');
const FORCE_SPEC: FlagSpec = FlagSpec::switch(
    FORCE_FLAG,
    "Skip the interactive confirmation (for scripts)",
);

/// Value-legality failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidArgument(pub String);

/// The per-command logic behind a node.
///
/// Handlers never talk to the backend themselves; they describe the operation
/// and render its result. The dispatcher owns validation, confirmation and
/// the backend call.
pub trait CommandHandler: Send + Sync {
    /// Turn a structurally valid invocation into the backend operation.
    fn prepare(&self, request: &InvocationRequest) -> Result<OperationDescriptor, InvalidArgument>;

    /// Render a successful outcome. Defaults to the backend's description
    /// plus any `data` fields as key/value rows.
    fn render(&self, operation: &OperationDescriptor, details: &SuccessDetails) -> OutputTable {
        let mut table = OutputTable::new();
        table.push(kv_row("Operation", operation.name()));
        table.push(kv_row("Target", operation.target()));
        table.push(kv_row("Result", &details.description));
        if let Some(serde_json::Value::Object(fields)) = &details.data {
            for (key, value) in fields {
                match value {
                    serde_json::Value::String(s) => table.push(kv_row(key, s)),
                    other => table.push(kv_row(key, other)),
                }
            }
        }
        table
    }
}

/// A node of the command tree.
pub struct CommandNode {
    name: String,
    about: String,
    long_about: Option<String>,
    usage: Option<String>,
    min_args: usize,
    max_args: Option<usize>,
    impact: Option<String>,
    flags: Vec<FlagSpec>,
    conflicts: Vec<(&'static str, &'static str)>,
    children: Vec<CommandNode>,
    handler: Option<Arc<dyn CommandHandler>>,
}

impl CommandNode {
    /// A category node: children only, no handler.
    pub fn group(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            long_about: None,
            usage: None,
            min_args: 0,
            max_args: Some(0),
            impact: None,
            flags: Vec::new(),
            conflicts: Vec::new(),
            children: Vec::new(),
            handler: None,
        }
    }

    /// An executable node taking no positional arguments until `args` says otherwise.
    pub fn command(
        name: impl Into<String>,
        about: impl Into<String>,
        handler: impl CommandHandler + 'static,
    ) -> Self {
        let mut node = Self::group(name, about);
        node.handler = Some(Arc::new(handler));
        node
    }

    pub fn long_about(mut self, text: impl Into<String>) -> Self {
        self.long_about = Some(text.into());
        self
    }

    /// Positional argument bounds; `max` of `None` is unbounded.
    pub fn args(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    /// Placeholder for positionals in the usage line, e.g. `<array-name>`.
    pub fn usage(mut self, args: impl Into<String>) -> Self {
        self.usage = Some(args.into());
        self
    }

    /// Mark the node destructive with the impact statement shown at confirmation.
    pub fn destructive(mut self, impact: impl Into<String>) -> Self {
        self.impact = Some(impact.into());
        self
    }

    pub fn flag(mut self, spec: FlagSpec) -> Self {
        self.flags.push(spec);
        self
    }

    /// Declare two flags that may not be given together.
    pub fn conflicting(mut self, a: &'static str, b: &'static str) -> Self {
        self.conflicts.push((a, b));
        self
    }

    pub fn subcommand(mut self, child: CommandNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn about(&self) -> &str {
        &self.about
    }

    pub fn min_args(&self) -> usize {
        self.min_args
    }

    pub fn max_args(&self) -> Option<usize> {
        self.max_args
    }

    pub fn is_destructive(&self) -> bool {
        self.impact.is_some()
    }

    pub fn impact(&self) -> Option<&str> {
        self.impact.as_deref()
    }

    pub fn children(&self) -> &[CommandNode] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&CommandNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn handler(&self) -> Option<&dyn CommandHandler> {
        self.handler.as_deref()
    }

    pub fn conflicts(&self) -> &[(&'static str, &'static str)] {
        &self.conflicts
    }

    /// Declared flags plus the built-ins (`--help`, and `--force` on destructive nodes).
    pub fn accepted_flags(&self) -> impl Iterator<Item = &FlagSpec> + '_ {
        let builtins: [Option<&FlagSpec>; 2] =
            [Some(&HELP_SPEC), self.is_destructive().then_some(&FORCE_SPEC)];
        builtins.into_iter().flatten().chain(self.flags.iter())
    }

    pub fn find_flag(&self, name: &str) -> Option<&FlagSpec> {
        self.accepted_flags().find(|f| f.name == name)
    }

    pub fn find_short_flag(&self, c: char) -> Option<&FlagSpec> {
        self.accepted_flags().find(|f| f.short == Some(c))
    }

    /// Help text for this node, `path` being the full command path.
    pub fn help_text(&self, path: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.about);
        if let Some(long) = &self.long_about {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", long.trim());
        }
        if let Some(impact) = &self.impact {
            let _ = writeln!(out);
            let _ = writeln!(out, "DESTRUCTIVE: {}", impact);
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Usage:");
        if self.handler.is_some() {
            let mut line = format!("  {} [flags]", path);
            if let Some(usage) = &self.usage {
                line.push(' ');
                line.push_str(usage);
            }
            let _ = writeln!(out, "{}", line);
        }
        if !self.children.is_empty() {
            let _ = writeln!(out, "  {} <subcommand>", path);
            let _ = writeln!(out);
            let _ = writeln!(out, "Subcommands:");
            let width = self.children.iter().map(|c| c.name.len()).max().unwrap_or(0);
            for child in &self.children {
                let marker = if child.is_destructive() { " [destructive]" } else { "" };
                let _ = writeln!(out, "  {:width$}  {}{}", child.name, child.about, marker);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Flags:");
        for flag in self.accepted_flags() {
            let short = flag.short.map(|c| format!("-{}, ", c)).unwrap_or_default();
            let value = if flag.takes_value { " <value>" } else { "" };
            let _ = writeln!(out, "  {}--{}{}  {}", short, flag.name, value, flag.help);
        }
        out.trim_end().to_string()
    }

    fn check(&self, path: &str) -> Result<(), RegistrationError> {
        if self.handler.is_none() && self.children.is_empty() {
            return Err(RegistrationError::MissingHandler { path: path.to_string() });
        }
        if self.is_destructive() && self.handler.is_none() {
            return Err(RegistrationError::DestructiveGroup { path: path.to_string() });
        }
        if let Some(max) = self.max_args {
            if max < self.min_args {
                return Err(RegistrationError::InvalidBounds {
                    path: path.to_string(),
                    min: self.min_args,
                    max,
                });
            }
        }

        for (i, flag) in self.flags.iter().enumerate() {
            if flag.name == HELP_FLAG || flag.name == FORCE_FLAG || flag.short == Some('h') {
                return Err(RegistrationError::ReservedFlag {
                    path: path.to_string(),
                    flag: flag.name.to_string(),
                });
            }
            let clash = self.flags[..i]
                .iter()
                .any(|f| f.name == flag.name || (flag.short.is_some() && f.short == flag.short));
            if clash {
                return Err(RegistrationError::DuplicateFlag {
                    path: path.to_string(),
                    flag: flag.name.to_string(),
                });
            }
        }

        for (a, b) in &self.conflicts {
            for name in [a, b] {
                if self.find_flag(name).is_none() {
                    return Err(RegistrationError::UnknownConflictFlag {
                        path: path.to_string(),
                        flag: name.to_string(),
                    });
                }
            }
        }

        for (i, child) in self.children.iter().enumerate() {
            if child.name.is_empty()
                || child.name.starts_with('-')
                || child.name.chars().any(char::is_whitespace)
            {
                return Err(RegistrationError::InvalidName {
                    parent: path.to_string(),
                    name: child.name.clone(),
                });
            }
            if self.children[..i].iter().any(|c| c.name == child.name) {
                return Err(RegistrationError::DuplicateName {
                    parent: path.to_string(),
                    name: child.name.clone(),
                });
            }
            child.check(&format!("{} {}", path, child.name))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandNode")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("destructive", &self.is_destructive())
            .field("has_handler", &self.handler.is_some())
            .field("children", &self.children)
            .finish()
    }
}

/// Programmer errors in the tree composition, caught at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("duplicate subcommand '{name}' under '{parent}'")]
    DuplicateName { parent: String, name: String },

    #[error("invalid subcommand name '{name}' under '{parent}'")]
    InvalidName { parent: String, name: String },

    #[error("'{path}' has neither a handler nor subcommands")]
    MissingHandler { path: String },

    #[error("'{path}' is destructive but has no handler")]
    DestructiveGroup { path: String },

    #[error("'{path}' declares max args {max} below min args {min}")]
    InvalidBounds { path: String, min: usize, max: usize },

    #[error("'{path}' declares flag '--{flag}' twice")]
    DuplicateFlag { path: String, flag: String },

    #[error("'{path}' declares reserved flag '--{flag}'")]
    ReservedFlag { path: String, flag: String },

    #[error("'{path}' lists undeclared flag '--{flag}' as conflicting")]
    UnknownConflictFlag { path: String, flag: String },
}

/// A checked, immutable command tree.
#[derive(Debug)]
pub struct CommandTree {
    program: String,
    root: CommandNode,
}

/// Where an argument vector landed in the tree.
#[derive(Debug)]
pub struct Resolution<'t, 'a> {
    pub node: &'t CommandNode,
    pub path: Vec<&'t str>,
    pub rest: &'a [String],
    program: &'t str,
}

impl Resolution<'_, '_> {
    /// `program word word ...` for messages and help.
    pub fn display_path(&self) -> String {
        std::iter::once(self.program)
            .chain(self.path.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl CommandTree {
    /// Check the composition and freeze it.
    pub fn new(program: impl Into<String>, root: CommandNode) -> Result<Self, RegistrationError> {
        let program = program.into();
        root.check(&program)?;
        Ok(Self { program, root })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn root(&self) -> &CommandNode {
        &self.root
    }

    /// Descend while the next word names a child of the current node.
    pub fn resolve<'t, 'a>(&'t self, argv: &'a [String]) -> Resolution<'t, 'a> {
        let mut node = &self.root;
        let mut path = Vec::new();
        let mut consumed = 0;

        for word in argv {
            match node.child(word) {
                Some(child) => {
                    node = child;
                    path.push(child.name());
                    consumed += 1;
                }
                None => break,
            }
        }

        Resolution {
            node,
            path,
            rest: &argv[consumed..],
            program: &self.program,
        }
    }

    /// Root help, with the exit code table appended.
    pub fn root_help(&self) -> String {
        let mut out = self.root.help_text(&self.program);
        out.push_str("\n\nExit codes:\n");
        for code in CliExitCode::ALL {
            let _ = writeln!(out, "  {}  {}", code.code(), code.describe());
        }
        out.trim_end().to_string()
    }
}
