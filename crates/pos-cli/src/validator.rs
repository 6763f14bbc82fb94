//! Structural validation of an invocation.
//!
//! Runs before any prompt or backend call. It only looks at the shape of the
//! command line (which flags, how many positionals); whether a value makes
//! sense is up to the handler.

use std::collections::BTreeMap;

use crate::tree::{CommandNode, FlagSpec, HELP_FLAG};

/// Arguments left after the command path, split into positionals and flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationRequest {
    args: Vec<String>,
    flags: BTreeMap<String, Option<String>>,
}

impl InvocationRequest {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            flags: BTreeMap::new(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn flag_value(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(|v| v.as_deref())
    }

    pub fn wants_help(&self) -> bool {
        self.has_flag(HELP_FLAG)
    }
}

/// Shape errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("expected {}, got {got}", bounds_text(.want_min, .want_max))]
    ArgumentCount {
        got: usize,
        want_min: usize,
        want_max: Option<usize>,
    },

    #[error("unknown flag '{flag}'")]
    UnknownFlag { flag: String },

    #[error("flag '--{flag}' requires a value")]
    MissingFlagValue { flag: String },

    #[error("flag '--{flag}' does not take a value")]
    UnexpectedFlagValue { flag: String },

    #[error("flags '--{first}' and '--{second}' cannot be used together")]
    FlagConflict { first: String, second: String },
}

fn bounds_text(min: &usize, max: &Option<usize>) -> String {
    let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
    match (*min, *max) {
        (min, Some(max)) if min == max => format!("exactly {} {}", min, plural(min)),
        (0, Some(max)) => format!("at most {} {}", max, plural(max)),
        (min, Some(max)) => format!("between {} and {} arguments", min, max),
        (min, None) => format!("at least {} {}", min, plural(min)),
    }
}

/// Validates invocations against a node's declared shape.
pub struct ArgumentValidator;

impl ArgumentValidator {
    /// Parse and check an invocation. Returns early, unchecked for counts,
    /// when `--help` is present.
    pub fn validate(node: &CommandNode, raw: &[String]) -> Result<InvocationRequest, ValidationError> {
        let request = Self::parse(node, raw)?;
        if request.wants_help() {
            return Ok(request);
        }
        Self::check_conflicts(node, &request)?;
        Self::check_count(node.min_args(), node.max_args(), request.args().len())?;
        Ok(request)
    }

    /// Split `raw` into positionals and declared flags.
    ///
    /// Accepts `--name`, `--name=value`, `--name value` (value flags only),
    /// `-x` for declared short names, and `--` to end flag parsing. A repeated
    /// flag keeps its last value.
    pub fn parse(node: &CommandNode, raw: &[String]) -> Result<InvocationRequest, ValidationError> {
        let mut request = InvocationRequest::default();
        let mut tokens = raw.iter();
        let mut positional_only = false;

        while let Some(token) = tokens.next() {
            if positional_only {
                request.args.push(token.clone());
                continue;
            }
            if token == "--" {
                positional_only = true;
                continue;
            }

            let (spec, inline) = if let Some(body) = token.strip_prefix("--") {
                let (name, inline) = match body.split_once('=') {
                    Some((name, value)) => (name, Some(value.to_string())),
                    None => (body, None),
                };
                let spec = node.find_flag(name).ok_or_else(|| ValidationError::UnknownFlag {
                    flag: format!("--{}", name),
                })?;
                (spec, inline)
            } else if let Some(c) = single_short(token) {
                let spec = node
                    .find_short_flag(c)
                    .ok_or_else(|| ValidationError::UnknownFlag { flag: token.clone() })?;
                (spec, None)
            } else if token.starts_with('-') && token.len() > 1 {
                return Err(ValidationError::UnknownFlag { flag: token.clone() });
            } else {
                request.args.push(token.clone());
                continue;
            };

            let value = Self::flag_value(spec, inline, &mut tokens)?;
            request.flags.insert(spec.name.to_string(), value);
        }

        Ok(request)
    }

    fn flag_value<'a>(
        spec: &FlagSpec,
        inline: Option<String>,
        tokens: &mut impl Iterator<Item = &'a String>,
    ) -> Result<Option<String>, ValidationError> {
        match (spec.takes_value, inline) {
            (true, Some(value)) => Ok(Some(value)),
            (true, None) => tokens
                .next()
                .map(|v| Some(v.clone()))
                .ok_or_else(|| ValidationError::MissingFlagValue {
                    flag: spec.name.to_string(),
                }),
            (false, Some(_)) => Err(ValidationError::UnexpectedFlagValue {
                flag: spec.name.to_string(),
            }),
            (false, None) => Ok(None),
        }
    }

    /// Reject declared mutually exclusive pairs.
    pub fn check_conflicts(node: &CommandNode, request: &InvocationRequest) -> Result<(), ValidationError> {
        for (a, b) in node.conflicts() {
            if request.has_flag(a) && request.has_flag(b) {
                return Err(ValidationError::FlagConflict {
                    first: a.to_string(),
                    second: b.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Check a positional count against declared bounds.
    pub fn check_count(want_min: usize, want_max: Option<usize>, got: usize) -> Result<(), ValidationError> {
        let too_many = want_max.map_or(false, |max| got > max);
        if got < want_min || too_many {
            return Err(ValidationError::ArgumentCount {
                got,
                want_min,
                want_max,
            });
        }
        Ok(())
    }
}

/// `-x` form: exactly one dash followed by one character.
fn single_short(token: &str) -> Option<char> {
    let rest = token.strip_prefix('-')?;
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c != '-' => Some(c),
        _ => None,
    }
}
