// src/errors.rs
//
// Two error layers. Construction-time errors (`BuildError`) are programmer
// errors in the CLI definition and are fatal and immediate. Run-time errors
// flow out of dispatch as `anyhow::Error` and are resolved here into an exit
// code plus output policy: `ExitError` first (it may also look like a usage
// error, so the exit-code-carrying wrapper always takes precedence), then
// `UsageError`, then the generic fallback.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::value::ValueError;

/// A malformed CLI definition, detected while compiling descriptors into the
/// command tree. Always identifies the offending field, type or signature.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A `default` tag failed to parse with its field kind's parser.
    #[error("descriptor '{descriptor}', field '{field}': invalid default: {source}")]
    Default {
        /// The owning descriptor.
        descriptor: String,
        /// The offending field.
        field: String,
        /// Why the raw default did not parse.
        #[source]
        source: ValueError,
    },
    /// A field name normalized to an empty flag name.
    #[error("descriptor '{descriptor}', field '{field}': name normalizes to an empty flag name")]
    EmptyFlagName {
        /// The owning descriptor.
        descriptor: String,
        /// The offending field.
        field: String,
    },
    /// Two fields of one flag-set normalized to the same flag name.
    #[error("descriptor '{descriptor}', field '{field}': duplicate flag '--{flag}'")]
    DuplicateFlag {
        /// The owning descriptor.
        descriptor: String,
        /// The offending field.
        field: String,
        /// The colliding flag name.
        flag: String,
    },
    /// Two fields of one flag-set declared the same shorthand.
    #[error("descriptor '{descriptor}', field '{field}': duplicate shorthand '-{shorthand}'")]
    DuplicateShorthand {
        /// The owning descriptor.
        descriptor: String,
        /// The offending field.
        field: String,
        /// The colliding shorthand.
        shorthand: char,
    },
    /// A descriptor declared more than one parent-link field.
    #[error("descriptor '{descriptor}': more than one parent-link field ('{first}' and '{second}')")]
    DuplicateParentLink {
        /// The owning descriptor.
        descriptor: String,
        /// The first parent-link field.
        first: String,
        /// The second parent-link field.
        second: String,
    },
    /// A parent-link field references a descriptor that is not an ancestor
    /// in the tree being built.
    #[error(
        "descriptor '{descriptor}', field '{field}': parent-link target '{target}' \
         is not an ancestor in the tree being built"
    )]
    ParentLinkWithoutAncestor {
        /// The owning descriptor.
        descriptor: String,
        /// The offending field.
        field: String,
        /// The referenced descriptor.
        target: String,
    },
    /// A descriptor mounts itself, directly or transitively.
    #[error("descriptor '{descriptor}', field '{field}': recursive mount of '{target}'")]
    RecursiveMount {
        /// The owning descriptor.
        descriptor: String,
        /// The mounting field.
        field: String,
        /// The descriptor already on the build stack.
        target: String,
    },
    /// An action declared a parameter-shape list outside the accepted form.
    #[error("action '{action}': unsupported signature {shape}: {reason}")]
    Signature {
        /// The rejected action.
        action: String,
        /// The declared shape list.
        shape: String,
        /// What rule it broke.
        reason: String,
    },
    /// Two children of one command node ended up with the same name.
    #[error("command '{parent}': duplicate subcommand '{name}'")]
    DuplicateCommand {
        /// The parent command.
        parent: String,
        /// The colliding child name.
        name: String,
    },
}

/// Wraps a prior error to indicate the user input was at fault and that the
/// usage line should be printed alongside the error.
#[derive(Debug)]
pub struct UsageError {
    inner: anyhow::Error,
}

impl UsageError {
    /// The wrapped error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl StdError for UsageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Returns the given error wrapped so the run is reported as a usage error:
/// non-zero exit, with the usage line printed alongside the message.
pub fn usage_error(err: impl Into<anyhow::Error>) -> anyhow::Error {
    anyhow::Error::new(UsageError { inner: err.into() })
}

pub(crate) fn usage_msg(message: String) -> anyhow::Error {
    usage_error(anyhow::anyhow!(message))
}

/// Carries an explicit process exit code. With no wrapped errors it exists
/// purely to set the exit code and all error output is suppressed.
#[derive(Debug)]
pub struct ExitError {
    code: i32,
    errors: Vec<anyhow::Error>,
}

impl ExitError {
    /// The exit code to return verbatim.
    pub fn code(&self) -> i32 {
        self.code
    }

    /// The wrapped errors, possibly empty.
    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "exit status {}", self.code);
        }
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl StdError for ExitError {}

/// Returns an error that makes the run exit with `code`. Wrapped errors (if
/// any) are reported; an empty list suppresses error output entirely.
pub fn exit_error(code: i32, errors: Vec<anyhow::Error>) -> anyhow::Error {
    anyhow::Error::new(ExitError { code, errors })
}

/// How a run-time error is reported at the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Resolution {
    pub code: i32,
    pub print_error: bool,
    pub print_usage: bool,
}

pub(crate) fn resolve(err: &anyhow::Error) -> Resolution {
    // The exit-code wrapper wins over everything else in the chain.
    for cause in err.chain() {
        if let Some(exit) = cause.downcast_ref::<ExitError>() {
            return Resolution {
                code: exit.code,
                print_error: !exit.errors.is_empty(),
                print_usage: false,
            };
        }
    }
    for cause in err.chain() {
        if cause.downcast_ref::<UsageError>().is_some() {
            return Resolution {
                code: 1,
                print_error: true,
                print_usage: true,
            };
        }
    }
    Resolution {
        code: 1,
        print_error: true,
        print_usage: false,
    }
}

/// Maps a run-time error to its process exit code: an [`ExitError`] anywhere
/// in the chain wins, anything else is 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    resolve(err).code
}

// MARK: --- UNIT TESTS ---
