//! Compile typed, declarative command descriptors into a hierarchical CLI.
//!
//! A [`Descriptor`] enumerates flag fields, nested subcommand mounts and
//! bound [`Action`]s; [`Cli::new`] compiles a descriptor graph into a command
//! tree (validating defaults, shorthands and signatures up front), and
//! [`Cli::run`] dispatches an argument vector through it: inherited
//! persistent flags, metadata-driven help, and an error taxonomy that maps
//! onto process exit codes.

use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Cooperative cancellation signal forwarded to actions; callers flip it
/// (typically from a signal handler) and long-running actions poll it.
pub type CancellationToken = Arc<AtomicBool>;

mod command;
mod errors;
mod flagset;
mod metadata;
mod models;
mod options;
mod param;
mod strings;
mod value;

pub use errors::{BuildError, ExitError, UsageError, exit_code, exit_error, usage_error};
pub use metadata::{DIRECTIVE_PREFIX, Doc, Metadata, MetadataError, RawMetadata};
pub use models::{Action, Descriptor, Field, Instance, OptionsView, Request};
pub use param::{Arity, ParamShape};
pub use value::{Scalar, Value, ValueError};

/// A compiled command tree, ready to run any number of argument vectors.
#[derive(Debug)]
pub struct Cli {
    root: Rc<command::Command>,
}

impl Cli {
    /// Compiles a descriptor graph into a command tree. Construction-time
    /// problems (bad defaults, colliding flags, malformed signatures,
    /// recursive mounts) surface here, before anything runs.
    pub fn new(root: &Descriptor, metadata: Option<&Metadata>) -> Result<Self, BuildError> {
        Ok(Self {
            root: command::build(root, metadata)?,
        })
    }

    /// Compiles a standalone action into a single-command tree, for programs
    /// that are one command with flags rather than a hierarchy.
    pub fn from_action(action: Action, metadata: Option<&Metadata>) -> Result<Self, BuildError> {
        Ok(Self {
            root: command::build_action_root(&action, metadata)?,
        })
    }

    /// Runs an argument vector (without the program name) against the tree,
    /// writing to stdout and stderr. Returns the process exit code.
    pub fn run(&self, context: &CancellationToken, args: &[String]) -> i32 {
        let mut out = std::io::stdout();
        let mut err = std::io::stderr();
        self.run_with_output(context, args, &mut out, &mut err)
    }

    /// Runs the process's own arguments, for the common `main` one-liner.
    pub fn run_from_env(&self, context: &CancellationToken) -> i32 {
        let args: Vec<String> = std::env::args().skip(1).collect();
        self.run(context, &args)
    }

    /// Like [`Cli::run`], but with the output streams supplied by the
    /// caller. This is what tests drive.
    pub fn run_with_output(
        &self,
        context: &CancellationToken,
        args: &[String],
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> i32 {
        command::run(&self.root, context, args, out, err)
    }
}

// MARK: --- UNIT TESTS ---
