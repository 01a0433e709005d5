// src/command.rs
//
// The heart of the crate: compiling descriptors into the command tree,
// dispatching an argument vector through it, rendering help, and the
// top-level runner that turns a handler result into an exit code.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use colored::Colorize;

use crate::CancellationToken;
use crate::errors::{self, BuildError, usage_msg};
use crate::flagset::{self, FlagSet};
use crate::metadata::{Doc, Metadata};
use crate::models::{Action, Descriptor, Handler, Instance, Request};
use crate::options;
use crate::param::{self, Arity, ParamShape};
use crate::strings::normalize_to_kebab_case;

/// An action bound into the tree, ready to invoke.
pub(crate) struct BoundRun {
    wants_context: bool,
    options: Option<Instance>,
    receiver: Option<Instance>,
    handler: Handler,
    trailing: Arity,
}

/// One compiled command node. Persistent flags are the owning descriptor's
/// fields and are visible to every command beneath this node; local flags
/// come from the bound action's options descriptor and apply here only.
pub(crate) struct Command {
    name: String,
    aliases: Vec<String>,
    short: String,
    long: String,
    usage: String,
    persistent: FlagSet,
    local: FlagSet,
    children: Vec<Rc<Command>>,
    run: Option<BoundRun>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("children", &self.children.len())
            .field("runnable", &self.run.is_some())
            .finish_non_exhaustive()
    }
}

impl Command {
    fn find_child(&self, token: &str) -> Option<Rc<Command>> {
        self.children
            .iter()
            .find(|c| c.name == token || c.aliases.iter().any(|a| a == token))
            .cloned()
    }
}

// MARK: --- TREE CONSTRUCTION ---

fn doc_lookup<'m>(metadata: Option<&'m Metadata>, path: &str) -> Doc<'m> {
    metadata.map_or_else(Doc::empty, |m| m.lookup(path))
}

struct Frame {
    id: usize,
    instance: Instance,
}

/// Compiles descriptors into `Command` nodes. Memoizes on descriptor
/// identity, so a descriptor mounted in several places compiles once and
/// every mount point shares one node and one flag-storage instance.
struct TreeBuilder<'m> {
    metadata: Option<&'m Metadata>,
    memo: HashMap<usize, Rc<Command>>,
    stack: Vec<Frame>,
}

/// Compiles a descriptor (and everything it reaches) into a command tree.
pub(crate) fn build(
    descriptor: &Descriptor,
    metadata: Option<&Metadata>,
) -> Result<Rc<Command>, BuildError> {
    let mut builder = TreeBuilder {
        metadata,
        memo: HashMap::new(),
        stack: Vec::new(),
    };
    builder.descriptor_node(descriptor)
}

/// Compiles a standalone action into a single-command tree.
pub(crate) fn build_action_root(
    action: &Action,
    metadata: Option<&Metadata>,
) -> Result<Rc<Command>, BuildError> {
    let mut builder = TreeBuilder {
        metadata,
        memo: HashMap::new(),
        stack: Vec::new(),
    };
    let doc = doc_lookup(metadata, &action.name);
    builder.action_node(action, None, doc)
}

impl<'m> TreeBuilder<'m> {
    fn descriptor_node(&mut self, descriptor: &Descriptor) -> Result<Rc<Command>, BuildError> {
        let id = descriptor.id();
        if let Some(built) = self.memo.get(&id) {
            return Ok(built.clone());
        }
        let (owner, doc_path, actions) = {
            let inner = descriptor.borrow();
            (
                inner.name.clone(),
                inner.doc_path.clone(),
                inner.actions.clone(),
            )
        };
        let doc = doc_lookup(self.metadata, &doc_path);

        let instance = Instance::new();
        let mut persistent = FlagSet::default();
        let declared = options::declare(descriptor, doc, &instance, &mut persistent)?;
        if let Some(link) = &declared.parent_link {
            let target_id = link.target.id();
            let Some(frame) = self.stack.iter().find(|f| f.id == target_id) else {
                return Err(BuildError::ParentLinkWithoutAncestor {
                    descriptor: owner,
                    field: link.field.clone(),
                    target: link.target.name(),
                });
            };
            instance.set_parent(frame.instance.clone());
        }
        self.stack.push(Frame {
            id,
            instance: instance.clone(),
        });

        let mut local = FlagSet::default();
        let mut run = None;
        let mut exec: Option<(String, Vec<ParamShape>)> = None;
        let mut children: Vec<Rc<Command>> = Vec::new();
        for action in &actions {
            if action.is_execute() {
                if run.is_some() {
                    return Err(BuildError::DuplicateCommand {
                        parent: owner,
                        name: normalize_to_kebab_case(&action.name),
                    });
                }
                run = Some(self.bind_run(action, Some(instance.clone()), &mut local)?);
                exec = Some((action.name.clone(), action.shape.clone()));
            } else {
                children.push(self.action_node(action, Some(instance.clone()), doc.child(&action.name))?);
            }
        }
        for mount in &declared.mounts {
            let target_id = mount.descriptor.id();
            if self.stack.iter().any(|f| f.id == target_id) {
                return Err(BuildError::RecursiveMount {
                    descriptor: owner,
                    field: mount.field.clone(),
                    target: mount.descriptor.name(),
                });
            }
            children.push(self.descriptor_node(&mount.descriptor)?);
        }
        self.stack.pop();

        let mut seen = HashSet::new();
        for child in &children {
            if !seen.insert(child.name.clone()) {
                return Err(BuildError::DuplicateCommand {
                    parent: owner,
                    name: child.name.clone(),
                });
            }
        }

        // The trailing-parameter suffix of the usage line comes from the
        // descriptor's own run operation, whose params live on its node.
        let usage = match &exec {
            Some((exec_name, shapes)) => match doc.directive("usage") {
                Some(u) => u.to_string(),
                None => doc.child(exec_name).usage(&owner, shapes),
            },
            None => doc.usage(&owner, &[]),
        };
        log::debug!(
            "compiled descriptor '{}' ({} subcommands)",
            owner,
            children.len()
        );
        let command = Rc::new(Command {
            name: normalize_to_kebab_case(&owner),
            aliases: doc.aliases(),
            short: doc.short(),
            long: doc.long().to_string(),
            usage,
            persistent,
            local,
            children,
            run,
        });
        self.memo.insert(id, command.clone());
        Ok(command)
    }

    fn action_node(
        &mut self,
        action: &Action,
        receiver: Option<Instance>,
        doc: Doc<'m>,
    ) -> Result<Rc<Command>, BuildError> {
        let mut local = FlagSet::default();
        let run = self.bind_run(action, receiver, &mut local)?;
        Ok(Rc::new(Command {
            name: normalize_to_kebab_case(&action.name),
            aliases: doc.aliases(),
            short: doc.short(),
            long: doc.long().to_string(),
            usage: doc.usage(&action.name, &action.shape),
            persistent: FlagSet::default(),
            local,
            children: Vec::new(),
            run: Some(run),
        }))
    }

    fn bind_run(
        &mut self,
        action: &Action,
        receiver: Option<Instance>,
        local: &mut FlagSet,
    ) -> Result<BoundRun, BuildError> {
        let signature = param::classify(&action.name, &action.shape)?;
        let options = match &signature.options {
            Some(od) => Some(self.options_instance(&action.name, od, local)?),
            None => None,
        };
        Ok(BoundRun {
            wants_context: signature.wants_context,
            options,
            receiver,
            handler: action.handler.clone(),
            trailing: signature.trailing,
        })
    }

    fn options_instance(
        &mut self,
        action: &str,
        od: &Descriptor,
        local: &mut FlagSet,
    ) -> Result<Instance, BuildError> {
        let doc_path = od.borrow().doc_path.clone();
        let doc = doc_lookup(self.metadata, &doc_path);
        let instance = Instance::new();
        let declared = options::declare(od, doc, &instance, local)?;
        if let Some(mount) = declared.mounts.first() {
            return Err(BuildError::Signature {
                action: action.to_string(),
                shape: format!("options({})", od.name()),
                reason: format!(
                    "an options descriptor cannot mount subcommands (field '{}')",
                    mount.field
                ),
            });
        }
        if let Some(link) = &declared.parent_link {
            let target_id = link.target.id();
            let Some(frame) = self.stack.iter().find(|f| f.id == target_id) else {
                return Err(BuildError::ParentLinkWithoutAncestor {
                    descriptor: od.name(),
                    field: link.field.clone(),
                    target: link.target.name(),
                });
            };
            instance.set_parent(frame.instance.clone());
        }
        Ok(instance)
    }
}

// MARK: --- DISPATCH ---

fn chain_sets<'c>(ancestors: &'c [Rc<Command>], node: &'c Command) -> Vec<&'c FlagSet> {
    let mut sets: Vec<&FlagSet> = ancestors.iter().map(|c| &c.persistent).collect();
    sets.push(&node.persistent);
    sets.push(&node.local);
    sets
}

fn command_path(ancestors: &[Rc<Command>], node: &Command) -> String {
    let mut parts: Vec<&str> = ancestors.iter().map(|c| c.name.as_str()).collect();
    parts.push(node.name.as_str());
    parts.join(" ")
}

fn usage_line(ancestors: &[Rc<Command>], node: &Command) -> String {
    let prefix: Vec<&str> = ancestors.iter().map(|c| c.name.as_str()).collect();
    if prefix.is_empty() {
        node.usage.clone()
    } else {
        format!("{} {}", prefix.join(" "), node.usage)
    }
}

fn suggestions(node: &Command, token: &str) -> Vec<String> {
    let mut found = Vec::new();
    for child in &node.children {
        let names = std::iter::once(&child.name).chain(child.aliases.iter());
        let close = names.into_iter().any(|candidate| {
            strsim::levenshtein(token, candidate) <= 2 || candidate.starts_with(token)
        });
        if close && !found.contains(&child.name) {
            found.push(child.name.clone());
        }
    }
    found
}

fn unknown_command(ancestors: &[Rc<Command>], node: &Command, token: &str) -> anyhow::Error {
    let mut message = format!(
        "unknown command \"{token}\" for \"{}\"",
        command_path(ancestors, node)
    );
    let close = suggestions(node, token);
    if !close.is_empty() {
        message.push_str("\n\nDid you mean this?");
        for name in close {
            message.push_str(&format!("\n\t{name}"));
        }
    }
    usage_msg(message)
}

/// How many tokens a flag token occupies during the descent scan: two when
/// the flag is known to take a separate value, one otherwise (booleans,
/// `=`-attached values, shorthand groups, and unknown flags, which the
/// later parse will reject).
fn flag_skip(chain: &[&FlagSet], token: &str) -> usize {
    if token == "-h" || token == "--help" || token.contains('=') {
        return 1;
    }
    if let Some(name) = token.strip_prefix("--") {
        return match flagset::lookup(chain, name) {
            Some(flag) if !flag.kind.is_bool() => 2,
            _ => 1,
        };
    }
    let mut chars = token.chars();
    chars.next();
    let Some(shorthand) = chars.next() else {
        return 1;
    };
    if chars.next().is_some() {
        // Attached value or a shorthand group, self-contained either way.
        return 1;
    }
    match flagset::lookup_short(chain, shorthand) {
        Some(flag) if !flag.kind.is_bool() => 2,
        _ => 1,
    }
}

/// Dispatches an argument vector through the tree and invokes the reached
/// command. `usage` is kept pointed at the deepest node reached so the
/// caller can print the right usage line on a usage error.
fn execute(
    root: &Rc<Command>,
    context: &CancellationToken,
    args: &[String],
    out: &mut dyn Write,
    usage: &mut String,
) -> anyhow::Result<()> {
    let mut ancestors: Vec<Rc<Command>> = Vec::new();
    let mut node: Rc<Command> = Rc::clone(root);
    let mut rest: Vec<String> = args.to_vec();

    // Locate the target command first, stepping over flag tokens and their
    // values, so flags may sit on either side of a subcommand name. Flags
    // are then parsed once, against the reached command's full chain.
    let mut i = 0;
    while i < rest.len() {
        let token = rest[i].clone();
        if token == "--" {
            break;
        }
        if token.starts_with('-') && token.len() > 1 {
            let sets = chain_sets(&ancestors, &node);
            i += flag_skip(&sets, &token);
            continue;
        }
        let Some(child) = node.find_child(&token) else {
            break;
        };
        ancestors.push(Rc::clone(&node));
        node = child;
        rest.remove(i);
    }
    *usage = usage_line(&ancestors, &node);

    let parsed = {
        let sets = chain_sets(&ancestors, &node);
        flagset::parse_args(&sets, &rest)?
    };
    if parsed.help {
        write_help(&ancestors, &node, out)?;
        return Ok(());
    }
    let rest = parsed.positionals;

    match &node.run {
        Some(run) => {
            if run.trailing == Arity::None && !node.children.is_empty() {
                if let Some(first) = rest.first() {
                    return Err(unknown_command(&ancestors, &node, first));
                }
            }
            if !run.trailing.accepts(rest.len()) {
                return Err(usage_msg(format!(
                    "accepts {}, received {}",
                    run.trailing.expected(),
                    rest.len()
                )));
            }
            {
                let sets = chain_sets(&ancestors, &node);
                flagset::check_required(&sets, &parsed.provided)?;
            }
            log::debug!(
                "invoking '{}' (context forwarded: {}, args: {:?})",
                command_path(&ancestors, &node),
                run.wants_context,
                rest
            );
            (run.handler)(Request {
                context,
                options: run.options.clone(),
                receiver: run.receiver.clone(),
                args: rest,
            })
        }
        None => {
            if let Some(first) = rest.first() {
                return Err(unknown_command(&ancestors, &node, first));
            }
            write_help(&ancestors, &node, out)?;
            Ok(())
        }
    }
}

/// Runs the tree against an argument vector and reports the outcome: help
/// and action output to `out`, error reporting to `err_out`, and the
/// resolved exit code as the return value.
pub(crate) fn run(
    root: &Rc<Command>,
    context: &CancellationToken,
    args: &[String],
    out: &mut dyn Write,
    err_out: &mut dyn Write,
) -> i32 {
    let mut usage = String::new();
    match execute(root, context, args, out, &mut usage) {
        Ok(()) => 0,
        Err(e) => {
            let resolution = errors::resolve(&e);
            if resolution.print_error {
                let _ = writeln!(err_out, "{}: {e}", "Error".red().bold());
            }
            if resolution.print_usage {
                let _ = writeln!(err_out, "Usage:\n  {usage}");
            }
            resolution.code
        }
    }
}

// MARK: --- HELP ---

struct FlagRow {
    left: String,
    mid: String,
    right: String,
}

impl FlagRow {
    fn from_flag(flag: &flagset::Flag) -> Self {
        let left = match flag.shorthand {
            Some(c) => format!("-{c}, --{}", flag.name),
            None => format!("    --{}", flag.name),
        };
        let mut mid = flag.kind.type_token().to_string();
        if let Some(default) = &flag.default {
            if !mid.is_empty() {
                mid.push(' ');
            }
            mid.push_str(&format!("(default {default})"));
        }
        if flag.required {
            if !mid.is_empty() {
                mid.push(' ');
            }
            mid.push_str("(required)");
        }
        Self {
            left,
            mid,
            right: flag.usage.clone(),
        }
    }
}

fn write_flag_rows(rows: &[FlagRow], out: &mut dyn Write) -> anyhow::Result<()> {
    let left_width = rows.iter().map(|r| r.left.chars().count()).max().unwrap_or(0);
    let mid_width = rows.iter().map(|r| r.mid.chars().count()).max().unwrap_or(0);
    for row in rows {
        let line = format!(
            "  {:left_width$}  {:mid_width$}  {}",
            row.left, row.mid, row.right
        );
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}

fn write_help(
    ancestors: &[Rc<Command>],
    node: &Command,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    if !node.long.is_empty() {
        writeln!(out, "{}\n", node.long)?;
    }
    let mut usage = usage_line(ancestors, node);
    if !node.children.is_empty() {
        usage.push_str(" [command]");
    }
    writeln!(out, "Usage:\n  {usage}")?;

    if !node.children.is_empty() {
        writeln!(out, "\nAvailable Commands:")?;
        let width = node
            .children
            .iter()
            .map(|c| c.name.chars().count())
            .max()
            .unwrap_or(0);
        for child in &node.children {
            let line = format!("  {:width$}  {}", child.name, child.short);
            writeln!(out, "{}", line.trim_end())?;
        }
    }

    let mut rows: Vec<FlagRow> = node
        .local
        .flags()
        .iter()
        .chain(node.persistent.flags())
        .map(FlagRow::from_flag)
        .collect();
    rows.push(FlagRow {
        left: "-h, --help".to_string(),
        mid: String::new(),
        right: format!("help for {}", node.name),
    });
    writeln!(out, "\nFlags:")?;
    write_flag_rows(&rows, out)?;

    let global: Vec<FlagRow> = ancestors
        .iter()
        .flat_map(|c| c.persistent.flags())
        .map(FlagRow::from_flag)
        .collect();
    if !global.is_empty() {
        writeln!(out, "\nGlobal Flags:")?;
        write_flag_rows(&global, out)?;
    }

    if !node.children.is_empty() {
        writeln!(
            out,
            "\nUse \"{} [command] --help\" for more information about a command.",
            command_path(ancestors, node)
        )?;
    }
    Ok(())
}

// MARK: --- UNIT TESTS ---
