// src/metadata.rs
//
// The documentation metadata tree. It is produced offline by a doc-extraction
// tool, serialized with bincode, loaded once at startup and consumed
// read-only while the command tree is built. Paths are dot-separated
// (`pkg.Type.Method.Field`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::param::ParamShape;
use crate::param::params_usage;
use crate::strings::normalize_to_kebab_case;

/// The comment-line prefix that marks a directive inside a doc block, e.g.
/// `//cli:short List the things` or `//cli:aliases ls, l`.
pub const DIRECTIVE_PREFIX: &str = "//cli:";

/// Errors raised while building or decoding the metadata tree. These are
/// programmer errors in the CLI definition (or a corrupt blob), never user
/// input, so callers treat them as fatal.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// A doc block declared the same directive twice.
    #[error("more than one '{directive}' directive in doc block: {doc:?}")]
    DuplicateDirective {
        /// The repeated directive keyword.
        directive: String,
        /// The offending doc block.
        doc: String,
    },
    /// The blob could not be decoded.
    #[error("failed to decode metadata blob: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    /// The tree could not be encoded.
    #[error("failed to encode metadata blob: {0}")]
    Encode(#[from] bincode::error::EncodeError),
}

/// One node of the raw metadata tree, as serialized by the extraction tool.
///
/// Maps are `BTreeMap` so that re-encoding an unchanged tree is
/// byte-identical (the blob must be deterministically re-derivable).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMetadata {
    /// Free-form long description (directive lines already stripped).
    pub doc: String,
    /// Directive keyword to value, at most one of each kind.
    pub directives: BTreeMap<String, String>,
    /// Short, field-level description (a trailing comment, typically).
    pub comment: String,
    /// Ordered parameter names of an action.
    pub params: Vec<String>,
    /// Named sub-nodes.
    pub children: BTreeMap<String, RawMetadata>,
}

impl RawMetadata {
    /// Decodes a node tree from a serialized blob.
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        let (raw, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(raw)
    }

    /// Encodes this node tree into the blob format `decode` understands.
    pub fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    /// Returns the named child, creating it if absent. Only the extraction
    /// side mutates the tree; consumers go through [`Metadata::lookup`].
    pub fn child(&mut self, name: &str) -> &mut Self {
        self.children.entry(name.to_string()).or_default()
    }

    /// Sets this node's doc from a raw doc block, splitting out directive
    /// lines. A directive repeated within one block is a fatal error.
    pub fn set_doc(&mut self, text: &str) -> Result<(), MetadataError> {
        let mut lines = Vec::new();
        for line in text.lines() {
            let Some(rest) = line.trim_start().strip_prefix(DIRECTIVE_PREFIX) else {
                lines.push(line);
                continue;
            };
            let (directive, value) = match rest.split_once(' ') {
                Some((d, v)) => (d, v.trim()),
                None => (rest, ""),
            };
            let previous = self
                .directives
                .insert(directive.to_string(), value.to_string());
            if previous.is_some() {
                return Err(MetadataError::DuplicateDirective {
                    directive: directive.to_string(),
                    doc: text.to_string(),
                });
            }
        }
        self.doc = lines.join("\n").trim().to_string();
        Ok(())
    }

    /// Sets the short, field-level comment.
    pub fn set_comment(&mut self, comment: &str) {
        self.comment = comment.trim().to_string();
    }

    /// Sets the ordered parameter names of an action.
    pub fn set_params(&mut self, params: &[&str]) {
        self.params = params.iter().map(|p| p.to_string()).collect();
    }
}

/// A decoded, immutable metadata tree.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    root: RawMetadata,
}

impl Metadata {
    /// Wraps an already-built raw tree.
    pub fn from_raw(root: RawMetadata) -> Self {
        Self { root }
    }

    /// Decodes a metadata blob as produced by the extraction tool.
    pub fn decode(bytes: &[u8]) -> Result<Self, MetadataError> {
        Ok(Self::from_raw(RawMetadata::decode(bytes)?))
    }

    /// Looks up a dot-separated path; missing segments yield the empty view
    /// rather than an error, so callers never branch on presence.
    pub fn lookup(&self, path: &str) -> Doc<'_> {
        let mut node = Some(&self.root);
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            node = node.and_then(|n| n.children.get(segment));
        }
        Doc(node)
    }
}

/// A copyable, absence-tolerant view of one metadata node. All accessors are
/// total: a missing node behaves like an empty one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Doc<'a>(Option<&'a RawMetadata>);

impl<'a> Doc<'a> {
    /// The empty view.
    pub fn empty() -> Self {
        Doc(None)
    }

    /// Descends into the named child.
    pub fn child(self, name: &str) -> Doc<'a> {
        Doc(self.0.and_then(|n| n.children.get(name)))
    }

    /// The long description.
    pub fn long(self) -> &'a str {
        self.0.map_or("", |n| n.doc.as_str())
    }

    /// The field-level comment.
    pub fn comment(self) -> &'a str {
        self.0.map_or("", |n| n.comment.as_str())
    }

    /// The value of the named directive, if present.
    pub fn directive(self, name: &str) -> Option<&'a str> {
        self.0.and_then(|n| n.directives.get(name)).map(String::as_str)
    }

    /// The ordered parameter names of an action.
    pub fn params(self) -> &'a [String] {
        self.0.map_or(&[], |n| n.params.as_slice())
    }

    /// Aliases from the `aliases` directive, comma-split and trimmed.
    pub fn aliases(self) -> Vec<String> {
        let Some(raw) = self.directive("aliases") else {
            return Vec::new();
        };
        raw.split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// The short description: the `short` directive wins, then the comment,
    /// then an auto-generated cut of the long description.
    pub fn short(self) -> String {
        if let Some(short) = self.directive("short") {
            return short.to_string();
        }
        if !self.comment().is_empty() {
            return self.comment().to_string();
        }
        auto_short(self.long())
    }

    /// The usage line for a command named `name` with the given parameter
    /// shapes: the `usage` directive verbatim, otherwise the kebab-cased name
    /// plus the arity suffix derived from the recorded parameter names.
    pub fn usage(self, name: &str, shapes: &[ParamShape]) -> String {
        if let Some(usage) = self.directive("usage") {
            return usage.to_string();
        }
        let base = normalize_to_kebab_case(name);
        match self.0 {
            Some(node) => format!("{base}{}", params_usage(&node.params, shapes)),
            None => base,
        }
    }
}

/// Auto-generates a short description from a long one: cut at the first blank
/// line, collapse whitespace, uppercase the first letter. Overlong results
/// are truncated to 77 chars plus an ellipsis; otherwise a single trailing
/// period is clipped, but only when preceded by a letter or digit.
fn auto_short(long: &str) -> String {
    let first_paragraph = match long.find("\n\n") {
        Some(i) => &long[..i],
        None => long,
    };
    let collapsed = first_paragraph
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.is_empty() {
        return String::new();
    }
    let mut chars: Vec<char> = collapsed.chars().collect();
    if let Some(first) = chars.first_mut() {
        *first = first.to_uppercase().next().unwrap_or(*first);
    }
    let len = chars.len();
    if len > 80 {
        chars.truncate(77);
        chars.extend(['.', '.', '.']);
    } else if len > 1 && chars[len - 1] == '.' && chars[len - 2].is_alphanumeric() {
        chars.pop();
    }
    chars.into_iter().collect()
}

// MARK: --- UNIT TESTS ---
