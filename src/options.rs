// src/options.rs
//
// The option declarator: walks a descriptor's fields and turns scalar and
// list fields into flags (name normalization, shorthand derivation, default
// parsing, help text from metadata), while collecting the nested fields for
// the tree builder to resolve as mounts or the parent link.

use crate::errors::BuildError;
use crate::flagset::{Flag, FlagKind, FlagSet};
use crate::metadata::Doc;
use crate::models::{Descriptor, Field, FieldKind, Instance, ShortTag};
use crate::strings::normalize_to_kebab_case;
use crate::value::{self, Value};

/// A nested-descriptor field to be mounted as a subcommand.
#[derive(Debug)]
pub(crate) struct Mount {
    pub field: String,
    pub descriptor: Descriptor,
}

/// The parent-link field, to be resolved against the build stack.
#[derive(Debug)]
pub(crate) struct ParentLink {
    pub field: String,
    pub target: Descriptor,
}

/// What declaring a descriptor's fields produced, beyond the flags.
#[derive(Debug, Default)]
pub(crate) struct Declared {
    pub mounts: Vec<Mount>,
    pub parent_link: Option<ParentLink>,
}

/// Declares every field of `descriptor` into `set`, binding flag values to
/// slots of `target`. Defaults are parsed here and written as the slots'
/// initial values; fields without an explicit default start at their kind's
/// zero value. Flag help text comes from the field's metadata node.
pub(crate) fn declare(
    descriptor: &Descriptor,
    doc: Doc<'_>,
    target: &Instance,
    set: &mut FlagSet,
) -> Result<Declared, BuildError> {
    let owner = descriptor.name();
    let mut declared = Declared::default();
    for field in &descriptor.borrow().fields {
        let kind = match &field.kind {
            FieldKind::Scalar(scalar) => FlagKind::Scalar(*scalar),
            FieldKind::List(scalar) => FlagKind::List(*scalar),
            FieldKind::Nested {
                descriptor: nested,
                parent_link,
            } => {
                if !parent_link {
                    declared.mounts.push(Mount {
                        field: field.name.clone(),
                        descriptor: nested.clone(),
                    });
                    continue;
                }
                if let Some(first) = &declared.parent_link {
                    return Err(BuildError::DuplicateParentLink {
                        descriptor: owner,
                        first: first.field.clone(),
                        second: field.name.clone(),
                    });
                }
                declared.parent_link = Some(ParentLink {
                    field: field.name.clone(),
                    target: nested.clone(),
                });
                continue;
            }
        };
        let flag = build_flag(&owner, field, kind, doc, target)?;
        set.declare(&owner, flag)?;
    }
    Ok(declared)
}

fn build_flag(
    owner: &str,
    field: &Field,
    kind: FlagKind,
    doc: Doc<'_>,
    target: &Instance,
) -> Result<Flag, BuildError> {
    let name = normalize_to_kebab_case(&field.name);
    if name.is_empty() {
        return Err(BuildError::EmptyFlagName {
            descriptor: owner.to_string(),
            field: field.name.clone(),
        });
    }
    let shorthand = match field.short {
        ShortTag::Absent => None,
        ShortTag::FirstLetter => name.chars().next(),
        ShortTag::Explicit(c) => Some(c),
    };
    let default = match &field.default {
        Some(raw) => {
            let parsed = match kind {
                FlagKind::Scalar(scalar) => value::parse_scalar(scalar, raw),
                FlagKind::List(scalar) => value::parse_list(scalar, raw),
            }
            .map_err(|source| BuildError::Default {
                descriptor: owner.to_string(),
                field: field.name.clone(),
                source,
            })?;
            Some(parsed)
        }
        None => None,
    };
    // The slot always starts populated, at the explicit default or the
    // kind's zero value, so actions read a total view.
    let initial = match (&default, kind) {
        (Some(v), _) => v.clone(),
        (None, FlagKind::Scalar(scalar)) => scalar.zero(),
        (None, FlagKind::List(_)) => Value::List(Vec::new()),
    };
    target.set(&field.name, initial);
    log::debug!("declared flag --{name} for '{owner}'");
    // The long doc verbatim when the field has one, the short text otherwise.
    let field_doc = doc.child(&field.name);
    let usage = if field_doc.long().is_empty() {
        field_doc.short()
    } else {
        field_doc.long().to_string()
    };
    Ok(Flag {
        usage,
        name,
        shorthand,
        kind,
        default,
        required: field.required,
        field: field.name.clone(),
        target: target.clone(),
    })
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Metadata, RawMetadata};
    use crate::value::Scalar;

    fn declare_all(descriptor: &Descriptor, doc: Doc<'_>) -> (Instance, FlagSet, Declared) {
        let target = Instance::new();
        let mut set = FlagSet::default();
        let declared =
            declare(descriptor, doc, &target, &mut set).expect("should declare");
        (target, set, declared)
    }

    #[test]
    fn test_declare_normalizes_and_initializes() {
        let d = Descriptor::new("GreetOptions");
        d.field(Field::string("Greeting").default_value("Hello").short_auto())
            .field(Field::int("Times"));
        let (target, set, declared) = declare_all(&d, Doc::empty());
        assert!(declared.mounts.is_empty());

        let greeting = set.get("greeting").expect("should exist");
        assert_eq!(greeting.shorthand, Some('g'));
        assert_eq!(greeting.default, Some(Value::Str("Hello".to_string())));
        assert_eq!(target.get("Greeting"), Some(Value::Str("Hello".to_string())));

        let times = set.get("times").expect("should exist");
        assert_eq!(times.shorthand, None);
        assert_eq!(times.default, None);
        assert_eq!(target.get("Times"), Some(Value::Int(0)));
    }

    #[test]
    fn test_declare_flag_usage_from_metadata_comment() {
        let mut node = RawMetadata::default();
        node.child("Greeting").set_comment("greeting to use");
        let md = Metadata::from_raw(node);
        let d = Descriptor::new("GreetOptions");
        d.field(Field::string("Greeting"));
        let (_, set, _) = declare_all(&d, md.lookup(""));
        assert_eq!(set.get("greeting").expect("should exist").usage, "greeting to use");
    }

    #[test]
    fn test_declare_flag_usage_prefers_long_doc_verbatim() {
        let long = "Greeting to use.\nMust be a salutation the recipient understands; \
                    the default works for most locales but not all of them.";
        let mut node = RawMetadata::default();
        node.child("Greeting").set_doc(long).expect("should parse");
        node.child("Greeting").set_comment("short form");
        let md = Metadata::from_raw(node);
        let d = Descriptor::new("GreetOptions");
        d.field(Field::string("Greeting"));
        let (_, set, _) = declare_all(&d, md.lookup(""));
        // Not collapsed, not truncated, comment not consulted.
        assert_eq!(set.get("greeting").expect("should exist").usage, long);
    }

    #[test]
    fn test_declare_rejects_bad_default() {
        let d = Descriptor::new("Opts");
        d.field(Field::int("Times").default_value("lots"));
        let target = Instance::new();
        let mut set = FlagSet::default();
        let err = declare(&d, Doc::empty(), &target, &mut set).expect_err("should reject");
        assert!(matches!(err, BuildError::Default { .. }));
        assert!(err.to_string().contains("invalid default"));
    }

    #[test]
    fn test_declare_rejects_empty_flag_name() {
        let d = Descriptor::new("Opts");
        d.field(Field::bool("___"));
        let target = Instance::new();
        let mut set = FlagSet::default();
        let err = declare(&d, Doc::empty(), &target, &mut set).expect_err("should reject");
        assert!(matches!(err, BuildError::EmptyFlagName { .. }));
    }

    #[test]
    fn test_declare_rejects_colliding_names() {
        let d = Descriptor::new("Opts");
        d.field(Field::bool("DryRun")).field(Field::bool("dry_run"));
        let target = Instance::new();
        let mut set = FlagSet::default();
        let err = declare(&d, Doc::empty(), &target, &mut set).expect_err("should reject");
        assert!(matches!(err, BuildError::DuplicateFlag { .. }));
    }

    #[test]
    fn test_declare_rejects_duplicate_shorthand() {
        let d = Descriptor::new("Opts");
        d.field(Field::bool("Verbose").short_auto())
            .field(Field::bool("Version").short('v'));
        let target = Instance::new();
        let mut set = FlagSet::default();
        let err = declare(&d, Doc::empty(), &target, &mut set).expect_err("should reject");
        assert!(matches!(err, BuildError::DuplicateShorthand { shorthand: 'v', .. }));
    }

    #[test]
    fn test_declare_collects_mounts_and_parent_link() {
        let parent = Descriptor::new("Root");
        let child = Descriptor::new("Sub");
        child.parent_link("Root", &parent);
        parent.subcommand("Sub", &child);

        let (_, set, declared) = declare_all(&parent, Doc::empty());
        assert!(set.is_empty());
        assert_eq!(declared.mounts.len(), 1);
        assert_eq!(declared.mounts[0].field, "Sub");

        let (_, _, declared) = declare_all(&child, Doc::empty());
        let link = declared.parent_link.expect("should link");
        assert_eq!(link.field, "Root");
        assert_eq!(link.target.name(), "Root");
    }

    #[test]
    fn test_declare_rejects_two_parent_links() {
        let a = Descriptor::new("A");
        let b = Descriptor::new("B");
        let child = Descriptor::new("Sub");
        child.parent_link("A", &a).parent_link("B", &b);
        let target = Instance::new();
        let mut set = FlagSet::default();
        let err = declare(&child, Doc::empty(), &target, &mut set).expect_err("should reject");
        assert!(matches!(err, BuildError::DuplicateParentLink { .. }));
    }

    #[test]
    fn test_declare_list_field() {
        let d = Descriptor::new("Opts");
        d.field(Field::list("Tags", Scalar::Str).default_value("a,b"));
        let (target, set, _) = declare_all(&d, Doc::empty());
        assert_eq!(set.get("tags").expect("should exist").kind, FlagKind::List(Scalar::Str));
        assert_eq!(
            target.get("Tags"),
            Some(Value::List(vec![
                Value::Str("a".to_string()),
                Value::Str("b".to_string()),
            ]))
        );
    }
}
