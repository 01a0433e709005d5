// src/models.rs
//
// The declarative data model: descriptors enumerate fields and actions via
// builder calls (no runtime reflection), and `Instance` is the shared flag
// storage that an invocation populates and an action reads back.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::CancellationToken;
use crate::param::ParamShape;
use crate::value::{Scalar, Value};

// --- FIELDS ---

/// How a field's shorthand is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShortTag {
    /// No shorthand.
    Absent,
    /// First letter of the normalized flag name.
    FirstLetter,
    /// An explicit character, used verbatim.
    Explicit(char),
}

/// The value kind of a descriptor field.
#[derive(Clone)]
pub(crate) enum FieldKind {
    Scalar(Scalar),
    List(Scalar),
    Nested {
        descriptor: Descriptor,
        parent_link: bool,
    },
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => write!(f, "{s:?}"),
            Self::List(s) => write!(f, "[{s:?}]"),
            Self::Nested {
                descriptor,
                parent_link,
            } => {
                if *parent_link {
                    write!(f, "parent-link({})", descriptor.name())
                } else {
                    write!(f, "subcommand({})", descriptor.name())
                }
            }
        }
    }
}

/// One declared descriptor field: a logical name, a value kind and its tag
/// attributes. Scalar and list fields become flags; nested fields become
/// subcommand mounts or the parent link.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) default: Option<String>,
    pub(crate) short: ShortTag,
    pub(crate) required: bool,
}

impl Field {
    fn with_kind(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
            short: ShortTag::Absent,
            required: false,
        }
    }

    /// A boolean field.
    pub fn bool(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Scalar(Scalar::Bool))
    }

    /// A signed integer field.
    pub fn int(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Scalar(Scalar::Int))
    }

    /// An unsigned integer field.
    pub fn uint(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Scalar(Scalar::Uint))
    }

    /// A floating-point field.
    pub fn float(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Scalar(Scalar::Float))
    }

    /// A string field.
    pub fn string(name: &str) -> Self {
        Self::with_kind(name, FieldKind::Scalar(Scalar::Str))
    }

    /// A list field with the given element kind.
    pub fn list(name: &str, element: Scalar) -> Self {
        Self::with_kind(name, FieldKind::List(element))
    }

    /// Sets the raw default value, parsed with the field kind's parser at
    /// tree-construction time (a parse failure there is fatal).
    pub fn default_value(mut self, raw: &str) -> Self {
        self.default = Some(raw.to_string());
        self
    }

    /// Requests a shorthand equal to the first letter of the flag name.
    pub fn short_auto(mut self) -> Self {
        self.short = ShortTag::FirstLetter;
        self
    }

    /// Sets an explicit shorthand character, used verbatim.
    pub fn short(mut self, shorthand: char) -> Self {
        self.short = ShortTag::Explicit(shorthand);
        self
    }

    /// Marks the flag required: parsing fails (before the action runs) when
    /// the flag is not explicitly provided.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

// --- ACTIONS ---

/// The fixed calling convention every action is registered with.
pub type Handler = Rc<dyn Fn(Request<'_>) -> anyhow::Result<()>>;

/// A callable bound to a descriptor (or standalone) that implements one
/// command's behavior. The declared parameter shapes drive usage rendering
/// and argument validation; the handler receives an assembled [`Request`].
#[derive(Clone)]
pub struct Action {
    pub(crate) name: String,
    pub(crate) shape: Vec<ParamShape>,
    pub(crate) handler: Handler,
}

impl Action {
    /// Registers an action under `name` with the given ordered parameter
    /// shapes. An action named `execute` (case-insensitive) becomes its
    /// descriptor's own run operation instead of a subcommand.
    pub fn new<F>(name: &str, shape: Vec<ParamShape>, handler: F) -> Self
    where
        F: Fn(Request<'_>) -> anyhow::Result<()> + 'static,
    {
        Self {
            name: name.to_string(),
            shape,
            handler: Rc::new(handler),
        }
    }

    pub(crate) fn is_execute(&self) -> bool {
        self.name.eq_ignore_ascii_case("execute")
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

// --- DESCRIPTORS ---

#[derive(Debug, Default)]
pub(crate) struct DescriptorInner {
    pub(crate) name: String,
    pub(crate) doc_path: String,
    pub(crate) fields: Vec<Field>,
    pub(crate) actions: Vec<Action>,
}

/// A declarative description of one command node: fields become flags, bound
/// actions become subcommands, nested descriptors become mounts or the
/// parent link.
///
/// `Descriptor` is a cheap handle; clones share identity. Identity is what
/// the tree builder memoizes on, so deliberately mounting the same
/// descriptor in two places shares one flag-storage instance.
#[derive(Clone)]
pub struct Descriptor {
    inner: Rc<RefCell<DescriptorInner>>,
}

impl Descriptor {
    /// Creates a descriptor with the given logical name. The name doubles as
    /// the default metadata lookup path.
    pub fn new(name: &str) -> Self {
        Self {
            inner: Rc::new(RefCell::new(DescriptorInner {
                name: name.to_string(),
                doc_path: name.to_string(),
                fields: Vec::new(),
                actions: Vec::new(),
            })),
        }
    }

    /// Overrides the metadata lookup path (e.g. `"mypkg.Jj"`).
    pub fn doc_path(&self, path: &str) -> &Self {
        self.inner.borrow_mut().doc_path = path.to_string();
        self
    }

    /// Appends a field. Declaration order is preserved; it affects help
    /// display order only, never semantics.
    pub fn field(&self, field: Field) -> &Self {
        self.inner.borrow_mut().fields.push(field);
        self
    }

    /// Appends a nested-descriptor-reference field mounting `sub` as a
    /// subcommand of this descriptor.
    pub fn subcommand(&self, name: &str, sub: &Descriptor) -> &Self {
        self.inner.borrow_mut().fields.push(Field::with_kind(
            name,
            FieldKind::Nested {
                descriptor: sub.clone(),
                parent_link: false,
            },
        ));
        self
    }

    /// Appends the parent-link field: at build time `target` must be an
    /// ancestor of this descriptor in the tree being composed, and its
    /// populated instance becomes reachable through [`OptionsView::parent`].
    /// At most one parent-link field may exist per descriptor.
    pub fn parent_link(&self, name: &str, target: &Descriptor) -> &Self {
        self.inner.borrow_mut().fields.push(Field::with_kind(
            name,
            FieldKind::Nested {
                descriptor: target.clone(),
                parent_link: true,
            },
        ));
        self
    }

    /// Appends a bound action.
    pub fn action(&self, action: Action) -> &Self {
        self.inner.borrow_mut().actions.push(action);
        self
    }

    /// The descriptor's logical name.
    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub(crate) fn borrow(&self) -> Ref<'_, DescriptorInner> {
        self.inner.borrow()
    }

    /// Pointer identity, the memoization key for tree construction.
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Descriptor")
            .field("name", &inner.name)
            .field("doc_path", &inner.doc_path)
            .field("fields", &inner.fields.len())
            .field("actions", &inner.actions.len())
            .finish()
    }
}

// --- INSTANCES ---

#[derive(Debug, Default)]
struct InstanceState {
    values: RefCell<HashMap<String, Value>>,
    parent: RefCell<Option<Instance>>,
}

/// The populated flag storage of one descriptor identity within a built
/// tree. Shared (`Rc`) so that every mount point of a descriptor sees the
/// same values. Not mutated concurrently: one command invocation per run.
#[derive(Clone, Default)]
pub struct Instance(Rc<InstanceState>);

impl Instance {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, field: &str, value: Value) {
        self.0.values.borrow_mut().insert(field.to_string(), value);
    }

    /// The current value of a field slot, by logical field name.
    pub fn get(&self, field: &str) -> Option<Value> {
        self.0.values.borrow().get(field).cloned()
    }

    pub(crate) fn set_parent(&self, parent: Instance) {
        *self.0.parent.borrow_mut() = Some(parent);
    }

    /// The ancestor instance wired in through the parent-link field, if any.
    pub fn parent(&self) -> Option<Instance> {
        self.0.parent.borrow().clone()
    }

    pub(crate) fn same_storage(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance")
            .field(&self.0.values.borrow())
            .finish()
    }
}

// --- REQUESTS ---

/// Everything an action invocation receives: the forwarded cancellation
/// token, the populated options view(s) and the validated positional args.
pub struct Request<'a> {
    pub(crate) context: &'a CancellationToken,
    pub(crate) options: Option<Instance>,
    pub(crate) receiver: Option<Instance>,
    pub(crate) args: Vec<String>,
}

impl Request<'_> {
    /// The cancellation token driven by the caller of the top-level run.
    pub fn context(&self) -> &CancellationToken {
        self.context
    }

    /// A view of the action's own options descriptor instance.
    pub fn options(&self) -> OptionsView {
        OptionsView(self.options.clone())
    }

    /// A view of the owning descriptor's instance (the action's receiver).
    pub fn receiver(&self) -> OptionsView {
        OptionsView(self.receiver.clone())
    }

    /// The trailing positional arguments, already validated per arity.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The i-th positional argument, if present.
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).map(String::as_str)
    }
}

impl fmt::Debug for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("options", &self.options)
            .field("receiver", &self.receiver)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Typed, absence-tolerant accessors over an optional [`Instance`]. A getter
/// returns `None` when the instance is absent, the field is unknown, or the
/// stored value has a different kind.
#[derive(Debug, Clone, Default)]
pub struct OptionsView(Option<Instance>);

impl OptionsView {
    pub(crate) fn over(instance: Option<Instance>) -> Self {
        Self(instance)
    }

    /// Whether there is a backing instance at all.
    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    /// The backing instance, for identity checks and raw access.
    pub fn instance(&self) -> Option<&Instance> {
        self.0.as_ref()
    }

    /// A view of the parent-linked ancestor instance.
    pub fn parent(&self) -> OptionsView {
        OptionsView(self.0.as_ref().and_then(Instance::parent))
    }

    fn value(&self, field: &str) -> Option<Value> {
        self.0.as_ref().and_then(|i| i.get(field))
    }

    /// The boolean value of a field.
    pub fn bool_value(&self, field: &str) -> Option<bool> {
        match self.value(field)? {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// The signed integer value of a field.
    pub fn int_value(&self, field: &str) -> Option<i64> {
        match self.value(field)? {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The unsigned integer value of a field.
    pub fn uint_value(&self, field: &str) -> Option<u64> {
        match self.value(field)? {
            Value::Uint(v) => Some(v),
            _ => None,
        }
    }

    /// The floating-point value of a field.
    pub fn float_value(&self, field: &str) -> Option<f64> {
        match self.value(field)? {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    /// The string value of a field.
    pub fn str_value(&self, field: &str) -> Option<String> {
        match self.value(field)? {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// The list value of a field.
    pub fn list_value(&self, field: &str) -> Option<Vec<Value>> {
        match self.value(field)? {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}
