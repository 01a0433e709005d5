// src/param.rs
//
// Classification of an action's declared parameter shapes into the single
// trailing-positional arity tag, plus the usage-string suffixes derived from
// it. Both help rendering and argument-count validation go through here.

use std::fmt;

use crate::errors::BuildError;
use crate::models::Descriptor;
use crate::strings::normalize_to_kebab_case;

/// The cardinality of a command's trailing positional parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No trailing parameter: extra arguments are an error.
    None,
    /// Exactly one trailing string argument.
    Required,
    /// Zero or one trailing string argument.
    Optional,
    /// Exactly `n` trailing string arguments.
    FixedLength(usize),
    /// Zero or more trailing string arguments.
    ArbitraryLength,
}

impl Arity {
    pub(crate) fn accepts(self, n: usize) -> bool {
        match self {
            Self::None => n == 0,
            Self::Required => n == 1,
            Self::Optional => n <= 1,
            Self::FixedLength(want) => n == want,
            Self::ArbitraryLength => true,
        }
    }

    /// Human description of the accepted argument count, for usage errors.
    pub(crate) fn expected(self) -> String {
        match self {
            Self::None => "no arguments".to_string(),
            Self::Required => "exactly 1 argument".to_string(),
            Self::Optional => "at most 1 argument".to_string(),
            Self::FixedLength(want) => format!("exactly {want} argument(s)"),
            Self::ArbitraryLength => "any number of arguments".to_string(),
        }
    }

    fn suffix(self, name: &str) -> String {
        match self {
            Self::None => String::new(),
            Self::Required => format!(" <{name}>"),
            Self::Optional => format!(" [{name}]"),
            Self::FixedLength(_) => format!(" <{name}...>"),
            Self::ArbitraryLength => format!(" [{name}...]"),
        }
    }
}

/// One declared parameter of an action, in declaration order. This is the
/// closed taxonomy: a cancellation token, an options descriptor, or one of
/// the four recognized trailing-positional shapes.
#[derive(Clone)]
pub enum ParamShape {
    /// The action wants the cancellation token forwarded.
    Context,
    /// The action wants a populated options instance for this descriptor.
    Options(Descriptor),
    /// One required trailing string.
    Str,
    /// Zero or one trailing string.
    OptStr,
    /// Exactly `n` trailing strings.
    StrArray(usize),
    /// Zero or more trailing strings.
    StrVec,
}

impl ParamShape {
    pub(crate) fn arity(&self) -> Arity {
        match self {
            Self::Context | Self::Options(_) => Arity::None,
            Self::Str => Arity::Required,
            Self::OptStr => Arity::Optional,
            Self::StrArray(n) => Arity::FixedLength(*n),
            Self::StrVec => Arity::ArbitraryLength,
        }
    }
}

impl fmt::Debug for ParamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => write!(f, "context"),
            Self::Options(d) => write!(f, "options({})", d.name()),
            Self::Str => write!(f, "string"),
            Self::OptStr => write!(f, "optional string"),
            Self::StrArray(n) => write!(f, "[string; {n}]"),
            Self::StrVec => write!(f, "string..."),
        }
    }
}

fn render_shape(shapes: &[ParamShape]) -> String {
    let parts: Vec<String> = shapes.iter().map(|s| format!("{s:?}")).collect();
    format!("({})", parts.join(", "))
}

/// The classified signature of an action: which leading parameters it takes
/// and the arity of its single permitted trailing positional parameter.
#[derive(Debug, Clone)]
pub(crate) struct Signature {
    pub wants_context: bool,
    pub options: Option<Descriptor>,
    pub trailing: Arity,
}

#[derive(PartialEq, PartialOrd)]
enum Position {
    Start,
    AfterContext,
    AfterOptions,
    AfterTrailing,
}

/// Classifies an ordered parameter-shape list. The accepted form is, all
/// parts optional and in this order: context, options, one trailing shape.
/// Anything else is a construction-time error naming the rejected shape.
pub(crate) fn classify(action: &str, shapes: &[ParamShape]) -> Result<Signature, BuildError> {
    let reject = |reason: &str| BuildError::Signature {
        action: action.to_string(),
        shape: render_shape(shapes),
        reason: reason.to_string(),
    };
    let mut signature = Signature {
        wants_context: false,
        options: None,
        trailing: Arity::None,
    };
    let mut position = Position::Start;
    for shape in shapes {
        match shape {
            ParamShape::Context => {
                if position >= Position::AfterContext {
                    return Err(reject("the context parameter must come first"));
                }
                signature.wants_context = true;
                position = Position::AfterContext;
            }
            ParamShape::Options(descriptor) => {
                if position >= Position::AfterOptions {
                    return Err(reject(
                        "the options parameter must come before the trailing parameter \
                         and may appear only once",
                    ));
                }
                signature.options = Some(descriptor.clone());
                position = Position::AfterOptions;
            }
            trailing => {
                if position >= Position::AfterTrailing {
                    return Err(reject("at most one trailing parameter is allowed"));
                }
                if matches!(trailing, ParamShape::StrArray(0)) {
                    return Err(reject("a fixed-length trailing parameter must be non-empty"));
                }
                signature.trailing = trailing.arity();
                position = Position::AfterTrailing;
            }
        }
    }
    Ok(signature)
}

/// Renders the usage suffix for an action from its metadata parameter names
/// and its declared shapes (the two lists are parallel). Context and options
/// parameters contribute nothing; trailing parameters render as ` <name>`,
/// ` [name]`, ` <name...>` or ` [name...]` with the name in kebab-case.
pub(crate) fn params_usage(names: &[String], shapes: &[ParamShape]) -> String {
    let mut usage = String::new();
    for (name, shape) in names.iter().zip(shapes.iter()) {
        usage.push_str(&shape.arity().suffix(&normalize_to_kebab_case(name)));
    }
    usage
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    fn options_descriptor() -> Descriptor {
        Descriptor::new("Opts")
    }

    #[test]
    fn test_classify_full_signature() {
        let shapes = vec![
            ParamShape::Context,
            ParamShape::Options(options_descriptor()),
            ParamShape::StrArray(3),
        ];
        let sig = classify("squash", &shapes).expect("should classify");
        assert!(sig.wants_context);
        assert!(sig.options.is_some());
        assert_eq!(sig.trailing, Arity::FixedLength(3));
    }

    #[test]
    fn test_classify_empty_signature() {
        let sig = classify("noop", &[]).expect("should classify");
        assert!(!sig.wants_context);
        assert!(sig.options.is_none());
        assert_eq!(sig.trailing, Arity::None);
    }

    #[test]
    fn test_classify_rejects_context_after_options() {
        let shapes = vec![
            ParamShape::Options(options_descriptor()),
            ParamShape::Context,
        ];
        let err = classify("bad", &shapes).expect_err("should reject");
        assert!(err.to_string().contains("context parameter must come first"));
    }

    #[test]
    fn test_classify_rejects_two_trailing_parameters() {
        let shapes = vec![ParamShape::Str, ParamShape::StrVec];
        let err = classify("bad", &shapes).expect_err("should reject");
        assert!(err.to_string().contains("at most one trailing parameter"));
    }

    #[test]
    fn test_classify_rejects_options_after_trailing() {
        let shapes = vec![ParamShape::Str, ParamShape::Options(options_descriptor())];
        assert!(classify("bad", &shapes).is_err());
    }

    #[test]
    fn test_classify_rejects_empty_fixed_length() {
        assert!(classify("bad", &[ParamShape::StrArray(0)]).is_err());
    }

    #[test]
    fn test_params_usage_suffixes() {
        let names = vec!["dir".to_string()];
        assert_eq!(params_usage(&names, &[ParamShape::Str]), " <dir>");
        assert_eq!(params_usage(&names, &[ParamShape::OptStr]), " [dir]");
        assert_eq!(params_usage(&names, &[ParamShape::StrArray(3)]), " <dir...>");
        assert_eq!(params_usage(&names, &[ParamShape::StrVec]), " [dir...]");
    }

    #[test]
    fn test_params_usage_skips_context_and_options() {
        let names = vec!["ctx".to_string(), "opts".to_string(), "someDir".to_string()];
        let shapes = vec![
            ParamShape::Context,
            ParamShape::Options(options_descriptor()),
            ParamShape::Str,
        ];
        assert_eq!(params_usage(&names, &shapes), " <some-dir>");
    }

    #[test]
    fn test_arity_accepts_counts() {
        assert!(Arity::None.accepts(0) && !Arity::None.accepts(1));
        assert!(Arity::Required.accepts(1) && !Arity::Required.accepts(0));
        assert!(Arity::Optional.accepts(0) && Arity::Optional.accepts(1));
        assert!(!Arity::Optional.accepts(2));
        assert!(Arity::FixedLength(3).accepts(3) && !Arity::FixedLength(3).accepts(2));
        assert!(Arity::ArbitraryLength.accepts(0) && Arity::ArbitraryLength.accepts(9));
    }
}
