// src/flagset.rs
//
// The low-level flag-set engine: typed flag registration plus parsing of the
// input tokens against a chain of flag-sets (ancestors' inherited sets first,
// the invoked command's own sets last). The engine only moves values into
// `Instance` storage; which flags exist and where values land is decided by
// the option declarator.

use std::collections::HashSet;

use crate::errors::{BuildError, usage_error, usage_msg};
use crate::models::Instance;
use crate::value::{self, Scalar, Value};

/// The value kind of one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlagKind {
    Scalar(Scalar),
    List(Scalar),
}

impl FlagKind {
    pub(crate) fn is_bool(self) -> bool {
        matches!(self, Self::Scalar(Scalar::Bool))
    }

    /// The type column token in help output.
    pub(crate) fn type_token(self) -> &'static str {
        match self {
            Self::Scalar(s) => s.type_token(),
            Self::List(Scalar::Bool) => "bools",
            Self::List(Scalar::Int) => "ints",
            Self::List(Scalar::Uint) => "uints",
            Self::List(Scalar::Float) => "floats",
            Self::List(Scalar::Str) => "strings",
        }
    }
}

/// One declared flag, bound to an `Instance` slot.
#[derive(Debug)]
pub(crate) struct Flag {
    pub(crate) name: String,
    pub(crate) shorthand: Option<char>,
    pub(crate) kind: FlagKind,
    /// The explicit default, tracked separately from the zero value the slot
    /// is initialized with; only explicit defaults are annotated in help.
    pub(crate) default: Option<Value>,
    pub(crate) required: bool,
    pub(crate) usage: String,
    pub(crate) field: String,
    pub(crate) target: Instance,
}

impl Flag {
    /// Parses a raw token value and stores it into the bound slot. A list
    /// flag replaces its default on first use and appends on repeats.
    fn assign(&self, raw: &str, first_use: bool) -> anyhow::Result<()> {
        let wrap = |e: value::ValueError| {
            usage_error(anyhow::anyhow!("invalid value for flag --{}: {e}", self.name))
        };
        match self.kind {
            FlagKind::Scalar(scalar) => {
                let parsed = value::parse_scalar(scalar, raw).map_err(wrap)?;
                self.target.set(&self.field, parsed);
            }
            FlagKind::List(scalar) => {
                let Value::List(mut new) = value::parse_list(scalar, raw).map_err(wrap)? else {
                    return Ok(());
                };
                if !first_use {
                    if let Some(Value::List(mut existing)) = self.target.get(&self.field) {
                        existing.append(&mut new);
                        new = existing;
                    }
                }
                self.target.set(&self.field, Value::List(new));
            }
        }
        Ok(())
    }
}

/// An ordered set of flags owned by one command node.
#[derive(Debug, Default)]
pub(crate) struct FlagSet {
    flags: Vec<Flag>,
}

impl FlagSet {
    /// Registers a flag; name and shorthand must be unique within the set.
    /// `owner` names the descriptor for error messages.
    pub(crate) fn declare(&mut self, owner: &str, flag: Flag) -> Result<(), BuildError> {
        if self.get(&flag.name).is_some() {
            return Err(BuildError::DuplicateFlag {
                descriptor: owner.to_string(),
                field: flag.field.clone(),
                flag: flag.name.clone(),
            });
        }
        if let Some(shorthand) = flag.shorthand {
            if self.get_short(shorthand).is_some() {
                return Err(BuildError::DuplicateShorthand {
                    descriptor: owner.to_string(),
                    field: flag.field.clone(),
                    shorthand,
                });
            }
        }
        self.flags.push(flag);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.name == name)
    }

    pub(crate) fn get_short(&self, shorthand: char) -> Option<&Flag> {
        self.flags.iter().find(|f| f.shorthand == Some(shorthand))
    }

    pub(crate) fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

pub(crate) fn lookup<'a>(chain: &[&'a FlagSet], name: &str) -> Option<&'a Flag> {
    chain.iter().rev().find_map(|set| set.get(name))
}

pub(crate) fn lookup_short<'a>(chain: &[&'a FlagSet], shorthand: char) -> Option<&'a Flag> {
    chain.iter().rev().find_map(|set| set.get_short(shorthand))
}

/// What parsing the input tokens produced.
#[derive(Debug, Default)]
pub(crate) struct Parsed {
    /// Tokens that were not flags or flag values, in order.
    pub positionals: Vec<String>,
    /// Flags explicitly provided this run, by normalized name.
    pub provided: HashSet<String>,
    /// Whether `-h` / `--help` was requested.
    pub help: bool,
}

/// Parses input tokens against a chain of flag-sets, storing flag values as
/// it goes. Supports `--name value`, `--name=value`, `-s value`, `-s=value`,
/// an attached shorthand value (`-t3`), grouped boolean shorthands (`-ab`),
/// valueless booleans and the `--` terminator. Unknown flags, missing values
/// and unparsable values are usage errors.
pub(crate) fn parse_args(chain: &[&FlagSet], args: &[String]) -> anyhow::Result<Parsed> {
    let mut parsed = Parsed::default();
    let mut tokens = args.iter().peekable();
    let mut rest_positional = false;
    while let Some(token) = tokens.next() {
        if rest_positional {
            parsed.positionals.push(token.clone());
            continue;
        }
        if token == "--" {
            rest_positional = true;
            continue;
        }
        if token == "--help" || token == "-h" {
            parsed.help = true;
            continue;
        }
        if let Some(body) = token.strip_prefix("--") {
            let (name, inline) = match body.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (body, None),
            };
            let flag = lookup(chain, name)
                .ok_or_else(|| usage_msg(format!("unknown flag: --{name}")))?;
            assign_from_tokens(flag, inline, &mut tokens, &mut parsed)?;
        } else if let Some(body) = token.strip_prefix("-") {
            if body.is_empty() {
                parsed.positionals.push(token.clone());
                continue;
            }
            // A shorthand token may carry an attached value (`-t3`, `-t=3`)
            // or group boolean shorthands (`-ab`). Only the last shorthand
            // in a group may take a value.
            let mut remaining = body;
            loop {
                let mut chars = remaining.chars();
                let Some(shorthand) = chars.next() else { break };
                let after = chars.as_str();
                let flag = lookup_short(chain, shorthand)
                    .ok_or_else(|| usage_msg(format!("unknown shorthand flag: -{shorthand}")))?;
                if let Some(value) = after.strip_prefix('=') {
                    assign_from_tokens(flag, Some(value), &mut tokens, &mut parsed)?;
                    break;
                }
                if flag.kind.is_bool() {
                    assign_from_tokens(flag, None, &mut tokens, &mut parsed)?;
                    remaining = after;
                    continue;
                }
                if after.is_empty() {
                    assign_from_tokens(flag, None, &mut tokens, &mut parsed)?;
                } else {
                    assign_from_tokens(flag, Some(after), &mut tokens, &mut parsed)?;
                }
                break;
            }
        } else {
            parsed.positionals.push(token.clone());
        }
    }
    Ok(parsed)
}

fn assign_from_tokens(
    flag: &Flag,
    inline: Option<&str>,
    tokens: &mut std::iter::Peekable<std::slice::Iter<'_, String>>,
    parsed: &mut Parsed,
) -> anyhow::Result<()> {
    let raw = match inline {
        Some(value) => value.to_string(),
        None if flag.kind.is_bool() => "true".to_string(),
        None => match tokens.next() {
            Some(value) => value.clone(),
            None => {
                return Err(usage_msg(format!("flag needs an argument: --{}", flag.name)));
            }
        },
    };
    let first_use = parsed.provided.insert(flag.name.clone());
    flag.assign(&raw, first_use)
}

/// Checks required flags across the chain, after parsing and before the
/// bound action runs. Required means explicitly provided this run.
pub(crate) fn check_required(chain: &[&FlagSet], provided: &HashSet<String>) -> anyhow::Result<()> {
    let mut missing = Vec::new();
    for set in chain {
        for flag in set.flags() {
            if flag.required && !provided.contains(&flag.name) {
                missing.push(format!("\"{}\"", flag.name));
            }
        }
    }
    if missing.is_empty() {
        return Ok(());
    }
    Err(usage_msg(format!(
        "required flag(s) {} not set",
        missing.join(", ")
    )))
}

// MARK: --- UNIT TESTS ---

#[cfg(test)]
mod tests {
    use super::*;

    fn to_args(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn flag(name: &str, shorthand: Option<char>, kind: FlagKind, target: &Instance) -> Flag {
        Flag {
            name: name.to_string(),
            shorthand,
            kind,
            default: None,
            required: false,
            usage: String::new(),
            field: name.to_string(),
            target: target.clone(),
        }
    }

    fn one_set(flags: Vec<Flag>) -> FlagSet {
        let mut set = FlagSet::default();
        for f in flags {
            set.declare("test", f).expect("should declare");
        }
        set
    }

    #[test]
    fn test_parse_long_and_short_forms() {
        let target = Instance::new();
        let set = one_set(vec![
            flag("times", Some('t'), FlagKind::Scalar(Scalar::Int), &target),
            flag("name", Some('n'), FlagKind::Scalar(Scalar::Str), &target),
        ]);
        let parsed = parse_args(&[&set], &to_args(&["--times=3", "-n", "World", "extra"]))
            .expect("should parse");
        assert_eq!(target.get("times"), Some(Value::Int(3)));
        assert_eq!(target.get("name"), Some(Value::Str("World".to_string())));
        assert_eq!(parsed.positionals, vec!["extra"]);
        assert!(parsed.provided.contains("times"));
        assert!(parsed.provided.contains("name"));
    }

    #[test]
    fn test_parse_bool_is_valueless() {
        let target = Instance::new();
        let set = one_set(vec![flag("loud", Some('l'), FlagKind::Scalar(Scalar::Bool), &target)]);
        parse_args(&[&set], &to_args(&["--loud", "positional"])).expect("should parse");
        assert_eq!(target.get("loud"), Some(Value::Bool(true)));

        parse_args(&[&set], &to_args(&["--loud=false"])).expect("should parse");
        assert_eq!(target.get("loud"), Some(Value::Bool(false)));
    }

    #[test]
    fn test_parse_shorthand_attached_value() {
        let target = Instance::new();
        let set = one_set(vec![flag("times", Some('t'), FlagKind::Scalar(Scalar::Int), &target)]);
        parse_args(&[&set], &to_args(&["-t3"])).expect("should parse");
        assert_eq!(target.get("times"), Some(Value::Int(3)));
        parse_args(&[&set], &to_args(&["-t=4"])).expect("should parse");
        assert_eq!(target.get("times"), Some(Value::Int(4)));
    }

    #[test]
    fn test_parse_grouped_bool_shorthands() {
        let target = Instance::new();
        let set = one_set(vec![
            flag("all", Some('a'), FlagKind::Scalar(Scalar::Bool), &target),
            flag("brief", Some('b'), FlagKind::Scalar(Scalar::Bool), &target),
            flag("times", Some('t'), FlagKind::Scalar(Scalar::Int), &target),
        ]);
        let parsed = parse_args(&[&set], &to_args(&["-ab"])).expect("should parse");
        assert_eq!(target.get("all"), Some(Value::Bool(true)));
        assert_eq!(target.get("brief"), Some(Value::Bool(true)));
        assert!(parsed.provided.contains("all") && parsed.provided.contains("brief"));

        // A valued shorthand ends the group and eats the remainder.
        parse_args(&[&set], &to_args(&["-at2"])).expect("should parse");
        assert_eq!(target.get("times"), Some(Value::Int(2)));

        let err = parse_args(&[&set], &to_args(&["-ax"])).expect_err("should reject");
        assert!(err.to_string().contains("unknown shorthand flag: -x"));
    }

    #[test]
    fn test_parse_double_dash_terminator() {
        let target = Instance::new();
        let set = one_set(vec![flag("loud", None, FlagKind::Scalar(Scalar::Bool), &target)]);
        let parsed =
            parse_args(&[&set], &to_args(&["--", "--loud", "-x"])).expect("should parse");
        assert_eq!(parsed.positionals, vec!["--loud", "-x"]);
    }

    #[test]
    fn test_parse_unknown_flag_is_usage_error() {
        let set = FlagSet::default();
        let err = parse_args(&[&set], &to_args(&["--nope"])).expect_err("should reject");
        assert!(err.to_string().contains("unknown flag: --nope"));
        assert_eq!(crate::errors::resolve(&err).print_usage, true);
    }

    #[test]
    fn test_parse_missing_value_is_usage_error() {
        let target = Instance::new();
        let set = one_set(vec![flag("times", None, FlagKind::Scalar(Scalar::Int), &target)]);
        let err = parse_args(&[&set], &to_args(&["--times"])).expect_err("should reject");
        assert!(err.to_string().contains("flag needs an argument"));
    }

    #[test]
    fn test_parse_bad_value_is_usage_error() {
        let target = Instance::new();
        let set = one_set(vec![flag("times", None, FlagKind::Scalar(Scalar::Int), &target)]);
        let err = parse_args(&[&set], &to_args(&["--times", "three"])).expect_err("should reject");
        assert!(err.to_string().contains("invalid value for flag --times"));
    }

    #[test]
    fn test_list_flag_replaces_default_then_appends() {
        let target = Instance::new();
        target.set("tags", Value::List(vec![Value::Str("default".to_string())]));
        let set = one_set(vec![flag("tags", None, FlagKind::List(Scalar::Str), &target)]);
        parse_args(&[&set], &to_args(&["--tags", "a,b", "--tags", "c"])).expect("should parse");
        assert_eq!(
            target.get("tags"),
            Some(Value::List(vec![
                Value::Str("a".to_string()),
                Value::Str("b".to_string()),
                Value::Str("c".to_string()),
            ]))
        );
    }

    #[test]
    fn test_chain_inner_set_wins() {
        let outer_target = Instance::new();
        let inner_target = Instance::new();
        let outer = one_set(vec![flag("verbose", None, FlagKind::Scalar(Scalar::Bool), &outer_target)]);
        let inner = one_set(vec![flag("verbose", None, FlagKind::Scalar(Scalar::Bool), &inner_target)]);
        parse_args(&[&outer, &inner], &to_args(&["--verbose"])).expect("should parse");
        assert_eq!(inner_target.get("verbose"), Some(Value::Bool(true)));
        assert_eq!(outer_target.get("verbose"), None);
    }

    #[test]
    fn test_required_check() {
        let target = Instance::new();
        let mut required = flag("times", None, FlagKind::Scalar(Scalar::Int), &target);
        required.required = true;
        let set = one_set(vec![required]);

        let parsed = parse_args(&[&set], &to_args(&[])).expect("should parse");
        let err = check_required(&[&set], &parsed.provided).expect_err("should reject");
        assert!(err.to_string().contains("required flag(s) \"times\" not set"));

        let parsed = parse_args(&[&set], &to_args(&["--times", "2"])).expect("should parse");
        check_required(&[&set], &parsed.provided).expect("should pass");
    }

    #[test]
    fn test_help_flag_detected() {
        let set = FlagSet::default();
        assert!(parse_args(&[&set], &to_args(&["--help"])).expect("should parse").help);
        assert!(parse_args(&[&set], &to_args(&["-h"])).expect("should parse").help);
    }
}
