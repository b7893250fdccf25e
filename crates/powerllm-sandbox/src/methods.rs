//! Attribute and method resolution for built-in values.
//!
//! [`get_attribute`] runs after the attribute guard has approved a name. It
//! returns data attributes directly and wraps methods in a bound method
//! value; [`call_method`] executes the bound method when it is called.
//! Temporal values delegate to [`crate::modules::datetime`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins::sort_values;
use crate::error::{Result, SandboxError};
use crate::format::str_format;
use crate::interpreter::Interpreter;
use crate::modules::datetime;
use crate::object::{Attr, Module, downcast};
use crate::ops;
use crate::value::{
    BoundMethod, CallArgs, Dict, DictKind, HashKey, SetData, TypeKind, Value, set_from,
    values_equal,
};

const STR_METHODS: &[&str] = &[
    "capitalize",
    "casefold",
    "center",
    "count",
    "endswith",
    "find",
    "format",
    "index",
    "isalnum",
    "isalpha",
    "isascii",
    "isdecimal",
    "isdigit",
    "islower",
    "isnumeric",
    "isspace",
    "istitle",
    "isupper",
    "join",
    "ljust",
    "lower",
    "lstrip",
    "partition",
    "removeprefix",
    "removesuffix",
    "replace",
    "rfind",
    "rindex",
    "rjust",
    "rpartition",
    "rsplit",
    "rstrip",
    "split",
    "splitlines",
    "startswith",
    "strip",
    "swapcase",
    "title",
    "upper",
    "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse",
    "sort",
];

const TUPLE_METHODS: &[&str] = &["count", "index"];

const DICT_METHODS: &[&str] = &[
    "clear",
    "copy",
    "get",
    "items",
    "keys",
    "pop",
    "popitem",
    "setdefault",
    "update",
    "values",
];

const COUNTER_METHODS: &[&str] = &["most_common", "elements", "subtract", "total"];

const SET_METHODS: &[&str] = &[
    "add",
    "clear",
    "copy",
    "difference",
    "difference_update",
    "discard",
    "intersection",
    "intersection_update",
    "isdisjoint",
    "issubset",
    "issuperset",
    "pop",
    "remove",
    "symmetric_difference",
    "union",
    "update",
];

const INT_METHODS: &[&str] = &["bit_length", "bit_count", "conjugate", "is_integer"];

const FLOAT_METHODS: &[&str] = &["conjugate", "is_integer"];

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

fn has_method(value: &Value, name: &str) -> bool {
    match value {
        Value::Str(_) => STR_METHODS.contains(&name),
        Value::List(_) => LIST_METHODS.contains(&name),
        Value::Tuple(_) => TUPLE_METHODS.contains(&name),
        Value::Dict(d) => {
            DICT_METHODS.contains(&name)
                || match d.borrow().kind {
                    DictKind::Counter => COUNTER_METHODS.contains(&name),
                    DictKind::OrderedDict => name == "move_to_end",
                    _ => false,
                }
        }
        Value::Set(_) => SET_METHODS.contains(&name),
        Value::Int(_) | Value::Bool(_) => INT_METHODS.contains(&name),
        Value::Float(_) => FLOAT_METHODS.contains(&name),
        Value::Range(_) => TUPLE_METHODS.contains(&name),
        Value::DateTime(_) | Value::Date(_) | Value::Time(_) | Value::TimeDelta(_) => {
            datetime::has_method(value, name)
        }
        Value::Type(kind) => class_has_method(kind, name),
        _ => false,
    }
}

fn class_has_method(kind: &TypeKind, name: &str) -> bool {
    match kind {
        TypeKind::Str => STR_METHODS.contains(&name),
        TypeKind::List => LIST_METHODS.contains(&name),
        TypeKind::Tuple => TUPLE_METHODS.contains(&name),
        TypeKind::Dict | TypeKind::OrderedDict | TypeKind::DefaultDict => {
            name == "fromkeys" || DICT_METHODS.contains(&name)
        }
        TypeKind::Counter => DICT_METHODS.contains(&name) || COUNTER_METHODS.contains(&name),
        TypeKind::Set => SET_METHODS.contains(&name),
        TypeKind::Int => INT_METHODS.contains(&name),
        TypeKind::Float => FLOAT_METHODS.contains(&name),
        TypeKind::DateTime
        | TypeKind::Date
        | TypeKind::Time
        | TypeKind::TimeDelta
        | TypeKind::TimeZone => datetime::class_has_method(kind, name),
        _ => false,
    }
}

fn data_attribute(obj: &Value, name: &str) -> Option<Value> {
    match obj {
        Value::Int(_) | Value::Bool(_) => {
            let i = obj.as_int().ok()?;
            match name {
                "real" | "numerator" => Some(Value::Int(i)),
                "imag" => Some(Value::Int(0)),
                "denominator" => Some(Value::Int(1)),
                _ => None,
            }
        }
        Value::Float(f) => match name {
            "real" => Some(Value::Float(*f)),
            "imag" => Some(Value::Float(0.0)),
            _ => None,
        },
        Value::Range(r) => match name {
            "start" => Some(Value::Int(r.start)),
            "stop" => Some(Value::Int(r.stop)),
            "step" => Some(Value::Int(r.step)),
            _ => None,
        },
        Value::Slice(s) => {
            let part = |v: Option<i64>| v.map_or(Value::None, Value::Int);
            match name {
                "start" => Some(part(s.lower)),
                "stop" => Some(part(s.upper)),
                "step" => Some(part(s.step)),
                _ => None,
            }
        }
        Value::Exception(exc) => match name {
            "args" if exc.message.is_empty() => Some(Value::tuple(Vec::new())),
            "args" => Some(Value::tuple(vec![Value::from(exc.message.as_str())])),
            _ => None,
        },
        Value::Dict(d) if name == "default_factory" => {
            let d = d.borrow();
            (d.kind == DictKind::DefaultDict).then(|| d.factory.clone().unwrap_or(Value::None))
        }
        Value::DateTime(_) | Value::Date(_) | Value::Time(_) | Value::TimeDelta(_) => {
            datetime::attribute(obj, name)
        }
        Value::Type(kind) => datetime::class_attribute(kind, name),
        _ => None,
    }
}

fn no_attribute(obj: &Value, name: &str) -> SandboxError {
    let message = match obj {
        Value::Type(kind) => format!("type object '{}' has no attribute '{name}'", kind.name()),
        _ => match downcast::<Module>(obj) {
            Some(module) => format!("module '{}' has no attribute '{name}'", module.name),
            None => format!("'{}' object has no attribute '{name}'", obj.type_name()),
        },
    };
    SandboxError::attribute_error(message)
}

fn bound(receiver: &Value, name: &str) -> Value {
    Value::Method(Rc::new(BoundMethod {
        receiver: receiver.clone(),
        name: Rc::from(name),
    }))
}

/// Resolve `obj.name` once the guard has approved the name.
pub fn get_attribute(obj: &Value, name: &str) -> Result<Value> {
    if let Some(value) = data_attribute(obj, name) {
        return Ok(value);
    }
    if has_method(obj, name) {
        return Ok(bound(obj, name));
    }
    if let Value::Object(o) = obj {
        match o.attr(name) {
            Some(Attr::Value(value)) => return Ok(value),
            Some(Attr::Method) => return Ok(bound(obj, name)),
            None => {}
        }
    }
    Err(no_attribute(obj, name))
}

/// Whether `obj.name` resolves, without running the guard.
pub fn has_attribute(obj: &Value, name: &str) -> bool {
    get_attribute(obj, name).is_ok()
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Call the method `name` bound to `receiver`.
pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: CallArgs,
) -> Result<Value> {
    match receiver {
        Value::Str(s) => str_method(s, name, &args),
        Value::List(_) => list_method(interp, receiver, name, args),
        Value::Tuple(items) => sequence_method(items, "tuple", name, &args),
        Value::Range(_) => {
            let items = ops::iterate(receiver)?;
            sequence_method(&items, "range", name, &args)
        }
        Value::Dict(_) => dict_method(receiver, name, args),
        Value::Set(_) => set_method(receiver, name, &args),
        Value::Int(_) | Value::Bool(_) | Value::Float(_) => number_method(receiver, name, &args),
        Value::DateTime(_) | Value::Date(_) | Value::Time(_) | Value::TimeDelta(_) => {
            datetime::call_method(interp, receiver, name, args)
        }
        Value::Type(kind) => type_method(interp, kind, name, args),
        Value::Object(obj) => {
            let obj = Rc::clone(obj);
            obj.call_method(interp, name, args)
        }
        other => Err(no_attribute(other, name)),
    }
}

fn type_method(
    interp: &mut Interpreter,
    kind: &TypeKind,
    name: &str,
    mut args: CallArgs,
) -> Result<Value> {
    match (kind, name) {
        (TypeKind::Dict | TypeKind::OrderedDict | TypeKind::DefaultDict, "fromkeys") => {
            args.expect("fromkeys", 1, 2)?;
            let value = args.get(1).cloned().unwrap_or(Value::None);
            let dict_kind = match kind {
                TypeKind::OrderedDict => DictKind::OrderedDict,
                _ => DictKind::Plain,
            };
            let mut dict = Dict::with_kind(dict_kind);
            for key in ops::iterate(&args.positional[0])? {
                dict.insert(key, value.clone())?;
            }
            Ok(Value::dict(dict))
        }
        (
            TypeKind::DateTime
            | TypeKind::Date
            | TypeKind::Time
            | TypeKind::TimeDelta
            | TypeKind::TimeZone,
            _,
        ) if datetime::class_has_method(kind, name) && !datetime::is_instance_method(kind, name) => {
            datetime::call_class_method(interp, kind, name, args)
        }
        _ => {
            // Unbound instance method, e.g. `str.upper("x")`.
            if args.positional.is_empty() {
                return Err(SandboxError::type_error(format!(
                    "unbound method {}.{name}() needs an argument",
                    kind.name()
                )));
            }
            let receiver = args.positional.remove(0);
            if !receiver.type_kind().is_subtype_of(kind) {
                return Err(SandboxError::type_error(format!(
                    "descriptor '{name}' for '{}' objects doesn't apply to a '{}' object",
                    kind.name(),
                    receiver.type_name()
                )));
            }
            call_method(interp, &receiver, name, args)
        }
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn str_arg<'a>(args: &'a CallArgs, index: usize, name: &str, func: &str) -> Result<&'a str> {
    match args.required(func, index, name)? {
        Value::Str(s) => Ok(s),
        other => Err(SandboxError::type_error(format!(
            "{func}() argument {} must be str, not {}",
            index + 1,
            other.type_name()
        ))),
    }
}

fn opt_int(args: &CallArgs, index: usize, name: &str) -> Result<Option<i64>> {
    match args.arg(index, name) {
        None | Some(Value::None) => Ok(None),
        Some(v) => v.as_int().map(Some),
    }
}

fn opt_chars(args: &CallArgs, index: usize, name: &str) -> Result<Option<Vec<char>>> {
    match args.arg(index, name) {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s.chars().collect())),
        Some(other) => Err(SandboxError::type_error(format!(
            "{name} arg must be None or str, not {}",
            other.type_name()
        ))),
    }
}

/// Resolve optional `start`/`end` bounds against a length.
fn window(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let norm = |v: i64| {
        if v < 0 {
            (v + len as i64).max(0) as usize
        } else {
            (v as usize).min(len)
        }
    };
    let start = start.map_or(0, norm);
    let end = end.map_or(len, norm);
    (start, end.max(start))
}

// ---------------------------------------------------------------------------
// str
// ---------------------------------------------------------------------------

fn char_find(s: &str, sub: &str, start: Option<i64>, end: Option<i64>, reverse: bool) -> Option<usize> {
    let chars: Vec<char> = s.chars().collect();
    let (start, end) = window(chars.len(), start, end);
    let hay: String = chars[start..end].iter().collect();
    let byte = if reverse { hay.rfind(sub) } else { hay.find(sub) }?;
    Some(start + hay[..byte].chars().count())
}

fn pad_str(s: &str, args: &CallArgs, func: &str, align: char) -> Result<Value> {
    args.expect(func, 1, 2)?;
    let width = args.positional[0].as_int()?.max(0) as usize;
    let fill = match args.get(1) {
        None => ' ',
        Some(Value::Str(f)) if f.chars().count() == 1 => f.chars().next().unwrap_or(' '),
        Some(_) => {
            return Err(SandboxError::type_error(
                "The fill character must be exactly one character long",
            ));
        }
    };
    let len = s.chars().count();
    if width <= len {
        return Ok(Value::from(s));
    }
    let n = width - len;
    let fills = |k: usize| std::iter::repeat_n(fill, k).collect::<String>();
    Ok(Value::from(match align {
        '<' => format!("{s}{}", fills(n)),
        '>' => format!("{}{s}", fills(n)),
        // `str.center` puts the extra fill on the right for odd widths
        // unless the string length is odd.
        _ => {
            let left = n / 2 + (n & len & 1);
            format!("{}{s}{}", fills(left), fills(n - left))
        }
    }))
}

fn split_whitespace(s: &str, maxsplit: Option<usize>, reverse: bool) -> Vec<Value> {
    let words: Vec<&str> = s.split_whitespace().collect();
    let Some(max) = maxsplit.filter(|m| *m < words.len().saturating_sub(1)) else {
        return words.into_iter().map(Value::from).collect();
    };
    if reverse {
        // Keep the leading remainder intact, whitespace included.
        let mut out = Vec::new();
        let mut rest = s.trim_end();
        for _ in 0..max {
            match rest.rfind(char::is_whitespace) {
                Some(pos) => {
                    let ws_len = rest[pos..].chars().next().map_or(1, char::len_utf8);
                    out.push(Value::from(&rest[pos + ws_len..]));
                    rest = rest[..pos].trim_end();
                }
                None => break,
            }
        }
        out.push(Value::from(rest));
        out.reverse();
        out
    } else {
        let mut out = Vec::new();
        let mut rest = s.trim_start();
        for _ in 0..max {
            match rest.find(char::is_whitespace) {
                Some(pos) => {
                    out.push(Value::from(&rest[..pos]));
                    rest = rest[pos..].trim_start();
                }
                None => break,
            }
        }
        out.push(Value::from(rest));
        out
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if prev_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_cased = c.is_alphabetic();
    }
    out
}

fn prefix_matches(
    s: &str,
    pattern: &Value,
    start: Option<i64>,
    end: Option<i64>,
    suffix: bool,
    func: &str,
) -> Result<bool> {
    let chars: Vec<char> = s.chars().collect();
    let (start, end) = window(chars.len(), start, end);
    let hay: String = chars[start..end].iter().collect();
    let check = |p: &str| {
        if suffix {
            hay.ends_with(p)
        } else {
            hay.starts_with(p)
        }
    };
    match pattern {
        Value::Str(p) => Ok(check(p)),
        Value::Tuple(options) => {
            for option in options.iter() {
                if check(option.as_str()?) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(SandboxError::type_error(format!(
            "{func} first arg must be str or a tuple of str, not {}",
            other.type_name()
        ))),
    }
}

fn str_method(s: &str, name: &str, args: &CallArgs) -> Result<Value> {
    let no_args = |func: &str| args.expect(func, 0, 0);
    let out = match name {
        "upper" => {
            no_args(name)?;
            Value::from(s.to_uppercase())
        }
        "lower" | "casefold" => {
            no_args(name)?;
            Value::from(s.to_lowercase())
        }
        "title" => {
            no_args(name)?;
            Value::from(title_case(s))
        }
        "capitalize" => {
            no_args(name)?;
            let mut chars = s.chars();
            Value::from(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            })
        }
        "swapcase" => {
            no_args(name)?;
            Value::from(
                s.chars()
                    .flat_map(|c| {
                        if c.is_uppercase() {
                            c.to_lowercase().collect::<Vec<_>>()
                        } else {
                            c.to_uppercase().collect::<Vec<_>>()
                        }
                    })
                    .collect::<String>(),
            )
        }
        "strip" | "lstrip" | "rstrip" => {
            args.expect(name, 0, 1)?;
            let chars = opt_chars(args, 0, "chars")?;
            let matcher = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            Value::from(match name {
                "strip" => s.trim_matches(matcher),
                "lstrip" => s.trim_start_matches(matcher),
                _ => s.trim_end_matches(matcher),
            })
        }
        "split" | "rsplit" => {
            args.expect(name, 0, 2)?;
            args.allow_keywords(name, &["sep", "maxsplit"])?;
            let maxsplit = opt_int(args, 1, "maxsplit")?
                .filter(|m| *m >= 0)
                .map(|m| m as usize);
            let reverse = name == "rsplit";
            match args.arg(0, "sep") {
                None | Some(Value::None) => Value::list(split_whitespace(s, maxsplit, reverse)),
                Some(Value::Str(sep)) => {
                    if sep.is_empty() {
                        return Err(SandboxError::value_error("empty separator"));
                    }
                    let parts: Vec<Value> = match (maxsplit, reverse) {
                        (None, _) => s.split(sep.as_ref()).map(Value::from).collect(),
                        (Some(m), false) => s.splitn(m + 1, sep.as_ref()).map(Value::from).collect(),
                        (Some(m), true) => {
                            let mut parts: Vec<Value> =
                                s.rsplitn(m + 1, sep.as_ref()).map(Value::from).collect();
                            parts.reverse();
                            parts
                        }
                    };
                    Value::list(parts)
                }
                Some(other) => {
                    return Err(SandboxError::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )));
                }
            }
        }
        "splitlines" => {
            args.expect(name, 0, 1)?;
            let keepends = args.arg(0, "keepends").is_some_and(Value::truthy);
            let mut lines = Vec::new();
            let mut current = String::new();
            let mut chars = s.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '\n' || c == '\r' {
                    let mut ending = c.to_string();
                    if c == '\r' && chars.peek() == Some(&'\n') {
                        chars.next();
                        ending.push('\n');
                    }
                    if keepends {
                        current.push_str(&ending);
                    }
                    lines.push(Value::from(std::mem::take(&mut current)));
                } else {
                    current.push(c);
                }
            }
            if !current.is_empty() {
                lines.push(Value::from(current));
            }
            Value::list(lines)
        }
        "join" => {
            args.expect(name, 1, 1)?;
            let items = ops::iterate(&args.positional[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(SandboxError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )));
                    }
                }
            }
            Value::from(parts.join(s))
        }
        "replace" => {
            args.expect(name, 2, 3)?;
            let old = str_arg(args, 0, "old", name)?;
            let new = str_arg(args, 1, "new", name)?;
            match opt_int(args, 2, "count")? {
                Some(count) if count >= 0 => Value::from(s.replacen(old, new, count as usize)),
                _ => Value::from(s.replace(old, new)),
            }
        }
        "find" | "rfind" | "index" | "rindex" => {
            args.expect(name, 1, 3)?;
            let sub = str_arg(args, 0, "sub", name)?;
            let reverse = name.starts_with('r');
            match char_find(s, sub, opt_int(args, 1, "start")?, opt_int(args, 2, "end")?, reverse) {
                Some(i) => Value::Int(i as i64),
                None if name.ends_with("find") => Value::Int(-1),
                None => return Err(SandboxError::value_error("substring not found")),
            }
        }
        "count" => {
            args.expect(name, 1, 3)?;
            let sub = str_arg(args, 0, "sub", name)?;
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = window(
                chars.len(),
                opt_int(args, 1, "start")?,
                opt_int(args, 2, "end")?,
            );
            let hay: String = chars[start..end].iter().collect();
            let count = if sub.is_empty() {
                end - start + 1
            } else {
                hay.matches(sub).count()
            };
            Value::Int(count as i64)
        }
        "startswith" | "endswith" => {
            args.expect(name, 1, 3)?;
            Value::Bool(prefix_matches(
                s,
                &args.positional[0],
                opt_int(args, 1, "start")?,
                opt_int(args, 2, "end")?,
                name == "endswith",
                name,
            )?)
        }
        "removeprefix" => {
            args.expect(name, 1, 1)?;
            let prefix = str_arg(args, 0, "prefix", name)?;
            Value::from(s.strip_prefix(prefix).unwrap_or(s))
        }
        "removesuffix" => {
            args.expect(name, 1, 1)?;
            let suffix = str_arg(args, 0, "suffix", name)?;
            Value::from(s.strip_suffix(suffix).unwrap_or(s))
        }
        "center" => return pad_str(s, args, name, '^'),
        "ljust" => return pad_str(s, args, name, '<'),
        "rjust" => return pad_str(s, args, name, '>'),
        "zfill" => {
            args.expect(name, 1, 1)?;
            let width = args.positional[0].as_int()?.max(0) as usize;
            let len = s.chars().count();
            if width <= len {
                Value::from(s)
            } else {
                let zeros = "0".repeat(width - len);
                match s.strip_prefix(['+', '-']) {
                    Some(rest) => Value::from(format!("{}{zeros}{rest}", &s[..1])),
                    None => Value::from(format!("{zeros}{s}")),
                }
            }
        }
        "partition" | "rpartition" => {
            args.expect(name, 1, 1)?;
            let sep = str_arg(args, 0, "sep", name)?;
            if sep.is_empty() {
                return Err(SandboxError::value_error("empty separator"));
            }
            let found = if name == "partition" {
                s.split_once(sep)
            } else {
                s.rsplit_once(sep)
            };
            let parts = match (found, name) {
                (Some((a, b)), _) => [a, sep, b],
                (None, "partition") => [s, "", ""],
                (None, _) => ["", "", s],
            };
            Value::tuple(parts.iter().copied().map(Value::from).collect())
        }
        "format" => Value::from(str_format(s, args)?),
        "isdigit" | "isdecimal" => {
            no_args(name)?;
            Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        }
        "isnumeric" => {
            no_args(name)?;
            Value::Bool(!s.is_empty() && s.chars().all(char::is_numeric))
        }
        "isalpha" => {
            no_args(name)?;
            Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))
        }
        "isalnum" => {
            no_args(name)?;
            Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric))
        }
        "isascii" => {
            no_args(name)?;
            Value::Bool(s.is_ascii())
        }
        "isspace" => {
            no_args(name)?;
            Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace))
        }
        "islower" | "isupper" => {
            no_args(name)?;
            let cased: Vec<char> = s.chars().filter(|c| c.is_alphabetic()).collect();
            let check = if name == "islower" {
                cased.iter().all(|c| c.is_lowercase())
            } else {
                cased.iter().all(|c| c.is_uppercase())
            };
            Value::Bool(!cased.is_empty() && check)
        }
        "istitle" => {
            no_args(name)?;
            Value::Bool(s.chars().any(char::is_alphabetic) && title_case(s) == s)
        }
        _ => return Err(no_attribute(&Value::from(s), name)),
    };
    Ok(out)
}

// ---------------------------------------------------------------------------
// list / tuple
// ---------------------------------------------------------------------------

fn position(items: &[Value], target: &Value, args: &CallArgs, type_name: &str) -> Result<Value> {
    let (start, end) = window(items.len(), opt_int(args, 1, "start")?, opt_int(args, 2, "stop")?);
    items[start..end]
        .iter()
        .position(|item| values_equal(item, target))
        .map(|i| Value::Int((start + i) as i64))
        .ok_or_else(|| {
            SandboxError::value_error(if type_name == "list" {
                format!("{} is not in list", target.repr())
            } else {
                format!("{type_name}.index(x): x not in {type_name}")
            })
        })
}

fn sequence_method(items: &[Value], type_name: &str, name: &str, args: &CallArgs) -> Result<Value> {
    match name {
        "count" => {
            args.expect(name, 1, 1)?;
            let target = &args.positional[0];
            Ok(Value::Int(
                items.iter().filter(|item| values_equal(item, target)).count() as i64,
            ))
        }
        "index" => {
            args.expect(name, 1, 3)?;
            position(items, &args.positional[0], args, type_name)
        }
        _ => Err(no_attribute(&Value::tuple(Vec::new()), name)),
    }
}

fn list_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: CallArgs,
) -> Result<Value> {
    let Value::List(list) = receiver else {
        return Err(SandboxError::Internal("list method on non-list".into()));
    };
    match name {
        "append" => {
            args.expect(name, 1, 1)?;
            let mut items = list.borrow_mut();
            if items.len() >= ops::MAX_SEQUENCE_LEN {
                return Err(SandboxError::exception("MemoryError", "list too large"));
            }
            items.push(args.positional[0].clone());
        }
        "extend" => {
            args.expect(name, 1, 1)?;
            let extra = ops::iterate(&args.positional[0])?;
            let mut items = list.borrow_mut();
            if items.len() + extra.len() > ops::MAX_SEQUENCE_LEN {
                return Err(SandboxError::exception("MemoryError", "list too large"));
            }
            items.extend(extra);
        }
        "insert" => {
            args.expect(name, 2, 2)?;
            let index = args.positional[0].as_int()?;
            let mut items = list.borrow_mut();
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, args.positional[1].clone());
        }
        "pop" => {
            args.expect(name, 0, 1)?;
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(SandboxError::index_error("pop from empty list"));
            }
            let index = match args.get(0) {
                Some(v) => ops::normalize_index(v.as_int()?, items.len(), "pop")?,
                None => items.len() - 1,
            };
            return Ok(items.remove(index));
        }
        "remove" => {
            args.expect(name, 1, 1)?;
            let index = list
                .borrow()
                .iter()
                .position(|item| values_equal(item, &args.positional[0]))
                .ok_or_else(|| SandboxError::value_error("list.remove(x): x not in list"))?;
            list.borrow_mut().remove(index);
        }
        "clear" => {
            args.expect(name, 0, 0)?;
            list.borrow_mut().clear();
        }
        "copy" => {
            args.expect(name, 0, 0)?;
            return Ok(Value::list(list.borrow().clone()));
        }
        "reverse" => {
            args.expect(name, 0, 0)?;
            list.borrow_mut().reverse();
        }
        "sort" => {
            args.expect(name, 0, 0)?;
            args.allow_keywords(name, &["key", "reverse"])?;
            let key = args.keyword("key").cloned().filter(|k| !k.is_none());
            let reverse = args.keyword("reverse").is_some_and(Value::truthy);
            let items = list.borrow().clone();
            let sorted = sort_values(interp, items, key, reverse)?;
            *list.borrow_mut() = sorted;
        }
        "count" | "index" => {
            let items = list.borrow().clone();
            return sequence_method(&items, "list", name, &args);
        }
        _ => return Err(no_attribute(receiver, name)),
    }
    Ok(Value::None)
}

// ---------------------------------------------------------------------------
// dict
// ---------------------------------------------------------------------------

fn update_dict(dict: &Rc<RefCell<Dict>>, source: &Value) -> Result<()> {
    let pairs: Vec<(Value, Value)> = match source {
        Value::Dict(other) if Rc::ptr_eq(other, dict) => return Ok(()),
        Value::Dict(other) => other.borrow().entries.values().cloned().collect(),
        other => ops::dict_from_pairs(ops::iterate(other)?)?
            .entries
            .into_values()
            .collect(),
    };
    let mut dict = dict.borrow_mut();
    for (k, v) in pairs {
        dict.insert(k, v)?;
    }
    Ok(())
}

/// Add (or subtract) counts into a Counter.
///
/// The source is read in full before `dict` is borrowed, so it may be the
/// Counter itself.
fn count_into(dict: &RefCell<Dict>, source: &Value, sign: i64) -> Result<()> {
    let pairs: Vec<(Value, i64)> = match source {
        Value::Dict(other) => other
            .borrow()
            .entries
            .values()
            .map(|(k, v)| Ok((k.clone(), v.as_int()?)))
            .collect::<Result<_>>()?,
        other => ops::iterate(other)?
            .into_iter()
            .map(|item| (item, 1))
            .collect(),
    };
    let mut dict = dict.borrow_mut();
    for (key, n) in pairs {
        let current = dict.get(&key)?.map_or(Ok(0), |v| v.as_int())?;
        let updated = n
            .checked_mul(sign)
            .and_then(|delta| current.checked_add(delta))
            .ok_or_else(SandboxError::overflow)?;
        dict.insert(key, Value::Int(updated))?;
    }
    Ok(())
}

/// Counter entries ordered by count, highest first (stable).
pub fn most_common(dict: &Dict) -> Vec<Value> {
    let mut entries: Vec<(Value, Value)> = dict.entries.values().cloned().collect();
    entries.sort_by(|a, b| {
        let (x, y) = (a.1.as_int().unwrap_or(0), b.1.as_int().unwrap_or(0));
        y.cmp(&x)
    });
    entries
        .into_iter()
        .map(|(k, v)| Value::tuple(vec![k, v]))
        .collect()
}

fn dict_method(receiver: &Value, name: &str, args: CallArgs) -> Result<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(SandboxError::Internal("dict method on non-dict".into()));
    };
    let kind = dict.borrow().kind;
    match name {
        "get" => {
            args.expect(name, 1, 2)?;
            let found = dict.borrow().get(&args.positional[0])?;
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            args.expect(name, 0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            args.expect(name, 0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            args.expect(name, 0, 0)?;
            Ok(Value::list(dict.borrow().items()))
        }
        "pop" => {
            args.expect(name, 1, 2)?;
            let removed = dict.borrow_mut().remove(&args.positional[0])?;
            match (removed, args.get(1)) {
                (Some(v), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(SandboxError::key_error(args.positional[0].repr())),
            }
        }
        "popitem" => {
            args.expect(name, 0, 0)?;
            let popped = dict.borrow_mut().entries.pop();
            match popped {
                Some((_, (k, v))) => Ok(Value::tuple(vec![k, v])),
                None => Err(SandboxError::key_error("'popitem(): dictionary is empty'")),
            }
        }
        "setdefault" => {
            args.expect(name, 1, 2)?;
            let key = &args.positional[0];
            if let Some(existing) = dict.borrow().get(key)? {
                return Ok(existing);
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            dict.borrow_mut().insert(key.clone(), default.clone())?;
            Ok(default)
        }
        "update" => {
            args.expect(name, 0, 1)?;
            let source = args.get(0).cloned();
            if kind == DictKind::Counter {
                if let Some(source) = &source {
                    count_into(dict, source, 1)?;
                }
                for (k, v) in &args.keywords {
                    let mut one = Dict::new();
                    one.insert(Value::from(k.as_str()), v.clone())?;
                    count_into(dict, &Value::dict(one), 1)?;
                }
            } else {
                if let Some(source) = &source {
                    update_dict(dict, source)?;
                }
                let mut d = dict.borrow_mut();
                for (k, v) in &args.keywords {
                    d.insert(Value::from(k.as_str()), v.clone())?;
                }
            }
            Ok(Value::None)
        }
        "copy" => {
            args.expect(name, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "clear" => {
            args.expect(name, 0, 0)?;
            dict.borrow_mut().entries.clear();
            Ok(Value::None)
        }
        "most_common" if kind == DictKind::Counter => {
            args.expect(name, 0, 1)?;
            let mut entries = most_common(&dict.borrow());
            if let Some(n) = opt_int(&args, 0, "n")? {
                entries.truncate(n.max(0) as usize);
            }
            Ok(Value::list(entries))
        }
        "elements" if kind == DictKind::Counter => {
            args.expect(name, 0, 0)?;
            let mut out = Vec::new();
            for (k, v) in dict.borrow().entries.values() {
                let n = v.as_int()?.max(0) as usize;
                if out.len() + n > ops::MAX_SEQUENCE_LEN {
                    return Err(SandboxError::exception("MemoryError", "too many elements"));
                }
                out.extend(std::iter::repeat_n(k.clone(), n));
            }
            Ok(Value::list(out))
        }
        "subtract" if kind == DictKind::Counter => {
            args.expect(name, 0, 1)?;
            if let Some(source) = args.get(0) {
                count_into(dict, source, -1)?;
            }
            Ok(Value::None)
        }
        "total" if kind == DictKind::Counter => {
            args.expect(name, 0, 0)?;
            let mut total: i64 = 0;
            for v in dict.borrow().values() {
                total = total.checked_add(v.as_int()?).ok_or_else(SandboxError::overflow)?;
            }
            Ok(Value::Int(total))
        }
        "move_to_end" if kind == DictKind::OrderedDict => {
            args.expect(name, 1, 2)?;
            let last = args.arg(1, "last").is_none_or(Value::truthy);
            let key = HashKey::of(&args.positional[0])?;
            let mut d = dict.borrow_mut();
            let index = d
                .entries
                .get_index_of(&key)
                .ok_or_else(|| SandboxError::key_error(args.positional[0].repr()))?;
            let target = if last { d.entries.len() - 1 } else { 0 };
            d.entries.move_index(index, target);
            Ok(Value::None)
        }
        _ => Err(no_attribute(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

fn set_arg(value: &Value) -> Result<SetData> {
    match value {
        Value::Set(s) => Ok(s.borrow().clone()),
        other => set_from(ops::iterate(other)?),
    }
}

fn set_method(receiver: &Value, name: &str, args: &CallArgs) -> Result<Value> {
    let Value::Set(set) = receiver else {
        return Err(SandboxError::Internal("set method on non-set".into()));
    };
    let others = || -> Result<Vec<SetData>> { args.positional.iter().map(set_arg).collect() };
    match name {
        "add" => {
            args.expect(name, 1, 1)?;
            let value = args.positional[0].clone();
            let key = HashKey::of(&value)?;
            set.borrow_mut().entry(key).or_insert(value);
        }
        "discard" | "remove" => {
            args.expect(name, 1, 1)?;
            let key = HashKey::of(&args.positional[0])?;
            let removed = set.borrow_mut().shift_remove(&key);
            if removed.is_none() && name == "remove" {
                return Err(SandboxError::key_error(args.positional[0].repr()));
            }
        }
        "pop" => {
            args.expect(name, 0, 0)?;
            return set
                .borrow_mut()
                .shift_remove_index(0)
                .map(|(_, v)| v)
                .ok_or_else(|| SandboxError::key_error("'pop from an empty set'"));
        }
        "clear" => {
            args.expect(name, 0, 0)?;
            set.borrow_mut().clear();
        }
        "copy" => {
            args.expect(name, 0, 0)?;
            return Ok(Value::set(set.borrow().clone()));
        }
        "union" | "update" => {
            let mut result = set.borrow().clone();
            for other in others()? {
                for (k, v) in other {
                    result.entry(k).or_insert(v);
                }
            }
            if name == "update" {
                *set.borrow_mut() = result;
            } else {
                return Ok(Value::set(result));
            }
        }
        "intersection" | "intersection_update" => {
            let mut result = set.borrow().clone();
            for other in others()? {
                result.retain(|k, _| other.contains_key(k));
            }
            if name == "intersection_update" {
                *set.borrow_mut() = result;
            } else {
                return Ok(Value::set(result));
            }
        }
        "difference" | "difference_update" => {
            let mut result = set.borrow().clone();
            for other in others()? {
                result.retain(|k, _| !other.contains_key(k));
            }
            if name == "difference_update" {
                *set.borrow_mut() = result;
            } else {
                return Ok(Value::set(result));
            }
        }
        "symmetric_difference" => {
            args.expect(name, 1, 1)?;
            let other = set_arg(&args.positional[0])?;
            let mine = set.borrow().clone();
            let mut result: SetData = mine
                .iter()
                .filter(|(k, _)| !other.contains_key(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (k, v) in other {
                if !mine.contains_key(&k) {
                    result.insert(k, v);
                }
            }
            return Ok(Value::set(result));
        }
        "issubset" | "issuperset" | "isdisjoint" => {
            args.expect(name, 1, 1)?;
            let other = set_arg(&args.positional[0])?;
            let mine = set.borrow();
            let result = match name {
                "issubset" => mine.keys().all(|k| other.contains_key(k)),
                "issuperset" => other.keys().all(|k| mine.contains_key(k)),
                _ => !mine.keys().any(|k| other.contains_key(k)),
            };
            return Ok(Value::Bool(result));
        }
        _ => return Err(no_attribute(receiver, name)),
    }
    Ok(Value::None)
}

// ---------------------------------------------------------------------------
// numbers
// ---------------------------------------------------------------------------

fn number_method(receiver: &Value, name: &str, args: &CallArgs) -> Result<Value> {
    args.expect(name, 0, 0)?;
    match (receiver, name) {
        (Value::Float(f), "is_integer") => Ok(Value::Bool(f.is_finite() && f.fract() == 0.0)),
        (Value::Float(f), "conjugate") => Ok(Value::Float(*f)),
        (_, "is_integer") => Ok(Value::Bool(true)),
        (_, "conjugate") => Ok(Value::Int(receiver.as_int()?)),
        (_, "bit_length") => {
            let i = receiver.as_int()?;
            Ok(Value::Int(i64::from(64 - i.unsigned_abs().leading_zeros())))
        }
        (_, "bit_count") => Ok(Value::Int(i64::from(receiver.as_int()?.unsigned_abs().count_ones()))),
        _ => Err(no_attribute(receiver, name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_str(s: &str, name: &str, args: Vec<Value>) -> Value {
        str_method(s, name, &CallArgs::new(args)).unwrap()
    }

    #[test]
    fn string_methods() {
        assert_eq!(call_str("Hello", "upper", vec![]).repr(), "'HELLO'");
        assert_eq!(call_str("  x  ", "strip", vec![]).repr(), "'x'");
        assert_eq!(call_str("xxaxx", "strip", vec![Value::from("x")]).repr(), "'a'");
        assert_eq!(
            call_str("a,b,,c", "split", vec![Value::from(",")]).repr(),
            "['a', 'b', '', 'c']"
        );
        assert_eq!(call_str(" a  b c ", "split", vec![]).repr(), "['a', 'b', 'c']");
        assert_eq!(
            call_str("a b c", "split", vec![Value::None, Value::Int(1)]).repr(),
            "['a', 'b c']"
        );
        assert_eq!(
            call_str("a b c", "rsplit", vec![Value::None, Value::Int(1)]).repr(),
            "['a b', 'c']"
        );
        assert_eq!(call_str("hello world", "title", vec![]).repr(), "'Hello World'");
        assert_eq!(call_str("héllo", "find", vec![Value::from("l")]).repr(), "2");
        assert_eq!(call_str("abc", "find", vec![Value::from("z")]).repr(), "-1");
        assert_eq!(call_str("-42", "zfill", vec![Value::Int(5)]).repr(), "'-0042'");
        assert_eq!(call_str("ab", "center", vec![Value::Int(6)]).repr(), "'  ab  '");
        assert_eq!(
            call_str("k=v=w", "partition", vec![Value::from("=")]).repr(),
            "('k', '=', 'v=w')"
        );
        assert_eq!(call_str("a\nb\r\nc", "splitlines", vec![]).repr(), "['a', 'b', 'c']");
        assert_eq!(
            call_str("banana", "count", vec![Value::from("an")]).repr(),
            "2"
        );
    }

    #[test]
    fn join_rejects_non_strings() {
        let err = str_method(
            ",",
            "join",
            &CallArgs::new(vec![Value::list(vec![Value::from("a"), Value::Int(1)])]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("sequence item 1: expected str instance, int found"));
    }

    #[test]
    fn startswith_accepts_tuples() {
        let prefixes = Value::tuple(vec![Value::from("x"), Value::from("he")]);
        assert_eq!(call_str("hello", "startswith", vec![prefixes]).repr(), "True");
    }

    #[test]
    fn attributes_resolve() {
        assert_eq!(get_attribute(&Value::Int(5), "real").unwrap().repr(), "5");
        assert!(matches!(
            get_attribute(&Value::from("x"), "upper").unwrap(),
            Value::Method(_)
        ));
        let err = get_attribute(&Value::from("x"), "nope").unwrap_err();
        assert_eq!(
            err.to_string(),
            "AttributeError: 'str' object has no attribute 'nope'"
        );
        assert!(!has_attribute(&Value::Int(1), "upper"));
    }

    #[test]
    fn set_operations() {
        let set = Value::set(set_from(vec![Value::Int(1), Value::Int(2)]).unwrap());
        let other = Value::list(vec![Value::Int(2), Value::Int(3)]);
        let union = set_method(&set, "union", &CallArgs::new(vec![other.clone()])).unwrap();
        assert_eq!(union.repr(), "{1, 2, 3}");
        let inter = set_method(&set, "intersection", &CallArgs::new(vec![other])).unwrap();
        assert_eq!(inter.repr(), "{2}");
    }

    #[test]
    fn counter_ordering() {
        let dict = RefCell::new(Dict::with_kind(DictKind::Counter));
        count_into(
            &dict,
            &Value::list(vec![Value::from("a"), Value::from("b"), Value::from("b")]),
            1,
        )
        .unwrap();
        assert_eq!(
            Value::list(most_common(&dict.borrow())).repr(),
            "[('b', 2), ('a', 1)]"
        );
    }

    fn counter_of(text: &str) -> Value {
        let counter = Value::dict(Dict::with_kind(DictKind::Counter));
        dict_method(&counter, "update", CallArgs::new(vec![Value::from(text)])).unwrap();
        counter
    }

    #[test]
    fn counter_can_update_from_itself() {
        let counter = counter_of("abb");
        dict_method(&counter, "update", CallArgs::new(vec![counter.clone()])).unwrap();
        assert_eq!(counter.repr(), "Counter({'a': 2, 'b': 4})");
        dict_method(&counter, "subtract", CallArgs::new(vec![counter.clone()])).unwrap();
        assert_eq!(counter.repr(), "Counter({'a': 0, 'b': 0})");
    }

    #[test]
    fn dict_can_update_from_itself() {
        let mut d = Dict::new();
        d.insert(Value::from("k"), Value::Int(1)).unwrap();
        let dict = Value::dict(d);
        dict_method(&dict, "update", CallArgs::new(vec![dict.clone()])).unwrap();
        assert_eq!(dict.repr(), "{'k': 1}");
    }

    #[test]
    fn counter_arithmetic_overflow_is_reported() {
        let counter = Value::dict(Dict::with_kind(DictKind::Counter));
        let mut huge = Dict::new();
        huge.insert(Value::from("a"), Value::Int(i64::MIN)).unwrap();
        let err = dict_method(&counter, "subtract", CallArgs::new(vec![Value::dict(huge)]))
            .unwrap_err();
        assert_eq!(err.kind_name(), "OverflowError");
    }
}
