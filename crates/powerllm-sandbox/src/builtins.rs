//! The restricted builtin namespace.
//!
//! [`builtins`] assembles the safe, utility and limited subsets plus the
//! extra functions scripts commonly need. Type objects (`int`, `list`,
//! `ValueError`, ...) are bound as [`Value::Type`] and constructed through
//! [`construct`]. Everything that iterates does so eagerly.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::Rc;

use crate::ast::BinOp;
use crate::error::{BUILTIN_EXCEPTIONS, Result, SandboxError};
use crate::format::format_value;
use crate::interpreter::Interpreter;
use crate::modules;
use crate::ops;
use crate::value::{
    Builtin, CallArgs, Dict, DictKind, HashKey, RangeValue, SliceValue, TypeKind, Value,
    compare_values, set_from,
};

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// A fresh builtin namespace for one execution.
pub fn builtins() -> HashMap<&'static str, Value> {
    let mut map: HashMap<&'static str, Value> = HashMap::new();

    // Constants.
    map.insert("True", Value::Bool(true));
    map.insert("False", Value::Bool(false));
    map.insert("None", Value::None);

    // Types.
    for (name, kind) in [
        ("bool", TypeKind::Bool),
        ("int", TypeKind::Int),
        ("float", TypeKind::Float),
        ("str", TypeKind::Str),
        ("tuple", TypeKind::Tuple),
        ("list", TypeKind::List),
        ("dict", TypeKind::Dict),
        ("set", TypeKind::Set),
        ("frozenset", TypeKind::Set),
        ("range", TypeKind::Range),
        ("slice", TypeKind::Slice),
        ("type", TypeKind::Type),
    ] {
        map.insert(name, Value::Type(kind));
    }
    for &kind in BUILTIN_EXCEPTIONS {
        map.insert(kind, Value::Type(TypeKind::Exception(Rc::from(kind))));
    }

    // Functions.
    let functions: &[(&'static str, crate::value::BuiltinFn)] = &[
        ("abs", builtin_abs),
        ("all", builtin_all),
        ("any", builtin_any),
        ("bin", builtin_bin),
        ("callable", builtin_callable),
        ("chr", builtin_chr),
        ("divmod", builtin_divmod),
        ("enumerate", builtin_enumerate),
        ("filter", builtin_filter),
        ("format", builtin_format),
        ("getattr", builtin_getattr),
        ("hasattr", builtin_hasattr),
        ("hash", builtin_hash),
        ("hex", builtin_hex),
        ("id", builtin_id),
        ("isinstance", builtin_isinstance),
        ("issubclass", builtin_issubclass),
        ("len", builtin_len),
        ("map", builtin_map),
        ("max", builtin_max),
        ("min", builtin_min),
        ("oct", builtin_oct),
        ("ord", builtin_ord),
        ("pow", builtin_pow),
        ("repr", builtin_repr),
        ("reversed", builtin_reversed),
        ("round", builtin_round),
        ("sorted", builtin_sorted),
        ("sum", builtin_sum),
        ("zip", builtin_zip),
        ("__import__", modules::import),
    ];
    for &(name, func) in functions {
        map.insert(name, Builtin::new(name, func));
    }

    // Modules exposed without an import.
    map.insert("math", modules::math::module());
    map.insert("random", modules::random::module());
    map.insert("string", modules::string::module());
    map.insert("datetime", modules::datetime::module());
    map.insert("time", modules::time::module());
    map.insert("dt_util", modules::dt_util::module());
    map
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Call a type object, e.g. `int("3")` or `ValueError("bad")`.
pub fn construct(interp: &mut Interpreter, kind: &TypeKind, args: CallArgs) -> Result<Value> {
    let name = kind.name().to_string();
    match kind {
        TypeKind::Bool => {
            args.expect(&name, 0, 1)?;
            Ok(Value::Bool(args.get(0).is_some_and(Value::truthy)))
        }
        TypeKind::Int => {
            args.expect(&name, 0, 2)?;
            args.allow_keywords(&name, &["base"])?;
            let base = args.arg(1, "base").map(Value::as_int).transpose()?;
            match args.get(0) {
                None => Ok(Value::Int(0)),
                Some(value) => to_int(value, base).map(Value::Int),
            }
        }
        TypeKind::Float => {
            args.expect(&name, 0, 1)?;
            match args.get(0) {
                None => Ok(Value::Float(0.0)),
                Some(value) => to_float(value).map(Value::Float),
            }
        }
        TypeKind::Str => {
            args.expect(&name, 0, 1)?;
            Ok(Value::from(args.get(0).map(Value::to_str).unwrap_or_default()))
        }
        TypeKind::List => {
            args.expect(&name, 0, 1)?;
            Ok(Value::list(optional_items(&args)?))
        }
        TypeKind::Tuple => {
            args.expect(&name, 0, 1)?;
            Ok(Value::tuple(optional_items(&args)?))
        }
        TypeKind::Set => {
            args.expect(&name, 0, 1)?;
            Ok(Value::set(set_from(optional_items(&args)?)?))
        }
        TypeKind::Dict | TypeKind::OrderedDict => {
            args.expect(&name, 0, 1)?;
            let dict_kind = if *kind == TypeKind::Dict {
                DictKind::Plain
            } else {
                DictKind::OrderedDict
            };
            let mut dict = Dict::with_kind(dict_kind);
            if let Some(source) = args.get(0) {
                fill_dict(&mut dict, source)?;
            }
            for (k, v) in args.keywords {
                dict.insert(Value::from(k), v)?;
            }
            Ok(Value::dict(dict))
        }
        TypeKind::Counter => {
            args.expect(&name, 0, 1)?;
            let counter = Value::dict(Dict::with_kind(DictKind::Counter));
            if args.get(0).is_some() || !args.keywords.is_empty() {
                crate::methods::call_method(interp, &counter, "update", args)?;
            }
            Ok(counter)
        }
        TypeKind::DefaultDict => {
            args.expect(&name, 0, 2)?;
            let factory = match args.get(0) {
                None | Some(Value::None) => None,
                Some(f) if f.is_callable() => Some(f.clone()),
                Some(_) => {
                    return Err(SandboxError::type_error(
                        "first argument must be callable or None",
                    ));
                }
            };
            let mut dict = Dict::with_kind(DictKind::DefaultDict);
            dict.factory = factory;
            if let Some(source) = args.get(1) {
                fill_dict(&mut dict, source)?;
            }
            Ok(Value::dict(dict))
        }
        TypeKind::Range => {
            args.expect(&name, 1, 3)?;
            let ints = args
                .positional
                .iter()
                .map(Value::as_int)
                .collect::<Result<Vec<_>>>()?;
            let (start, stop, step) = match ints.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => return Err(SandboxError::Internal("range arity".into())),
            };
            if step == 0 {
                return Err(SandboxError::value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range(RangeValue { start, stop, step }))
        }
        TypeKind::Slice => {
            args.expect(&name, 1, 3)?;
            let part = |v: &Value| -> Result<Option<i64>> {
                if v.is_none() { Ok(None) } else { v.as_int().map(Some) }
            };
            let parts = args
                .positional
                .iter()
                .map(part)
                .collect::<Result<Vec<_>>>()?;
            let (lower, upper, step) = match parts.as_slice() {
                [upper] => (None, *upper, None),
                [lower, upper] => (*lower, *upper, None),
                [lower, upper, step] => (*lower, *upper, *step),
                _ => return Err(SandboxError::Internal("slice arity".into())),
            };
            Ok(Value::Slice(SliceValue { lower, upper, step }))
        }
        TypeKind::Type => {
            if args.len() != 1 {
                return Err(SandboxError::type_error("type() takes 1 argument"));
            }
            Ok(Value::Type(args.positional[0].type_kind()))
        }
        TypeKind::Exception(exc_kind) => {
            let message = match args.positional.as_slice() {
                [] => String::new(),
                [single] => single.to_str(),
                many => Value::tuple(many.to_vec()).repr(),
            };
            Ok(Value::exception(exc_kind, message))
        }
        TypeKind::DateTime
        | TypeKind::Date
        | TypeKind::Time
        | TypeKind::TimeDelta
        | TypeKind::TimeZone => modules::datetime::construct(kind, &args),
        _ => Err(SandboxError::type_error(format!(
            "cannot create '{name}' instances"
        ))),
    }
}

fn optional_items(args: &CallArgs) -> Result<Vec<Value>> {
    match args.get(0) {
        Some(source) => ops::iterate(source),
        None => Ok(Vec::new()),
    }
}

fn fill_dict(dict: &mut Dict, source: &Value) -> Result<()> {
    match source {
        Value::Dict(other) => {
            let pairs: Vec<(Value, Value)> = other.borrow().entries.values().cloned().collect();
            for (k, v) in pairs {
                dict.insert(k, v)?;
            }
        }
        other => {
            for (_, (k, v)) in ops::dict_from_pairs(ops::iterate(other)?)?.entries {
                dict.insert(k, v)?;
            }
        }
    }
    Ok(())
}

/// `int(value, base)`.
pub fn to_int(value: &Value, base: Option<i64>) -> Result<i64> {
    match (value, base) {
        (Value::Str(s), base) => parse_int(s, base.unwrap_or(10)),
        (_, Some(_)) => Err(SandboxError::type_error(
            "int() can't convert non-string with explicit base",
        )),
        (Value::Int(i), None) => Ok(*i),
        (Value::Bool(b), None) => Ok(i64::from(*b)),
        (Value::Float(f), None) => float_to_int(*f),
        (other, None) => Err(SandboxError::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

pub fn float_to_int(f: f64) -> Result<i64> {
    if f.is_nan() {
        return Err(SandboxError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(SandboxError::exception(
            "OverflowError",
            "cannot convert float infinity to integer",
        ));
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(SandboxError::overflow());
    }
    Ok(truncated as i64)
}

fn parse_int(text: &str, base: i64) -> Result<i64> {
    let invalid = || {
        SandboxError::value_error(format!(
            "invalid literal for int() with base {base}: {}",
            crate::value::str_repr(text)
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(SandboxError::value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &lower[2..]),
        (0 | 8, Some("0o")) => (8, &lower[2..]),
        (0 | 2, Some("0b")) => (2, &lower[2..]),
        (0, _) => (10, lower.as_str()),
        (b, _) => (b as u32, lower.as_str()),
    };
    let body = body.strip_prefix('_').unwrap_or(body);
    if body.is_empty() || body.starts_with('_') || body.ends_with('_') || body.contains("__") {
        return Err(invalid());
    }
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();
    let magnitude = i128::from_str_radix(&cleaned, radix).map_err(|_| invalid())?;
    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).map_err(|_| SandboxError::overflow())
}

/// `float(value)`.
pub fn to_float(value: &Value) -> Result<f64> {
    match value {
        Value::Str(s) => {
            let text = s.trim();
            let lowered = text.to_ascii_lowercase();
            let unsigned = lowered.trim_start_matches(['+', '-']);
            let special = match unsigned {
                "nan" => Some(f64::NAN),
                "inf" | "infinity" => Some(f64::INFINITY),
                _ => None,
            };
            if let Some(v) = special {
                return Ok(if lowered.starts_with('-') { -v } else { v });
            }
            let cleaned: String = text.chars().filter(|c| *c != '_').collect();
            cleaned.parse::<f64>().map_err(|_| {
                SandboxError::value_error(format!(
                    "could not convert string to float: {}",
                    crate::value::str_repr(s)
                ))
            })
        }
        other if other.is_number() => other.as_float(),
        other => Err(SandboxError::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Stable sort with an optional key function, as `sorted` and `list.sort`.
///
/// Incomparable items raise `TypeError` instead of producing an arbitrary
/// order.
pub fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<Value>,
    reverse: bool,
) -> Result<Vec<Value>> {
    let keys = match &key {
        Some(func) => items
            .iter()
            .map(|item| interp.call_value(func, CallArgs::new(vec![item.clone()])))
            .collect::<Result<Vec<_>>>()?,
        None => items.clone(),
    };
    let before = |a: usize, b: usize| -> Result<bool> {
        let ordering = compare_values(&keys[a], &keys[b])?;
        Ok(if reverse {
            ordering == Some(Ordering::Greater)
        } else {
            ordering == Some(Ordering::Less)
        })
    };
    let order = merge_sort((0..items.len()).collect(), &before)?;
    Ok(order.into_iter().map(|i| items[i].clone()).collect())
}

fn merge_sort(
    indices: Vec<usize>,
    before: &dyn Fn(usize, usize) -> Result<bool>,
) -> Result<Vec<usize>> {
    if indices.len() <= 1 {
        return Ok(indices);
    }
    let mut left = indices;
    let right = left.split_off(left.len() / 2);
    let left = merge_sort(left, before)?;
    let right = merge_sort(right, before)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        // Take from the right only when strictly earlier, keeping ties stable.
        if before(right[j], left[i])? {
            merged.push(right[j]);
            j += 1;
        } else {
            merged.push(left[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    Ok(merged)
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn one_arg<'a>(args: &'a CallArgs, name: &str) -> Result<&'a Value> {
    args.expect(name, 1, 1)?;
    Ok(&args.positional[0])
}

fn builtin_abs(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    match one_arg(&args, "abs")? {
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(SandboxError::overflow),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::TimeDelta(d) => Ok(Value::TimeDelta(d.abs())),
        other => Err(SandboxError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn builtin_all(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let items = ops::iterate(one_arg(&args, "all")?)?;
    Ok(Value::Bool(items.iter().all(Value::truthy)))
}

fn builtin_any(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let items = ops::iterate(one_arg(&args, "any")?)?;
    Ok(Value::Bool(items.iter().any(Value::truthy)))
}

fn radix_repr(args: &CallArgs, name: &str, prefix: &str) -> Result<Value> {
    let i = one_arg(args, name)?.as_int()?;
    let magnitude = i.unsigned_abs();
    let digits = match prefix {
        "0b" => format!("{magnitude:b}"),
        "0o" => format!("{magnitude:o}"),
        _ => format!("{magnitude:x}"),
    };
    let sign = if i < 0 { "-" } else { "" };
    Ok(Value::from(format!("{sign}{prefix}{digits}")))
}

fn builtin_bin(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    radix_repr(&args, "bin", "0b")
}

fn builtin_oct(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    radix_repr(&args, "oct", "0o")
}

fn builtin_hex(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    radix_repr(&args, "hex", "0x")
}

fn builtin_callable(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    Ok(Value::Bool(one_arg(&args, "callable")?.is_callable()))
}

fn builtin_chr(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let code = one_arg(&args, "chr")?.as_int()?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::from(c.to_string()))
        .ok_or_else(|| SandboxError::value_error("chr() arg not in range(0x110000)"))
}

fn builtin_ord(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let text = one_arg(&args, "ord")?.as_str()?;
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(i64::from(u32::from(c)))),
        _ => Err(SandboxError::type_error(format!(
            "ord() expected a character, but string of length {} found",
            text.chars().count()
        ))),
    }
}

fn builtin_divmod(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("divmod", 2, 2)?;
    let (a, b) = (&args.positional[0], &args.positional[1]);
    let quotient = ops::binary(BinOp::FloorDiv, a, b)?;
    let remainder = ops::binary(BinOp::Mod, a, b)?;
    Ok(Value::tuple(vec![quotient, remainder]))
}

fn builtin_enumerate(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("enumerate", 1, 2)?;
    let start = args.arg(1, "start").map_or(Ok(0), Value::as_int)?;
    let items = ops::iterate(&args.positional[0])?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let index = start.checked_add(i as i64).ok_or_else(SandboxError::overflow)?;
        out.push(Value::tuple(vec![Value::Int(index), item]));
    }
    Ok(Value::list(out))
}

fn builtin_filter(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("filter", 2, 2)?;
    let func = &args.positional[0];
    let mut out = Vec::new();
    for item in ops::iterate(&args.positional[1])? {
        let keep = if func.is_none() {
            item.truthy()
        } else {
            interp.call_value(func, CallArgs::new(vec![item.clone()]))?.truthy()
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn builtin_map(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    if args.len() < 2 {
        return Err(SandboxError::type_error("map() must have at least two arguments."));
    }
    let func = &args.positional[0];
    let columns = args.positional[1..]
        .iter()
        .map(ops::iterate)
        .collect::<Result<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut out = Vec::with_capacity(rows);
    for row in 0..rows {
        let call_args = columns.iter().map(|col| col[row].clone()).collect();
        out.push(interp.call_value(func, CallArgs::new(call_args))?);
    }
    Ok(Value::list(out))
}

fn builtin_zip(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.allow_keywords("zip", &["strict"])?;
    let strict = args.keyword("strict").is_some_and(Value::truthy);
    let columns = args
        .positional
        .iter()
        .map(ops::iterate)
        .collect::<Result<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    if strict && columns.iter().any(|col| col.len() != rows) {
        return Err(SandboxError::value_error("zip() arguments have different lengths"));
    }
    Ok(Value::list(
        (0..rows)
            .map(|row| Value::tuple(columns.iter().map(|col| col[row].clone()).collect()))
            .collect(),
    ))
}

fn builtin_format(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("format", 1, 2)?;
    let spec = match args.get(1) {
        Some(spec) => spec.as_str()?.to_string(),
        None => String::new(),
    };
    format_value(&args.positional[0], &spec).map(Value::from)
}

fn builtin_getattr(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("getattr", 2, 3)?;
    let name = args.positional[1].as_str()?.to_string();
    match interp.get_attr(&args.positional[0], &name) {
        Err(SandboxError::Exception(exc)) if exc.kind == "AttributeError" => match args.get(2) {
            Some(default) => Ok(default.clone()),
            None => Err(SandboxError::Exception(exc)),
        },
        other => other,
    }
}

fn builtin_hasattr(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("hasattr", 2, 2)?;
    let name = args.positional[1].as_str()?.to_string();
    match interp.get_attr(&args.positional[0], &name) {
        Ok(_) => Ok(Value::Bool(true)),
        Err(SandboxError::Exception(exc)) if exc.kind == "AttributeError" => {
            Ok(Value::Bool(false))
        }
        Err(err) => Err(err),
    }
}

fn builtin_hash(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let value = one_arg(&args, "hash")?;
    let key = HashKey::of(value)?;
    if let HashKey::Int(i) = key {
        return Ok(Value::Int(i));
    }
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    Ok(Value::Int(hasher.finish() as i64))
}

fn builtin_id(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let value = one_arg(&args, "id")?;
    let address = match value {
        Value::List(items) => Rc::as_ptr(items) as *const () as usize,
        Value::Dict(d) => Rc::as_ptr(d) as *const () as usize,
        Value::Set(s) => Rc::as_ptr(s) as *const () as usize,
        Value::Tuple(items) => items.as_ptr() as usize,
        Value::Str(s) => s.as_ptr() as usize,
        Value::Function(f) => Rc::as_ptr(f) as usize,
        Value::Object(o) => Rc::as_ptr(o) as *const () as usize,
        Value::Exception(e) => Rc::as_ptr(e) as usize,
        other => {
            let mut hasher = DefaultHasher::new();
            other.repr().hash(&mut hasher);
            hasher.finish() as usize
        }
    };
    Ok(Value::Int(address as i64))
}

fn type_list(spec: &Value, func: &str) -> Result<Vec<TypeKind>> {
    match spec {
        Value::Type(kind) => Ok(vec![kind.clone()]),
        Value::Tuple(items) => {
            let mut kinds = Vec::new();
            for item in items.iter() {
                kinds.extend(type_list(item, func)?);
            }
            Ok(kinds)
        }
        _ => Err(SandboxError::type_error(format!(
            "{func}() arg 2 must be a type, a tuple of types, or a union"
        ))),
    }
}

fn builtin_isinstance(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("isinstance", 2, 2)?;
    let kind = args.positional[0].type_kind();
    let kinds = type_list(&args.positional[1], "isinstance")?;
    Ok(Value::Bool(kinds.iter().any(|k| kind.is_subtype_of(k))))
}

fn builtin_issubclass(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("issubclass", 2, 2)?;
    let Value::Type(kind) = &args.positional[0] else {
        return Err(SandboxError::type_error("issubclass() arg 1 must be a class"));
    };
    let kinds = type_list(&args.positional[1], "issubclass")?;
    Ok(Value::Bool(kinds.iter().any(|k| kind.is_subtype_of(k))))
}

/// `len(value)`.
pub fn length(value: &Value) -> Result<usize> {
    let len = match value {
        Value::Str(s) => Some(s.chars().count()),
        Value::List(items) => Some(items.borrow().len()),
        Value::Tuple(items) => Some(items.len()),
        Value::Dict(d) => Some(d.borrow().len()),
        Value::Set(s) => Some(s.borrow().len()),
        Value::Range(r) => Some(r.len()),
        Value::Object(o) => o.len(),
        _ => None,
    };
    len.ok_or_else(|| {
        SandboxError::type_error(format!("object of type '{}' has no len()", value.type_name()))
    })
}

fn builtin_len(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    length(one_arg(&args, "len")?).map(|n| Value::Int(n as i64))
}

fn extreme(interp: &mut Interpreter, args: CallArgs, name: &str, want: Ordering) -> Result<Value> {
    args.allow_keywords(name, &["key", "default"])?;
    let items = match args.positional.as_slice() {
        [] => {
            return Err(SandboxError::type_error(format!(
                "{name} expected at least 1 argument, got 0"
            )));
        }
        [single] => ops::iterate(single)?,
        many => many.to_vec(),
    };
    if items.is_empty() {
        return match args.keyword("default") {
            Some(default) => Ok(default.clone()),
            None => Err(SandboxError::value_error(format!(
                "{name}() iterable argument is empty"
            ))),
        };
    }
    let key = args.keyword("key").filter(|k| !k.is_none()).cloned();
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let k = match &key {
            Some(func) => interp.call_value(func, CallArgs::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => compare_values(&k, best_key)? == Some(want),
        };
        if replace {
            best = Some((k, item));
        }
    }
    best.map(|(_, item)| item)
        .ok_or_else(|| SandboxError::Internal("empty extreme".into()))
}

fn builtin_max(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    extreme(interp, args, "max", Ordering::Greater)
}

fn builtin_min(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    extreme(interp, args, "min", Ordering::Less)
}

fn builtin_pow(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("pow", 2, 3)?;
    let (base, exp) = (&args.positional[0], &args.positional[1]);
    match args.get(2) {
        None | Some(Value::None) => ops::power(base, exp),
        Some(modulus) => {
            let (b, e, m) = (base.as_int()?, exp.as_int()?, modulus.as_int()?);
            if m == 0 {
                return Err(SandboxError::value_error("pow() 3rd argument cannot be 0"));
            }
            if e < 0 {
                return Err(SandboxError::value_error(
                    "pow() negative exponent not supported with a modulus",
                ));
            }
            let modulus = i128::from(m).abs();
            let mut result: i128 = 1 % modulus;
            let mut b = i128::from(b).rem_euclid(modulus);
            let mut e = e;
            while e > 0 {
                if e & 1 == 1 {
                    result = result * b % modulus;
                }
                b = b * b % modulus;
                e >>= 1;
            }
            // The result takes the sign of the modulus.
            if m < 0 && result != 0 {
                result -= modulus;
            }
            i64::try_from(result)
                .map(Value::Int)
                .map_err(|_| SandboxError::overflow())
        }
    }
}

fn builtin_repr(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    Ok(Value::from(one_arg(&args, "repr")?.repr()))
}

fn builtin_reversed(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let value = one_arg(&args, "reversed")?;
    if matches!(value, Value::Set(_)) {
        return Err(SandboxError::type_error("'set' object is not reversible"));
    }
    let mut items = ops::iterate(value)?;
    items.reverse();
    Ok(Value::list(items))
}

/// Round half to even at `digits` decimal places.
fn round_float(f: f64, digits: i64) -> f64 {
    if !f.is_finite() {
        return f;
    }
    if digits >= 0 {
        let digits = digits.min(300) as usize;
        format!("{f:.digits$}").parse().unwrap_or(f)
    } else {
        let factor = 10f64.powi(digits.unsigned_abs().min(308) as i32);
        (f / factor).round_ties_even() * factor
    }
}

fn builtin_round(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("round", 1, 2)?;
    let digits = match args.arg(1, "ndigits") {
        None | Some(Value::None) => None,
        Some(v) => Some(v.as_int()?),
    };
    match (&args.positional[0], digits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(d)) => Ok(Value::Float(round_float(*f, d))),
        (v @ (Value::Int(_) | Value::Bool(_)), None) => Ok(Value::Int(v.as_int()?)),
        (v @ (Value::Int(_) | Value::Bool(_)), Some(d)) => {
            let i = v.as_int()?;
            if d >= 0 {
                return Ok(Value::Int(i));
            }
            let Some(factor) = 10i64.checked_pow(d.unsigned_abs().min(u64::from(u32::MAX)) as u32)
            else {
                return Ok(Value::Int(0));
            };
            let quotient = i.div_euclid(factor);
            let remainder = i.rem_euclid(factor);
            let rounded = match (remainder * 2).cmp(&factor) {
                Ordering::Less => quotient,
                Ordering::Greater => quotient + 1,
                Ordering::Equal => quotient + (quotient & 1),
            };
            rounded
                .checked_mul(factor)
                .map(Value::Int)
                .ok_or_else(SandboxError::overflow)
        }
        (other, _) => Err(SandboxError::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn builtin_sorted(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("sorted", 1, 1)?;
    args.allow_keywords("sorted", &["key", "reverse"])?;
    let items = ops::iterate(&args.positional[0])?;
    let key = args.keyword("key").filter(|k| !k.is_none()).cloned();
    let reverse = args.keyword("reverse").is_some_and(Value::truthy);
    sort_values(interp, items, key, reverse).map(Value::list)
}

fn builtin_sum(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("sum", 1, 2)?;
    let start = args.arg(1, "start").cloned().unwrap_or(Value::Int(0));
    if matches!(start, Value::Str(_)) {
        return Err(SandboxError::type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    let mut total = start;
    for item in ops::iterate(&args.positional[0])? {
        total = ops::binary(BinOp::Add, &total, &item)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_parsing() {
        assert_eq!(parse_int(" 42 ", 10).unwrap(), 42);
        assert_eq!(parse_int("-0x1f", 0).unwrap(), -31);
        assert_eq!(parse_int("ff", 16).unwrap(), 255);
        assert_eq!(parse_int("1_000", 10).unwrap(), 1000);
        let err = parse_int("4.5", 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: invalid literal for int() with base 10: '4.5'"
        );
        assert!(matches!(
            parse_int("99999999999999999999", 10),
            Err(SandboxError::Exception(e)) if e.kind == "OverflowError"
        ));
    }

    #[test]
    fn float_parsing() {
        assert_eq!(to_float(&Value::from(" 2.5 ")).unwrap(), 2.5);
        assert!(to_float(&Value::from("nan")).unwrap().is_nan());
        assert_eq!(to_float(&Value::from("-inf")).unwrap(), f64::NEG_INFINITY);
        assert!(to_float(&Value::from("abc")).is_err());
        assert_eq!(to_int(&Value::Float(-2.7), None).unwrap(), -2);
    }

    #[test]
    fn rounding_is_half_even() {
        assert_eq!(round_float(2.675, 2), 2.67);
        assert_eq!(round_float(1234.5, -2), 1200.0);
        assert_eq!(2.5f64.round_ties_even(), 2.0);
    }

    #[test]
    fn merge_sort_is_stable() {
        let keys = [3, 1, 3, 2];
        let before = |a: usize, b: usize| -> Result<bool> { Ok(keys[a] < keys[b]) };
        assert_eq!(merge_sort(vec![0, 1, 2, 3], &before).unwrap(), vec![1, 3, 0, 2]);
    }

    #[test]
    fn length_of_values() {
        assert_eq!(length(&Value::from("héllo")).unwrap(), 5);
        assert!(length(&Value::Int(3)).is_err());
    }

    #[test]
    fn namespace_contents() {
        let names = builtins();
        for name in ["len", "sorted", "ValueError", "math", "dt_util", "__import__", "True"] {
            assert!(names.contains_key(name), "{name} missing");
        }
        assert!(!names.contains_key("open"));
        assert!(!names.contains_key("eval"));
    }
}
