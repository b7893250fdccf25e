//! Operator semantics.
//!
//! Arithmetic follows the script language's rules: integers are 64-bit and
//! overflow raises `OverflowError`, `/` always produces a float, `//` and
//! `%` round toward negative infinity, and mixed int/float arithmetic
//! promotes to float. Date and time values support the usual offset
//! arithmetic.

use std::cmp::Ordering;
use std::rc::Rc;

use chrono::TimeDelta;

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::{Result, SandboxError};
use crate::format;
use crate::value::{
    DateTimeValue, Dict, HashKey, RangeValue, SliceValue, Value, compare_values,
    values_equal,
};

/// Upper bound on the length of sequences built by repetition.
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

fn unsupported(op: &str, a: &Value, b: &Value) -> SandboxError {
    SandboxError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

fn too_long() -> SandboxError {
    SandboxError::exception("MemoryError", "sequence is too long")
}

fn int_like(v: &Value) -> Option<i64> {
    match v {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn both_ints(a: &Value, b: &Value) -> Option<(i64, i64)> {
    Some((int_like(a)?, int_like(b)?))
}

fn both_numbers(a: &Value, b: &Value) -> Option<(f64, f64)> {
    if a.is_number() && b.is_number() {
        Some((a.as_float().ok()?, b.as_float().ok()?))
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Binary operators
// ---------------------------------------------------------------------------

pub fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    match op {
        BinOp::Add => add(a, b),
        BinOp::Sub => sub(a, b),
        BinOp::Mul => mul(a, b),
        BinOp::Div => div(a, b),
        BinOp::FloorDiv => floor_div(a, b),
        BinOp::Mod => modulo(a, b),
        BinOp::Pow => power(a, b),
        BinOp::LShift | BinOp::RShift => shift(op, a, b),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => bitwise(op, a, b),
        BinOp::MatMul => Err(unsupported("@", a, b)),
    }
}

fn add(a: &Value, b: &Value) -> Result<Value> {
    if let Some((x, y)) = both_ints(a, b) {
        return x.checked_add(y).map(Value::Int).ok_or_else(SandboxError::overflow);
    }
    if let Some((x, y)) = both_numbers(a, b) {
        return Ok(Value::Float(x + y));
    }
    Ok(match (a, b) {
        (Value::Str(x), Value::Str(y)) => {
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Value::from(s)
        }
        (Value::Str(_), other) => {
            return Err(SandboxError::type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                other.type_name()
            )));
        }
        (Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            items.extend(y.borrow().iter().cloned());
            Value::list(items)
        }
        (Value::List(_), other) => {
            return Err(SandboxError::type_error(format!(
                "can only concatenate list (not \"{}\") to list",
                other.type_name()
            )));
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            Value::tuple(x.iter().chain(y.iter()).cloned().collect())
        }
        (Value::TimeDelta(x), Value::TimeDelta(y)) => Value::TimeDelta(checked_delta(x.checked_add(y))?),
        (Value::DateTime(dt), Value::TimeDelta(d)) | (Value::TimeDelta(d), Value::DateTime(dt)) => {
            Value::DateTime(shift_datetime(dt, *d)?)
        }
        (Value::Date(date), Value::TimeDelta(d)) | (Value::TimeDelta(d), Value::Date(date)) => {
            let shifted = date
                .checked_add_signed(TimeDelta::days(d.num_days()))
                .ok_or_else(|| SandboxError::exception("OverflowError", "date value out of range"))?;
            Value::Date(shifted)
        }
        _ => return Err(unsupported("+", a, b)),
    })
}

fn sub(a: &Value, b: &Value) -> Result<Value> {
    if let Some((x, y)) = both_ints(a, b) {
        return x.checked_sub(y).map(Value::Int).ok_or_else(SandboxError::overflow);
    }
    if let Some((x, y)) = both_numbers(a, b) {
        return Ok(Value::Float(x - y));
    }
    Ok(match (a, b) {
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            Value::set(
                x.iter()
                    .filter(|(k, _)| !y.contains_key(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
        }
        (Value::TimeDelta(x), Value::TimeDelta(y)) => Value::TimeDelta(checked_delta(x.checked_sub(y))?),
        (Value::DateTime(dt), Value::TimeDelta(d)) => Value::DateTime(shift_datetime(dt, -*d)?),
        (Value::DateTime(x), Value::DateTime(y)) => {
            let delta = match (x.utc_instant(), y.utc_instant()) {
                (Some(ix), Some(iy)) => ix - iy,
                (None, None) => x.naive - y.naive,
                _ => {
                    return Err(SandboxError::type_error(
                        "can't subtract offset-naive and offset-aware datetimes",
                    ));
                }
            };
            Value::TimeDelta(delta)
        }
        (Value::Date(date), Value::TimeDelta(d)) => {
            let shifted = date
                .checked_sub_signed(TimeDelta::days(d.num_days()))
                .ok_or_else(|| SandboxError::exception("OverflowError", "date value out of range"))?;
            Value::Date(shifted)
        }
        (Value::Date(x), Value::Date(y)) => Value::TimeDelta(*x - *y),
        _ => return Err(unsupported("-", a, b)),
    })
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>> {
    let times = usize::try_from(times.max(0)).map_err(|_| too_long())?;
    if items.len().saturating_mul(times) > MAX_SEQUENCE_LEN {
        return Err(too_long());
    }
    Ok(std::iter::repeat_n(items, times).flatten().cloned().collect())
}

fn mul(a: &Value, b: &Value) -> Result<Value> {
    if let Some((x, y)) = both_ints(a, b) {
        return x.checked_mul(y).map(Value::Int).ok_or_else(SandboxError::overflow);
    }
    if let Some((x, y)) = both_numbers(a, b) {
        return Ok(Value::Float(x * y));
    }
    let seq_times = |seq: &Value, n: i64| -> Result<Value> {
        Ok(match seq {
            Value::Str(s) => {
                let times = usize::try_from(n.max(0)).map_err(|_| too_long())?;
                if s.len().saturating_mul(times) > MAX_SEQUENCE_LEN {
                    return Err(too_long());
                }
                Value::from(s.repeat(times))
            }
            Value::List(items) => Value::list(repeat(&items.borrow(), n)?),
            Value::Tuple(items) => Value::tuple(repeat(items, n)?),
            _ => return Err(unsupported("*", a, b)),
        })
    };
    match (a, b) {
        (Value::Str(_) | Value::List(_) | Value::Tuple(_), n) if int_like(n).is_some() => {
            seq_times(a, int_like(n).unwrap_or_default())
        }
        (n, Value::Str(_) | Value::List(_) | Value::Tuple(_)) if int_like(n).is_some() => {
            seq_times(b, int_like(n).unwrap_or_default())
        }
        (Value::TimeDelta(d), n) | (n, Value::TimeDelta(d)) if n.is_number() => {
            Ok(Value::TimeDelta(scale_delta(d, n.as_float()?)?))
        }
        _ => Err(unsupported("*", a, b)),
    }
}

fn div(a: &Value, b: &Value) -> Result<Value> {
    if let Some((x, y)) = both_numbers(a, b) {
        if y == 0.0 {
            return Err(SandboxError::zero_division("division by zero"));
        }
        return Ok(Value::Float(x / y));
    }
    match (a, b) {
        (Value::TimeDelta(x), Value::TimeDelta(y)) => {
            let denominator = delta_micros(y);
            if denominator == 0 {
                return Err(SandboxError::zero_division("division by zero"));
            }
            Ok(Value::Float(delta_micros(x) as f64 / denominator as f64))
        }
        (Value::TimeDelta(d), n) if n.is_number() => {
            let n = n.as_float()?;
            if n == 0.0 {
                return Err(SandboxError::zero_division("division by zero"));
            }
            Ok(Value::TimeDelta(scale_delta(d, 1.0 / n)?))
        }
        _ => Err(unsupported("/", a, b)),
    }
}

/// Integer division rounding toward negative infinity.
pub fn floor_div_int(x: i64, y: i64) -> Result<i64> {
    if y == 0 {
        return Err(SandboxError::zero_division(
            "integer division or modulo by zero",
        ));
    }
    let q = x.checked_div(y).ok_or_else(SandboxError::overflow)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Integer modulo with the sign of the divisor.
pub fn mod_int(x: i64, y: i64) -> Result<i64> {
    if y == 0 {
        return Err(SandboxError::zero_division("integer modulo by zero"));
    }
    let r = x.checked_rem(y).unwrap_or(0);
    Ok(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r })
}

pub fn mod_float(x: f64, y: f64) -> Result<f64> {
    if y == 0.0 {
        return Err(SandboxError::zero_division("float modulo"));
    }
    let r = x % y;
    Ok(if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r })
}

fn floor_div(a: &Value, b: &Value) -> Result<Value> {
    if let Some((x, y)) = both_ints(a, b) {
        return floor_div_int(x, y).map(Value::Int);
    }
    if let Some((x, y)) = both_numbers(a, b) {
        if y == 0.0 {
            return Err(SandboxError::zero_division("float floor division by zero"));
        }
        return Ok(Value::Float((x / y).floor()));
    }
    match (a, b) {
        (Value::TimeDelta(x), Value::TimeDelta(y)) => {
            floor_div_int(delta_micros(x), delta_micros(y)).map(Value::Int)
        }
        (Value::TimeDelta(d), n) if int_like(n).is_some() => {
            let micros = floor_div_int(delta_micros(d), int_like(n).unwrap_or(1))?;
            Ok(Value::TimeDelta(TimeDelta::microseconds(micros)))
        }
        _ => Err(unsupported("//", a, b)),
    }
}

fn modulo(a: &Value, b: &Value) -> Result<Value> {
    if let Value::Str(fmt) = a {
        return format::percent_format(fmt, b).map(Value::from);
    }
    if let Some((x, y)) = both_ints(a, b) {
        return mod_int(x, y).map(Value::Int);
    }
    if let Some((x, y)) = both_numbers(a, b) {
        return mod_float(x, y).map(Value::Float);
    }
    match (a, b) {
        (Value::TimeDelta(x), Value::TimeDelta(y)) => {
            mod_int(delta_micros(x), delta_micros(y))
                .map(|micros| Value::TimeDelta(TimeDelta::microseconds(micros)))
        }
        _ => Err(unsupported("%", a, b)),
    }
}

pub fn power(a: &Value, b: &Value) -> Result<Value> {
    if let Some((x, y)) = both_ints(a, b) {
        if y >= 0 {
            let exp = u32::try_from(y).map_err(|_| SandboxError::overflow())?;
            return x.checked_pow(exp).map(Value::Int).ok_or_else(SandboxError::overflow);
        }
        if x == 0 {
            return Err(SandboxError::zero_division(
                "0.0 cannot be raised to a negative power",
            ));
        }
        return Ok(Value::Float((x as f64).powf(y as f64)));
    }
    if let Some((x, y)) = both_numbers(a, b) {
        if x == 0.0 && y < 0.0 {
            return Err(SandboxError::zero_division(
                "0.0 cannot be raised to a negative power",
            ));
        }
        if x < 0.0 && y.fract() != 0.0 {
            return Err(SandboxError::value_error("math domain error"));
        }
        let result = x.powf(y);
        if result.is_infinite() && x.is_finite() && y.is_finite() {
            return Err(SandboxError::exception(
                "OverflowError",
                "(34, 'Numerical result out of range')",
            ));
        }
        return Ok(Value::Float(result));
    }
    Err(unsupported("** or pow()", a, b))
}

fn shift(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    let Some((x, y)) = both_ints(a, b) else {
        return Err(unsupported(op.symbol(), a, b));
    };
    if y < 0 {
        return Err(SandboxError::value_error("negative shift count"));
    }
    if op == BinOp::RShift {
        return Ok(Value::Int(if y >= 64 { if x < 0 { -1 } else { 0 } } else { x >> y }));
    }
    if x == 0 {
        return Ok(Value::Int(0));
    }
    if y >= 64 {
        return Err(SandboxError::overflow());
    }
    let wide = i128::from(x) << y;
    i64::try_from(wide).map(Value::Int).map_err(|_| SandboxError::overflow())
}

fn bitwise(op: BinOp, a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Ok(Value::Bool(match op {
            BinOp::BitAnd => x & y,
            BinOp::BitOr => x | y,
            _ => x ^ y,
        })),
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            let data = match op {
                BinOp::BitAnd => x
                    .iter()
                    .filter(|(k, _)| y.contains_key(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                BinOp::BitOr => {
                    let mut data = x.clone();
                    for (k, v) in y.iter() {
                        data.entry(k.clone()).or_insert_with(|| v.clone());
                    }
                    data
                }
                _ => x
                    .iter()
                    .filter(|(k, _)| !y.contains_key(*k))
                    .chain(y.iter().filter(|(k, _)| !x.contains_key(*k)))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            };
            Ok(Value::set(data))
        }
        (Value::Dict(x), Value::Dict(y)) if op == BinOp::BitOr => {
            let mut merged = x.borrow().clone();
            for (key, value) in y.borrow().entries.values() {
                merged.insert(key.clone(), value.clone())?;
            }
            Ok(Value::dict(merged))
        }
        _ => {
            let Some((x, y)) = both_ints(a, b) else {
                return Err(unsupported(op.symbol(), a, b));
            };
            Ok(Value::Int(match op {
                BinOp::BitAnd => x & y,
                BinOp::BitOr => x | y,
                _ => x ^ y,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Time arithmetic helpers
// ---------------------------------------------------------------------------

fn checked_delta(delta: Option<TimeDelta>) -> Result<TimeDelta> {
    delta.ok_or_else(|| SandboxError::exception("OverflowError", "timedelta out of range"))
}

/// Total microseconds in a delta.
pub fn delta_micros(delta: &TimeDelta) -> i64 {
    delta.num_microseconds().unwrap_or(i64::MAX)
}

fn scale_delta(delta: &TimeDelta, factor: f64) -> Result<TimeDelta> {
    let micros = (delta_micros(delta) as f64 * factor).round_ties_even();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return Err(SandboxError::exception("OverflowError", "timedelta out of range"));
    }
    Ok(TimeDelta::microseconds(micros as i64))
}

fn shift_datetime(dt: &DateTimeValue, delta: TimeDelta) -> Result<DateTimeValue> {
    let naive = dt
        .naive
        .checked_add_signed(delta)
        .ok_or_else(|| SandboxError::exception("OverflowError", "date value out of range"))?;
    Ok(DateTimeValue {
        naive,
        offset: dt.offset,
    })
}

// ---------------------------------------------------------------------------
// Unary operators
// ---------------------------------------------------------------------------

pub fn unary(op: UnaryOp, v: &Value) -> Result<Value> {
    let bad = || {
        let symbol = match op {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
            UnaryOp::Not => "not",
        };
        SandboxError::type_error(format!(
            "bad operand type for unary {symbol}: '{}'",
            v.type_name()
        ))
    };
    match op {
        UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
        UnaryOp::Neg => match v {
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::TimeDelta(d) => Ok(Value::TimeDelta(-*d)),
            other => match int_like(other) {
                Some(i) => i.checked_neg().map(Value::Int).ok_or_else(SandboxError::overflow),
                None => Err(bad()),
            },
        },
        UnaryOp::Pos => match v {
            Value::Float(_) | Value::TimeDelta(_) => Ok(v.clone()),
            other => int_like(other).map(Value::Int).ok_or_else(bad),
        },
        UnaryOp::Invert => int_like(v).map(|i| Value::Int(!i)).ok_or_else(bad),
    }
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

pub fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool> {
    let ordered = |symbol: &str, accept: fn(Ordering) -> bool| -> Result<bool> {
        match compare_values(a, b) {
            Ok(ordering) => Ok(ordering.is_some_and(accept)),
            Err(SandboxError::Exception(exc))
                if exc.kind == "TypeError" && exc.message.starts_with("'<' not supported") =>
            {
                Err(SandboxError::type_error(format!(
                    "'{symbol}' not supported between instances of '{}' and '{}'",
                    a.type_name(),
                    b.type_name()
                )))
            }
            Err(err) => Err(err),
        }
    };
    match op {
        CmpOp::Eq => Ok(values_equal(a, b)),
        CmpOp::NotEq => Ok(!values_equal(a, b)),
        CmpOp::Lt => ordered("<", Ordering::is_lt),
        CmpOp::Le => ordered("<=", Ordering::is_le),
        CmpOp::Gt => ordered(">", Ordering::is_gt),
        CmpOp::Ge => ordered(">=", Ordering::is_ge),
        CmpOp::In => contains(b, a),
        CmpOp::NotIn => contains(b, a).map(|found| !found),
        CmpOp::Is => Ok(is_same(a, b)),
        CmpOp::IsNot => Ok(!is_same(a, b)),
    }
}

/// Identity comparison (`is`).
pub fn is_same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || (x.is_empty() && y.is_empty()),
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Exception(x), Value::Exception(y)) => Rc::ptr_eq(x, y),
        (Value::Object(x), Value::Object(y)) => std::ptr::addr_eq(Rc::as_ptr(x), Rc::as_ptr(y)),
        (Value::Type(x), Value::Type(y)) => x == y,
        (Value::Builtin(x), Value::Builtin(y)) => x.name == y.name,
        _ => false,
    }
}

/// Membership test (`item in container`).
pub fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_ref())),
            other => Err(SandboxError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| values_equal(v, item))),
        Value::Tuple(items) => Ok(items.iter().any(|v| values_equal(v, item))),
        Value::Dict(d) => d.borrow().contains(item),
        Value::Set(s) => Ok(s.borrow().contains_key(&HashKey::of(item)?)),
        Value::Range(r) => Ok(match int_like(item) {
            Some(i) => range_contains(r, i),
            None => false,
        }),
        Value::Object(o) => match o.iterate() {
            Some(items) => Ok(items.iter().any(|v| values_equal(v, item))),
            None => Err(not_iterable(container)),
        },
        other => Err(SandboxError::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn range_contains(r: &RangeValue, i: i64) -> bool {
    let in_bounds = if r.step > 0 {
        i >= r.start && i < r.stop
    } else {
        i <= r.start && i > r.stop
    };
    in_bounds && (i128::from(i) - i128::from(r.start)) % i128::from(r.step) == 0
}

// ---------------------------------------------------------------------------
// Iteration and item access
// ---------------------------------------------------------------------------

fn not_iterable(value: &Value) -> SandboxError {
    SandboxError::type_error(format!("'{}' object is not iterable", value.type_name()))
}

/// Items produced by iterating a value.
pub fn iterate(value: &Value) -> Result<Vec<Value>> {
    if let Value::Range(r) = value {
        if r.len() > MAX_SEQUENCE_LEN {
            return Err(too_long());
        }
    }
    value.sequence_items().ok_or_else(|| not_iterable(value))
}

/// Resolve a possibly negative index against a length.
pub fn normalize_index(index: i64, len: usize, what: &str) -> Result<usize> {
    let len_i = len as i64;
    let resolved = if index < 0 { index + len_i } else { index };
    if resolved < 0 || resolved >= len_i {
        return Err(SandboxError::index_error(format!("{what} index out of range")));
    }
    Ok(resolved as usize)
}

fn index_of(index: &Value, type_name: &str) -> Result<i64> {
    int_like(index).ok_or_else(|| {
        SandboxError::type_error(format!(
            "{type_name} indices must be integers or slices, not {}",
            index.type_name()
        ))
    })
}

/// `obj[index]` for built-in containers and host objects.
pub fn get_item(obj: &Value, index: &Value) -> Result<Value> {
    match (obj, index) {
        (Value::List(items), Value::Slice(s)) => {
            let items = items.borrow();
            Ok(Value::list(select(&items, s)?))
        }
        (Value::List(items), _) => {
            let items = items.borrow();
            let i = normalize_index(index_of(index, "list")?, items.len(), "list")?;
            Ok(items[i].clone())
        }
        (Value::Tuple(items), Value::Slice(s)) => Ok(Value::tuple(select(items, s)?)),
        (Value::Tuple(items), _) => {
            let i = normalize_index(index_of(index, "tuple")?, items.len(), "tuple")?;
            Ok(items[i].clone())
        }
        (Value::Str(s), Value::Slice(slice)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::from(
                slice
                    .indices(chars.len())?
                    .into_iter()
                    .map(|i| chars[i])
                    .collect::<String>(),
            ))
        }
        (Value::Str(s), _) => {
            let i = index_of(index, "string")?;
            let len = s.chars().count();
            let i = normalize_index(i, len, "string")?;
            Ok(Value::from(s.chars().nth(i).map(String::from).unwrap_or_default()))
        }
        (Value::Range(r), Value::Slice(s)) => {
            let picked = s.indices(r.len())?;
            let step = r
                .step
                .checked_mul(s.step.unwrap_or(1))
                .ok_or_else(SandboxError::overflow)?;
            Ok(Value::Range(match (picked.first(), picked.last()) {
                (Some(first), Some(last)) => RangeValue {
                    start: r.get(*first),
                    stop: r
                        .get(*last)
                        .checked_add(step)
                        .ok_or_else(SandboxError::overflow)?,
                    step,
                },
                _ => RangeValue {
                    start: 0,
                    stop: 0,
                    step: 1,
                },
            }))
        }
        (Value::Range(r), _) => {
            let i = normalize_index(index_of(index, "range object")?, r.len(), "range object")?;
            Ok(Value::Int(r.get(i)))
        }
        (Value::Dict(d), _) => {
            let d = d.borrow();
            match d.get(index)? {
                Some(v) => Ok(v),
                None if d.kind == crate::value::DictKind::Counter => Ok(Value::Int(0)),
                None => Err(SandboxError::key_error(index.repr())),
            }
        }
        (Value::Object(o), _) => o.get_item(index),
        _ => Err(SandboxError::type_error(format!(
            "'{}' object is not subscriptable",
            obj.type_name()
        ))),
    }
}

fn select(items: &[Value], slice: &SliceValue) -> Result<Vec<Value>> {
    Ok(slice
        .indices(items.len())?
        .into_iter()
        .map(|i| items[i].clone())
        .collect())
}

/// `obj[index] = value`.
pub fn set_item(obj: &Value, index: &Value, value: Value) -> Result<()> {
    match (obj, index) {
        (Value::List(items), Value::Slice(s)) => {
            let replacement = iterate(&value)?;
            let mut items = items.borrow_mut();
            let step = s.step.unwrap_or(1);
            if step == 1 {
                let picked = s.indices(items.len())?;
                let start = match picked.first() {
                    Some(first) => *first,
                    None => {
                        let len = items.len() as i64;
                        let lower = s.lower.unwrap_or(0);
                        (if lower < 0 { lower + len } else { lower }).clamp(0, len) as usize
                    }
                };
                let end = start + picked.len();
                items.splice(start..end, replacement).for_each(drop);
            } else {
                let picked = s.indices(items.len())?;
                if picked.len() != replacement.len() {
                    return Err(SandboxError::value_error(format!(
                        "attempt to assign sequence of size {} to extended slice of size {}",
                        replacement.len(),
                        picked.len()
                    )));
                }
                for (i, v) in picked.into_iter().zip(replacement) {
                    items[i] = v;
                }
            }
            Ok(())
        }
        (Value::List(items), _) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index_of(index, "list")?, items.len(), "list assignment")?;
            items[i] = value;
            Ok(())
        }
        (Value::Dict(d), _) => d.borrow_mut().insert(index.clone(), value),
        _ => Err(SandboxError::type_error(format!(
            "'{}' object does not support item assignment",
            obj.type_name()
        ))),
    }
}

/// `del obj[index]`.
pub fn del_item(obj: &Value, index: &Value) -> Result<()> {
    match (obj, index) {
        (Value::List(items), Value::Slice(s)) => {
            let mut items = items.borrow_mut();
            let mut picked = s.indices(items.len())?;
            picked.sort_unstable();
            for i in picked.into_iter().rev() {
                items.remove(i);
            }
            Ok(())
        }
        (Value::List(items), _) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index_of(index, "list")?, items.len(), "list assignment")?;
            items.remove(i);
            Ok(())
        }
        (Value::Dict(d), _) => match d.borrow_mut().remove(index)? {
            Some(_) => Ok(()),
            None => Err(SandboxError::key_error(index.repr())),
        },
        _ => Err(SandboxError::type_error(format!(
            "'{}' object doesn't support item deletion",
            obj.type_name()
        ))),
    }
}

/// Build a dict from `(key, value)` pairs.
pub fn dict_from_pairs(pairs: Vec<Value>) -> Result<Dict> {
    let mut dict = Dict::new();
    for (n, pair) in pairs.into_iter().enumerate() {
        let items = iterate(&pair).map_err(|_| {
            SandboxError::type_error(format!(
                "cannot convert dictionary update sequence element #{n} to a sequence"
            ))
        })?;
        if items.len() != 2 {
            return Err(SandboxError::value_error(format!(
                "dictionary update sequence element #{n} has length {}; 2 is required",
                items.len()
            )));
        }
        let mut items = items.into_iter();
        if let (Some(k), Some(v)) = (items.next(), items.next()) {
            dict.insert(k, v)?;
        }
    }
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(binary(BinOp::Add, &int(2), &int(3)).unwrap().repr(), "5");
        assert_eq!(binary(BinOp::Div, &int(7), &int(2)).unwrap().repr(), "3.5");
        assert_eq!(binary(BinOp::FloorDiv, &int(-7), &int(2)).unwrap().repr(), "-4");
        assert_eq!(binary(BinOp::Mod, &int(-7), &int(3)).unwrap().repr(), "2");
        assert_eq!(binary(BinOp::Mod, &int(7), &int(-3)).unwrap().repr(), "-2");
        assert_eq!(binary(BinOp::Pow, &int(2), &int(-1)).unwrap().repr(), "0.5");
        assert_eq!(binary(BinOp::LShift, &int(1), &int(10)).unwrap().repr(), "1024");
    }

    #[test]
    fn overflow_is_reported() {
        let err = binary(BinOp::Mul, &int(i64::MAX), &int(2)).unwrap_err();
        assert_eq!(err.kind_name(), "OverflowError");
        assert!(binary(BinOp::Pow, &int(10), &int(40)).is_err());
    }

    #[test]
    fn range_slices_at_the_integer_limits() {
        let wide = Value::Range(RangeValue {
            start: 0,
            stop: i64::MAX,
            step: 1 << 62,
        });
        let every = |step: i64| {
            Value::Slice(SliceValue {
                lower: None,
                upper: None,
                step: Some(step),
            })
        };
        let err = get_item(&wide, &every(1)).unwrap_err();
        assert_eq!(err.kind_name(), "OverflowError");
        let err = get_item(&wide, &every(4)).unwrap_err();
        assert_eq!(err.kind_name(), "OverflowError");

        let full = Value::Range(RangeValue {
            start: i64::MIN,
            stop: i64::MAX,
            step: 1,
        });
        assert!(contains(&full, &int(i64::MAX - 1)).unwrap());
        assert!(!contains(&full, &int(i64::MAX)).unwrap());
    }

    #[test]
    fn zero_division() {
        let err = binary(BinOp::Div, &int(1), &int(0)).unwrap_err();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert!(binary(BinOp::Mod, &Value::Float(1.0), &Value::Float(0.0)).is_err());
    }

    #[test]
    fn sequences() {
        let s = binary(BinOp::Mul, &Value::from("ab"), &int(3)).unwrap();
        assert_eq!(s.to_str(), "ababab");
        let l = binary(
            BinOp::Add,
            &Value::list(vec![int(1)]),
            &Value::list(vec![int(2)]),
        )
        .unwrap();
        assert_eq!(l.repr(), "[1, 2]");
        let err = binary(BinOp::Add, &Value::from("a"), &int(1)).unwrap_err();
        assert!(err.to_string().contains("can only concatenate str"));
    }

    #[test]
    fn comparisons_and_membership() {
        assert!(compare(CmpOp::Lt, &int(1), &Value::Float(1.5)).unwrap());
        assert!(compare(CmpOp::In, &Value::from("ell"), &Value::from("hello")).unwrap());
        assert!(compare(CmpOp::NotIn, &int(5), &Value::list(vec![int(1)])).unwrap());
        let err = compare(CmpOp::Gt, &Value::from("a"), &int(1)).unwrap_err();
        assert!(err.to_string().contains("'>' not supported"));
        assert!(compare(CmpOp::Is, &Value::None, &Value::None).unwrap());
    }

    #[test]
    fn indexing() {
        let l = Value::list(vec![int(1), int(2), int(3)]);
        assert_eq!(get_item(&l, &int(-1)).unwrap().repr(), "3");
        assert!(get_item(&l, &int(3)).is_err());
        let slice = Value::Slice(SliceValue {
            lower: Some(1),
            upper: None,
            step: None,
        });
        assert_eq!(get_item(&l, &slice).unwrap().repr(), "[2, 3]");
        assert_eq!(get_item(&Value::from("héllo"), &int(1)).unwrap().to_str(), "é");
        set_item(&l, &int(0), int(9)).unwrap();
        del_item(&l, &int(1)).unwrap();
        assert_eq!(l.repr(), "[9, 3]");
        assert!(set_item(&Value::tuple(vec![]), &int(0), int(1)).is_err());
    }

    #[test]
    fn time_arithmetic() {
        let day = Value::TimeDelta(TimeDelta::days(1));
        let hour = Value::TimeDelta(TimeDelta::hours(1));
        let ratio = binary(BinOp::Div, &day, &hour).unwrap();
        assert_eq!(ratio.repr(), "24.0");
        let doubled = binary(BinOp::Mul, &hour, &int(2)).unwrap();
        assert!(values_equal(&doubled, &Value::TimeDelta(TimeDelta::hours(2))));
    }
}
