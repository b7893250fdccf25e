//! `math`.

use std::f64::consts;

use crate::builtins::float_to_int;
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::modules::{float_arg, int_arg};
use crate::object::Module;
use crate::ops;
use crate::value::{Builtin, CallArgs, Value};

fn domain_error() -> SandboxError {
    SandboxError::value_error("math domain error")
}

fn range_error() -> SandboxError {
    SandboxError::exception("OverflowError", "math range error")
}

/// Map NaN/infinite results of finite inputs to the matching errors.
fn finish(x: f64, result: f64) -> Result<Value> {
    if result.is_nan() && !x.is_nan() {
        return Err(domain_error());
    }
    if result.is_infinite() && x.is_finite() {
        return Err(range_error());
    }
    Ok(Value::Float(result))
}

macro_rules! float_fn {
    ($fn_name:ident, $name:literal, $f:expr) => {
        float_fn!($fn_name, $name, $f, |_| false);
    };
    ($fn_name:ident, $name:literal, $f:expr, $domain:expr) => {
        fn $fn_name(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
            args.expect($name, 1, 1)?;
            let x = args.positional[0].as_float()?;
            let outside: fn(f64) -> bool = $domain;
            if outside(x) {
                return Err(domain_error());
            }
            let f: fn(f64) -> f64 = $f;
            finish(x, f(x))
        }
    };
}

float_fn!(sqrt, "sqrt", f64::sqrt, |x| x < 0.0);
float_fn!(exp, "exp", f64::exp);
float_fn!(expm1, "expm1", f64::exp_m1);
float_fn!(log10, "log10", f64::log10, |x| x <= 0.0);
float_fn!(log2, "log2", f64::log2, |x| x <= 0.0);
float_fn!(log1p, "log1p", f64::ln_1p, |x| x <= -1.0);
float_fn!(sin, "sin", f64::sin, f64::is_infinite);
float_fn!(cos, "cos", f64::cos, f64::is_infinite);
float_fn!(tan, "tan", f64::tan, f64::is_infinite);
float_fn!(asin, "asin", f64::asin, |x| x.abs() > 1.0);
float_fn!(acos, "acos", f64::acos, |x| x.abs() > 1.0);
float_fn!(atan, "atan", f64::atan);
float_fn!(sinh, "sinh", f64::sinh);
float_fn!(cosh, "cosh", f64::cosh);
float_fn!(tanh, "tanh", f64::tanh);
float_fn!(asinh, "asinh", f64::asinh);
float_fn!(acosh, "acosh", f64::acosh, |x| x < 1.0);
float_fn!(atanh, "atanh", f64::atanh, |x| x.abs() >= 1.0);
float_fn!(degrees, "degrees", f64::to_degrees);
float_fn!(radians, "radians", f64::to_radians);
float_fn!(fabs, "fabs", f64::abs);

fn log(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("log", 1, 2)?;
    let x = args.positional[0].as_float()?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1) {
        None => finish(x, x.ln()),
        Some(base) => {
            let base = base.as_float()?;
            if base <= 0.0 || base == 1.0 {
                return Err(if base == 1.0 {
                    SandboxError::zero_division("float division by zero")
                } else {
                    domain_error()
                });
            }
            finish(x, x.ln() / base.ln())
        }
    }
}

fn rounding(args: &CallArgs, name: &str, f: fn(f64) -> f64) -> Result<Value> {
    args.expect(name, 1, 1)?;
    match &args.positional[0] {
        v @ (Value::Int(_) | Value::Bool(_)) => Ok(Value::Int(v.as_int()?)),
        v => float_to_int(f(v.as_float()?)).map(Value::Int),
    }
}

fn floor(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    rounding(&args, "floor", f64::floor)
}

fn ceil(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    rounding(&args, "ceil", f64::ceil)
}

fn trunc(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    rounding(&args, "trunc", f64::trunc)
}

fn pow(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("pow", 2, 2)?;
    let x = float_arg(&args, "pow", 0, "x")?;
    let y = float_arg(&args, "pow", 1, "y")?;
    if x == 0.0 && y < 0.0 || x < 0.0 && y.is_finite() && y.fract() != 0.0 {
        return Err(domain_error());
    }
    let result = x.powf(y);
    if result.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(range_error());
    }
    Ok(Value::Float(result))
}

fn atan2(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("atan2", 2, 2)?;
    let y = float_arg(&args, "atan2", 0, "y")?;
    let x = float_arg(&args, "atan2", 1, "x")?;
    Ok(Value::Float(y.atan2(x)))
}

fn fmod(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("fmod", 2, 2)?;
    let x = float_arg(&args, "fmod", 0, "x")?;
    let y = float_arg(&args, "fmod", 1, "y")?;
    if y == 0.0 || x.is_infinite() {
        return Err(domain_error());
    }
    Ok(Value::Float(x % y))
}

fn copysign(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("copysign", 2, 2)?;
    let x = float_arg(&args, "copysign", 0, "x")?;
    let y = float_arg(&args, "copysign", 1, "y")?;
    Ok(Value::Float(x.copysign(y)))
}

fn hypot(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let mut total = 0.0f64;
    for v in &args.positional {
        let f = v.as_float()?;
        total += f * f;
    }
    Ok(Value::Float(total.sqrt()))
}

fn modf(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("modf", 1, 1)?;
    let x = args.positional[0].as_float()?;
    Ok(Value::tuple(vec![
        Value::Float(x.fract()),
        Value::Float(x.trunc()),
    ]))
}

fn isclose(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("isclose", 2, 2)?;
    args.allow_keywords("isclose", &["rel_tol", "abs_tol"])?;
    let a = float_arg(&args, "isclose", 0, "a")?;
    let b = float_arg(&args, "isclose", 1, "b")?;
    let rel_tol = args.keyword("rel_tol").map_or(Ok(1e-9), Value::as_float)?;
    let abs_tol = args.keyword("abs_tol").map_or(Ok(0.0), Value::as_float)?;
    if rel_tol < 0.0 || abs_tol < 0.0 {
        return Err(SandboxError::value_error("tolerances must be non-negative"));
    }
    if a == b {
        return Ok(Value::Bool(true));
    }
    if a.is_infinite() || b.is_infinite() {
        return Ok(Value::Bool(false));
    }
    let diff = (a - b).abs();
    Ok(Value::Bool(
        diff <= (rel_tol * b).abs() || diff <= (rel_tol * a).abs() || diff <= abs_tol,
    ))
}

fn isfinite(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("isfinite", 1, 1)?;
    Ok(Value::Bool(args.positional[0].as_float()?.is_finite()))
}

fn isinf(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("isinf", 1, 1)?;
    Ok(Value::Bool(args.positional[0].as_float()?.is_infinite()))
}

fn isnan(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("isnan", 1, 1)?;
    Ok(Value::Bool(args.positional[0].as_float()?.is_nan()))
}

fn factorial(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("factorial", 1, 1)?;
    let n = int_arg(&args, "factorial", 0, "n")?;
    if n < 0 {
        return Err(SandboxError::value_error(
            "factorial() not defined for negative values",
        ));
    }
    let mut acc: i64 = 1;
    for i in 2..=n {
        acc = acc.checked_mul(i).ok_or_else(SandboxError::overflow)?;
    }
    Ok(Value::Int(acc))
}

fn gcd_pair(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a as i64
}

fn gcd(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let mut acc = 0;
    for v in &args.positional {
        acc = gcd_pair(acc, v.as_int()?);
    }
    Ok(Value::Int(acc))
}

fn lcm(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let mut acc: i64 = 1;
    for v in &args.positional {
        let n = v.as_int()?;
        if n == 0 || acc == 0 {
            acc = 0;
            continue;
        }
        let g = gcd_pair(acc, n);
        acc = (acc / g)
            .checked_mul(n)
            .map(i64::abs)
            .ok_or_else(SandboxError::overflow)?;
    }
    Ok(Value::Int(acc))
}

fn perm_count(n: i64, k: i64) -> Result<i64> {
    let mut acc: i64 = 1;
    for i in 0..k {
        acc = acc.checked_mul(n - i).ok_or_else(SandboxError::overflow)?;
    }
    Ok(acc)
}

fn comb(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("comb", 2, 2)?;
    let n = int_arg(&args, "comb", 0, "n")?;
    let k = int_arg(&args, "comb", 1, "k")?;
    if n < 0 || k < 0 {
        return Err(SandboxError::value_error("n and k must be non-negative integers"));
    }
    if k > n {
        return Ok(Value::Int(0));
    }
    let k = k.min(n - k);
    let mut acc: i128 = 1;
    for i in 0..k {
        acc = acc * i128::from(n - i) / i128::from(i + 1);
        if acc > i128::from(i64::MAX) {
            return Err(SandboxError::overflow());
        }
    }
    Ok(Value::Int(acc as i64))
}

fn perm(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("perm", 1, 2)?;
    let n = int_arg(&args, "perm", 0, "n")?;
    let k = match args.get(1) {
        None | Some(Value::None) => n,
        Some(v) => v.as_int()?,
    };
    if n < 0 || k < 0 {
        return Err(SandboxError::value_error("n and k must be non-negative integers"));
    }
    if k > n {
        return Ok(Value::Int(0));
    }
    perm_count(n, k).map(Value::Int)
}

fn isqrt(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("isqrt", 1, 1)?;
    let n = int_arg(&args, "isqrt", 0, "n")?;
    if n < 0 {
        return Err(SandboxError::value_error(
            "isqrt() argument must be nonnegative",
        ));
    }
    let mut root = (n as f64).sqrt() as i64;
    while root.checked_mul(root).is_none_or(|sq| sq > n) {
        root -= 1;
    }
    while (root + 1).checked_mul(root + 1).is_some_and(|sq| sq <= n) {
        root += 1;
    }
    Ok(Value::Int(root))
}

fn fsum(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("fsum", 1, 1)?;
    // Neumaier compensated summation.
    let mut sum = 0.0f64;
    let mut compensation = 0.0f64;
    for v in ops::iterate(&args.positional[0])? {
        let x = v.as_float()?;
        let t = sum + x;
        if sum.abs() >= x.abs() {
            compensation += (sum - t) + x;
        } else {
            compensation += (x - t) + sum;
        }
        sum = t;
    }
    Ok(Value::Float(sum + compensation))
}

fn prod(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("prod", 1, 1)?;
    args.allow_keywords("prod", &["start"])?;
    let mut acc = args.keyword("start").cloned().unwrap_or(Value::Int(1));
    for v in ops::iterate(&args.positional[0])? {
        acc = ops::binary(crate::ast::BinOp::Mul, &acc, &v)?;
    }
    Ok(acc)
}

pub fn module() -> Value {
    let f = Builtin::new;
    Value::object(Module::new(
        "math",
        vec![
            ("pi", Value::Float(consts::PI)),
            ("e", Value::Float(consts::E)),
            ("tau", Value::Float(consts::TAU)),
            ("inf", Value::Float(f64::INFINITY)),
            ("nan", Value::Float(f64::NAN)),
            ("sqrt", f("sqrt", sqrt)),
            ("exp", f("exp", exp)),
            ("expm1", f("expm1", expm1)),
            ("log", f("log", log)),
            ("log10", f("log10", log10)),
            ("log2", f("log2", log2)),
            ("log1p", f("log1p", log1p)),
            ("pow", f("pow", pow)),
            ("sin", f("sin", sin)),
            ("cos", f("cos", cos)),
            ("tan", f("tan", tan)),
            ("asin", f("asin", asin)),
            ("acos", f("acos", acos)),
            ("atan", f("atan", atan)),
            ("atan2", f("atan2", atan2)),
            ("sinh", f("sinh", sinh)),
            ("cosh", f("cosh", cosh)),
            ("tanh", f("tanh", tanh)),
            ("asinh", f("asinh", asinh)),
            ("acosh", f("acosh", acosh)),
            ("atanh", f("atanh", atanh)),
            ("degrees", f("degrees", degrees)),
            ("radians", f("radians", radians)),
            ("fabs", f("fabs", fabs)),
            ("floor", f("floor", floor)),
            ("ceil", f("ceil", ceil)),
            ("trunc", f("trunc", trunc)),
            ("fmod", f("fmod", fmod)),
            ("copysign", f("copysign", copysign)),
            ("hypot", f("hypot", hypot)),
            ("modf", f("modf", modf)),
            ("isclose", f("isclose", isclose)),
            ("isfinite", f("isfinite", isfinite)),
            ("isinf", f("isinf", isinf)),
            ("isnan", f("isnan", isnan)),
            ("factorial", f("factorial", factorial)),
            ("gcd", f("gcd", gcd)),
            ("lcm", f("lcm", lcm)),
            ("comb", f("comb", comb)),
            ("perm", f("perm", perm)),
            ("isqrt", f("isqrt", isqrt)),
            ("fsum", f("fsum", fsum)),
            ("prod", f("prod", prod)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_and_range_errors() {
        assert!(matches!(finish(-1.0, f64::NAN), Err(SandboxError::Exception(e)) if e.kind == "ValueError"));
        assert!(matches!(finish(1000.0, f64::INFINITY), Err(SandboxError::Exception(e)) if e.kind == "OverflowError"));
        assert!(finish(f64::NAN, f64::NAN).is_ok());
    }

    #[test]
    fn integer_helpers() {
        assert_eq!(gcd_pair(12, -18), 6);
        assert_eq!(perm_count(5, 2).unwrap(), 20);
        assert!(perm_count(100, 30).is_err());
    }
}
