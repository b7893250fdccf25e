//! `random`, backed by the execution's own generator.

use std::hash::{DefaultHasher, Hash, Hasher};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::modules::{float_arg, int_arg};
use crate::object::Module;
use crate::ops;
use crate::value::{Builtin, CallArgs, HashKey, Value};

fn unit(interp: &mut Interpreter) -> f64 {
    interp.rng().gen_range(0.0..1.0)
}

fn random(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("random", 0, 0)?;
    Ok(Value::Float(unit(interp)))
}

fn uniform(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("uniform", 2, 2)?;
    let a = float_arg(&args, "uniform", 0, "a")?;
    let b = float_arg(&args, "uniform", 1, "b")?;
    Ok(Value::Float(a + (b - a) * unit(interp)))
}

fn randint(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("randint", 2, 2)?;
    let a = int_arg(&args, "randint", 0, "a")?;
    let b = int_arg(&args, "randint", 1, "b")?;
    if a > b {
        return Err(SandboxError::value_error(format!(
            "empty range in randrange({a}, {})",
            b.saturating_add(1)
        )));
    }
    Ok(Value::Int(interp.rng().gen_range(a..=b)))
}

fn randrange(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("randrange", 1, 3)?;
    let ints = args
        .positional
        .iter()
        .map(Value::as_int)
        .collect::<Result<Vec<_>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(SandboxError::Internal("randrange arity".into())),
    };
    if step == 0 {
        return Err(SandboxError::value_error("zero step for randrange()"));
    }
    let (start_w, stop_w, step_w) = (i128::from(start), i128::from(stop), i128::from(step));
    let count = if step > 0 {
        (stop_w - start_w + step_w - 1).div_euclid(step_w)
    } else {
        (start_w - stop_w - step_w - 1).div_euclid(-step_w)
    };
    if count <= 0 {
        return Err(SandboxError::value_error(format!(
            "empty range in randrange({start}, {stop}, {step})"
        )));
    }
    let index = interp.rng().gen_range(0..count);
    i64::try_from(start_w + index * step_w)
        .map(Value::Int)
        .map_err(|_| SandboxError::overflow())
}

fn choice(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("choice", 1, 1)?;
    let items = ops::iterate(&args.positional[0])?;
    if items.is_empty() {
        return Err(SandboxError::index_error(
            "Cannot choose from an empty sequence",
        ));
    }
    let index = interp.rng().gen_range(0..items.len());
    Ok(items[index].clone())
}

fn choices(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("choices", 1, 2)?;
    args.allow_keywords("choices", &["weights", "cum_weights", "k"])?;
    let population = ops::iterate(&args.positional[0])?;
    let k = args.keyword("k").map_or(Ok(1), Value::as_int)?.max(0) as usize;
    if population.is_empty() {
        return Err(SandboxError::index_error(
            "Cannot choose from an empty sequence",
        ));
    }
    if k > ops::MAX_SEQUENCE_LEN {
        return Err(SandboxError::exception("MemoryError", "k is too large"));
    }
    let cumulative = match (args.arg(1, "weights"), args.keyword("cum_weights")) {
        (Some(_), Some(_)) => {
            return Err(SandboxError::type_error(
                "Cannot specify both weights and cumulative weights",
            ));
        }
        (Some(weights), None) if !weights.is_none() => {
            let mut total = 0.0;
            let mut cum = Vec::new();
            for w in ops::iterate(weights)? {
                total += w.as_float()?;
                cum.push(total);
            }
            Some(cum)
        }
        (None, Some(cum)) if !cum.is_none() => Some(
            ops::iterate(cum)?
                .iter()
                .map(Value::as_float)
                .collect::<Result<Vec<_>>>()?,
        ),
        _ => None,
    };
    let mut out = Vec::with_capacity(k);
    match cumulative {
        None => {
            for _ in 0..k {
                let index = interp.rng().gen_range(0..population.len());
                out.push(population[index].clone());
            }
        }
        Some(cum) => {
            if cum.len() != population.len() {
                return Err(SandboxError::value_error(
                    "The number of weights does not match the population",
                ));
            }
            let total = cum.last().copied().unwrap_or(0.0);
            if !total.is_finite() || total <= 0.0 {
                return Err(SandboxError::value_error("Total of weights must be greater than zero"));
            }
            for _ in 0..k {
                let pick = unit(interp) * total;
                let index = cum.partition_point(|c| *c <= pick).min(population.len() - 1);
                out.push(population[index].clone());
            }
        }
    }
    Ok(Value::list(out))
}

fn shuffle(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("shuffle", 1, 1)?;
    let Value::List(list) = &args.positional[0] else {
        return Err(SandboxError::type_error(format!(
            "'{}' object does not support item assignment",
            args.positional[0].type_name()
        )));
    };
    let mut items = list.borrow().clone();
    items.shuffle(interp.rng());
    *list.borrow_mut() = items;
    Ok(Value::None)
}

fn sample(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("sample", 1, 2)?;
    let population = ops::iterate(&args.positional[0])?;
    let k = args
        .required("sample", 1, "k")?
        .as_int()?;
    if k < 0 || k as usize > population.len() {
        return Err(SandboxError::value_error(
            "Sample larger than population or is negative",
        ));
    }
    let picked: Vec<Value> = population
        .choose_multiple(interp.rng(), k as usize)
        .cloned()
        .collect();
    Ok(Value::list(picked))
}

fn gauss(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("gauss", 0, 2)?;
    let mu = args.arg(0, "mu").map_or(Ok(0.0), Value::as_float)?;
    let sigma = args.arg(1, "sigma").map_or(Ok(1.0), Value::as_float)?;
    // Box-Muller transform.
    let u1 = 1.0 - unit(interp);
    let u2 = unit(interp);
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    Ok(Value::Float(mu + sigma * z))
}

fn seed(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("seed", 0, 2)?;
    let rng = interp.rng();
    match args.get(0) {
        None | Some(Value::None) => *rng = StdRng::from_entropy(),
        Some(Value::Int(i)) => *rng = StdRng::seed_from_u64(*i as u64),
        Some(other) => {
            let mut hasher = DefaultHasher::new();
            HashKey::of(other)?.hash(&mut hasher);
            *rng = StdRng::seed_from_u64(hasher.finish());
        }
    }
    Ok(Value::None)
}

pub fn module() -> Value {
    let f = Builtin::new;
    Value::object(Module::new(
        "random",
        vec![
            ("random", f("random", random)),
            ("uniform", f("uniform", uniform)),
            ("randint", f("randint", randint)),
            ("randrange", f("randrange", randrange)),
            ("choice", f("choice", choice)),
            ("choices", f("choices", choices)),
            ("shuffle", f("shuffle", shuffle)),
            ("sample", f("sample", sample)),
            ("gauss", f("gauss", gauss)),
            ("normalvariate", f("normalvariate", gauss)),
            ("seed", f("seed", seed)),
        ],
    ))
}
