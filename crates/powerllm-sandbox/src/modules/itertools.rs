//! `itertools`, evaluated eagerly.
//!
//! Every function returns a list. Infinite iterators (`count`, `cycle`,
//! `repeat` without `times`) are not provided, and combinatoric results are
//! capped at [`MAX_RESULTS`] items.

use std::any::Any;

use crate::ast::BinOp;
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::object::{Attr, Module, ScriptObject};
use crate::ops;
use crate::value::{Builtin, CallArgs, Value, values_equal};

/// Upper bound on the number of items an itertools call may produce.
pub const MAX_RESULTS: usize = 1_000_000;

fn too_many() -> SandboxError {
    SandboxError::exception("MemoryError", "itertools result too large")
}

fn push_checked(out: &mut Vec<Value>, value: Value) -> Result<()> {
    if out.len() >= MAX_RESULTS {
        return Err(too_many());
    }
    out.push(value);
    Ok(())
}

/// `itertools.chain`, callable and carrying `chain.from_iterable`.
struct Chain;

impl ScriptObject for Chain {
    fn type_name(&self) -> &str {
        "type"
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        (name == "from_iterable").then_some(Attr::Method)
    }

    fn call_method(&self, interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        match name {
            "from_iterable" => chain_from_iterable(interp, args),
            other => Err(SandboxError::attribute_error(format!(
                "type object 'itertools.chain' has no attribute '{other}'"
            ))),
        }
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
        chain(interp, args)
    }

    fn repr(&self) -> String {
        "<class 'itertools.chain'>".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn chain(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let mut out = Vec::new();
    for iterable in &args.positional {
        for item in ops::iterate(iterable)? {
            push_checked(&mut out, item)?;
        }
    }
    Ok(Value::list(out))
}

fn chain_from_iterable(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("from_iterable", 1, 1)?;
    let mut out = Vec::new();
    for iterable in ops::iterate(&args.positional[0])? {
        for item in ops::iterate(&iterable)? {
            push_checked(&mut out, item)?;
        }
    }
    Ok(Value::list(out))
}

fn optional_r(args: &CallArgs, index: usize, default: usize) -> Result<usize> {
    match args.arg(index, "r") {
        None | Some(Value::None) => Ok(default),
        Some(v) => {
            let r = v.as_int()?;
            usize::try_from(r).map_err(|_| SandboxError::value_error("r must be non-negative"))
        }
    }
}

/// Index tuples in lexicographic order, as the combinatoric generators
/// produce them.
fn index_tuples(
    n: usize,
    r: usize,
    accept: &dyn Fn(&[usize]) -> bool,
    start_at: &dyn Fn(&[usize]) -> usize,
) -> Result<Vec<Vec<usize>>> {
    let mut out = Vec::new();
    let mut current = Vec::with_capacity(r);
    fn walk(
        n: usize,
        r: usize,
        current: &mut Vec<usize>,
        out: &mut Vec<Vec<usize>>,
        accept: &dyn Fn(&[usize]) -> bool,
        start_at: &dyn Fn(&[usize]) -> usize,
    ) -> Result<()> {
        if current.len() == r {
            if out.len() >= MAX_RESULTS {
                return Err(too_many());
            }
            out.push(current.clone());
            return Ok(());
        }
        for i in start_at(current)..n {
            current.push(i);
            if accept(current) {
                walk(n, r, current, out, accept, start_at)?;
            }
            current.pop();
        }
        Ok(())
    }
    walk(n, r, &mut current, &mut out, accept, start_at)?;
    Ok(out)
}

fn pick(pool: &[Value], indices: Vec<Vec<usize>>) -> Value {
    Value::list(
        indices
            .into_iter()
            .map(|idx| Value::tuple(idx.into_iter().map(|i| pool[i].clone()).collect()))
            .collect(),
    )
}

fn combinations(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("combinations", 1, 2)?;
    let pool = ops::iterate(&args.positional[0])?;
    let r = optional_r(&args, 1, 0)?;
    let indices = index_tuples(pool.len(), r, &|_| true, &|cur| {
        cur.last().map_or(0, |last| last + 1)
    })?;
    Ok(pick(&pool, indices))
}

fn combinations_with_replacement(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("combinations_with_replacement", 1, 2)?;
    let pool = ops::iterate(&args.positional[0])?;
    let r = optional_r(&args, 1, 0)?;
    let indices = index_tuples(pool.len(), r, &|_| true, &|cur| {
        cur.last().copied().unwrap_or(0)
    })?;
    Ok(pick(&pool, indices))
}

fn permutations(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("permutations", 1, 2)?;
    let pool = ops::iterate(&args.positional[0])?;
    let r = optional_r(&args, 1, pool.len())?;
    let indices = index_tuples(
        pool.len(),
        r,
        &|cur| match cur.split_last() {
            Some((last, rest)) => !rest.contains(last),
            None => true,
        },
        &|_| 0,
    )?;
    Ok(pick(&pool, indices))
}

fn product(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.allow_keywords("product", &["repeat"])?;
    let repeat = args.keyword("repeat").map_or(Ok(1), Value::as_int)?.max(0) as usize;
    let base = args
        .positional
        .iter()
        .map(ops::iterate)
        .collect::<Result<Vec<_>>>()?;
    let mut pools = Vec::with_capacity(base.len() * repeat);
    for _ in 0..repeat {
        pools.extend(base.iter().cloned());
    }
    let mut rows: Vec<Vec<Value>> = vec![Vec::new()];
    for pool in &pools {
        let size = rows.len().saturating_mul(pool.len());
        if size > MAX_RESULTS {
            return Err(too_many());
        }
        let mut next = Vec::with_capacity(size);
        for row in &rows {
            for item in pool {
                let mut extended = row.clone();
                extended.push(item.clone());
                next.push(extended);
            }
        }
        rows = next;
    }
    Ok(Value::list(rows.into_iter().map(Value::tuple).collect()))
}

fn accumulate(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("accumulate", 1, 2)?;
    args.allow_keywords("accumulate", &["func", "initial"])?;
    let func = args.arg(1, "func").filter(|f| !f.is_none()).cloned();
    let mut out = Vec::new();
    let mut total = args.keyword("initial").filter(|v| !v.is_none()).cloned();
    if let Some(initial) = &total {
        out.push(initial.clone());
    }
    for item in ops::iterate(&args.positional[0])? {
        let next = match (&total, &func) {
            (None, _) => item,
            (Some(acc), None) => ops::binary(BinOp::Add, acc, &item)?,
            (Some(acc), Some(f)) => interp.call_value(f, CallArgs::new(vec![acc.clone(), item]))?,
        };
        out.push(next.clone());
        total = Some(next);
    }
    Ok(Value::list(out))
}

fn groupby(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("groupby", 1, 2)?;
    let key = args.arg(1, "key").filter(|k| !k.is_none()).cloned();
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for item in ops::iterate(&args.positional[0])? {
        let k = match &key {
            Some(f) => interp.call_value(f, CallArgs::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        match groups.last_mut() {
            Some((last, members)) if values_equal(last, &k) => members.push(item),
            _ => groups.push((k, vec![item])),
        }
    }
    Ok(Value::list(
        groups
            .into_iter()
            .map(|(k, members)| Value::tuple(vec![k, Value::list(members)]))
            .collect(),
    ))
}

fn islice(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("islice", 2, 4)?;
    let items = ops::iterate(&args.positional[0])?;
    let bound = |v: Option<&Value>, default: usize| -> Result<usize> {
        match v {
            None | Some(Value::None) => Ok(default),
            Some(v) => usize::try_from(v.as_int()?).map_err(|_| {
                SandboxError::value_error(
                    "Indices for islice() must be None or an integer: 0 <= x <= sys.maxsize.",
                )
            }),
        }
    };
    let (start, stop, step) = if args.len() == 2 {
        (0, bound(args.get(1), items.len())?, 1)
    } else {
        (
            bound(args.get(1), 0)?,
            bound(args.get(2), items.len())?,
            bound(args.get(3), 1)?,
        )
    };
    if step == 0 {
        return Err(SandboxError::value_error(
            "Step for islice() must be a positive integer or None.",
        ));
    }
    let stop = stop.min(items.len());
    Ok(Value::list(
        (start..stop)
            .step_by(step)
            .filter_map(|i| items.get(i).cloned())
            .collect(),
    ))
}

fn zip_longest(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.allow_keywords("zip_longest", &["fillvalue"])?;
    let fill = args.keyword("fillvalue").cloned().unwrap_or(Value::None);
    let columns = args
        .positional
        .iter()
        .map(ops::iterate)
        .collect::<Result<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).max().unwrap_or(0);
    Ok(Value::list(
        (0..rows)
            .map(|row| {
                Value::tuple(
                    columns
                        .iter()
                        .map(|col| col.get(row).cloned().unwrap_or_else(|| fill.clone()))
                        .collect(),
                )
            })
            .collect(),
    ))
}

fn starmap(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("starmap", 2, 2)?;
    let mut out = Vec::new();
    for row in ops::iterate(&args.positional[1])? {
        let call_args = ops::iterate(&row)?;
        out.push(interp.call_value(&args.positional[0], CallArgs::new(call_args))?);
    }
    Ok(Value::list(out))
}

fn predicate_prefix(interp: &mut Interpreter, args: &CallArgs, func: &str) -> Result<(Vec<Value>, usize)> {
    args.expect(func, 2, 2)?;
    let items = ops::iterate(&args.positional[1])?;
    let mut split = items.len();
    for (i, item) in items.iter().enumerate() {
        if !interp
            .call_value(&args.positional[0], CallArgs::new(vec![item.clone()]))?
            .truthy()
        {
            split = i;
            break;
        }
    }
    Ok((items, split))
}

fn takewhile(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let (mut items, split) = predicate_prefix(interp, &args, "takewhile")?;
    items.truncate(split);
    Ok(Value::list(items))
}

fn dropwhile(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let (items, split) = predicate_prefix(interp, &args, "dropwhile")?;
    Ok(Value::list(items[split..].to_vec()))
}

fn filterfalse(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("filterfalse", 2, 2)?;
    let func = &args.positional[0];
    let mut out = Vec::new();
    for item in ops::iterate(&args.positional[1])? {
        let keep = if func.is_none() {
            !item.truthy()
        } else {
            !interp.call_value(func, CallArgs::new(vec![item.clone()]))?.truthy()
        };
        if keep {
            out.push(item);
        }
    }
    Ok(Value::list(out))
}

fn compress(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("compress", 2, 2)?;
    let data = ops::iterate(&args.positional[0])?;
    let selectors = ops::iterate(&args.positional[1])?;
    Ok(Value::list(
        data.into_iter()
            .zip(selectors)
            .filter(|(_, s)| s.truthy())
            .map(|(d, _)| d)
            .collect(),
    ))
}

fn pairwise(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("pairwise", 1, 1)?;
    let items = ops::iterate(&args.positional[0])?;
    Ok(Value::list(
        items
            .windows(2)
            .map(|pair| Value::tuple(pair.to_vec()))
            .collect(),
    ))
}

fn batched(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("batched", 2, 2)?;
    let items = ops::iterate(&args.positional[0])?;
    let n = args.positional[1].as_int()?;
    if n < 1 {
        return Err(SandboxError::value_error("n must be at least one"));
    }
    Ok(Value::list(
        items
            .chunks(n as usize)
            .map(|chunk| Value::tuple(chunk.to_vec()))
            .collect(),
    ))
}

fn repeat(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("repeat", 1, 2)?;
    let Some(times) = args.arg(1, "times") else {
        return Err(SandboxError::value_error(
            "repeat() without times would never finish",
        ));
    };
    let times = times.as_int()?.max(0) as usize;
    if times > MAX_RESULTS {
        return Err(too_many());
    }
    Ok(Value::list(vec![args.positional[0].clone(); times]))
}

pub fn module() -> Value {
    let f = Builtin::new;
    Value::object(Module::new(
        "itertools",
        vec![
            ("chain", Value::object(Chain)),
            ("combinations", f("combinations", combinations)),
            (
                "combinations_with_replacement",
                f("combinations_with_replacement", combinations_with_replacement),
            ),
            ("permutations", f("permutations", permutations)),
            ("product", f("product", product)),
            ("accumulate", f("accumulate", accumulate)),
            ("groupby", f("groupby", groupby)),
            ("islice", f("islice", islice)),
            ("zip_longest", f("zip_longest", zip_longest)),
            ("starmap", f("starmap", starmap)),
            ("takewhile", f("takewhile", takewhile)),
            ("dropwhile", f("dropwhile", dropwhile)),
            ("filterfalse", f("filterfalse", filterfalse)),
            ("compress", f("compress", compress)),
            ("pairwise", f("pairwise", pairwise)),
            ("batched", f("batched", batched)),
            ("repeat", f("repeat", repeat)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combination_indices() {
        let combos = index_tuples(4, 2, &|_| true, &|cur| cur.last().map_or(0, |l| l + 1)).unwrap();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![0, 1]);
        assert_eq!(combos[5], vec![2, 3]);
    }

    #[test]
    fn permutation_indices_skip_repeats() {
        let perms = index_tuples(
            3,
            3,
            &|cur| match cur.split_last() {
                Some((last, rest)) => !rest.contains(last),
                None => true,
            },
            &|_| 0,
        )
        .unwrap();
        assert_eq!(perms.len(), 6);
        assert_eq!(perms[1], vec![0, 2, 1]);
    }
}
