//! `functools`.

use std::any::Any;

use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::object::{Attr, Module, ScriptObject};
use crate::ops;
use crate::value::{Builtin, CallArgs, Value};

fn reduce(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("reduce", 2, 3)?;
    let func = &args.positional[0];
    let mut items = ops::iterate(&args.positional[1])?.into_iter();
    let mut acc = match args.get(2) {
        Some(initial) => initial.clone(),
        None => items.next().ok_or_else(|| {
            SandboxError::type_error("reduce() of empty iterable with no initial value")
        })?,
    };
    for item in items {
        acc = interp.call_value(func, CallArgs::new(vec![acc, item]))?;
    }
    Ok(acc)
}

/// `functools.partial(func, *args, **keywords)`.
pub struct Partial {
    func: Value,
    args: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl ScriptObject for Partial {
    fn type_name(&self) -> &str {
        "functools.partial"
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        match name {
            "func" => Some(Attr::Value(self.func.clone())),
            "args" => Some(Attr::Value(Value::tuple(self.args.clone()))),
            _ => None,
        }
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
        let mut positional = self.args.clone();
        positional.extend(args.positional);
        let mut keywords = self.keywords.clone();
        for (name, value) in args.keywords {
            keywords.retain(|(k, _)| *k != name);
            keywords.push((name, value));
        }
        interp.call_value(&self.func, CallArgs::with_keywords(positional, keywords))
    }

    fn repr(&self) -> String {
        let mut parts = vec![self.func.repr()];
        parts.extend(self.args.iter().map(Value::repr));
        parts.extend(self.keywords.iter().map(|(k, v)| format!("{k}={}", v.repr())));
        format!("functools.partial({})", parts.join(", "))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn partial(_interp: &mut Interpreter, mut args: CallArgs) -> Result<Value> {
    if args.positional.is_empty() {
        return Err(SandboxError::type_error(
            "type 'partial' takes at least one argument",
        ));
    }
    let func = args.positional.remove(0);
    if !func.is_callable() {
        return Err(SandboxError::type_error(
            "the first argument must be callable",
        ));
    }
    Ok(Value::object(Partial {
        func,
        args: args.positional,
        keywords: args.keywords,
    }))
}

pub fn module() -> Value {
    Value::object(Module::new(
        "functools",
        vec![
            ("reduce", Builtin::new("reduce", reduce)),
            ("partial", Builtin::new("partial", partial)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_repr_lists_bound_arguments() {
        let bound = Partial {
            func: Value::from("f"),
            args: vec![Value::Int(1)],
            keywords: vec![("base".to_string(), Value::Int(2))],
        };
        assert_eq!(bound.repr(), "functools.partial('f', 1, base=2)");
    }
}
