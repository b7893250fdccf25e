//! Guard hooks.
//!
//! The compiled tree never touches attributes, items, iteration, unpacking,
//! augmented assignment or printing directly. It calls the hook bound in the
//! script namespace under the conventional name, and each hook forwards to
//! the execution's [`GuardedEnvironment`]:
//!
//! | hook | method |
//! |---|---|
//! | `_getattr_` | [`GuardedEnvironment::get_attr`] |
//! | `_getitem_` | [`GuardedEnvironment::get_item`] |
//! | `_write_` | [`GuardedEnvironment::write`] |
//! | `_getiter_` | [`GuardedEnvironment::get_iter`] |
//! | `_unpack_sequence_` | [`GuardedEnvironment::unpack_sequence`] |
//! | `_iter_unpack_sequence_` | [`GuardedEnvironment::iter_unpack_sequence`] |
//! | `_inplacevar_` | [`GuardedEnvironment::inplace_var`] |
//! | `_print_` | [`GuardedEnvironment::print`] |

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::allowlist;
use crate::ast::BinOp;
use crate::config::PrintPolicy;
use crate::diagnostics::ScriptLogger;
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::methods;
use crate::ops;
use crate::value::{Builtin, CallArgs, DictKind, Value};

/// Warning logged once per execution under [`PrintPolicy::Warn`].
pub const PRINT_DISABLED_WARNING: &str =
    "print() output is discarded in scripts, use logger.info() instead";

/// Operators accepted by the in-place hook.
pub const INPLACE_OPERATORS: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "**=", "<<=", ">>=", "&=", "^=", "|=", "@=",
];

/// The guarded operations a compiled program depends on.
pub trait GuardedEnvironment {
    /// `obj.name`, after the capability check.
    fn get_attr(&self, interp: &mut Interpreter, obj: &Value, name: &str) -> Result<Value>;

    /// `obj[index]`.
    fn get_item(&self, interp: &mut Interpreter, obj: &Value, index: &Value) -> Result<Value>;

    /// Vet `obj` as the target of an item write (`attr == None`) or an
    /// attribute write, returning the object the write may proceed on.
    fn write(&self, obj: &Value, attr: Option<&str>) -> Result<Value>;

    /// Vet `obj` for iteration, returning the value to iterate.
    fn get_iter(&self, obj: &Value) -> Result<Value>;

    /// Unpack `value` into exactly `count` slots; `starred` is the slot that
    /// collects the remainder as a list.
    fn unpack_sequence(&self, value: &Value, count: usize, starred: Option<usize>)
    -> Result<Vec<Value>>;

    /// Unpack every item of `iterable` as [`GuardedEnvironment::unpack_sequence`] does.
    fn iter_unpack_sequence(
        &self,
        iterable: &Value,
        count: usize,
        starred: Option<usize>,
    ) -> Result<Vec<Vec<Value>>>;

    /// Apply an augmented assignment operator.
    fn inplace_var(&self, op: &str, target: &Value, operand: &Value) -> Result<Value>;

    /// `print(*args, sep=" ", end="\n")`.
    fn print(&self, interp: &mut Interpreter, args: CallArgs) -> Result<Value>;

    /// Text collected by `print` so far.
    fn printed(&self) -> String;
}

// ---------------------------------------------------------------------------
// Default implementation
// ---------------------------------------------------------------------------

/// Guards used for every tool execution.
pub struct SandboxGuards {
    policy: PrintPolicy,
    logger: Rc<ScriptLogger>,
    printed: RefCell<Vec<String>>,
    warned_print: Cell<bool>,
}

impl SandboxGuards {
    pub fn new(policy: PrintPolicy, logger: Rc<ScriptLogger>) -> Self {
        Self {
            policy,
            logger,
            printed: RefCell::new(Vec::new()),
            warned_print: Cell::new(false),
        }
    }
}

fn is_iterable(value: &Value) -> bool {
    match value {
        Value::List(_)
        | Value::Tuple(_)
        | Value::Str(_)
        | Value::Dict(_)
        | Value::Set(_)
        | Value::Range(_) => true,
        Value::Object(o) => o.iterate().is_some(),
        _ => false,
    }
}

impl GuardedEnvironment for SandboxGuards {
    fn get_attr(&self, _interp: &mut Interpreter, obj: &Value, name: &str) -> Result<Value> {
        let owner = match obj {
            Value::Object(o) => o.owner(),
            _ => None,
        };
        allowlist::check_attribute(owner, name).map_err(SandboxError::Violation)?;
        methods::get_attribute(obj, name)
    }

    fn get_item(&self, interp: &mut Interpreter, obj: &Value, index: &Value) -> Result<Value> {
        if let Value::Dict(d) = obj {
            let factory = {
                let dict = d.borrow();
                if dict.kind == DictKind::DefaultDict && !dict.contains(index)? {
                    dict.factory.clone()
                } else {
                    None
                }
            };
            if let Some(factory) = factory {
                let value = interp.call_value(&factory, CallArgs::default())?;
                d.borrow_mut().insert(index.clone(), value.clone())?;
                return Ok(value);
            }
        }
        ops::get_item(obj, index)
    }

    fn write(&self, obj: &Value, attr: Option<&str>) -> Result<Value> {
        match (obj, attr) {
            (_, Some(name)) => Err(SandboxError::violation(format!(
                "Not allowed to write attribute '{name}' on {} object",
                obj.type_name()
            ))),
            (Value::List(_) | Value::Dict(_), None) => Ok(obj.clone()),
            (_, None) => Err(SandboxError::violation(format!(
                "Not allowed to write items of {} object",
                obj.type_name()
            ))),
        }
    }

    fn get_iter(&self, obj: &Value) -> Result<Value> {
        if is_iterable(obj) {
            Ok(obj.clone())
        } else {
            Err(SandboxError::type_error(format!(
                "'{}' object is not iterable",
                obj.type_name()
            )))
        }
    }

    fn unpack_sequence(
        &self,
        value: &Value,
        count: usize,
        starred: Option<usize>,
    ) -> Result<Vec<Value>> {
        if !is_iterable(value) {
            return Err(SandboxError::type_error(format!(
                "cannot unpack non-iterable {} object",
                value.type_name()
            )));
        }
        let items = ops::iterate(value)?;
        match starred {
            None => {
                if items.len() < count {
                    return Err(SandboxError::value_error(format!(
                        "not enough values to unpack (expected {count}, got {})",
                        items.len()
                    )));
                }
                if items.len() > count {
                    return Err(SandboxError::value_error(format!(
                        "too many values to unpack (expected {count})"
                    )));
                }
                Ok(items)
            }
            Some(star) => {
                let fixed = count.saturating_sub(1);
                if items.len() < fixed {
                    return Err(SandboxError::value_error(format!(
                        "not enough values to unpack (expected at least {fixed}, got {})",
                        items.len()
                    )));
                }
                let tail = fixed - star;
                let rest_end = items.len() - tail;
                let mut out = Vec::with_capacity(count);
                out.extend_from_slice(&items[..star]);
                out.push(Value::list(items[star..rest_end].to_vec()));
                out.extend_from_slice(&items[rest_end..]);
                Ok(out)
            }
        }
    }

    fn iter_unpack_sequence(
        &self,
        iterable: &Value,
        count: usize,
        starred: Option<usize>,
    ) -> Result<Vec<Vec<Value>>> {
        let iterable = self.get_iter(iterable)?;
        ops::iterate(&iterable)?
            .iter()
            .map(|item| self.unpack_sequence(item, count, starred))
            .collect()
    }

    fn inplace_var(&self, op: &str, target: &Value, operand: &Value) -> Result<Value> {
        let allowed = matches!(
            target,
            Value::List(_) | Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Str(_)
        );
        if !allowed {
            return Err(SandboxError::violation(format!(
                "The '{op}' operation is not allowed on a <class '{}'>",
                target.type_name()
            )));
        }
        let bin = BinOp::from_augmented(op)
            .filter(|_| INPLACE_OPERATORS.contains(&op))
            .ok_or_else(|| {
                SandboxError::violation(format!("The '{op}' operation is not allowed"))
            })?;
        match (bin, target) {
            // Lists are extended in place, so aliases observe the change.
            (BinOp::Add, Value::List(items)) => {
                let extra = ops::iterate(operand)?;
                let mut items = items.borrow_mut();
                if items.len() + extra.len() > ops::MAX_SEQUENCE_LEN {
                    return Err(SandboxError::exception("MemoryError", "list too large"));
                }
                items.extend(extra);
                Ok(target.clone())
            }
            (BinOp::Mul, Value::List(items)) => {
                let repeated = ops::binary(BinOp::Mul, target, operand)?;
                if let Value::List(new_items) = repeated {
                    let new_items = new_items.borrow().clone();
                    *items.borrow_mut() = new_items;
                }
                Ok(target.clone())
            }
            _ => ops::binary(bin, target, operand),
        }
    }

    fn print(&self, _interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
        args.allow_keywords("print", &["sep", "end", "flush"])?;
        let text_arg = |name: &str, default: &str| -> Result<String> {
            match args.keyword(name) {
                None | Some(Value::None) => Ok(default.to_string()),
                Some(Value::Str(s)) => Ok(s.to_string()),
                Some(other) => Err(SandboxError::type_error(format!(
                    "{name} must be None or a string, not {}",
                    other.type_name()
                ))),
            }
        };
        let sep = text_arg("sep", " ")?;
        let end = text_arg("end", "\n")?;
        let body = args
            .positional
            .iter()
            .map(Value::to_str)
            .collect::<Vec<_>>()
            .join(&sep);
        match self.policy {
            PrintPolicy::Capture => {
                let mut printed = self.printed.borrow_mut();
                printed.push(body);
                printed.push(end);
            }
            PrintPolicy::Warn => {
                if !self.warned_print.replace(true) {
                    self.logger.warning(PRINT_DISABLED_WARNING);
                }
            }
        }
        Ok(Value::None)
    }

    fn printed(&self) -> String {
        self.printed.borrow().concat()
    }
}

// ---------------------------------------------------------------------------
// Hook builtins bound into the namespace
// ---------------------------------------------------------------------------

fn count_and_star(args: &CallArgs, hook: &str) -> Result<(usize, Option<usize>)> {
    args.expect(hook, 3, 3)?;
    let count = usize::try_from(args.positional[1].as_int()?)
        .map_err(|_| SandboxError::Internal(format!("{hook}: negative count")))?;
    let starred = match &args.positional[2] {
        Value::None => None,
        v => Some(
            usize::try_from(v.as_int()?)
                .map_err(|_| SandboxError::Internal(format!("{hook}: negative index")))?,
        ),
    };
    Ok((count, starred))
}

fn getattr_hook(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("_getattr_", 2, 2)?;
    let name = args.positional[1].as_str()?.to_string();
    interp.guards().get_attr(interp, &args.positional[0], &name)
}

fn getitem_hook(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("_getitem_", 2, 2)?;
    interp
        .guards()
        .get_item(interp, &args.positional[0], &args.positional[1])
}

fn write_hook(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("_write_", 1, 2)?;
    let attr = match args.get(1) {
        Some(Value::Str(s)) => Some(s.to_string()),
        _ => None,
    };
    interp.guards().write(&args.positional[0], attr.as_deref())
}

fn getiter_hook(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("_getiter_", 1, 1)?;
    interp.guards().get_iter(&args.positional[0])
}

fn unpack_hook(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let (count, starred) = count_and_star(&args, "_unpack_sequence_")?;
    let values = interp
        .guards()
        .unpack_sequence(&args.positional[0], count, starred)?;
    Ok(Value::list(values))
}

fn iter_unpack_hook(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let (count, starred) = count_and_star(&args, "_iter_unpack_sequence_")?;
    let rows = interp
        .guards()
        .iter_unpack_sequence(&args.positional[0], count, starred)?;
    Ok(Value::list(rows.into_iter().map(Value::list).collect()))
}

fn inplacevar_hook(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("_inplacevar_", 3, 3)?;
    let op = args.positional[0].as_str()?.to_string();
    interp
        .guards()
        .inplace_var(&op, &args.positional[1], &args.positional[2])
}

fn print_hook(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    interp.guards().print(interp, args)
}

/// `(name, hook)` pairs bound into every script namespace.
pub fn hooks() -> Vec<(&'static str, Value)> {
    vec![
        ("_getattr_", Builtin::new("getattr", getattr_hook)),
        ("_getitem_", Builtin::new("getitem", getitem_hook)),
        ("_write_", Builtin::new("write", write_hook)),
        ("_getiter_", Builtin::new("iter", getiter_hook)),
        ("_unpack_sequence_", Builtin::new("unpack_sequence", unpack_hook)),
        (
            "_iter_unpack_sequence_",
            Builtin::new("iter_unpack_sequence", iter_unpack_hook),
        ),
        ("_inplacevar_", Builtin::new("inplacevar", inplacevar_hook)),
        ("_print_", Builtin::new("print", print_hook)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guards() -> SandboxGuards {
        SandboxGuards::new(PrintPolicy::Capture, Rc::new(ScriptLogger::new(true)))
    }

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn write_guard_allows_list_and_dict_items_only() {
        let g = guards();
        assert!(g.write(&ints(&[1]), None).is_ok());
        assert!(matches!(
            g.write(&Value::tuple(vec![]), None),
            Err(SandboxError::Violation(_))
        ));
        assert!(matches!(
            g.write(&ints(&[]), Some("x")),
            Err(SandboxError::Violation(_))
        ));
    }

    #[test]
    fn unpack_checks_arity() {
        let g = guards();
        assert_eq!(g.unpack_sequence(&ints(&[1, 2]), 2, None).unwrap().len(), 2);
        let err = g.unpack_sequence(&ints(&[1]), 2, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: not enough values to unpack (expected 2, got 1)"
        );
        let err = g.unpack_sequence(&ints(&[1, 2, 3]), 2, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: too many values to unpack (expected 2)"
        );
        assert!(g.unpack_sequence(&Value::Int(3), 2, None).is_err());
    }

    #[test]
    fn starred_unpack_collects_middle() {
        let g = guards();
        let out = g.unpack_sequence(&ints(&[1, 2, 3, 4]), 3, Some(1)).unwrap();
        assert_eq!(out[0].repr(), "1");
        assert_eq!(out[1].repr(), "[2, 3]");
        assert_eq!(out[2].repr(), "4");
        let out = g.unpack_sequence(&ints(&[1]), 2, Some(0)).unwrap();
        assert_eq!(out[0].repr(), "[]");
    }

    #[test]
    fn iter_unpack_rows() {
        let g = guards();
        let pairs = Value::list(vec![ints(&[1, 2]), ints(&[3, 4])]);
        let rows = g.iter_unpack_sequence(&pairs, 2, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0].repr(), "3");
    }

    #[test]
    fn inplace_on_supported_types() {
        let g = guards();
        assert_eq!(
            g.inplace_var("+=", &Value::Int(1), &Value::Int(2)).unwrap().repr(),
            "3"
        );
        assert_eq!(
            g.inplace_var("+=", &Value::from("a"), &Value::from("b"))
                .unwrap()
                .repr(),
            "'ab'"
        );
        let list = ints(&[1]);
        g.inplace_var("+=", &list, &ints(&[2])).unwrap();
        assert_eq!(list.repr(), "[1, 2]");
    }

    #[test]
    fn inplace_on_unsupported_type_is_a_violation() {
        let g = guards();
        let err = g
            .inplace_var("+=", &Value::tuple(vec![]), &Value::tuple(vec![]))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Violation(_)));
        assert_eq!(
            err.to_string(),
            "The '+=' operation is not allowed on a <class 'tuple'>"
        );
        assert!(matches!(
            g.inplace_var("@=", &Value::Int(1), &Value::Int(1)),
            Err(SandboxError::Exception(_))
        ));
    }

    #[test]
    fn iteration_guard() {
        let g = guards();
        assert!(g.get_iter(&ints(&[])).is_ok());
        assert!(g.get_iter(&Value::Int(1)).is_err());
    }
}
