//! `operator`: function forms of the script operators.

use std::any::Any;

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::object::{Module, ScriptObject};
use crate::ops;
use crate::value::{Builtin, CallArgs, Value};

fn pair<'a>(args: &'a CallArgs, name: &str) -> Result<(&'a Value, &'a Value)> {
    args.expect(name, 2, 2)?;
    Ok((&args.positional[0], &args.positional[1]))
}

macro_rules! binary_fn {
    ($fn_name:ident, $op:expr) => {
        fn $fn_name(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
            let (a, b) = pair(&args, stringify!($fn_name))?;
            ops::binary($op, a, b)
        }
    };
}

macro_rules! compare_fn {
    ($fn_name:ident, $op:expr) => {
        fn $fn_name(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
            let (a, b) = pair(&args, stringify!($fn_name))?;
            ops::compare($op, a, b).map(Value::Bool)
        }
    };
}

macro_rules! unary_fn {
    ($fn_name:ident, $op:expr) => {
        fn $fn_name(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
            args.expect(stringify!($fn_name), 1, 1)?;
            ops::unary($op, &args.positional[0])
        }
    };
}

binary_fn!(add, BinOp::Add);
binary_fn!(sub, BinOp::Sub);
binary_fn!(mul, BinOp::Mul);
binary_fn!(truediv, BinOp::Div);
binary_fn!(floordiv, BinOp::FloorDiv);
binary_fn!(mod_, BinOp::Mod);
binary_fn!(pow, BinOp::Pow);
binary_fn!(lshift, BinOp::LShift);
binary_fn!(rshift, BinOp::RShift);
binary_fn!(and_, BinOp::BitAnd);
binary_fn!(or_, BinOp::BitOr);
binary_fn!(xor, BinOp::BitXor);

compare_fn!(eq, CmpOp::Eq);
compare_fn!(ne, CmpOp::NotEq);
compare_fn!(lt, CmpOp::Lt);
compare_fn!(le, CmpOp::Le);
compare_fn!(gt, CmpOp::Gt);
compare_fn!(ge, CmpOp::Ge);
compare_fn!(is_, CmpOp::Is);
compare_fn!(is_not, CmpOp::IsNot);

unary_fn!(neg, UnaryOp::Neg);
unary_fn!(pos, UnaryOp::Pos);
unary_fn!(not_, UnaryOp::Not);
unary_fn!(invert, UnaryOp::Invert);

fn truth(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("truth", 1, 1)?;
    Ok(Value::Bool(args.positional[0].truthy()))
}

fn abs(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    match interp.builtin("abs") {
        Some(func) => interp.call_value(&func, args),
        None => Err(SandboxError::Internal("abs builtin missing".into())),
    }
}

fn concat(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let (a, b) = pair(&args, "concat")?;
    if a.sequence_items().is_none() || a.is_number() || matches!(a, Value::Dict(_) | Value::Set(_)) {
        return Err(SandboxError::type_error(format!(
            "'{}' object can't be concatenated",
            a.type_name()
        )));
    }
    ops::binary(BinOp::Add, a, b)
}

fn contains(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let (container, item) = pair(&args, "contains")?;
    ops::contains(container, item).map(Value::Bool)
}

fn count_of(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let (container, item) = pair(&args, "countOf")?;
    let count = ops::iterate(container)?
        .iter()
        .filter(|v| crate::value::values_equal(v, item))
        .count();
    Ok(Value::Int(count as i64))
}

fn getitem(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    let (obj, key) = pair(&args, "getitem")?;
    interp.get_item(obj, key)
}

// ---------------------------------------------------------------------------
// Callable getters
// ---------------------------------------------------------------------------

/// `itemgetter(*items)`.
pub struct ItemGetter {
    items: Vec<Value>,
}

impl ScriptObject for ItemGetter {
    fn type_name(&self) -> &str {
        "operator.itemgetter"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
        args.expect("itemgetter", 1, 1)?;
        let obj = &args.positional[0];
        if let [single] = self.items.as_slice() {
            return interp.get_item(obj, single);
        }
        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            out.push(interp.get_item(obj, item)?);
        }
        Ok(Value::tuple(out))
    }

    fn repr(&self) -> String {
        let items: Vec<String> = self.items.iter().map(Value::repr).collect();
        format!("operator.itemgetter({})", items.join(", "))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `attrgetter(*attrs)`; dotted names walk nested attributes.
pub struct AttrGetter {
    paths: Vec<String>,
}

impl AttrGetter {
    fn resolve(interp: &mut Interpreter, obj: &Value, path: &str) -> Result<Value> {
        let mut current = obj.clone();
        for part in path.split('.') {
            current = interp.get_attr(&current, part)?;
        }
        Ok(current)
    }
}

impl ScriptObject for AttrGetter {
    fn type_name(&self) -> &str {
        "operator.attrgetter"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
        args.expect("attrgetter", 1, 1)?;
        let obj = &args.positional[0];
        if let [single] = self.paths.as_slice() {
            return Self::resolve(interp, obj, single);
        }
        let mut out = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            out.push(Self::resolve(interp, obj, path)?);
        }
        Ok(Value::tuple(out))
    }

    fn repr(&self) -> String {
        let paths: Vec<String> = self.paths.iter().map(|p| format!("'{p}'")).collect();
        format!("operator.attrgetter({})", paths.join(", "))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// `methodcaller(name, *args, **kwargs)`.
pub struct MethodCaller {
    name: String,
    args: CallArgs,
}

impl ScriptObject for MethodCaller {
    fn type_name(&self) -> &str {
        "operator.methodcaller"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
        args.expect("methodcaller", 1, 1)?;
        let method = interp.get_attr(&args.positional[0], &self.name)?;
        interp.call_value(&method, self.args.clone())
    }

    fn repr(&self) -> String {
        format!("operator.methodcaller('{}')", self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn itemgetter(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    if args.positional.is_empty() {
        return Err(SandboxError::type_error(
            "itemgetter expected 1 argument, got 0",
        ));
    }
    Ok(Value::object(ItemGetter {
        items: args.positional,
    }))
}

fn attrgetter(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    if args.positional.is_empty() {
        return Err(SandboxError::type_error(
            "attrgetter expected 1 argument, got 0",
        ));
    }
    let paths = args
        .positional
        .iter()
        .map(|p| {
            p.as_str()
                .map(str::to_string)
                .map_err(|_| SandboxError::type_error("attribute name must be a string"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Value::object(AttrGetter { paths }))
}

fn methodcaller(_interp: &mut Interpreter, mut args: CallArgs) -> Result<Value> {
    if args.positional.is_empty() {
        return Err(SandboxError::type_error(
            "methodcaller needs at least one argument, the method name",
        ));
    }
    let name = args.positional.remove(0);
    let name = name
        .as_str()
        .map_err(|_| SandboxError::type_error("method name must be a string"))?
        .to_string();
    Ok(Value::object(MethodCaller { name, args }))
}

pub fn module() -> Value {
    let f = Builtin::new;
    Value::object(Module::new(
        "operator",
        vec![
            ("add", f("add", add)),
            ("sub", f("sub", sub)),
            ("mul", f("mul", mul)),
            ("truediv", f("truediv", truediv)),
            ("floordiv", f("floordiv", floordiv)),
            ("mod", f("mod", mod_)),
            ("pow", f("pow", pow)),
            ("lshift", f("lshift", lshift)),
            ("rshift", f("rshift", rshift)),
            ("and_", f("and_", and_)),
            ("or_", f("or_", or_)),
            ("xor", f("xor", xor)),
            ("eq", f("eq", eq)),
            ("ne", f("ne", ne)),
            ("lt", f("lt", lt)),
            ("le", f("le", le)),
            ("gt", f("gt", gt)),
            ("ge", f("ge", ge)),
            ("is_", f("is_", is_)),
            ("is_not", f("is_not", is_not)),
            ("neg", f("neg", neg)),
            ("pos", f("pos", pos)),
            ("not_", f("not_", not_)),
            ("invert", f("invert", invert)),
            ("inv", f("inv", invert)),
            ("truth", f("truth", truth)),
            ("abs", f("abs", abs)),
            ("concat", f("concat", concat)),
            ("contains", f("contains", contains)),
            ("countOf", f("countOf", count_of)),
            ("getitem", f("getitem", getitem)),
            ("itemgetter", f("itemgetter", itemgetter)),
            ("attrgetter", f("attrgetter", attrgetter)),
            ("methodcaller", f("methodcaller", methodcaller)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getter_reprs() {
        let getter = ItemGetter {
            items: vec![Value::Int(0), Value::from("name")],
        };
        assert_eq!(getter.repr(), "operator.itemgetter(0, 'name')");
        let attrs = AttrGetter {
            paths: vec!["state".into()],
        };
        assert_eq!(attrs.repr(), "operator.attrgetter('state')");
    }

    #[test]
    fn module_exposes_function_forms() {
        let module = module();
        let module = crate::object::downcast::<Module>(&module).unwrap();
        for name in ["add", "itemgetter", "attrgetter", "methodcaller", "not_"] {
            assert!(module.member(name).is_some(), "missing {name}");
        }
    }
}
