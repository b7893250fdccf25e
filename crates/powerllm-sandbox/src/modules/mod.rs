//! Importable modules and the restricted import resolver.
//!
//! Only side-effect-free modules can be imported. `datetime`, `time` and
//! `dt_util` resolve to the same guarded objects bound as builtins, and
//! `logging` resolves to a façade whose `getLogger` always returns the
//! execution's logger.

pub mod collections;
pub mod csv;
pub mod datetime;
pub mod dt_util;
pub mod functools;
pub mod itertools;
pub mod json;
pub mod logging;
pub mod math;
pub mod operator;
pub mod random;
pub mod re;
pub mod string;
pub mod time;

use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::object::{Module, downcast};
use crate::value::{CallArgs, Value};

/// Standard modules a script may import.
pub const ALLOWED_IMPORT: &[&str] = &[
    "math",
    "random",
    "itertools",
    "functools",
    "collections",
    "json",
    "csv",
    "re",
    "string",
    "operator",
    "enum",
    "types",
];

/// Synthetic modules resolved outside the allow-list.
const SPECIAL_IMPORT: &[&str] = &["datetime", "time", "dt_util"];

/// `__import__(name, ...)`, the resolver behind `import` statements.
pub fn import(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("__import__", 1, 5)?;
    let name = args.positional[0].as_str()?.to_string();
    let mut parts = name.split('.');
    let top = parts.next().unwrap_or_default();

    if ALLOWED_IMPORT.contains(&top) {
        let mut module = load(interp, top)?;
        for part in parts {
            let child = downcast::<Module>(&module)
                .and_then(|m| m.member(part))
                .filter(|member| downcast::<Module>(member).is_some())
                .cloned();
            module = child.ok_or_else(|| {
                SandboxError::exception("ImportError", format!("No module named '{name}'"))
            })?;
        }
        return Ok(module);
    }
    if SPECIAL_IMPORT.contains(&name.as_str()) {
        return interp
            .builtin(&name)
            .ok_or_else(|| SandboxError::Internal(format!("builtin module {name} missing")));
    }
    if name == "logging" {
        return load(interp, "logging");
    }
    tracing::debug!(module = %name, "import rejected");
    Err(SandboxError::import_error(&name))
}

/// Build (once per execution) the module object for `name`.
fn load(interp: &mut Interpreter, name: &str) -> Result<Value> {
    if let Some(module) = interp.cached_module(name) {
        return Ok(module);
    }
    let module = match name {
        "math" | "random" | "string" => interp
            .builtin(name)
            .ok_or_else(|| SandboxError::Internal(format!("builtin module {name} missing")))?,
        "itertools" => itertools::module(),
        "functools" => functools::module(),
        "collections" => collections::module(),
        "json" => json::module(),
        "csv" => csv::module(),
        "re" => re::module(),
        "operator" => operator::module(),
        "logging" => logging::module(),
        "enum" => Value::object(Module::new("enum", Vec::new())),
        "types" => Value::object(Module::new("types", Vec::new())),
        other => return Err(SandboxError::import_error(other)),
    };
    interp.cache_module(name, module.clone());
    Ok(module)
}

// ---------------------------------------------------------------------------
// Shared helpers for module functions
// ---------------------------------------------------------------------------

/// Positional float argument `index` of `func`.
pub(crate) fn float_arg(args: &CallArgs, func: &str, index: usize, name: &str) -> Result<f64> {
    args.required(func, index, name)?.as_float()
}

/// Positional int argument `index` of `func`.
pub(crate) fn int_arg(args: &CallArgs, func: &str, index: usize, name: &str) -> Result<i64> {
    args.required(func, index, name)?.as_int()
}
