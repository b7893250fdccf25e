//! Host-side objects visible to scripts.
//!
//! Anything that is not a plain data value (the host handle, its
//! sub-registries, modules, regex matches, ...) implements
//! [`ScriptObject`]. Objects declare their capability owner so the
//! attribute guard can apply the right allowlist before any lookup happens.

use std::any::Any;

use crate::allowlist::Owner;
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::value::{CallArgs, Value};

/// Result of looking up an attribute on an object.
pub enum Attr {
    /// A plain attribute value.
    Value(Value),
    /// A method, dispatched later through [`ScriptObject::call_method`].
    Method,
}

pub trait ScriptObject: Any {
    /// Type name shown in messages and returned by `type(x)`.
    fn type_name(&self) -> &str;

    /// Capability owner identity, if the object is guarded by an allowlist.
    fn owner(&self) -> Option<Owner> {
        None
    }

    /// Look up an attribute. `None` means the attribute does not exist.
    fn attr(&self, _name: &str) -> Option<Attr> {
        None
    }

    /// Invoke a method previously reported as [`Attr::Method`].
    fn call_method(&self, _interp: &mut Interpreter, name: &str, _args: CallArgs) -> Result<Value> {
        Err(SandboxError::attribute_error(format!(
            "'{}' object has no attribute '{name}'",
            self.type_name()
        )))
    }

    fn is_callable(&self) -> bool {
        false
    }

    fn call(&self, _interp: &mut Interpreter, _args: CallArgs) -> Result<Value> {
        Err(SandboxError::type_error(format!(
            "'{}' object is not callable",
            self.type_name()
        )))
    }

    fn get_item(&self, _key: &Value) -> Result<Value> {
        Err(SandboxError::type_error(format!(
            "'{}' object is not subscriptable",
            self.type_name()
        )))
    }

    /// Items produced by iterating the object, if it is iterable.
    fn iterate(&self) -> Option<Vec<Value>> {
        None
    }

    fn len(&self) -> Option<usize> {
        self.iterate().map(|items| items.len())
    }

    fn truthy(&self) -> bool {
        true
    }

    fn repr(&self) -> String {
        format!("<{} object>", self.type_name())
    }

    /// JSON form used when the object ends up in `output`.
    fn to_json(&self) -> Option<serde_json::Value> {
        None
    }

    /// Value equality with another object; identity is checked first.
    fn equals(&self, _other: &dyn ScriptObject) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

/// A namespace of named members, used for importable modules.
pub struct Module {
    pub name: &'static str,
    pub owner: Option<Owner>,
    pub members: Vec<(&'static str, Value)>,
}

impl Module {
    pub fn new(name: &'static str, members: Vec<(&'static str, Value)>) -> Self {
        Self {
            name,
            owner: None,
            members,
        }
    }

    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn member(&self, name: &str) -> Option<&Value> {
        self.members
            .iter()
            .find(|(member, _)| *member == name)
            .map(|(_, v)| v)
    }
}

impl ScriptObject for Module {
    fn type_name(&self) -> &str {
        "module"
    }

    fn owner(&self) -> Option<Owner> {
        self.owner
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        self.member(name).cloned().map(Attr::Value)
    }

    fn repr(&self) -> String {
        format!("<module '{}'>", self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Downcast helper for objects stored in a [`Value`].
pub fn downcast<T: 'static>(value: &Value) -> Option<&T> {
    match value {
        Value::Object(obj) => obj.as_any().downcast_ref::<T>(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_members_resolve() {
        let module = Module::new("demo", vec![("answer", Value::Int(42))]);
        assert!(matches!(module.attr("answer"), Some(Attr::Value(Value::Int(42)))));
        assert!(module.attr("missing").is_none());
        assert_eq!(module.repr(), "<module 'demo'>");
    }

    #[test]
    fn downcast_finds_concrete_type() {
        let value = Value::object(Module::new("demo", Vec::new()));
        assert_eq!(downcast::<Module>(&value).map(|m| m.name), Some("demo"));
        assert!(downcast::<Module>(&Value::None).is_none());
    }
}
