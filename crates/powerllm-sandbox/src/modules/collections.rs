//! `collections`: `Counter`, `defaultdict`, `OrderedDict` and `namedtuple`.
//!
//! The dict flavours are ordinary dict values tagged with a [`DictKind`];
//! `namedtuple` builds a callable record type.
//!
//! [`DictKind`]: crate::value::DictKind

use std::any::Any;
use std::rc::Rc;

use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::object::{Attr, Module, ScriptObject};
use crate::ops;
use crate::value::{Builtin, CallArgs, TypeKind, Value, to_json, values_equal};

/// Record type produced by `namedtuple(typename, field_names)`.
pub struct RecordType {
    name: Rc<str>,
    fields: Rc<[String]>,
    defaults: Vec<Value>,
}

impl RecordType {
    fn build(&self, args: CallArgs) -> Result<Record> {
        let CallArgs {
            positional,
            keywords,
        } = args;
        let arity = self.fields.len();
        if positional.len() > arity {
            return Err(SandboxError::type_error(format!(
                "{}() takes {} positional arguments but {} were given",
                self.name,
                arity,
                positional.len()
            )));
        }
        let mut slots: Vec<Option<Value>> = positional.into_iter().map(Some).collect();
        slots.resize(arity, None);
        for (key, value) in keywords {
            let index = self
                .fields
                .iter()
                .position(|f| *f == key)
                .ok_or_else(|| {
                    SandboxError::type_error(format!(
                        "{}() got an unexpected keyword argument '{key}'",
                        self.name
                    ))
                })?;
            if slots[index].is_some() {
                return Err(SandboxError::type_error(format!(
                    "{}() got multiple values for argument '{key}'",
                    self.name
                )));
            }
            slots[index] = Some(value);
        }
        let first_default = arity - self.defaults.len();
        let mut values = Vec::with_capacity(arity);
        let mut missing = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(value) => values.push(value),
                None if index >= first_default => {
                    values.push(self.defaults[index - first_default].clone());
                }
                None => {
                    missing.push(format!("'{}'", self.fields[index]));
                    values.push(Value::None);
                }
            }
        }
        if !missing.is_empty() {
            return Err(SandboxError::type_error(format!(
                "{}() missing {} required positional argument{}: {}",
                self.name,
                missing.len(),
                if missing.len() == 1 { "" } else { "s" },
                missing.join(" and ")
            )));
        }
        Ok(Record {
            name: self.name.clone(),
            fields: self.fields.clone(),
            values,
        })
    }
}

impl ScriptObject for RecordType {
    fn type_name(&self) -> &str {
        "type"
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, _interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
        self.build(args).map(Value::object)
    }

    fn repr(&self) -> String {
        format!("<class '{}'>", self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Instance of a [`RecordType`]: a tuple whose items are also attributes.
pub struct Record {
    name: Rc<str>,
    fields: Rc<[String]>,
    values: Vec<Value>,
}

impl ScriptObject for Record {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        self.fields
            .iter()
            .position(|f| f == name)
            .map(|index| Attr::Value(self.values[index].clone()))
    }

    fn get_item(&self, key: &Value) -> Result<Value> {
        ops::get_item(&Value::tuple(self.values.clone()), key)
    }

    fn iterate(&self) -> Option<Vec<Value>> {
        Some(self.values.clone())
    }

    fn repr(&self) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .zip(&self.values)
            .map(|(field, value)| format!("{field}={}", value.repr()))
            .collect();
        format!("{}({})", self.name, parts.join(", "))
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::Array(self.values.iter().map(to_json).collect()))
    }

    fn equals(&self, other: &dyn ScriptObject) -> bool {
        other
            .as_any()
            .downcast_ref::<Record>()
            .is_some_and(|o| {
                o.values.len() == self.values.len()
                    && o.values.iter().zip(&self.values).all(|(a, b)| values_equal(a, b))
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn valid_field(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn field_names(spec: &Value) -> Result<Vec<String>> {
    match spec {
        Value::Str(s) => Ok(s
            .replace(',', " ")
            .split_whitespace()
            .map(str::to_string)
            .collect()),
        other => ops::iterate(other)?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect(),
    }
}

fn namedtuple(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("namedtuple", 2, 2)?;
    args.allow_keywords("namedtuple", &["defaults", "rename", "module"])?;
    let name = args.positional[0].as_str()?;
    if !valid_field(name) {
        return Err(SandboxError::value_error(format!(
            "Type names and field names must be valid identifiers: '{name}'"
        )));
    }
    let fields = field_names(&args.positional[1])?;
    for (index, field) in fields.iter().enumerate() {
        if !valid_field(field) {
            return Err(SandboxError::value_error(format!(
                "Type names and field names must be valid identifiers: '{field}'"
            )));
        }
        if field.starts_with('_') {
            return Err(SandboxError::value_error(format!(
                "Field names cannot start with an underscore: '{field}'"
            )));
        }
        if fields[..index].contains(field) {
            return Err(SandboxError::value_error(format!(
                "Encountered duplicate field name: '{field}'"
            )));
        }
    }
    let defaults = match args.keyword("defaults") {
        None | Some(Value::None) => Vec::new(),
        Some(values) => ops::iterate(values)?,
    };
    if defaults.len() > fields.len() {
        return Err(SandboxError::type_error(
            "Got more default values than field names",
        ));
    }
    Ok(Value::object(RecordType {
        name: Rc::from(name),
        fields: fields.into(),
        defaults,
    }))
}

pub fn module() -> Value {
    Value::object(Module::new(
        "collections",
        vec![
            ("Counter", Value::Type(TypeKind::Counter)),
            ("defaultdict", Value::Type(TypeKind::DefaultDict)),
            ("OrderedDict", Value::Type(TypeKind::OrderedDict)),
            ("namedtuple", Builtin::new("namedtuple", namedtuple)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> RecordType {
        RecordType {
            name: Rc::from("Point"),
            fields: vec!["x".to_string(), "y".to_string()].into(),
            defaults: vec![Value::Int(0)],
        }
    }

    #[test]
    fn record_fills_defaults_and_keywords() {
        let record = point()
            .build(CallArgs::with_keywords(
                vec![Value::Int(1)],
                vec![("y".into(), Value::Int(5))],
            ))
            .unwrap();
        assert_eq!(record.repr(), "Point(x=1, y=5)");
        let record = point().build(CallArgs::new(vec![Value::Int(3)])).unwrap();
        assert_eq!(record.repr(), "Point(x=3, y=0)");
        assert!(matches!(record.attr("x"), Some(Attr::Value(Value::Int(3)))));
        assert!(record.attr("z").is_none());
    }

    #[test]
    fn record_rejects_bad_arguments() {
        let err = point()
            .build(CallArgs::new(vec![Value::Int(1), Value::Int(2), Value::Int(3)]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("takes 2 positional arguments"));
        let err = point()
            .build(CallArgs::with_keywords(vec![], vec![("z".into(), Value::Int(1))]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("unexpected keyword argument 'z'"));
    }

    #[test]
    fn field_specs_accept_strings_and_lists() {
        assert_eq!(field_names(&Value::from("a, b c")).unwrap(), ["a", "b", "c"]);
        let list = Value::list(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(field_names(&list).unwrap(), ["a", "b"]);
        assert!(valid_field("entity_id"));
        assert!(!valid_field("1st"));
    }
}
