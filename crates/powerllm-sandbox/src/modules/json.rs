//! `json`: `dumps` renders text the way scripts expect from the standard
//! encoder (`", "` and `": "` separators, `NaN`, ASCII escaping); `loads`
//! parses with `serde_json`.

use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::modules::collections::Record;
use crate::object::{Module, downcast};
use crate::value::{Builtin, CallArgs, TypeKind, Value, float_repr, from_json};

/// Nesting depth past which the encoder assumes a reference cycle.
const MAX_DEPTH: usize = 100;

struct Encoder {
    indent: Option<String>,
    item_separator: String,
    key_separator: String,
    sort_keys: bool,
    ensure_ascii: bool,
    allow_nan: bool,
    default: Option<Value>,
}

impl Encoder {
    fn from_args(args: &CallArgs) -> Result<Self> {
        args.allow_keywords(
            "dumps",
            &[
                "indent",
                "separators",
                "sort_keys",
                "ensure_ascii",
                "allow_nan",
                "default",
                "skipkeys",
            ],
        )?;
        let indent = match args.keyword("indent") {
            None | Some(Value::None) => None,
            Some(Value::Str(s)) => Some(s.to_string()),
            Some(other) => Some(" ".repeat(other.as_int()?.max(0) as usize)),
        };
        let (item_separator, key_separator) = match args.keyword("separators") {
            None | Some(Value::None) => {
                let item = if indent.is_some() { "," } else { ", " };
                (item.to_string(), ": ".to_string())
            }
            Some(pair) => match pair.sequence_items().as_deref() {
                Some([item, key]) => (item.as_str()?.to_string(), key.as_str()?.to_string()),
                _ => {
                    return Err(SandboxError::value_error(
                        "separators must be an (item_separator, key_separator) tuple",
                    ));
                }
            },
        };
        let flag = |name: &str, default: bool| args.keyword(name).map_or(default, Value::truthy);
        Ok(Self {
            indent,
            item_separator,
            key_separator,
            sort_keys: flag("sort_keys", false),
            ensure_ascii: flag("ensure_ascii", true),
            allow_nan: flag("allow_nan", true),
            default: args.keyword("default").filter(|v| !v.is_none()).cloned(),
        })
    }

    fn newline(&self, out: &mut String, level: usize) {
        if let Some(indent) = &self.indent {
            out.push('\n');
            for _ in 0..level {
                out.push_str(indent);
            }
        }
    }

    fn float(&self, f: f64) -> Result<String> {
        if f.is_finite() {
            return Ok(float_repr(f));
        }
        if !self.allow_nan {
            return Err(SandboxError::value_error(format!(
                "Out of range float values are not JSON compliant: {}",
                float_repr(f)
            )));
        }
        Ok(if f.is_nan() {
            "NaN"
        } else if f > 0.0 {
            "Infinity"
        } else {
            "-Infinity"
        }
        .to_string())
    }

    fn string(&self, s: &str, out: &mut String) {
        out.push('"');
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '\u{08}' => out.push_str("\\b"),
                '\u{0c}' => out.push_str("\\f"),
                c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
                c if self.ensure_ascii && !c.is_ascii() => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        out.push_str(&format!("\\u{unit:04x}"));
                    }
                }
                c => out.push(c),
            }
        }
        out.push('"');
    }

    fn key(&self, key: &Value) -> Result<String> {
        Ok(match key {
            Value::Str(s) => s.to_string(),
            Value::Bool(true) => "true".to_string(),
            Value::Bool(false) => "false".to_string(),
            Value::None => "null".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => self.float(*f)?,
            other => {
                return Err(SandboxError::type_error(format!(
                    "keys must be str, int, float, bool or None, not {}",
                    other.type_name()
                )));
            }
        })
    }

    fn array(
        &self,
        interp: &mut Interpreter,
        items: &[Value],
        out: &mut String,
        level: usize,
    ) -> Result<()> {
        if items.is_empty() {
            out.push_str("[]");
            return Ok(());
        }
        out.push('[');
        for (index, item) in items.iter().enumerate() {
            if index > 0 {
                out.push_str(&self.item_separator);
            }
            self.newline(out, level + 1);
            self.encode(interp, item, out, level + 1)?;
        }
        self.newline(out, level);
        out.push(']');
        Ok(())
    }

    fn object(
        &self,
        interp: &mut Interpreter,
        entries: Vec<(Value, Value)>,
        out: &mut String,
        level: usize,
    ) -> Result<()> {
        if entries.is_empty() {
            out.push_str("{}");
            return Ok(());
        }
        let mut rendered = entries
            .into_iter()
            .map(|(k, v)| Ok((self.key(&k)?, v)))
            .collect::<Result<Vec<_>>>()?;
        if self.sort_keys {
            rendered.sort_by(|a, b| a.0.cmp(&b.0));
        }
        out.push('{');
        for (index, (key, value)) in rendered.iter().enumerate() {
            if index > 0 {
                out.push_str(&self.item_separator);
            }
            self.newline(out, level + 1);
            self.string(key, out);
            out.push_str(&self.key_separator);
            self.encode(interp, value, out, level + 1)?;
        }
        self.newline(out, level);
        out.push('}');
        Ok(())
    }

    fn encode(
        &self,
        interp: &mut Interpreter,
        value: &Value,
        out: &mut String,
        level: usize,
    ) -> Result<()> {
        if level > MAX_DEPTH {
            return Err(SandboxError::value_error("Circular reference detected"));
        }
        match value {
            Value::None => out.push_str("null"),
            Value::Bool(true) => out.push_str("true"),
            Value::Bool(false) => out.push_str("false"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&self.float(*f)?),
            Value::Str(s) => self.string(s, out),
            Value::List(items) => {
                let items = items.borrow().clone();
                self.array(interp, &items, out, level)?;
            }
            Value::Tuple(items) => self.array(interp, items, out, level)?,
            Value::Dict(d) => {
                let entries: Vec<(Value, Value)> = d.borrow().entries.values().cloned().collect();
                self.object(interp, entries, out, level)?;
            }
            Value::Object(_) if downcast::<Record>(value).is_some() => {
                let items = value.sequence_items().unwrap_or_default();
                self.array(interp, &items, out, level)?;
            }
            other => match &self.default {
                Some(default) => {
                    let replacement = interp.call_value(default, CallArgs::new(vec![other.clone()]))?;
                    self.encode(interp, &replacement, out, level + 1)?;
                }
                None => {
                    return Err(SandboxError::type_error(format!(
                        "Object of type {} is not JSON serializable",
                        other.type_name()
                    )));
                }
            },
        }
        Ok(())
    }
}

fn dumps(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("dumps", 1, 1)?;
    let encoder = Encoder::from_args(&args)?;
    let mut out = String::new();
    encoder.encode(interp, &args.positional[0], &mut out, 0)?;
    Ok(Value::from(out))
}

fn loads(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("loads", 1, 1)?;
    let text = match &args.positional[0] {
        Value::Str(s) => s.clone(),
        other => {
            return Err(SandboxError::type_error(format!(
                "the JSON object must be str, not {}",
                other.type_name()
            )));
        }
    };
    serde_json::from_str::<serde_json::Value>(&text)
        .map(|json| from_json(&json))
        .map_err(|err| SandboxError::exception("JSONDecodeError", err.to_string()))
}

pub fn module() -> Value {
    Value::object(Module::new(
        "json",
        vec![
            ("dumps", Builtin::new("dumps", dumps)),
            ("loads", Builtin::new("loads", loads)),
            (
                "JSONDecodeError",
                Value::Type(TypeKind::Exception("JSONDecodeError".into())),
            ),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> Encoder {
        Encoder {
            indent: None,
            item_separator: ", ".into(),
            key_separator: ": ".into(),
            sort_keys: false,
            ensure_ascii: true,
            allow_nan: true,
            default: None,
        }
    }

    #[test]
    fn strings_escape_like_the_standard_encoder() {
        let mut out = String::new();
        encoder().string("caf\u{e9} \"x\"\n\u{1f600}", &mut out);
        assert_eq!(out, r#""café \"x\"\n😀""#);

        let mut out = String::new();
        let raw = Encoder {
            ensure_ascii: false,
            ..encoder()
        };
        raw.string("caf\u{e9}", &mut out);
        assert_eq!(out, "\"caf\u{e9}\"");
    }

    #[test]
    fn floats_and_keys() {
        let enc = encoder();
        assert_eq!(enc.float(1.5).unwrap(), "1.5");
        assert_eq!(enc.float(f64::NAN).unwrap(), "NaN");
        assert_eq!(enc.float(f64::NEG_INFINITY).unwrap(), "-Infinity");
        assert_eq!(enc.key(&Value::Int(3)).unwrap(), "3");
        assert_eq!(enc.key(&Value::None).unwrap(), "null");
        let err = enc.key(&Value::tuple(vec![])).unwrap_err();
        assert!(err.to_string().contains("keys must be str"));

        let strict = Encoder {
            allow_nan: false,
            ..encoder()
        };
        assert!(strict.float(f64::INFINITY).is_err());
    }
}
