//! `csv`: read-only parsing of delimited text.
//!
//! Scripts have no files, so `reader` and `DictReader` accept either a list
//! of lines or a whole string and return the parsed rows eagerly.

use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::object::Module;
use crate::ops;
use crate::value::{Builtin, CallArgs, Dict, Value};

#[derive(Debug, Clone, Copy)]
struct Dialect {
    delimiter: char,
    quotechar: char,
    skip_initial_space: bool,
}

impl Dialect {
    fn from_args(args: &CallArgs, func: &str, extra: &[&str]) -> Result<Self> {
        let mut allowed = vec!["delimiter", "quotechar", "skipinitialspace"];
        allowed.extend_from_slice(extra);
        args.allow_keywords(func, &allowed)?;
        let single = |name: &str, default: char| -> Result<char> {
            match args.keyword(name) {
                None => Ok(default),
                Some(value) => {
                    let text = value.as_str()?;
                    let mut chars = text.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Ok(c),
                        _ => Err(SandboxError::type_error(format!(
                            "\"{name}\" must be a 1-character string"
                        ))),
                    }
                }
            }
        };
        Ok(Self {
            delimiter: single("delimiter", ',')?,
            quotechar: single("quotechar", '"')?,
            skip_initial_space: args.keyword("skipinitialspace").is_some_and(Value::truthy),
        })
    }
}

/// Collect the input into one newline-separated text.
fn source_text(source: &Value) -> Result<String> {
    if let Value::Str(s) = source {
        return Ok(s.to_string());
    }
    let mut lines = Vec::new();
    for line in ops::iterate(source)? {
        let text = line.as_str().map_err(|_| {
            SandboxError::exception(
                "Error",
                format!(
                    "iterator should return strings, not {}",
                    line.type_name()
                ),
            )
        })?;
        lines.push(text.trim_end_matches(['\r', '\n']).to_string());
    }
    Ok(lines.join("\n"))
}

fn parse_rows(text: &str, dialect: Dialect) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == dialect.quotechar {
                if chars.peek() == Some(&dialect.quotechar) {
                    field.push(c);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            c if c == dialect.delimiter => {
                row.push(std::mem::take(&mut field));
                at_field_start = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if !row.is_empty() || !field.is_empty() {
                    row.push(std::mem::take(&mut field));
                }
                rows.push(std::mem::take(&mut row));
                at_field_start = true;
            }
            ' ' if at_field_start && dialect.skip_initial_space => {}
            c if c == dialect.quotechar && at_field_start => {
                in_quotes = true;
                at_field_start = false;
            }
            c => {
                field.push(c);
                at_field_start = false;
            }
        }
    }
    if !row.is_empty() || !field.is_empty() || in_quotes {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn strings(row: &[String]) -> Vec<Value> {
    row.iter().map(|f| Value::from(f.as_str())).collect()
}

/// `csv.reader(lines, delimiter=',', quotechar='"', skipinitialspace=False)`.
fn reader(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("reader", 1, 1)?;
    let dialect = Dialect::from_args(&args, "reader", &[])?;
    let text = source_text(&args.positional[0])?;
    let rows = parse_rows(&text, dialect)
        .iter()
        .map(|row| Value::list(strings(row)))
        .collect();
    Ok(Value::list(rows))
}

/// `csv.DictReader(lines, fieldnames=None, restkey=None, restval=None, ...)`.
fn dict_reader(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("DictReader", 1, 2)?;
    let dialect = Dialect::from_args(&args, "DictReader", &["fieldnames", "restkey", "restval"])?;
    let text = source_text(&args.positional[0])?;
    let mut rows = parse_rows(&text, dialect)
        .into_iter()
        .filter(|row| !row.is_empty());
    let fieldnames: Vec<Value> = match args.arg(1, "fieldnames") {
        Some(names) if !names.is_none() => ops::iterate(names)?,
        _ => match rows.next() {
            Some(header) => strings(&header),
            None => return Ok(Value::list(Vec::new())),
        },
    };
    let restkey = args.keyword("restkey").cloned().unwrap_or(Value::None);
    let restval = args.keyword("restval").cloned().unwrap_or(Value::None);

    let mut out = Vec::new();
    for row in rows {
        let mut record = Dict::new();
        let values = strings(&row);
        for (index, name) in fieldnames.iter().enumerate() {
            let value = values.get(index).cloned().unwrap_or_else(|| restval.clone());
            record.insert(name.clone(), value)?;
        }
        if values.len() > fieldnames.len() {
            record.insert(restkey.clone(), Value::list(values[fieldnames.len()..].to_vec()))?;
        }
        out.push(Value::dict(record));
    }
    Ok(Value::list(out))
}

pub fn module() -> Value {
    Value::object(Module::new(
        "csv",
        vec![
            ("reader", Builtin::new("reader", reader)),
            ("DictReader", Builtin::new("DictReader", dict_reader)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMA: Dialect = Dialect {
        delimiter: ',',
        quotechar: '"',
        skip_initial_space: false,
    };

    #[test]
    fn quoted_fields_keep_delimiters_and_newlines() {
        let rows = parse_rows("a,\"b,c\",\"say \"\"hi\"\"\"\n1,\"two\nlines\",3", COMMA);
        assert_eq!(rows[0], ["a", "b,c", "say \"hi\""]);
        assert_eq!(rows[1], ["1", "two\nlines", "3"]);
    }

    #[test]
    fn empty_lines_and_trailing_fields() {
        let rows = parse_rows("a,b,\n\nc\n", COMMA);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], ["a", "b", ""]);
        assert!(rows[1].is_empty());
        assert_eq!(rows[2], ["c"]);
    }

    #[test]
    fn alternative_delimiter_and_initial_space() {
        let dialect = Dialect {
            delimiter: ';',
            skip_initial_space: true,
            ..COMMA
        };
        let rows = parse_rows("x; y;  z", dialect);
        assert_eq!(rows[0], ["x", "y", "z"]);
    }
}
