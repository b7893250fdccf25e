//! `string`.

use crate::error::Result;
use crate::interpreter::Interpreter;
use crate::object::Module;
use crate::value::{Builtin, CallArgs, Value};

const ASCII_LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const ASCII_UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const HEXDIGITS: &str = "0123456789abcdefABCDEF";
const OCTDIGITS: &str = "01234567";
const PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const WHITESPACE: &str = " \t\n\r\x0b\x0c";

/// `string.capwords(s, sep=None)`.
fn capwords(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("capwords", 1, 2)?;
    let text = args.positional[0].as_str()?;
    let capitalize = |word: &str| {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.as_str().to_lowercase().chars())
                .collect::<String>(),
            None => String::new(),
        }
    };
    let out = match args.arg(1, "sep") {
        None | Some(Value::None) => text
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" "),
        Some(sep) => {
            let sep = sep.as_str()?;
            text.split(sep).map(capitalize).collect::<Vec<_>>().join(sep)
        }
    };
    Ok(Value::from(out))
}

pub fn module() -> Value {
    let letters = format!("{ASCII_LOWERCASE}{ASCII_UPPERCASE}");
    let printable = format!("{DIGITS}{letters}{PUNCTUATION}{WHITESPACE}");
    Value::object(Module::new(
        "string",
        vec![
            ("ascii_letters", Value::from(letters)),
            ("ascii_lowercase", Value::from(ASCII_LOWERCASE)),
            ("ascii_uppercase", Value::from(ASCII_UPPERCASE)),
            ("digits", Value::from(DIGITS)),
            ("hexdigits", Value::from(HEXDIGITS)),
            ("octdigits", Value::from(OCTDIGITS)),
            ("punctuation", Value::from(PUNCTUATION)),
            ("whitespace", Value::from(WHITESPACE)),
            ("printable", Value::from(printable)),
            ("capwords", Builtin::new("capwords", capwords)),
        ],
    ))
}
