//! String formatting.
//!
//! Three entry points share one numeric renderer:
//!
//! - [`percent_format`] for `"..." % args`,
//! - [`str_format`] for `"...".format(...)`,
//! - [`format_value`] for format specs (`f"{x:>8.2f}"`, `format()` fields).
//!
//! Replacement fields name arguments only; attribute and index traversal
//! inside a field is rejected.

use crate::error::{Result, SandboxError};
use crate::value::{CallArgs, Value, float_repr};

// ---------------------------------------------------------------------------
// Numeric rendering
// ---------------------------------------------------------------------------

fn non_finite(x: f64, upper: bool) -> Option<String> {
    let s = if x.is_nan() {
        "nan"
    } else if x.is_infinite() {
        "inf"
    } else {
        return None;
    };
    Some(if upper { s.to_uppercase() } else { s.to_string() })
}

/// Fixed-point rendering of `|x|`.
fn fixed(x: f64, precision: usize, upper: bool) -> String {
    non_finite(x, upper).unwrap_or_else(|| format!("{:.*}", precision, x.abs()))
}

/// Scientific rendering of `|x|` with a signed, two-digit exponent.
fn exponent(x: f64, precision: usize, upper: bool) -> String {
    if let Some(s) = non_finite(x, upper) {
        return s;
    }
    let raw = format!("{:.*e}", precision, x.abs());
    let (mantissa, exp) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{:02}", exp.abs())
}

/// General (`g`) rendering of `|x|`.
fn general(x: f64, precision: usize, alternate: bool, upper: bool) -> String {
    if let Some(s) = non_finite(x, upper) {
        return s;
    }
    let p = precision.max(1);
    if x == 0.0 {
        return if alternate {
            format!("{:.*}", p - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let sci = format!("{:.*e}", p - 1, x.abs());
    let exp: i32 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    let mut out = if exp >= -4 && exp < p as i32 {
        format!("{:.*}", (p as i32 - 1 - exp).max(0) as usize, x.abs())
    } else {
        exponent(x, p - 1, upper)
    };
    if !alternate {
        out = strip_trailing_zeros(&out);
    }
    out
}

fn strip_trailing_zeros(s: &str) -> String {
    let (mantissa, rest) = match s.find(['e', 'E']) {
        Some(pos) => s.split_at(pos),
        None => (s, ""),
    };
    if !mantissa.contains('.') {
        return s.to_string();
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}{rest}")
}

/// Insert a grouping separator into the integer part of a rendered number.
fn group_digits(body: &str, separator: char, every: usize) -> String {
    let split = body
        .find(|c: char| !c.is_ascii_alphanumeric() || c == 'e' || c == 'E')
        .unwrap_or(body.len());
    let (int_part, rest) = body.split_at(split);
    let digits: Vec<char> = int_part.chars().collect();
    let mut out = String::with_capacity(body.len() + digits.len() / every);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % every == 0 {
            out.push(separator);
        }
        out.push(*c);
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Format spec mini-language
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Spec {
    fill: char,
    align: Option<char>,
    sign: char,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    ty: Option<char>,
}

fn invalid_spec() -> SandboxError {
    SandboxError::value_error("Invalid format specifier")
}

fn parse_spec(spec: &str) -> Result<Spec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec {
        fill: ' ',
        align: None,
        sign: '-',
        alternate: false,
        zero: false,
        width: 0,
        grouping: None,
        precision: None,
        ty: None,
    };
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '=' | '^');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = chars[0];
        out.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            out.sign = c;
            i += 1;
        }
    }
    if chars.get(i) == Some(&'z') {
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        out.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(char::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        out.width = chars[start..i]
            .iter()
            .collect::<String>()
            .parse()
            .map_err(|_| invalid_spec())?;
    }
    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            out.grouping = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i == start {
            return Err(SandboxError::value_error("Format specifier missing precision"));
        }
        out.precision = Some(
            chars[start..i]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| invalid_spec())?,
        );
    }
    match chars.len() - i {
        0 => {}
        1 => out.ty = Some(chars[i]),
        _ => return Err(invalid_spec()),
    }
    Ok(out)
}

fn pad(sign: &str, body: &str, spec: &Spec, default_align: char) -> String {
    let (fill, align) = match (spec.align, spec.zero) {
        (Some(a), _) => (spec.fill, a),
        (None, true) => ('0', '='),
        (None, false) => (spec.fill, default_align),
    };
    let len = sign.chars().count() + body.chars().count();
    if spec.width <= len {
        return format!("{sign}{body}");
    }
    let n = spec.width - len;
    let fills = |k: usize| std::iter::repeat_n(fill, k).collect::<String>();
    match align {
        '<' => format!("{sign}{body}{}", fills(n)),
        '^' => format!("{}{sign}{body}{}", fills(n / 2), fills(n - n / 2)),
        '=' => format!("{sign}{}{body}", fills(n)),
        _ => format!("{}{sign}{body}", fills(n)),
    }
}

fn sign_str(negative: bool, spec: &Spec) -> &'static str {
    match (negative, spec.sign) {
        (true, _) => "-",
        (false, '+') => "+",
        (false, ' ') => " ",
        _ => "",
    }
}

fn format_float(x: f64, spec: &Spec) -> Result<String> {
    let upper = matches!(spec.ty, Some('F' | 'E' | 'G'));
    let mut body = match spec.ty {
        Some('f' | 'F') => fixed(x, spec.precision.unwrap_or(6), upper),
        Some('e' | 'E') => exponent(x, spec.precision.unwrap_or(6), upper),
        Some('g' | 'G' | 'n') => general(x, spec.precision.unwrap_or(6), spec.alternate, upper),
        Some('%') => format!("{}%", fixed(x * 100.0, spec.precision.unwrap_or(6), false)),
        None => match spec.precision {
            Some(p) => {
                let s = general(x, p, spec.alternate, false);
                if s.contains(['.', 'e', 'n', 'i']) {
                    s
                } else {
                    format!("{s}.0")
                }
            }
            None => float_repr(x.abs()),
        },
        Some(other) => {
            return Err(SandboxError::value_error(format!(
                "Unknown format code '{other}' for object of type 'float'"
            )));
        }
    };
    if let Some(sep) = spec.grouping {
        body = group_digits(&body, sep, 3);
    }
    let negative = x.is_sign_negative() && !x.is_nan() && x != 0.0;
    Ok(pad(sign_str(negative, spec), &body, spec, '>'))
}

fn format_int(i: i64, spec: &Spec) -> Result<String> {
    if matches!(spec.ty, Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%')) {
        return format_float(i as f64, spec);
    }
    if spec.precision.is_some() {
        return Err(SandboxError::value_error(
            "Precision not allowed in integer format specifier",
        ));
    }
    let magnitude = i.unsigned_abs();
    let (prefix, digits, every) = match spec.ty {
        None | Some('d' | 'n') => ("", magnitude.to_string(), 3),
        Some('b') => ("0b", format!("{magnitude:b}"), 4),
        Some('o') => ("0o", format!("{magnitude:o}"), 4),
        Some('x') => ("0x", format!("{magnitude:x}"), 4),
        Some('X') => ("0X", format!("{magnitude:X}"), 4),
        Some('c') => {
            let c = u32::try_from(i)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| SandboxError::exception("OverflowError", "%c arg not in range(0x110000)"))?;
            return Ok(pad("", &c.to_string(), spec, '<'));
        }
        Some(other) => {
            return Err(SandboxError::value_error(format!(
                "Unknown format code '{other}' for object of type 'int'"
            )));
        }
    };
    let digits = match spec.grouping {
        Some(sep) => group_digits(&digits, sep, if sep == ',' { 3 } else { every }),
        None => digits,
    };
    let prefix = if spec.alternate { prefix } else { "" };
    let sign = sign_str(i < 0, spec);
    Ok(pad(&format!("{sign}{prefix}"), &digits, spec, '>'))
}

fn format_str(s: &str, spec: &Spec) -> Result<String> {
    if let Some(ty) = spec.ty {
        if ty != 's' {
            return Err(SandboxError::value_error(format!(
                "Unknown format code '{ty}' for object of type 'str'"
            )));
        }
    }
    if spec.sign != '-' {
        return Err(SandboxError::value_error(
            "Sign not allowed in string format specifier",
        ));
    }
    let body: String = match spec.precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    };
    Ok(pad("", &body, spec, '<'))
}

/// Apply a format spec to a value (`format(value, spec)`).
pub fn format_value(value: &Value, spec: &str) -> Result<String> {
    match value {
        Value::DateTime(_) | Value::Date(_) | Value::Time(_) if !spec.is_empty() => {
            return crate::modules::datetime::strftime_value(value, spec);
        }
        _ if spec.is_empty() => return Ok(value.to_str()),
        _ => {}
    }
    let parsed = parse_spec(spec)?;
    match value {
        Value::Str(s) => format_str(s, &parsed),
        Value::Bool(b) if parsed.ty.is_none() => {
            format_str(if *b { "True" } else { "False" }, &parsed)
        }
        Value::Int(_) | Value::Bool(_) => format_int(value.as_int()?, &parsed),
        Value::Float(f) => match parsed.ty {
            Some('d' | 'b' | 'o' | 'x' | 'X' | 'c') => Err(SandboxError::value_error(format!(
                "Unknown format code '{}' for object of type 'float'",
                parsed.ty.unwrap_or('d')
            ))),
            _ => format_float(*f, &parsed),
        },
        Value::None | Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Set(_)
            if parsed.ty.is_none() && parsed.precision.is_none() && parsed.sign == '-' =>
        {
            Err(SandboxError::type_error(format!(
                "unsupported format string passed to {}.__format__",
                value.type_name()
            )))
        }
        other => Err(SandboxError::type_error(format!(
            "unsupported format string passed to {}.__format__",
            other.type_name()
        ))),
    }
}

/// `ascii()`-style repr: non-ASCII characters are escaped.
pub fn ascii_repr(value: &Value) -> String {
    let mut out = String::new();
    for c in value.repr().chars() {
        match c as u32 {
            0..=0x7f => out.push(c),
            n @ 0x80..=0xff => out.push_str(&format!("\\x{n:02x}")),
            n @ 0x100..=0xffff => out.push_str(&format!("\\u{n:04x}")),
            n => out.push_str(&format!("\\U{n:08x}")),
        }
    }
    out
}

/// Apply a `!r`, `!s` or `!a` conversion.
pub fn convert(value: &Value, conversion: char) -> Result<Value> {
    Ok(match conversion {
        'r' => Value::from(value.repr()),
        's' => Value::from(value.to_str()),
        'a' => Value::from(ascii_repr(value)),
        other => {
            return Err(SandboxError::value_error(format!(
                "Unknown conversion specifier {other}"
            )));
        }
    })
}

// ---------------------------------------------------------------------------
// str.format
// ---------------------------------------------------------------------------

enum Numbering {
    Unknown,
    Auto(usize),
    Manual,
}

struct FieldResolver<'a> {
    args: &'a CallArgs,
    numbering: Numbering,
}

impl FieldResolver<'_> {
    fn resolve(&mut self, name: &str) -> Result<Value> {
        if name.contains(['.', '[']) {
            return Err(SandboxError::value_error(
                "attribute and index lookups are not supported in format fields",
            ));
        }
        if name.is_empty() {
            let index = match self.numbering {
                Numbering::Manual => {
                    return Err(SandboxError::value_error(
                        "cannot switch from manual field specification to automatic field numbering",
                    ));
                }
                Numbering::Unknown => 0,
                Numbering::Auto(next) => next,
            };
            self.numbering = Numbering::Auto(index + 1);
            return self.positional(index);
        }
        if let Ok(index) = name.parse::<usize>() {
            if matches!(self.numbering, Numbering::Auto(_)) {
                return Err(SandboxError::value_error(
                    "cannot switch from automatic field numbering to manual field specification",
                ));
            }
            self.numbering = Numbering::Manual;
            return self.positional(index);
        }
        self.args
            .keyword(name)
            .cloned()
            .ok_or_else(|| SandboxError::key_error(crate::value::str_repr(name)))
    }

    fn positional(&self, index: usize) -> Result<Value> {
        self.args.get(index).cloned().ok_or_else(|| {
            SandboxError::index_error(format!(
                "Replacement index {index} out of range for positional args tuple"
            ))
        })
    }
}

/// `template.format(*args, **kwargs)`.
pub fn str_format(template: &str, args: &CallArgs) -> Result<String> {
    let mut resolver = FieldResolver {
        args,
        numbering: Numbering::Unknown,
    };
    format_template(template, &mut resolver, 0)
}

fn format_template(template: &str, resolver: &mut FieldResolver<'_>, depth: usize) -> Result<String> {
    if depth > 1 {
        return Err(SandboxError::value_error("Max string recursion exceeded"));
    }
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '}' {
            if chars.get(i + 1) == Some(&'}') {
                out.push('}');
                i += 2;
                continue;
            }
            return Err(SandboxError::value_error(
                "Single '}' encountered in format string",
            ));
        }
        if c != '{' {
            out.push(c);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'{') {
            out.push('{');
            i += 2;
            continue;
        }
        // Find the matching close brace, allowing one level of nesting in
        // the spec.
        let mut nesting = 1;
        let mut j = i + 1;
        while j < chars.len() {
            match chars[j] {
                '{' => nesting += 1,
                '}' => {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                }
                _ => {}
            }
            j += 1;
        }
        if j >= chars.len() {
            return Err(SandboxError::value_error(
                "Single '{' encountered in format string",
            ));
        }
        let field: String = chars[i + 1..j].iter().collect();
        out.push_str(&render_field(&field, resolver, depth)?);
        i = j + 1;
    }
    Ok(out)
}

fn render_field(field: &str, resolver: &mut FieldResolver<'_>, depth: usize) -> Result<String> {
    let (head, spec) = match field.find(':') {
        Some(pos) => (&field[..pos], &field[pos + 1..]),
        None => (field, ""),
    };
    let (name, conversion) = match head.find('!') {
        Some(pos) => {
            let conv = &head[pos + 1..];
            let mut conv_chars = conv.chars();
            match (conv_chars.next(), conv_chars.next()) {
                (Some(c), None) => (&head[..pos], Some(c)),
                _ => {
                    return Err(SandboxError::value_error(
                        "expected ':' after conversion specifier",
                    ));
                }
            }
        }
        None => (head, None),
    };
    let mut value = resolver.resolve(name)?;
    if let Some(conv) = conversion {
        value = convert(&value, conv)?;
    }
    let spec = if spec.contains('{') {
        format_template(spec, resolver, depth + 1)?
    } else {
        spec.to_string()
    };
    format_value(&value, &spec)
}

// ---------------------------------------------------------------------------
// printf-style formatting
// ---------------------------------------------------------------------------

/// `template % args`.
pub fn percent_format(template: &str, args: &Value) -> Result<String> {
    let mapping = match args {
        Value::Dict(_) => Some(args),
        _ => None,
    };
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mut next = 0;
    let mut used_mapping = false;
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let start = i;
        i += 1;
        let mut key = None;
        if chars.get(i) == Some(&'(') {
            let close = chars[i..]
                .iter()
                .position(|&c| c == ')')
                .map(|p| p + i)
                .ok_or_else(|| SandboxError::value_error("incomplete format key"))?;
            key = Some(chars[i + 1..close].iter().collect::<String>());
            i = close + 1;
        }
        let mut spec = Spec {
            fill: ' ',
            align: None,
            sign: '-',
            alternate: false,
            zero: false,
            width: 0,
            grouping: None,
            precision: None,
            ty: None,
        };
        let mut left = false;
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => left = true,
                '+' => spec.sign = '+',
                ' ' if spec.sign != '+' => spec.sign = ' ',
                ' ' => {}
                '0' => spec.zero = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }
        let mut take_number = |i: &mut usize| -> Option<usize> {
            let begin = *i;
            while chars.get(*i).is_some_and(char::is_ascii_digit) {
                *i += 1;
            }
            (begin < *i).then(|| chars[begin..*i].iter().collect::<String>().parse().unwrap_or(0))
        };
        spec.width = take_number(&mut i).unwrap_or(0);
        if chars.get(i) == Some(&'.') {
            i += 1;
            spec.precision = Some(take_number(&mut i).unwrap_or(0));
        }
        while matches!(chars.get(i), Some('h' | 'l' | 'L')) {
            i += 1;
        }
        let Some(&conv) = chars.get(i) else {
            return Err(SandboxError::value_error("incomplete format"));
        };
        i += 1;
        if conv == '%' {
            out.push('%');
            continue;
        }

        let value = match &key {
            Some(name) => {
                let Some(Value::Dict(d)) = mapping else {
                    return Err(SandboxError::type_error("format requires a mapping"));
                };
                used_mapping = true;
                d.borrow()
                    .get(&Value::from(name.as_str()))?
                    .ok_or_else(|| SandboxError::key_error(crate::value::str_repr(name)))?
            }
            None => {
                let value = positional.get(next).cloned().ok_or_else(|| {
                    SandboxError::type_error("not enough arguments for format string")
                })?;
                next += 1;
                value
            }
        };
        if left {
            spec.align = Some('<');
            spec.zero = false;
        } else if !spec.zero {
            spec.align = Some('>');
        }

        let rendered = match conv {
            's' | 'r' | 'a' => {
                let text = match conv {
                    's' => value.to_str(),
                    'r' => value.repr(),
                    _ => ascii_repr(&value),
                };
                let text: String = match spec.precision {
                    Some(p) => text.chars().take(p).collect(),
                    None => text,
                };
                spec.zero = false;
                pad("", &text, &spec, '>')
            }
            'd' | 'i' | 'u' => {
                let n = match &value {
                    Value::Float(f) if f.is_finite() => f.trunc() as i64,
                    v if v.is_number() => v.as_int()?,
                    v => {
                        return Err(SandboxError::type_error(format!(
                            "%{conv} format: a real number is required, not {}",
                            v.type_name()
                        )));
                    }
                };
                spec.precision = None;
                format_int(n, &spec)?
            }
            'x' | 'X' | 'o' => {
                let n = match &value {
                    Value::Int(_) | Value::Bool(_) => value.as_int()?,
                    v => {
                        return Err(SandboxError::type_error(format!(
                            "%{conv} format: an integer is required, not {}",
                            v.type_name()
                        )));
                    }
                };
                spec.ty = Some(conv);
                spec.precision = None;
                format_int(n, &spec)?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                if !value.is_number() {
                    return Err(SandboxError::type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    )));
                }
                spec.ty = Some(conv);
                format_float(value.as_float()?, &spec)?
            }
            'c' => {
                let c = match &value {
                    Value::Str(s) if s.chars().count() == 1 => s.to_string(),
                    Value::Int(n) => u32::try_from(*n)
                        .ok()
                        .and_then(char::from_u32)
                        .map(String::from)
                        .ok_or_else(|| {
                            SandboxError::exception("OverflowError", "%c arg not in range(0x110000)")
                        })?,
                    _ => return Err(SandboxError::type_error("%c requires int or char")),
                };
                spec.zero = false;
                pad("", &c, &spec, '>')
            }
            other => {
                return Err(SandboxError::value_error(format!(
                    "unsupported format character '{other}' ({:#x}) at index {}",
                    other as u32,
                    i - 1 - (i - 1 - start).min(0)
                )));
            }
        };
        out.push_str(&rendered);
    }

    if mapping.is_none() && next < positional.len() {
        return Err(SandboxError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    let _ = used_mapping;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Dict;

    #[test]
    fn spec_numbers() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(42), ">6").unwrap(), "    42");
        assert_eq!(format_value(&Value::Int(42), "06d").unwrap(), "000042");
        assert_eq!(format_value(&Value::Int(-42), "06d").unwrap(), "-00042");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Int(255), "#x").unwrap(), "0xff");
        assert_eq!(format_value(&Value::Float(0.25), ".1%").unwrap(), "25.0%");
        assert_eq!(format_value(&Value::Float(12345.678), "e").unwrap(), "1.234568e+04");
        assert_eq!(format_value(&Value::Float(0.0001234), "g").unwrap(), "0.0001234");
        assert_eq!(format_value(&Value::Float(1234567.0), ",.2f").unwrap(), "1,234,567.00");
        assert_eq!(format_value(&Value::Int(5), "+").unwrap(), "+5");
    }

    #[test]
    fn spec_strings() {
        assert_eq!(format_value(&Value::from("ab"), "^6").unwrap(), "  ab  ");
        assert_eq!(format_value(&Value::from("ab"), "*<4").unwrap(), "ab**");
        assert_eq!(format_value(&Value::from("abcdef"), ".3").unwrap(), "abc");
        assert!(format_value(&Value::from("ab"), "d").is_err());
        assert_eq!(format_value(&Value::Bool(true), ">5").unwrap(), " True");
    }

    #[test]
    fn str_format_fields() {
        let args = CallArgs::with_keywords(
            vec![Value::Int(1), Value::from("x")],
            vec![("name".to_string(), Value::from("bob"))],
        );
        assert_eq!(str_format("{} {}", &args).unwrap(), "1 x");
        assert_eq!(str_format("{1}{0}", &args).unwrap(), "x1");
        assert_eq!(str_format("{name!r:>6}", &args).unwrap(), " 'bob'");
        assert_eq!(str_format("{{}} {0:{0}}", &args).unwrap(), "{} 1");
        assert!(str_format("{} {1}", &args).is_err());
        assert!(str_format("{0.real}", &args).is_err());
        assert!(str_format("{missing}", &args).is_err());
    }

    #[test]
    fn percent_formatting() {
        let args = Value::tuple(vec![Value::from("x"), Value::Int(5), Value::Float(2.5)]);
        assert_eq!(
            percent_format("%s=%03d (%.2f)", &args).unwrap(),
            "x=005 (2.50)"
        );
        assert_eq!(percent_format("%d%%", &Value::Int(50)).unwrap(), "50%");
        assert_eq!(percent_format("%-4s|", &Value::from("a")).unwrap(), "a   |");
        assert!(percent_format("%s %s", &Value::from("a")).is_err());
        assert!(percent_format("%s", &Value::tuple(vec![Value::Int(1), Value::Int(2)])).is_err());

        let mut d = Dict::new();
        d.insert(Value::from("n"), Value::Int(3)).unwrap();
        assert_eq!(
            percent_format("%(n)d items", &Value::dict(d)).unwrap(),
            "3 items"
        );
    }

    #[test]
    fn conversions() {
        assert_eq!(convert(&Value::from("é"), 'a').unwrap().to_str(), "'\\xe9'");
        assert_eq!(convert(&Value::Int(1), 'r').unwrap().to_str(), "1");
    }
}
