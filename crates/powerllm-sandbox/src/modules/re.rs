//! `re`, backed by the `regex` crate.
//!
//! Patterns are translated only where the two syntaxes disagree on a
//! spelling (`\Z`); constructs the engine does not support (backreferences,
//! lookaround) fail to compile with `PatternError`. Positions reported to
//! scripts are character offsets.

use std::any::Any;
use std::rc::Rc;

use regex::{Captures, Regex, RegexBuilder};

use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::object::{Attr, Module, ScriptObject, downcast};
use crate::value::{Builtin, CallArgs, Dict, TypeKind, Value};

const IGNORECASE: i64 = 2;
const MULTILINE: i64 = 8;
const DOTALL: i64 = 16;
const VERBOSE: i64 = 64;
/// Accepted for compatibility; classes stay Unicode-aware.
const ASCII: i64 = 256;

/// Compiled patterns larger than this are rejected.
const SIZE_LIMIT: usize = 1 << 20;

fn pattern_error(message: impl Into<String>) -> SandboxError {
    SandboxError::exception("PatternError", message)
}

fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('Z') => out.push_str("\\z"),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn build(pattern: &str, flags: i64) -> Result<Regex> {
    RegexBuilder::new(&translate(pattern))
        .case_insensitive(flags & IGNORECASE != 0)
        .multi_line(flags & MULTILINE != 0)
        .dot_matches_new_line(flags & DOTALL != 0)
        .ignore_whitespace(flags & VERBOSE != 0)
        .size_limit(SIZE_LIMIT)
        .build()
        .map_err(|err| {
            let text = err.to_string();
            let message = text
                .lines()
                .find_map(|line| line.strip_prefix("error: "))
                .unwrap_or(&text)
                .to_string();
            pattern_error(message)
        })
}

fn char_offset(text: &str, byte: usize) -> i64 {
    text[..byte].chars().count() as i64
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A compiled pattern (`re.compile`).
#[derive(Clone)]
pub struct Pattern {
    source: Rc<str>,
    flags: i64,
    regex: Regex,
    full: Regex,
}

impl Pattern {
    fn compile(source: &str, flags: i64) -> Result<Self> {
        Ok(Self {
            source: Rc::from(source),
            flags,
            regex: build(source, flags)?,
            // A trailing comment in verbose mode must not swallow the anchor.
            full: build(
                &format!(
                    r"\A(?:{source}{})\z",
                    if flags & VERBOSE != 0 { "\n" } else { "" }
                ),
                flags,
            )?,
        })
    }

    fn group_names(&self) -> Rc<[Option<String>]> {
        self.regex
            .capture_names()
            .map(|name| name.map(str::to_string))
            .collect()
    }

    fn to_match(&self, text: &Rc<str>, caps: &Captures<'_>) -> Value {
        Value::object(Match {
            text: text.clone(),
            spans: caps.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect(),
            names: self.group_names(),
            pattern: self.source.clone(),
        })
    }

    fn search(&self, text: &Rc<str>) -> Value {
        self.regex
            .captures(text)
            .map_or(Value::None, |caps| self.to_match(text, &caps))
    }

    fn match_start(&self, text: &Rc<str>) -> Value {
        // Leftmost-first search finds a match at offset 0 whenever one exists.
        match self.regex.captures(text) {
            Some(caps) if caps.get(0).is_some_and(|m| m.start() == 0) => self.to_match(text, &caps),
            _ => Value::None,
        }
    }

    fn fullmatch(&self, text: &Rc<str>) -> Value {
        match self.full.captures(text) {
            Some(caps) => self.to_match(text, &caps),
            None => Value::None,
        }
    }

    fn findall(&self, text: &str) -> Value {
        let groups = self.regex.captures_len() - 1;
        let text_of = |m: Option<regex::Match<'_>>| Value::from(m.map_or("", |m| m.as_str()));
        let found = self
            .regex
            .captures_iter(text)
            .map(|caps| match groups {
                0 => text_of(caps.get(0)),
                1 => text_of(caps.get(1)),
                _ => Value::tuple((1..=groups).map(|i| text_of(caps.get(i))).collect()),
            })
            .collect();
        Value::list(found)
    }

    fn finditer(&self, text: &Rc<str>) -> Value {
        let found = self
            .regex
            .captures_iter(text)
            .map(|caps| self.to_match(text, &caps))
            .collect();
        Value::list(found)
    }

    fn split(&self, text: &str, maxsplit: i64) -> Value {
        let mut out = Vec::new();
        let mut last = 0;
        for (count, caps) in self.regex.captures_iter(text).enumerate() {
            if maxsplit > 0 && count as i64 >= maxsplit {
                break;
            }
            let Some(whole) = caps.get(0) else { continue };
            out.push(Value::from(&text[last..whole.start()]));
            for group in caps.iter().skip(1) {
                out.push(group.map_or(Value::None, |m| Value::from(m.as_str())));
            }
            last = whole.end();
        }
        out.push(Value::from(&text[last..]));
        Value::list(out)
    }

    fn subn(
        &self,
        interp: &mut Interpreter,
        repl: &Value,
        text: &Rc<str>,
        count: i64,
    ) -> Result<(String, i64)> {
        let template = match repl {
            Value::Str(s) => Some(Template::parse(s, &self.regex)?),
            other if other.is_callable() => None,
            other => {
                return Err(SandboxError::type_error(format!(
                    "expected str or callable, not {}",
                    other.type_name()
                )));
            }
        };
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        let mut replaced = 0;
        for caps in self.regex.captures_iter(text) {
            if count > 0 && replaced >= count {
                break;
            }
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);
            match &template {
                Some(template) => template.expand(&caps, &mut out),
                None => {
                    let m = self.to_match(text, &caps);
                    let piece = interp.call_value(repl, CallArgs::new(vec![m]))?;
                    out.push_str(piece.as_str()?);
                }
            }
            last = whole.end();
            replaced += 1;
        }
        out.push_str(&text[last..]);
        Ok((out, replaced))
    }

    fn call(&self, interp: &mut Interpreter, name: &str, args: &CallArgs) -> Result<Value> {
        let text = |index: usize, param: &str| -> Result<Rc<str>> {
            match args.required(name, index, param)? {
                Value::Str(s) => Ok(s.clone()),
                other => Err(SandboxError::type_error(format!(
                    "expected string, got '{}'",
                    other.type_name()
                ))),
            }
        };
        match name {
            "search" => Ok(self.search(&text(0, "string")?)),
            "match" => Ok(self.match_start(&text(0, "string")?)),
            "fullmatch" => Ok(self.fullmatch(&text(0, "string")?)),
            "findall" => Ok(self.findall(&text(0, "string")?)),
            "finditer" => Ok(self.finditer(&text(0, "string")?)),
            "split" => {
                let maxsplit = args.arg(1, "maxsplit").map_or(Ok(0), Value::as_int)?;
                Ok(self.split(&text(0, "string")?, maxsplit))
            }
            "sub" | "subn" => {
                let repl = args.required(name, 0, "repl")?.clone();
                let source = text(1, "string")?;
                let count = args.arg(2, "count").map_or(Ok(0), Value::as_int)?;
                let (out, replaced) = self.subn(interp, &repl, &source, count)?;
                Ok(if name == "sub" {
                    Value::from(out)
                } else {
                    Value::tuple(vec![Value::from(out), Value::Int(replaced)])
                })
            }
            _ => Err(SandboxError::attribute_error(format!(
                "'re.Pattern' object has no attribute '{name}'"
            ))),
        }
    }
}

const PATTERN_METHODS: &[&str] = &[
    "search", "match", "fullmatch", "findall", "finditer", "split", "sub", "subn",
];

impl ScriptObject for Pattern {
    fn type_name(&self) -> &str {
        "re.Pattern"
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        match name {
            "pattern" => Some(Attr::Value(Value::str(self.source.clone()))),
            "flags" => Some(Attr::Value(Value::Int(self.flags))),
            "groups" => Some(Attr::Value(Value::Int(self.regex.captures_len() as i64 - 1))),
            _ if PATTERN_METHODS.contains(&name) => Some(Attr::Method),
            _ => None,
        }
    }

    fn call_method(&self, interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        self.call(interp, name, &args)
    }

    fn repr(&self) -> String {
        format!("re.compile({})", Value::str(self.source.clone()).repr())
    }

    fn equals(&self, other: &dyn ScriptObject) -> bool {
        other
            .as_any()
            .downcast_ref::<Pattern>()
            .is_some_and(|o| o.source == self.source && o.flags == self.flags)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Replacement templates
// ---------------------------------------------------------------------------

enum Piece {
    Literal(String),
    Group(usize),
}

struct Template(Vec<Piece>);

impl Template {
    fn parse(repl: &str, regex: &Regex) -> Result<Self> {
        let groups = regex.captures_len();
        let group = |index: usize| -> Result<Piece> {
            if index < groups {
                Ok(Piece::Group(index))
            } else {
                Err(pattern_error(format!("invalid group reference {index}")))
            }
        };
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = repl.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '\\' {
                literal.push(c);
                continue;
            }
            let piece = match chars.next() {
                Some('n') => {
                    literal.push('\n');
                    continue;
                }
                Some('t') => {
                    literal.push('\t');
                    continue;
                }
                Some('r') => {
                    literal.push('\r');
                    continue;
                }
                Some('\\') => {
                    literal.push('\\');
                    continue;
                }
                Some(d @ '1'..='9') => {
                    let mut index = d.to_digit(10).unwrap_or_default() as usize;
                    if let Some(next) = chars.peek().and_then(|c| c.to_digit(10)) {
                        chars.next();
                        index = index * 10 + next as usize;
                    }
                    group(index)?
                }
                Some('g') => {
                    if chars.next() != Some('<') {
                        return Err(pattern_error("missing <"));
                    }
                    let name: String = chars.by_ref().take_while(|c| *c != '>').collect();
                    match name.parse::<usize>() {
                        Ok(index) => group(index)?,
                        Err(_) => {
                            let index = regex
                                .capture_names()
                                .position(|n| n == Some(name.as_str()))
                                .ok_or_else(|| {
                                    SandboxError::exception(
                                        "IndexError",
                                        format!("unknown group name '{name}'"),
                                    )
                                })?;
                            Piece::Group(index)
                        }
                    }
                }
                Some(other) if other.is_ascii_alphanumeric() => {
                    return Err(pattern_error(format!("bad escape \\{other}")));
                }
                Some(other) => {
                    literal.push('\\');
                    literal.push(other);
                    continue;
                }
                None => return Err(pattern_error("bad escape (end of pattern)")),
            };
            if !literal.is_empty() {
                pieces.push(Piece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(piece);
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(Self(pieces))
    }

    fn expand(&self, caps: &Captures<'_>, out: &mut String) {
        for piece in &self.0 {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Group(index) => {
                    if let Some(m) = caps.get(*index) {
                        out.push_str(m.as_str());
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// A successful match (`re.Match`). Spans are byte offsets into `text`.
pub struct Match {
    text: Rc<str>,
    spans: Vec<Option<(usize, usize)>>,
    names: Rc<[Option<String>]>,
    pattern: Rc<str>,
}

impl Match {
    fn index(&self, group: &Value) -> Result<usize> {
        let index = match group {
            Value::Int(i) if *i >= 0 => *i as usize,
            Value::Str(name) => self
                .names
                .iter()
                .position(|n| n.as_deref() == Some(name.as_ref()))
                .ok_or_else(|| SandboxError::index_error("no such group"))?,
            Value::Int(_) => return Err(SandboxError::index_error("no such group")),
            other => {
                return Err(SandboxError::index_error(format!(
                    "no such group {}",
                    other.repr()
                )));
            }
        };
        if index >= self.spans.len() {
            return Err(SandboxError::index_error("no such group"));
        }
        Ok(index)
    }

    fn group(&self, index: usize, default: &Value) -> Value {
        match self.spans.get(index).copied().flatten() {
            Some((start, end)) => Value::from(&self.text[start..end]),
            None => default.clone(),
        }
    }

    fn span(&self, index: usize) -> (i64, i64) {
        match self.spans.get(index).copied().flatten() {
            Some((start, end)) => (char_offset(&self.text, start), char_offset(&self.text, end)),
            None => (-1, -1),
        }
    }

    fn group_arg(&self, args: &CallArgs) -> Result<usize> {
        match args.get(0) {
            Some(group) => self.index(group),
            None => Ok(0),
        }
    }
}

const MATCH_METHODS: &[&str] = &["group", "groups", "groupdict", "start", "end", "span"];

impl ScriptObject for Match {
    fn type_name(&self) -> &str {
        "re.Match"
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        match name {
            "string" => Some(Attr::Value(Value::str(self.text.clone()))),
            "pattern" => Some(Attr::Value(Value::str(self.pattern.clone()))),
            "lastindex" => Some(Attr::Value(
                self.spans
                    .iter()
                    .enumerate()
                    .skip(1)
                    .filter(|(_, span)| span.is_some())
                    .map(|(i, _)| Value::Int(i as i64))
                    .last()
                    .unwrap_or(Value::None),
            )),
            _ if MATCH_METHODS.contains(&name) => Some(Attr::Method),
            _ => None,
        }
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        match name {
            "group" => match args.positional.as_slice() {
                [] => Ok(self.group(0, &Value::None)),
                [single] => Ok(self.group(self.index(single)?, &Value::None)),
                many => {
                    let mut out = Vec::with_capacity(many.len());
                    for group in many {
                        out.push(self.group(self.index(group)?, &Value::None));
                    }
                    Ok(Value::tuple(out))
                }
            },
            "groups" => {
                args.expect("groups", 0, 1)?;
                let default = args.arg(0, "default").cloned().unwrap_or(Value::None);
                Ok(Value::tuple(
                    (1..self.spans.len()).map(|i| self.group(i, &default)).collect(),
                ))
            }
            "groupdict" => {
                args.expect("groupdict", 0, 1)?;
                let default = args.arg(0, "default").cloned().unwrap_or(Value::None);
                let mut dict = Dict::new();
                for (index, name) in self.names.iter().enumerate() {
                    if let Some(name) = name {
                        dict.insert(Value::from(name.as_str()), self.group(index, &default))?;
                    }
                }
                Ok(Value::dict(dict))
            }
            "start" | "end" | "span" => {
                args.expect(name, 0, 1)?;
                let (start, end) = self.span(self.group_arg(&args)?);
                Ok(match name {
                    "start" => Value::Int(start),
                    "end" => Value::Int(end),
                    _ => Value::tuple(vec![Value::Int(start), Value::Int(end)]),
                })
            }
            _ => Err(SandboxError::attribute_error(format!(
                "'re.Match' object has no attribute '{name}'"
            ))),
        }
    }

    fn get_item(&self, key: &Value) -> Result<Value> {
        Ok(self.group(self.index(key)?, &Value::None))
    }

    fn repr(&self) -> String {
        let (start, end) = self.span(0);
        format!(
            "<re.Match object; span=({start}, {end}), match={}>",
            self.group(0, &Value::None).repr()
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Module functions
// ---------------------------------------------------------------------------

/// Resolve the pattern argument, compiling strings with `flags`.
fn pattern_arg(args: &CallArgs, func: &str, flags_index: usize) -> Result<Pattern> {
    let flags = args.arg(flags_index, "flags").map_or(Ok(0), Value::as_int)?;
    let value = args.required(func, 0, "pattern")?;
    if let Value::Str(source) = value {
        return Pattern::compile(source, flags);
    }
    match downcast::<Pattern>(value) {
        Some(pattern) if flags == 0 => Ok(pattern.clone()),
        Some(_) => Err(SandboxError::value_error(
            "cannot process flags argument with a compiled pattern",
        )),
        None => Err(SandboxError::type_error(format!(
            "first argument must be string or compiled pattern, not {}",
            value.type_name()
        ))),
    }
}

/// Shift the pattern argument off and forward to the pattern method.
fn forward(interp: &mut Interpreter, args: CallArgs, func: &str, flags_index: usize) -> Result<Value> {
    args.allow_keywords(func, &["flags", "count", "maxsplit"])?;
    let pattern = pattern_arg(&args, func, flags_index)?;
    let mut positional = args.positional;
    positional.remove(0);
    positional.truncate(flags_index - 1);
    let keywords = args.keywords.into_iter().filter(|(k, _)| k != "flags").collect();
    pattern.call(interp, func, &CallArgs::with_keywords(positional, keywords))
}

fn compile(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("compile", 1, 2)?;
    if let Some(existing) = args.get(0).filter(|v| downcast::<Pattern>(v).is_some()) {
        return Ok(existing.clone());
    }
    let source = args.positional[0].as_str()?;
    let flags = args.arg(1, "flags").map_or(Ok(0), Value::as_int)?;
    Pattern::compile(source, flags).map(Value::object)
}

macro_rules! forwarding_fn {
    ($fn_name:ident, $name:literal, $max:literal, $flags_index:literal) => {
        fn $fn_name(interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
            args.expect($name, 2, $max)?;
            forward(interp, args, $name, $flags_index)
        }
    };
}

forwarding_fn!(search, "search", 3, 2);
forwarding_fn!(match_, "match", 3, 2);
forwarding_fn!(fullmatch, "fullmatch", 3, 2);
forwarding_fn!(findall, "findall", 3, 2);
forwarding_fn!(finditer, "finditer", 3, 2);
forwarding_fn!(split, "split", 4, 3);
forwarding_fn!(sub, "sub", 5, 4);
forwarding_fn!(subn, "subn", 5, 4);

/// Characters `re.escape` prefixes with a backslash.
const SPECIAL_CHARS: &str = "()[]{}?*+-|^$\\.&~# \t\n\r\x0b\x0c";

fn escape(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("escape", 1, 1)?;
    let text = args.positional[0].as_str()?;
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL_CHARS.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    Ok(Value::from(out))
}

pub fn module() -> Value {
    let f = Builtin::new;
    let error = Value::Type(TypeKind::Exception("PatternError".into()));
    Value::object(Module::new(
        "re",
        vec![
            ("compile", f("compile", compile)),
            ("search", f("search", search)),
            ("match", f("match", match_)),
            ("fullmatch", f("fullmatch", fullmatch)),
            ("findall", f("findall", findall)),
            ("finditer", f("finditer", finditer)),
            ("split", f("split", split)),
            ("sub", f("sub", sub)),
            ("subn", f("subn", subn)),
            ("escape", f("escape", escape)),
            ("IGNORECASE", Value::Int(IGNORECASE)),
            ("I", Value::Int(IGNORECASE)),
            ("MULTILINE", Value::Int(MULTILINE)),
            ("M", Value::Int(MULTILINE)),
            ("DOTALL", Value::Int(DOTALL)),
            ("S", Value::Int(DOTALL)),
            ("VERBOSE", Value::Int(VERBOSE)),
            ("X", Value::Int(VERBOSE)),
            ("ASCII", Value::Int(ASCII)),
            ("A", Value::Int(ASCII)),
            ("error", error.clone()),
            ("PatternError", error),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Rc<str> {
        Rc::from(s)
    }

    #[test]
    fn match_is_anchored_and_search_is_not() {
        let pattern = Pattern::compile(r"\d+", 0).unwrap();
        assert!(pattern.match_start(&text("abc 42")).is_none());
        let found = pattern.search(&text("abc 42"));
        assert_eq!(found.repr(), "<re.Match object; span=(4, 6), match='42'>");
        assert!(pattern.fullmatch(&text("42")).truthy());
        assert!(pattern.fullmatch(&text("42a")).is_none());
    }

    #[test]
    fn findall_shapes_follow_group_count() {
        let plain = Pattern::compile(r"\d", 0).unwrap();
        assert_eq!(plain.findall("a1b2").repr(), "['1', '2']");
        let one = Pattern::compile(r"(\w)=\d", 0).unwrap();
        assert_eq!(one.findall("a=1 b=2").repr(), "['a', 'b']");
        let two = Pattern::compile(r"(\w)=(\d)?", 0).unwrap();
        assert_eq!(two.findall("a=1 b=").repr(), "[('a', '1'), ('b', '')]");
    }

    #[test]
    fn split_keeps_groups_and_honours_maxsplit() {
        let pattern = Pattern::compile(r"(,)\s*", 0).unwrap();
        assert_eq!(pattern.split("a, b,c", 0).repr(), "['a', ',', 'b', ',', 'c']");
        let plain = Pattern::compile(r",", 0).unwrap();
        assert_eq!(plain.split("a,b,c", 1).repr(), "['a', 'b,c']");
    }

    #[test]
    fn templates_expand_numbered_and_named_groups() {
        let pattern = Pattern::compile(r"(?P<key>\w+)=(\w+)", 0).unwrap();
        let template = Template::parse(r"\2:\g<key>\n", &pattern.regex).unwrap();
        let caps = pattern.regex.captures("light=on").unwrap();
        let mut out = String::new();
        template.expand(&caps, &mut out);
        assert_eq!(out, "on:light\n");
        assert!(Template::parse(r"\5", &pattern.regex).is_err());
        assert!(Template::parse(r"\d", &pattern.regex).is_err());
    }

    #[test]
    fn flags_and_translation() {
        let pattern = Pattern::compile("abc\\Z", IGNORECASE).unwrap();
        assert!(pattern.search(&text("xABC")).truthy());
        assert!(Pattern::compile("(unclosed", 0).is_err());
        assert_eq!(translate(r"a\\Z"), r"a\\Z");
        let verbose = Pattern::compile("a  # letter", VERBOSE).unwrap();
        assert!(verbose.fullmatch(&text("a")).truthy());
    }

    #[test]
    fn spans_are_character_offsets() {
        let pattern = Pattern::compile("b", 0).unwrap();
        let found = pattern.search(&text("\u{e9}\u{e9}b"));
        assert_eq!(found.repr(), "<re.Match object; span=(2, 3), match='b'>");
    }
}
