//! Runtime values of the script language.
//!
//! Values use shared ownership (`Rc`) with interior mutability for the
//! mutable containers, matching the reference semantics scripts expect
//! (`b = a; b.append(1)` mutates `a`). A value never leaves the thread that
//! runs the script; results cross the boundary as `serde_json::Value`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use indexmap::IndexMap;

use crate::ast::{Expr, Params, Stmt};
use crate::error::{Result, SandboxError, ScriptException};
use crate::interpreter::{Interpreter, Scope};
use crate::object::ScriptObject;

/// Signature shared by every native function exposed to scripts.
pub type BuiltinFn = fn(&mut Interpreter, CallArgs) -> Result<Value>;

/// Items stored in a set, keyed by their hash identity.
pub type SetData = IndexMap<HashKey, Value>;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<[Value]>),
    Dict(Rc<RefCell<Dict>>),
    Set(Rc<RefCell<SetData>>),
    Range(RangeValue),
    Slice(SliceValue),
    Function(Rc<Function>),
    Builtin(Builtin),
    Method(Rc<BoundMethod>),
    Type(TypeKind),
    Exception(Rc<ScriptException>),
    DateTime(DateTimeValue),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeDelta(TimeDelta),
    Object(Rc<dyn ScriptObject>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v))
    }
}

/// `range(start, stop, step)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let (start, stop) = (i128::from(self.start), i128::from(self.stop));
        let span = if self.step > 0 { stop - start } else { start - stop };
        if span <= 0 {
            return 0;
        }
        let count = span.unsigned_abs().div_ceil(u128::from(self.step.unsigned_abs()));
        usize::try_from(count).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index`, which must be below `len()`.
    pub fn get(&self, index: usize) -> i64 {
        let value = i128::from(self.start) + i128::from(self.step) * index as i128;
        i64::try_from(value).unwrap_or(self.stop)
    }
}

/// A slice object produced by `a[lower:upper:step]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceValue {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub step: Option<i64>,
}

impl SliceValue {
    /// Resolve against a sequence length, returning the selected indices.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(SandboxError::value_error("slice step cannot be zero"));
        }
        let len = len as i64;
        let clamp = |v: i64, low: i64, high: i64| v.max(low).min(high);
        let resolve = |v: Option<i64>, default: i64, low: i64, high: i64| match v {
            None => default,
            Some(v) if v < 0 => clamp(v + len, low, high),
            Some(v) => clamp(v, low, high),
        };
        let mut out = Vec::new();
        if step > 0 {
            let start = resolve(self.lower, 0, 0, len);
            let stop = resolve(self.upper, len, 0, len);
            let mut i = start;
            while i < stop {
                out.push(i as usize);
                let Some(next) = i.checked_add(step) else { break };
                i = next;
            }
        } else {
            let start = resolve(self.lower, len - 1, -1, len - 1);
            let stop = resolve(self.upper, -1, -1, len - 1);
            let mut i = start;
            while i > stop {
                out.push(i as usize);
                let Some(next) = i.checked_add(step) else { break };
                i = next;
            }
        }
        Ok(out)
    }
}

/// A user-defined function or lambda.
pub struct Function {
    pub name: Rc<str>,
    pub params: Rc<Params>,
    /// Defaults aligned with `params.positional`.
    pub defaults: Vec<Option<Value>>,
    /// Defaults aligned with `params.kwonly`.
    pub kw_defaults: Vec<Option<Value>>,
    pub body: FunctionBody,
    /// Scope the function was defined in.
    pub closure: Rc<Scope>,
}

pub enum FunctionBody {
    Block(Rc<[Stmt]>),
    Lambda(Rc<Expr>),
}

/// A native function.
#[derive(Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Builtin {
    pub fn new(name: &'static str, func: BuiltinFn) -> Value {
        Value::Builtin(Builtin { name, func })
    }
}

/// A method looked up on a value, waiting to be called.
pub struct BoundMethod {
    pub receiver: Value,
    pub name: Rc<str>,
}

/// A date and time, optionally aware of its UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeValue {
    /// Wall-clock time in the value's own offset.
    pub naive: NaiveDateTime,
    pub offset: Option<FixedOffset>,
}

impl DateTimeValue {
    pub fn naive(naive: NaiveDateTime) -> Self {
        Self {
            naive,
            offset: None,
        }
    }

    pub fn aware(naive: NaiveDateTime, offset: FixedOffset) -> Self {
        Self {
            naive,
            offset: Some(offset),
        }
    }

    /// The instant in UTC, for aware values.
    pub fn utc_instant(&self) -> Option<NaiveDateTime> {
        self.offset
            .map(|o| self.naive - TimeDelta::seconds(i64::from(o.local_minus_utc())))
    }
}

/// Type objects (`int`, `list`, `ValueError`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    Set,
    Range,
    Slice,
    Function,
    BuiltinFunction,
    Method,
    Type,
    DateTime,
    Date,
    Time,
    TimeDelta,
    TimeZone,
    Counter,
    DefaultDict,
    OrderedDict,
    Exception(Rc<str>),
    Object(Rc<str>),
}

impl TypeKind {
    pub fn name(&self) -> &str {
        match self {
            Self::NoneType => "NoneType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Set => "set",
            Self::Range => "range",
            Self::Slice => "slice",
            Self::Function => "function",
            Self::BuiltinFunction => "builtin_function_or_method",
            Self::Method => "method",
            Self::Type => "type",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Time => "time",
            Self::TimeDelta => "timedelta",
            Self::TimeZone => "timezone",
            Self::Counter => "Counter",
            Self::DefaultDict => "defaultdict",
            Self::OrderedDict => "OrderedDict",
            Self::Exception(name) | Self::Object(name) => name,
        }
    }

    /// Whether values of `self` count as instances of `other`.
    pub fn is_subtype_of(&self, other: &TypeKind) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Self::Bool, Self::Int) => true,
            (Self::Counter | Self::DefaultDict | Self::OrderedDict, Self::Dict) => true,
            (Self::DateTime, Self::Date) => true,
            (Self::Exception(kind), Self::Exception(base)) => {
                crate::error::is_subclass(kind, base)
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Dict and hashing
// ---------------------------------------------------------------------------

/// Hash identity of a value. Numerically equal values share a key, so
/// `d[1]`, `d[1.0]` and `d[True]` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Repr(String),
    Identity(usize),
}

impl HashKey {
    pub fn of(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::None => Self::None,
            Value::Bool(b) => Self::Int(i64::from(*b)),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    Self::Int(*f as i64)
                } else {
                    Self::Float(f.to_bits())
                }
            }
            Value::Str(s) => Self::Str(s.clone()),
            Value::Tuple(items) => {
                Self::Tuple(items.iter().map(HashKey::of).collect::<Result<_>>()?)
            }
            Value::Type(kind) => Self::Repr(format!("<class '{}'>", kind.name())),
            Value::Range(_)
            | Value::DateTime(_)
            | Value::Date(_)
            | Value::Time(_)
            | Value::TimeDelta(_) => Self::Repr(value.repr()),
            Value::Function(f) => Self::Identity(Rc::as_ptr(f) as *const () as usize),
            Value::Method(m) => Self::Identity(Rc::as_ptr(m) as *const () as usize),
            Value::Exception(e) => Self::Identity(Rc::as_ptr(e) as *const () as usize),
            Value::Object(o) => Self::Identity(Rc::as_ptr(o) as *const () as usize),
            Value::Builtin(b) => Self::Repr(format!("builtin:{}", b.name)),
            Value::List(_) | Value::Dict(_) | Value::Set(_) | Value::Slice(_) => {
                return Err(SandboxError::type_error(format!(
                    "unhashable type: '{}'",
                    value.type_name()
                )));
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DictKind {
    #[default]
    Plain,
    Counter,
    DefaultDict,
    OrderedDict,
}

/// Insertion-ordered mapping. Entries keep the first key value inserted.
#[derive(Clone, Default)]
pub struct Dict {
    pub entries: IndexMap<HashKey, (Value, Value)>,
    pub kind: DictKind,
    /// Default factory for `defaultdict`.
    pub factory: Option<Value>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(kind: DictKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>> {
        let hash = HashKey::of(key)?;
        Ok(self.entries.get(&hash).map(|(_, v)| v.clone()))
    }

    pub fn contains(&self, key: &Value) -> Result<bool> {
        Ok(self.entries.contains_key(&HashKey::of(key)?))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Result<()> {
        let hash = HashKey::of(&key)?;
        match self.entries.get_mut(&hash) {
            Some(slot) => slot.1 = value,
            None => {
                self.entries.insert(hash, (key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>> {
        let hash = HashKey::of(key)?;
        Ok(self.entries.shift_remove(&hash).map(|(_, v)| v))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<Value> {
        self.entries
            .values()
            .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
            .collect()
    }
}

/// Build set storage from values.
pub fn set_from(values: impl IntoIterator<Item = Value>) -> Result<SetData> {
    let mut data = SetData::new();
    for value in values {
        let key = HashKey::of(&value)?;
        data.entry(key).or_insert(value);
    }
    Ok(data)
}

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// Positional and keyword arguments of a call.
#[derive(Clone, Default)]
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn with_keywords(positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            positional,
            keywords,
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Check the positional argument count.
    pub fn expect(&self, name: &str, min: usize, max: usize) -> Result<()> {
        let n = self.positional.len();
        if n < min || n > max {
            let wanted = if min == max {
                format!("exactly {min}")
            } else if n < min {
                format!("at least {min}")
            } else {
                format!("at most {max}")
            };
            return Err(SandboxError::type_error(format!(
                "{name}() takes {wanted} argument{} ({n} given)",
                if max == 1 && min == max { "" } else { "s" }
            )));
        }
        Ok(())
    }

    /// Reject keyword arguments other than `allowed`.
    pub fn allow_keywords(&self, name: &str, allowed: &[&str]) -> Result<()> {
        match self
            .keywords
            .iter()
            .find(|(k, _)| !allowed.contains(&k.as_str()))
        {
            Some((k, _)) => Err(SandboxError::type_error(format!(
                "{name}() got an unexpected keyword argument '{k}'"
            ))),
            None => Ok(()),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keywords
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Positional argument `index`, or keyword `name`.
    pub fn arg(&self, index: usize, name: &str) -> Option<&Value> {
        self.get(index).or_else(|| self.keyword(name))
    }

    /// Like [`CallArgs::arg`], failing when absent.
    pub fn required(&self, func: &str, index: usize, name: &str) -> Result<&Value> {
        self.arg(index, name).ok_or_else(|| {
            SandboxError::type_error(format!(
                "{func}() missing required argument: '{name}'"
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Construction and inspection
// ---------------------------------------------------------------------------

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::from(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn set(data: SetData) -> Self {
        Value::Set(Rc::new(RefCell::new(data)))
    }

    pub fn object(obj: impl ScriptObject + 'static) -> Self {
        Value::Object(Rc::new(obj))
    }

    pub fn exception(kind: &str, message: impl Into<String>) -> Self {
        Value::Exception(Rc::new(ScriptException::new(kind, message)))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn type_kind(&self) -> TypeKind {
        match self {
            Value::None => TypeKind::NoneType,
            Value::Bool(_) => TypeKind::Bool,
            Value::Int(_) => TypeKind::Int,
            Value::Float(_) => TypeKind::Float,
            Value::Str(_) => TypeKind::Str,
            Value::List(_) => TypeKind::List,
            Value::Tuple(_) => TypeKind::Tuple,
            Value::Dict(d) => match d.borrow().kind {
                DictKind::Plain => TypeKind::Dict,
                DictKind::Counter => TypeKind::Counter,
                DictKind::DefaultDict => TypeKind::DefaultDict,
                DictKind::OrderedDict => TypeKind::OrderedDict,
            },
            Value::Set(_) => TypeKind::Set,
            Value::Range(_) => TypeKind::Range,
            Value::Slice(_) => TypeKind::Slice,
            Value::Function(_) => TypeKind::Function,
            Value::Builtin(_) => TypeKind::BuiltinFunction,
            Value::Method(_) => TypeKind::Method,
            Value::Type(_) => TypeKind::Type,
            Value::Exception(e) => TypeKind::Exception(Rc::from(e.kind.as_str())),
            Value::DateTime(_) => TypeKind::DateTime,
            Value::Date(_) => TypeKind::Date,
            Value::Time(_) => TypeKind::Time,
            Value::TimeDelta(_) => TypeKind::TimeDelta,
            Value::Object(o) => TypeKind::Object(Rc::from(o.type_name())),
        }
    }

    pub fn type_name(&self) -> String {
        self.type_kind().name().to_string()
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Set(s) => !s.borrow().is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::TimeDelta(d) => !d.is_zero(),
            Value::Object(o) => o.truthy(),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        match self {
            Value::Function(_) | Value::Builtin(_) | Value::Method(_) => true,
            Value::Type(kind) => !matches!(kind, TypeKind::Object(_) | TypeKind::NoneType),
            Value::Object(o) => o.is_callable(),
            _ => false,
        }
    }

    // --- Conversions -------------------------------------------------------

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            other => Err(SandboxError::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            ))),
        }
    }

    pub fn as_float(&self) -> Result<f64> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::Bool(b) => Ok(f64::from(u8::from(*b))),
            other => Err(SandboxError::type_error(format!(
                "must be real number, not {}",
                other.type_name()
            ))),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::Str(s) => Ok(s),
            other => Err(SandboxError::type_error(format!(
                "expected str, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Bool(_))
    }

    /// Items of a finite sequence value, without calling back into scripts.
    pub fn sequence_items(&self) -> Option<Vec<Value>> {
        Some(match self {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.to_vec(),
            Value::Str(s) => s.chars().map(|c| Value::str(c.to_string())).collect(),
            Value::Dict(d) => d.borrow().keys(),
            Value::Set(s) => s.borrow().values().cloned().collect(),
            Value::Range(r) => (0..r.len()).map(|i| Value::Int(r.get(i))).collect(),
            Value::Object(o) => return o.iterate(),
            _ => return None,
        })
    }

    // --- Rendering ---------------------------------------------------------

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        self.render(true, 0)
    }

    /// `str(value)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.render(false, 0),
        }
    }

    fn render(&self, repr: bool, depth: usize) -> String {
        if depth > 32 {
            return "...".to_string();
        }
        let inner = |v: &Value| v.render(true, depth + 1);
        let join = |items: &[Value]| items.iter().map(inner).collect::<Vec<_>>().join(", ");
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => float_repr(*f),
            Value::Str(s) => {
                if repr {
                    str_repr(s)
                } else {
                    s.to_string()
                }
            }
            Value::List(items) => format!("[{}]", join(&items.borrow())),
            Value::Tuple(items) => {
                if items.len() == 1 {
                    format!("({},)", inner(&items[0]))
                } else {
                    format!("({})", join(items))
                }
            }
            Value::Dict(d) => {
                let d = d.borrow();
                let body = d
                    .entries
                    .values()
                    .map(|(k, v)| format!("{}: {}", inner(k), inner(v)))
                    .collect::<Vec<_>>()
                    .join(", ");
                match d.kind {
                    DictKind::Plain => format!("{{{body}}}"),
                    DictKind::Counter => format!("Counter({{{body}}})"),
                    DictKind::OrderedDict => format!("OrderedDict({{{body}}})"),
                    DictKind::DefaultDict => {
                        let factory = d
                            .factory
                            .as_ref()
                            .map(inner)
                            .unwrap_or_else(|| "None".to_string());
                        format!("defaultdict({factory}, {{{body}}})")
                    }
                }
            }
            Value::Set(s) => {
                let s = s.borrow();
                if s.is_empty() {
                    "set()".to_string()
                } else {
                    let items: Vec<Value> = s.values().cloned().collect();
                    format!("{{{}}}", join(&items))
                }
            }
            Value::Range(r) => {
                if r.step == 1 {
                    format!("range({}, {})", r.start, r.stop)
                } else {
                    format!("range({}, {}, {})", r.start, r.stop, r.step)
                }
            }
            Value::Slice(s) => {
                let part = |v: Option<i64>| v.map_or("None".to_string(), |v| v.to_string());
                format!(
                    "slice({}, {}, {})",
                    part(s.lower),
                    part(s.upper),
                    part(s.step)
                )
            }
            Value::Function(f) => format!("<function {}>", f.name),
            Value::Builtin(b) => format!("<built-in function {}>", b.name),
            Value::Method(m) => format!(
                "<bound method {}.{}>",
                m.receiver.type_name(),
                m.name
            ),
            Value::Type(kind) => format!("<class '{}'>", kind.name()),
            Value::Exception(e) => {
                if repr {
                    format!("{}({})", e.kind, str_repr(&e.message))
                } else {
                    e.message.clone()
                }
            }
            Value::DateTime(dt) => crate::modules::datetime::render_datetime(dt, repr),
            Value::Date(d) => {
                if repr {
                    format!(
                        "datetime.date({}, {}, {})",
                        chrono::Datelike::year(d),
                        chrono::Datelike::month(d),
                        chrono::Datelike::day(d)
                    )
                } else {
                    d.format("%Y-%m-%d").to_string()
                }
            }
            Value::Time(t) => crate::modules::datetime::render_time(t, repr),
            Value::TimeDelta(d) => crate::modules::datetime::render_timedelta(d, repr),
            Value::Object(o) => o.repr(),
        }
    }
}

/// Python's shortest round-trip float formatting.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let sci = format!("{f:e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if (-4..16).contains(&exponent) {
        let plain = f.to_string();
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

/// Python's `repr` of a string.
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

// ---------------------------------------------------------------------------
// Equality and ordering
// ---------------------------------------------------------------------------

/// Nesting limit for container comparison. Self-referencing containers
/// stop here instead of recursing without bound.
const MAX_COMPARE_DEPTH: usize = 64;

/// Python `==`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    equal_at(a, b, 0)
}

fn equal_at(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_COMPARE_DEPTH {
        return false;
    }
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (x, y) if x.is_number() && y.is_number() => {
            if matches!(x, Value::Float(_)) || matches!(y, Value::Float(_)) {
                matches!((x.as_float(), y.as_float()), (Ok(fx), Ok(fy)) if fx == fy)
            } else {
                x.as_int().ok() == y.as_int().ok()
            }
        }
        (Value::List(x), Value::List(y)) => {
            Rc::ptr_eq(x, y) || seq_equal(&x.borrow(), &y.borrow(), depth)
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_equal(x, y, depth),
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.entries.iter().all(|(k, (_, v))| {
                    y.entries
                        .get(k)
                        .is_some_and(|(_, other)| equal_at(v, other, depth + 1))
                })
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.keys().all(|k| y.contains_key(k))
        }
        (Value::Range(x), Value::Range(y)) => x == y,
        (Value::Slice(x), Value::Slice(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x.name == y.name,
        (Value::Method(x), Value::Method(y)) => {
            x.name == y.name && equal_at(&x.receiver, &y.receiver, depth + 1)
        }
        (Value::Type(x), Value::Type(y)) => x == y,
        (Value::Exception(x), Value::Exception(y)) => Rc::ptr_eq(x, y),
        (Value::DateTime(x), Value::DateTime(y)) => match (x.utc_instant(), y.utc_instant()) {
            (Some(ix), Some(iy)) => ix == iy,
            (None, None) => x.naive == y.naive,
            _ => false,
        },
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Time(x), Value::Time(y)) => x == y,
        (Value::TimeDelta(x), Value::TimeDelta(y)) => x == y,
        (Value::Object(x), Value::Object(y)) => {
            std::ptr::addr_eq(Rc::as_ptr(x), Rc::as_ptr(y)) || x.equals(y.as_ref())
        }
        _ => false,
    }
}

fn seq_equal(a: &[Value], b: &[Value], depth: usize) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| equal_at(x, y, depth + 1))
}

/// Python ordering comparison. `Ok(None)` means unordered (NaN).
pub fn compare_values(a: &Value, b: &Value) -> Result<Option<Ordering>> {
    compare_at(a, b, 0)
}

fn compare_at(a: &Value, b: &Value, depth: usize) -> Result<Option<Ordering>> {
    if depth > MAX_COMPARE_DEPTH {
        return Err(SandboxError::exception(
            "RecursionError",
            "maximum recursion depth exceeded in comparison",
        ));
    }
    Ok(match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (x, y) if x.is_number() && y.is_number() => x.as_float()?.partial_cmp(&y.as_float()?),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        (Value::List(x), Value::List(y)) => seq_compare(&x.borrow(), &y.borrow(), depth)?,
        (Value::Tuple(x), Value::Tuple(y)) => seq_compare(x, y, depth)?,
        (Value::DateTime(x), Value::DateTime(y)) => match (x.utc_instant(), y.utc_instant()) {
            (Some(ix), Some(iy)) => Some(ix.cmp(&iy)),
            (None, None) => Some(x.naive.cmp(&y.naive)),
            _ => {
                return Err(SandboxError::type_error(
                    "can't compare offset-naive and offset-aware datetimes",
                ));
            }
        },
        (Value::Date(x), Value::Date(y)) => Some(x.cmp(y)),
        (Value::Time(x), Value::Time(y)) => Some(x.cmp(y)),
        (Value::TimeDelta(x), Value::TimeDelta(y)) => Some(x.cmp(y)),
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            let sub = x.keys().all(|k| y.contains_key(k));
            let sup = y.keys().all(|k| x.contains_key(k));
            match (sub, sup) {
                (true, true) => Some(Ordering::Equal),
                (true, false) => Some(Ordering::Less),
                (false, true) => Some(Ordering::Greater),
                (false, false) => None,
            }
        }
        _ => {
            return Err(SandboxError::type_error(format!(
                "'<' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            )));
        }
    })
}

fn seq_compare(a: &[Value], b: &[Value], depth: usize) -> Result<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if equal_at(x, y, depth + 1) {
            continue;
        }
        return compare_at(x, y, depth + 1);
    }
    Ok(Some(a.len().cmp(&b.len())))
}

// ---------------------------------------------------------------------------
// JSON bridge
// ---------------------------------------------------------------------------

/// Convert a script value to JSON for the tool result.
pub fn to_json(value: &Value) -> serde_json::Value {
    to_json_depth(value, 0)
}

fn to_json_depth(value: &Value, depth: usize) -> serde_json::Value {
    use serde_json::Value as Json;
    if depth > 64 {
        return Json::Null;
    }
    let seq = |items: &[Value]| Json::Array(items.iter().map(|v| to_json_depth(v, depth + 1)).collect());
    match value {
        Value::None => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Str(s) => Json::String(s.to_string()),
        Value::List(items) => seq(&items.borrow()),
        Value::Tuple(items) => seq(items),
        Value::Set(s) => {
            let items: Vec<Value> = s.borrow().values().cloned().collect();
            seq(&items)
        }
        Value::Range(_) => seq(&value.sequence_items().unwrap_or_default()),
        Value::Dict(d) => {
            let map = d
                .borrow()
                .entries
                .values()
                .map(|(k, v)| (json_key(k), to_json_depth(v, depth + 1)))
                .collect();
            Json::Object(map)
        }
        Value::DateTime(dt) => Json::String(crate::modules::datetime::isoformat(dt)),
        Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
        Value::Time(_) | Value::TimeDelta(_) | Value::Exception(_) => {
            Json::String(value.to_str())
        }
        Value::Object(o) => o.to_json().unwrap_or_else(|| Json::String(o.repr())),
        other => Json::String(other.repr()),
    }
}

/// Render a mapping key the way `json.dumps` does.
pub fn json_key(key: &Value) -> String {
    match key {
        Value::Str(s) => s.to_string(),
        Value::None => "null".to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        other => other.to_str(),
    }
}

/// Convert JSON input into a script value.
pub fn from_json(json: &serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::from(s.as_str()),
        Json::Array(items) => Value::list(items.iter().map(from_json).collect()),
        Json::Object(map) => {
            let mut dict = Dict::new();
            for (k, v) in map {
                dict.entries.insert(
                    HashKey::Str(Rc::from(k.as_str())),
                    (Value::from(k.as_str()), from_json(v)),
                );
            }
            Value::dict(dict)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn float_formatting_matches_python() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(2.5e-5), "2.5e-05");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(123.456), "123.456");
        assert_eq!(float_repr(-0.0), "-0.0");
    }

    #[test]
    fn string_repr_picks_quotes() {
        assert_eq!(str_repr("abc"), "'abc'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a\nb"), "'a\\nb'");
    }

    #[test]
    fn container_repr() {
        let v = Value::list(vec![
            Value::Int(1),
            Value::from("x"),
            Value::tuple(vec![Value::None]),
        ]);
        assert_eq!(v.repr(), "[1, 'x', (None,)]");
        assert_eq!(v.to_str(), "[1, 'x', (None,)]");
        assert_eq!(Value::set(SetData::new()).repr(), "set()");
    }

    #[test]
    fn numeric_keys_share_identity() {
        let mut d = Dict::new();
        d.insert(Value::Int(1), Value::from("int")).unwrap();
        d.insert(Value::Float(1.0), Value::from("float")).unwrap();
        d.insert(Value::Bool(true), Value::from("bool")).unwrap();
        assert_eq!(d.len(), 1);
        assert_eq!(d.keys()[0].repr(), "1");
        assert_eq!(d.get(&Value::Int(1)).unwrap().unwrap().to_str(), "bool");
    }

    #[test]
    fn unhashable_values_are_rejected() {
        let err = HashKey::of(&Value::list(vec![])).unwrap_err();
        assert!(err.to_string().contains("unhashable type: 'list'"));
    }

    #[test]
    fn equality_crosses_numeric_types() {
        assert!(values_equal(&Value::Int(2), &Value::Float(2.0)));
        assert!(values_equal(&Value::Bool(true), &Value::Int(1)));
        assert!(!values_equal(&Value::from("1"), &Value::Int(1)));
    }

    #[test]
    fn self_referencing_lists_compare_without_recursing_forever() {
        let a = Value::list(vec![]);
        let b = Value::list(vec![]);
        for v in [&a, &b] {
            let Value::List(items) = v else { unreachable!() };
            items.borrow_mut().push(v.clone());
        }
        assert!(values_equal(&a, &a));
        assert!(!values_equal(&a, &b));
        let err = compare_values(&a, &b).unwrap_err();
        assert_eq!(err.kind_name(), "RecursionError");
    }

    #[test]
    fn ordering_rejects_mixed_types() {
        assert!(compare_values(&Value::from("a"), &Value::Int(1)).is_err());
        assert_eq!(
            compare_values(
                &Value::tuple(vec![Value::Int(1), Value::Int(2)]),
                &Value::tuple(vec![Value::Int(1), Value::Int(3)])
            )
            .unwrap(),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn slices_resolve_like_python() {
        let s = SliceValue {
            lower: None,
            upper: None,
            step: Some(-1),
        };
        assert_eq!(s.indices(3).unwrap(), vec![2, 1, 0]);
        let s = SliceValue {
            lower: Some(-2),
            upper: None,
            step: None,
        };
        assert_eq!(s.indices(5).unwrap(), vec![3, 4]);
    }

    #[test]
    fn range_length() {
        let r = RangeValue {
            start: 0,
            stop: 10,
            step: 3,
        };
        assert_eq!(r.len(), 4);
        let r = RangeValue {
            start: 5,
            stop: 0,
            step: -2,
        };
        assert_eq!(r.len(), 3);
        let r = RangeValue {
            start: i64::MIN,
            stop: i64::MAX,
            step: i64::MAX,
        };
        assert_eq!(r.len(), 3);
        assert_eq!(r.get(2), i64::MAX - 1);
    }

    #[test]
    fn huge_slice_steps_stop_at_the_end() {
        let s = SliceValue {
            lower: Some(1),
            upper: None,
            step: Some(i64::MAX),
        };
        assert_eq!(s.indices(3).unwrap(), vec![1]);
        let s = SliceValue {
            lower: None,
            upper: None,
            step: Some(i64::MIN),
        };
        assert_eq!(s.indices(3).unwrap(), vec![2]);
    }

    #[test]
    fn json_bridge() {
        let input = json!({"a": [1, 2.5, "x", null, true], "b": {"c": 1}});
        let value = from_json(&input);
        assert_eq!(to_json(&value), input);

        let mut d = Dict::new();
        d.insert(Value::Int(3), Value::Float(f64::NAN)).unwrap();
        assert_eq!(to_json(&Value::dict(d)), json!({"3": null}));
    }
}
