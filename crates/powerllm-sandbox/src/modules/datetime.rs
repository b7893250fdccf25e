//! `datetime` and the temporal value types.
//!
//! Dates, times, datetimes and deltas are native [`Value`] variants backed
//! by `chrono`; this module owns their constructors, attributes, methods and
//! text forms. Time zones are fixed UTC offsets ([`FixedZone`]). The
//! `datetime` module object itself is guarded by the
//! [`Owner::DateTimeModule`] allowlist.

use std::any::Any;
use std::fmt::Write as _;

use chrono::format::{Parsed, StrftimeItems, parse};
use chrono::{
    Datelike, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta,
    TimeZone as _, Timelike, Utc,
};

use crate::allowlist::Owner;
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::modules::time::StructTime;
use crate::object::{Attr, Module, ScriptObject, downcast};
use crate::value::{CallArgs, DateTimeValue, TypeKind, Value};

const MIN_YEAR: i64 = 1;
const MAX_YEAR: i64 = 9999;
const MAX_DELTA_DAYS: i128 = 999_999_999;
const MICROS_PER_SECOND: i128 = 1_000_000;
const MICROS_PER_DAY: i128 = 86_400 * MICROS_PER_SECOND;

// ---------------------------------------------------------------------------
// Time zones
// ---------------------------------------------------------------------------

/// A fixed UTC offset, the `tzinfo` of aware values.
pub struct FixedZone {
    offset: FixedOffset,
    name: Option<String>,
}

impl FixedZone {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset, name: None }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn tzname(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => offset_name(self.offset),
        }
    }
}

impl ScriptObject for FixedZone {
    fn type_name(&self) -> &str {
        "timezone"
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        matches!(name, "utcoffset" | "tzname" | "dst").then_some(Attr::Method)
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        args.expect(name, 0, 1)?;
        match name {
            "utcoffset" => Ok(offset_delta(self.offset)),
            "tzname" => Ok(Value::from(self.tzname())),
            "dst" => Ok(Value::None),
            other => Err(SandboxError::attribute_error(format!(
                "'datetime.timezone' object has no attribute '{other}'"
            ))),
        }
    }

    fn repr(&self) -> String {
        zone_repr(self.offset)
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::String(self.tzname()))
    }

    fn equals(&self, other: &dyn ScriptObject) -> bool {
        other
            .as_any()
            .downcast_ref::<FixedZone>()
            .is_some_and(|o| o.offset == self.offset)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn zone_value(offset: FixedOffset) -> Value {
    Value::object(FixedZone::new(offset))
}

pub fn utc() -> FixedOffset {
    Utc.fix()
}

/// The offset carried by a `tzinfo` argument; `None` for `None`.
pub fn offset_arg(value: &Value) -> Result<Option<FixedOffset>> {
    if value.is_none() {
        return Ok(None);
    }
    downcast::<FixedZone>(value)
        .map(|zone| Some(zone.offset))
        .ok_or_else(|| {
            SandboxError::type_error(format!(
                "tzinfo argument must be None or of a tzinfo subclass, not type '{}'",
                value.type_name()
            ))
        })
}

/// Offset of the host's local zone at a UTC instant.
pub fn local_offset_at(utc_naive: &NaiveDateTime) -> FixedOffset {
    Local.offset_from_utc_datetime(utc_naive).fix()
}

/// Offset of the host's local zone for a local wall-clock time.
pub fn local_offset_for(local_naive: &NaiveDateTime) -> FixedOffset {
    Local
        .offset_from_local_datetime(local_naive)
        .earliest()
        .map_or_else(|| local_offset_at(local_naive), |o| o.fix())
}

fn offset_name(offset: FixedOffset) -> String {
    if offset.local_minus_utc() == 0 {
        "UTC".to_string()
    } else {
        format!("UTC{}", offset_text(offset, true))
    }
}

fn zone_repr(offset: FixedOffset) -> String {
    if offset.local_minus_utc() == 0 {
        "datetime.timezone.utc".to_string()
    } else {
        format!(
            "datetime.timezone({})",
            render_timedelta(&TimeDelta::seconds(i64::from(offset.local_minus_utc())), true)
        )
    }
}

/// `+HH:MM` (or `+HHMM` without the colon), with seconds when non-zero.
pub(crate) fn offset_text(offset: FixedOffset, colon: bool) -> String {
    let total = offset.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let total = total.abs();
    let (hours, minutes, seconds) = (total / 3600, total / 60 % 60, total % 60);
    let sep = if colon { ":" } else { "" };
    let mut out = format!("{sign}{hours:02}{sep}{minutes:02}");
    if seconds != 0 {
        let _ = write!(out, "{sep}{seconds:02}");
    }
    out
}

fn offset_delta(offset: FixedOffset) -> Value {
    Value::TimeDelta(TimeDelta::seconds(i64::from(offset.local_minus_utc())))
}

// ---------------------------------------------------------------------------
// Construction helpers
// ---------------------------------------------------------------------------

fn micros_of(t: &impl Timelike) -> u32 {
    (t.nanosecond() / 1_000).min(999_999)
}

pub fn build_date(year: i64, month: i64, day: i64) -> Result<NaiveDate> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(SandboxError::value_error(format!("year {year} is out of range")));
    }
    if !(1..=12).contains(&month) {
        return Err(SandboxError::value_error("month must be in 1..12"));
    }
    u32::try_from(day)
        .ok()
        .and_then(|day| NaiveDate::from_ymd_opt(year as i32, month as u32, day))
        .ok_or_else(|| SandboxError::value_error("day is out of range for month"))
}

pub fn build_time(hour: i64, minute: i64, second: i64, micro: i64) -> Result<NaiveTime> {
    let check = |value: i64, max: i64, what: &str| {
        if (0..=max).contains(&value) {
            Ok(value as u32)
        } else {
            Err(SandboxError::value_error(format!("{what} must be in 0..{max}")))
        }
    };
    let (h, m, s, us) = (
        check(hour, 23, "hour")?,
        check(minute, 59, "minute")?,
        check(second, 59, "second")?,
        check(micro, 999_999, "microsecond")?,
    );
    NaiveTime::from_hms_micro_opt(h, m, s, us)
        .ok_or_else(|| SandboxError::value_error("time out of range"))
}

/// Integer field `index`/`name`, rejecting floats the way constructors do.
fn int_field(args: &CallArgs, func: &str, index: usize, name: &str, default: Option<i64>) -> Result<i64> {
    match (args.arg(index, name), default) {
        (Some(Value::Float(_)), _) => Err(SandboxError::type_error(
            "'float' object cannot be interpreted as an integer",
        )),
        (Some(value), _) => value.as_int(),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(SandboxError::type_error(format!(
            "{func}() missing required argument '{name}'"
        ))),
    }
}

fn construct_datetime(args: &CallArgs) -> Result<Value> {
    args.expect("datetime", 0, 8)?;
    args.allow_keywords(
        "datetime",
        &["year", "month", "day", "hour", "minute", "second", "microsecond", "tzinfo", "fold"],
    )?;
    let f = |index, name, default| int_field(args, "datetime", index, name, default);
    let date = build_date(f(0, "year", None)?, f(1, "month", None)?, f(2, "day", None)?)?;
    let time = build_time(
        f(3, "hour", Some(0))?,
        f(4, "minute", Some(0))?,
        f(5, "second", Some(0))?,
        f(6, "microsecond", Some(0))?,
    )?;
    let offset = match args.arg(7, "tzinfo") {
        Some(tz) => offset_arg(tz)?,
        None => None,
    };
    Ok(Value::DateTime(DateTimeValue {
        naive: date.and_time(time),
        offset,
    }))
}

fn construct_date(args: &CallArgs) -> Result<Value> {
    args.expect("date", 0, 3)?;
    args.allow_keywords("date", &["year", "month", "day"])?;
    let f = |index, name| int_field(args, "date", index, name, None);
    Ok(Value::Date(build_date(f(0, "year")?, f(1, "month")?, f(2, "day")?)?))
}

fn construct_time(args: &CallArgs) -> Result<Value> {
    args.expect("time", 0, 5)?;
    args.allow_keywords("time", &["hour", "minute", "second", "microsecond", "tzinfo", "fold"])?;
    if let Some(tz) = args.arg(4, "tzinfo") {
        if offset_arg(tz)?.is_some() {
            return Err(SandboxError::value_error(
                "time values with a tzinfo are not supported",
            ));
        }
    }
    let f = |index, name| int_field(args, "time", index, name, Some(0));
    Ok(Value::Time(build_time(
        f(0, "hour")?,
        f(1, "minute")?,
        f(2, "second")?,
        f(3, "microsecond")?,
    )?))
}

/// Build a delta from a microsecond count, enforcing the day range.
pub fn delta_from_micros(micros: i128) -> Result<TimeDelta> {
    let days = micros.div_euclid(MICROS_PER_DAY);
    if days.abs() > MAX_DELTA_DAYS {
        return Err(SandboxError::exception(
            "OverflowError",
            format!("days={days}; must have magnitude <= {MAX_DELTA_DAYS}"),
        ));
    }
    i64::try_from(micros)
        .map(TimeDelta::microseconds)
        .map_err(|_| SandboxError::exception("OverflowError", "timedelta out of range"))
}

fn construct_timedelta(args: &CallArgs) -> Result<Value> {
    const UNITS: [(&str, i128); 7] = [
        ("days", MICROS_PER_DAY),
        ("seconds", MICROS_PER_SECOND),
        ("microseconds", 1),
        ("milliseconds", 1_000),
        ("minutes", 60 * MICROS_PER_SECOND),
        ("hours", 3_600 * MICROS_PER_SECOND),
        ("weeks", 7 * MICROS_PER_DAY),
    ];
    args.expect("timedelta", 0, UNITS.len())?;
    args.allow_keywords("timedelta", &UNITS.map(|(name, _)| name))?;
    let mut exact: i128 = 0;
    let mut fractional = 0.0_f64;
    for (index, (name, scale)) in UNITS.iter().enumerate() {
        match args.arg(index, name) {
            None => {}
            Some(Value::Float(f)) => fractional += f * *scale as f64,
            Some(other) if other.is_number() => {
                exact = exact
                    .checked_add(i128::from(other.as_int()?) * scale)
                    .ok_or_else(SandboxError::overflow)?;
            }
            Some(other) => {
                return Err(SandboxError::type_error(format!(
                    "unsupported type for timedelta {name} component: {}",
                    other.type_name()
                )));
            }
        }
    }
    if !fractional.is_finite() || fractional.abs() > 1e20 {
        return Err(SandboxError::exception(
            "OverflowError",
            "cannot convert float infinity to integer",
        ));
    }
    let total = exact + fractional.round_ties_even() as i128;
    delta_from_micros(total).map(Value::TimeDelta)
}

fn construct_timezone(args: &CallArgs) -> Result<Value> {
    args.expect("timezone", 1, 2)?;
    let delta = match args.required("timezone", 0, "offset")? {
        Value::TimeDelta(d) => *d,
        other => {
            return Err(SandboxError::type_error(format!(
                "timezone() argument 1 must be datetime.timedelta, not {}",
                other.type_name()
            )));
        }
    };
    let seconds = delta.num_seconds();
    let offset = (seconds.abs() < 86_400)
        .then(|| FixedOffset::east_opt(seconds as i32))
        .flatten()
        .ok_or_else(|| {
            SandboxError::value_error(
                "offset must be a timedelta strictly between -timedelta(hours=24) and timedelta(hours=24).",
            )
        })?;
    let name = match args.arg(1, "name") {
        Some(name) => Some(name.as_str()?.to_string()),
        None => None,
    };
    Ok(Value::object(FixedZone { offset, name }))
}

/// Call a temporal type object.
pub fn construct(kind: &TypeKind, args: &CallArgs) -> Result<Value> {
    match kind {
        TypeKind::DateTime => construct_datetime(args),
        TypeKind::Date => construct_date(args),
        TypeKind::Time => construct_time(args),
        TypeKind::TimeDelta => construct_timedelta(args),
        TypeKind::TimeZone => construct_timezone(args),
        other => Err(SandboxError::Internal(format!(
            "{} is not a temporal type",
            other.name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Text forms
// ---------------------------------------------------------------------------

fn time_text(t: &NaiveTime, timespec: &str) -> Result<String> {
    let (h, m, s, us) = (t.hour(), t.minute(), t.second(), micros_of(t));
    Ok(match timespec {
        "auto" if us == 0 => format!("{h:02}:{m:02}:{s:02}"),
        "auto" | "microseconds" => format!("{h:02}:{m:02}:{s:02}.{us:06}"),
        "hours" => format!("{h:02}"),
        "minutes" => format!("{h:02}:{m:02}"),
        "seconds" => format!("{h:02}:{m:02}:{s:02}"),
        "milliseconds" => format!("{h:02}:{m:02}:{s:02}.{:03}", us / 1_000),
        _ => return Err(SandboxError::value_error("Unknown timespec value")),
    })
}

fn datetime_text(dt: &DateTimeValue, sep: &str, timespec: &str) -> Result<String> {
    let mut out = format!(
        "{}{sep}{}",
        dt.naive.date().format("%Y-%m-%d"),
        time_text(&dt.naive.time(), timespec)?
    );
    if let Some(offset) = dt.offset {
        out.push_str(&offset_text(offset, true));
    }
    Ok(out)
}

/// `datetime.isoformat()`.
pub fn isoformat(dt: &DateTimeValue) -> String {
    datetime_text(dt, "T", "auto").unwrap_or_default()
}

/// `repr()`/`str()` of a datetime.
pub fn render_datetime(dt: &DateTimeValue, repr: bool) -> String {
    if !repr {
        return datetime_text(dt, " ", "auto").unwrap_or_default();
    }
    let n = &dt.naive;
    let mut out = format!(
        "datetime.datetime({}, {}, {}, {}, {}",
        n.year(),
        n.month(),
        n.day(),
        n.hour(),
        n.minute()
    );
    let us = micros_of(n);
    if n.second() != 0 || us != 0 {
        let _ = write!(out, ", {}", n.second());
    }
    if us != 0 {
        let _ = write!(out, ", {us}");
    }
    if let Some(offset) = dt.offset {
        let _ = write!(out, ", tzinfo={}", zone_repr(offset));
    }
    out.push(')');
    out
}

/// `repr()`/`str()` of a time.
pub fn render_time(t: &NaiveTime, repr: bool) -> String {
    if !repr {
        return time_text(t, "auto").unwrap_or_default();
    }
    let us = micros_of(t);
    let mut out = format!("datetime.time({}, {}", t.hour(), t.minute());
    if t.second() != 0 || us != 0 {
        let _ = write!(out, ", {}", t.second());
    }
    if us != 0 {
        let _ = write!(out, ", {us}");
    }
    out.push(')');
    out
}

/// Split a delta into normalized `(days, seconds, microseconds)`.
pub fn delta_parts(d: &TimeDelta) -> (i64, i64, i64) {
    let total = i128::from(d.num_seconds()) * MICROS_PER_SECOND
        + i128::from(d.subsec_nanos() / 1_000);
    let days = total.div_euclid(MICROS_PER_DAY);
    let rest = total.rem_euclid(MICROS_PER_DAY);
    (
        days as i64,
        (rest / MICROS_PER_SECOND) as i64,
        (rest % MICROS_PER_SECOND) as i64,
    )
}

/// `repr()`/`str()` of a timedelta.
pub fn render_timedelta(d: &TimeDelta, repr: bool) -> String {
    let (days, seconds, micros) = delta_parts(d);
    if repr {
        let parts: Vec<String> = [("days", days), ("seconds", seconds), ("microseconds", micros)]
            .iter()
            .filter(|(_, v)| *v != 0)
            .map(|(name, v)| format!("{name}={v}"))
            .collect();
        if parts.is_empty() {
            return "datetime.timedelta(0)".to_string();
        }
        return format!("datetime.timedelta({})", parts.join(", "));
    }
    let mut out = String::new();
    if days != 0 {
        let plural = if days.abs() == 1 { "" } else { "s" };
        let _ = write!(out, "{days} day{plural}, ");
    }
    let _ = write!(
        out,
        "{}:{:02}:{:02}",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    );
    if micros != 0 {
        let _ = write!(out, ".{micros:06}");
    }
    out
}

fn total_seconds(d: &TimeDelta) -> f64 {
    let (days, seconds, micros) = delta_parts(d);
    (days as f64 * 86_400.0) + seconds as f64 + micros as f64 / 1e6
}

// ---------------------------------------------------------------------------
// strftime / strptime
// ---------------------------------------------------------------------------

/// Directives passed through to `chrono` unchanged.
const CHRONO_DIRECTIVES: &str = "aAbBcCdDeFgGhHIjklmMnpPRStTuUVwWxXyYs";

/// Render `fmt` for a wall-clock time, with the offset for `%z`/`%Z`.
pub fn strftime(naive: &NaiveDateTime, offset: Option<FixedOffset>, fmt: &str) -> Result<String> {
    // Directives chrono renders differently (or cannot render for naive
    // values) are expanded here; everything else becomes escaped literal text.
    let mut translated = String::with_capacity(fmt.len() + 8);
    let literal = |out: &mut String, text: &str| out.push_str(&text.replace('%', "%%"));
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            literal(&mut translated, c.encode_utf8(&mut [0u8; 4]));
            continue;
        }
        let pad = chars.next_if(|c| matches!(*c, '-' | '_' | '0'));
        match chars.next() {
            Some('%') => translated.push_str("%%"),
            Some('f') => literal(&mut translated, &format!("{:06}", micros_of(naive))),
            Some('z') => {
                if let Some(offset) = offset {
                    literal(&mut translated, &offset_text(offset, false));
                }
            }
            Some('Z') => {
                if let Some(offset) = offset {
                    literal(&mut translated, &offset_name(offset));
                }
            }
            Some(d) if CHRONO_DIRECTIVES.contains(d) => {
                translated.push('%');
                if let Some(pad) = pad {
                    translated.push(pad);
                }
                translated.push(d);
            }
            Some(other) => {
                let mut raw = String::from('%');
                raw.extend(pad);
                raw.push(other);
                literal(&mut translated, &raw);
            }
            None => literal(&mut translated, "%"),
        }
    }
    let mut out = String::new();
    write!(out, "{}", naive.format_with_items(StrftimeItems::new(&translated)))
        .map_err(|_| SandboxError::value_error(format!("Invalid format string: {fmt:?}")))?;
    Ok(out)
}

/// `format(value, spec)` and `value.strftime(spec)` for temporal values.
pub fn strftime_value(value: &Value, fmt: &str) -> Result<String> {
    match value {
        Value::DateTime(dt) => strftime(&dt.naive, dt.offset, fmt),
        Value::Date(d) => strftime(&d.and_time(NaiveTime::MIN), None, fmt),
        Value::Time(t) => strftime(&epoch_date().and_time(*t), None, fmt),
        other => Err(SandboxError::type_error(format!(
            "unsupported format string passed to {}.__format__",
            other.type_name()
        ))),
    }
}

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default()
}

fn has_directive(fmt: &str, directives: &[char]) -> bool {
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some(d) if directives.contains(&d) => return true,
                _ => {}
            }
        }
    }
    false
}

/// Parse `text` with a strftime-style format. Missing date fields default to
/// 1900-01-01 and missing time fields to midnight.
pub fn strptime(text: &str, fmt: &str) -> Result<DateTimeValue> {
    let mismatch =
        || SandboxError::value_error(format!("time data {text:?} does not match format {fmt:?}"));
    let translated = fmt.replace(".%f", "%.f");
    let items = StrftimeItems::new(&translated);
    let mut parsed = Parsed::new();
    parse(&mut parsed, text, items).map_err(|_| mismatch())?;

    let mut fill = |present: &[char], set: &mut dyn FnMut(&mut Parsed) -> chrono::ParseResult<()>| {
        if !has_directive(fmt, present) {
            let _ = set(&mut parsed);
        }
    };
    fill(&['Y', 'y', 'G', 'C'], &mut |p| p.set_year(1900));
    fill(&['m', 'b', 'B', 'h', 'j', 'U', 'W', 'V'], &mut |p| p.set_month(1));
    fill(&['d', 'e', 'j', 'U', 'W', 'V'], &mut |p| p.set_day(1));
    fill(&['H', 'I', 'k', 'l'], &mut |p| p.set_hour(0));
    fill(&['M'], &mut |p| p.set_minute(0));
    fill(&['S'], &mut |p| p.set_second(0));
    if has_directive(fmt, &['I', 'l']) && !has_directive(fmt, &['p', 'P']) {
        let _ = parsed.set_ampm(false);
    }

    let date = parsed.to_naive_date().map_err(|_| mismatch())?;
    let time = parsed.to_naive_time().map_err(|_| mismatch())?;
    let offset = if has_directive(fmt, &['z']) {
        Some(parsed.to_fixed_offset().map_err(|_| mismatch())?)
    } else {
        None
    };
    Ok(DateTimeValue {
        naive: date.and_time(time),
        offset,
    })
}

/// Parse an ISO 8601 datetime (`YYYY-MM-DD[( |T)HH:MM[:SS[.ffffff]]][offset]`).
pub fn parse_iso(text: &str) -> Option<DateTimeValue> {
    let text = text.trim();
    let normalized = match text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        Some(rest) => format!("{rest}+00:00"),
        None => text.to_string(),
    };
    for sep in ['T', ' '] {
        for time_fmt in ["%H:%M:%S%.f", "%H:%M"] {
            for zone_fmt in ["%:z", "%z"] {
                let fmt = format!("%Y-%m-%d{sep}{time_fmt}{zone_fmt}");
                if let Ok(dt) = chrono::DateTime::parse_from_str(&normalized, &fmt) {
                    return Some(DateTimeValue::aware(dt.naive_local(), *dt.offset()));
                }
            }
            let fmt = format!("%Y-%m-%d{sep}{time_fmt}");
            if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, &fmt) {
                return Some(DateTimeValue::naive(naive));
            }
        }
    }
    parse_iso_date(text).map(|d| DateTimeValue::naive(d.and_time(NaiveTime::MIN)))
}

pub fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()
}

fn parse_iso_time(text: &str) -> Option<NaiveTime> {
    ["%H:%M:%S%.f", "%H:%M", "%H"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text.trim(), fmt).ok())
}

// ---------------------------------------------------------------------------
// Clock and timestamps
// ---------------------------------------------------------------------------

pub fn utc_now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Current time as an aware value in `offset`, or naive local time.
pub fn now(offset: Option<FixedOffset>) -> DateTimeValue {
    let utc_naive = utc_now();
    match offset {
        Some(offset) => DateTimeValue::aware(utc_naive + offset_duration(offset), offset),
        None => DateTimeValue::naive(Local::now().naive_local()),
    }
}

fn offset_duration(offset: FixedOffset) -> TimeDelta {
    TimeDelta::seconds(i64::from(offset.local_minus_utc()))
}

/// Seconds since the epoch for a datetime; naive values are local time.
pub fn timestamp(dt: &DateTimeValue) -> f64 {
    let utc_naive = dt
        .utc_instant()
        .unwrap_or_else(|| dt.naive - offset_duration(local_offset_for(&dt.naive)));
    utc_naive.and_utc().timestamp_micros() as f64 / 1e6
}

/// UTC wall-clock time for a timestamp.
pub fn from_timestamp(ts: f64) -> Result<NaiveDateTime> {
    if !ts.is_finite() {
        return Err(SandboxError::value_error("Invalid value NaN (not a number)"));
    }
    let micros = (ts * 1e6).round();
    if micros.abs() >= i64::MAX as f64 {
        return Err(SandboxError::exception("OverflowError", "timestamp out of range for platform time_t"));
    }
    chrono::DateTime::from_timestamp_micros(micros as i64)
        .map(|dt| dt.naive_utc())
        .filter(|n| (MIN_YEAR..=MAX_YEAR).contains(&i64::from(n.year())))
        .ok_or_else(|| SandboxError::value_error(format!("year is out of range for timestamp {ts}")))
}

/// Convert to `target`, or to the local zone when `None`. Naive input is
/// taken as local time.
pub fn astimezone(dt: &DateTimeValue, target: Option<FixedOffset>) -> DateTimeValue {
    let utc_naive = dt
        .utc_instant()
        .unwrap_or_else(|| dt.naive - offset_duration(local_offset_for(&dt.naive)));
    let offset = target.unwrap_or_else(|| local_offset_at(&utc_naive));
    DateTimeValue::aware(utc_naive + offset_duration(offset), offset)
}

// ---------------------------------------------------------------------------
// Attributes and methods
// ---------------------------------------------------------------------------

const DATE_METHODS: &[&str] = &[
    "isoformat",
    "strftime",
    "weekday",
    "isoweekday",
    "isocalendar",
    "replace",
    "toordinal",
    "ctime",
    "timetuple",
];

const DATETIME_ONLY_METHODS: &[&str] = &[
    "date",
    "time",
    "timetz",
    "timestamp",
    "astimezone",
    "utcoffset",
    "tzname",
    "dst",
    "utctimetuple",
];

const TIME_METHODS: &[&str] = &["isoformat", "strftime", "replace", "utcoffset", "tzname", "dst"];

const TIMEDELTA_METHODS: &[&str] = &["total_seconds"];

const DATETIME_CLASS_METHODS: &[&str] = &[
    "now",
    "utcnow",
    "today",
    "fromtimestamp",
    "utcfromtimestamp",
    "fromisoformat",
    "strptime",
    "combine",
    "fromordinal",
];

const DATE_CLASS_METHODS: &[&str] = &["today", "fromtimestamp", "fromisoformat", "fromordinal"];

const TIME_CLASS_METHODS: &[&str] = &["fromisoformat"];

/// Whether `name` is an instance method of values of `kind`.
pub fn is_instance_method(kind: &TypeKind, name: &str) -> bool {
    match kind {
        TypeKind::DateTime => DATE_METHODS.contains(&name) || DATETIME_ONLY_METHODS.contains(&name),
        TypeKind::Date => DATE_METHODS.contains(&name),
        TypeKind::Time => TIME_METHODS.contains(&name),
        TypeKind::TimeDelta => TIMEDELTA_METHODS.contains(&name),
        _ => false,
    }
}

fn is_class_method(kind: &TypeKind, name: &str) -> bool {
    match kind {
        TypeKind::DateTime => DATETIME_CLASS_METHODS.contains(&name),
        TypeKind::Date => DATE_CLASS_METHODS.contains(&name),
        TypeKind::Time => TIME_CLASS_METHODS.contains(&name),
        _ => false,
    }
}

/// Whether `kind.name` resolves to a callable on the type object.
pub fn class_has_method(kind: &TypeKind, name: &str) -> bool {
    is_instance_method(kind, name) || is_class_method(kind, name)
}

/// Whether `value.name` resolves to a method.
pub fn has_method(value: &Value, name: &str) -> bool {
    class_has_method(&value.type_kind(), name)
}

/// Data attributes of temporal values.
pub fn attribute(obj: &Value, name: &str) -> Option<Value> {
    let int = |v: u32| Some(Value::Int(i64::from(v)));
    match obj {
        Value::DateTime(dt) => match name {
            "year" => Some(Value::Int(i64::from(dt.naive.year()))),
            "month" => int(dt.naive.month()),
            "day" => int(dt.naive.day()),
            "hour" => int(dt.naive.hour()),
            "minute" => int(dt.naive.minute()),
            "second" => int(dt.naive.second()),
            "microsecond" => int(micros_of(&dt.naive)),
            "tzinfo" => Some(dt.offset.map_or(Value::None, zone_value)),
            "fold" => Some(Value::Int(0)),
            _ => None,
        },
        Value::Date(d) => match name {
            "year" => Some(Value::Int(i64::from(d.year()))),
            "month" => int(d.month()),
            "day" => int(d.day()),
            _ => None,
        },
        Value::Time(t) => match name {
            "hour" => int(t.hour()),
            "minute" => int(t.minute()),
            "second" => int(t.second()),
            "microsecond" => int(micros_of(t)),
            "tzinfo" => Some(Value::None),
            "fold" => Some(Value::Int(0)),
            _ => None,
        },
        Value::TimeDelta(d) => {
            let (days, seconds, micros) = delta_parts(d);
            match name {
                "days" => Some(Value::Int(days)),
                "seconds" => Some(Value::Int(seconds)),
                "microseconds" => Some(Value::Int(micros)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Data attributes of the temporal type objects (`datetime.min`, ...).
pub fn class_attribute(kind: &TypeKind, name: &str) -> Option<Value> {
    let min_date = NaiveDate::from_ymd_opt(1, 1, 1)?;
    let max_date = NaiveDate::from_ymd_opt(9999, 12, 31)?;
    let max_time = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999)?;
    match (kind, name) {
        (TypeKind::DateTime, "min") => Some(Value::DateTime(DateTimeValue::naive(
            min_date.and_time(NaiveTime::MIN),
        ))),
        (TypeKind::DateTime, "max") => {
            Some(Value::DateTime(DateTimeValue::naive(max_date.and_time(max_time))))
        }
        (TypeKind::Date, "min") => Some(Value::Date(min_date)),
        (TypeKind::Date, "max") => Some(Value::Date(max_date)),
        (TypeKind::Time, "min") => Some(Value::Time(NaiveTime::MIN)),
        (TypeKind::Time, "max") => Some(Value::Time(max_time)),
        (TypeKind::DateTime | TypeKind::Time, "resolution") | (TypeKind::TimeDelta, "resolution") => {
            Some(Value::TimeDelta(TimeDelta::microseconds(1)))
        }
        (TypeKind::Date, "resolution") => Some(Value::TimeDelta(TimeDelta::days(1))),
        (TypeKind::TimeDelta, "min") => Some(Value::TimeDelta(TimeDelta::days(-999_999_999))),
        (TypeKind::TimeDelta, "max") => Some(Value::TimeDelta(
            TimeDelta::days(999_999_999) + TimeDelta::microseconds(86_400_000_000 - 1),
        )),
        (TypeKind::TimeZone, "utc") => Some(zone_value(utc())),
        _ => None,
    }
}

fn isocalendar(d: &NaiveDate) -> Value {
    let week = d.iso_week();
    Value::tuple(vec![
        Value::Int(i64::from(week.year())),
        Value::Int(i64::from(week.week())),
        Value::Int(i64::from(d.weekday().number_from_monday())),
    ])
}

fn toordinal(d: &NaiveDate) -> i64 {
    i64::from(d.num_days_from_ce())
}

fn fromordinal(ordinal: i64) -> Result<NaiveDate> {
    i32::try_from(ordinal)
        .ok()
        .filter(|o| *o >= 1)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .filter(|d| i64::from(d.year()) <= MAX_YEAR)
        .ok_or_else(|| SandboxError::value_error(format!("ordinal must be >= 1, got {ordinal}")))
}

fn replace_date(d: &NaiveDate, args: &CallArgs) -> Result<NaiveDate> {
    let f = |index, name, current: i64| int_field(args, "replace", index, name, Some(current));
    build_date(
        f(0, "year", i64::from(d.year()))?,
        f(1, "month", i64::from(d.month()))?,
        f(2, "day", i64::from(d.day()))?,
    )
}

fn replace_time(t: &NaiveTime, args: &CallArgs, first: usize) -> Result<NaiveTime> {
    let f = |index: usize, name, current: u32| {
        int_field(args, "replace", first + index, name, Some(i64::from(current)))
    };
    build_time(
        f(0, "hour", t.hour())?,
        f(1, "minute", t.minute())?,
        f(2, "second", t.second())?,
        f(3, "microsecond", micros_of(t))?,
    )
}

fn string_arg<'a>(args: &'a CallArgs, func: &str, index: usize, name: &str) -> Result<&'a str> {
    match args.required(func, index, name)? {
        Value::Str(s) => Ok(&**s),
        other => Err(SandboxError::type_error(format!(
            "{func}() argument {} must be str, not {}",
            index + 1,
            other.type_name()
        ))),
    }
}

fn tz_arg(args: &CallArgs, index: usize, name: &str) -> Result<Option<FixedOffset>> {
    match args.arg(index, name) {
        Some(value) => offset_arg(value),
        None => Ok(None),
    }
}

fn date_method(d: &NaiveDate, name: &str, args: &CallArgs) -> Result<Value> {
    match name {
        "isoformat" => Ok(Value::from(d.format("%Y-%m-%d").to_string())),
        "strftime" => strftime_value(&Value::Date(*d), string_arg(args, "strftime", 0, "format")?)
            .map(Value::from),
        "weekday" => Ok(Value::Int(i64::from(d.weekday().num_days_from_monday()))),
        "isoweekday" => Ok(Value::Int(i64::from(d.weekday().number_from_monday()))),
        "isocalendar" => Ok(isocalendar(d)),
        "replace" => {
            args.allow_keywords("replace", &["year", "month", "day"])?;
            replace_date(d, args).map(Value::Date)
        }
        "toordinal" => Ok(Value::Int(toordinal(d))),
        "ctime" => strftime(&d.and_time(NaiveTime::MIN), None, "%a %b %e %H:%M:%S %Y").map(Value::from),
        "timetuple" => Ok(Value::object(StructTime::new(d.and_time(NaiveTime::MIN), None, -1))),
        _ => Err(SandboxError::attribute_error(format!(
            "'datetime.date' object has no attribute '{name}'"
        ))),
    }
}

fn datetime_method(dt: &DateTimeValue, name: &str, args: &CallArgs) -> Result<Value> {
    match name {
        "date" => Ok(Value::Date(dt.naive.date())),
        "time" => Ok(Value::Time(dt.naive.time())),
        "timetz" => Ok(Value::Time(dt.naive.time())),
        "timestamp" => Ok(Value::Float(timestamp(dt))),
        "astimezone" => {
            args.expect("astimezone", 0, 1)?;
            Ok(Value::DateTime(astimezone(dt, tz_arg(args, 0, "tz")?)))
        }
        "utcoffset" => Ok(dt.offset.map_or(Value::None, offset_delta)),
        "tzname" => Ok(dt.offset.map_or(Value::None, |o| Value::from(offset_name(o)))),
        "dst" => Ok(Value::None),
        "isoformat" => {
            args.expect("isoformat", 0, 2)?;
            let sep = match args.arg(0, "sep") {
                Some(sep) => sep.as_str()?.to_string(),
                None => "T".to_string(),
            };
            let timespec = match args.arg(1, "timespec") {
                Some(spec) => spec.as_str()?.to_string(),
                None => "auto".to_string(),
            };
            datetime_text(dt, &sep, &timespec).map(Value::from)
        }
        "strftime" => strftime(&dt.naive, dt.offset, string_arg(args, "strftime", 0, "format")?)
            .map(Value::from),
        "replace" => {
            args.allow_keywords(
                "replace",
                &["year", "month", "day", "hour", "minute", "second", "microsecond", "tzinfo", "fold"],
            )?;
            let date = replace_date(&dt.naive.date(), args)?;
            let time = replace_time(&dt.naive.time(), args, 3)?;
            let offset = match args.arg(7, "tzinfo") {
                Some(tz) => offset_arg(tz)?,
                None => dt.offset,
            };
            Ok(Value::DateTime(DateTimeValue {
                naive: date.and_time(time),
                offset,
            }))
        }
        "ctime" => strftime(&dt.naive, None, "%a %b %e %H:%M:%S %Y").map(Value::from),
        "timetuple" => Ok(Value::object(StructTime::new(dt.naive, dt.offset, -1))),
        "utctimetuple" => {
            let utc_naive = dt.utc_instant().unwrap_or(dt.naive);
            Ok(Value::object(StructTime::new(utc_naive, Some(utc()), 0)))
        }
        _ => date_method(&dt.naive.date(), name, args),
    }
}

fn time_method(t: &NaiveTime, name: &str, args: &CallArgs) -> Result<Value> {
    match name {
        "isoformat" => {
            args.expect("isoformat", 0, 1)?;
            let timespec = match args.arg(0, "timespec") {
                Some(spec) => spec.as_str()?.to_string(),
                None => "auto".to_string(),
            };
            time_text(t, &timespec).map(Value::from)
        }
        "strftime" => strftime_value(&Value::Time(*t), string_arg(args, "strftime", 0, "format")?)
            .map(Value::from),
        "replace" => {
            args.allow_keywords("replace", &["hour", "minute", "second", "microsecond"])?;
            replace_time(t, args, 0).map(Value::Time)
        }
        "utcoffset" | "tzname" | "dst" => Ok(Value::None),
        _ => Err(SandboxError::attribute_error(format!(
            "'datetime.time' object has no attribute '{name}'"
        ))),
    }
}

/// Call an instance method on a temporal value.
pub fn call_method(
    interp: &mut Interpreter,
    receiver: &Value,
    name: &str,
    args: CallArgs,
) -> Result<Value> {
    let kind = receiver.type_kind();
    if is_class_method(&kind, name) && !is_instance_method(&kind, name) {
        return call_class_method(interp, &kind, name, args);
    }
    match receiver {
        Value::DateTime(dt) => datetime_method(dt, name, &args),
        Value::Date(d) => date_method(d, name, &args),
        Value::Time(t) => time_method(t, name, &args),
        Value::TimeDelta(d) if name == "total_seconds" => {
            args.expect("total_seconds", 0, 0)?;
            Ok(Value::Float(total_seconds(d)))
        }
        other => Err(SandboxError::attribute_error(format!(
            "'{}' object has no attribute '{name}'",
            other.type_name()
        ))),
    }
}

/// Call a class method such as `datetime.now()` or `date.fromisoformat()`.
pub fn call_class_method(
    _interp: &mut Interpreter,
    kind: &TypeKind,
    name: &str,
    args: CallArgs,
) -> Result<Value> {
    let invalid_iso = |text: &str| SandboxError::value_error(format!("Invalid isoformat string: {text:?}"));
    match (kind, name) {
        (TypeKind::DateTime, "now") => {
            args.expect("now", 0, 1)?;
            Ok(Value::DateTime(now(tz_arg(&args, 0, "tz")?)))
        }
        (TypeKind::DateTime, "today") => Ok(Value::DateTime(now(None))),
        (TypeKind::DateTime, "utcnow") => Ok(Value::DateTime(DateTimeValue::naive(utc_now()))),
        (TypeKind::DateTime, "fromtimestamp") => {
            args.expect("fromtimestamp", 1, 2)?;
            let utc_naive = from_timestamp(args.required("fromtimestamp", 0, "timestamp")?.as_float()?)?;
            let tz = tz_arg(&args, 1, "tz")?;
            Ok(Value::DateTime(match tz {
                Some(offset) => DateTimeValue::aware(utc_naive + offset_duration(offset), offset),
                None => DateTimeValue::naive(utc_naive + offset_duration(local_offset_at(&utc_naive))),
            }))
        }
        (TypeKind::DateTime, "utcfromtimestamp") => {
            args.expect("utcfromtimestamp", 1, 1)?;
            let utc_naive = from_timestamp(args.positional[0].as_float()?)?;
            Ok(Value::DateTime(DateTimeValue::naive(utc_naive)))
        }
        (TypeKind::DateTime, "fromisoformat") => {
            let text = string_arg(&args, "fromisoformat", 0, "date_string")?;
            parse_iso(text).map(Value::DateTime).ok_or_else(|| invalid_iso(text))
        }
        (TypeKind::DateTime, "strptime") => {
            args.expect("strptime", 2, 2)?;
            let text = string_arg(&args, "strptime", 0, "date_string")?;
            let fmt = string_arg(&args, "strptime", 1, "format")?;
            strptime(text, fmt).map(Value::DateTime)
        }
        (TypeKind::DateTime, "combine") => {
            args.expect("combine", 2, 3)?;
            let date = match &args.positional[0] {
                Value::Date(d) => *d,
                Value::DateTime(dt) => dt.naive.date(),
                other => {
                    return Err(SandboxError::type_error(format!(
                        "combine() argument 1 must be datetime.date, not {}",
                        other.type_name()
                    )));
                }
            };
            let Value::Time(time) = &args.positional[1] else {
                return Err(SandboxError::type_error(format!(
                    "combine() argument 2 must be datetime.time, not {}",
                    args.positional[1].type_name()
                )));
            };
            Ok(Value::DateTime(DateTimeValue {
                naive: date.and_time(*time),
                offset: tz_arg(&args, 2, "tzinfo")?,
            }))
        }
        (TypeKind::DateTime, "fromordinal") => {
            args.expect("fromordinal", 1, 1)?;
            let date = fromordinal(args.positional[0].as_int()?)?;
            Ok(Value::DateTime(DateTimeValue::naive(date.and_time(NaiveTime::MIN))))
        }
        (TypeKind::Date, "today") => Ok(Value::Date(Local::now().date_naive())),
        (TypeKind::Date, "fromtimestamp") => {
            args.expect("fromtimestamp", 1, 1)?;
            let utc_naive = from_timestamp(args.positional[0].as_float()?)?;
            Ok(Value::Date((utc_naive + offset_duration(local_offset_at(&utc_naive))).date()))
        }
        (TypeKind::Date, "fromisoformat") => {
            let text = string_arg(&args, "fromisoformat", 0, "date_string")?;
            parse_iso_date(text).map(Value::Date).ok_or_else(|| invalid_iso(text))
        }
        (TypeKind::Date, "fromordinal") => {
            args.expect("fromordinal", 1, 1)?;
            fromordinal(args.positional[0].as_int()?).map(Value::Date)
        }
        (TypeKind::Time, "fromisoformat") => {
            let text = string_arg(&args, "fromisoformat", 0, "time_string")?;
            parse_iso_time(text).map(Value::Time).ok_or_else(|| invalid_iso(text))
        }
        _ => Err(SandboxError::attribute_error(format!(
            "type object '{}' has no attribute '{name}'",
            kind.name()
        ))),
    }
}

/// The `datetime` module object.
pub fn module() -> Value {
    Value::object(
        Module::new(
            "datetime",
            vec![
                ("date", Value::Type(TypeKind::Date)),
                ("time", Value::Type(TypeKind::Time)),
                ("datetime", Value::Type(TypeKind::DateTime)),
                ("timedelta", Value::Type(TypeKind::TimeDelta)),
                ("tzinfo", Value::Type(TypeKind::TimeZone)),
            ],
        )
        .with_owner(Owner::DateTimeModule),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, us: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_micro_opt(h, mi, s, us)
            .unwrap()
    }

    fn hours(h: i32) -> FixedOffset {
        FixedOffset::east_opt(h * 3600).unwrap()
    }

    #[test]
    fn datetime_reprs_drop_trailing_zero_fields() {
        let plain = DateTimeValue::naive(dt(2024, 1, 2, 3, 4, 0, 0));
        assert_eq!(render_datetime(&plain, true), "datetime.datetime(2024, 1, 2, 3, 4)");
        assert_eq!(render_datetime(&plain, false), "2024-01-02 03:04:00");
        let aware = DateTimeValue::aware(dt(2024, 1, 2, 3, 4, 5, 120), utc());
        assert_eq!(
            render_datetime(&aware, true),
            "datetime.datetime(2024, 1, 2, 3, 4, 5, 120, tzinfo=datetime.timezone.utc)"
        );
        assert_eq!(isoformat(&aware), "2024-01-02T03:04:05.000120+00:00");
    }

    #[test]
    fn timedelta_text_forms() {
        assert_eq!(render_timedelta(&TimeDelta::zero(), true), "datetime.timedelta(0)");
        let d = TimeDelta::days(1) + TimeDelta::hours(1);
        assert_eq!(render_timedelta(&d, true), "datetime.timedelta(days=1, seconds=3600)");
        assert_eq!(render_timedelta(&d, false), "1 day, 1:00:00");
        let neg = TimeDelta::seconds(-1);
        assert_eq!(render_timedelta(&neg, false), "-1 day, 23:59:59");
        assert_eq!(delta_parts(&neg), (-1, 86_399, 0));
        let half = TimeDelta::milliseconds(2_500);
        assert_eq!(render_timedelta(&half, false), "0:00:02.500000");
        assert_eq!(total_seconds(&half), 2.5);
    }

    #[test]
    fn timedelta_constructor_mixes_units() {
        let args = CallArgs::with_keywords(
            vec![],
            vec![("hours".into(), Value::Float(1.5)), ("minutes".into(), Value::Int(30))],
        );
        let Value::TimeDelta(d) = construct_timedelta(&args).unwrap() else {
            panic!("expected timedelta");
        };
        assert_eq!(d, TimeDelta::hours(2));
        let huge = CallArgs::new(vec![Value::Int(1_000_000_000)]);
        assert!(construct_timedelta(&huge).is_err());
    }

    #[test]
    fn constructor_validation_messages() {
        let err = build_date(2024, 13, 1).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: month must be in 1..12");
        let err = build_date(2023, 2, 29).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: day is out of range for month");
        let err = build_time(24, 0, 0, 0).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: hour must be in 0..23");
    }

    #[test]
    fn strftime_handles_python_directives() {
        let when = dt(2024, 3, 5, 14, 7, 9, 42);
        assert_eq!(
            strftime(&when, Some(hours(2)), "%Y-%m-%d %H:%M:%S.%f %z %Z %%").unwrap(),
            "2024-03-05 14:07:09.000042 +0200 UTC+02:00 %"
        );
        assert_eq!(strftime(&when, None, "%z|%Z|%A").unwrap(), "||Tuesday");
        assert_eq!(strftime(&when, None, "%q").unwrap(), "%q");
    }

    #[test]
    fn strptime_defaults_missing_fields() {
        let parsed = strptime("14:30", "%H:%M").unwrap();
        assert_eq!(parsed.naive, dt(1900, 1, 1, 14, 30, 0, 0));
        let parsed = strptime("2024-06-01 02:03:04.5 +0100", "%Y-%m-%d %H:%M:%S.%f %z").unwrap();
        assert_eq!(parsed.naive, dt(2024, 6, 1, 2, 3, 4, 500_000));
        assert_eq!(parsed.offset, Some(hours(1)));
        let err = strptime("nope", "%Y").unwrap_err();
        assert!(err.to_string().contains("does not match format"));
    }

    #[test]
    fn iso_parsing_variants() {
        let aware = parse_iso("2024-06-01T12:00:00Z").unwrap();
        assert_eq!(aware.offset, Some(utc()));
        let naive = parse_iso("2024-06-01 12:00").unwrap();
        assert_eq!(naive.naive, dt(2024, 6, 1, 12, 0, 0, 0));
        assert!(naive.offset.is_none());
        let date_only = parse_iso("2024-06-01").unwrap();
        assert_eq!(date_only.naive, dt(2024, 6, 1, 0, 0, 0, 0));
        assert!(parse_iso("yesterday").is_none());
    }

    #[test]
    fn astimezone_keeps_the_instant() {
        let utc_value = DateTimeValue::aware(dt(2024, 1, 1, 23, 0, 0, 0), utc());
        let shifted = astimezone(&utc_value, Some(hours(2)));
        assert_eq!(shifted.naive, dt(2024, 1, 2, 1, 0, 0, 0));
        assert_eq!(shifted.utc_instant(), utc_value.utc_instant());
        assert_eq!(timestamp(&shifted), timestamp(&utc_value));
    }

    #[test]
    fn zone_names_and_reprs() {
        let zone = FixedZone::new(hours(-5));
        assert_eq!(zone.tzname(), "UTC-05:00");
        assert_eq!(zone.repr(), "datetime.timezone(datetime.timedelta(days=-1, seconds=68400))");
        assert_eq!(FixedZone::new(utc()).repr(), "datetime.timezone.utc");
    }
}
