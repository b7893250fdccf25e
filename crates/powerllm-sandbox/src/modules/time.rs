//! The `time` wrapper.
//!
//! Scripts see a `TimeWrapper` object rather than a module: only the members
//! in the [`Owner::Clock`] table resolve. `sleep` really blocks the calling
//! thread and logs a process-wide warning the first time it is used.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Datelike, FixedOffset, NaiveDateTime, TimeDelta, Timelike};
use tracing::warn;

use crate::allowlist::Owner;
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::modules::datetime;
use crate::object::{Attr, ScriptObject, downcast};
use crate::value::{CallArgs, DateTimeValue, Value};

/// Set once the first `time.sleep` has been warned about.
static SLEEP_WARNED: AtomicBool = AtomicBool::new(false);

pub const SLEEP_WARNING: &str = "Using time.sleep can reduce the performance of Home Assistant";

const DEFAULT_STRPTIME_FORMAT: &str = "%a %b %d %H:%M:%S %Y";
const CTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

// ---------------------------------------------------------------------------
// struct_time
// ---------------------------------------------------------------------------

/// `time.struct_time`: a broken-down wall-clock time.
pub struct StructTime {
    naive: NaiveDateTime,
    offset: Option<FixedOffset>,
    isdst: i64,
}

impl StructTime {
    pub fn new(naive: NaiveDateTime, offset: Option<FixedOffset>, isdst: i64) -> Self {
        Self {
            naive,
            offset,
            isdst,
        }
    }

    fn fields(&self) -> [(&'static str, i64); 9] {
        let n = &self.naive;
        [
            ("tm_year", i64::from(n.year())),
            ("tm_mon", i64::from(n.month())),
            ("tm_mday", i64::from(n.day())),
            ("tm_hour", i64::from(n.hour())),
            ("tm_min", i64::from(n.minute())),
            ("tm_sec", i64::from(n.second())),
            ("tm_wday", i64::from(n.weekday().num_days_from_monday())),
            ("tm_yday", i64::from(n.ordinal())),
            ("tm_isdst", self.isdst),
        ]
    }
}

impl ScriptObject for StructTime {
    fn type_name(&self) -> &str {
        "time.struct_time"
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        if let Some((_, value)) = self.fields().iter().find(|(field, _)| *field == name) {
            return Some(Attr::Value(Value::Int(*value)));
        }
        match name {
            "tm_zone" => Some(Attr::Value(
                self.offset
                    .map_or(Value::None, |o| Value::from(zone_abbreviation(o))),
            )),
            "tm_gmtoff" => Some(Attr::Value(
                self.offset
                    .map_or(Value::None, |o| Value::Int(i64::from(o.local_minus_utc()))),
            )),
            _ => None,
        }
    }

    fn get_item(&self, key: &Value) -> Result<Value> {
        crate::ops::get_item(&Value::tuple(self.iterate().unwrap_or_default()), key)
    }

    fn iterate(&self) -> Option<Vec<Value>> {
        Some(self.fields().iter().map(|(_, v)| Value::Int(*v)).collect())
    }

    fn repr(&self) -> String {
        let parts: Vec<String> = self
            .fields()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        format!("time.struct_time({})", parts.join(", "))
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        Some(self.fields().iter().map(|(_, v)| serde_json::json!(v)).collect())
    }

    fn equals(&self, other: &dyn ScriptObject) -> bool {
        other
            .as_any()
            .downcast_ref::<StructTime>()
            .is_some_and(|o| o.fields() == self.fields())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn zone_abbreviation(offset: FixedOffset) -> String {
    if offset.local_minus_utc() == 0 {
        "UTC".to_string()
    } else {
        datetime::offset_text(offset, false)
    }
}

/// Wall-clock time described by a `struct_time` or a 9-tuple.
fn struct_arg(value: &Value) -> Result<NaiveDateTime> {
    if let Some(st) = downcast::<StructTime>(value) {
        return Ok(st.naive);
    }
    let items = match value {
        Value::Tuple(_) | Value::List(_) => value.sequence_items().unwrap_or_default(),
        other => {
            return Err(SandboxError::type_error(format!(
                "Tuple or struct_time argument required, not {}",
                other.type_name()
            )));
        }
    };
    if items.len() != 9 {
        return Err(SandboxError::type_error(format!(
            "time tuple must have exactly 9 elements, not {}",
            items.len()
        )));
    }
    let field = |i: usize| items[i].as_int();
    let date = datetime::build_date(field(0)?, field(1)?, field(2)?)?;
    let time = datetime::build_time(field(3)?, field(4)?, field(5)?.min(59), 0)?;
    Ok(date.and_time(time))
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

fn seconds_arg(args: &CallArgs, func: &str) -> Result<Option<f64>> {
    args.expect(func, 0, 1)?;
    match args.get(0) {
        None | Some(Value::None) => Ok(None),
        Some(value) => value.as_float().map(Some),
    }
}

fn gmtime(seconds: Option<f64>) -> Result<StructTime> {
    let naive = match seconds {
        Some(ts) => datetime::from_timestamp(ts.floor())?,
        None => datetime::utc_now(),
    };
    Ok(StructTime::new(
        naive.with_nanosecond(0).unwrap_or(naive),
        Some(datetime::utc()),
        0,
    ))
}

fn localtime(seconds: Option<f64>) -> Result<StructTime> {
    let utc_naive = match seconds {
        Some(ts) => datetime::from_timestamp(ts.floor())?,
        None => datetime::utc_now(),
    };
    let offset = datetime::local_offset_at(&utc_naive);
    let naive = utc_naive + TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    Ok(StructTime::new(
        naive.with_nanosecond(0).unwrap_or(naive),
        Some(offset),
        0,
    ))
}

fn sleep(seconds: f64) -> Result<()> {
    if seconds < 0.0 {
        return Err(SandboxError::value_error("sleep length must be non-negative"));
    }
    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|_| SandboxError::exception("OverflowError", "sleep length is too large"))?;
    if !SLEEP_WARNED.swap(true, Ordering::SeqCst) {
        warn!("{SLEEP_WARNING}");
    }
    std::thread::sleep(duration);
    Ok(())
}

/// The object bound to `time`.
pub struct Clock;

impl Clock {
    fn dispatch(&self, name: &str, args: &CallArgs) -> Result<Value> {
        match name {
            "time" => {
                args.expect("time", 0, 0)?;
                let now = chrono::Utc::now();
                Ok(Value::Float(now.timestamp_micros() as f64 / 1e6))
            }
            "sleep" => {
                args.expect("sleep", 1, 1)?;
                sleep(args.positional[0].as_float()?)?;
                Ok(Value::None)
            }
            "gmtime" => gmtime(seconds_arg(args, "gmtime")?).map(Value::object),
            "localtime" => localtime(seconds_arg(args, "localtime")?).map(Value::object),
            "ctime" => {
                let st = localtime(seconds_arg(args, "ctime")?)?;
                datetime::strftime(&st.naive, None, CTIME_FORMAT).map(Value::from)
            }
            "mktime" => {
                args.expect("mktime", 1, 1)?;
                let naive = struct_arg(&args.positional[0])?;
                Ok(Value::Float(
                    datetime::timestamp(&DateTimeValue::naive(naive)).floor(),
                ))
            }
            "strftime" => {
                args.expect("strftime", 1, 2)?;
                let fmt = args.positional[0].as_str()?;
                let (naive, offset) = match args.get(1) {
                    Some(value) => {
                        let offset = downcast::<StructTime>(value).and_then(|st| st.offset);
                        (struct_arg(value)?, offset)
                    }
                    None => {
                        let st = localtime(None)?;
                        (st.naive, st.offset)
                    }
                };
                datetime::strftime(&naive, offset, fmt).map(Value::from)
            }
            "strptime" => {
                args.expect("strptime", 1, 2)?;
                let text = args.positional[0].as_str()?;
                let fmt = match args.get(1) {
                    Some(fmt) => fmt.as_str()?,
                    None => DEFAULT_STRPTIME_FORMAT,
                };
                let parsed = datetime::strptime(text, fmt)?;
                Ok(Value::object(StructTime::new(parsed.naive, parsed.offset, -1)))
            }
            other => Err(SandboxError::attribute_error(format!(
                "'TimeWrapper' object has no attribute '{other}'"
            ))),
        }
    }
}

impl ScriptObject for Clock {
    fn type_name(&self) -> &str {
        Owner::Clock.class_name()
    }

    fn owner(&self) -> Option<Owner> {
        Some(Owner::Clock)
    }

    fn attr(&self, name: &str) -> Option<Attr> {
        Owner::Clock.allowed().contains(&name).then_some(Attr::Method)
    }

    fn call_method(&self, _interp: &mut Interpreter, name: &str, args: CallArgs) -> Result<Value> {
        self.dispatch(name, &args)
    }

    fn repr(&self) -> String {
        "<TimeWrapper object>".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn module() -> Value {
    Value::object(Clock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn struct_time_fields_and_repr() {
        let st = StructTime::new(at(2024, 3, 5, 14, 7, 9), Some(datetime::utc()), 0);
        assert_eq!(
            st.repr(),
            "time.struct_time(tm_year=2024, tm_mon=3, tm_mday=5, tm_hour=14, tm_min=7, \
             tm_sec=9, tm_wday=1, tm_yday=65, tm_isdst=0)"
        );
        assert!(matches!(st.attr("tm_zone"), Some(Attr::Value(Value::Str(z))) if &*z == "UTC"));
        assert_eq!(st.iterate().unwrap().len(), 9);
    }

    #[test]
    fn gmtime_of_epoch() {
        let st = gmtime(Some(0.0)).unwrap();
        assert_eq!(st.naive, at(1970, 1, 1, 0, 0, 0));
        let st = gmtime(Some(86_400.9)).unwrap();
        assert_eq!(st.naive, at(1970, 1, 2, 0, 0, 0));
    }

    #[test]
    fn tuples_convert_to_wall_clock() {
        let tuple = Value::tuple((0..9).map(|i| Value::Int([2024, 6, 1, 12, 30, 0, 0, 0, 0][i])).collect());
        assert_eq!(struct_arg(&tuple).unwrap(), at(2024, 6, 1, 12, 30, 0));
        assert!(struct_arg(&Value::tuple(vec![Value::Int(1)])).is_err());
        assert!(struct_arg(&Value::Int(1)).is_err());
    }

    #[test]
    fn clock_functions() {
        let clock = Clock;
        let none = CallArgs::new(vec![]);
        assert!(matches!(clock.dispatch("time", &none), Ok(Value::Float(t)) if t > 1.6e9));
        let args = CallArgs::new(vec![Value::from("%Y"), Value::object(gmtime(Some(0.0)).unwrap())]);
        assert_eq!(clock.dispatch("strftime", &args).unwrap().to_str(), "1970");
        let args = CallArgs::new(vec![Value::from("2024-06-01"), Value::from("%Y-%m-%d")]);
        let parsed = clock.dispatch("strptime", &args).unwrap();
        assert_eq!(parsed.repr().split(", ").next(), Some("time.struct_time(tm_year=2024"));
        let err = clock
            .dispatch("sleep", &CallArgs::new(vec![Value::Int(-1)]))
            .unwrap_err();
        assert_eq!(err.to_string(), "ValueError: sleep length must be non-negative");
        assert!(clock.dispatch("sleep", &CallArgs::new(vec![Value::Float(0.0)])).is_ok());
    }

    #[test]
    fn only_allowlisted_members_resolve() {
        assert!(Clock.attr("sleep").is_some());
        assert!(Clock.attr("monotonic").is_none());
        assert_eq!(Clock.type_name(), "TimeWrapper");
    }
}
