//! `dt_util`: timezone-aware date helpers.
//!
//! Every datetime produced here is aware. Naive inputs are taken to be in
//! the host's local zone.

use chrono::{FixedOffset, NaiveTime, TimeDelta};

use crate::allowlist::Owner;
use crate::error::{Result, SandboxError};
use crate::interpreter::Interpreter;
use crate::modules::datetime::{self, astimezone, offset_arg};
use crate::object::Module;
use crate::value::{Builtin, CallArgs, DateTimeValue, Value};

const AGE_UNITS: [&str; 5] = ["second", "minute", "hour", "day", "month"];
const AGE_FACTORS: [f64; 5] = [60.0, 60.0, 24.0, 30.0, 12.0];

fn datetime_arg(args: &CallArgs, func: &str, index: usize, name: &str) -> Result<DateTimeValue> {
    match args.required(func, index, name)? {
        Value::DateTime(dt) => Ok(*dt),
        other => Err(SandboxError::type_error(format!(
            "{func}() argument must be datetime, not {}",
            other.type_name()
        ))),
    }
}

fn zone_arg(args: &CallArgs, index: usize, name: &str) -> Result<Option<FixedOffset>> {
    match args.arg(index, name) {
        Some(value) => offset_arg(value),
        None => Ok(None),
    }
}

fn local_now() -> DateTimeValue {
    astimezone(&DateTimeValue::aware(datetime::utc_now(), datetime::utc()), None)
}

/// Make `dt` aware, reading naive values as local time.
fn localize(dt: &DateTimeValue) -> DateTimeValue {
    match dt.offset {
        Some(_) => *dt,
        None => DateTimeValue::aware(dt.naive, datetime::local_offset_for(&dt.naive)),
    }
}

fn utcnow(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("utcnow", 0, 0)?;
    Ok(Value::DateTime(DateTimeValue::aware(
        datetime::utc_now(),
        datetime::utc(),
    )))
}

fn now(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("now", 0, 1)?;
    let zone = zone_arg(&args, 0, "time_zone")?;
    Ok(Value::DateTime(match zone {
        Some(offset) => datetime::now(Some(offset)),
        None => local_now(),
    }))
}

fn as_utc(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("as_utc", 1, 1)?;
    let dt = localize(&datetime_arg(&args, "as_utc", 0, "dattim")?);
    Ok(Value::DateTime(astimezone(&dt, Some(datetime::utc()))))
}

fn as_local(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("as_local", 1, 1)?;
    let dt = localize(&datetime_arg(&args, "as_local", 0, "dattim")?);
    Ok(Value::DateTime(astimezone(&dt, None)))
}

fn as_timestamp(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("as_timestamp", 1, 1)?;
    let dt = match &args.positional[0] {
        Value::DateTime(dt) => *dt,
        Value::Str(text) => datetime::parse_iso(text)
            .ok_or_else(|| SandboxError::value_error("not a valid date time."))?,
        other => {
            return Err(SandboxError::type_error(format!(
                "as_timestamp() argument must be datetime or str, not {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Float(datetime::timestamp(&localize(&dt))))
}

fn utc_from_timestamp(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("utc_from_timestamp", 1, 1)?;
    let naive = datetime::from_timestamp(args.positional[0].as_float()?)?;
    Ok(Value::DateTime(DateTimeValue::aware(naive, datetime::utc())))
}

fn start_of_local_day(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("start_of_local_day", 0, 1)?;
    let date = match args.arg(0, "dt_or_d") {
        None | Some(Value::None) => local_now().naive.date(),
        Some(Value::Date(d)) => *d,
        Some(Value::DateTime(dt)) => dt.naive.date(),
        Some(other) => {
            return Err(SandboxError::type_error(format!(
                "start_of_local_day() argument must be date or datetime, not {}",
                other.type_name()
            )));
        }
    };
    let midnight = date.and_time(NaiveTime::MIN);
    Ok(Value::DateTime(DateTimeValue::aware(
        midnight,
        datetime::local_offset_for(&midnight),
    )))
}

fn parse_datetime(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("parse_datetime", 1, 1)?;
    let text = args.positional[0].as_str()?;
    Ok(datetime::parse_iso(text).map_or(Value::None, Value::DateTime))
}

fn parse_date(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("parse_date", 1, 1)?;
    let text = args.positional[0].as_str()?;
    Ok(datetime::parse_iso_date(text).map_or(Value::None, Value::Date))
}

/// Human-readable age of `seconds`, e.g. `"3 hours"`.
pub fn describe_age(seconds: f64) -> String {
    let mut delta = seconds;
    let mut rounded = delta.round_ties_even();
    let mut unit = "year";
    for (name, factor) in AGE_UNITS.into_iter().zip(AGE_FACTORS) {
        if rounded < factor {
            unit = name;
            break;
        }
        delta /= factor;
        rounded = delta.round_ties_even();
    }
    let count = rounded as i64;
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

fn get_age(_interp: &mut Interpreter, args: CallArgs) -> Result<Value> {
    args.expect("get_age", 1, 1)?;
    let then = datetime_arg(&args, "get_age", 0, "date")?;
    let Some(then_utc) = then.utc_instant() else {
        return Err(SandboxError::type_error(
            "can't subtract offset-naive and offset-aware datetimes",
        ));
    };
    let elapsed: TimeDelta = datetime::utc_now() - then_utc;
    let seconds = elapsed.num_microseconds().map_or(elapsed.num_seconds() as f64, |us| us as f64 / 1e6);
    Ok(Value::from(describe_age(seconds)))
}

/// The `dt_util` namespace object.
pub fn module() -> Value {
    Value::object(
        Module::new(
            "dt_util",
            vec![
                ("utcnow", Builtin::new("utcnow", utcnow)),
                ("now", Builtin::new("now", now)),
                ("as_utc", Builtin::new("as_utc", as_utc)),
                ("as_timestamp", Builtin::new("as_timestamp", as_timestamp)),
                ("as_local", Builtin::new("as_local", as_local)),
                (
                    "utc_from_timestamp",
                    Builtin::new("utc_from_timestamp", utc_from_timestamp),
                ),
                (
                    "start_of_local_day",
                    Builtin::new("start_of_local_day", start_of_local_day),
                ),
                ("parse_datetime", Builtin::new("parse_datetime", parse_datetime)),
                ("parse_date", Builtin::new("parse_date", parse_date)),
                ("get_age", Builtin::new("get_age", get_age)),
            ],
        )
        .with_owner(Owner::DtUtil),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::downcast;

    #[test]
    fn ages_pick_the_largest_whole_unit() {
        assert_eq!(describe_age(1.0), "1 second");
        assert_eq!(describe_age(45.0), "45 seconds");
        assert_eq!(describe_age(90.0), "2 minutes");
        assert_eq!(describe_age(3.0 * 3600.0), "3 hours");
        assert_eq!(describe_age(86_400.0), "1 day");
        assert_eq!(describe_age(40.0 * 86_400.0), "1 month");
        assert_eq!(describe_age(400.0 * 86_400.0), "1 year");
    }

    #[test]
    fn namespace_matches_the_allowlist() {
        let module = module();
        let namespace = downcast::<Module>(&module).unwrap();
        assert_eq!(namespace.owner, Some(Owner::DtUtil));
        for name in Owner::DtUtil.allowed() {
            assert!(namespace.member(name).is_some(), "missing {name}");
        }
        assert_eq!(namespace.members.len(), Owner::DtUtil.allowed().len());
    }

    #[test]
    fn localize_keeps_aware_values() {
        let aware = DateTimeValue::aware(datetime::utc_now(), datetime::utc());
        assert_eq!(localize(&aware), aware);
        let naive = DateTimeValue::naive(datetime::utc_now());
        assert!(localize(&naive).offset.is_some());
    }
}
