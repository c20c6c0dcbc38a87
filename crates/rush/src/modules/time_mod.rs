//! Time, Duration and TimeZone values.
//!
//! A Time is nanoseconds since the Unix epoch plus the zone it is viewed in;
//! a Duration is a span in nanoseconds; a TimeZone is a name and a fixed
//! offset. `format` uses Go-style reference-date layouts
//! (`"2006-01-02 15:04:05"`), translated to chrono format strings.

use chrono::{DateTime, Datelike, FixedOffset, Local, Offset, Timelike, Utc};

use crate::{
    error::{RunError, RunResult},
    value::{Value, format_float},
};

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_MINUTE: i64 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

pub const TIME_METHODS: &[&str] = &[
    "format",
    "year",
    "month",
    "day",
    "hour",
    "minute",
    "second",
    "weekday",
    "unix",
    "zone",
    "add_duration",
    "subtract_duration",
    "difference",
    "is_before?",
    "is_after?",
    "is_equal?",
    "in_timezone",
];

pub const DURATION_METHODS: &[&str] = &[
    "total_seconds",
    "total_minutes",
    "total_hours",
    "total_milliseconds",
    "add",
    "subtract",
];

pub const TIMEZONE_METHODS: &[&str] = &["name", "offset_seconds"];

/// An instant: nanoseconds since the Unix epoch, viewed in `zone`.
#[derive(Debug, Clone)]
pub struct TimeValue {
    pub nanos: i64,
    pub zone: TimeZoneValue,
}

/// A named fixed-offset zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeZoneValue {
    pub name: String,
    pub offset_secs: i32,
}

impl TimeZoneValue {
    #[must_use]
    pub fn utc() -> Self {
        Self {
            name: "UTC".to_string(),
            offset_secs: 0,
        }
    }

    #[must_use]
    pub fn local() -> Self {
        let offset = Local::now().offset().fix().local_minus_utc();
        Self {
            name: "Local".to_string(),
            offset_secs: offset,
        }
    }

    fn fixed_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.offset_secs).unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"))
    }
}

impl TimeValue {
    #[must_use]
    pub fn new(nanos: i64, zone: TimeZoneValue) -> Self {
        Self { nanos, zone }
    }

    /// The instant as a zoned chrono value, for formatting and accessors.
    fn zoned(&self) -> DateTime<FixedOffset> {
        DateTime::from_timestamp_nanos(self.nanos).with_timezone(&self.zone.fixed_offset())
    }

    /// RFC 3339 rendering used by `inspect`.
    #[must_use]
    pub fn rfc3339(&self) -> String {
        self.zoned().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

fn expect_arity(args: &[Value], want: usize) -> RunResult<()> {
    if args.len() == want {
        Ok(())
    } else {
        Err(RunError::wrong_arity(want, args.len()))
    }
}

fn int_arg(name: &str, args: &[Value], index: usize) -> RunResult<i64> {
    match &args[index] {
        Value::Integer(n) => Ok(*n),
        other => Err(RunError::type_error(format!(
            "{name} argument must be INTEGER, got {}",
            other.type_name()
        ))),
    }
}

fn str_arg<'a>(name: &str, args: &'a [Value], index: usize) -> RunResult<&'a str> {
    match &args[index] {
        Value::Str(s) => Ok(s),
        other => Err(RunError::type_error(format!(
            "{name} argument must be STRING, got {}",
            other.type_name()
        ))),
    }
}

fn duration_arg(name: &str, args: &[Value], index: usize) -> RunResult<i64> {
    match &args[index] {
        Value::Duration(nanos) => Ok(*nanos),
        other => Err(RunError::type_error(format!(
            "{name} argument must be DURATION, got {}",
            other.type_name()
        ))),
    }
}

fn time_arg<'a>(name: &str, args: &'a [Value], index: usize) -> RunResult<&'a TimeValue> {
    match &args[index] {
        Value::Time(time) => Ok(time),
        other => Err(RunError::type_error(format!(
            "{name} argument must be TIME, got {}",
            other.type_name()
        ))),
    }
}

// ----- namespace constructors -----

/// `Time.now()`, `Time.parse(s)`, `Time.new(y, m, d[, h, mi, s])`.
pub fn call_time_namespace(name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "now" => {
            expect_arity(args, 0)?;
            let nanos = Utc::now().timestamp_nanos_opt().unwrap_or(0);
            Ok(Value::Time(std::rc::Rc::new(TimeValue::new(nanos, TimeZoneValue::utc()))))
        }
        "parse" => {
            expect_arity(args, 1)?;
            let text = str_arg("Time.parse", args, 0)?;
            parse_time(text)
        }
        "new" => {
            if args.len() != 3 && args.len() != 6 {
                return Err(RunError::wrong_arity(6, args.len()));
            }
            let year = int_arg("Time.new", args, 0)?;
            let month = int_arg("Time.new", args, 1)?;
            let day = int_arg("Time.new", args, 2)?;
            let (hour, minute, second) = if args.len() == 6 {
                (
                    int_arg("Time.new", args, 3)?,
                    int_arg("Time.new", args, 4)?,
                    int_arg("Time.new", args, 5)?,
                )
            } else {
                (0, 0, 0)
            };
            new_time(year, month, day, hour, minute, second)
        }
        other => Err(undefined_namespace_method("Time", other)),
    }
}

/// `Duration.seconds(n)` and friends. Integer or float argument.
pub fn call_duration_namespace(name: &str, args: &[Value]) -> RunResult<Value> {
    let per_unit = match name {
        "milliseconds" => NANOS_PER_MILLI,
        "seconds" => NANOS_PER_SECOND,
        "minutes" => NANOS_PER_MINUTE,
        "hours" => NANOS_PER_HOUR,
        "days" => NANOS_PER_DAY,
        other => return Err(undefined_namespace_method("Duration", other)),
    };
    expect_arity(args, 1)?;
    let nanos = match &args[0] {
        Value::Integer(n) => n.saturating_mul(per_unit),
        Value::Float(f) => (*f * per_unit as f64) as i64,
        other => {
            return Err(RunError::type_error(format!(
                "Duration.{name} argument must be INTEGER or FLOAT, got {}",
                other.type_name()
            )));
        }
    };
    Ok(Value::Duration(nanos))
}

/// `TimeZone.utc()`, `TimeZone.local()`, `TimeZone.new(name, offset_hours)`.
pub fn call_timezone_namespace(name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "utc" => {
            expect_arity(args, 0)?;
            Ok(Value::TimeZone(std::rc::Rc::new(TimeZoneValue::utc())))
        }
        "local" => {
            expect_arity(args, 0)?;
            Ok(Value::TimeZone(std::rc::Rc::new(TimeZoneValue::local())))
        }
        "new" => {
            expect_arity(args, 2)?;
            let zone_name = str_arg("TimeZone.new", args, 0)?;
            let offset_hours = int_arg("TimeZone.new", args, 1)?;
            if !(-23..=23).contains(&offset_hours) {
                return Err(RunError::validation_error(format!(
                    "invalid timezone offset: {offset_hours}"
                )));
            }
            Ok(Value::TimeZone(std::rc::Rc::new(TimeZoneValue {
                name: zone_name.to_string(),
                offset_secs: (offset_hours * 3600) as i32,
            })))
        }
        other => Err(undefined_namespace_method("TimeZone", other)),
    }
}

fn undefined_namespace_method(namespace: &str, name: &str) -> RunError {
    RunError::fatal(format!("undefined method {name} for {namespace}"))
}

fn parse_time(text: &str) -> RunResult<Value> {
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        let nanos = naive.and_utc().timestamp_nanos_opt().unwrap_or(0);
        return Ok(Value::Time(std::rc::Rc::new(TimeValue::new(nanos, TimeZoneValue::utc()))));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        let nanos = parsed.timestamp_nanos_opt().unwrap_or(0);
        let zone = TimeZoneValue {
            name: "UTC".to_string(),
            offset_secs: parsed.offset().local_minus_utc(),
        };
        return Ok(Value::Time(std::rc::Rc::new(TimeValue::new(nanos, zone))));
    }
    Err(RunError::validation_error(format!("invalid time: {text}")))
}

fn new_time(year: i64, month: i64, day: i64, hour: i64, minute: i64, second: i64) -> RunResult<Value> {
    let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .ok_or_else(|| RunError::validation_error(format!("invalid date: {year:04}-{month:02}-{day:02}")))?;
    let time = chrono::NaiveTime::from_hms_opt(hour as u32, minute as u32, second as u32)
        .ok_or_else(|| RunError::validation_error(format!("invalid time: {hour:02}:{minute:02}:{second:02}")))?;
    let nanos = date.and_time(time).and_utc().timestamp_nanos_opt().unwrap_or(0);
    Ok(Value::Time(std::rc::Rc::new(TimeValue::new(nanos, TimeZoneValue::utc()))))
}

// ----- receiver methods -----

pub fn call_time_method(time: &TimeValue, name: &str, args: &[Value]) -> RunResult<Value> {
    let zoned = time.zoned();
    match name {
        "format" => {
            expect_arity(args, 1)?;
            let layout = str_arg("format", args, 0)?;
            Ok(Value::string(zoned.format(&go_layout_to_chrono(layout)).to_string()))
        }
        "year" => Ok(Value::Integer(i64::from(zoned.year()))),
        "month" => Ok(Value::Integer(i64::from(zoned.month()))),
        "day" => Ok(Value::Integer(i64::from(zoned.day()))),
        "hour" => Ok(Value::Integer(i64::from(zoned.hour()))),
        "minute" => Ok(Value::Integer(i64::from(zoned.minute()))),
        "second" => Ok(Value::Integer(i64::from(zoned.second()))),
        "weekday" => Ok(Value::string(weekday_name(zoned.weekday()))),
        "unix" => Ok(Value::Integer(time.nanos.div_euclid(NANOS_PER_SECOND))),
        "zone" => Ok(Value::TimeZone(std::rc::Rc::new(time.zone.clone()))),
        "add_duration" => {
            expect_arity(args, 1)?;
            let nanos = duration_arg("add_duration", args, 0)?;
            Ok(Value::Time(std::rc::Rc::new(TimeValue::new(
                time.nanos.saturating_add(nanos),
                time.zone.clone(),
            ))))
        }
        "subtract_duration" => {
            expect_arity(args, 1)?;
            let nanos = duration_arg("subtract_duration", args, 0)?;
            Ok(Value::Time(std::rc::Rc::new(TimeValue::new(
                time.nanos.saturating_sub(nanos),
                time.zone.clone(),
            ))))
        }
        "difference" => {
            expect_arity(args, 1)?;
            let other = time_arg("difference", args, 0)?;
            Ok(Value::Duration(time.nanos.saturating_sub(other.nanos)))
        }
        "is_before?" => {
            expect_arity(args, 1)?;
            let other = time_arg("is_before?", args, 0)?;
            Ok(Value::Boolean(time.nanos < other.nanos))
        }
        "is_after?" => {
            expect_arity(args, 1)?;
            let other = time_arg("is_after?", args, 0)?;
            Ok(Value::Boolean(time.nanos > other.nanos))
        }
        "is_equal?" => {
            expect_arity(args, 1)?;
            let other = time_arg("is_equal?", args, 0)?;
            Ok(Value::Boolean(time.nanos == other.nanos))
        }
        "in_timezone" => {
            expect_arity(args, 1)?;
            match &args[0] {
                Value::TimeZone(zone) => Ok(Value::Time(std::rc::Rc::new(TimeValue::new(
                    time.nanos,
                    (**zone).clone(),
                )))),
                other => Err(RunError::type_error(format!(
                    "in_timezone argument must be TIMEZONE, got {}",
                    other.type_name()
                ))),
            }
        }
        other => Err(RunError::fatal(format!("undefined method {other} for TIME"))),
    }
}

pub fn call_duration_method(nanos: i64, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "total_seconds" => {
            expect_arity(args, 0)?;
            Ok(Value::Float(nanos as f64 / NANOS_PER_SECOND as f64))
        }
        "total_minutes" => {
            expect_arity(args, 0)?;
            Ok(Value::Float(nanos as f64 / NANOS_PER_MINUTE as f64))
        }
        "total_hours" => {
            expect_arity(args, 0)?;
            Ok(Value::Float(nanos as f64 / NANOS_PER_HOUR as f64))
        }
        "total_milliseconds" => {
            expect_arity(args, 0)?;
            Ok(Value::Float(nanos as f64 / NANOS_PER_MILLI as f64))
        }
        "add" => {
            expect_arity(args, 1)?;
            let other = duration_arg("add", args, 0)?;
            Ok(Value::Duration(nanos.saturating_add(other)))
        }
        "subtract" => {
            expect_arity(args, 1)?;
            let other = duration_arg("subtract", args, 0)?;
            Ok(Value::Duration(nanos.saturating_sub(other)))
        }
        other => Err(RunError::fatal(format!("undefined method {other} for DURATION"))),
    }
}

pub fn call_timezone_method(zone: &TimeZoneValue, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "name" => {
            expect_arity(args, 0)?;
            Ok(Value::string(&zone.name))
        }
        "offset_seconds" => {
            expect_arity(args, 0)?;
            Ok(Value::Integer(i64::from(zone.offset_secs)))
        }
        other => Err(RunError::fatal(format!("undefined method {other} for TIMEZONE"))),
    }
}

fn weekday_name(weekday: chrono::Weekday) -> &'static str {
    match weekday {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

/// Translates a Go reference-date layout into a chrono format string.
///
/// Longest components are matched first so `2006` wins over `06` and
/// `January` over `Jan`. Unrecognized bytes pass through literally, with `%`
/// escaped.
fn go_layout_to_chrono(layout: &str) -> String {
    const COMPONENTS: &[(&str, &str)] = &[
        ("January", "%B"),
        ("Monday", "%A"),
        ("-07:00", "%:z"),
        ("-0700", "%z"),
        ("2006", "%Y"),
        (".000", "%.3f"),
        ("Jan", "%b"),
        ("Mon", "%a"),
        ("MST", "%Z"),
        ("15", "%H"),
        ("01", "%m"),
        ("02", "%d"),
        ("03", "%I"),
        ("04", "%M"),
        ("05", "%S"),
        ("06", "%y"),
        ("PM", "%p"),
        ("pm", "%P"),
    ];

    let mut out = String::with_capacity(layout.len() + 8);
    let bytes = layout.as_bytes();
    let mut i = 0;
    'outer: while i < bytes.len() {
        for (go, chrono_fmt) in COMPONENTS {
            if layout[i..].starts_with(go) {
                out.push_str(chrono_fmt);
                i += go.len();
                continue 'outer;
            }
        }
        let ch = layout[i..].chars().next().expect("in-bounds char");
        if ch == '%' {
            out.push_str("%%");
        } else {
            out.push(ch);
        }
        i += ch.len_utf8();
    }
    out
}

/// Go-style rendering of a duration, used by `inspect`.
#[must_use]
pub fn format_duration(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_string();
    }
    let sign = if nanos < 0 { "-" } else { "" };
    let n = nanos.unsigned_abs() as i64;

    if n < NANOS_PER_SECOND {
        let (divisor, unit) = if n < 1_000 {
            (1, "ns")
        } else if n < NANOS_PER_MILLI {
            (1_000, "µs")
        } else {
            (NANOS_PER_MILLI, "ms")
        };
        return format!("{sign}{}{unit}", format_float(n as f64 / divisor as f64));
    }

    let hours = n / NANOS_PER_HOUR;
    let minutes = (n % NANOS_PER_HOUR) / NANOS_PER_MINUTE;
    let seconds = (n % NANOS_PER_MINUTE) as f64 / NANOS_PER_SECOND as f64;
    let seconds = format_float(seconds);
    if hours > 0 {
        format!("{sign}{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{sign}{minutes}m{seconds}s")
    } else {
        format!("{sign}{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_layout_translation() {
        assert_eq!(go_layout_to_chrono("2006-01-02 15:04:05"), "%Y-%m-%d %H:%M:%S");
        assert_eq!(go_layout_to_chrono("02 Jan 2006"), "%d %b %Y");
    }

    #[test]
    fn format_uses_reference_date() {
        let time = match parse_time("2024-03-05 06:07:08").unwrap() {
            Value::Time(t) => t,
            other => panic!("expected time, got {other:?}"),
        };
        let formatted = call_time_method(&time, "format", &[Value::string("2006-01-02 15:04:05")]).unwrap();
        assert_eq!(formatted.inspect(), "2024-03-05 06:07:08");
    }

    #[test]
    fn duration_constructors_and_totals() {
        let duration = call_duration_namespace("minutes", &[Value::Integer(2)]).unwrap();
        let Value::Duration(nanos) = duration else {
            panic!("expected duration");
        };
        assert_eq!(nanos, 2 * NANOS_PER_MINUTE);
        let total = call_duration_method(nanos, "total_seconds", &[]).unwrap();
        assert!(matches!(total, Value::Float(f) if (f - 120.0).abs() < f64::EPSILON));
    }

    #[test]
    fn duration_rendering() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(NANOS_PER_SECOND / 2), "500ms");
        assert_eq!(format_duration(90 * NANOS_PER_SECOND), "1m30s");
        assert_eq!(format_duration(NANOS_PER_HOUR + 30 * NANOS_PER_MINUTE), "1h30m0s");
    }

    #[test]
    fn time_comparisons_and_arithmetic() {
        let Value::Time(early) = parse_time("2024-01-01 00:00:00").unwrap() else {
            panic!("time");
        };
        let Value::Time(late) = parse_time("2024-01-01 00:00:30").unwrap() else {
            panic!("time");
        };
        let before = call_time_method(&early, "is_before?", &[Value::Time(late.clone())]).unwrap();
        assert!(matches!(before, Value::Boolean(true)));
        let diff = call_time_method(&late, "difference", &[Value::Time(early)]).unwrap();
        assert!(matches!(diff, Value::Duration(n) if n == 30 * NANOS_PER_SECOND));
    }
}
