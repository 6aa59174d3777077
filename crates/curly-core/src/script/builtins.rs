//! Global object and the built-in methods of each value type.
//!
//! Method tables are built once and shared; natives receive `this` as their
//! first argument. Anything read from a shared array or object is cloned out
//! of its lock before a callback runs.

use super::eval::current_max_depth;
use super::EvalError;
use crate::value::{join_array, number_to_string, string_to_number, Properties, Value};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use parking_lot::RwLock;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value as JsonValue;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

type NativeResult = Result<Value, EvalError>;

/// Largest representable time value, in milliseconds.
const MAX_TIME: f64 = 8.64e15;

static STRING_METHODS: OnceLock<Properties> = OnceLock::new();
static NUMBER_METHODS: OnceLock<Properties> = OnceLock::new();
static ARRAY_METHODS: OnceLock<Properties> = OnceLock::new();
static REGEXP_METHODS: OnceLock<Properties> = OnceLock::new();
static DATE_METHODS: OnceLock<Properties> = OnceLock::new();
static OBJECT_METHODS: OnceLock<Properties> = OnceLock::new();
static FLOAT_PREFIX: OnceLock<Regex> = OnceLock::new();

fn float_prefix_regex() -> &'static Regex {
    FLOAT_PREFIX.get_or_init(|| {
        Regex::new(r"^[+-]?(?:Infinity|[0-9]+\.?[0-9]*(?:[eE][+-]?[0-9]+)?|\.[0-9]+(?:[eE][+-]?[0-9]+)?)")
            .expect("Invalid float prefix regex")
    })
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// ToIntegerOrInfinity.
fn to_integer(value: &Value) -> f64 {
    let n = value.to_number();
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolve a possibly negative index against `len`, `default` when absent.
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        None | Some(Value::Undefined) => default,
        Some(v) => {
            let n = to_integer(v);
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                n.min(len as f64) as usize
            }
        }
    }
}

fn methods<const N: usize>(entries: [(&str, Value); N]) -> Properties {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn native<F>(name: &str, f: F) -> (&str, Value)
where
    F: Fn(&Value, &[Value]) -> NativeResult + Send + Sync + 'static,
{
    (name, Value::function(name, f))
}

/// UTF-16 code unit at `index`, as a one-unit string.
pub(crate) fn char_at(s: &str, index: usize) -> Option<String> {
    s.encode_utf16()
        .nth(index)
        .map(|unit| String::from_utf16_lossy(&[unit]))
}

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn find_units(haystack: &[u16], needle: &[u16], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..haystack.len())
        .take_while(|i| i + needle.len() <= haystack.len())
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn rfind_units(haystack: &[u16], needle: &[u16]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..i + needle.len()] == *needle)
}

// ---------------------------------------------------------------------------
// String
// ---------------------------------------------------------------------------

pub(crate) fn string_methods() -> &'static Properties {
    STRING_METHODS.get_or_init(|| {
        methods([
            native("charAt", |this, args| {
                let index = to_integer(&arg(args, 0));
                let found = (index >= 0.0)
                    .then(|| char_at(&this.to_string(), index as usize))
                    .flatten();
                Ok(Value::string(found.unwrap_or_default()))
            }),
            native("indexOf", |this, args| {
                let hay = units(&this.to_string());
                let needle = units(&arg(args, 0).to_string());
                let from = relative_index(args.get(1), hay.len(), 0);
                Ok(Value::Number(find_units(&hay, &needle, from).map_or(-1.0, |i| i as f64)))
            }),
            native("lastIndexOf", |this, args| {
                let hay = units(&this.to_string());
                let needle = units(&arg(args, 0).to_string());
                Ok(Value::Number(rfind_units(&hay, &needle).map_or(-1.0, |i| i as f64)))
            }),
            native("includes", |this, args| {
                let hay = units(&this.to_string());
                let needle = units(&arg(args, 0).to_string());
                Ok(Value::Bool(find_units(&hay, &needle, 0).is_some()))
            }),
            native("startsWith", |this, args| {
                Ok(Value::Bool(this.to_string().starts_with(&arg(args, 0).to_string())))
            }),
            native("endsWith", |this, args| {
                Ok(Value::Bool(this.to_string().ends_with(&arg(args, 0).to_string())))
            }),
            native("slice", |this, args| {
                let s = units(&this.to_string());
                let start = relative_index(args.first(), s.len(), 0);
                let end = relative_index(args.get(1), s.len(), s.len());
                Ok(Value::string(if start < end {
                    String::from_utf16_lossy(&s[start..end])
                } else {
                    String::new()
                }))
            }),
            native("substring", |this, args| {
                let s = units(&this.to_string());
                let clamp = |v: Option<&Value>, default: usize| match v {
                    None | Some(Value::Undefined) => default,
                    Some(v) => to_integer(v).clamp(0.0, s.len() as f64) as usize,
                };
                let (a, b) = (clamp(args.first(), 0), clamp(args.get(1), s.len()));
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                Ok(Value::string(String::from_utf16_lossy(&s[start..end])))
            }),
            native("toUpperCase", |this, _| Ok(Value::string(this.to_string().to_uppercase()))),
            native("toLowerCase", |this, _| Ok(Value::string(this.to_string().to_lowercase()))),
            native("trim", |this, _| Ok(Value::string(this.to_string().trim()))),
            native("split", split),
            native("replace", replace),
            native("concat", |this, args| {
                let mut out = this.to_string();
                for a in args {
                    out.push_str(&a.to_string());
                }
                Ok(Value::string(out))
            }),
            native("repeat", |this, args| {
                let count = to_integer(&arg(args, 0));
                if count < 0.0 || count.is_infinite() {
                    return Err(EvalError::Range(format!("Invalid count value: {}", number_to_string(count))));
                }
                Ok(Value::string(this.to_string().repeat(count as usize)))
            }),
            native("toString", |this, _| Ok(Value::string(this.to_string()))),
            native("valueOf", |this, _| Ok(this.clone())),
        ])
    })
}

fn split(this: &Value, args: &[Value]) -> NativeResult {
    let s = this.to_string();
    let limit = match args.get(1) {
        None | Some(Value::Undefined) => usize::MAX,
        Some(v) => v.to_number().max(0.0) as usize,
    };
    let parts: Vec<Value> = match args.first() {
        None | Some(Value::Undefined) => vec![Value::string(s)],
        Some(Value::RegExp(re)) => re.regex.split(&s).map(Value::from).collect(),
        Some(sep) => {
            let sep = sep.to_string();
            if sep.is_empty() {
                s.encode_utf16()
                    .map(|u| Value::string(String::from_utf16_lossy(&[u])))
                    .collect()
            } else {
                s.split(sep.as_str()).map(Value::from).collect()
            }
        }
    };
    Ok(Value::array(parts.into_iter().take(limit).collect()))
}

fn replace(this: &Value, args: &[Value]) -> NativeResult {
    let s = this.to_string();
    let replacement = arg(args, 1);
    let (regex, global) = match args.first() {
        Some(Value::RegExp(re)) => (re.regex.clone(), re.is_global()),
        other => {
            let literal = other.cloned().unwrap_or_default().to_string();
            let regex = Regex::new(&regex::escape(&literal))
                .map_err(|e| EvalError::syntax(e.to_string(), 0))?;
            (regex, false)
        }
    };

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in regex.captures_iter(&s) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&s[last..whole.start()]);
        match &replacement {
            Value::Function(f) => {
                let mut call_args: Vec<Value> = caps
                    .iter()
                    .map(|g| g.map_or(Value::Undefined, |m| Value::from(m.as_str())))
                    .collect();
                call_args.push(Value::Number(s[..whole.start()].encode_utf16().count() as f64));
                call_args.push(Value::string(s.clone()));
                out.push_str(&f.call(&Value::Undefined, &call_args)?.to_string());
            }
            other => out.push_str(&expand_replacement(&other.to_string(), &caps)),
        }
        last = whole.end();
        if !global {
            break;
        }
    }
    out.push_str(&s[last..]);
    Ok(Value::string(out))
}

/// Expand `$$`, `$&` and `$1`..`$99` in a replacement string.
fn expand_replacement(template: &str, caps: &Captures) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < template.len() {
        if bytes[i] != b'$' || i + 1 >= template.len() {
            let ch = template[i..].chars().next().unwrap_or('$');
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }
        match bytes[i + 1] {
            b'$' => {
                out.push('$');
                i += 2;
            }
            b'&' => {
                out.push_str(caps.get(0).map_or("", |m| m.as_str()));
                i += 2;
            }
            d if d.is_ascii_digit() && d != b'0' => {
                let one = usize::from(d - b'0');
                let two = bytes
                    .get(i + 2)
                    .filter(|c| c.is_ascii_digit())
                    .map(|c| one * 10 + usize::from(c - b'0'))
                    .filter(|&n| n < caps.len());
                let (group, width) = match two {
                    Some(n) => (n, 3),
                    None => (one, 2),
                };
                if group < caps.len() {
                    out.push_str(caps.get(group).map_or("", |m| m.as_str()));
                } else {
                    out.push_str(&template[i..i + width]);
                }
                i += width;
            }
            _ => {
                out.push('$');
                i += 1;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Number
// ---------------------------------------------------------------------------

pub(crate) fn number_methods() -> &'static Properties {
    NUMBER_METHODS.get_or_init(|| {
        methods([
            native("toFixed", |this, args| {
                let digits = to_integer(&arg(args, 0));
                if !(0.0..=100.0).contains(&digits) {
                    return Err(EvalError::Range("toFixed() digits argument must be between 0 and 100".to_string()));
                }
                Ok(Value::string(to_fixed(this.to_number(), digits as usize)))
            }),
            native("toString", |this, args| {
                let radix = match args.first() {
                    None | Some(Value::Undefined) => 10.0,
                    Some(v) => to_integer(v),
                };
                if !(2.0..=36.0).contains(&radix) {
                    return Err(EvalError::Range("toString() radix must be between 2 and 36".to_string()));
                }
                Ok(Value::string(to_radix(this.to_number(), radix as u32)))
            }),
            native("valueOf", |this, _| Ok(Value::Number(this.to_number()))),
        ])
    })
}

fn to_fixed(n: f64, digits: usize) -> String {
    if !n.is_finite() || n.abs() >= 1e21 {
        return number_to_string(n);
    }
    let scale = 10f64.powi(digits as i32);
    let rounded = (n.abs() * scale).round() / scale;
    let sign = if n < 0.0 && rounded != 0.0 { "-" } else { "" };
    format!("{}{:.*}", sign, digits, rounded)
}

fn to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() {
        return number_to_string(n);
    }
    let base = f64::from(radix);
    let mut int = n.abs().trunc();
    let mut frac = n.abs().fract();

    let mut digits = Vec::new();
    while int >= 1.0 {
        let d = (int % base) as u32;
        digits.push(char::from_digit(d, radix).unwrap_or('0'));
        int = (int / base).trunc();
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if n < 0.0 {
        digits.push('-');
    }
    let mut out: String = digits.into_iter().rev().collect();

    if frac > 0.0 {
        out.push('.');
        for _ in 0..52 {
            frac *= base;
            let d = frac.trunc() as u32;
            out.push(char::from_digit(d, radix).unwrap_or('0'));
            frac -= f64::from(d);
            if frac <= 0.0 {
                break;
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Array
// ---------------------------------------------------------------------------

fn this_array(this: &Value, method: &str) -> Result<Arc<RwLock<Vec<Value>>>, EvalError> {
    match this {
        Value::Array(items) => Ok(Arc::clone(items)),
        _ => Err(EvalError::Type(format!(
            "Array.prototype.{} called on incompatible receiver",
            method
        ))),
    }
}

/// `callback(item, index, array)` over a snapshot of the array.
fn each<F>(this: &Value, args: &[Value], method: &str, mut f: F) -> Result<(), EvalError>
where
    F: FnMut(&Value, Value) -> Result<bool, EvalError>,
{
    let items = this_array(this, method)?.read().clone();
    let callback = arg(args, 0);
    if !matches!(callback, Value::Function(_)) {
        return Err(EvalError::Type(format!("{} is not a function", callback)));
    }
    let this_arg = arg(args, 1);
    for (i, item) in items.into_iter().enumerate() {
        let result = callback.call(&this_arg, &[item.clone(), Value::from(i), this.clone()])?;
        if !f(&item, result)? {
            break;
        }
    }
    Ok(())
}

pub(crate) fn array_methods() -> &'static Properties {
    ARRAY_METHODS.get_or_init(|| {
        methods([
            native("join", |this, args| {
                let items = this_array(this, "join")?;
                let separator = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(v) => v.to_string(),
                };
                Ok(Value::string(join_array(&items, &separator)))
            }),
            native("toString", |this, _| {
                Ok(Value::string(join_array(&this_array(this, "toString")?, ",")))
            }),
            native("push", |this, args| {
                let items = this_array(this, "push")?;
                let mut items = items.write();
                items.extend_from_slice(args);
                Ok(Value::from(items.len()))
            }),
            native("pop", |this, _| Ok(this_array(this, "pop")?.write().pop().unwrap_or_default())),
            native("shift", |this, _| {
                let items = this_array(this, "shift")?;
                let mut items = items.write();
                Ok(if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                })
            }),
            native("slice", |this, args| {
                let items = this_array(this, "slice")?.read().clone();
                let start = relative_index(args.first(), items.len(), 0);
                let end = relative_index(args.get(1), items.len(), items.len());
                Ok(Value::array(if start < end { items[start..end].to_vec() } else { Vec::new() }))
            }),
            native("concat", |this, args| {
                let mut out = this_array(this, "concat")?.read().clone();
                for a in args {
                    match a {
                        Value::Array(more) => out.extend(more.read().iter().cloned()),
                        other => out.push(other.clone()),
                    }
                }
                Ok(Value::array(out))
            }),
            native("indexOf", |this, args| {
                let needle = arg(args, 0);
                let items = this_array(this, "indexOf")?.read().clone();
                Ok(Value::Number(
                    items
                        .iter()
                        .position(|v| v.strict_equals(&needle))
                        .map_or(-1.0, |i| i as f64),
                ))
            }),
            native("includes", |this, args| {
                let needle = arg(args, 0);
                let is_nan = matches!(needle, Value::Number(n) if n.is_nan());
                let items = this_array(this, "includes")?.read().clone();
                Ok(Value::Bool(items.iter().any(|v| {
                    v.strict_equals(&needle) || (is_nan && matches!(v, Value::Number(n) if n.is_nan()))
                })))
            }),
            native("reverse", |this, _| {
                this_array(this, "reverse")?.write().reverse();
                Ok(this.clone())
            }),
            native("map", |this, args| {
                let mut out = Vec::new();
                each(this, args, "map", |_, result| {
                    out.push(result);
                    Ok(true)
                })?;
                Ok(Value::array(out))
            }),
            native("filter", |this, args| {
                let mut out = Vec::new();
                each(this, args, "filter", |item, result| {
                    if result.to_boolean() {
                        out.push(item.clone());
                    }
                    Ok(true)
                })?;
                Ok(Value::array(out))
            }),
            native("forEach", |this, args| {
                each(this, args, "forEach", |_, _| Ok(true))?;
                Ok(Value::Undefined)
            }),
            native("some", |this, args| {
                let mut found = false;
                each(this, args, "some", |_, result| {
                    found = result.to_boolean();
                    Ok(!found)
                })?;
                Ok(Value::Bool(found))
            }),
            native("every", |this, args| {
                let mut all = true;
                each(this, args, "every", |_, result| {
                    all = result.to_boolean();
                    Ok(all)
                })?;
                Ok(Value::Bool(all))
            }),
        ])
    })
}

// ---------------------------------------------------------------------------
// RegExp and Object
// ---------------------------------------------------------------------------

pub(crate) fn regexp_methods() -> &'static Properties {
    REGEXP_METHODS.get_or_init(|| {
        methods([
            native("test", |this, args| match this {
                Value::RegExp(re) => Ok(Value::Bool(re.regex.is_match(&arg(args, 0).to_string()))),
                _ => Err(EvalError::Type("RegExp.prototype.test called on incompatible receiver".to_string())),
            }),
            native("exec", |this, args| match this {
                Value::RegExp(re) => {
                    let input = arg(args, 0).to_string();
                    Ok(re.regex.captures(&input).map_or(Value::Null, |caps| {
                        Value::array(
                            caps.iter()
                                .map(|g| g.map_or(Value::Undefined, |m| Value::from(m.as_str())))
                                .collect(),
                        )
                    }))
                }
                _ => Err(EvalError::Type("RegExp.prototype.exec called on incompatible receiver".to_string())),
            }),
        ])
    })
}

pub(crate) fn object_methods() -> &'static Properties {
    OBJECT_METHODS.get_or_init(|| {
        methods([
            native("hasOwnProperty", |this, args| {
                let key = arg(args, 0).to_string();
                Ok(Value::Bool(match this {
                    Value::Object(props) => props.read().contains_key(&key),
                    Value::Array(items) => key
                        .parse::<usize>()
                        .map_or(key == "length", |i| i < items.read().len()),
                    Value::String(s) => key == "length" || key.parse::<usize>().map_or(false, |i| i < s.encode_utf16().count()),
                    Value::Function(f) => f.props.contains_key(&key),
                    _ => false,
                }))
            }),
            native("toString", |this, _| Ok(Value::string(this.to_string()))),
            native("valueOf", |this, _| Ok(this.clone())),
        ])
    })
}

// ---------------------------------------------------------------------------
// Date
// ---------------------------------------------------------------------------

fn time_clip(millis: f64) -> f64 {
    if !millis.is_finite() || millis.abs() > MAX_TIME {
        f64::NAN
    } else {
        millis.trunc()
    }
}

fn now_millis() -> f64 {
    Utc::now().timestamp_millis() as f64
}

fn local_time(millis: f64) -> Option<DateTime<Local>> {
    if millis.is_nan() {
        return None;
    }
    Local.timestamp_millis_opt(millis as i64).single()
}

/// `toISOString` form, `None` for an invalid date.
pub(crate) fn iso_string(millis: f64) -> Option<String> {
    if millis.is_nan() {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// `toString` form in local time.
pub(crate) fn date_string(millis: f64) -> String {
    local_time(millis).map_or_else(
        || "Invalid Date".to_string(),
        |t| t.format("%a %b %d %Y %H:%M:%S GMT%z").to_string(),
    )
}

/// Parse RFC 3339, a UTC `YYYY-MM-DD` date, or a local date-time.
fn parse_date(text: &str) -> f64 {
    let text = text.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return time_clip(t.timestamp_millis() as f64);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map_or(f64::NAN, |t| time_clip(t.and_utc().timestamp_millis() as f64));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(text, format) {
            return local_millis(t);
        }
    }
    f64::NAN
}

fn local_millis(t: NaiveDateTime) -> f64 {
    Local
        .from_local_datetime(&t)
        .earliest()
        .map_or(f64::NAN, |t| time_clip(t.timestamp_millis() as f64))
}

/// `new Date(y, m, d, h, mi, s, ms)` in local time; fields may overflow.
fn date_from_fields(args: &[Value]) -> f64 {
    let field = |i: usize, default: f64| args.get(i).map_or(default, Value::to_number);
    let fields = [
        field(0, f64::NAN),
        field(1, 0.0),
        field(2, 1.0),
        field(3, 0.0),
        field(4, 0.0),
        field(5, 0.0),
        field(6, 0.0),
    ];
    if fields.iter().any(|f| !f.is_finite()) {
        return f64::NAN;
    }
    let [year, month, day, hours, minutes, seconds, millis] = fields.map(f64::trunc);
    let year = if (0.0..=99.0).contains(&year) { 1900.0 + year } else { year };
    let year = year + (month / 12.0).floor();
    let month = month.rem_euclid(12.0);

    let offset = ((((day - 1.0) * 24.0 + hours) * 60.0 + minutes) * 60.0 + seconds) * 1000.0 + millis;
    if year.abs() > 275_000.0 || offset.abs() > MAX_TIME * 2.0 {
        return f64::NAN;
    }
    NaiveDate::from_ymd_opt(year as i32, month as u32 + 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|t| t.checked_add_signed(Duration::milliseconds(offset as i64)))
        .map_or(f64::NAN, local_millis)
}

fn construct_date(_: &Value, args: &[Value]) -> NativeResult {
    let millis = match args {
        [] => now_millis(),
        [Value::Date(d)] => d.millis,
        [Value::String(s)] => parse_date(s),
        [single] => time_clip(single.to_primitive(true).to_number()),
        fields => date_from_fields(fields),
    };
    Ok(Value::date(millis))
}

fn this_date(this: &Value) -> Result<f64, EvalError> {
    match this {
        Value::Date(d) => Ok(d.millis),
        _ => Err(EvalError::Type("this is not a Date object.".to_string())),
    }
}

fn date_field<F>(name: &'static str, field: F) -> (&'static str, Value)
where
    F: Fn(&DateTime<Local>) -> u32 + Send + Sync + 'static,
{
    native(name, move |this, _| {
        let millis = this_date(this)?;
        Ok(Value::Number(local_time(millis).map_or(f64::NAN, |t| f64::from(field(&t)))))
    })
}

pub(crate) fn date_methods() -> &'static Properties {
    DATE_METHODS.get_or_init(|| {
        methods([
            native("getTime", |this, _| Ok(Value::Number(this_date(this)?))),
            native("valueOf", |this, _| Ok(Value::Number(this_date(this)?))),
            native("getFullYear", |this, _| {
                let millis = this_date(this)?;
                Ok(Value::Number(local_time(millis).map_or(f64::NAN, |t| f64::from(t.year()))))
            }),
            date_field("getMonth", |t| t.month0()),
            date_field("getDate", |t| t.day()),
            date_field("getDay", |t| t.weekday().num_days_from_sunday()),
            date_field("getHours", |t| t.hour()),
            date_field("getMinutes", |t| t.minute()),
            date_field("getSeconds", |t| t.second()),
            date_field("getMilliseconds", |t| t.timestamp_subsec_millis()),
            native("toISOString", |this, _| {
                iso_string(this_date(this)?)
                    .map(Value::string)
                    .ok_or_else(|| EvalError::Range("Invalid time value".to_string()))
            }),
            native("toJSON", |this, _| {
                Ok(iso_string(this_date(this)?).map_or(Value::Null, Value::string))
            }),
            native("toString", |this, _| Ok(Value::string(date_string(this_date(this)?)))),
        ])
    })
}

// ---------------------------------------------------------------------------
// Global object
// ---------------------------------------------------------------------------

fn random() -> f64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u64(COUNTER.fetch_add(1, Ordering::Relaxed));
    (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64
}

fn math_unary(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    native(name, move |_, args| Ok(Value::Number(f(arg(args, 0).to_number()))))
}

fn math_object() -> Value {
    Value::object(methods([
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        ("LN2", Value::Number(std::f64::consts::LN_2)),
        ("LN10", Value::Number(std::f64::consts::LN_10)),
        math_unary("abs", f64::abs),
        math_unary("floor", f64::floor),
        math_unary("ceil", f64::ceil),
        math_unary("round", |x| (x + 0.5).floor()),
        math_unary("trunc", f64::trunc),
        math_unary("sqrt", f64::sqrt),
        math_unary("log", f64::ln),
        native("pow", |_, args| {
            Ok(Value::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
        }),
        native("max", |_, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |a, b| {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else {
                    a.max(b)
                }
            })))
        }),
        native("min", |_, args| {
            Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |a, b| {
                if a.is_nan() || b.is_nan() {
                    f64::NAN
                } else {
                    a.min(b)
                }
            })))
        }),
        native("random", |_, _| Ok(Value::Number(random()))),
    ]))
}

fn stringify(_: &Value, args: &[Value]) -> NativeResult {
    let Some(json) = arg(args, 0).to_json_limited(current_max_depth())? else {
        return Ok(Value::Undefined);
    };
    let indent = match arg(args, 2) {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
        json.serialize(&mut serializer)
            .map(|_| String::from_utf8_lossy(&out).into_owned())
    };
    text.map(Value::string)
        .map_err(|e| EvalError::Type(format!("JSON.stringify failed: {}", e)))
}

fn parse_json(_: &Value, args: &[Value]) -> NativeResult {
    serde_json::from_str::<JsonValue>(&arg(args, 0).to_string())
        .map(Value::from)
        .map_err(|e| EvalError::syntax(format!("JSON.parse: {}", e), 0))
}

fn parse_int(text: &str, radix: u32) -> f64 {
    let s = text.trim_start();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let mut radix = radix;
    let mut s = s;
    if radix == 0 || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = s.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let n = digits.iter().fold(0.0, |acc, &d| acc * f64::from(radix) + f64::from(d));
    if negative {
        -n
    } else {
        n
    }
}

fn parse_float(text: &str) -> f64 {
    float_prefix_regex()
        .find(text.trim_start())
        .map_or(f64::NAN, |m| match m.as_str().trim_start_matches('+') {
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            number => string_to_number(number),
        })
}

fn regexp_constructor() -> Value {
    fn build(_: &Value, args: &[Value]) -> NativeResult {
        let flags = match arg(args, 1) {
            Value::Undefined => None,
            v => Some(v.to_string()),
        };
        match arg(args, 0) {
            Value::RegExp(re) => Value::regexp(&re.source, flags.as_deref().unwrap_or(&re.flags)),
            Value::Undefined => Value::regexp("(?:)", flags.as_deref().unwrap_or("")),
            pattern => Value::regexp(&pattern.to_string(), flags.as_deref().unwrap_or("")),
        }
    }
    Value::constructor("RegExp", build, build, Properties::new())
}

fn array_constructor() -> Value {
    fn build(_: &Value, args: &[Value]) -> NativeResult {
        match args {
            [Value::Number(n)] => {
                if n.fract() != 0.0 || *n < 0.0 || *n > f64::from(u32::MAX) {
                    return Err(EvalError::Range("Invalid array length".to_string()));
                }
                Ok(Value::array(vec![Value::Undefined; *n as usize]))
            }
            items => Ok(Value::array(items.to_vec())),
        }
    }
    Value::constructor(
        "Array",
        build,
        build,
        methods([native("isArray", |_, args| Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_)))))]),
    )
}

fn object_constructor() -> Value {
    fn build(_: &Value, args: &[Value]) -> NativeResult {
        Ok(match arg(args, 0) {
            v if v.is_nullish() => Value::object(Properties::new()),
            v => v,
        })
    }
    Value::constructor(
        "Object",
        build,
        build,
        methods([native("keys", |_, args| {
            let keys: Vec<Value> = match arg(args, 0) {
                v if v.is_nullish() => {
                    return Err(EvalError::Type("Cannot convert undefined or null to object".to_string()))
                }
                Value::Object(props) => props.read().keys().map(|k| Value::string(k.clone())).collect(),
                Value::Array(items) => (0..items.read().len()).map(|i| Value::string(i.to_string())).collect(),
                Value::String(s) => (0..s.encode_utf16().count()).map(|i| Value::string(i.to_string())).collect(),
                Value::Function(f) => f.props.keys().map(|k| Value::string(k.clone())).collect(),
                _ => Vec::new(),
            };
            Ok(Value::array(keys))
        })]),
    )
}

/// A fresh global object with every built-in binding.
pub fn global_object() -> Value {
    let string = |_: &Value, args: &[Value]| -> NativeResult {
        Ok(Value::string(args.first().map(Value::to_string).unwrap_or_default()))
    };
    let number = |_: &Value, args: &[Value]| -> NativeResult {
        Ok(Value::Number(args.first().map_or(0.0, Value::to_number)))
    };
    let boolean = |_: &Value, args: &[Value]| -> NativeResult { Ok(Value::Bool(arg(args, 0).to_boolean())) };
    let function = |_: &Value, _: &[Value]| -> NativeResult {
        Err(EvalError::Type("Function constructor is not supported".to_string()))
    };

    Value::object(methods([
        ("undefined", Value::Undefined),
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
        ("Math", math_object()),
        (
            "JSON",
            Value::object(methods([native("stringify", stringify), native("parse", parse_json)])),
        ),
        (
            "Date",
            Value::constructor(
                "Date",
                |_, _| Ok(Value::string(date_string(now_millis()))),
                construct_date,
                methods([native("now", |_, _| Ok(Value::Number(now_millis())))]),
            ),
        ),
        (
            "String",
            Value::constructor(
                "String",
                string,
                string,
                methods([native("fromCharCode", |_, args| {
                    let code_units: Vec<u16> = args.iter().map(|a| a.to_number() as u32 as u16).collect();
                    Ok(Value::string(String::from_utf16_lossy(&code_units)))
                })]),
            ),
        ),
        (
            "Number",
            Value::constructor(
                "Number",
                number,
                number,
                methods([
                    native("isInteger", |_, args| {
                        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0)))
                    }),
                    native("isNaN", |_, args| {
                        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan())))
                    }),
                    ("MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0)),
                ]),
            ),
        ),
        ("Boolean", Value::constructor("Boolean", boolean, boolean, Properties::new())),
        ("Function", Value::constructor("Function", function, function, Properties::new())),
        ("Array", array_constructor()),
        ("Object", object_constructor()),
        ("RegExp", regexp_constructor()),
        native("parseInt", |_, args| {
            let radix = to_integer(&arg(args, 1)) as u32;
            Ok(Value::Number(parse_int(&arg(args, 0).to_string(), radix)))
        }),
        native("parseFloat", |_, args| Ok(Value::Number(parse_float(&arg(args, 0).to_string())))),
        native("isNaN", |_, args| Ok(Value::Bool(arg(args, 0).to_number().is_nan()))),
        native("isFinite", |_, args| Ok(Value::Bool(arg(args, 0).to_number().is_finite()))),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::eval::run;
    use crate::script::parser::parse;

    fn eval(src: &str) -> Result<Value, EvalError> {
        let expr = parse(src, 64)?;
        run(&expr, &Value::object(Properties::new()), &global_object(), 64)
    }

    fn text(src: &str) -> String {
        eval(src).unwrap().to_string()
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(text("'abc'.charAt(1) + 'abc'.charAt(9)"), "b");
        assert_eq!(text("'abcabc'.indexOf('c') + ':' + 'abcabc'.lastIndexOf('c')"), "2:5");
        assert_eq!(text("'abcdef'.slice(1, -1)"), "bcde");
        assert_eq!(text("'abcdef'.substring(4, 1)"), "bcd");
        assert_eq!(text("' Ab '.trim().toUpperCase()"), "AB");
        assert_eq!(text("'a,b,c'.split(',', 2)"), "a,b");
        assert_eq!(text("'a1b22c'.split(/[0-9]+/).join('-')"), "a-b-c");
        assert_eq!(text("'ab'.split('').length"), "2");
        assert_eq!(text("'ab'.repeat(2).concat('!')"), "abab!");
        assert!(matches!(eval("'a'.repeat(-1)"), Err(EvalError::Range(_))));
    }

    #[test]
    fn test_replace() {
        assert_eq!(text("'a.a.a'.replace('.', '-')"), "a-a.a");
        assert_eq!(text("'aaa'.replace(/a/g, 'b')"), "bbb");
        assert_eq!(text("'john smith'.replace(/(\\w+) (\\w+)/, '$2 $1 $$ [$&]')"), "smith john $ [john smith]");
        assert_eq!(
            text("'a1b2'.replace(/[0-9]/g, function (m) { return '<' + m + '>' })"),
            "a<1>b<2>"
        );
    }

    #[test]
    fn test_number_methods() {
        assert_eq!(text("(2.5).toFixed(0)"), "3");
        assert_eq!(text("(1.23456).toFixed(2)"), "1.23");
        assert_eq!(text("(255).toString(16)"), "ff");
        assert_eq!(text("(-5).toString(2)"), "-101");
        assert_eq!(text("(0.5).toString(2)"), "0.1");
        assert!(matches!(eval("(1).toString(1)"), Err(EvalError::Range(_))));
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(text("[1, null, 'a'].join('-')"), "1--a");
        assert_eq!(text("[1,2,3].slice(-2)"), "2,3");
        assert_eq!(text("[1].concat([2, 3], 4).length"), "4");
        assert_eq!(text("[1,2,3].indexOf(2) + [1,2,3].indexOf('2')"), "0");
        assert_eq!(text("[NaN].includes(NaN)"), "true");
        assert_eq!(text("[1,2,3].reverse()"), "3,2,1");
        assert_eq!(text("[1,2].push(3)"), "3");
        assert_eq!(text("[1,2,3].map(function (x) { return x * 2 })"), "2,4,6");
        assert_eq!(text("[1,2,3].filter(function (x) { return x > 1 }).length"), "2");
        assert_eq!(text("[1,2,3].some(function (x) { return x > 2 })"), "true");
        assert_eq!(text("[1,2,3].every(function (x) { return x > 2 })"), "false");
    }

    #[test]
    fn test_globals() {
        assert_eq!(text("Math.max(1, 3, 2) + Math.min(4, 5)"), "7");
        assert_eq!(text("Math.round(2.5) + Math.round(-2.5)"), "1");
        assert_eq!(text("typeof Math.random()"), "number");
        assert_eq!(text("parseInt('42px') + parseInt('0x10') + parseInt('11', 2)"), "61");
        assert_eq!(text("parseFloat(' 3.5e1abc')"), "35");
        assert_eq!(text("isNaN('x') && isFinite('1')"), "true");
        assert_eq!(text("String(12) + Number('3') + Boolean('')"), "123false");
        assert_eq!(text("Array.isArray([]) && !Array.isArray({})"), "true");
        assert_eq!(text("Object.keys({b: 1, a: 2})"), "b,a");
        assert_eq!(text("new RegExp('a+', 'i').test('AA')"), "true");
        assert_eq!(text("'x' instanceof Function"), "false");
    }

    #[test]
    fn test_json() {
        assert_eq!(text("JSON.stringify({x: 5})"), r#"{"x":5}"#);
        assert_eq!(text("JSON.stringify({b: [1, 'a'], a: null, u: undefined})"), r#"{"b":[1,"a"],"a":null}"#);
        assert_eq!(text("JSON.stringify([1], null, 2)"), "[\n  1\n]");
        assert_eq!(text("typeof JSON.stringify(undefined)"), "undefined");
        assert_eq!(text("JSON.parse('{\"a\": [1, 2]}').a[1]"), "2");
        assert!(matches!(eval("JSON.parse('{')"), Err(EvalError::Syntax { .. })));
    }

    #[test]
    fn test_circular_values() {
        let joined = "(function (a) { return a.push(a, 3), a.join('-') + '|' + a })([1])";
        assert_eq!(text(joined), "1--3|1,,3");
        assert!(matches!(
            eval("(function (a) { return a.push(a), JSON.stringify(a) })([1])"),
            Err(EvalError::Type(_))
        ));
        assert_eq!(text("(function (a) { return JSON.stringify([a, a]) })([1])"), "[[1],[1]]");
    }

    #[test]
    fn test_dates() {
        assert_eq!(text("new Date(0).toISOString()"), "1970-01-01T00:00:00.000Z");
        assert_eq!(text("new Date('2020-02-03').toISOString()"), "2020-02-03T00:00:00.000Z");
        assert_eq!(text("new Date(2020, 0, 31).getMonth()"), "0");
        assert_eq!(text("new Date(2020, 0, 32).getDate()"), "1");
        assert_eq!(text("new Date(86400000).getTime()"), "86400000");
        assert_eq!(text("new Date('nope')"), "Invalid Date");
        assert_eq!(text("typeof Date()"), "string");
        assert_eq!(text("Date.now() > 0"), "true");
        assert!(matches!(eval("new Date(NaN).toISOString()"), Err(EvalError::Range(_))));
        assert_eq!(text("JSON.stringify({t: new Date(0)})"), r#"{"t":"1970-01-01T00:00:00.000Z"}"#);
    }

    #[test]
    fn test_char_at() {
        assert_eq!(char_at("héllo", 1).as_deref(), Some("é"));
        assert_eq!(char_at("ab", 5), None);
    }
}
