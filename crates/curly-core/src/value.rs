//! Dynamic values for data contexts and template results.
//!
//! Arrays and objects are shared and mutable, so cloning a [`Value`] clones a
//! handle, not the contents. Conversions follow the host expression
//! language: `to_boolean`, `to_number` and `Display` (ToString).

use crate::script::eval::Closure;
use crate::script::EvalError;
use crate::stack::ensure_sufficient_stack;
use crate::{CurlyError, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::thread::LocalKey;

thread_local! {
    static FORMATTING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static SERIALIZING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static COMPARING: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
}

/// Marks a shared container as being traversed on this thread.
///
/// `enter` returns `None` when the container is already being traversed,
/// i.e. it contains itself.
struct Visit {
    set: &'static LocalKey<RefCell<Vec<usize>>>,
    addr: usize,
}

impl Visit {
    fn enter<T>(set: &'static LocalKey<RefCell<Vec<usize>>>, shared: &Arc<T>) -> Option<Self> {
        let addr = Arc::as_ptr(shared) as usize;
        set.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&addr) {
                None
            } else {
                active.push(addr);
                Some(Visit { set, addr })
            }
        })
    }
}

impl Drop for Visit {
    fn drop(&mut self) {
        self.set.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(i) = active.iter().rposition(|&a| a == self.addr) {
                active.remove(i);
            }
        });
    }
}

/// Array-to-string conversion with `join` semantics. Nullish items, and
/// items that lead back to an array already being joined, render as empty.
pub(crate) fn join_array(items: &Arc<RwLock<Vec<Value>>>, separator: &str) -> String {
    let Some(_visit) = Visit::enter(&FORMATTING, items) else {
        return String::new();
    };
    let snapshot = items.read_recursive().clone();
    ensure_sufficient_stack(|| {
        snapshot
            .iter()
            .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
            .collect::<Vec<_>>()
            .join(separator)
    })
}

/// Signature of native functions: `this`, then the call arguments.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> std::result::Result<Value, EvalError> + Send + Sync;

/// Ordered property map of an object.
pub type Properties = IndexMap<String, Value>;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Arc<RwLock<Vec<Value>>>),
    Object(Arc<RwLock<Properties>>),
    Function(Arc<Function>),
    RegExp(Arc<RegExpValue>),
    Date(Arc<DateValue>),
}

/// A callable value with optional static properties (e.g. `Date.now`).
pub struct Function {
    pub name: String,
    pub kind: FunctionKind,
    pub props: Properties,
}

pub enum FunctionKind {
    Native {
        call: Arc<NativeFn>,
        construct: Option<Arc<NativeFn>>,
    },
    Script(Closure),
}

impl Function {
    /// Invoke the function with an explicit `this`.
    pub fn call(&self, this: &Value, args: &[Value]) -> std::result::Result<Value, EvalError> {
        match &self.kind {
            FunctionKind::Native { call, .. } => call(this, args),
            FunctionKind::Script(closure) => closure.call(this, args),
        }
    }

    /// Invoke the function as a constructor.
    pub fn construct(&self, args: &[Value]) -> std::result::Result<Value, EvalError> {
        match &self.kind {
            FunctionKind::Native {
                construct: Some(construct),
                ..
            } => construct(&Value::Undefined, args),
            FunctionKind::Native { .. } => {
                Err(EvalError::Type(format!("{} is not a constructor", self.display_name())))
            }
            FunctionKind::Script(closure) => {
                let this = Value::object(Properties::new());
                let result = closure.call(&this, args)?;
                Ok(if result.is_object_like() { result } else { this })
            }
        }
    }

    fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "anonymous"
        } else {
            &self.name
        }
    }
}

/// A compiled regular-expression literal.
#[derive(Debug)]
pub struct RegExpValue {
    pub source: String,
    pub flags: String,
    pub regex: Regex,
}

impl RegExpValue {
    /// Compile a literal with `g`, `i`, `m`, `s` flags.
    pub fn new(source: &str, flags: &str) -> std::result::Result<Self, EvalError> {
        let mut inline = String::new();
        for flag in flags.chars() {
            match flag {
                'i' | 'm' | 's' => inline.push(flag),
                'g' | 'u' | 'y' => {}
                other => {
                    return Err(EvalError::syntax(
                        format!("Invalid regular expression flags '{}'", other),
                        0,
                    ))
                }
            }
        }
        let pattern = if inline.is_empty() {
            source.to_string()
        } else {
            format!("(?{}){}", inline, source)
        };
        let regex = Regex::new(&pattern).map_err(|e| {
            EvalError::syntax(format!("Invalid regular expression /{}/: {}", source, e), 0)
        })?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    pub fn is_global(&self) -> bool {
        self.flags.contains('g')
    }
}

/// A point in time as milliseconds since the epoch (NaN when invalid).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateValue {
    pub millis: f64,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn object(props: Properties) -> Self {
        Value::Object(Arc::new(RwLock::new(props)))
    }

    /// Build an object from key/value pairs, keeping their order.
    pub fn object_from<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wrap a native function.
    ///
    /// # Example
    ///
    /// ```
    /// use curly_core::Value;
    ///
    /// let greet = Value::function("greet", |_this, args| {
    ///     Ok(Value::string(format!("hi {}", args.first().cloned().unwrap_or_default())))
    /// });
    /// let out = greet.call(&Value::Undefined, &[Value::from("x")]).unwrap();
    /// assert_eq!(out.to_string(), "hi x");
    /// ```
    pub fn function<F>(name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
    {
        Value::Function(Arc::new(Function {
            name: name.into(),
            kind: FunctionKind::Native {
                call: Arc::new(call),
                construct: None,
            },
            props: Properties::new(),
        }))
    }

    /// Wrap a native function that also works with `new`, plus static
    /// properties.
    pub fn constructor<F, C>(name: impl Into<String>, call: F, construct: C, props: Properties) -> Self
    where
        F: Fn(&Value, &[Value]) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
        C: Fn(&Value, &[Value]) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
    {
        Value::Function(Arc::new(Function {
            name: name.into(),
            kind: FunctionKind::Native {
                call: Arc::new(call),
                construct: Some(Arc::new(construct)),
            },
            props,
        }))
    }

    pub fn regexp(source: &str, flags: &str) -> std::result::Result<Self, EvalError> {
        Ok(Value::RegExp(Arc::new(RegExpValue::new(source, flags)?)))
    }

    pub fn date(millis: f64) -> Self {
        Value::Date(Arc::new(DateValue { millis }))
    }

    /// Convert any serializable value through JSON.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Value::from(serde_json::to_value(value)?))
    }

    /// Call this value as a function.
    pub fn call(&self, this: &Value, args: &[Value]) -> std::result::Result<Value, EvalError> {
        match self {
            Value::Function(f) => f.call(this, args),
            other => Err(EvalError::Type(format!("{} is not a function", other.type_of()))),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Arrays, objects, functions, regexes and dates.
    pub fn is_object_like(&self) -> bool {
        matches!(
            self,
            Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::RegExp(_) | Value::Date(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The result of the `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Array(_) | Value::Object(_) | Value::RegExp(_) | Value::Date(_) => "object",
        }
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Date(d) => d.millis,
            Value::Array(_) => string_to_number(&self.to_string()),
            Value::Object(_) | Value::Function(_) | Value::RegExp(_) => f64::NAN,
        }
    }

    /// ToPrimitive: object-like values become strings, dates become strings
    /// unless `prefer_number`.
    pub fn to_primitive(&self, prefer_number: bool) -> Value {
        match self {
            Value::Date(d) if prefer_number => Value::Number(d.millis),
            v if v.is_object_like() => Value::String(v.to_string()),
            v => v.clone(),
        }
    }

    /// Identity of shared values; primitives compare by value.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::RegExp(a), Value::RegExp(b)) => Arc::ptr_eq(a, b),
            (Value::Date(a), Value::Date(b)) => Arc::ptr_eq(a, b),
            (a, b) if a.is_object_like() || b.is_object_like() => false,
            (a, b) => a.strict_equals(b),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (a, b) if a.is_object_like() && b.is_object_like() => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(a), Value::String(_)) => *a == other.to_number(),
            (Value::String(_), Value::Number(b)) => self.to_number() == *b,
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (a, b) if a.is_object_like() && !b.is_object_like() => a.to_primitive(false).loose_equals(b),
            (a, b) if !a.is_object_like() && b.is_object_like() => a.loose_equals(&b.to_primitive(false)),
            (a, b) => a.strict_equals(b),
        }
    }

    /// Convert to JSON. `undefined` and functions become `null`.
    pub fn to_json(&self) -> Result<JsonValue> {
        self.to_json_limited(crate::config::CurlyConfig::default().max_depth)
            .map(|v| v.unwrap_or(JsonValue::Null))
            .map_err(|e| CurlyError::Runtime(e.to_string()))
    }

    /// JSON conversion with `JSON.stringify` semantics: `None` for values
    /// that have no JSON form, nesting bounded by `max_depth`.
    pub(crate) fn to_json_limited(&self, max_depth: usize) -> std::result::Result<Option<JsonValue>, EvalError> {
        self.json_at(0, max_depth)
    }

    fn json_at(&self, depth: usize, max_depth: usize) -> std::result::Result<Option<JsonValue>, EvalError> {
        if depth > max_depth {
            return Err(EvalError::Range("Maximum JSON nesting exceeded".to_string()));
        }
        let _visit = match self {
            Value::Array(items) => Some(Visit::enter(&SERIALIZING, items).ok_or_else(circular)?),
            Value::Object(props) => Some(Visit::enter(&SERIALIZING, props).ok_or_else(circular)?),
            _ => None,
        };
        ensure_sufficient_stack(|| self.json_node(depth, max_depth))
    }

    fn json_node(&self, depth: usize, max_depth: usize) -> std::result::Result<Option<JsonValue>, EvalError> {
        Ok(Some(match self {
            Value::Undefined | Value::Function(_) => return Ok(None),
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Date(d) => match crate::script::builtins::iso_string(d.millis) {
                Some(iso) => JsonValue::String(iso),
                None => JsonValue::Null,
            },
            Value::RegExp(_) => JsonValue::Object(JsonMap::new()),
            Value::Array(items) => {
                let items = items.read().clone();
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(item.json_at(depth + 1, max_depth)?.unwrap_or(JsonValue::Null));
                }
                JsonValue::Array(out)
            }
            Value::Object(props) => {
                let props = props.read().clone();
                let mut out = JsonMap::new();
                for (key, value) in &props {
                    if let Some(json) = value.json_at(depth + 1, max_depth)? {
                        out.insert(key.clone(), json);
                    }
                }
                JsonValue::Object(out)
            }
        }))
    }
}

fn circular() -> EvalError {
    EvalError::Type("Converting circular structure to JSON".to_string())
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        JsonValue::Number(JsonNumber::from(n as i64))
    } else {
        JsonNumber::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
    }
}

/// ToNumber for strings.
pub(crate) fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) {
        return f64::NAN;
    }
    s.parse().unwrap_or(f64::NAN)
}

/// Number::toString in radix 10.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    let sci = format!("{:e}", n.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exp: i32 = exp.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exp + 1;

    let body = if k <= point && point <= 21 {
        format!("{}{}", digits, "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        format!("{}.{}", &digits[..point as usize], &digits[point as usize..])
    } else if -6 < point && point <= 0 {
        format!("0.{}{}", "0".repeat((-point) as usize), digits)
    } else {
        let e_sign = if point - 1 >= 0 { "+" } else { "-" };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{}e{}{}", first, e_sign, (point - 1).abs())
        } else {
            format!("{}.{}e{}{}", first, rest, e_sign, (point - 1).abs())
        }
    };
    format!("{}{}", sign, body)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&number_to_string(*n)),
            Value::String(s) => f.write_str(s),
            Value::Array(items) => f.write_str(&join_array(items, ",")),
            Value::Object(_) => f.write_str("[object Object]"),
            Value::Function(func) => match func.kind {
                FunctionKind::Native { .. } => write!(f, "function {}() {{ [native code] }}", func.name),
                FunctionKind::Script(_) => write!(f, "function {}() {{ }}", func.name),
            },
            Value::RegExp(re) => write!(f, "/{}/{}", re.source, re.flags),
            Value::Date(d) => f.write_str(&crate::script::builtins::date_string(d.millis)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Array(items) => match Visit::enter(&FORMATTING, items) {
                Some(_visit) => f.debug_list().entries(items.read_recursive().iter()).finish(),
                None => f.write_str("[...]"),
            },
            Value::Object(props) => match Visit::enter(&FORMATTING, props) {
                Some(_visit) => f.debug_map().entries(props.read_recursive().iter()).finish(),
                None => f.write_str("{...}"),
            },
            Value::Function(func) => write!(f, "Function({})", func.name),
            Value::RegExp(re) => write!(f, "RegExp(/{}/{})", re.source, re.flags),
            Value::Date(d) => write!(f, "Date({})", d.millis),
        }
    }
}

/// Structural equality: arrays and objects compare by contents, functions by
/// identity. Use [`Value::ptr_eq`] for identity of shared values.
///
/// Self-containing values are equal when their shapes match: a pair already
/// under comparison is assumed equal.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) && self.is_object_like() {
            return true;
        }
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => compare_shared(a, b, |a, b| {
                *a.read_recursive() == *b.read_recursive()
            }),
            (Value::Object(a), Value::Object(b)) => compare_shared(a, b, |a, b| {
                let (a, b) = (a.read_recursive(), b.read_recursive());
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }),
            (Value::RegExp(a), Value::RegExp(b)) => a.source == b.source && a.flags == b.flags,
            (Value::Date(a), Value::Date(b)) => a.millis == b.millis,
            (a, b) => a.strict_equals(b),
        }
    }
}

/// Run `compare` unless this pair is already being compared further up.
fn compare_shared<T>(a: &Arc<T>, b: &Arc<T>, compare: impl FnOnce(&Arc<T>, &Arc<T>) -> bool) -> bool {
    let pair = (Arc::as_ptr(a) as usize, Arc::as_ptr(b) as usize);
    let entered = COMPARING.with(|active| {
        let mut active = active.borrow_mut();
        if active.contains(&pair) {
            false
        } else {
            active.push(pair);
            true
        }
    });
    if !entered {
        return true;
    }
    let equal = ensure_sufficient_stack(|| compare(a, b));
    COMPARING.with(|active| {
        let mut active = active.borrow_mut();
        if let Some(i) = active.iter().rposition(|&p| p == pair) {
            active.remove(i);
        }
    });
    equal
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<Properties> for Value {
    fn from(props: Properties) -> Self {
        Value::object(props)
    }
}
