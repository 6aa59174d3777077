//! Tree-walking evaluator.

use super::ast::{BinaryOp, Expr, FunctionDef, Literal, LogicalOp, UnaryOp};
use super::builtins;
use super::EvalError;
use crate::stack::ensure_sufficient_stack;
use crate::value::{number_to_string, Function, FunctionKind, Properties, Value};
use std::cell::Cell;
use std::sync::Arc;
use tracing::trace;

type EvalResult = Result<Value, EvalError>;

thread_local! {
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
    static MAX_DEPTH: Cell<usize> = const { Cell::new(crate::config::DEFAULT_MAX_DEPTH) };
}

/// Tracks nested function calls on the current thread.
struct DepthGuard;

impl DepthGuard {
    fn enter(max_depth: usize) -> Result<Self, EvalError> {
        let depth = CALL_DEPTH.with(|d| {
            let next = d.get() + 1;
            d.set(next);
            next
        });
        let guard = DepthGuard;
        if depth > max_depth {
            return Err(EvalError::Range("Maximum call stack size exceeded".to_string()));
        }
        Ok(guard)
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Nesting limit of the evaluation running on this thread.
pub(crate) fn current_max_depth() -> usize {
    MAX_DEPTH.with(Cell::get)
}

/// Restores the previous nesting limit when an evaluation finishes.
struct LimitGuard(usize);

impl Drop for LimitGuard {
    fn drop(&mut self) {
        MAX_DEPTH.with(|m| m.set(self.0));
    }
}

/// Local variables of one function activation.
pub struct Scope {
    vars: Vec<(String, Value)>,
    parent: Option<Arc<Scope>>,
}

impl Scope {
    fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some((_, value)) = current.vars.iter().rev().find(|(n, _)| n == name) {
                return Some(value.clone());
            }
            scope = current.parent.as_deref();
        }
        None
    }
}

/// A function literal together with everything it captured.
#[derive(Clone)]
pub struct Closure {
    def: Arc<FunctionDef>,
    scope: Option<Arc<Scope>>,
    data: Value,
    globals: Value,
    max_depth: usize,
}

impl Closure {
    pub fn call(&self, this: &Value, args: &[Value]) -> EvalResult {
        let _depth = DepthGuard::enter(self.max_depth)?;

        let mut vars = Vec::with_capacity(self.def.params.len() + 2);
        if let Some(name) = &self.def.name {
            vars.push((name.clone(), self.to_value()));
        }
        vars.push(("arguments".to_string(), Value::array(args.to_vec())));
        for (i, param) in self.def.params.iter().enumerate() {
            vars.push((param.clone(), args.get(i).cloned().unwrap_or_default()));
        }

        let env = Env {
            scope: Some(Arc::new(Scope {
                vars,
                parent: self.scope.clone(),
            })),
            this: this.clone(),
            data: self.data.clone(),
            globals: self.globals.clone(),
            max_depth: self.max_depth,
        };
        match &self.def.body {
            Some(body) => env.eval(body),
            None => Ok(Value::Undefined),
        }
    }

    fn to_value(&self) -> Value {
        Value::Function(Arc::new(Function {
            name: self.def.name.clone().unwrap_or_default(),
            kind: FunctionKind::Script(self.clone()),
            props: Properties::new(),
        }))
    }
}

/// Evaluate a parsed program against `data` (bound to `d` and `this`).
pub fn run(expr: &Expr, data: &Value, globals: &Value, max_depth: usize) -> EvalResult {
    let _limit = LimitGuard(MAX_DEPTH.with(|m| m.replace(max_depth)));
    let env = Env {
        scope: None,
        this: data.clone(),
        data: data.clone(),
        globals: globals.clone(),
        max_depth,
    };
    env.eval(expr)
}

struct Env {
    scope: Option<Arc<Scope>>,
    this: Value,
    data: Value,
    globals: Value,
    max_depth: usize,
}

impl Env {
    fn eval(&self, expr: &Expr) -> EvalResult {
        ensure_sufficient_stack(|| self.eval_node(expr))
    }

    fn eval_node(&self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Undefined => Value::Undefined,
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::String(s.clone()),
            }),
            Expr::Ident(name) => self.resolve(name),
            Expr::This => Ok(self.this.clone()),
            Expr::Regex { source, flags } => Value::regexp(source, flags),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(match item {
                        Some(item) => self.eval(item)?,
                        None => Value::Undefined,
                    });
                }
                Ok(Value::array(out))
            }
            Expr::Object(props) => {
                let mut out = Properties::with_capacity(props.len());
                for (key, value) in props {
                    out.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::object(out))
            }
            Expr::Function(def) => Ok(Closure {
                def: Arc::clone(def),
                scope: self.scope.clone(),
                data: self.data.clone(),
                globals: self.globals.clone(),
                max_depth: self.max_depth,
            }
            .to_value()),
            Expr::Member(object, name) => self.property(&self.eval(object)?, name),
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let key = property_key(&self.eval(index)?);
                self.property(&object, &key)
            }
            Expr::Call(callee, args) => self.call(callee, args),
            Expr::New(callee, args) => {
                let constructor = self.eval(callee)?;
                let args = self.eval_args(args)?;
                match constructor {
                    Value::Function(f) => f.construct(&args),
                    _ => Err(EvalError::Type(format!("{} is not a constructor", describe(callee)))),
                }
            }
            Expr::Unary(op, operand) => self.unary(*op, operand),
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval(left)?;
                match (op, left.to_boolean()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval(test)?.to_boolean() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval(item)?;
                }
                Ok(last)
            }
            Expr::Guard { text, expr } => Ok(self.guard(*text, expr)),
        }
    }

    /// Property read; the global object also exposes itself as `global`.
    fn property(&self, object: &Value, key: &str) -> EvalResult {
        if key == "global" && object.ptr_eq(&self.globals) {
            let own = match object {
                Value::Object(props) => props.read().get(key).cloned(),
                _ => None,
            };
            return Ok(own.unwrap_or_else(|| self.globals.clone()));
        }
        get_property(object, key)
    }

    /// Locals, then `d` and `global`, then globals.
    fn resolve(&self, name: &str) -> EvalResult {
        if let Some(value) = self.scope.as_ref().and_then(|s| s.lookup(name)) {
            return Ok(value);
        }
        match name {
            "d" => return Ok(self.data.clone()),
            "global" => return Ok(self.globals.clone()),
            _ => {}
        }
        if let Value::Object(props) = &self.globals {
            if let Some(value) = props.read().get(name) {
                return Ok(value.clone());
            }
        }
        Err(EvalError::Reference(name.to_string()))
    }

    fn guard(&self, text: bool, expr: &Expr) -> Value {
        match self.eval(expr) {
            Ok(value) if !text => value,
            Ok(value) => {
                if value.to_boolean() || matches!(value, Value::Number(n) if n == 0.0) {
                    value
                } else {
                    Value::string("")
                }
            }
            Err(e) => {
                trace!(error = %e, "Guarded expression failed");
                if text {
                    Value::string("")
                } else {
                    Value::Undefined
                }
            }
        }
    }

    fn eval_args(&self, args: &[Expr]) -> Result<Vec<Value>, EvalError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn call(&self, callee: &Expr, args: &[Expr]) -> EvalResult {
        let (this, function) = match callee {
            Expr::Member(object, name) => {
                let object = self.eval(object)?;
                let function = self.property(&object, name)?;
                (object, function)
            }
            Expr::Index(object, index) => {
                let object = self.eval(object)?;
                let key = property_key(&self.eval(index)?);
                let function = self.property(&object, &key)?;
                (object, function)
            }
            other => (Value::Undefined, self.eval(other)?),
        };
        let args = self.eval_args(args)?;
        match function {
            Value::Function(f) => f.call(&this, &args),
            _ => Err(EvalError::Type(format!("{} is not a function", describe(callee)))),
        }
    }

    fn unary(&self, op: UnaryOp, operand: &Expr) -> EvalResult {
        if op == UnaryOp::TypeOf {
            if let Expr::Ident(name) = operand {
                return match self.resolve(name) {
                    Ok(value) => Ok(Value::string(value.type_of())),
                    Err(EvalError::Reference(_)) => Ok(Value::string("undefined")),
                    Err(e) => Err(e),
                };
            }
        }
        let value = self.eval(operand)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.to_boolean()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::TypeOf => Value::string(value.type_of()),
            UnaryOp::Void => Value::Undefined,
        })
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    Ok(match op {
        BinaryOp::Add => {
            let (l, r) = (left.to_primitive(false), right.to_primitive(false));
            if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                Value::String(format!("{}{}", l, r))
            } else {
                Value::Number(l.to_number() + r.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Value::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Value::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Value::Number(left.to_number() % right.to_number()),
        BinaryOp::Lt => Value::Bool(compare(left, right, |o| o.is_lt())),
        BinaryOp::Gt => Value::Bool(compare(left, right, |o| o.is_gt())),
        BinaryOp::Le => Value::Bool(compare(left, right, |o| o.is_le())),
        BinaryOp::Ge => Value::Bool(compare(left, right, |o| o.is_ge())),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::Ne => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNe => Value::Bool(!left.strict_equals(right)),
        BinaryOp::In => Value::Bool(has_property(right, &property_key(left))?),
        BinaryOp::InstanceOf => Value::Bool(instance_of(left, right)?),
    })
}

/// Relational comparison; any NaN operand makes it false.
fn compare(left: &Value, right: &Value, test: impl Fn(std::cmp::Ordering) -> bool) -> bool {
    let (l, r) = (left.to_primitive(true), right.to_primitive(true));
    if let (Value::String(a), Value::String(b)) = (&l, &r) {
        return test(a.encode_utf16().cmp(b.encode_utf16()));
    }
    l.to_number().partial_cmp(&r.to_number()).map_or(false, test)
}

fn has_property(object: &Value, key: &str) -> Result<bool, EvalError> {
    match object {
        Value::Object(props) => Ok(props.read().contains_key(key)),
        Value::Array(items) => {
            Ok(key == "length" || array_index(key).map_or(false, |i| i < items.read().len()))
        }
        Value::Function(f) => Ok(key == "name" || f.props.contains_key(key)),
        other => Err(EvalError::Type(format!(
            "Cannot use 'in' operator to search for '{}' in {}",
            key, other
        ))),
    }
}

fn instance_of(value: &Value, constructor: &Value) -> Result<bool, EvalError> {
    let Value::Function(f) = constructor else {
        return Err(EvalError::Type("Right-hand side of 'instanceof' is not callable".to_string()));
    };
    Ok(match f.name.as_str() {
        "Object" => value.is_object_like(),
        "Array" => matches!(value, Value::Array(_)),
        "Function" => matches!(value, Value::Function(_)),
        "Date" => matches!(value, Value::Date(_)),
        "RegExp" => matches!(value, Value::RegExp(_)),
        _ => false,
    })
}

/// Property key of a computed member access.
fn property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => number_to_string(*n),
        other => other.to_string(),
    }
}

/// Canonical array index (`"1"` but not `"01"`).
fn array_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

/// Read `object[key]`, falling back to the built-in methods of its type.
pub(crate) fn get_property(object: &Value, key: &str) -> EvalResult {
    let found = match object {
        Value::Undefined | Value::Null => {
            return Err(EvalError::Type(format!(
                "Cannot read properties of {} (reading '{}')",
                object, key
            )))
        }
        Value::String(s) => match key {
            "length" => Some(Value::Number(s.encode_utf16().count() as f64)),
            _ => match array_index(key) {
                Some(index) => Some(builtins::char_at(s, index).map_or(Value::Undefined, Value::String)),
                None => builtins::string_methods().get(key).cloned(),
            },
        },
        Value::Number(_) => builtins::number_methods().get(key).cloned(),
        Value::Bool(_) => None,
        Value::Array(items) => match key {
            "length" => Some(Value::Number(items.read().len() as f64)),
            _ => match array_index(key) {
                Some(index) => Some(items.read().get(index).cloned().unwrap_or_default()),
                None => builtins::array_methods().get(key).cloned(),
            },
        },
        Value::Object(props) => props.read().get(key).cloned(),
        Value::Function(f) => match key {
            "name" => Some(Value::string(f.name.clone())),
            _ => f.props.get(key).cloned(),
        },
        Value::RegExp(re) => match key {
            "source" => Some(Value::string(re.source.clone())),
            "flags" => Some(Value::string(re.flags.clone())),
            "global" => Some(Value::Bool(re.is_global())),
            "ignoreCase" => Some(Value::Bool(re.flags.contains('i'))),
            "multiline" => Some(Value::Bool(re.flags.contains('m'))),
            _ => builtins::regexp_methods().get(key).cloned(),
        },
        Value::Date(_) => builtins::date_methods().get(key).cloned(),
    };
    Ok(found
        .or_else(|| builtins::object_methods().get(key).cloned())
        .unwrap_or_default())
}

/// Source-ish name of a callee for error messages.
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.clone(),
        Expr::This => "this".to_string(),
        Expr::Member(object, name) => format!("{}.{}", describe(object), name),
        Expr::Index(object, _) => format!("{}[...]", describe(object)),
        Expr::Call(callee, _) => format!("{}(...)", describe(callee)),
        Expr::Literal(Literal::Str(s)) => format!("\"{}\"", s),
        Expr::Literal(Literal::Number(n)) => number_to_string(*n),
        Expr::Guard { expr, .. } => describe(expr),
        _ => "expression".to_string(),
    }
}
