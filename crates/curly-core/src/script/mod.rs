//! # Curly Script
//!
//! The embedded evaluator for generated template code: a small expression
//! language with the host semantics the compiler relies on (`in` lookups,
//! `typeof`, closures, `new`, regex literals) plus the `@guard` and
//! `@guard_text` intrinsics that turn a failing access into a sentinel.

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod lexer;
pub mod parser;

use crate::config::DEFAULT_MAX_DEPTH;
use crate::evaluator::{Evaluator, Program};
use crate::value::Value;
use crate::{CurlyError, Result};
use ast::Expr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// An error raised while parsing or evaluating generated code.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    #[error("TypeError: {0}")]
    Type(String),

    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("SyntaxError: {message}")]
    Syntax { message: String, position: usize },
}

impl EvalError {
    pub fn syntax(message: impl Into<String>, position: usize) -> Self {
        EvalError::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Error raised while parsing, reported with its position.
    fn into_compile_error(self) -> CurlyError {
        match self {
            EvalError::Syntax { message, position } => CurlyError::Syntax { message, position },
            other => CurlyError::Runtime(other.to_string()),
        }
    }
}

/// Error raised while running a program.
fn runtime_error(e: EvalError) -> CurlyError {
    CurlyError::Runtime(e.to_string())
}

/// Tree-walking interpreter over a shared global object.
///
/// # Example
///
/// ```rust
/// use curly_core::{Interpreter, Value};
///
/// let interpreter = Interpreter::new().with_global("answer", 42);
/// let data = Value::object_from([("x", Value::from(2))]);
/// let out = interpreter.eval("d.x * answer", &data).unwrap();
/// assert_eq!(out, Value::from(84));
/// ```
pub struct Interpreter {
    globals: Value,
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            globals: builtins::global_object(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Bound parse nesting and call depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Define a property of the global object.
    pub fn with_global(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Value::Object(props) = &self.globals {
            props.write().insert(name.into(), value.into());
        }
        self
    }

    /// The global object, visible to generated code as `global`.
    pub fn globals(&self) -> &Value {
        &self.globals
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn parse(&self, code: &str) -> Result<Expr> {
        parser::parse(code, self.max_depth).map_err(EvalError::into_compile_error)
    }

    /// Run a parsed program with `data` bound to `d` and `this`.
    pub fn run(&self, expr: &Expr, data: &Value) -> Result<Value> {
        eval::run(expr, data, &self.globals, self.max_depth).map_err(runtime_error)
    }

    /// Parse and run `code` once.
    pub fn eval(&self, code: &str, data: &Value) -> Result<Value> {
        let expr = self.parse(code)?;
        self.run(&expr, data)
    }
}

impl Evaluator for Interpreter {
    fn name(&self) -> &str {
        "interpreter"
    }

    fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn compile(&self, code: &str) -> Result<Program> {
        let expr = Arc::new(self.parse(code)?);
        debug!(len = code.len(), "Parsed generated code");

        let globals = self.globals.clone();
        let max_depth = self.max_depth;
        Ok(Arc::new(move |data: &Value| {
            eval::run(&expr, data, &globals, max_depth).map_err(runtime_error)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_with_globals() {
        let interpreter = Interpreter::new().with_global("globalVar", 5);
        let data = Value::object_from([("x", Value::from(2))]);
        assert_eq!(interpreter.eval("globalVar + d.x", &data).unwrap(), Value::from(7));
        assert_eq!(
            interpreter.eval("global.globalVar", &data).unwrap(),
            Value::from(5)
        );
    }

    #[test]
    fn test_error_mapping() {
        let interpreter = Interpreter::new();
        let data = Value::Undefined;
        assert!(matches!(
            interpreter.eval("1 +", &data),
            Err(CurlyError::Syntax { .. })
        ));
        let err = interpreter.eval("nope", &data).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Runtime error: ReferenceError: nope is not defined"
        );
        assert!(matches!(
            interpreter.eval("JSON.parse('x')", &data),
            Err(CurlyError::Runtime(_))
        ));
    }

    #[test]
    fn test_compiled_program_is_reusable() {
        let interpreter = Interpreter::new();
        let program = interpreter.compile("d.n * 2").unwrap();
        for n in 0..3 {
            let data = Value::object_from([("n", Value::from(n))]);
            assert_eq!(program(&data).unwrap(), Value::from(n * 2));
        }
        assert_eq!(interpreter.name(), "interpreter");
    }

    #[test]
    fn test_depth_limit() {
        let interpreter = Interpreter::new().with_max_depth(8);
        assert!(interpreter.parse(&format!("{}1{}", "(".repeat(20), ")".repeat(20))).is_err());
        let err = interpreter
            .eval("(function f(n) { return f(n + 1) })(0)", &Value::Undefined)
            .unwrap_err();
        assert!(err.to_string().contains("RangeError"));
    }
}
