//! Evaluator trait.
//!
//! The compiler produces source text in the expression language; an
//! evaluator turns that text into a reusable [`Program`].

use crate::config::DEFAULT_MAX_DEPTH;
use crate::{Result, Value};
use std::sync::Arc;

/// A compiled template function: data context in, result out.
pub type Program = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Trait that code evaluators must implement.
///
/// The built-in implementation is [`Interpreter`](crate::Interpreter).
/// Generated code expects:
/// - `d` bound to the data context, also available as `this`
/// - `global` bound to the global object
/// - `@guard(expr)` yielding `undefined` when `expr` throws
/// - `@guard_text(expr)` yielding `""` when `expr` throws or is falsy but not `0`
pub trait Evaluator: Send + Sync {
    /// Get the evaluator name.
    fn name(&self) -> &str {
        "custom"
    }

    /// Deepest bracket nesting the compiler may hand to this evaluator.
    fn max_depth(&self) -> usize {
        DEFAULT_MAX_DEPTH
    }

    /// Compile generated code into a program.
    ///
    /// # Errors
    ///
    /// Returns [`CurlyError::Syntax`](crate::CurlyError::Syntax) when the
    /// code does not parse.
    fn compile(&self, code: &str) -> Result<Program>;
}
