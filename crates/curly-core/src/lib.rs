//! # Curly Core
//!
//! Delimiter-aware template-expression compiler.
//!
//! A template is text with embedded expressions such as `Hello { user.name }!`.
//! The compiler splits it, rewrites every free variable into a guarded lookup
//! (a missing value never throws) and hands the generated code to an
//! [`Evaluator`]. The built-in [`Interpreter`] runs it against a data context.
//!
//! ## Features
//!
//! - Configurable delimiters (`{ }`, `{{ }}`, `<% %>`, `[ ]`, ...)
//! - Raw values for single expressions, strings for text templates
//! - Class shorthand: `{ active: isActive, hidden: !show }`
//! - Compiled-template cache keyed by source text
//!
//! ## Example
//!
//! ```rust
//! use curly_core::{render_template, Context, Value};
//!
//! let data = Context::new()
//!     .set("name", "world")
//!     .set("done", false)
//!     .build();
//!
//! assert_eq!(render_template("Hello { name }!", &data).unwrap(), Value::from("Hello world!"));
//! assert_eq!(render_template("{ todo: !done, missing: nope }", &data).unwrap(), Value::from("todo"));
//! assert_eq!(render_template("{ nope.deeper }", &data).unwrap(), Value::Undefined);
//! ```

pub mod brackets;
pub mod cache;
pub mod classify;
pub mod compiler;
pub mod config;
pub mod context;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod rewrite;
pub mod scanner;
pub mod script;
pub mod splitter;
mod stack;
pub mod template;
pub mod value;

pub use brackets::{BracketPart, Brackets, DelimiterConfig};
pub use cache::{Cache, ExactCache, NoCache};
pub use config::CurlyConfig;
pub use context::Context;
pub use engine::{render_template, set_brackets, TemplateEngine};
pub use error::{CurlyError, Result};
pub use evaluator::{Evaluator, Program};
pub use script::{EvalError, Interpreter};
pub use template::{CompiledTemplate, TemplateKind};
pub use value::Value;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        render_template, set_brackets, CompiledTemplate, Context, CurlyConfig, CurlyError, Evaluator,
        Interpreter, Result, TemplateEngine, Value,
    };
}
