//! Data context builder.
//!
//! Templates read their variables from a data context object. [`Context`]
//! assembles one from Rust values, native functions and serializable data.

use crate::script::EvalError;
use crate::value::{Properties, Value};
use crate::Result;
use serde::Serialize;

/// Builder for a template data context.
///
/// # Example
///
/// ```rust
/// use curly_core::{render_template, Context, Value};
///
/// let ctx = Context::new()
///     .set("user", "ada")
///     .set("count", 3)
///     .function("shout", |_this, args| {
///         let text = args.first().cloned().unwrap_or_default();
///         Ok(Value::string(text.to_string().to_uppercase()))
///     });
///
/// let out = render_template("{ shout(user) } x{ count }", &ctx.build()).unwrap();
/// assert_eq!(out, Value::from("ADA x3"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Variables in insertion order.
    pub variables: Properties,
}

impl Context {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Set a variable from any serializable value.
    pub fn set_serialized<T: Serialize>(mut self, key: impl Into<String>, value: &T) -> Result<Self> {
        self.variables.insert(key.into(), Value::from_serialize(value)?);
        Ok(self)
    }

    /// Add a native function callable from templates.
    pub fn function<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> std::result::Result<Value, EvalError> + Send + Sync + 'static,
    {
        let name = name.into();
        let function = Value::function(name.clone(), f);
        self.set(name, function)
    }

    /// Merge every top-level property of a serializable struct or map.
    pub fn extend_from<T: Serialize>(mut self, value: &T) -> Result<Self> {
        if let Value::Object(props) = Value::from_serialize(value)? {
            for (key, value) in props.read().iter() {
                self.variables.insert(key.clone(), value.clone());
            }
        }
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Finish into an object value.
    pub fn build(self) -> Value {
        Value::object(self.variables)
    }
}

impl From<Context> for Value {
    fn from(ctx: Context) -> Self {
        ctx.build()
    }
}
