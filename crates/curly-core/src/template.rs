//! Compiled templates.

use crate::evaluator::Program;
use crate::{Result, Value};
use std::fmt;

/// How a template evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    /// A single expression; the result is the raw value.
    Expression,
    /// A single class shorthand; the result is the space-joined class list.
    Shorthand,
    /// Text with embedded expressions; the result is always a string.
    Text,
}

/// A template compiled into a reusable program.
pub struct CompiledTemplate {
    source: String,
    code: String,
    kind: TemplateKind,
    program: Program,
}

impl CompiledTemplate {
    pub fn new(source: impl Into<String>, code: impl Into<String>, kind: TemplateKind, program: Program) -> Self {
        Self {
            source: source.into(),
            code: code.into(),
            kind,
            program,
        }
    }

    /// Original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Generated code handed to the evaluator.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Evaluate the template against a data context.
    pub fn render(&self, data: &Value) -> Result<Value> {
        (self.program)(data)
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("source", &self.source)
            .field("code", &self.code)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_render_calls_program() {
        let program: Program = Arc::new(|data: &Value| Ok(Value::string(format!("<{}>", data))));
        let template = CompiledTemplate::new("{ x }", "x", TemplateKind::Expression, program);
        assert_eq!(template.render(&Value::from(1)).unwrap(), Value::from("<1>"));
        assert_eq!(template.source(), "{ x }");
        assert_eq!(template.kind(), TemplateKind::Expression);
        assert!(format!("{:?}", template).contains("code: \"x\""));
    }
}
