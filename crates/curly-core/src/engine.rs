//! Template Engine - the public entry point for compiling and rendering.
//!
//! An engine owns its delimiter configuration, its compiled-template cache
//! and the evaluator that runs generated code. A process-wide default engine
//! backs [`render_template`] and [`set_brackets`].

use crate::brackets::{Brackets, DelimiterConfig};
use crate::cache::{Cache, ExactCache, NoCache};
use crate::compiler;
use crate::config::CurlyConfig;
use crate::evaluator::Evaluator;
use crate::script::Interpreter;
use crate::template::CompiledTemplate;
use crate::{Result, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, instrument};

static DEFAULT_ENGINE: OnceLock<TemplateEngine> = OnceLock::new();

/// The main engine for template compilation and rendering.
///
/// # Example
///
/// ```rust
/// use curly_core::{CurlyConfig, TemplateEngine, Value};
///
/// let engine = TemplateEngine::new(CurlyConfig::default());
/// let data = Value::object_from([("name", Value::from("curly"))]);
///
/// assert_eq!(engine.render("hi { name }!", &data).unwrap(), Value::from("hi curly!"));
/// assert_eq!(engine.render("{ 1 + 1 }", &data).unwrap(), Value::from(2));
/// ```
pub struct TemplateEngine {
    /// Active delimiter pair.
    delimiters: DelimiterConfig,

    /// Compiled templates keyed by source.
    cache: Arc<dyn Cache>,

    /// Runs generated code.
    evaluator: Arc<dyn Evaluator>,

    config: CurlyConfig,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new(CurlyConfig::default())
    }
}

impl TemplateEngine {
    /// Create an engine with the built-in interpreter.
    pub fn new(config: CurlyConfig) -> Self {
        let cache: Arc<dyn Cache> = if config.cache_enabled {
            Arc::new(ExactCache::new())
        } else {
            Arc::new(NoCache)
        };
        let evaluator = Arc::new(Interpreter::new().with_max_depth(config.max_depth));
        Self {
            delimiters: DelimiterConfig::new(config.brackets.clone()),
            cache,
            evaluator,
            config,
        }
    }

    /// Replace the evaluator that runs generated code.
    pub fn with_evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Replace the compiled-template cache.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &CurlyConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Change the delimiter pair; `None` or an empty string restores `{ }`.
    ///
    /// Templates already compiled stay cached under their source text.
    pub fn set_brackets(&self, brackets: Option<&str>) {
        self.delimiters.set(brackets);
    }

    /// The active delimiter pair.
    pub fn brackets(&self) -> Result<Arc<Brackets>> {
        self.delimiters.resolve()
    }

    /// Compile a template, or fetch it from the cache.
    #[instrument(skip(self, source), fields(len = source.len(), evaluator = self.evaluator.name()))]
    pub fn compile(&self, source: &str) -> Result<Arc<CompiledTemplate>> {
        self.cache.get_or_compile(source, &mut || {
            let brackets = self.delimiters.resolve()?;
            debug!(brackets = brackets.raw(), "Compiling template");
            Ok(Arc::new(compiler::create(source, &brackets, self.evaluator.as_ref())?))
        })
    }

    /// Render `source` against `data`.
    ///
    /// An empty source renders the empty string without compiling.
    pub fn render(&self, source: &str, data: &Value) -> Result<Value> {
        if source.is_empty() {
            return Ok(Value::string(""));
        }
        self.compile(source)?.render(data)
    }
}

/// The process-wide engine, configured from the environment on first use.
pub fn default_engine() -> &'static TemplateEngine {
    DEFAULT_ENGINE.get_or_init(|| {
        let config = CurlyConfig::from_env();
        info!(brackets = config.brackets_or_default(), "Initializing default template engine");
        TemplateEngine::new(config)
    })
}

/// Render with the default engine.
///
/// # Example
///
/// ```rust
/// use curly_core::{render_template, Value};
///
/// let data = Value::object_from([("x", Value::from(2))]);
/// assert_eq!(render_template(" { x } ", &data).unwrap(), Value::from(" 2 "));
/// ```
pub fn render_template(source: &str, data: &Value) -> Result<Value> {
    default_engine().render(source, data)
}

/// Change the delimiters of the default engine; `None` restores `{ }`.
pub fn set_brackets(brackets: Option<&str>) {
    default_engine().set_brackets(brackets);
}
