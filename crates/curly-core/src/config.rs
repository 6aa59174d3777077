//! # Curly Configuration
//!
//! Central configuration for a template engine.
//! Supports loading from environment variables and programmatic defaults.

use std::env;

/// Default delimiter pair, left and right separated by one space.
pub const DEFAULT_BRACKETS: &str = "{ }";

/// Default interpreter nesting limit.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Configuration for a [`TemplateEngine`](crate::TemplateEngine).
///
/// # Example
/// ```rust
/// use curly_core::CurlyConfig;
///
/// // Load from environment
/// let config = CurlyConfig::from_env();
///
/// // Or customize
/// let config = CurlyConfig::default()
///     .with_brackets("<% %>")
///     .with_cache(false);
/// assert_eq!(config.brackets.as_deref(), Some("<% %>"));
/// ```
#[derive(Debug, Clone)]
pub struct CurlyConfig {
    /// Delimiter pair as `"LEFT RIGHT"`.
    /// `None` means the default `{ }`.
    /// Env: CURLY_BRACKETS="<% %>"
    pub brackets: Option<String>,

    /// Keep compiled templates keyed by their source text.
    /// Default: true, Env: CURLY_CACHE=false
    pub cache_enabled: bool,

    /// Maximum interpreter nesting (calls, evaluation, JSON nesting).
    /// Default: 256, Env: CURLY_MAX_DEPTH=512
    pub max_depth: usize,
}

impl Default for CurlyConfig {
    fn default() -> Self {
        Self {
            brackets: None,
            cache_enabled: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl CurlyConfig {
    /// Create a new config from environment variables.
    /// Falls back to defaults for missing or unparsable variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = env::var("CURLY_BRACKETS") {
            if !v.is_empty() {
                config.brackets = Some(v);
            }
        }
        if let Ok(v) = env::var("CURLY_CACHE") {
            config.cache_enabled = v.to_lowercase() != "false" && v != "0";
        }
        if let Ok(v) = env::var("CURLY_MAX_DEPTH") {
            if let Ok(n) = v.parse() {
                config.max_depth = n;
            }
        }

        config
    }

    /// Builder: Set the delimiter pair.
    pub fn with_brackets(mut self, brackets: impl Into<String>) -> Self {
        self.brackets = Some(brackets.into());
        self
    }

    /// Builder: Enable or disable the compiled-template cache.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Builder: Set the interpreter nesting limit.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// The configured delimiter pair, or the default one.
    pub fn brackets_or_default(&self) -> &str {
        self.brackets.as_deref().unwrap_or(DEFAULT_BRACKETS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CurlyConfig::default();
        assert!(config.brackets.is_none());
        assert!(config.cache_enabled);
        assert_eq!(config.max_depth, 256);
        assert_eq!(config.brackets_or_default(), "{ }");
    }

    #[test]
    fn test_builder_pattern() {
        let config = CurlyConfig::default()
            .with_brackets("[ ]")
            .with_cache(false)
            .with_max_depth(0);

        assert_eq!(config.brackets_or_default(), "[ ]");
        assert!(!config.cache_enabled);
        assert_eq!(config.max_depth, 1);
    }
}
