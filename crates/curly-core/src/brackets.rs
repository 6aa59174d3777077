//! Delimiter configuration and the regexes derived from it.
//!
//! A delimiter pair is configured as `"LEFT RIGHT"` (default `"{ }"`). The
//! derived regexes are rebuilt only when the configured string changes.

use crate::config::DEFAULT_BRACKETS;
use crate::{CurlyError, Result};
use parking_lot::RwLock;
use regex::{Captures, Regex};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

/// Bracket families that may appear unescaped inside expressions.
const FAMILIES: [(&str, char, char); 3] = [("{ }", '{', '}'), ("[ ]", '[', ']'), ("( )", '(', ')')];

/// Matches an escaped default delimiter, rewritten per configuration.
const ESCAPED_DEFAULT: &str = r"\\(\{|\})";

static PATTERN_ESCAPE: OnceLock<Regex> = OnceLock::new();

fn pattern_escape_regex() -> &'static Regex {
    PATTERN_ESCAPE.get_or_init(|| Regex::new(r"(?s)\\(.)").expect("Invalid pattern escape regex"))
}

/// Replace the escaped default delimiters (`\{`, `\}`) in a regex source.
fn rewrite_source(source: &str, left: &str, right: &str) -> String {
    pattern_escape_regex()
        .replace_all(source, |caps: &Captures| match &caps[1] {
            "{" => left.to_string(),
            "}" => right.to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Index into the derived delimiter artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BracketPart {
    /// Raw left delimiter.
    Left,
    /// Raw right delimiter.
    Right,
    /// Regex-escaped left delimiter.
    EscapedLeft,
    /// Regex-escaped right delimiter.
    EscapedRight,
    /// Regex matching a backslash-escaped delimiter, capturing the delimiter.
    EscapedPattern,
    /// Regex matching an optionally escaped delimiter (group 1) or an
    /// alternate open bracket (group 2).
    SplitPattern,
}

impl BracketPart {
    /// Map the historical numeric index (0 through 5) to a part.
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Left),
            1 => Some(Self::Right),
            2 => Some(Self::EscapedLeft),
            3 => Some(Self::EscapedRight),
            4 => Some(Self::EscapedPattern),
            5 => Some(Self::SplitPattern),
            _ => None,
        }
    }
}

/// One derived artifact, either a delimiter string or a regex.
#[derive(Debug, Clone, Copy)]
pub enum BracketValue<'a> {
    Str(&'a str),
    Regex(&'a Regex),
}

impl<'a> BracketValue<'a> {
    /// The string form, if this is a delimiter string.
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Regex(_) => None,
        }
    }

    /// The regex, if this is a derived pattern.
    pub fn as_regex(&self) -> Option<&'a Regex> {
        match self {
            Self::Str(_) => None,
            Self::Regex(re) => Some(re),
        }
    }
}

/// A validated delimiter pair with its derived regexes.
#[derive(Debug)]
pub struct Brackets {
    raw: String,
    left: String,
    right: String,
    escaped_left: String,
    escaped_right: String,
    escaped: Regex,
    splitter: Regex,
}

impl Brackets {
    /// Parse and derive a delimiter pair from its `"LEFT RIGHT"` form.
    ///
    /// # Example
    ///
    /// ```
    /// use curly_core::Brackets;
    ///
    /// let brackets = Brackets::parse("<% %>").unwrap();
    /// assert_eq!(brackets.left(), "<%");
    /// assert_eq!(brackets.right(), "%>");
    /// assert!(Brackets::parse("{}").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(' ').collect();
        let (left, right) = match parts.as_slice() {
            [left, right] if !left.is_empty() && !right.is_empty() => (*left, *right),
            _ => {
                return Err(CurlyError::Config(format!(
                    "invalid brackets `{}`: expected \"LEFT RIGHT\"",
                    raw
                )))
            }
        };
        if left == right {
            return Err(CurlyError::Config(format!(
                "invalid brackets `{}`: left and right must differ",
                raw
            )));
        }

        let escaped_left = regex::escape(left);
        let escaped_right = regex::escape(right);

        let escaped = compile(&rewrite_source(ESCAPED_DEFAULT, &escaped_left, &escaped_right))?;

        let mut pattern = format!(r"\\?({}|{})", escaped_left, escaped_right);
        let mut alternates = Vec::new();
        for (family, open, close) in FAMILIES {
            if family == raw {
                break;
            }
            if right.contains(close) && left != open.to_string() {
                alternates.push(format!("\\{}", open));
            }
        }
        if !alternates.is_empty() {
            pattern.push_str(&format!("|({})", alternates.join("|")));
        }
        let splitter = compile(&pattern)?;

        Ok(Self {
            raw: raw.to_string(),
            left: left.to_string(),
            right: right.to_string(),
            escaped_left,
            escaped_right,
            escaped,
            splitter,
        })
    }

    /// The configured string this pair was derived from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn left(&self) -> &str {
        &self.left
    }

    pub fn right(&self) -> &str {
        &self.right
    }

    /// Whether this is the default `{ }` pair.
    pub fn is_default(&self) -> bool {
        self.raw == DEFAULT_BRACKETS
    }

    /// Regex used by the splitter to find delimiter-family occurrences.
    pub fn split_pattern(&self) -> &Regex {
        &self.splitter
    }

    /// Get a derived artifact by part.
    pub fn get(&self, part: BracketPart) -> BracketValue<'_> {
        match part {
            BracketPart::Left => BracketValue::Str(&self.left),
            BracketPart::Right => BracketValue::Str(&self.right),
            BracketPart::EscapedLeft => BracketValue::Str(&self.escaped_left),
            BracketPart::EscapedRight => BracketValue::Str(&self.escaped_right),
            BracketPart::EscapedPattern => BracketValue::Regex(&self.escaped),
            BracketPart::SplitPattern => BracketValue::Regex(&self.splitter),
        }
    }

    /// Rewrite a regex written against the default delimiters so it matches
    /// the configured ones. Default delimiters return the regex unchanged.
    pub fn transform_pattern(&self, pattern: &Regex) -> Result<Regex> {
        if self.is_default() {
            return Ok(pattern.clone());
        }
        compile(&rewrite_source(
            pattern.as_str(),
            &self.escaped_left,
            &self.escaped_right,
        ))
    }

    /// Turn escaped delimiters (`\{`, `\}`) back into plain ones.
    pub fn unescape(&self, text: &str) -> String {
        self.escaped.replace_all(text, "$1").into_owned()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| CurlyError::Config(format!("invalid brackets regex: {}", e)))
}

/// Holder of the configured delimiter pair.
///
/// Resolution is cached against the raw configured string, so repeated calls
/// with an unchanged configuration return the same [`Brackets`].
#[derive(Debug, Default)]
pub struct DelimiterConfig {
    setting: RwLock<Option<String>>,
    cached: RwLock<Option<Arc<Brackets>>>,
}

impl DelimiterConfig {
    /// Create a config with an initial setting (`None` = default).
    pub fn new(setting: Option<String>) -> Self {
        Self {
            setting: RwLock::new(setting),
            cached: RwLock::new(None),
        }
    }

    /// Reconfigure the delimiter pair. Takes effect on the next resolution.
    pub fn set(&self, brackets: Option<&str>) {
        info!("Brackets set to {:?}", brackets.unwrap_or(DEFAULT_BRACKETS));
        *self.setting.write() = brackets.map(str::to_string);
    }

    /// The raw string currently in effect.
    pub fn current(&self) -> String {
        self.setting
            .read()
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_BRACKETS)
            .to_string()
    }

    /// Resolve the configured pair, deriving it only if the setting changed.
    pub fn resolve(&self) -> Result<Arc<Brackets>> {
        let raw = self.current();

        if let Some(cached) = self.cached.read().as_ref() {
            if cached.raw == raw {
                return Ok(Arc::clone(cached));
            }
        }

        debug!("Deriving brackets for {:?}", raw);
        let brackets = Arc::new(Brackets::parse(&raw)?);
        *self.cached.write() = Some(Arc::clone(&brackets));
        Ok(brackets)
    }
}
