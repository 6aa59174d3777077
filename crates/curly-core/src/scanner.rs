//! Low-level lexical helpers shared by the splitter and the shorthand compiler.

use regex::Regex;
use std::sync::OnceLock;

/// Block comments, including empty ones and ones holding brackets or quotes.
pub(crate) const COMMENT_PATTERN: &str = r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/";

/// Single or double quoted strings with backslash escapes.
pub(crate) const STRING_PATTERN: &str = r#""(?:[^"\\]|\\(?s:.))*"|'(?:[^'\\]|\\(?s:.))*'"#;

static COMMENTS: OnceLock<Regex> = OnceLock::new();
static STRINGS: OnceLock<Regex> = OnceLock::new();
static SKIP_BLOCKS: OnceLock<Regex> = OnceLock::new();

pub(crate) fn comment_regex() -> &'static Regex {
    COMMENTS.get_or_init(|| Regex::new(COMMENT_PATTERN).expect("Invalid comment regex"))
}

pub(crate) fn string_regex() -> &'static Regex {
    STRINGS.get_or_init(|| Regex::new(STRING_PATTERN).expect("Invalid string regex"))
}

fn skip_blocks_regex() -> &'static Regex {
    SKIP_BLOCKS.get_or_init(|| {
        Regex::new(&format!("{}|{}", COMMENT_PATTERN, STRING_PATTERN))
            .expect("Invalid skip blocks regex")
    })
}

/// Tracks the next quoted string or comment while scanning left to right.
///
/// `bounds` holds the inclusive byte range of the tracked block; `next` is
/// where the following search starts. Both only move forward within a pass,
/// apart from an explicit [`restart`](Self::restart).
#[derive(Debug, Clone, Default)]
pub struct QuoteSpan {
    bounds: Option<(usize, usize)>,
    next: usize,
}

impl QuoteSpan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `pos` lies strictly inside a quoted string or comment.
    ///
    /// Advances the tracked block while it ends before `pos`.
    pub fn contains(&mut self, text: &str, pos: usize) -> bool {
        loop {
            if let Some((_, end)) = self.bounds {
                if pos <= end {
                    break;
                }
            }
            let found = if self.next <= text.len() {
                skip_blocks_regex().find_at(text, self.next)
            } else {
                None
            };
            match found {
                Some(m) => {
                    self.bounds = Some((m.start(), m.end() - 1));
                    self.next = m.end();
                }
                None => {
                    self.bounds = Some((text.len(), text.len()));
                    self.next = text.len();
                    break;
                }
            }
        }

        match self.bounds {
            Some((start, end)) => pos > start && pos < end,
            None => false,
        }
    }

    /// Whether the tracked block (if any) starts before `pos`.
    pub fn starts_before(&self, pos: usize) -> bool {
        self.bounds.map_or(true, |(start, _)| start < pos)
    }

    /// Forget the tracked block and search again from `from`.
    pub fn restart(&mut self, from: usize) {
        self.bounds = None;
        self.next = from;
    }
}

/// Find the bracket closing the group opened just before `from`.
///
/// Only brackets of `open`'s family are counted. When a span is given,
/// brackets inside quoted strings or comments are skipped. Returns the index
/// of the balancing close, or `text.len()` when the group never closes.
pub fn find_matching_close(text: &str, from: usize, open: char, span: Option<&mut QuoteSpan>) -> usize {
    let (open, close) = match open {
        '[' => (b'[', b']'),
        '{' => (b'{', b'}'),
        _ => (b'(', b')'),
    };
    let mut span = span;
    let bytes = text.as_bytes();
    let mut depth = 1usize;

    for (i, &b) in bytes.iter().enumerate().skip(from) {
        if b != open && b != close {
            continue;
        }
        if let Some(span) = span.as_deref_mut() {
            if span.contains(text, i) {
                continue;
            }
        }
        if b == open {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return i;
            }
        }
    }

    text.len()
}
