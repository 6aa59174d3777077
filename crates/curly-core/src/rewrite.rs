//! Rewrites free variables into guarded context-or-global lookups.
//!
//! `x.y[z]` becomes `@guard(("x" in d ? d : global).x.y[@guard(...)])`, so a
//! missing value or failing access degrades to a sentinel instead of an error.

use crate::cursor::Cursor;
use crate::scanner::find_matching_close;
use crate::stack::ensure_sufficient_stack;
use crate::{CurlyError, Result};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Marker hiding object-literal keys and `}` runs while variables are wrapped.
pub(crate) const KEY_MARK: char = '\u{FFF3}';

/// Keywords that are constant falsy values.
const FALSY_KEYWORDS: [&str; 4] = ["undefined", "false", "null", "NaN"];

static HAS_NAME: OnceLock<Regex> = OnceLock::new();
static SPLIT_OBJ: OnceLock<Regex> = OnceLock::new();
static VAR_NAMES: OnceLock<Regex> = OnceLock::new();
static VAR_PASTE: OnceLock<Regex> = OnceLock::new();

fn has_name_regex() -> &'static Regex {
    HAS_NAME.get_or_init(|| Regex::new(r"[$_A-Za-z]").expect("Invalid name regex"))
}

fn split_obj_regex() -> &'static Regex {
    SPLIT_OBJ.get_or_init(|| {
        Regex::new(r"\{?\s*\}+\s*|([,{])\s*(\x{FFF1}|[$_A-Za-z][$0-9A-Za-z_]*)\s*:\s*")
            .expect("Invalid object key regex")
    })
}

/// Skipped forms come first; only group 2 is a rewritable name.
fn var_names_regex() -> &'static Regex {
    VAR_NAMES.get_or_init(|| {
        Regex::new(concat!(
            r"\.\s*[$0-9A-Za-z_]+",
            r"|\b(?:typeof|in|instanceof|void)[(\s]",
            r"|\btrue\b",
            r"|\bfunction\s*\(",
            r"|\b(?:\d*\.\d+|0[xX][0-9A-Fa-f]+|\d+)(?:[eE][+-]?\d+)?\b",
            r"|(\bnew\s+)?([$_A-Za-z][$0-9A-Za-z_]*)",
        ))
        .expect("Invalid variable name regex")
    })
}

fn var_paste_regex() -> &'static Regex {
    VAR_PASTE.get_or_init(|| {
        Regex::new(r"\s*(?:([\[(])|\.\s*([$0-9A-Za-z_]+))").expect("Invalid property chain regex")
    })
}

/// How a guarded access degrades when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Errors become `undefined`; falsy keywords are kept.
    Raw,
    /// Errors and falsy values other than `0` become `""`.
    Text,
}

/// Guard every free variable in `expr`.
///
/// Object keys and closing braces are hidden first so `{ a: x }` keys are not
/// mistaken for variables and ternary colons stay intact. Index and call
/// brackets nested more than `max_depth` levels deep are a
/// [`CurlyError::Syntax`].
///
/// # Example
///
/// ```
/// use curly_core::rewrite::{wrap_expr, Mode};
///
/// assert_eq!(wrap_expr("1 + 2", Mode::Raw, 256).unwrap(), "1 + 2");
/// assert_eq!(wrap_expr("x", Mode::Raw, 256).unwrap(), r#"@guard(("x" in d ? d : global).x)"#);
/// ```
pub fn wrap_expr(expr: &str, mode: Mode, max_depth: usize) -> Result<String> {
    if !has_name_regex().is_match(expr) {
        return Ok(expr.to_string());
    }

    let mut keys = Vec::new();
    let hidden = split_obj_regex().replace_all(expr, |caps: &Captures| {
        keys.push(match (caps.get(1), caps.get(2)) {
            (Some(open), Some(key)) => format!("{}{}:", open.as_str(), key.as_str()),
            _ => caps[0].chars().filter(|c| !c.is_whitespace()).collect(),
        });
        KEY_MARK.to_string()
    });

    let wrapped = wrap_vars(&hidden, mode, max_depth).map_err(|position| CurlyError::Syntax {
        message: format!("expression nests deeper than {} levels", max_depth),
        position,
    })?;
    Ok(restore_marks(&wrapped, &keys, KEY_MARK))
}

/// Wrap each variable reference in `expr`, recursing into index and call
/// brackets that follow it.
///
/// `depth` is how many more bracket levels may be entered. Running out
/// yields the offset of the bracket that went too deep.
pub fn wrap_vars(expr: &str, mode: Mode, depth: usize) -> std::result::Result<String, usize> {
    let mut out = String::with_capacity(expr.len() + 32);
    let mut cursor = Cursor::new(expr);
    let mut copied = 0;

    while let Some(caps) = cursor.find(var_names_regex()) {
        let Some(whole) = caps.get(0) else { break };
        cursor.seek(whole.end());

        let Some(name) = caps.get(2).map(|m| m.as_str()) else {
            continue;
        };
        let is_new = caps.get(1).is_some();
        let falsy = !is_new && FALSY_KEYWORDS.contains(&name);
        if falsy && mode == Mode::Raw {
            continue;
        }

        out.push_str(&expr[copied..whole.start()]);
        if falsy {
            out.push_str("\"\"");
            copied = cursor.pos();
            continue;
        }

        let mut access = if is_new {
            format!("new {}", lookup(name))
        } else if name == "this" {
            name.to_string()
        } else {
            lookup(name)
        };

        while let Some(paste) = cursor.match_at(var_paste_regex()) {
            let end = paste.get(0).map_or(cursor.pos(), |m| m.end());
            if let Some(open) = paste.get(1).and_then(|m| m.as_str().chars().next()) {
                if depth == 0 {
                    return Err(end - 1);
                }
                let close = (find_matching_close(expr, end, open, None) + 1).min(expr.len());
                access.push(open);
                let inner = ensure_sufficient_stack(|| wrap_vars(&expr[end..close], mode, depth - 1))
                    .map_err(|pos| end + pos)?;
                access.push_str(&inner);
                cursor.seek(close);
            } else if let Some(prop) = paste.get(2) {
                access.push('.');
                access.push_str(prop.as_str());
                cursor.seek(end);
            } else {
                break;
            }
        }

        out.push_str(&guard(&access, mode));
        copied = cursor.pos().min(expr.len());
    }

    out.push_str(&expr[copied..]);
    Ok(out.trim().to_string())
}

/// Context-first, global-second lookup of `name`.
fn lookup(name: &str) -> String {
    format!("(\"{0}\" in d ? d : global).{0}", name)
}

fn guard(access: &str, mode: Mode) -> String {
    match mode {
        Mode::Raw => format!("@guard({})", access),
        Mode::Text => format!("@guard_text({})", access),
    }
}

/// Put hidden values back, one per marker, in order.
pub(crate) fn restore_marks(text: &str, values: &[String], mark: char) -> String {
    let mut values = values.iter();
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == mark {
            if let Some(value) = values.next() {
                out.push_str(value);
                continue;
            }
        }
        out.push(c);
    }
    out
}
