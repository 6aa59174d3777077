//! Expression classification and class-shorthand compilation.

use crate::cursor::Cursor;
use crate::rewrite::{restore_marks, wrap_expr, Mode};
use crate::scanner::{comment_regex, find_matching_close, string_regex};
use crate::script::lexer::decode_escapes;
use crate::{CurlyError, Result};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Marker standing in for a stashed quoted string.
pub(crate) const STRING_MARK: char = '\u{FFF1}';

static CNAME_PART: OnceLock<Regex> = OnceLock::new();
static PAIR_END: OnceLock<Regex> = OnceLock::new();
static EOL: OnceLock<Regex> = OnceLock::new();

fn cname_regex() -> &'static Regex {
    CNAME_PART.get_or_init(|| {
        Regex::new(r"\s*(\x{FFF1}|-?[_A-Za-z][0-9A-Za-z_-]*)\s*:\s*").expect("Invalid class name regex")
    })
}

fn pair_end_regex() -> &'static Regex {
    PAIR_END.get_or_init(|| Regex::new(r"[,(\[{]").expect("Invalid pair end regex"))
}

fn eol_regex() -> &'static Regex {
    EOL.get_or_init(|| Regex::new(r"\r\n|\r|\n").expect("Invalid EOL regex"))
}

/// What an expression was compiled as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprKind {
    /// A plain host-language expression.
    Plain,
    /// A `name: guard, ...` class list.
    Shorthand,
}

/// Generated code for one expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedExpr {
    pub code: String,
    pub kind: ExprKind,
}

/// Compile one delimiter-bounded expression.
///
/// Comments become a space, quoted strings are stashed, blanks are compacted,
/// then a leading `name:` selects the class-shorthand compiler. Brackets
/// nested deeper than `max_depth` are an error.
pub fn parse_expr(expr: &str, mode: Mode, max_depth: usize) -> Result<ParsedExpr> {
    let uncommented = comment_regex().replace_all(expr, " ");

    let mut strings = Vec::new();
    let hidden = string_regex().replace_all(&uncommented, |caps: &Captures| {
        let literal = &caps[0];
        if literal.len() < 3 {
            literal.to_string()
        } else {
            strings.push(literal.to_string());
            STRING_MARK.to_string()
        }
    });
    let normalized = hidden.split_whitespace().collect::<Vec<_>>().join(" ");

    let is_shorthand = Cursor::new(&normalized).match_at(cname_regex()).is_some();
    let (code, kind) = if is_shorthand {
        (compile_shorthand(&normalized, &mut strings, max_depth)?, ExprKind::Shorthand)
    } else {
        (wrap_expr(&normalized, mode, max_depth)?, ExprKind::Plain)
    };

    let restored: Vec<String> = strings
        .iter()
        .map(|s| s.replace('\n', "\\n").replace('\r', "\\r"))
        .collect();

    Ok(ParsedExpr {
        code: restore_marks(&code, &restored, STRING_MARK),
        kind,
    })
}

/// Compile `name: guard, name: guard` into a space-joined list of the names
/// whose guard is truthy.
fn compile_shorthand(expr: &str, strings: &mut Vec<String>, max_depth: usize) -> Result<String> {
    let mut names = Vec::new();
    let mut guards = Vec::new();
    let mut cursor = Cursor::new(expr);

    loop {
        let Some(caps) = cursor.match_at(cname_regex()) else {
            return Err(CurlyError::Shorthand { expr: snippet(expr, strings) });
        };
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            return Err(CurlyError::Shorthand { expr: snippet(expr, strings) });
        };
        names.push(name.as_str());
        cursor.seek(whole.end());

        let start = cursor.pos();
        let mut end = expr.len();
        let mut more = false;
        while let Some(found) = cursor.find(pair_end_regex()).and_then(|c| c.get(0)) {
            if found.as_str() == "," {
                end = found.start();
                more = true;
                cursor.seek(found.end());
                break;
            }
            let open = found.as_str().chars().next().unwrap_or('(');
            let close = find_matching_close(expr, found.end(), open, None);
            if close >= expr.len() {
                return Err(CurlyError::Unbalanced { expr: snippet(expr, strings) });
            }
            cursor.seek(close + 1);
        }

        guards.push(wrap_expr(&expr[start..end], Mode::Raw, max_depth)?);
        if !more {
            break;
        }
    }

    let mut tests = Vec::with_capacity(names.len());
    let mut next_string = 0;
    for (name, guard) in names.iter().zip(&guards) {
        let label = if name.starts_with(STRING_MARK) && next_string < strings.len() {
            class_name(&strings.remove(next_string))
        } else {
            name.to_string()
        };
        if !strings.is_empty() {
            next_string += guard.matches(STRING_MARK).count();
        }
        tests.push(format!("({}) ? {} : \"\"", guard, quote_literal(&label)));
    }

    Ok(if tests.len() > 1 {
        format!("[{}].join(\" \").trim()", tests.join(","))
    } else {
        tests.pop().unwrap_or_default()
    })
}

/// The expression with its strings put back, for error messages.
fn snippet(expr: &str, strings: &[String]) -> String {
    restore_marks(expr, strings, STRING_MARK)
}

/// Turn a quoted class name into its text: unquoted, EOLs as single spaces,
/// trimmed, escapes decoded.
fn class_name(literal: &str) -> String {
    let body = literal.get(1..literal.len().saturating_sub(1)).unwrap_or("");
    decode_escapes(eol_regex().replace_all(body, " ").trim())
}

/// Encode `value` as a double-quoted literal.
pub(crate) fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(expr: &str) -> String {
        parse_expr(expr, Mode::Raw, 64).unwrap().code
    }

    #[test]
    fn test_plain_expression() {
        let parsed = parse_expr(" 1 + 1 ", Mode::Raw, 64).unwrap();
        assert_eq!(parsed.kind, ExprKind::Plain);
        assert_eq!(parsed.code, "1 + 1");
    }

    #[test]
    fn test_comments_and_blanks() {
        assert_eq!(code(" 1 /* c */ +\n\r 1 "), "1 + 1");
        assert_eq!(code(" /* comment */ /* as*/ "), "");
        assert_eq!(code(r#" "a" + "/*b*/" + "c" "#), r#""a" + " " + "c""#);
    }

    #[test]
    fn test_strings_restored() {
        assert_eq!(code(r#" "a:b" "#), r#""a:b""#);
        assert_eq!(code("\"y\ne\r\""), r#""y\ne\r""#);
        assert_eq!(code(" '' "), "''");
    }

    #[test]
    fn test_shorthand_single() {
        let parsed = parse_expr(" ok : yes ", Mode::Text, 64).unwrap();
        assert_eq!(parsed.kind, ExprKind::Shorthand);
        assert_eq!(parsed.code, r#"(@guard(("yes" in d ? d : global).yes)) ? "ok" : """#);
    }

    #[test]
    fn test_shorthand_list() {
        let out = code(r#" "a" : 1, 'b': x == "s", c-d: 0 "#);
        assert_eq!(
            out,
            concat!(
                r#"[(1) ? "a" : "","#,
                r#"(@guard(("x" in d ? d : global).x) == "s") ? "b" : "","#,
                r#"(0) ? "c-d" : ""].join(" ").trim()"#
            )
        );
    }

    #[test]
    fn test_shorthand_nested_commas() {
        let out = code(" ok: [1,2].length === (2) ");
        assert_eq!(out, r#"([1,2].length === (2)) ? "ok" : """#);
    }

    #[test]
    fn test_shorthand_names() {
        assert!(code("\"a\nb\r\nc\n\nd\re\": 1").ends_with(r#"? "a b c  d e" : """#));
        assert!(code("\"\n a\nb\rc \r\n\": 1").ends_with(r#"? "a b c" : """#));
        assert!(code(r#" "\"a b\"": 1 "#).ends_with(r#"? "\"a b\"" : """#));
        assert!(code(r#" 'it"s': 1 "#).ends_with(r#"? "it\"s" : """#));
    }

    #[test]
    fn test_shorthand_errors() {
        assert!(matches!(
            parse_expr("a: 1, 2", Mode::Raw, 64),
            Err(CurlyError::Shorthand { .. })
        ));
        assert!(matches!(
            parse_expr("a: fn(1", Mode::Raw, 64),
            Err(CurlyError::Unbalanced { .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("ok: {}1{}", "f(".repeat(100), ")".repeat(100));
        assert!(matches!(parse_expr(&deep, Mode::Raw, 64), Err(CurlyError::Syntax { .. })));
        assert!(parse_expr(&deep, Mode::Raw, 128).is_ok());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(quote_literal("x\ny"), r#""x\ny""#);
    }
}
