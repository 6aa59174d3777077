//! Template compilation: split, classify, rewrite, generate code, evaluate.

use crate::brackets::Brackets;
use crate::classify::{parse_expr, ExprKind};
use crate::cursor::Cursor;
use crate::evaluator::Evaluator;
use crate::rewrite::{restore_marks, Mode};
use crate::scanner::comment_regex;
use crate::splitter::{split, Segment};
use crate::template::{CompiledTemplate, TemplateKind};
use crate::Result;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Marker standing in for a hidden regular-expression literal.
const REGEX_MARK: char = '\u{FFF0}';

/// Characters after which a `/` starts a regular expression.
const REGEX_PRECEDERS: &str = "(,=:[!&|?{;+-*%~^";

static REGEX_LITERAL: OnceLock<Regex> = OnceLock::new();

fn regex_literal_regex() -> &'static Regex {
    REGEX_LITERAL.get_or_init(|| {
        Regex::new(r"/(?:\\.|\[(?:\\.|[^\]\\\r\n])*\]|[^\\/\r\n\[])+/[a-z]*")
            .expect("Invalid regex literal regex")
    })
}

/// Compile `source` with the delimiters in `brackets`.
///
/// A template that is exactly one expression evaluates to the raw value of
/// that expression; anything else evaluates to a string.
pub fn create(source: &str, brackets: &Brackets, evaluator: &dyn Evaluator) -> Result<CompiledTemplate> {
    let (hidden, regexes) = hide_regexes(source);
    let segments = split(&hidden, brackets);
    let mut regexes = regexes.into_iter();
    let max_depth = evaluator.max_depth();

    let (code, kind) = if let Some(expr) = segments.single_expression() {
        let parsed = parse_expr(expr, Mode::Raw, max_depth)?;
        let code = restore_next(&parsed.code, &mut regexes);
        let kind = match parsed.kind {
            ExprKind::Plain => TemplateKind::Expression,
            ExprKind::Shorthand => TemplateKind::Shorthand,
        };
        (if code.is_empty() { "undefined".to_string() } else { code }, kind)
    } else {
        let mut parts = Vec::with_capacity(segments.len());
        for segment in segments.iter() {
            match segment {
                Segment::Text(text) => {
                    if !text.is_empty() {
                        parts.push(quote_text(&restore_next(text, &mut regexes)));
                    }
                }
                Segment::Expr(expr) => {
                    let parsed = parse_expr(expr, Mode::Text, max_depth)?;
                    let code = restore_next(&parsed.code, &mut regexes);
                    parts.push(text_expression(&code));
                }
            }
        }
        let code = match parts.len() {
            0 => "\"\"".to_string(),
            1 => parts.pop().unwrap_or_default(),
            _ => format!("[{}].join(\"\")", parts.join(",")),
        };
        (code, TemplateKind::Text)
    };

    debug!(kind = ?kind, code = %code, "Generated template code");
    let program = evaluator.compile(&code)?;
    Ok(CompiledTemplate::new(source, code, kind, program))
}

/// Replace regular-expression literals with [`REGEX_MARK`] so their
/// brackets cannot confuse the splitter. Block comments are kept in place.
fn hide_regexes(source: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(source.len());
    let mut regexes = Vec::new();
    let mut cursor = Cursor::new(source);
    let mut prev: Option<char> = None;

    while let Some(c) = cursor.peek() {
        if c == '/' {
            if let Some(comment) = cursor.match_at(comment_regex()).and_then(|caps| caps.get(0)) {
                out.push_str(comment.as_str());
                cursor.seek(comment.end());
                continue;
            }
            let allowed = prev.map_or(true, |p| REGEX_PRECEDERS.contains(p));
            if allowed {
                if let Some(literal) = cursor.match_at(regex_literal_regex()).and_then(|caps| caps.get(0)) {
                    regexes.push(literal.as_str().to_string());
                    out.push(REGEX_MARK);
                    prev = literal.as_str().chars().last();
                    cursor.seek(literal.end());
                    continue;
                }
            }
        }
        out.push(c);
        if !c.is_whitespace() {
            prev = Some(c);
        }
        cursor.advance(c.len_utf8());
    }

    (out, regexes)
}

/// Restore the hidden literals of one part, consuming them in order.
fn restore_next(part: &str, regexes: &mut impl Iterator<Item = String>) -> String {
    let count = part.matches(REGEX_MARK).count();
    if count == 0 {
        return part.to_string();
    }
    let values: Vec<String> = regexes.take(count).collect();
    restore_marks(part, &values, REGEX_MARK)
}

/// Wrap a text-mode expression so the whole result degrades to `""` unless
/// it is truthy or zero.
fn text_expression(code: &str) -> String {
    let code = code.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if code.is_empty() {
        "\"\"".to_string()
    } else {
        format!("@guard_text({})", code)
    }
}

/// Quote a text segment as a double-quoted literal.
///
/// Line endings become `\n` and quotes are escaped; an existing backslash
/// escape is kept as written, so `\n` typed in the text stays an escape.
fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                None | Some('\r') | Some('\n') => out.push_str("\\\\"),
                Some(&next) => {
                    out.push('\\');
                    out.push(next);
                    chars.next();
                }
            },
            '"' => out.push_str("\\\""),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push_str("\\n");
            }
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Interpreter, Value};

    fn compile(source: &str) -> Result<CompiledTemplate> {
        let brackets = Brackets::parse("{ }")?;
        create(source, &brackets, &Interpreter::new())
    }

    fn code(source: &str) -> String {
        compile(source).unwrap().code().to_string()
    }

    #[test]
    fn test_single_expression() {
        let template = compile("{ x }").unwrap();
        assert_eq!(template.kind(), TemplateKind::Expression);
        assert_eq!(template.code(), r#"@guard(("x" in d ? d : global).x)"#);
        assert_eq!(code("{}"), "undefined");
        assert_eq!(code("{ /* c */ }"), "undefined");
    }

    #[test]
    fn test_text_template() {
        assert_eq!(code("a { 1 } b"), r#"["a ",@guard_text(1)," b"].join("")"#);
        assert_eq!(code("plain"), r#""plain""#);
        assert_eq!(code(" { } "), r#"[" ",""," "].join("")"#);
        assert_eq!(code("{ x; }!"), r#"[@guard_text(@guard_text(("x" in d ? d : global).x)),"!"].join("")"#);
        assert_eq!(compile("x").unwrap().kind(), TemplateKind::Text);
    }

    #[test]
    fn test_shorthand_kind() {
        assert_eq!(compile("{ a: 1 }").unwrap().kind(), TemplateKind::Shorthand);
    }

    #[test]
    fn test_quote_text() {
        assert_eq!(quote_text("a\r\nb\rc\nd"), r#""a\nb\nc\nd""#);
        assert_eq!(quote_text(r#"say "hi""#), r#""say \"hi\"""#);
        assert_eq!(quote_text(r"\r\n"), r#""\r\n""#);
        assert_eq!(quote_text("end\\"), r#""end\\""#);
        assert_eq!(quote_text("a\\\nb"), r#""a\\\nb""#);
    }

    #[test]
    fn test_hide_regexes() {
        let (hidden, regexes) = hide_regexes("{ /{/.test('{') }");
        assert_eq!(hidden, "{ \u{FFF0}.test('{') }");
        assert_eq!(regexes, vec!["/{/".to_string()]);

        let (hidden, regexes) = hide_regexes("<p>a / b</p> { x / 2 }");
        assert_eq!(hidden, "<p>a / b</p> { x / 2 }");
        assert!(regexes.is_empty());

        let (hidden, _) = hide_regexes("{ /* a } */ 1 }");
        assert_eq!(hidden, "{ /* a } */ 1 }");
    }

    #[test]
    fn test_regex_with_brackets_renders() {
        let template = compile("{ /[{}]/.test(s) ? 'y' : 'n' }").unwrap();
        let data = Value::object_from([("s", Value::from("a}"))]);
        assert_eq!(template.render(&data).unwrap(), Value::from("y"));

        let template = compile("<b>{ s.replace(/\\}/g, ')') }</b>").unwrap();
        assert_eq!(template.render(&data).unwrap(), Value::from("<b>a)</b>"));
    }

    #[test]
    fn test_compile_errors() {
        assert!(compile("{ a: 1, 2 }").is_err());
        assert!(matches!(compile("{ 1 + }"), Err(crate::CurlyError::Syntax { .. })));
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let nested = format!("{}x{}", "f(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(compile(&format!("{{ {} }}", nested)), Err(crate::CurlyError::Syntax { .. })));
        assert!(matches!(compile(&format!("a {{ {} }}", nested)), Err(crate::CurlyError::Syntax { .. })));

        let brackets = Brackets::parse("{ }").unwrap();
        let shallow = Interpreter::new().with_max_depth(4);
        assert!(create("{ f(f(f(f(f(x))))) }", &brackets, &shallow).is_err());
    }
}
