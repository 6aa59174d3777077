//! Splits a template into alternating text and expression segments.

use crate::brackets::Brackets;
use crate::cursor::Cursor;
use crate::scanner::{find_matching_close, QuoteSpan};

/// One segment of a split template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Expr(&'a str),
}

/// Ordered segments; even indices are text, odd indices are expressions
/// with their delimiters stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    parts: Vec<String>,
}

impl Segments {
    /// The expression, when the template is exactly one expression with no
    /// surrounding text.
    pub fn single_expression(&self) -> Option<&str> {
        match self.parts.as_slice() {
            [text, expr] if text.is_empty() => Some(expr),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn iter(&self) -> impl Iterator<Item = Segment<'_>> {
        self.parts.iter().enumerate().map(|(i, part)| {
            if i % 2 == 1 {
                Segment::Expr(part)
            } else {
                Segment::Text(part)
            }
        })
    }

    pub fn into_parts(self) -> Vec<String> {
        self.parts
    }
}

/// Split `text` using the delimiter pair in `brackets`.
///
/// At nesting level 0 only an unescaped left delimiter opens an expression;
/// anything else is text. Inside an expression, delimiters in quoted strings
/// or comments are ignored, alternate open brackets skip their whole group,
/// left delimiters nest and an unescaped right delimiter closes level 1. An
/// unterminated expression runs to the end of the text.
pub fn split(text: &str, brackets: &Brackets) -> Segments {
    let re = brackets.split_pattern();
    let left = brackets.left();

    let mut parts = Vec::new();
    let mut span = QuoteSpan::new();
    let mut cursor = Cursor::new(text);
    let mut start = 0;
    let mut level = 0usize;

    while let Some(caps) = cursor.find(re) {
        let Some(found) = caps.get(0) else { break };
        let pos = found.start();
        cursor.seek(found.end());

        let mut closed = None;

        if level > 0 {
            if span.contains(text, pos) {
                continue;
            }
            if let Some(open) = caps.get(2).and_then(|m| m.as_str().chars().next()) {
                let close = find_matching_close(text, found.end(), open, Some(&mut span));
                cursor.seek(close + 1);
            } else if caps.get(1).map(|m| m.as_str()) == Some(left) {
                level += 1;
            } else {
                level -= 1;
                if level == 0 {
                    if found.as_str().starts_with('\\') {
                        level = 1;
                    } else {
                        closed = Some(&text[start..pos]);
                    }
                }
            }
        } else if found.as_str() == left {
            closed = Some(&text[start..pos]);
            level = 1;
            if span.starts_before(pos) {
                span.restart(found.end());
            }
        }

        if let Some(part) = closed {
            start = cursor.pos();
            parts.push(brackets.unescape(part));
        }
    }

    if start < text.len() {
        parts.push(brackets.unescape(&text[start..]));
    }
    if parts.is_empty() {
        parts.push(String::new());
    }

    Segments { parts }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(text: &str, raw: &str) -> Vec<String> {
        split(text, &Brackets::parse(raw).unwrap()).into_parts()
    }

    #[test]
    fn test_single_expression() {
        let segments = split("{ 1 }", &Brackets::parse("{ }").unwrap());
        assert_eq!(segments.single_expression(), Some(" 1 "));
        assert_eq!(parts("{}", "{ }"), vec!["", ""]);
    }

    #[test]
    fn test_text_only() {
        assert_eq!(parts("hello", "{ }"), vec!["hello"]);
        assert_eq!(parts("", "{ }"), vec![""]);
        assert_eq!(parts("/* */", "{ }"), vec!["/* */"]);
    }

    #[test]
    fn test_alternating_segments() {
        let segments = split("a{ x }b{ y }", &Brackets::parse("{ }").unwrap());
        assert_eq!(segments.parts(), ["a", " x ", "b", " y "]);
        assert!(segments.single_expression().is_none());
        let kinds: Vec<_> = segments.iter().collect();
        assert_eq!(kinds[1], Segment::Expr(" x "));
        assert_eq!(kinds[2], Segment::Text("b"));
    }

    #[test]
    fn test_escaped_delimiters() {
        assert_eq!(parts(r"\{ 1 }", "{ }"), vec!["{ 1 }"]);
        assert_eq!(parts(r#"\{ } \} { "0" } }"#, "{ }"), vec![r"{ } } ", r#" "0" "#, " }"]);
        assert_eq!(parts(r"{ \{ \} }", "{ }"), vec!["", " { } "]);
        assert_eq!(parts(r"{\{}}", "{ }"), vec!["", "{}"]);
    }

    #[test]
    fn test_quoted_brackets_in_expression() {
        assert_eq!(parts(r#"a{ "b{c}d" }e"#, "{ }"), vec!["a", r#" "b{c}d" "#, "e"]);
        assert_eq!(parts(r#"a{ "b}cd" }e"#, "{ }"), vec!["a", r#" "b}cd" "#, "e"]);
        assert_eq!(parts(r#"{ "\}" }"#, "{ }"), vec!["", r#" "}" "#]);
    }

    #[test]
    fn test_nested_object_literal() {
        assert_eq!(parts("{{}}", "{ }"), vec!["", "{}"]);
        assert_eq!(
            parts("{ JSON.stringify({ x: 5 }) }", "{ }"),
            vec!["", " JSON.stringify({ x: 5 }) "]
        );
    }

    #[test]
    fn test_custom_brackets() {
        assert_eq!(parts("[ x ]", "[ ]"), vec!["", " x "]);
        assert_eq!(parts(r#"a,[["b","c"]],d"#, "[ ]"), vec!["a,", r#"["b","c"]"#, ",d"]);
        assert_eq!(parts("obj=[[arr[0]]]", "[[ ]]"), vec!["obj=", "arr[0]"]);
        assert_eq!(parts("obj={{{}}}", "{{ }}"), vec!["obj=", "{}"]);
        assert_eq!(parts("a${{}}e", "${ }"), vec!["a", "{}", "e"]);
        assert_eq!(parts(r#".<% "<% %>" %>."#, "<% %>"), vec![".", r#" "<% %>" "#, "."]);
    }

    #[test]
    fn test_unterminated_expression() {
        assert_eq!(parts("a{ b", "{ }"), vec!["a", " b"]);
    }
}
