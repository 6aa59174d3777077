//! Tokenizer for the expression language.

use super::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    /// `@name` intrinsic.
    Intrinsic(String),
    Regex { source: String, flags: String },
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

/// Longest first.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "(", ")", "[", "]", "{", "}", ",", ";", ":",
    ".", "?", "!", "+", "-", "*", "/", "%", "<", ">", "=",
];

/// Keywords after which a `/` starts a regex literal.
const OPERATOR_KEYWORDS: [&str; 7] = ["typeof", "void", "in", "instanceof", "new", "return", "case"];

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, EvalError> {
    Lexer { src, pos: 0 }.run()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Spanned>, EvalError> {
        let mut tokens: Vec<Spanned> = Vec::new();
        loop {
            self.skip_trivia()?;
            let pos = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Spanned { token: Token::Eof, pos });
                return Ok(tokens);
            };

            let token = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).map_or(false, |d| d.is_ascii_digit())) {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.string(c)?
            } else if is_ident_start(c) {
                Token::Ident(self.ident())
            } else if c == '@' {
                self.pos += 1;
                let name = self.ident();
                if name.is_empty() {
                    return Err(EvalError::syntax("Invalid or unexpected token '@'", pos));
                }
                Token::Intrinsic(name)
            } else if c == '/' && regex_allowed(tokens.last().map(|t| &t.token)) {
                self.regex()?
            } else {
                self.punct()?
            };
            tokens.push(Spanned { token, pos });
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn skip_trivia(&mut self) -> Result<(), EvalError> {
        loop {
            let rest = self.rest();
            if let Some(c) = rest.chars().next().filter(|c| c.is_whitespace()) {
                self.pos += c.len_utf8();
            } else if rest.starts_with("/*") {
                let end = rest[2..]
                    .find("*/")
                    .ok_or_else(|| EvalError::syntax("Unterminated comment", self.pos))?;
                self.pos += end + 4;
            } else if rest.starts_with("//") {
                self.pos += rest.find(['\n', '\r']).unwrap_or(rest.len());
            } else {
                return Ok(());
            }
        }
    }

    fn ident(&mut self) -> String {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|&(_, c)| !is_ident_part(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += len;
        rest[..len].to_string()
    }

    fn number(&mut self) -> Result<Token, EvalError> {
        let start = self.pos;
        let rest = self.rest();
        let bytes = rest.as_bytes();

        let (value, len) = if rest.starts_with("0x") || rest.starts_with("0X") {
            let digits = rest[2..].bytes().take_while(u8::is_ascii_hexdigit).count();
            if digits == 0 {
                return Err(EvalError::syntax("Invalid or unexpected token", start));
            }
            let value = u64::from_str_radix(&rest[2..2 + digits], 16).map_or(f64::INFINITY, |n| n as f64);
            (value, 2 + digits)
        } else {
            let mut i = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
            if bytes.get(i) == Some(&b'.') {
                i += 1;
                i += bytes[i..].iter().take_while(|b| b.is_ascii_digit()).count();
            }
            if matches!(bytes.get(i), Some(b'e' | b'E')) {
                let mut j = i + 1;
                if matches!(bytes.get(j), Some(b'+' | b'-')) {
                    j += 1;
                }
                let exp_digits = bytes[j..].iter().take_while(|b| b.is_ascii_digit()).count();
                if exp_digits == 0 {
                    return Err(EvalError::syntax("Invalid or unexpected token", start));
                }
                i = j + exp_digits;
            }
            let value = rest[..i]
                .parse::<f64>()
                .map_err(|_| EvalError::syntax("Invalid number literal", start))?;
            (value, i)
        };

        self.pos += len;
        if self.peek().map_or(false, |c| is_ident_part(c)) {
            return Err(EvalError::syntax("Invalid or unexpected token", self.pos));
        }
        Ok(Token::Number(value))
    }

    fn string(&mut self, quote: char) -> Result<Token, EvalError> {
        let start = self.pos;
        let rest = self.rest();
        let mut escaped = false;
        for (i, c) in rest.char_indices().skip(1) {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                self.pos += i + 1;
                return Ok(Token::Str(decode_escapes(&rest[1..i])));
            } else if c == '\n' || c == '\r' {
                break;
            }
        }
        Err(EvalError::syntax("Invalid or unexpected token: unterminated string", start))
    }

    fn regex(&mut self) -> Result<Token, EvalError> {
        let start = self.pos;
        let rest = self.rest();
        let mut escaped = false;
        let mut in_class = false;
        for (i, c) in rest.char_indices().skip(1) {
            match c {
                '\n' | '\r' => break,
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => {
                    if i == 1 {
                        break;
                    }
                    let source = rest[1..i].to_string();
                    let flags: String = rest[i + 1..].chars().take_while(|c| is_ident_part(*c)).collect();
                    self.pos += i + 1 + flags.len();
                    return Ok(Token::Regex { source, flags });
                }
                _ => {}
            }
        }
        Err(EvalError::syntax("Invalid regular expression: missing /", start))
    }

    fn punct(&mut self) -> Result<Token, EvalError> {
        let rest = self.rest();
        for p in PUNCTUATORS {
            if rest.starts_with(p) {
                self.pos += p.len();
                return Ok(Token::Punct(*p));
            }
        }
        let c = rest.chars().next().unwrap_or(' ');
        Err(EvalError::syntax(format!("Invalid or unexpected token '{}'", c), self.pos))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn regex_allowed(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(Token::Punct(p)) => !matches!(*p, ")" | "]" | "}"),
        Some(Token::Ident(name)) => OPERATOR_KEYWORDS.contains(&name.as_str()),
        Some(Token::Intrinsic(_)) => false,
        Some(_) => false,
    }
}

/// Decode backslash escapes of a string literal body.
pub(crate) fn decode_escapes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(e) = chars.next() else {
            out.push('\\');
            break;
        };
        match e {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.peek().map_or(false, char::is_ascii_digit) => out.push('\0'),
            'x' => {
                let hex: String = chars.clone().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().filter(|_| hex.len() == 2).and_then(char::from_u32) {
                    Some(ch) => {
                        out.push(ch);
                        chars.nth(1);
                    }
                    None => out.push('x'),
                }
            }
            'u' => {
                if chars.peek() == Some(&'{') {
                    let code: String = chars.clone().skip(1).take_while(|c| *c != '}').collect();
                    match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                        Some(ch) => {
                            out.push(ch);
                            for _ in 0..code.len() + 2 {
                                chars.next();
                            }
                        }
                        None => out.push('u'),
                    }
                } else {
                    let hex: String = chars.clone().take(4).collect();
                    let unit = u32::from_str_radix(&hex, 16).ok().filter(|_| hex.len() == 4);
                    match unit {
                        Some(unit) => {
                            for _ in 0..4 {
                                chars.next();
                            }
                            out.push(decode_unit(unit, &mut chars));
                        }
                        None => out.push('u'),
                    }
                }
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\n' | '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
    }
    out
}

/// Combine a `\uD8xx\uDCxx` surrogate pair when one follows.
fn decode_unit(unit: u32, chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> char {
    if (0xD800..0xDC00).contains(&unit) {
        let ahead: String = chars.clone().take(6).collect();
        if let Some(low) = ahead
            .strip_prefix("\\u")
            .and_then(|h| u32::from_str_radix(h, 16).ok())
            .filter(|low| (0xDC00..0xE000).contains(low))
        {
            for _ in 0..6 {
                chars.next();
            }
            let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
            return char::from_u32(code).unwrap_or('\u{FFFD}');
        }
    }
    char::from_u32(unit).unwrap_or('\u{FFFD}')
}
