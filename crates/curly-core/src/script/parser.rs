//! Recursive-descent parser producing an [`Expr`] tree.

use super::ast::{BinaryOp, Expr, FunctionDef, Literal, LogicalOp, UnaryOp};
use super::lexer::{tokenize, Spanned, Token};
use super::EvalError;
use crate::stack::ensure_sufficient_stack;
use crate::value::number_to_string;
use std::sync::Arc;

/// Parse a complete program: one expression, optionally followed by `;`.
/// Empty input evaluates to `undefined`.
pub fn parse(src: &str, max_depth: usize) -> Result<Expr, EvalError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
        max_depth,
    };

    parser.skip_semicolons();
    if parser.at_eof() {
        return Ok(Expr::Literal(Literal::Undefined));
    }
    let expr = parser.expression()?;
    parser.skip_semicolons();
    if !parser.at_eof() {
        return Err(parser.unexpected());
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
    max_depth: usize,
}

fn binary_op(token: &Token) -> Option<(u8, Op)> {
    let op = match token {
        Token::Punct("||") => (1, Op::Logical(LogicalOp::Or)),
        Token::Punct("&&") => (2, Op::Logical(LogicalOp::And)),
        Token::Punct("==") => (3, Op::Binary(BinaryOp::Eq)),
        Token::Punct("!=") => (3, Op::Binary(BinaryOp::Ne)),
        Token::Punct("===") => (3, Op::Binary(BinaryOp::StrictEq)),
        Token::Punct("!==") => (3, Op::Binary(BinaryOp::StrictNe)),
        Token::Punct("<") => (4, Op::Binary(BinaryOp::Lt)),
        Token::Punct(">") => (4, Op::Binary(BinaryOp::Gt)),
        Token::Punct("<=") => (4, Op::Binary(BinaryOp::Le)),
        Token::Punct(">=") => (4, Op::Binary(BinaryOp::Ge)),
        Token::Ident(k) if k == "in" => (4, Op::Binary(BinaryOp::In)),
        Token::Ident(k) if k == "instanceof" => (4, Op::Binary(BinaryOp::InstanceOf)),
        Token::Punct("+") => (5, Op::Binary(BinaryOp::Add)),
        Token::Punct("-") => (5, Op::Binary(BinaryOp::Sub)),
        Token::Punct("*") => (6, Op::Binary(BinaryOp::Mul)),
        Token::Punct("/") => (6, Op::Binary(BinaryOp::Div)),
        Token::Punct("%") => (6, Op::Binary(BinaryOp::Rem)),
        _ => return None,
    };
    Some(op)
}

#[derive(Clone, Copy)]
enum Op {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Words that can never be identifiers in an expression.
const RESERVED: [&str; 12] = [
    "return", "var", "let", "const", "if", "else", "for", "while", "do", "delete", "in", "instanceof",
];

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.index)
            .map_or(&Token::Eof, |t| &t.token)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.index).map_or(0, |t| t.pos)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Token::Punct(q) if *q == p)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Ident(w) if w == word)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, p: &str) -> Result<(), EvalError> {
        if self.eat(p) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn skip_semicolons(&mut self) {
        while self.eat(";") {}
    }

    fn unexpected(&self) -> EvalError {
        let found = match self.peek() {
            Token::Eof => "end of input".to_string(),
            Token::Number(n) => number_to_string(*n),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Ident(s) | Token::Intrinsic(s) => format!("'{}'", s),
            Token::Regex { source, .. } => format!("/{}/", source),
            Token::Punct(p) => format!("'{}'", p),
        };
        EvalError::syntax(format!("Unexpected {}", found), self.pos())
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EvalError::syntax("Expression nested too deeply", self.pos()));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Comma-separated sequence.
    fn expression(&mut self) -> Result<Expr, EvalError> {
        let first = self.conditional()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(",") {
            items.push(self.conditional()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn conditional(&mut self) -> Result<Expr, EvalError> {
        ensure_sufficient_stack(|| self.nested_conditional())
    }

    fn nested_conditional(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let test = self.binary(1)?;
        let result = if self.eat("?") {
            let consequent = self.conditional()?;
            self.expect(":")?;
            let alternate = self.conditional()?;
            Expr::Conditional(Box::new(test), Box::new(consequent), Box::new(alternate))
        } else {
            test
        };
        if self.is_punct("=") {
            return Err(EvalError::syntax("Assignment is not supported", self.pos()));
        }
        self.leave();
        Ok(result)
    }

    fn binary(&mut self, min_prec: u8) -> Result<Expr, EvalError> {
        let mut left = self.unary()?;
        while let Some((prec, op)) = binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.next();
            let right = self.binary(prec + 1)?;
            left = match op {
                Op::Binary(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                Op::Logical(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek() {
            Token::Punct("!") => UnaryOp::Not,
            Token::Punct("-") => UnaryOp::Neg,
            Token::Punct("+") => UnaryOp::Plus,
            Token::Ident(w) if w == "typeof" => UnaryOp::TypeOf,
            Token::Ident(w) if w == "void" => UnaryOp::Void,
            _ => return self.postfix(),
        };
        self.next();
        self.enter()?;
        let operand = self.unary()?;
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = if self.is_keyword("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            if self.eat(".") {
                expr = Expr::Member(Box::new(expr), self.property_name()?);
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.is_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// `new Callee(args)` where the callee is a member chain without calls.
    fn new_expression(&mut self) -> Result<Expr, EvalError> {
        self.next();
        self.enter()?;
        let mut callee = if self.is_keyword("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            if self.eat(".") {
                callee = Expr::Member(Box::new(callee), self.property_name()?);
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                callee = Expr::Index(Box::new(callee), Box::new(index));
            } else {
                break;
            }
        }
        let args = if self.is_punct("(") {
            self.arguments()?
        } else {
            Vec::new()
        };
        self.leave();
        Ok(Expr::New(Box::new(callee), args))
    }

    fn property_name(&mut self) -> Result<String, EvalError> {
        match self.next() {
            Token::Ident(name) => Ok(name),
            _ => {
                self.index -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, EvalError> {
        self.expect("(")?;
        let mut args = Vec::new();
        while !self.eat(")") {
            args.push(self.conditional()?);
            if !self.eat(",") {
                self.expect(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let pos = self.pos();
        match self.next() {
            Token::Number(n) => Ok(Expr::Literal(Literal::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Literal::Str(s))),
            Token::Regex { source, flags } => Ok(Expr::Regex { source, flags }),
            Token::Ident(word) => Ok(match word.as_str() {
                "true" => Expr::Literal(Literal::Bool(true)),
                "false" => Expr::Literal(Literal::Bool(false)),
                "null" => Expr::Literal(Literal::Null),
                "this" => Expr::This,
                "function" => return self.function(),
                w if RESERVED.contains(&w) => {
                    return Err(EvalError::syntax(format!("Unexpected token '{}'", w), pos))
                }
                w => Expr::Ident(w.to_string()),
            }),
            Token::Intrinsic(name) => {
                let text = match name.as_str() {
                    "guard" => false,
                    "guard_text" => true,
                    other => return Err(EvalError::syntax(format!("Unknown intrinsic @{}", other), pos)),
                };
                self.expect("(")?;
                let expr = self.expression()?;
                self.expect(")")?;
                Ok(Expr::Guard {
                    text,
                    expr: Box::new(expr),
                })
            }
            Token::Punct("(") => {
                self.enter()?;
                let expr = self.expression()?;
                self.expect(")")?;
                self.leave();
                Ok(expr)
            }
            Token::Punct("[") => self.array(),
            Token::Punct("{") => self.object(),
            _ => {
                self.index -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn array(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let mut items = Vec::new();
        loop {
            if self.eat("]") {
                break;
            }
            if self.eat(",") {
                items.push(None);
                continue;
            }
            items.push(Some(self.conditional()?));
            if !self.eat(",") {
                self.expect("]")?;
                break;
            }
        }
        self.leave();
        Ok(Expr::Array(items))
    }

    fn object(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let mut props = Vec::new();
        loop {
            if self.eat("}") {
                break;
            }
            let key = match self.next() {
                Token::Ident(name) => name,
                Token::Str(s) => s,
                Token::Number(n) => number_to_string(n),
                _ => {
                    self.index -= 1;
                    return Err(self.unexpected());
                }
            };
            self.expect(":")?;
            props.push((key, self.conditional()?));
            if !self.eat(",") {
                self.expect("}")?;
                break;
            }
        }
        self.leave();
        Ok(Expr::Object(props))
    }

    /// `function [name](params) { [return [expr]][;] }`
    fn function(&mut self) -> Result<Expr, EvalError> {
        let name = match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.next();
                Some(name)
            }
            _ => None,
        };

        self.expect("(")?;
        let mut params = Vec::new();
        while !self.eat(")") {
            params.push(self.property_name()?);
            if !self.eat(",") {
                self.expect(")")?;
                break;
            }
        }

        self.expect("{")?;
        self.enter()?;
        self.skip_semicolons();
        let body = if self.is_keyword("return") {
            self.next();
            if self.is_punct(";") || self.is_punct("}") {
                None
            } else {
                Some(self.expression()?)
            }
        } else if self.is_punct("}") {
            None
        } else {
            Some(self.expression()?)
        };
        self.skip_semicolons();
        self.expect("}")?;
        self.leave();

        Ok(Expr::Function(Arc::new(FunctionDef { name, params, body })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ast(src: &str) -> Expr {
        parse(src, 64).unwrap()
    }

    #[test]
    fn test_precedence() {
        let expr = ast("1 + 2 * 3");
        let Expr::Binary(BinaryOp::Add, _, right) = expr else {
            panic!("expected addition");
        };
        assert!(matches!(*right, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_new_with_member_callee() {
        let expr = ast(r#"new ("Date" in d ? d : global).Date()"#);
        let Expr::New(callee, args) = expr else {
            panic!("expected new");
        };
        assert!(args.is_empty());
        assert!(matches!(*callee, Expr::Member(_, ref name) if name == "Date"));
    }

    #[test]
    fn test_guard_intrinsic() {
        assert!(matches!(ast("@guard_text(x)"), Expr::Guard { text: true, .. }));
        assert!(parse("@nope(x)", 64).is_err());
    }

    #[test]
    fn test_literals() {
        assert!(matches!(ast("[1,,2]"), Expr::Array(ref items) if items.len() == 3 && items[1].is_none()));
        assert!(matches!(ast("{a: 1, 'b': 2, 3: 4,}"), Expr::Object(ref props) if props.len() == 3));
        assert!(matches!(ast("function (a, b) { return a; }"), Expr::Function(_)));
        assert_eq!(ast(""), Expr::Literal(Literal::Undefined));
        assert_eq!(ast("1;"), Expr::Literal(Literal::Number(1.0)));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("1 +", 64).is_err());
        assert!(parse("a = 1", 64).is_err());
        assert!(parse("(1", 64).is_err());
        assert!(parse("x: 1", 64).is_err());
        assert!(parse(&"(".repeat(100), 16).is_err());
    }
}
