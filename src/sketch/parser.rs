use std::rc::Rc;

use crate::expression::error::ExprError;
use crate::expression::lexer::{Token, TokenKind, lex};
use crate::sketch::ast::{BinaryOp, Expr, FuncDecl, Stmt, Target, UnaryOp};

/// Deepest statement/expression nesting accepted from show source.
pub(crate) const MAX_NESTING: usize = 64;

const UNSUPPORTED: [&str; 12] = [
    "class", "new", "this", "async", "await", "yield", "import", "export", "try", "throw",
    "switch", "do",
];

pub(crate) fn parse_program(src: &str) -> Result<Vec<Stmt>, ExprError> {
    let tokens = lex(src)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut out = Vec::new();
    while p.peek().kind != TokenKind::Eof {
        out.push(p.statement()?);
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + ahead).min(last)].kind
    }

    fn offset(&self) -> usize {
        self.peek().span.start
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn is_word(&self, word: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(s) if s == word)
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn consume_word(&mut self, word: &str) -> bool {
        if self.is_word(word) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExprError> {
        if self.peek().kind == kind {
            self.bump();
            Ok(())
        } else {
            Err(ExprError::new(
                self.offset(),
                format!("expected {kind:?}, found {:?}", self.peek().kind),
            ))
        }
    }

    fn ident(&mut self) -> Result<String, ExprError> {
        let t = self.bump();
        match t.kind {
            TokenKind::Ident(s) if !is_reserved(&s) => Ok(s),
            other => Err(ExprError::new(
                t.span.start,
                format!("expected identifier, found {other:?}"),
            )),
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(ExprError::new(self.offset(), "program is nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested<T>(&mut self, f: fn(&mut Self) -> Result<T, ExprError>) -> Result<T, ExprError> {
        self.descend()?;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Semicolons are optional.
    fn end_statement(&mut self) {
        self.consume(TokenKind::Semi);
    }

    fn statement(&mut self) -> Result<Stmt, ExprError> {
        self.nested(Self::statement_inner)
    }

    fn statement_inner(&mut self) -> Result<Stmt, ExprError> {
        let start = self.offset();
        if let TokenKind::Ident(word) = &self.peek().kind {
            if UNSUPPORTED.contains(&word.as_str()) {
                return Err(ExprError::new(start, format!("'{word}' is not supported")));
            }
            match word.as_str() {
                "let" | "const" | "var" => {
                    let s = self.declaration()?;
                    self.end_statement();
                    return Ok(s);
                }
                "function" => {
                    self.bump();
                    return self.function();
                }
                "if" => {
                    self.bump();
                    self.expect(TokenKind::LParen)?;
                    let cond = self.expression()?;
                    self.expect(TokenKind::RParen)?;
                    let then = Box::new(self.statement()?);
                    let els = if self.consume_word("else") {
                        Some(Box::new(self.statement()?))
                    } else {
                        None
                    };
                    return Ok(Stmt::If { cond, then, els });
                }
                "while" => {
                    self.bump();
                    self.expect(TokenKind::LParen)?;
                    let cond = self.expression()?;
                    self.expect(TokenKind::RParen)?;
                    let body = Box::new(self.statement()?);
                    return Ok(Stmt::While { cond, body });
                }
                "for" => {
                    self.bump();
                    return self.for_statement();
                }
                "return" => {
                    self.bump();
                    let value = if matches!(
                        self.peek().kind,
                        TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof
                    ) {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    self.end_statement();
                    return Ok(Stmt::Return(value));
                }
                "break" => {
                    self.bump();
                    self.end_statement();
                    return Ok(Stmt::Break);
                }
                "continue" => {
                    self.bump();
                    self.end_statement();
                    return Ok(Stmt::Continue);
                }
                _ => {}
            }
        }

        match self.peek().kind {
            TokenKind::LBrace => {
                self.bump();
                Ok(Stmt::Block(self.block_body()?))
            }
            TokenKind::Semi => {
                self.bump();
                Ok(Stmt::Empty)
            }
            _ => {
                let e = self.expression()?;
                self.end_statement();
                Ok(Stmt::Expr(e))
            }
        }
    }

    /// Statements up to and including the closing `}`.
    fn block_body(&mut self) -> Result<Vec<Stmt>, ExprError> {
        let mut out = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::RBrace => {
                    self.bump();
                    return Ok(out);
                }
                TokenKind::Eof => {
                    return Err(ExprError::new(self.offset(), "unterminated block"));
                }
                _ => out.push(self.statement()?),
            }
        }
    }

    fn declaration(&mut self) -> Result<Stmt, ExprError> {
        self.bump();
        let mut decls = Vec::new();
        loop {
            let name = self.ident()?;
            let init = if self.consume(TokenKind::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.consume(TokenKind::Comma) {
                return Ok(Stmt::Let(decls));
            }
        }
    }

    fn function(&mut self) -> Result<Stmt, ExprError> {
        let name = self.ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.consume(TokenKind::RParen) {
            loop {
                params.push(self.ident()?);
                if self.consume(TokenKind::Comma) {
                    continue;
                }
                self.expect(TokenKind::RParen)?;
                break;
            }
        }
        self.expect(TokenKind::LBrace)?;
        let body = self.block_body()?;
        Ok(Stmt::Function(Rc::new(FuncDecl { name, params, body })))
    }

    fn for_statement(&mut self) -> Result<Stmt, ExprError> {
        self.expect(TokenKind::LParen)?;

        let is_decl = self.is_word("let") || self.is_word("const") || self.is_word("var");
        if is_decl && matches!(self.peek_at(2), TokenKind::Ident(w) if w == "of") {
            self.bump();
            let name = self.ident()?;
            self.bump();
            let iter = self.expression()?;
            self.expect(TokenKind::RParen)?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::ForOf { name, iter, body });
        }

        let init = if self.peek().kind == TokenKind::Semi {
            None
        } else if is_decl {
            Some(Box::new(self.declaration()?))
        } else {
            Some(Box::new(Stmt::Expr(self.expression()?)))
        };
        self.expect(TokenKind::Semi)?;
        let cond = if self.peek().kind == TokenKind::Semi {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semi)?;
        let step = if self.peek().kind == TokenKind::RParen {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ExprError> {
        self.nested(Self::assignment_inner)
    }

    fn assignment_inner(&mut self) -> Result<Expr, ExprError> {
        let start = self.offset();
        let left = self.ternary()?;
        let op = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            _ => return Ok(left),
        };
        self.bump();
        let target = into_target(left, start)?;
        let value = Box::new(self.assignment()?);
        Ok(Expr::Assign { target, op, value })
    }

    fn ternary(&mut self) -> Result<Expr, ExprError> {
        let cond = self.logical_or()?;
        if !self.consume(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.assignment()?;
        self.expect(TokenKind::Colon)?;
        let els = self.assignment()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            els: Box::new(els),
        })
    }

    fn logical_or(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.logical_and()?;
        while self.consume(TokenKind::OrOr) {
            self.descend()?;
            let r = self.logical_and()?;
            e = Expr::Logical {
                and: false,
                left: Box::new(e),
                right: Box::new(r),
            };
        }
        self.depth = mark;
        Ok(e)
    }

    fn logical_and(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.equality()?;
        while self.consume(TokenKind::AndAnd) {
            self.descend()?;
            let r = self.equality()?;
            e = Expr::Logical {
                and: true,
                left: Box::new(e),
                right: Box::new(r),
            };
        }
        self.depth = mark;
        Ok(e)
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = next(self)?;
        'outer: loop {
            for (tok, op) in ops {
                if self.consume(tok.clone()) {
                    self.descend()?;
                    let r = next(self)?;
                    e = Expr::Binary {
                        op: *op,
                        left: Box::new(e),
                        right: Box::new(r),
                    };
                    continue 'outer;
                }
            }
            self.depth = mark;
            return Ok(e);
        }
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[(TokenKind::EqEq, BinaryOp::Eq), (TokenKind::Ne, BinaryOp::Ne)],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (TokenKind::Lt, BinaryOp::Lt),
                (TokenKind::Le, BinaryOp::Le),
                (TokenKind::Gt, BinaryOp::Gt),
                (TokenKind::Ge, BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
                (TokenKind::Percent, BinaryOp::Mod),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let start = self.offset();
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let e = self.nested(Self::unary)?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(e),
            });
        }

        let delta = match self.peek().kind {
            TokenKind::PlusPlus => Some(1.0),
            TokenKind::MinusMinus => Some(-1.0),
            _ => None,
        };
        if let Some(delta) = delta {
            self.bump();
            let operand = self.nested(Self::unary)?;
            return Ok(Expr::Update {
                target: into_target(operand, start)?,
                delta,
                prefix: true,
            });
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let start = self.offset();
        let e = self.call_member()?;
        let delta = match self.peek().kind {
            TokenKind::PlusPlus => 1.0,
            TokenKind::MinusMinus => -1.0,
            _ => return Ok(e),
        };
        self.bump();
        Ok(Expr::Update {
            target: into_target(e, start)?,
            delta,
            prefix: false,
        })
    }

    fn call_member(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.primary()?;
        loop {
            if matches!(
                self.peek().kind,
                TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen
            ) {
                self.descend()?;
            }
            match self.peek().kind {
                TokenKind::Dot => {
                    self.bump();
                    let t = self.bump();
                    let TokenKind::Ident(name) = t.kind else {
                        return Err(ExprError::new(
                            t.span.start,
                            format!("expected property name, found {:?}", t.kind),
                        ));
                    };
                    e = Expr::Member {
                        object: Box::new(e),
                        name,
                    };
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket)?;
                    e = Expr::Index {
                        object: Box::new(e),
                        index: Box::new(index),
                    };
                }
                TokenKind::LParen => {
                    let offset = self.offset();
                    self.bump();
                    let args = self.arguments(TokenKind::RParen)?;
                    e = Expr::Call {
                        callee: Box::new(e),
                        args,
                        offset,
                    };
                }
                _ => {
                    self.depth = mark;
                    return Ok(e);
                }
            }
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed.
    fn arguments(&mut self, close: TokenKind) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        loop {
            if self.consume(close.clone()) {
                return Ok(args);
            }
            args.push(self.assignment()?);
            if !self.consume(TokenKind::Comma) {
                self.expect(close)?;
                return Ok(args);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let t = self.bump();
        match t.kind {
            TokenKind::Number(v) => Ok(Expr::Num(v)),
            TokenKind::Str(s) => Ok(Expr::Str(Rc::from(s))),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::LParen => {
                let e = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            TokenKind::LBracket => Ok(Expr::Array(self.arguments(TokenKind::RBracket)?)),
            TokenKind::Ident(s) => match s.as_str() {
                "null" => Ok(Expr::Null),
                "undefined" => Ok(Expr::Undefined),
                w if is_reserved(w) => Err(ExprError::new(
                    t.span.start,
                    format!("unexpected keyword '{w}'"),
                )),
                _ => Ok(Expr::Ident(s)),
            },
            other => Err(ExprError::new(
                t.span.start,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    UNSUPPORTED.contains(&word)
        || matches!(
            word,
            "let"
                | "const"
                | "var"
                | "function"
                | "if"
                | "else"
                | "while"
                | "for"
                | "return"
                | "break"
                | "continue"
        )
}

fn into_target(e: Expr, offset: usize) -> Result<Target, ExprError> {
    match e {
        Expr::Ident(name) => Ok(Target::Ident(name)),
        Expr::Index { object, index } => Ok(Target::Index { object, index }),
        _ => Err(ExprError::new(offset, "invalid assignment target")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bouncing_ball_shape() {
        let src = r#"
            let x = 10, y = 10;
            let xspeed = 5;
            function setup() {}
            function draw() {
              console.log('DRAW x', x)
              background(255);
              ellipse(x, y, 10, 10);
              x += xspeed;
              if (x > width - 5 || x < 5) {
                xspeed = -xspeed;
              }
            }
        "#;
        let prog = parse_program(src).unwrap();
        assert_eq!(prog.len(), 4);
        assert!(matches!(&prog[0], Stmt::Let(d) if d.len() == 2));
        let Stmt::Function(draw) = &prog[3] else {
            panic!("expected function");
        };
        assert_eq!(draw.name, "draw");
        assert_eq!(draw.body.len(), 5);
    }

    #[test]
    fn parses_loops() {
        let prog = parse_program(
            "for (let i = 0; i < 3; i++) { a[i] = i; }\nfor (const v of a) total += v;\nwhile (true) break;",
        )
        .unwrap();
        assert!(matches!(prog[0], Stmt::For { .. }));
        assert!(matches!(&prog[1], Stmt::ForOf { name, .. } if name == "v"));
        assert!(matches!(prog[2], Stmt::While { .. }));
    }

    #[test]
    fn assignment_is_right_associative_and_checked() {
        let prog = parse_program("a = b = 2").unwrap();
        let Stmt::Expr(Expr::Assign { value, .. }) = &prog[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(**value, Expr::Assign { .. }));

        let err = parse_program("f() = 1").unwrap_err();
        assert_eq!(err.message, "invalid assignment target");
    }

    #[test]
    fn unsupported_constructs_are_reported() {
        let err = parse_program("class Shape {}").unwrap_err();
        assert_eq!(err.message, "'class' is not supported");
        assert!(parse_program("function draw() {").is_err());
        assert!(parse_program("let = 3").is_err());
    }

    #[test]
    fn member_calls_and_indexing() {
        let prog = parse_program("Math.sin(PI / 2) + xs[0].length").unwrap();
        let Stmt::Expr(Expr::Binary { left, right, .. }) = &prog[0] else {
            panic!("expected binary");
        };
        assert!(matches!(**left, Expr::Call { .. }));
        assert!(matches!(**right, Expr::Member { .. }));
    }

    #[test]
    fn nesting_is_capped() {
        let deep = format!("let x = {}1{};", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse_program(&deep).unwrap_err();
        assert_eq!(err.message, "program is nested too deeply");

        let chain = format!("let x = 1{};", " + 1".repeat(50_000));
        assert!(parse_program(&chain).is_err());
        assert!(parse_program(&format!("{}x", "-".repeat(50_000))).is_err());
        assert!(parse_program(&format!("{}{}", "{".repeat(50_000), "}".repeat(50_000))).is_err());
        assert!(parse_program(&format!("f{}", "()".repeat(50_000))).is_err());

        let fits = format!("let x = {}1{};", "(".repeat(40), ")".repeat(40));
        assert!(parse_program(&fits).is_ok());
    }
}
