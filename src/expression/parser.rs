use crate::expression::ast::{
    BinaryOp, Binding, DeclType, Expr, FragmentSource, Lit, UnaryOp,
};
use crate::expression::error::ExprError;
use crate::expression::lexer::{Span, Token, TokenKind, lex};

/// Names the fragment program reads but may never assign.
pub(crate) const FRAGMENT_INPUTS: [&str; 4] = ["gl_FragCoord", "u_resolution", "u_mouse", "u_time"];

const UNIFORMS: [&str; 3] = ["u_resolution", "u_mouse", "u_time"];

/// Deepest expression nesting accepted from shader source.
pub(crate) const MAX_NESTING: usize = 64;

/// Parse a single expression (no statements).
#[cfg(test)]
pub(crate) fn parse_expr(src: &str) -> Result<Expr, ExprError> {
    let tokens = lex(src)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = p.parse_ternary()?;
    p.expect(TokenKind::Eof)?;
    Ok(expr)
}

/// Parse a fragment program: optional `void main() { ... }` wrapper, `precision`/`uniform`
/// declarations, local bindings, then the output as `gl_FragColor = e;` or a bare expression.
pub(crate) fn parse_fragment(src: &str) -> Result<FragmentSource, ExprError> {
    let tokens = lex(src)?;
    let mut p = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    let mut wrapped = false;
    let mut bindings = Vec::new();
    let mut output = None;

    loop {
        if p.at_block_end(wrapped) {
            break;
        }
        if !wrapped && p.peek_ident() == Some("void") && bindings.is_empty() && output.is_none() {
            p.bump();
            p.expect_ident("main")?;
            p.expect(TokenKind::LParen)?;
            p.expect(TokenKind::RParen)?;
            p.expect(TokenKind::LBrace)?;
            wrapped = true;
            continue;
        }
        if output.is_some() {
            return Err(ExprError::new(
                p.span().start,
                "nothing may follow the output expression",
            ));
        }

        match p.peek_ident() {
            Some("precision") => {
                while !matches!(p.peek().kind, TokenKind::Semi | TokenKind::Eof) {
                    p.bump();
                }
                p.expect(TokenKind::Semi)?;
                continue;
            }
            Some("uniform") => {
                p.bump();
                let ty_span = p.span();
                let ty = p.ident()?;
                if DeclType::from_name(&ty).is_none() {
                    return Err(ExprError::new(ty_span.start, format!("unknown type '{ty}'")));
                }
                let name_span = p.span();
                let name = p.ident()?;
                if !UNIFORMS.contains(&name.as_str()) {
                    return Err(ExprError::new(
                        name_span.start,
                        format!("unknown uniform '{name}'"),
                    ));
                }
                p.expect(TokenKind::Semi)?;
                continue;
            }
            _ => {}
        }

        let start = p.span().start;
        let ty = p
            .peek_ident()
            .and_then(DeclType::from_name)
            .filter(|_| matches!(p.peek_at(1), TokenKind::Ident(_)));
        if ty.is_some() {
            p.bump();
        }

        let is_assignment = matches!(p.peek().kind, TokenKind::Ident(_))
            && matches!(p.peek_at(1), TokenKind::Assign);
        if !is_assignment {
            if ty.is_some() {
                return Err(ExprError::new(start, "declaration without initializer"));
            }
            let e = p.parse_ternary()?;
            p.consume(TokenKind::Semi);
            output = Some(e);
            continue;
        }

        let name = p.ident()?;
        p.expect(TokenKind::Assign)?;
        let value = p.parse_ternary()?;
        p.expect(TokenKind::Semi)?;

        if name == "gl_FragColor" {
            output = Some(value);
            continue;
        }
        if FRAGMENT_INPUTS.contains(&name.as_str()) {
            return Err(ExprError::new(start, format!("cannot assign to input '{name}'")));
        }
        bindings.push(Binding { name, ty, value });
    }

    if wrapped {
        p.expect(TokenKind::RBrace)?;
    }
    p.expect(TokenKind::Eof)?;

    let Some(output) = output else {
        return Err(ExprError::new(
            p.span().start,
            "program has no output expression",
        ));
    };
    Ok(FragmentSource { bindings, output })
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

    fn peek_ident(&self) -> Option<&str> {
        match &self.peek().kind {
            TokenKind::Ident(s) => Some(s.as_str()),
            _ => None,
        }
    }

    fn bump(&mut self) -> &Token {
        let t = &self.tokens[self.pos];
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn span(&self) -> Span {
        self.peek().span
    }

    fn at_block_end(&self, wrapped: bool) -> bool {
        match self.peek().kind {
            TokenKind::Eof => true,
            TokenKind::RBrace => wrapped,
            _ => false,
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExprError> {
        if self.peek().kind == kind {
            self.bump();
            Ok(())
        } else {
            Err(ExprError::new(
                self.span().start,
                format!("expected {kind:?}, found {:?}", self.peek().kind),
            ))
        }
    }

    fn expect_ident(&mut self, word: &str) -> Result<(), ExprError> {
        if self.peek_ident() == Some(word) {
            self.bump();
            Ok(())
        } else {
            Err(ExprError::new(
                self.span().start,
                format!("expected '{word}', found {:?}", self.peek().kind),
            ))
        }
    }

    fn ident(&mut self) -> Result<String, ExprError> {
        let t = self.bump().clone();
        match t.kind {
            TokenKind::Ident(s) => Ok(s),
            other => Err(ExprError::new(
                t.span.start,
                format!("expected identifier, found {other:?}"),
            )),
        }
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(ExprError::new(self.span().start, "expression is nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested(&mut self, f: fn(&mut Self) -> Result<Expr, ExprError>) -> Result<Expr, ExprError> {
        self.descend()?;
        let out = f(self);
        self.depth -= 1;
        out
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        self.nested(Self::parse_conditional)
    }

    fn parse_conditional(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_or()?;
        if !self.consume(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.parse_ternary()?;
        self.expect(TokenKind::Colon)?;
        let els = self.parse_ternary()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then: Box::new(then),
            els: Box::new(els),
        })
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.parse_and()?;
        while self.consume(TokenKind::OrOr) {
            self.descend()?;
            let r = self.parse_and()?;
            e = binary(BinaryOp::Or, e, r);
        }
        self.depth = mark;
        Ok(e)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.parse_equality()?;
        while self.consume(TokenKind::AndAnd) {
            self.descend()?;
            let r = self.parse_equality()?;
            e = binary(BinaryOp::And, e, r);
        }
        self.depth = mark;
        Ok(e)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.parse_comparison()?;
        loop {
            let op = if self.consume(TokenKind::EqEq) {
                BinaryOp::Eq
            } else if self.consume(TokenKind::Ne) {
                BinaryOp::Ne
            } else {
                break;
            };
            self.descend()?;
            let r = self.parse_comparison()?;
            e = binary(op, e, r);
        }
        self.depth = mark;
        Ok(e)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.parse_term()?;
        loop {
            let op = if self.consume(TokenKind::Lt) {
                BinaryOp::Lt
            } else if self.consume(TokenKind::Le) {
                BinaryOp::Le
            } else if self.consume(TokenKind::Gt) {
                BinaryOp::Gt
            } else if self.consume(TokenKind::Ge) {
                BinaryOp::Ge
            } else {
                break;
            };
            self.descend()?;
            let r = self.parse_term()?;
            e = binary(op, e, r);
        }
        self.depth = mark;
        Ok(e)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.parse_factor()?;
        loop {
            let op = if self.consume(TokenKind::Plus) {
                BinaryOp::Add
            } else if self.consume(TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            self.descend()?;
            let r = self.parse_factor()?;
            e = binary(op, e, r);
        }
        self.depth = mark;
        Ok(e)
    }

    fn parse_factor(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.parse_unary()?;
        loop {
            let op = if self.consume(TokenKind::Star) {
                BinaryOp::Mul
            } else if self.consume(TokenKind::Slash) {
                BinaryOp::Div
            } else if self.consume(TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            self.descend()?;
            let r = self.parse_unary()?;
            e = binary(op, e, r);
        }
        self.depth = mark;
        Ok(e)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.consume(TokenKind::Minus) {
            let e = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(e),
            });
        }
        if self.consume(TokenKind::Plus) {
            return self.nested(Self::parse_unary);
        }
        if self.consume(TokenKind::Bang) {
            let e = self.nested(Self::parse_unary)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(e),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mark = self.depth;
        let mut e = self.parse_primary()?;

        loop {
            if self.consume(TokenKind::Dot) {
                self.descend()?;
                let t = self.bump().clone();
                let fields = match t.kind {
                    TokenKind::Ident(s) => s,
                    other => {
                        return Err(ExprError::new(
                            t.span.start,
                            format!("expected field name after '.', found {other:?}"),
                        ));
                    }
                };
                e = Expr::Swizzle {
                    base: Box::new(e),
                    fields,
                };
                continue;
            }

            if self.peek().kind == TokenKind::LParen {
                let call_span = self.span();
                self.descend()?;
                self.bump();
                let args = self.parse_args()?;
                let func = match e {
                    Expr::Ident(name) => name,
                    _ => {
                        return Err(ExprError::new(
                            call_span.start,
                            "call target must be an identifier",
                        ));
                    }
                };
                e = Expr::Call { func, args };
                continue;
            }

            break;
        }

        self.depth = mark;
        Ok(e)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.consume(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_ternary()?);
            if self.consume(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen)?;
            return Ok(args);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let t = self.bump().clone();
        match t.kind {
            TokenKind::Number(v) => Ok(Expr::Lit(Lit::F64(v))),
            TokenKind::True => Ok(Expr::Lit(Lit::Bool(true))),
            TokenKind::False => Ok(Expr::Lit(Lit::Bool(false))),
            TokenKind::Ident(s) => Ok(Expr::Ident(s)),
            TokenKind::LParen => {
                let e = self.parse_ternary()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            other => Err(ExprError::new(
                t.span.start,
                format!("unexpected token {other:?}"),
            )),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_precedence() {
        let e = parse_expr("1+2*3").unwrap();
        match e {
            Expr::Binary {
                op: BinaryOp::Add, ..
            } => {}
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_swizzles_on_calls() {
        let e = parse_expr("vec3(1.0).xy").unwrap();
        match e {
            Expr::Swizzle { base, fields } => {
                assert_eq!(fields, "xy");
                assert!(matches!(*base, Expr::Call { .. }));
            }
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn parses_ternary_right_assoc() {
        let e = parse_expr("a ? 1. : b ? 2. : 3.").unwrap();
        match e {
            Expr::Ternary { els, .. } => assert!(matches!(*els, Expr::Ternary { .. })),
            other => panic!("unexpected ast: {other:?}"),
        }
    }

    #[test]
    fn fragment_with_bindings_and_bare_output() {
        let f = parse_fragment(
            "vec2 st = gl_FragCoord.xy / u_resolution;\nfloat d = length(st);\nvec4(vec3(d), 1.0)",
        )
        .unwrap();
        assert_eq!(f.bindings.len(), 2);
        assert_eq!(f.bindings[0].ty, Some(DeclType::Vec(2)));
        assert_eq!(f.bindings[1].name, "d");
        assert!(matches!(f.output, Expr::Call { .. }));
    }

    #[test]
    fn fragment_in_main_wrapper() {
        let f = parse_fragment(
            "precision mediump float;\nuniform float u_time;\nvoid main() {\n  float v = sin(u_time);\n  gl_FragColor = vec4(v);\n}",
        )
        .unwrap();
        assert_eq!(f.bindings.len(), 1);
        assert!(parse_fragment("void main() { gl_FragColor = vec4(1.0);").is_err());

        let f = parse_fragment(
            "void main() {\n  precision mediump float;\n  float v = sin(u_time);\n  gl_FragColor = vec4(v);\n}",
        )
        .unwrap();
        assert_eq!(f.bindings.len(), 1);
    }

    #[test]
    fn fragment_errors() {
        assert!(parse_fragment("float x = 1.0;").is_err());
        assert!(parse_fragment("u_time = 1.0; 1.0").is_err());
        assert!(parse_fragment("uniform vec2 u_other; 1.0").is_err());
        assert!(parse_fragment("1.0; 2.0").is_err());
        assert!(parse_fragment("float x;").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let deep = format!("{}1.0{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse_fragment(&deep).unwrap_err();
        assert_eq!(err.message, "expression is nested too deeply");
        assert!(parse_fragment(&format!("1.0{}", " + 1.0".repeat(50_000))).is_err());
        assert!(parse_fragment(&format!("{}1.0", "-".repeat(50_000))).is_err());
        assert!(parse_fragment(&format!("u_mouse{}", ".xy".repeat(50_000))).is_err());
        assert!(parse_fragment(&format!("{}1.0{}", "(".repeat(30), ")".repeat(30))).is_ok());
    }
}
