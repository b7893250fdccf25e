//! Expression parsing.
//!
//! Boolean operators, `not` and comparisons are handled by dedicated
//! functions; arithmetic and bitwise operators use precedence climbing
//! over [`binary_op_info`].

use std::rc::Rc;

use super::{PResult, Parser};
use crate::ast::{
    BinOp, BoolOp, CmpOp, ComprehensionKind, Constant, Expr, ExprKind, FStringPart, Generator,
    Keyword, Param, Params, Target, UnaryOp,
};
use crate::lexer::{self, StrLit, SyntaxError, Token};

/// Binding power of a binary operator token. Higher binds tighter.
fn binary_op_info(token: &Token) -> Option<(BinOp, u8)> {
    Some(match token {
        Token::Pipe => (BinOp::BitOr, 1),
        Token::Caret => (BinOp::BitXor, 2),
        Token::Amp => (BinOp::BitAnd, 3),
        Token::LShift => (BinOp::LShift, 4),
        Token::RShift => (BinOp::RShift, 4),
        Token::Plus => (BinOp::Add, 5),
        Token::Minus => (BinOp::Sub, 5),
        Token::Star => (BinOp::Mul, 6),
        Token::Slash => (BinOp::Div, 6),
        Token::DoubleSlash => (BinOp::FloorDiv, 6),
        Token::Percent => (BinOp::Mod, 6),
        Token::At => (BinOp::MatMul, 6),
        _ => return None,
    })
}

/// Tokens that may begin an expression.
pub(super) fn starts_expr(token: &Token) -> bool {
    matches!(
        token,
        Token::Name(_)
            | Token::Int(_)
            | Token::Float(_)
            | Token::Str(_)
            | Token::True
            | Token::False
            | Token::None
            | Token::LParen
            | Token::LBracket
            | Token::LBrace
            | Token::Minus
            | Token::Plus
            | Token::Tilde
            | Token::Not
            | Token::Lambda
            | Token::Star
    )
}

/// Convert a parsed expression into an assignment target.
pub(super) fn to_target(expr: Expr) -> PResult<Target> {
    let line = expr.line;
    Ok(match expr.kind {
        ExprKind::Name(name) => Target::Name(name),
        ExprKind::Attribute { value, attr } => Target::Attribute { value, attr },
        ExprKind::Subscript { value, index } => Target::Subscript { value, index },
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            Target::Sequence(items.into_iter().map(to_target).collect::<PResult<_>>()?)
        }
        ExprKind::Starred(inner) => Target::Starred(Box::new(to_target(*inner)?)),
        other => {
            let what = match other {
                ExprKind::Call { .. } => "function call",
                ExprKind::Constant(_) | ExprKind::FString(_) => "literal",
                ExprKind::Lambda { .. } => "lambda",
                ExprKind::Comprehension { .. } => "comprehension",
                _ => "expression",
            };
            return Err(SyntaxError::new(line, format!("cannot assign to {what}")));
        }
    })
}

impl Parser {
    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Parse a comma-separated expression list; more than one item (or a
    /// trailing comma) yields a tuple.
    pub(super) fn parse_expressions(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let first = self.parse_star_or_test()?;
        if !self.stream.check(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.stream.eat(&Token::Comma) {
            if !starts_expr(self.stream.peek()) {
                break;
            }
            items.push(self.parse_star_or_test()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    /// Parse an assignment target list such as the one after `for`.
    pub(super) fn parse_target_list(&mut self) -> PResult<Target> {
        let line = self.stream.line();
        let first = self.parse_target_item()?;
        if !self.stream.check(&Token::Comma) {
            return to_target(first);
        }
        let mut items = vec![first];
        while self.stream.eat(&Token::Comma) {
            if !starts_expr(self.stream.peek()) {
                break;
            }
            items.push(self.parse_target_item()?);
        }
        to_target(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_target_item(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        if self.stream.eat(&Token::Star) {
            let inner = self.parse_binary(0)?;
            return Ok(Expr::new(ExprKind::Starred(Box::new(inner)), line));
        }
        self.parse_binary(0)
    }

    fn parse_star_or_test(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        if self.stream.eat(&Token::Star) {
            let inner = self.parse_binary(0)?;
            return Ok(Expr::new(ExprKind::Starred(Box::new(inner)), line));
        }
        self.parse_test()
    }

    /// Parse a single expression, including conditional expressions and
    /// lambdas.
    pub(super) fn parse_test(&mut self) -> PResult<Expr> {
        self.enter()?;
        let result = self.parse_test_inner();
        self.leave();
        result
    }

    fn parse_test_inner(&mut self) -> PResult<Expr> {
        if self.stream.check(&Token::Lambda) {
            return self.parse_lambda();
        }
        let line = self.stream.line();
        let body = self.parse_or()?;
        if !self.stream.eat(&Token::If) {
            return Ok(body);
        }
        let test = self.parse_or()?;
        self.stream.expect(Token::Else, "'else' in conditional expression")?;
        let orelse = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
            line,
        ))
    }

    fn parse_lambda(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        self.stream.advance();
        let params = self.parse_params(&Token::Colon, false)?;
        self.stream.expect(Token::Colon, "':' after lambda parameters")?;
        let body = self.parse_test()?;
        Ok(Expr::new(
            ExprKind::Lambda {
                params: Rc::new(params),
                body: Rc::new(body),
            },
            line,
        ))
    }

    /// Parse a parameter list up to (not including) `closing`.
    pub(super) fn parse_params(&mut self, closing: &Token, annotations: bool) -> PResult<Params> {
        let mut params = Params::default();
        let mut seen_star = false;
        let mut seen_default = false;
        while !self.stream.check(closing) {
            if self.stream.eat(&Token::DoubleStar) {
                params.kwarg = Some(self.stream.expect_name()?);
                self.skip_annotation(annotations)?;
            } else if self.stream.eat(&Token::Star) {
                if seen_star {
                    return Err(self.stream.error("duplicate '*' in parameter list"));
                }
                seen_star = true;
                if !self.stream.check(&Token::Comma) {
                    params.vararg = Some(self.stream.expect_name()?);
                    self.skip_annotation(annotations)?;
                }
            } else if self.stream.eat(&Token::Slash) {
                // Positional-only marker; every parameter accepts keywords here.
            } else {
                if params.kwarg.is_some() {
                    return Err(self.stream.error("parameter after '**' parameter"));
                }
                let name = self.stream.expect_name()?;
                self.skip_annotation(annotations)?;
                let default = if self.stream.eat(&Token::Assign) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                if seen_star {
                    params.kwonly.push(Param { name, default });
                } else {
                    if default.is_some() {
                        seen_default = true;
                    } else if seen_default {
                        return Err(self
                            .stream
                            .error("non-default argument follows default argument"));
                    }
                    params.positional.push(Param { name, default });
                }
            }
            if !self.stream.eat(&Token::Comma) {
                break;
            }
        }
        let mut seen = std::collections::HashSet::new();
        for name in params.names() {
            if !seen.insert(name) {
                return Err(self
                    .stream
                    .error(format!("duplicate argument '{name}' in function definition")));
            }
        }
        Ok(params)
    }

    fn skip_annotation(&mut self, annotations: bool) -> PResult<()> {
        if annotations && self.stream.eat(&Token::Colon) {
            self.parse_test()?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Boolean layer
    // -----------------------------------------------------------------------

    pub(super) fn parse_or(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let first = self.parse_and()?;
        if !self.stream.check(&Token::Or) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.stream.eat(&Token::Or) {
            values.push(self.parse_and()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::Or,
                values,
            },
            line,
        ))
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let first = self.parse_not()?;
        if !self.stream.check(&Token::And) {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.stream.eat(&Token::And) {
            values.push(self.parse_not()?);
        }
        Ok(Expr::new(
            ExprKind::BoolOp {
                op: BoolOp::And,
                values,
            },
            line,
        ))
    }

    fn parse_not(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        if self.stream.eat(&Token::Not) {
            self.enter()?;
            let operand = self.parse_not();
            self.leave();
            return Ok(Expr::new(
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand?),
                },
                line,
            ));
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.stream.peek() {
            Token::EqEq => CmpOp::Eq,
            Token::NotEq => CmpOp::NotEq,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            Token::In => CmpOp::In,
            Token::Not if matches!(self.stream.peek_nth(1), Token::In) => {
                self.stream.advance();
                CmpOp::NotIn
            }
            Token::Is => {
                if matches!(self.stream.peek_nth(1), Token::Not) {
                    self.stream.advance();
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                }
            }
            _ => return None,
        };
        self.stream.advance();
        Some(op)
    }

    fn parse_comparison(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let left = self.parse_binary(0)?;
        let mut ops = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push((op, self.parse_binary(0)?));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            ExprKind::Compare {
                left: Box::new(left),
                ops,
            },
            line,
        ))
    }

    // -----------------------------------------------------------------------
    // Arithmetic layer
    // -----------------------------------------------------------------------

    pub(super) fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some((op, prec)) = binary_op_info(self.stream.peek()) {
            if prec < min_prec {
                break;
            }
            let line = self.stream.line();
            self.stream.advance();
            let right = self.parse_binary(prec + 1)?;
            left = Expr::new(
                ExprKind::BinOp {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                line,
            );
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let op = match self.stream.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            Token::Tilde => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        self.stream.advance();
        self.enter()?;
        let operand = self.parse_unary();
        self.leave();
        Ok(Expr::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand?),
            },
            line,
        ))
    }

    fn parse_power(&mut self) -> PResult<Expr> {
        let base = self.parse_postfix()?;
        if !self.stream.check(&Token::DoubleStar) {
            return Ok(base);
        }
        let line = self.stream.line();
        self.stream.advance();
        let exponent = self.parse_unary()?;
        Ok(Expr::new(
            ExprKind::BinOp {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
            line,
        ))
    }

    // -----------------------------------------------------------------------
    // Primaries
    // -----------------------------------------------------------------------

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            let line = self.stream.line();
            match self.stream.peek() {
                Token::Dot => {
                    self.stream.advance();
                    let attr = self.stream.expect_name()?;
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        line,
                    );
                }
                Token::LParen => {
                    self.stream.advance();
                    let (args, keywords) = self.parse_call_args()?;
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            keywords,
                        },
                        line,
                    );
                }
                Token::LBracket => {
                    self.stream.advance();
                    let index = self.parse_subscript()?;
                    self.stream.expect(Token::RBracket, "']'")?;
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            index: Box::new(index),
                        },
                        line,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> PResult<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords: Vec<Keyword> = Vec::new();
        while !self.stream.check(&Token::RParen) {
            let line = self.stream.line();
            if self.stream.eat(&Token::DoubleStar) {
                let value = self.parse_test()?;
                keywords.push(Keyword {
                    name: None,
                    value,
                    line,
                });
            } else if self.stream.eat(&Token::Star) {
                let inner = self.parse_test()?;
                args.push(Expr::new(ExprKind::Starred(Box::new(inner)), line));
            } else if matches!(self.stream.peek(), Token::Name(_))
                && matches!(self.stream.peek_nth(1), Token::Assign)
            {
                let name = self.stream.expect_name()?;
                self.stream.advance();
                let value = self.parse_test()?;
                if keywords.iter().any(|k| k.name.as_deref() == Some(name.as_str())) {
                    return Err(self.stream.error(format!("keyword argument repeated: {name}")));
                }
                keywords.push(Keyword {
                    name: Some(name),
                    value,
                    line,
                });
            } else {
                if !keywords.is_empty() {
                    return Err(self
                        .stream
                        .error("positional argument follows keyword argument"));
                }
                let value = self.parse_test()?;
                if self.stream.check(&Token::For) {
                    let generators = self.parse_generators()?;
                    args.push(Expr::new(
                        ExprKind::Comprehension {
                            kind: ComprehensionKind::Generator,
                            element: Box::new(value),
                            value: None,
                            generators,
                        },
                        line,
                    ));
                } else {
                    args.push(value);
                }
            }
            if !self.stream.eat(&Token::Comma) {
                break;
            }
        }
        self.stream.expect(Token::RParen, "')'")?;
        Ok((args, keywords))
    }

    fn parse_subscript(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let first = self.parse_slice_item()?;
        if !self.stream.check(&Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.stream.eat(&Token::Comma) {
            if self.stream.check(&Token::RBracket) {
                break;
            }
            items.push(self.parse_slice_item()?);
        }
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_slice_item(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let lower = if self.stream.check(&Token::Colon) {
            None
        } else {
            let expr = self.parse_test()?;
            if !self.stream.check(&Token::Colon) {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.stream.expect(Token::Colon, "':'")?;
        let bound_end = |t: &Token| matches!(t, Token::Colon | Token::RBracket | Token::Comma);
        let upper = if bound_end(self.stream.peek()) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.stream.eat(&Token::Colon) && !bound_end(self.stream.peek()) {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::new(ExprKind::Slice { lower, upper, step }, line))
    }

    fn parse_generators(&mut self) -> PResult<Vec<Generator>> {
        let mut generators = Vec::new();
        while self.stream.eat(&Token::For) {
            let target = self.parse_target_list()?;
            self.stream.expect(Token::In, "'in'")?;
            let iter = self.parse_or()?;
            let mut conditions = Vec::new();
            while self.stream.eat(&Token::If) {
                conditions.push(self.parse_or()?);
            }
            generators.push(Generator {
                target,
                iter,
                conditions,
            });
        }
        Ok(generators)
    }

    fn comprehension(
        &mut self,
        kind: ComprehensionKind,
        element: Expr,
        value: Option<Expr>,
        line: usize,
    ) -> PResult<Expr> {
        let generators = self.parse_generators()?;
        Ok(Expr::new(
            ExprKind::Comprehension {
                kind,
                element: Box::new(element),
                value: value.map(Box::new),
                generators,
            },
            line,
        ))
    }

    fn parse_atom(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let constant = |c| Ok(Expr::new(ExprKind::Constant(c), line));
        match self.stream.peek().clone() {
            Token::Name(name) => {
                self.stream.advance();
                Ok(Expr::new(ExprKind::Name(name), line))
            }
            Token::Int(v) => {
                self.stream.advance();
                constant(Constant::Int(v))
            }
            Token::Float(v) => {
                self.stream.advance();
                constant(Constant::Float(v))
            }
            Token::True => {
                self.stream.advance();
                constant(Constant::Bool(true))
            }
            Token::False => {
                self.stream.advance();
                constant(Constant::Bool(false))
            }
            Token::None => {
                self.stream.advance();
                constant(Constant::None)
            }
            Token::Str(_) => self.parse_strings(),
            Token::LParen => self.parse_paren(),
            Token::LBracket => self.parse_list(),
            Token::LBrace => self.parse_brace(),
            _ => Err(self.stream.unexpected()),
        }
    }

    fn parse_paren(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        self.stream.advance();
        if self.stream.eat(&Token::RParen) {
            return Ok(Expr::new(ExprKind::Tuple(Vec::new()), line));
        }
        let first = self.parse_star_or_test()?;
        if self.stream.check(&Token::For) {
            let expr = self.comprehension(ComprehensionKind::Generator, first, None, line)?;
            self.stream.expect(Token::RParen, "')'")?;
            return Ok(expr);
        }
        if !self.stream.check(&Token::Comma) {
            self.stream.expect(Token::RParen, "')'")?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.stream.eat(&Token::Comma) {
            if self.stream.check(&Token::RParen) {
                break;
            }
            items.push(self.parse_star_or_test()?);
        }
        self.stream.expect(Token::RParen, "')'")?;
        Ok(Expr::new(ExprKind::Tuple(items), line))
    }

    fn parse_list(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        self.stream.advance();
        if self.stream.eat(&Token::RBracket) {
            return Ok(Expr::new(ExprKind::List(Vec::new()), line));
        }
        let first = self.parse_star_or_test()?;
        if self.stream.check(&Token::For) {
            let expr = self.comprehension(ComprehensionKind::List, first, None, line)?;
            self.stream.expect(Token::RBracket, "']'")?;
            return Ok(expr);
        }
        let mut items = vec![first];
        while self.stream.eat(&Token::Comma) {
            if self.stream.check(&Token::RBracket) {
                break;
            }
            items.push(self.parse_star_or_test()?);
        }
        self.stream.expect(Token::RBracket, "']'")?;
        Ok(Expr::new(ExprKind::List(items), line))
    }

    fn parse_brace(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        self.stream.advance();
        if self.stream.eat(&Token::RBrace) {
            return Ok(Expr::new(ExprKind::Dict(Vec::new()), line));
        }

        let first_key = if self.stream.eat(&Token::DoubleStar) {
            None
        } else {
            Some(self.parse_star_or_test()?)
        };

        let is_dict = first_key.is_none() || self.stream.check(&Token::Colon);
        if !is_dict {
            let first = first_key.ok_or_else(|| self.stream.unexpected())?;
            if self.stream.check(&Token::For) {
                let expr = self.comprehension(ComprehensionKind::Set, first, None, line)?;
                self.stream.expect(Token::RBrace, "'}'")?;
                return Ok(expr);
            }
            let mut items = vec![first];
            while self.stream.eat(&Token::Comma) {
                if self.stream.check(&Token::RBrace) {
                    break;
                }
                items.push(self.parse_star_or_test()?);
            }
            self.stream.expect(Token::RBrace, "'}'")?;
            return Ok(Expr::new(ExprKind::Set(items), line));
        }

        let first_value = if first_key.is_some() {
            self.stream.expect(Token::Colon, "':'")?;
            self.parse_test()?
        } else {
            self.parse_binary(0)?
        };
        if let Some(key) = &first_key {
            if self.stream.check(&Token::For) {
                let expr =
                    self.comprehension(ComprehensionKind::Dict, key.clone(), Some(first_value), line)?;
                self.stream.expect(Token::RBrace, "'}'")?;
                return Ok(expr);
            }
        }
        let mut entries = vec![(first_key, first_value)];
        while self.stream.eat(&Token::Comma) {
            if self.stream.check(&Token::RBrace) {
                break;
            }
            if self.stream.eat(&Token::DoubleStar) {
                entries.push((None, self.parse_binary(0)?));
            } else {
                let key = self.parse_test()?;
                self.stream.expect(Token::Colon, "':'")?;
                entries.push((Some(key), self.parse_test()?));
            }
        }
        self.stream.expect(Token::RBrace, "'}'")?;
        Ok(Expr::new(ExprKind::Dict(entries), line))
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    /// Parse one or more adjacent string literals into a constant or an
    /// f-string.
    fn parse_strings(&mut self) -> PResult<Expr> {
        let line = self.stream.line();
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut formatted = false;
        while let Token::Str(lit) = self.stream.peek().clone() {
            self.stream.advance();
            if lit.format {
                formatted = true;
                parts.extend(parse_fstring(&lit, line)?);
            } else {
                parts.push(FStringPart::Literal(decode_plain(&lit, line)?));
            }
        }
        if !formatted {
            let text: String = parts
                .into_iter()
                .filter_map(|p| match p {
                    FStringPart::Literal(s) => Some(s),
                    FStringPart::Field { .. } => None,
                })
                .collect();
            return Ok(Expr::new(
                ExprKind::Constant(Constant::Str(Rc::from(text))),
                line,
            ));
        }
        Ok(Expr::new(ExprKind::FString(merge_literals(parts)), line))
    }
}

fn decode_plain(lit: &StrLit, line: usize) -> PResult<String> {
    if lit.raw {
        Ok(lit.body.clone())
    } else {
        lexer::unescape(&lit.body).map_err(|msg| SyntaxError::new(line, msg))
    }
}

fn merge_literals(parts: Vec<FStringPart>) -> Vec<FStringPart> {
    let mut merged: Vec<FStringPart> = Vec::with_capacity(parts.len());
    for part in parts {
        match (merged.last_mut(), part) {
            (_, FStringPart::Literal(s)) if s.is_empty() => {}
            (Some(FStringPart::Literal(prev)), FStringPart::Literal(s)) => prev.push_str(&s),
            (_, part) => merged.push(part),
        }
    }
    merged
}

/// Split an f-string body into literal and replacement-field parts.
fn parse_fstring(lit: &StrLit, line: usize) -> PResult<Vec<FStringPart>> {
    let chars: Vec<char> = lit.body.chars().collect();
    parse_fstring_chars(&chars, lit.raw, line)
}

fn parse_fstring_chars(chars: &[char], raw: bool, line: usize) -> PResult<Vec<FStringPart>> {
    let err = |msg: &str| SyntaxError::new(line, format!("f-string: {msg}"));
    let mut parts = Vec::new();
    let mut literal = String::new();
    let flush = |literal: &mut String, parts: &mut Vec<FStringPart>| -> PResult<()> {
        if !literal.is_empty() {
            let text = if raw {
                std::mem::take(literal)
            } else {
                let decoded =
                    lexer::unescape(literal).map_err(|msg| SyntaxError::new(line, msg))?;
                literal.clear();
                decoded
            };
            parts.push(FStringPart::Literal(text));
        }
        Ok(())
    };

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err(err("single '}' is not allowed")),
            '{' => {
                flush(&mut literal, &mut parts)?;
                let start = i + 1;
                let end = scan_field_expression(chars, start).ok_or_else(|| err("expecting '}'"))?;
                let source: String = chars[start..end].iter().collect();
                if source.trim().is_empty() {
                    return Err(err("empty expression not allowed"));
                }
                let value = parse_embedded_expression(&source, line)?;
                let mut j = end;
                let mut conversion = None;
                if chars.get(j) == Some(&'!') {
                    match chars.get(j + 1) {
                        Some(c @ ('r' | 's' | 'a')) => conversion = Some(*c),
                        _ => return Err(err("invalid conversion character")),
                    }
                    j += 2;
                }
                let mut spec = Vec::new();
                if chars.get(j) == Some(&':') {
                    let spec_start = j + 1;
                    let mut depth = 0usize;
                    j = spec_start;
                    while j < chars.len() {
                        match chars[j] {
                            '{' => depth += 1,
                            '}' if depth == 0 => break,
                            '}' => depth -= 1,
                            _ => {}
                        }
                        j += 1;
                    }
                    spec = parse_fstring_chars(&chars[spec_start..j], raw, line)?;
                }
                if chars.get(j) != Some(&'}') {
                    return Err(err("expecting '}'"));
                }
                parts.push(FStringPart::Field {
                    value: Box::new(value),
                    conversion,
                    spec,
                });
                i = j + 1;
            }
            '\\' if !raw => {
                literal.push(c);
                if let Some(next) = chars.get(i + 1) {
                    literal.push(*next);
                }
                i += 2;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut parts)?;
    Ok(parts)
}

/// Find where a replacement field's expression ends: the first `}`, `!`
/// (not `!=`) or `:` outside brackets and nested strings.
fn scan_field_expression(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth > 0 => depth -= 1,
            '}' => return Some(i),
            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => return Some(i),
            ':' if depth == 0 => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn parse_embedded_expression(source: &str, line: usize) -> PResult<Expr> {
    let relocate = |e: SyntaxError| SyntaxError::new(line, format!("f-string: {}", e.message));
    let mut tokens = lexer::tokenize(source.trim()).map_err(relocate)?;
    for token in &mut tokens {
        token.line = line;
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expressions()?;
    parser.stream.eat(&Token::Newline);
    if !parser.stream.at_end() {
        return Err(SyntaxError::new(line, "f-string: invalid syntax"));
    }
    Ok(expr)
}
