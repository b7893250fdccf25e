//! Statement and block parsing.

use std::rc::Rc;

use super::expr::to_target;
use super::{PResult, Parser};
use crate::ast::{Alias, ExprKind, Handler, Module, Stmt, StmtKind, Target};
use crate::lexer::Token;

impl Parser {
    pub(super) fn parse_module(&mut self) -> PResult<Module> {
        let mut body = Vec::new();
        while self.stream.eat(&Token::Newline) {}
        while !self.stream.at_end() {
            body.extend(self.parse_statement()?);
        }
        Ok(Module { body })
    }

    /// Parse one logical line or compound statement.
    fn parse_statement(&mut self) -> PResult<Vec<Stmt>> {
        let line = self.stream.line();
        let stmt = match self.stream.peek() {
            Token::If => self.parse_if()?,
            Token::While => self.parse_while()?,
            Token::For => self.parse_for()?,
            Token::Def => self.parse_def()?,
            Token::Try => self.parse_try()?,
            Token::At => return Err(self.stream.error("decorators are not supported")),
            Token::Indent => return Err(self.stream.error("unexpected indent")),
            _ => return self.parse_simple_statements(),
        };
        Ok(vec![Stmt::new(stmt, line)])
    }

    fn parse_simple_statements(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            let line = self.stream.line();
            stmts.push(Stmt::new(self.parse_simple()?, line));
            if !self.stream.eat(&Token::Semicolon) || self.stream.check(&Token::Newline) {
                break;
            }
        }
        if !self.stream.eat(&Token::Newline) && !self.stream.at_end() {
            return Err(self.stream.unexpected());
        }
        Ok(stmts)
    }

    /// Parse the `: <suite>` part of a compound statement.
    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.stream.expect(Token::Colon, "':'")?;
        if !self.stream.eat(&Token::Newline) {
            return self.parse_simple_statements();
        }
        if !self.stream.eat(&Token::Indent) {
            return Err(self.stream.error("expected an indented block"));
        }
        self.enter()?;
        let mut body = Vec::new();
        let result = loop {
            if self.stream.eat(&Token::Dedent) || self.stream.at_end() {
                break Ok(());
            }
            match self.parse_statement() {
                Ok(stmts) => body.extend(stmts),
                Err(e) => break Err(e),
            }
        };
        self.leave();
        result.map(|()| body)
    }

    // -----------------------------------------------------------------------
    // Compound statements
    // -----------------------------------------------------------------------

    fn parse_if(&mut self) -> PResult<StmtKind> {
        self.stream.advance();
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let orelse = if self.stream.check(&Token::Elif) {
            let line = self.stream.line();
            vec![Stmt::new(self.parse_if()?, line)]
        } else if self.stream.eat(&Token::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::If { test, body, orelse })
    }

    fn parse_while(&mut self) -> PResult<StmtKind> {
        self.stream.advance();
        let test = self.parse_test()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else()?;
        Ok(StmtKind::While { test, body, orelse })
    }

    fn parse_for(&mut self) -> PResult<StmtKind> {
        self.stream.advance();
        let target = self.parse_target_list()?;
        self.stream.expect(Token::In, "'in'")?;
        let iter = self.parse_expressions()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else()?;
        Ok(StmtKind::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn parse_else(&mut self) -> PResult<Vec<Stmt>> {
        if self.stream.eat(&Token::Else) {
            self.parse_block()
        } else {
            Ok(Vec::new())
        }
    }

    fn parse_def(&mut self) -> PResult<StmtKind> {
        self.stream.advance();
        let name = self.stream.expect_name()?;
        self.stream.expect(Token::LParen, "'('")?;
        let params = self.parse_params(&Token::RParen, true)?;
        self.stream.expect(Token::RParen, "')'")?;
        if self.stream.eat(&Token::Arrow) {
            self.parse_test()?;
        }
        let body = self.parse_block()?;
        Ok(StmtKind::FunctionDef {
            name,
            params: Rc::new(params),
            body: Rc::from(body),
        })
    }

    fn parse_try(&mut self) -> PResult<StmtKind> {
        self.stream.advance();
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.stream.check(&Token::Except) {
            let line = self.stream.line();
            self.stream.advance();
            let (kind, name) = if self.stream.check(&Token::Colon) {
                (None, None)
            } else {
                let kind = self.parse_test()?;
                let name = if self.stream.eat(&Token::As) {
                    Some(self.stream.expect_name()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let body = self.parse_block()?;
            handlers.push(Handler {
                kind,
                name,
                body,
                line,
            });
        }
        let orelse = if !handlers.is_empty() {
            self.parse_else()?
        } else {
            Vec::new()
        };
        let finalbody = if self.stream.eat(&Token::Finally) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.stream.error("expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    // -----------------------------------------------------------------------
    // Simple statements
    // -----------------------------------------------------------------------

    fn parse_simple(&mut self) -> PResult<StmtKind> {
        match self.stream.peek() {
            Token::Pass => {
                self.stream.advance();
                Ok(StmtKind::Pass)
            }
            Token::Break => {
                self.stream.advance();
                Ok(StmtKind::Break)
            }
            Token::Continue => {
                self.stream.advance();
                Ok(StmtKind::Continue)
            }
            Token::Return => {
                self.stream.advance();
                let value = if super::expr::starts_expr(self.stream.peek()) {
                    Some(self.parse_expressions()?)
                } else {
                    None
                };
                Ok(StmtKind::Return(value))
            }
            Token::Global => {
                self.stream.advance();
                let mut names = vec![self.stream.expect_name()?];
                while self.stream.eat(&Token::Comma) {
                    names.push(self.stream.expect_name()?);
                }
                Ok(StmtKind::Global(names))
            }
            Token::Del => {
                self.stream.advance();
                let target = self.parse_target_list()?;
                let targets = match target {
                    Target::Sequence(items) => items,
                    single => vec![single],
                };
                Ok(StmtKind::Delete(targets))
            }
            Token::Raise => {
                self.stream.advance();
                if !super::expr::starts_expr(self.stream.peek()) {
                    return Ok(StmtKind::Raise {
                        exc: None,
                        cause: None,
                    });
                }
                let exc = self.parse_test()?;
                let cause = if self.stream.eat(&Token::From) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                Ok(StmtKind::Raise {
                    exc: Some(exc),
                    cause,
                })
            }
            Token::Assert => {
                self.stream.advance();
                let test = self.parse_test()?;
                let msg = if self.stream.eat(&Token::Comma) {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                Ok(StmtKind::Assert { test, msg })
            }
            Token::Import => self.parse_import(),
            Token::From => self.parse_from_import(),
            Token::Reserved(_) => Err(self.stream.unexpected()),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_dotted_name(&mut self) -> PResult<String> {
        let mut name = self.stream.expect_name()?;
        while self.stream.eat(&Token::Dot) {
            name.push('.');
            name.push_str(&self.stream.expect_name()?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self, dotted: bool) -> PResult<Alias> {
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.stream.expect_name()?
        };
        let asname = if self.stream.eat(&Token::As) {
            Some(self.stream.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn parse_import(&mut self) -> PResult<StmtKind> {
        self.stream.advance();
        let mut names = vec![self.parse_alias(true)?];
        while self.stream.eat(&Token::Comma) {
            names.push(self.parse_alias(true)?);
        }
        Ok(StmtKind::Import(names))
    }

    fn parse_from_import(&mut self) -> PResult<StmtKind> {
        self.stream.advance();
        let mut level = 0;
        loop {
            match self.stream.peek() {
                Token::Dot => level += 1,
                Token::Reserved("...") => level += 3,
                _ => break,
            }
            self.stream.advance();
        }
        let module = if level > 0 && self.stream.check(&Token::Import) {
            String::new()
        } else {
            self.parse_dotted_name()?
        };
        self.stream.expect(Token::Import, "'import'")?;

        let mut names = Vec::new();
        if self.stream.eat(&Token::Star) {
            names.push(Alias {
                name: "*".to_string(),
                asname: None,
            });
        } else {
            let parenthesized = self.stream.eat(&Token::LParen);
            loop {
                names.push(self.parse_alias(false)?);
                if !self.stream.eat(&Token::Comma) {
                    break;
                }
                if parenthesized && self.stream.check(&Token::RParen) {
                    break;
                }
            }
            if parenthesized {
                self.stream.expect(Token::RParen, "')'")?;
            }
        }
        Ok(StmtKind::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn parse_expression_statement(&mut self) -> PResult<StmtKind> {
        let first = self.parse_expressions()?;
        match self.stream.peek().clone() {
            Token::Assign => {
                let mut chain = vec![first];
                while self.stream.eat(&Token::Assign) {
                    chain.push(self.parse_expressions()?);
                }
                let value = chain.pop().ok_or_else(|| self.stream.unexpected())?;
                let targets = chain
                    .into_iter()
                    .map(to_target)
                    .collect::<PResult<Vec<_>>>()?;
                Ok(StmtKind::Assign { targets, value })
            }
            Token::AugAssign(op) => {
                self.stream.advance();
                if !matches!(
                    first.kind,
                    ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
                ) {
                    return Err(self
                        .stream
                        .error("illegal expression for augmented assignment"));
                }
                let target = to_target(first)?;
                let value = self.parse_expressions()?;
                Ok(StmtKind::AugAssign { target, op, value })
            }
            Token::Colon => {
                // Annotated assignment; the annotation is evaluated nowhere.
                if !matches!(
                    first.kind,
                    ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. }
                ) {
                    return Err(self.stream.error("illegal target for annotation"));
                }
                self.stream.advance();
                self.parse_test()?;
                if self.stream.eat(&Token::Assign) {
                    let value = self.parse_expressions()?;
                    Ok(StmtKind::Assign {
                        targets: vec![to_target(first)?],
                        value,
                    })
                } else {
                    Ok(StmtKind::Pass)
                }
            }
            _ => Ok(StmtKind::Expr(first)),
        }
    }
}
