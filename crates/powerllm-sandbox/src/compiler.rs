//! Restricted compiler.
//!
//! [`compile_restricted`] parses a script, rejects constructs outside the
//! allowed subset, and rewrites the tree so every attribute access, item
//! access, assignment target and augmented assignment becomes a guarded
//! node. All policy errors are collected rather than stopping at the first
//! one; a syntax error is reported alone.

use std::rc::Rc;

use crate::ast::{
    Alias, Expr, ExprKind, FStringPart, Generator, Handler, Keyword, Module, Param, Params, Stmt,
    StmtKind, Target,
};
use crate::parser;

/// Names scripts may never reference.
const BANNED_NAMES: &[&str] = &[
    "exec",
    "eval",
    "compile",
    "open",
    "globals",
    "locals",
    "vars",
    "dir",
    "input",
    "breakpoint",
    "memoryview",
    "super",
    "classmethod",
    "staticmethod",
    "property",
    "setattr",
    "delattr",
];

/// Names that may be read but never bound.
const READ_ONLY_NAMES: &[&str] = &["print", "printed"];

pub const PRINT_WARNING: &str = "Prints, but never reads 'printed' variable.";

/// A validated, rewritten program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Rc<[Stmt]>,
}

/// Output of [`compile_restricted`]. `program` is `None` whenever `errors`
/// is non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    pub program: Option<Program>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Compile source text into a guarded program.
pub fn compile_restricted(source: &str) -> CompiledProgram {
    let module = match parser::parse_module(source) {
        Ok(module) => module,
        Err(err) => {
            return CompiledProgram {
                program: None,
                warnings: Vec::new(),
                errors: vec![err.to_string()],
            };
        }
    };

    let mut compiler = Compiler::default();
    let body = compiler.module(module);
    if compiler.uses_print && !compiler.reads_printed {
        compiler.warnings.push(PRINT_WARNING.to_string());
    }
    let program = compiler.errors.is_empty().then(|| Program {
        body: Rc::from(body),
    });
    CompiledProgram {
        program,
        warnings: compiler.warnings,
        errors: compiler.errors,
    }
}

#[derive(Default)]
struct Compiler {
    errors: Vec<String>,
    warnings: Vec<String>,
    uses_print: bool,
    reads_printed: bool,
    function_depth: usize,
    loop_depth: usize,
}

impl Compiler {
    fn error(&mut self, line: usize, message: impl AsRef<str>) {
        self.errors.push(format!("Line {line}: {}", message.as_ref()));
    }

    fn check_name(&mut self, name: &str, line: usize) {
        if name.starts_with('_') {
            self.error(
                line,
                format!("\"{name}\" is an invalid variable name because it starts with \"_\""),
            );
        } else if BANNED_NAMES.contains(&name) {
            self.error(line, format!("\"{name}\" is a reserved name."));
        }
    }

    fn check_store_name(&mut self, name: &str, line: usize) {
        self.check_name(name, line);
        if READ_ONLY_NAMES.contains(&name) {
            self.error(line, format!("\"{name}\" is a reserved name."));
        }
    }

    fn check_attribute(&mut self, attr: &str, line: usize) {
        if attr.starts_with('_') {
            self.error(
                line,
                format!("\"{attr}\" is an invalid attribute name because it starts with \"_\"."),
            );
        }
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn module(&mut self, module: Module) -> Vec<Stmt> {
        self.block(module.body)
    }

    fn block(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        stmts.into_iter().map(|s| self.stmt(s)).collect()
    }

    fn stmt(&mut self, stmt: Stmt) -> Stmt {
        let line = stmt.line;
        let kind = match stmt.kind {
            StmtKind::Expr(expr) => {
                let discarded = !matches!(
                    expr.kind,
                    ExprKind::Call { .. }
                        | ExprKind::Constant(crate::ast::Constant::Str(_))
                        | ExprKind::FString(_)
                );
                if discarded {
                    self.warnings
                        .push(format!("Line {line}: expression result is discarded"));
                }
                StmtKind::Expr(self.expr(expr))
            }
            StmtKind::Assign { targets, value } => StmtKind::Assign {
                targets: targets
                    .into_iter()
                    .map(|t| self.target(t, line))
                    .collect(),
                value: self.expr(value),
            },
            StmtKind::AugAssign { target, op, value } => {
                let target = match target {
                    Target::Name(name) => {
                        self.check_store_name(&name, line);
                        Target::Name(name)
                    }
                    Target::Attribute { .. } => {
                        self.error(line, "Augmented assignment of attributes is not allowed.");
                        target
                    }
                    _ => {
                        self.error(
                            line,
                            "Augmented assignment of object items and slices is not allowed.",
                        );
                        target
                    }
                };
                StmtKind::InPlace {
                    target,
                    op,
                    value: self.expr(value),
                }
            }
            StmtKind::InPlace { .. } => {
                self.error(line, "unexpected guarded node in source tree");
                StmtKind::Pass
            }
            StmtKind::If { test, body, orelse } => StmtKind::If {
                test: self.expr(test),
                body: self.block(body),
                orelse: self.block(orelse),
            },
            StmtKind::While { test, body, orelse } => {
                let test = self.expr(test);
                self.loop_depth += 1;
                let body = self.block(body);
                self.loop_depth -= 1;
                StmtKind::While {
                    test,
                    body,
                    orelse: self.block(orelse),
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let target = self.target(target, line);
                let iter = self.expr(iter);
                self.loop_depth += 1;
                let body = self.block(body);
                self.loop_depth -= 1;
                StmtKind::For {
                    target,
                    iter,
                    body,
                    orelse: self.block(orelse),
                }
            }
            StmtKind::Break if self.loop_depth == 0 => {
                self.error(line, "SyntaxError: 'break' outside loop");
                StmtKind::Break
            }
            StmtKind::Continue if self.loop_depth == 0 => {
                self.error(line, "SyntaxError: 'continue' not properly in loop");
                StmtKind::Continue
            }
            StmtKind::FunctionDef { name, params, body } => {
                self.check_store_name(&name, line);
                let params = self.params(&params, line);
                let saved_loops = std::mem::take(&mut self.loop_depth);
                self.function_depth += 1;
                let body = self.block(body.to_vec());
                self.function_depth -= 1;
                self.loop_depth = saved_loops;
                StmtKind::FunctionDef {
                    name,
                    params: Rc::new(params),
                    body: Rc::from(body),
                }
            }
            StmtKind::Return(value) => {
                if self.function_depth == 0 {
                    self.error(line, "SyntaxError: 'return' outside function");
                }
                StmtKind::Return(value.map(|v| self.expr(v)))
            }
            StmtKind::Import(names) => {
                for alias in &names {
                    self.check_alias(alias, line);
                }
                StmtKind::Import(names)
            }
            StmtKind::ImportFrom {
                module,
                names,
                level,
            } => {
                if level > 0 {
                    self.error(line, "relative imports are not allowed.");
                }
                self.check_name(module.split('.').next().unwrap_or_default(), line);
                for alias in &names {
                    if alias.name == "*" {
                        self.error(line, "\"*\" imports are not allowed.");
                    } else {
                        self.check_alias(alias, line);
                    }
                }
                StmtKind::ImportFrom {
                    module,
                    names,
                    level,
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => StmtKind::Try {
                body: self.block(body),
                handlers: handlers
                    .into_iter()
                    .map(|h| self.handler(h))
                    .collect(),
                orelse: self.block(orelse),
                finalbody: self.block(finalbody),
            },
            StmtKind::Raise { exc, cause } => StmtKind::Raise {
                exc: exc.map(|e| self.expr(e)),
                cause: cause.map(|e| self.expr(e)),
            },
            StmtKind::Assert { test, msg } => StmtKind::Assert {
                test: self.expr(test),
                msg: msg.map(|e| self.expr(e)),
            },
            StmtKind::Delete(targets) => StmtKind::Delete(
                targets
                    .into_iter()
                    .map(|t| self.target(t, line))
                    .collect(),
            ),
            StmtKind::Global(names) => {
                for name in &names {
                    self.check_store_name(name, line);
                }
                StmtKind::Global(names)
            }
            kind @ (StmtKind::Break | StmtKind::Continue | StmtKind::Pass) => kind,
        };
        Stmt::new(kind, line)
    }

    fn check_alias(&mut self, alias: &Alias, line: usize) {
        for part in alias.name.split('.') {
            self.check_name(part, line);
        }
        if let Some(asname) = &alias.asname {
            self.check_store_name(asname, line);
        }
    }

    fn handler(&mut self, handler: Handler) -> Handler {
        if let Some(name) = &handler.name {
            self.check_store_name(name, handler.line);
        }
        Handler {
            kind: handler.kind.map(|k| self.expr(k)),
            name: handler.name,
            body: self.block(handler.body),
            line: handler.line,
        }
    }

    fn params(&mut self, params: &Params, line: usize) -> Params {
        let convert = |compiler: &mut Self, p: &Param| {
            compiler.check_store_name(&p.name, line);
            Param {
                name: p.name.clone(),
                default: p.default.clone().map(|d| compiler.expr(d)),
            }
        };
        let positional = params
            .positional
            .iter()
            .map(|p| convert(self, p))
            .collect();
        let kwonly = params.kwonly.iter().map(|p| convert(self, p)).collect();
        for name in params.vararg.iter().chain(params.kwarg.iter()) {
            self.check_store_name(name, line);
        }
        Params {
            positional,
            vararg: params.vararg.clone(),
            kwonly,
            kwarg: params.kwarg.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Targets
    // -----------------------------------------------------------------------

    fn target(&mut self, target: Target, line: usize) -> Target {
        match target {
            Target::Name(name) => {
                self.check_store_name(&name, line);
                Target::Name(name)
            }
            Target::Attribute { value, attr } => {
                self.check_attribute(&attr, line);
                Target::GuardedAttribute {
                    value: Box::new(self.expr(*value)),
                    attr,
                }
            }
            Target::Subscript { value, index } => Target::GuardedSubscript {
                value: Box::new(self.expr(*value)),
                index: Box::new(self.expr(*index)),
            },
            Target::Sequence(items) => {
                let mut starred = None;
                let mut targets = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        Target::Starred(inner) => {
                            if starred.is_some() {
                                self.error(line, "multiple starred expressions in assignment");
                            }
                            starred = Some(i);
                            targets.push(self.target(*inner, line));
                        }
                        other => targets.push(self.target(other, line)),
                    }
                }
                Target::Unpack { targets, starred }
            }
            Target::Starred(inner) => {
                self.error(line, "starred assignment target must be in a list or tuple");
                self.target(*inner, line)
            }
            guarded @ (Target::GuardedAttribute { .. }
            | Target::GuardedSubscript { .. }
            | Target::Unpack { .. }) => {
                self.error(line, "unexpected guarded node in source tree");
                guarded
            }
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn boxed(&mut self, expr: Box<Expr>) -> Box<Expr> {
        Box::new(self.expr(*expr))
    }

    fn exprs(&mut self, exprs: Vec<Expr>) -> Vec<Expr> {
        exprs.into_iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&mut self, expr: Expr) -> Expr {
        let line = expr.line;
        let kind = match expr.kind {
            ExprKind::Name(name) => match name.as_str() {
                "print" => {
                    self.uses_print = true;
                    ExprKind::PrintFunction
                }
                "printed" => {
                    self.reads_printed = true;
                    ExprKind::Printed
                }
                _ => {
                    self.check_name(&name, line);
                    ExprKind::Name(name)
                }
            },
            ExprKind::Constant(c) => ExprKind::Constant(c),
            ExprKind::FString(parts) => ExprKind::FString(self.fstring_parts(parts)),
            ExprKind::List(items) => ExprKind::List(self.exprs(items)),
            ExprKind::Tuple(items) => ExprKind::Tuple(self.exprs(items)),
            ExprKind::Set(items) => ExprKind::Set(self.exprs(items)),
            ExprKind::Dict(entries) => ExprKind::Dict(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.map(|k| self.expr(k)), self.expr(v)))
                    .collect(),
            ),
            ExprKind::Starred(inner) => ExprKind::Starred(self.boxed(inner)),
            ExprKind::BinOp { op, left, right } => ExprKind::BinOp {
                op,
                left: self.boxed(left),
                right: self.boxed(right),
            },
            ExprKind::UnaryOp { op, operand } => ExprKind::UnaryOp {
                op,
                operand: self.boxed(operand),
            },
            ExprKind::BoolOp { op, values } => ExprKind::BoolOp {
                op,
                values: self.exprs(values),
            },
            ExprKind::Compare { left, ops } => ExprKind::Compare {
                left: self.boxed(left),
                ops: ops.into_iter().map(|(op, e)| (op, self.expr(e))).collect(),
            },
            ExprKind::IfExp { test, body, orelse } => ExprKind::IfExp {
                test: self.boxed(test),
                body: self.boxed(body),
                orelse: self.boxed(orelse),
            },
            ExprKind::Lambda { params, body } => {
                let params = self.params(&params, line);
                let saved_loops = std::mem::take(&mut self.loop_depth);
                let body = self.expr((*body).clone());
                self.loop_depth = saved_loops;
                ExprKind::Lambda {
                    params: Rc::new(params),
                    body: Rc::new(body),
                }
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => ExprKind::Call {
                func: self.boxed(func),
                args: self.exprs(args),
                keywords: keywords
                    .into_iter()
                    .map(|k| self.keyword(k))
                    .collect(),
            },
            ExprKind::Slice { lower, upper, step } => ExprKind::Slice {
                lower: lower.map(|e| self.boxed(e)),
                upper: upper.map(|e| self.boxed(e)),
                step: step.map(|e| self.boxed(e)),
            },
            ExprKind::Comprehension {
                kind,
                element,
                value,
                generators,
            } => {
                let generators = generators
                    .into_iter()
                    .map(|g| self.generator(g, line))
                    .collect();
                ExprKind::Comprehension {
                    kind,
                    element: self.boxed(element),
                    value: value.map(|v| self.boxed(v)),
                    generators,
                }
            }
            ExprKind::Attribute { value, attr } => {
                self.check_attribute(&attr, line);
                ExprKind::GetAttr {
                    value: self.boxed(value),
                    attr,
                }
            }
            ExprKind::Subscript { value, index } => ExprKind::GetItem {
                value: self.boxed(value),
                index: self.boxed(index),
            },
            guarded @ (ExprKind::GetAttr { .. }
            | ExprKind::GetItem { .. }
            | ExprKind::PrintFunction
            | ExprKind::Printed) => {
                self.error(line, "unexpected guarded node in source tree");
                guarded
            }
        };
        Expr::new(kind, line)
    }

    fn keyword(&mut self, keyword: Keyword) -> Keyword {
        if let Some(name) = &keyword.name {
            self.check_name(name, keyword.line);
        }
        Keyword {
            name: keyword.name,
            value: self.expr(keyword.value),
            line: keyword.line,
        }
    }

    fn generator(&mut self, generator: Generator, line: usize) -> Generator {
        Generator {
            target: self.target(generator.target, line),
            iter: self.expr(generator.iter),
            conditions: self.exprs(generator.conditions),
        }
    }

    fn fstring_parts(&mut self, parts: Vec<FStringPart>) -> Vec<FStringPart> {
        parts
            .into_iter()
            .map(|part| match part {
                FStringPart::Literal(s) => FStringPart::Literal(s),
                FStringPart::Field {
                    value,
                    conversion,
                    spec,
                } => FStringPart::Field {
                    value: self.boxed(value),
                    conversion,
                    spec: self.fstring_parts(spec),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors(source: &str) -> Vec<String> {
        compile_restricted(source).errors
    }

    fn contains_raw(stmts: &[Stmt]) -> bool {
        fn expr_raw(e: &Expr) -> bool {
            match &e.kind {
                ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => true,
                ExprKind::GetAttr { value, .. } => expr_raw(value),
                ExprKind::GetItem { value, index } => expr_raw(value) || expr_raw(index),
                ExprKind::Call { func, args, .. } => expr_raw(func) || args.iter().any(expr_raw),
                ExprKind::BinOp { left, right, .. } => expr_raw(left) || expr_raw(right),
                _ => false,
            }
        }
        stmts.iter().any(|s| match &s.kind {
            StmtKind::AugAssign { .. } => true,
            StmtKind::Expr(e) => expr_raw(e),
            StmtKind::Assign { targets, value } => {
                expr_raw(value)
                    || targets.iter().any(|t| {
                        matches!(
                            t,
                            Target::Attribute { .. } | Target::Subscript { .. } | Target::Sequence(_)
                        )
                    })
            }
            StmtKind::For { body, .. } | StmtKind::While { body, .. } => contains_raw(body),
            StmtKind::If { body, orelse, .. } => contains_raw(body) || contains_raw(orelse),
            StmtKind::FunctionDef { body, .. } => contains_raw(body),
            _ => false,
        })
    }

    #[test]
    fn valid_program_compiles() {
        let compiled = compile_restricted("output['a'] = 1\n");
        assert!(compiled.errors.is_empty());
        assert!(compiled.program.is_some());
    }

    #[test]
    fn syntax_errors_are_reported() {
        let compiled = compile_restricted("output[ = 1\n");
        assert_eq!(compiled.errors.len(), 1);
        assert!(compiled.errors[0].starts_with("Line 1: SyntaxError:"));
        assert!(compiled.program.is_none());
    }

    #[test]
    fn underscore_names_are_rejected() {
        assert_eq!(
            errors("_x = 1\n"),
            vec!["Line 1: \"_x\" is an invalid variable name because it starts with \"_\""]
        );
        assert_eq!(
            errors("y = hass.__class__\n"),
            vec![
                "Line 1: \"__class__\" is an invalid attribute name because it starts with \"_\"."
            ]
        );
        assert_eq!(errors("def f(_a):\n    return _a\n").len(), 2);
        assert_eq!(errors("f(_key=1)\n").len(), 1);
    }

    #[test]
    fn all_errors_are_collected() {
        let errs = errors("exec('x')\nopen('f')\n_y = 2\n");
        assert_eq!(errs.len(), 3);
        assert!(errs[0].starts_with("Line 1:"));
        assert!(errs[2].starts_with("Line 3:"));
    }

    #[test]
    fn import_restrictions() {
        assert_eq!(errors("from . import x\n").len(), 1);
        assert_eq!(
            errors("from math import *\n"),
            vec!["Line 1: \"*\" imports are not allowed."]
        );
        assert!(errors("import math as m\nfrom json import dumps\n").is_empty());
    }

    #[test]
    fn augmented_assignment_targets() {
        assert!(errors("x = 1\nx += 2\n").is_empty());
        assert_eq!(
            errors("output['n'] += 1\n"),
            vec!["Line 1: Augmented assignment of object items and slices is not allowed."]
        );
        assert_eq!(errors("a.b += 1\n").len(), 1);
    }

    #[test]
    fn control_flow_placement() {
        assert_eq!(
            errors("return 1\n"),
            vec!["Line 1: SyntaxError: 'return' outside function"]
        );
        assert_eq!(errors("break\n").len(), 1);
        assert!(errors("for i in x:\n    def f():\n        return i\n    break\n").is_empty());
    }

    #[test]
    fn print_warning_when_printed_unused() {
        let compiled = compile_restricted("print('hi')\n");
        assert!(compiled.warnings.contains(&PRINT_WARNING.to_string()));
        let compiled = compile_restricted("print('hi')\noutput['p'] = printed\n");
        assert!(!compiled.warnings.contains(&PRINT_WARNING.to_string()));
    }

    #[test]
    fn discarded_expression_warning() {
        let compiled = compile_restricted("'doc'\n1 + 1\nf()\n");
        assert_eq!(
            compiled.warnings,
            vec!["Line 2: expression result is discarded".to_string()]
        );
    }

    #[test]
    fn printed_is_read_only() {
        assert_eq!(errors("printed = 1\n").len(), 1);
    }

    #[test]
    fn rewrite_leaves_no_raw_nodes() {
        let compiled = compile_restricted(
            "a, b = data.get('x'), output\n\
             for k, v in data.items():\n    output[k] = v.upper()\n\
             def f(x):\n    return x.y[0]\n\
             n = 0\nn += len(data['k'])\n",
        );
        assert!(compiled.errors.is_empty(), "{:?}", compiled.errors);
        let program = compiled.program.unwrap();
        assert!(!contains_raw(&program.body));
    }
}
