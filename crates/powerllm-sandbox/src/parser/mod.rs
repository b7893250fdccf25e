//! Recursive descent parser for the script language.
//!
//! ## Architecture
//!
//! - `stream`: [`TokenStream`] with lookahead over the laid-out tokens
//! - `expr`: expressions, using a precedence table for binary operators
//! - `stmt`: statements and blocks
//!
//! The parser stops at the first syntax error.

mod expr;
mod stmt;
mod stream;

use stream::TokenStream;

use crate::ast::Module;
use crate::lexer::{self, SyntaxError};

/// Nesting depth at which the parser gives up.
const MAX_DEPTH: usize = 100;

type PResult<T> = Result<T, SyntaxError>;

/// Parser state shared by the expression and statement halves.
pub(crate) struct Parser {
    stream: TokenStream,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<lexer::Spanned>) -> Self {
        Self {
            stream: TokenStream::new(tokens),
            depth: 0,
        }
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.stream.error("too many nested expressions or blocks"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Parse a complete source text into a module.
pub fn parse_module(source: &str) -> Result<Module, SyntaxError> {
    let tokens = lexer::tokenize(source)?;
    let mut parser = Parser::new(tokens);
    parser.parse_module()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Constant, ExprKind, StmtKind, Target};

    fn parse(source: &str) -> Module {
        parse_module(source).unwrap()
    }

    fn first_expr(source: &str) -> ExprKind {
        match parse(source).body.remove(0).kind {
            StmtKind::Expr(e) => e.kind,
            other => panic!("not an expression statement: {other:?}"),
        }
    }

    #[test]
    fn precedence_follows_python() {
        match first_expr("1 + 2 * 3") {
            ExprKind::BinOp { op, right, .. } => {
                assert_eq!(op, BinOp::Add);
                assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("{other:?}"),
        }
        match first_expr("-2 ** 2") {
            ExprKind::UnaryOp { operand, .. } => {
                assert!(matches!(operand.kind, ExprKind::BinOp { op: BinOp::Pow, .. }));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn chained_comparison() {
        match first_expr("a < b <= c") {
            ExprKind::Compare { ops, .. } => assert_eq!(ops.len(), 2),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn assignment_targets() {
        let module = parse("a, *b = x\nd['k'] = 1\n");
        match &module.body[0].kind {
            StmtKind::Assign { targets, .. } => match &targets[0] {
                Target::Sequence(items) => assert!(matches!(items[1], Target::Starred(_))),
                other => panic!("{other:?}"),
            },
            other => panic!("{other:?}"),
        }
        assert!(matches!(
            &module.body[1].kind,
            StmtKind::Assign { targets, .. } if matches!(targets[0], Target::Subscript { .. })
        ));
    }

    #[test]
    fn compound_statements() {
        let module = parse(
            "def f(a, b=2, *rest, key=None, **kw):\n    return a\n\
             for i in range(3):\n    if i:\n        continue\n    else:\n        pass\n\
             try:\n    x = 1\nexcept ValueError as err:\n    x = 2\nfinally:\n    y = 3\n",
        );
        assert_eq!(module.body.len(), 3);
        match &module.body[0].kind {
            StmtKind::FunctionDef { params, .. } => {
                assert_eq!(params.positional.len(), 2);
                assert_eq!(params.vararg.as_deref(), Some("rest"));
                assert_eq!(params.kwonly.len(), 1);
                assert_eq!(params.kwarg.as_deref(), Some("kw"));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn string_concatenation_and_fstrings() {
        assert_eq!(
            first_expr("'a' 'b'"),
            ExprKind::Constant(Constant::Str("ab".into()))
        );
        match first_expr("f'x={x!r:>5} {{done}}'") {
            ExprKind::FString(parts) => assert_eq!(parts.len(), 3),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn comprehensions() {
        assert!(matches!(
            first_expr("[x * 2 for x in items if x]"),
            ExprKind::Comprehension { .. }
        ));
        assert!(matches!(
            first_expr("{k: v for k, v in pairs}"),
            ExprKind::Comprehension { value: Some(_), .. }
        ));
        assert!(matches!(
            first_expr("sum(x for x in y)"),
            ExprKind::Call { .. }
        ));
    }

    #[test]
    fn slices() {
        match first_expr("x[1:2, ::3]") {
            ExprKind::Subscript { index, .. } => {
                assert!(matches!(index.kind, ExprKind::Tuple(_)));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn relative_import_levels() {
        match &parse("from ..pkg import name\n").body[0].kind {
            StmtKind::ImportFrom { level, module, .. } => {
                assert_eq!(*level, 2);
                assert_eq!(module, "pkg");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn syntax_errors_carry_line_numbers() {
        let err = parse_module("x = 1\ny = (\n").unwrap_err();
        assert_eq!(err.line, 2);
        let err = parse_module("x = 1\nclass Foo:\n    pass\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.to_string().starts_with("Line 2: SyntaxError:"));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let source = format!("x = {}1{}", "(".repeat(500), ")".repeat(500));
        assert!(parse_module(&source).is_err());
    }
}
