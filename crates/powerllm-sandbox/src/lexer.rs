//! Tokenizer for the script language.
//!
//! Raw lexemes are produced by a [`logos`] scanner. A second pass turns
//! physical lines into logical ones: it tracks bracket depth, drops blank
//! lines, and synthesizes `Indent` / `Dedent` tokens from leading
//! whitespace so the parser can treat blocks like braces.

use logos::{Lexer, Logos};

/// A lexical failure reported by the scanner.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexError {
    #[default]
    InvalidCharacter,
    UnterminatedString,
    BytesLiteral,
    IntegerTooLarge,
    InvalidNumber,
}

impl LexError {
    fn message(&self) -> &'static str {
        match self {
            Self::InvalidCharacter => "invalid character in source",
            Self::UnterminatedString => "unterminated string literal",
            Self::BytesLiteral => "bytes literals are not supported",
            Self::IntegerTooLarge => "integer literal too large",
            Self::InvalidNumber => "invalid numeric literal",
        }
    }
}

/// A string literal as written in the source.
///
/// Escapes are left undecoded; the parser decides how to interpret the body
/// based on the prefix flags.
#[derive(Debug, Clone, PartialEq)]
pub struct StrLit {
    pub body: String,
    pub raw: bool,
    pub format: bool,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\f]+")]
#[logos(skip r"#[^\r\n]*")]
#[logos(skip r"\\\r?\n")]
pub enum Token {
    // --- Keywords ---
    #[token("False")]
    False,
    #[token("None")]
    None,
    #[token("True")]
    True,
    #[token("and")]
    And,
    #[token("as")]
    As,
    #[token("assert")]
    Assert,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("def")]
    Def,
    #[token("del")]
    Del,
    #[token("elif")]
    Elif,
    #[token("else")]
    Else,
    #[token("except")]
    Except,
    #[token("finally")]
    Finally,
    #[token("for")]
    For,
    #[token("from")]
    From,
    #[token("global")]
    Global,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("in")]
    In,
    #[token("is")]
    Is,
    #[token("lambda")]
    Lambda,
    #[token("not")]
    Not,
    #[token("or")]
    Or,
    #[token("pass")]
    Pass,
    #[token("raise")]
    Raise,
    #[token("return")]
    Return,
    #[token("try")]
    Try,
    #[token("while")]
    While,

    /// Syntax the language recognizes but refuses to run.
    #[token("class", reserved_class)]
    #[token("with", reserved_with)]
    #[token("async", reserved_async)]
    #[token("await", reserved_await)]
    #[token("yield", reserved_yield)]
    #[token("nonlocal", reserved_nonlocal)]
    #[token(":=", reserved_walrus)]
    #[token("...", reserved_ellipsis)]
    Reserved(&'static str),

    // --- Literals ---
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Name(String),

    #[regex(r"[0-9][0-9_]*", lex_decimal)]
    #[regex(r"0[xX][0-9a-fA-F_]+", |lex| lex_radix(lex, 16))]
    #[regex(r"0[oO][0-7_]+", |lex| lex_radix(lex, 8))]
    #[regex(r"0[bB][01_]+", |lex| lex_radix(lex, 2))]
    Int(i64),

    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?", lex_float)]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", lex_float)]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+", lex_float)]
    Float(f64),

    #[regex(r#"([rRuUfFbB]|[rR][fFbB]|[fFbB][rR])?["']"#, lex_string)]
    Str(StrLit),

    // --- Delimiters ---
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token("=")]
    Assign,

    // --- Operators ---
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,
    #[token("@")]
    At,
    #[token("<<")]
    LShift,
    #[token(">>")]
    RShift,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,

    /// Augmented assignment, carrying the operator spelling (e.g. `+=`).
    #[token("+=", aug_add)]
    #[token("-=", aug_sub)]
    #[token("*=", aug_mul)]
    #[token("/=", aug_div)]
    #[token("//=", aug_floordiv)]
    #[token("%=", aug_mod)]
    #[token("**=", aug_pow)]
    #[token("<<=", aug_shl)]
    #[token(">>=", aug_shr)]
    #[token("&=", aug_and)]
    #[token("|=", aug_or)]
    #[token("^=", aug_xor)]
    #[token("@=", aug_matmul)]
    AugAssign(&'static str),

    #[regex(r"\r?\n")]
    Newline,

    // --- Layout (synthesized by the indentation pass) ---
    Indent,
    Dedent,
    EndOfInput,
}

impl Token {
    /// Short description used in syntax error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Name(name) => format!("name '{name}'"),
            Self::Int(v) => format!("number {v}"),
            Self::Float(v) => format!("number {v}"),
            Self::Str(_) => "string literal".to_string(),
            Self::Newline => "end of line".to_string(),
            Self::Indent => "indent".to_string(),
            Self::Dedent => "dedent".to_string(),
            Self::EndOfInput => "end of input".to_string(),
            Self::Reserved(word) => format!("'{word}'"),
            Self::AugAssign(op) => format!("'{op}'"),
            other => format!("{other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner callbacks
// ---------------------------------------------------------------------------

// Inline closures cannot return `&'static str` under the logos derive, so
// the fixed-spelling variants use named callbacks.
fn reserved_class(_: &mut Lexer<Token>) -> &'static str {
    "class"
}

fn reserved_with(_: &mut Lexer<Token>) -> &'static str {
    "with"
}

fn reserved_async(_: &mut Lexer<Token>) -> &'static str {
    "async"
}

fn reserved_await(_: &mut Lexer<Token>) -> &'static str {
    "await"
}

fn reserved_yield(_: &mut Lexer<Token>) -> &'static str {
    "yield"
}

fn reserved_nonlocal(_: &mut Lexer<Token>) -> &'static str {
    "nonlocal"
}

fn reserved_walrus(_: &mut Lexer<Token>) -> &'static str {
    ":="
}

fn reserved_ellipsis(_: &mut Lexer<Token>) -> &'static str {
    "..."
}

fn aug_add(_: &mut Lexer<Token>) -> &'static str {
    "+="
}

fn aug_sub(_: &mut Lexer<Token>) -> &'static str {
    "-="
}

fn aug_mul(_: &mut Lexer<Token>) -> &'static str {
    "*="
}

fn aug_div(_: &mut Lexer<Token>) -> &'static str {
    "/="
}

fn aug_floordiv(_: &mut Lexer<Token>) -> &'static str {
    "//="
}

fn aug_mod(_: &mut Lexer<Token>) -> &'static str {
    "%="
}

fn aug_pow(_: &mut Lexer<Token>) -> &'static str {
    "**="
}

fn aug_shl(_: &mut Lexer<Token>) -> &'static str {
    "<<="
}

fn aug_shr(_: &mut Lexer<Token>) -> &'static str {
    ">>="
}

fn aug_and(_: &mut Lexer<Token>) -> &'static str {
    "&="
}

fn aug_or(_: &mut Lexer<Token>) -> &'static str {
    "|="
}

fn aug_xor(_: &mut Lexer<Token>) -> &'static str {
    "^="
}

fn aug_matmul(_: &mut Lexer<Token>) -> &'static str {
    "@="
}

fn lex_decimal(lex: &mut Lexer<Token>) -> Result<i64, LexError> {
    let digits = lex.slice().replace('_', "");
    if digits.len() > 1 && digits.starts_with('0') && digits.bytes().any(|b| b != b'0') {
        return Err(LexError::InvalidNumber);
    }
    digits.parse::<i64>().map_err(|_| LexError::IntegerTooLarge)
}

fn lex_radix(lex: &mut Lexer<Token>, radix: u32) -> Result<i64, LexError> {
    let digits = lex.slice()[2..].replace('_', "");
    if digits.is_empty() {
        return Err(LexError::InvalidNumber);
    }
    i64::from_str_radix(&digits, radix).map_err(|_| LexError::IntegerTooLarge)
}

fn lex_float(lex: &mut Lexer<Token>) -> Result<f64, LexError> {
    lex.slice()
        .replace('_', "")
        .parse::<f64>()
        .map_err(|_| LexError::InvalidNumber)
}

fn lex_string(lex: &mut Lexer<Token>) -> Result<StrLit, LexError> {
    let slice = lex.slice();
    let quote = slice.as_bytes()[slice.len() - 1];
    let prefix = slice[..slice.len() - 1].to_ascii_lowercase();
    if prefix.contains('b') {
        return Err(LexError::BytesLiteral);
    }
    let rest = lex.remainder();
    let triple = rest.as_bytes().starts_with(&[quote, quote]);
    let (body, consumed) = if triple {
        let (body, used) = scan_triple(&rest[2..], quote)?;
        (body, used + 2)
    } else {
        scan_single(rest, quote)?
    };
    let lit = StrLit {
        body: body.to_string(),
        raw: prefix.contains('r'),
        format: prefix.contains('f'),
    };
    lex.bump(consumed);
    Ok(lit)
}

/// Scan a single-quoted body. Returns the body and the bytes consumed
/// including the closing quote.
fn scan_single(rest: &str, quote: u8) -> Result<(&str, usize), LexError> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return Err(LexError::UnterminatedString),
            b if b == quote => return Ok((&rest[..i], i + 1)),
            _ => i += 1,
        }
    }
    Err(LexError::UnterminatedString)
}

fn scan_triple(rest: &str, quote: u8) -> Result<(&str, usize), LexError> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(&[quote, quote, quote]) {
            return Ok((&rest[..i], i + 3));
        }
        i += 1;
    }
    Err(LexError::UnterminatedString)
}

/// Decode backslash escapes in a non-raw string body.
///
/// Unknown escapes are kept verbatim, backslash included.
pub fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            out.push('\\');
            break;
        };
        match esc {
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'x' | 'u' | 'U' => {
                let width = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = (0..width).filter_map(|_| chars.next()).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .filter(|_| hex.len() == width)
                    .ok_or_else(|| format!("truncated \\{esc} escape"))?;
                let ch = char::from_u32(code)
                    .ok_or_else(|| format!("invalid character code {code:#x}"))?;
                out.push(ch);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Logical lines
// ---------------------------------------------------------------------------

/// A token together with the 1-based source line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

/// A syntax error at a source line.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub line: usize,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Line {}: SyntaxError: {}", self.line, self.message)
    }
}

/// Maps byte offsets to line numbers.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { starts }
    }

    fn line(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    fn line_start(&self, line: usize) -> usize {
        self.starts[line - 1]
    }
}

fn indent_width(prefix: &str) -> usize {
    prefix.chars().fold(0, |col, c| match c {
        '\t' => (col / 8 + 1) * 8,
        _ => col + 1,
    })
}

/// Tokenize `source` into logical lines with layout tokens.
///
/// The returned stream always ends with `EndOfInput`.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let index = LineIndex::new(source);
    let mut out: Vec<Spanned> = Vec::new();
    let mut indents: Vec<usize> = vec![0];
    let mut depth: usize = 0;
    let mut at_line_start = true;
    let mut last_line = 1;

    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let line = index.line(span.start);
        last_line = line;
        let token = result.map_err(|e| SyntaxError::new(line, e.message()))?;

        if token == Token::Newline {
            if depth == 0 && !at_line_start {
                out.push(Spanned { token, line });
                at_line_start = true;
            }
            continue;
        }

        if at_line_start {
            let prefix = &source[index.line_start(line)..span.start];
            let width = indent_width(prefix);
            let current = indents.last().copied().unwrap_or(0);
            if width > current {
                indents.push(width);
                out.push(Spanned {
                    token: Token::Indent,
                    line,
                });
            } else if width < current {
                while indents.last().is_some_and(|&w| w > width) {
                    indents.pop();
                    out.push(Spanned {
                        token: Token::Dedent,
                        line,
                    });
                }
                if indents.last().copied() != Some(width) {
                    return Err(SyntaxError::new(
                        line,
                        "unindent does not match any outer indentation level",
                    ));
                }
            }
            at_line_start = false;
        }

        match token {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => depth = depth.saturating_sub(1),
            _ => {}
        }
        out.push(Spanned { token, line });
    }

    if depth > 0 {
        return Err(SyntaxError::new(last_line, "unexpected EOF while parsing"));
    }
    if !at_line_start {
        out.push(Spanned {
            token: Token::Newline,
            line: last_line,
        });
    }
    while indents.len() > 1 {
        indents.pop();
        out.push(Spanned {
            token: Token::Dedent,
            line: last_line,
        });
    }
    out.push(Spanned {
        token: Token::EndOfInput,
        line: last_line,
    });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    fn name(s: &str) -> Token {
        Token::Name(s.to_string())
    }

    #[test]
    fn keywords_and_names() {
        assert_eq!(
            kinds("if x and not y_1"),
            vec![
                Token::If,
                name("x"),
                Token::And,
                Token::Not,
                name("y_1"),
                Token::Newline,
                Token::EndOfInput
            ]
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("1_000 0x1f 0b101 2.5 .5 1e3")[..6],
            [
                Token::Int(1000),
                Token::Int(31),
                Token::Int(5),
                Token::Float(2.5),
                Token::Float(0.5),
                Token::Float(1000.0)
            ]
        );
    }

    #[test]
    fn integer_overflow_is_reported() {
        let err = tokenize("x = 99999999999999999999").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("too large"));
    }

    #[test]
    fn strings_with_prefixes() {
        let toks = kinds(r#"'a' "b\n" r'\d' f"{x}" '''multi
line'''"#);
        let lits: Vec<StrLit> = toks
            .into_iter()
            .filter_map(|t| match t {
                Token::Str(lit) => Some(lit),
                _ => None,
            })
            .collect();
        assert_eq!(lits.len(), 5);
        assert_eq!(lits[1].body, "b\\n");
        assert!(lits[2].raw);
        assert!(lits[3].format);
        assert_eq!(lits[4].body, "multi\nline");
    }

    #[test]
    fn bytes_literals_are_rejected() {
        assert!(tokenize("b'abc'").is_err());
    }

    #[test]
    fn unescape_handles_common_sequences() {
        assert_eq!(unescape(r"a\tb\x41\u00e9\q").unwrap(), "a\tbAé\\q");
    }

    #[test]
    fn indentation_produces_layout_tokens() {
        let toks = kinds("if x:\n    y = 1\n\n    # note\nz = 2\n");
        assert_eq!(
            toks,
            vec![
                Token::If,
                name("x"),
                Token::Colon,
                Token::Newline,
                Token::Indent,
                name("y"),
                Token::Assign,
                Token::Int(1),
                Token::Newline,
                Token::Dedent,
                name("z"),
                Token::Assign,
                Token::Int(2),
                Token::Newline,
                Token::EndOfInput
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        let toks = kinds("x = [\n  1,\n  2,\n]\n");
        assert_eq!(toks.iter().filter(|t| **t == Token::Newline).count(), 1);
        assert!(!toks.contains(&Token::Indent));
    }

    #[test]
    fn bad_dedent_is_an_error() {
        let err = tokenize("if x:\n    y\n  z\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn augmented_operators_carry_spelling() {
        assert_eq!(kinds("a //= 2")[1], Token::AugAssign("//="));
        assert_eq!(kinds("a @= b")[1], Token::AugAssign("@="));
    }

    #[test]
    fn reserved_words() {
        assert_eq!(kinds("class")[0], Token::Reserved("class"));
        assert_eq!(kinds("yield x")[0], Token::Reserved("yield"));
    }

    #[test]
    fn line_numbers_are_tracked() {
        let toks = tokenize("a\nb\n\nc").unwrap();
        let c = toks.iter().find(|s| s.token == name("c")).unwrap();
        assert_eq!(c.line, 4);
    }
}
