//! Token stream wrapper for the hand-written parser.

use crate::lexer::{Spanned, SyntaxError, Token};

/// Token stream with lookahead and line tracking.
///
/// The underlying vector always ends with [`Token::EndOfInput`], so peeking
/// past the end keeps returning that token.
pub struct TokenStream {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn get(&self, index: usize) -> &Spanned {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[index.min(last)]
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> &Token {
        &self.get(self.pos).token
    }

    /// Peek at the nth token ahead without consuming.
    pub fn peek_nth(&self, n: usize) -> &Token {
        &self.get(self.pos + n).token
    }

    /// Line of the current token.
    pub fn line(&self) -> usize {
        self.get(self.pos).line
    }

    /// Consume the current token and return it.
    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Check if the current token has the same kind as `expected`.
    pub fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(expected)
    }

    /// Consume the current token if it matches.
    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a specific token and advance if it matches.
    pub fn expect(&mut self, expected: Token, what: &str) -> Result<(), SyntaxError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {what}, found {}",
                self.peek().describe()
            )))
        }
    }

    /// Consume a name token.
    pub fn expect_name(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            Token::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected a name, found {}", other.describe()))),
        }
    }

    pub fn at_end(&self) -> bool {
        matches!(self.peek(), Token::EndOfInput)
    }

    /// Build an error at the current line.
    pub fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line(), message)
    }

    /// The generic "invalid syntax" error for the current token.
    pub fn unexpected(&self) -> SyntaxError {
        match self.peek() {
            Token::Reserved(word) => self.error(format!("'{word}' is not supported")),
            Token::Indent => self.error("unexpected indent"),
            other => self.error(format!("invalid syntax near {}", other.describe())),
        }
    }
}
