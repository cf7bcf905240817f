//! Lexer and parser for the declarative subset of the modeling language.

pub mod ast;
mod lexer;
mod parser;
pub mod token;

pub use lexer::tokenize;
pub use parser::{parse_expression, parse_module};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    Syntax,
    Indentation,
    /// Parser recursion went past the configured nesting budget.
    NestingLimit(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (<string>, line {line})")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    pub line: usize,
}

impl SyntaxError {
    pub fn invalid(message: impl Into<String>, line: usize) -> Self {
        Self {
            kind: SyntaxErrorKind::Syntax,
            message: message.into(),
            line,
        }
    }

    pub fn indentation(message: impl Into<String>, line: usize) -> Self {
        Self {
            kind: SyntaxErrorKind::Indentation,
            message: message.into(),
            line,
        }
    }

    pub fn unsupported(what: impl AsRef<str>, line: usize) -> Self {
        Self::invalid(format!("unsupported syntax: {}", what.as_ref()), line)
    }

    pub fn class_name(&self) -> &'static str {
        match self.kind {
            SyntaxErrorKind::Indentation => "IndentationError",
            SyntaxErrorKind::Syntax | SyntaxErrorKind::NestingLimit(_) => "SyntaxError",
        }
    }
}
