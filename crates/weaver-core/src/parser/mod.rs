// Parser module - tokenizer plus recursive-descent grammar for Weave sources
use std::path::Path;

use anyhow::Result;

use crate::ast::SyntaxTree;

pub mod grammar;
pub mod lexer;

#[cfg(test)]
mod tests;

pub use grammar::WeaveParser;

/// Syntax error with the 1-based position it was detected at
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Trait for all Weave parsers
pub trait Parser: Send + Sync {
    /// Parse one compilation unit
    fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError>;

    /// Parse a file
    fn parse_file(&self, path: &Path) -> Result<SyntaxTree> {
        let source = std::fs::read_to_string(path)?;
        Ok(self.parse(&source)?)
    }

    /// Get parser name for debugging
    fn name(&self) -> &'static str;
}

/// Create a parser based on type
pub fn create_parser(parser_type: &str) -> Result<Box<dyn Parser>> {
    match parser_type {
        "weave" | "wv" => Ok(Box::new(WeaveParser::new())),
        _ => anyhow::bail!("Unknown parser type: {}", parser_type),
    }
}
