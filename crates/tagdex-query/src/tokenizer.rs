//! Query tokenizer.
//!
//! Splits a query string into whitespace-delimited tokens. A `-` that starts a token is
//! emitted on its own so the parser sees negation as a separate marker.

/// Negation marker.
pub const NEGATE: &str = "-";

/// Lazy, restartable token stream over a query string.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    /// The full query text.
    input: &'a str,
    /// Byte offset of the next unread character.
    position: usize,
}

impl<'a> Tokenizer<'a> {
    /// Creates a tokenizer positioned at the first token.
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&self) -> Option<&'a str> {
        self.next_span().map(|(token, _)| token)
    }

    /// Consumes and returns the next token.
    pub fn consume(&mut self) -> Option<&'a str> {
        let (token, end) = self.next_span()?;
        self.position = end;
        Some(token)
    }

    /// Rewinds to the first token.
    pub fn restart(&mut self) {
        self.position = 0;
    }

    /// Finds the next token and the offset just past it.
    fn next_span(&self) -> Option<(&'a str, usize)> {
        let rest = &self.input[self.position..];
        let skipped = rest.len() - rest.trim_start().len();
        let start = self.position + skipped;
        let remaining = &self.input[start..];
        if remaining.is_empty() {
            return None;
        }
        if remaining.starts_with(NEGATE) {
            let end = start + NEGATE.len();
            return Some((&self.input[start..end], end));
        }
        let len = remaining
            .find(char::is_whitespace)
            .unwrap_or(remaining.len());
        Some((&remaining[..len], start + len))
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.consume()
    }
}
