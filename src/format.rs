use std::str::FromStr;

use crate::error::{Error, Result};

/// Whitespace-delimited token scanner over a serialized network. Keeps
/// track of the current line so tag mismatches can point at the exact
/// spot in the file.
pub struct TokenReader<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> TokenReader<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0, line: 1 }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            if bytes[self.pos] == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
    }

    /// Next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        if self.pos >= self.src.len() {
            return None;
        }
        let start = self.pos;
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && !bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
        Some(&self.src[start..self.pos])
    }

    /// Consumes one token and fails unless it is literally `expected`.
    pub fn expect_tag(&mut self, expected: &str) -> Result<()> {
        match self.next_token() {
            Some(tag) if tag == expected => Ok(()),
            Some(tag) => Err(Error::UnexpectedTag {
                expected: expected.to_string(),
                found: tag.to_string(),
                line: self.line,
            }),
            None => Err(Error::UnexpectedEof { line: self.line }),
        }
    }

    /// Consumes one token and parses it as `T`.
    pub fn parse<T: FromStr>(&mut self) -> Result<T> {
        match self.next_token() {
            Some(token) => token.parse().map_err(|_| Error::Malformed {
                token: token.to_string(),
                line: self.line,
            }),
            None => Err(Error::UnexpectedEof { line: self.line }),
        }
    }

    /// Consumes `count` tokens as a numeric vector.
    pub fn parse_vec<T: FromStr>(&mut self, count: usize) -> Result<Vec<T>> {
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.parse()?);
        }
        Ok(values)
    }
}
