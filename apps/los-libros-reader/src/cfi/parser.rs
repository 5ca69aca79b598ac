//! CFI Parser
//!
//! Grammar accepted here:
//! ```text
//! cfi       = "epubcfi(" path ["," path "," path] ")"
//! path      = step* [":" number [assertion]]
//! step      = "/" number [assertion] | "!" [assertion]
//! assertion = "[" text "]"      ; "^" escapes the next character
//! ```

use super::types::*;
use thiserror::Error;

/// CFI parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CfiParseError {
    #[error("Empty CFI string")]
    Empty,

    #[error("CFI must start with 'epubcfi('")]
    MissingPrefix,

    #[error("CFI must end with ')'")]
    MissingClosingParen,

    #[error("Expected number at position {0}")]
    ExpectedNumber(usize),

    #[error("Unclosed bracket at position {0}")]
    UnclosedBracket(usize),

    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("Range must have a start and an end path")]
    InvalidRange,
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_if(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self) -> CfiParseError {
        match self.peek() {
            Some(ch) => CfiParseError::UnexpectedChar(ch, self.pos),
            None => CfiParseError::MissingClosingParen,
        }
    }

    fn parse_number(&mut self) -> Result<u32, CfiParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(ch) if ch.is_ascii_digit()) {
            self.advance();
        }
        self.input[start..self.pos]
            .parse()
            .map_err(|_| CfiParseError::ExpectedNumber(start))
    }

    /// Bracketed assertion content, with escapes resolved when `unescape` is set
    fn parse_assertion(&mut self, unescape: bool) -> Result<Option<String>, CfiParseError> {
        let open = self.pos;
        if !self.skip_if('[') {
            return Ok(None);
        }

        let mut result = String::new();
        while let Some(ch) = self.advance() {
            match ch {
                '^' => {
                    let escaped = self.advance().ok_or(CfiParseError::UnclosedBracket(open))?;
                    if !unescape {
                        result.push('^');
                    }
                    result.push(escaped);
                }
                ']' => return Ok(Some(result)),
                '[' => return Err(CfiParseError::UnexpectedChar('[', self.pos - 1)),
                _ => result.push(ch),
            }
        }

        Err(CfiParseError::UnclosedBracket(open))
    }

    fn parse_step(&mut self) -> Result<Option<CfiStep>, CfiParseError> {
        let step_type = if self.skip_if('/') {
            StepType::Element(self.parse_number()?)
        } else if self.skip_if('!') {
            StepType::Indirection
        } else {
            return Ok(None);
        };

        Ok(Some(CfiStep {
            step_type,
            id_assertion: self.parse_assertion(true)?,
        }))
    }

    fn parse_path(&mut self) -> Result<CfiPath, CfiParseError> {
        let mut path = CfiPath::new();
        while let Some(step) = self.parse_step()? {
            path.push(step);
        }

        if self.skip_if(':') {
            let offset = self.parse_number()?;
            // Text assertions are kept escaped so they print back unchanged
            let assertion = self.parse_assertion(false)?;
            path.character_offset = Some(CharacterOffset { offset, assertion });
        }

        Ok(path)
    }

    fn parse_cfi(&mut self) -> Result<Cfi, CfiParseError> {
        if !self.input.starts_with("epubcfi(") {
            return Err(CfiParseError::MissingPrefix);
        }
        self.pos = "epubcfi(".len();

        let path = self.parse_path()?;

        let range = if self.skip_if(',') {
            let start = self.parse_path()?;
            if !self.skip_if(',') {
                return Err(CfiParseError::InvalidRange);
            }
            let end = self.parse_path()?;
            Some(CfiRange { start, end })
        } else {
            None
        };

        if !self.skip_if(')') {
            return Err(self.unexpected());
        }

        Ok(Cfi { path, range })
    }
}

/// Parse a CFI string into a Cfi struct
pub fn parse(input: &str) -> Result<Cfi, CfiParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CfiParseError::Empty);
    }

    let mut parser = Parser::new(input);
    let cfi = parser.parse_cfi()?;

    if parser.peek().is_some() {
        return Err(parser.unexpected());
    }

    Ok(cfi)
}

/// Parse a CFI string, discarding the error
pub fn try_parse(input: &str) -> Option<Cfi> {
    parse(input).ok()
}
