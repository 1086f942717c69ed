use thiserror_no_std::Error;

pub const MAX_TOKEN_LEN: usize = 32;
pub const COMMENT: char = ';';

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("no token left in the source")]
    NoTokenLeft,
    #[error("token is longer than the token limit")]
    TokenTooLong,
}

/// Splits assembly source into whitespace separated words.
///
/// Anything from `;` to the end of a line is skipped. The walker keeps a
/// 1-based line number of the word it last returned so errors can point
/// at it.
#[derive(Clone, Debug)]
pub struct Words<'a> {
    source: &'a str,
    position: usize,
    line: u32,
}

impl<'a> Words<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            position: 0,
            line: 1,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// Back to the first word, used between assembler passes.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.line = 1;
    }

    fn rest(&self) -> &'a str {
        self.source.get(self.position..).unwrap_or("")
    }

    fn advance(&mut self, bytes: usize) {
        self.position = self.position.saturating_add(bytes).min(self.source.len());
    }

    /// Skips whitespace and comments, counting the lines passed over.
    fn skip_blank(&mut self) {
        loop {
            let mut chars = self.rest().chars();
            match chars.next() {
                Some('\n') => {
                    self.line = self.line.saturating_add(1);
                    self.advance(1);
                }
                Some(COMMENT) => {
                    let to_eol = self.rest().find('\n').unwrap_or(self.rest().len());
                    self.advance(to_eol);
                }
                Some(c) if c.is_whitespace() => self.advance(c.len_utf8()),
                _ => return,
            }
        }
    }

    /// Skips spaces and tabs without leaving the current line.
    fn skip_inline(&mut self) {
        let rest = self.rest();
        let blank = rest
            .find(|c: char| c == '\n' || !c.is_whitespace())
            .unwrap_or(rest.len());
        self.advance(blank);
    }

    /// The next word in the source.
    ///
    /// Blanks that follow the word on the same line are consumed, the
    /// line break is not, so [`Words::peek_inline`] can tell whether more
    /// of the current line remains.
    pub fn next_word(&mut self) -> Result<&'a str, TokenError> {
        self.skip_blank();
        let rest = self.rest();
        if rest.is_empty() {
            return Err(TokenError::NoTokenLeft);
        }
        let end = rest
            .find(|c: char| c.is_whitespace() || c == COMMENT)
            .unwrap_or(rest.len());
        let word = rest.get(..end).unwrap_or("");
        self.advance(end);
        self.skip_inline();
        if word.chars().count() > MAX_TOKEN_LEN {
            return Err(TokenError::TokenTooLong);
        }
        Ok(word)
    }

    /// The next character on the current line that is not a space or tab.
    /// A comment counts as the end of the line.
    pub fn peek_inline(&self) -> Option<char> {
        let rest = self.rest();
        let inline = rest.trim_start_matches(|c: char| c.is_whitespace() && c != '\n');
        match inline.chars().next() {
            Some(COMMENT) => Some('\n'),
            other => other,
        }
    }

    /// The rest of the source is blank.
    pub fn is_exhausted(&self) -> bool {
        let mut ahead = self.clone();
        ahead.skip_blank();
        ahead.rest().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_any_whitespace() {
        let mut words = Words::new("PUSH  5\n\tADD\r\nOUT");
        assert_eq!(words.next_word(), Ok("PUSH"));
        assert_eq!(words.line(), 1);
        assert_eq!(words.next_word(), Ok("5"));
        assert_eq!(words.next_word(), Ok("ADD"));
        assert_eq!(words.line(), 2);
        assert_eq!(words.next_word(), Ok("OUT"));
        assert_eq!(words.line(), 3);
        assert_eq!(words.next_word(), Err(TokenError::NoTokenLeft));
    }

    #[test]
    fn comments_run_to_end_of_line() {
        let mut words = Words::new("; header\nPUSH 1 ; trailing\n;;\nOUT;tight");
        assert_eq!(words.next_word(), Ok("PUSH"));
        assert_eq!(words.line(), 2);
        assert_eq!(words.next_word(), Ok("1"));
        assert_eq!(words.peek_inline(), Some('\n'));
        assert_eq!(words.next_word(), Ok("OUT"));
        assert_eq!(words.line(), 4);
        assert!(words.is_exhausted());
    }

    #[test]
    fn token_limit_is_inclusive() {
        let exact = "a".repeat(MAX_TOKEN_LEN);
        let long = "b".repeat(MAX_TOKEN_LEN + 1);
        let source = format!("{exact} {long}");
        let mut words = Words::new(&source);
        assert_eq!(words.next_word(), Ok(exact.as_str()));
        assert_eq!(words.next_word(), Err(TokenError::TokenTooLong));
    }

    #[test]
    fn peek_stays_on_the_line() {
        let mut words = Words::new("PUSH [RAX\n + 1]");
        assert_eq!(words.next_word(), Ok("PUSH"));
        assert_eq!(words.peek_inline(), Some('['));
        assert_eq!(words.next_word(), Ok("[RAX"));
        assert_eq!(words.peek_inline(), Some('\n'));
    }

    #[test]
    fn rewind_restarts_line_count() {
        let mut words = Words::new("A\nB");
        words.next_word().unwrap();
        words.next_word().unwrap();
        assert_eq!(words.line(), 2);
        words.rewind();
        assert_eq!(words.next_word(), Ok("A"));
        assert_eq!(words.line(), 1);
    }

    #[test]
    fn empty_source_has_no_tokens() {
        let mut words = Words::new("  \n ; only a comment\n");
        assert!(words.is_exhausted());
        assert_eq!(words.next_word(), Err(TokenError::NoTokenLeft));
    }
}
