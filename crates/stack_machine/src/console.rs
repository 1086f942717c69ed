use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

use thiserror_no_std::Error;

use crate::Word;
use crate::memory::Frame;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("input ended while IN was waiting for a value")]
    InputExhausted,
    #[error("`{0}` is not a non-negative integer")]
    MalformedInput(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Where `IN`, `OUT` and `DRAW` go.
pub trait Console {
    fn read_value(&mut self) -> Result<Word, ConsoleError>;
    fn write_value(&mut self, value: Word) -> Result<(), ConsoleError>;
    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), ConsoleError>;
}

/// A console over any line reader and writer, stdin and stdout in the
/// binary and in-memory buffers in tests.
pub struct StreamConsole<R, W> {
    input: R,
    output: W,
    pending: VecDeque<String>,
    colored: bool,
}

impl<R: BufRead, W: Write> StreamConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            pending: VecDeque::new(),
            colored: false,
        }
    }

    pub fn with_color(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Next whitespace separated token, reading more lines as needed.
    fn next_token(&mut self) -> Result<String, ConsoleError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(ConsoleError::InputExhausted);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_owned));
        }
    }
}

impl<R: BufRead, W: Write> Console for StreamConsole<R, W> {
    fn read_value(&mut self) -> Result<Word, ConsoleError> {
        let token = self.next_token()?;
        token
            .parse::<u64>()
            .ok()
            .and_then(|value| Word::try_from(value).ok())
            .ok_or(ConsoleError::MalformedInput(token))
    }

    fn write_value(&mut self, value: Word) -> Result<(), ConsoleError> {
        writeln!(self.output, "{value}")?;
        self.output.flush()?;
        Ok(())
    }

    fn draw(&mut self, frame: &Frame<'_>) -> Result<(), ConsoleError> {
        frame.render(&mut self.output, self.colored)?;
        self.output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Color, Memory, MemoryConfig};

    fn console(input: &str) -> StreamConsole<&[u8], Vec<u8>> {
        StreamConsole::new(input.as_bytes(), Vec::new())
    }

    #[test]
    fn reads_tokens_across_lines() {
        let mut console = console("4 5\n\n  6\n");
        assert_eq!(console.read_value().unwrap(), 4);
        assert_eq!(console.read_value().unwrap(), 5);
        assert_eq!(console.read_value().unwrap(), 6);
        assert!(matches!(
            console.read_value(),
            Err(ConsoleError::InputExhausted)
        ));
    }

    #[test]
    fn rejects_negative_and_garbage() {
        let mut console = console("-3 abc 9223372036854775808");
        assert!(matches!(
            console.read_value(),
            Err(ConsoleError::MalformedInput(token)) if token == "-3"
        ));
        assert!(matches!(
            console.read_value(),
            Err(ConsoleError::MalformedInput(token)) if token == "abc"
        ));
        assert!(matches!(
            console.read_value(),
            Err(ConsoleError::MalformedInput(_))
        ));
    }

    #[test]
    fn writes_one_value_per_line() {
        let mut console = console("");
        console.write_value(7).unwrap();
        console.write_value(-2).unwrap();
        assert_eq!(console.into_output(), b"7\n-2\n");
    }

    #[test]
    fn draw_honours_color_setting() {
        let mut memory = Memory::new(MemoryConfig {
            capacity: 2,
            rows: 1,
            columns: 1,
        })
        .unwrap();
        memory.set_pixel(0, 0, '*', Color::Yellow);

        let mut plain = console("");
        memory.draw(&mut plain).unwrap();
        assert_eq!(plain.into_output(), b"*\n");

        let mut colored = console("").with_color(true);
        memory.draw(&mut colored).unwrap();
        assert_eq!(colored.into_output(), b"\x1b[33m*\x1b[0m\n");
    }
}
