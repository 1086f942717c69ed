use std::io::{self, Write};

use heapless::Vec;
use thiserror_no_std::Error;

use crate::Word;

pub const BYTECODE_CAPACITY: usize = 1024;
pub const WORD_BYTES: usize = size_of::<Word>();

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BytecodeError {
    #[error("position is past the end of the bytecode")]
    Overflow,
    #[error("position is before the start of the bytecode")]
    Underflow,
    #[error("no instruction left to fetch")]
    EndOfProgram,
    #[error("image of {0} bytes is not a whole number of words")]
    TruncatedImage(usize),
    #[error("image declares {declared} words but holds {actual}")]
    CountMismatch { declared: usize, actual: usize },
    #[error("image of {0} words does not fit the bytecode buffer")]
    TooLarge(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seek {
    Absolute,
    Relative,
}

/// A bounded run of instruction words.
///
/// While assembling, words are appended to the end. While executing, a
/// cursor walks the same buffer and acts as the program counter. The
/// cursor never leaves `0..=len()`; sitting on `len()` is the end of the
/// program.
///
/// The persisted form is a little endian word count followed by that
/// many little endian words:
/// `[count][word 0][word 1]...`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bytecode {
    words: Vec<Word, BYTECODE_CAPACITY>,
    cursor: usize,
}

impl Bytecode {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            cursor: 0,
        }
    }

    pub fn from_words(words: &[Word]) -> Result<Self, BytecodeError> {
        let words = Vec::from_slice(words).map_err(|_| BytecodeError::TooLarge(words.len()))?;
        Ok(Self { words, cursor: 0 })
    }

    pub fn append(&mut self, word: Word) -> Result<(), BytecodeError> {
        self.words.push(word).map_err(|_| BytecodeError::Overflow)
    }

    /// Returns the word under the cursor and moves past it.
    pub fn fetch(&mut self) -> Result<Word, BytecodeError> {
        let word = *self
            .words
            .get(self.cursor)
            .ok_or(BytecodeError::EndOfProgram)?;
        self.cursor = self.cursor.saturating_add(1);
        Ok(word)
    }

    pub fn seek(&mut self, mode: Seek, target: Word) -> Result<(), BytecodeError> {
        let target = match mode {
            Seek::Absolute => target,
            Seek::Relative => {
                let here = Word::try_from(self.cursor).map_err(|_| BytecodeError::Overflow)?;
                here.checked_add(target).ok_or(if target < 0 {
                    BytecodeError::Underflow
                } else {
                    BytecodeError::Overflow
                })?
            }
        };
        if target < 0 {
            return Err(BytecodeError::Underflow);
        }
        let target = usize::try_from(target).map_err(|_| BytecodeError::Overflow)?;
        if target > self.words.len() {
            return Err(BytecodeError::Overflow);
        }
        self.cursor = target;
        Ok(())
    }

    /// Steps over one word without reading it.
    pub fn skip(&mut self) -> Result<(), BytecodeError> {
        if self.cursor >= self.words.len() {
            return Err(BytecodeError::EndOfProgram);
        }
        self.cursor = self.cursor.saturating_add(1);
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.words.len()
    }

    /// Moves the cursor back to the first word.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Drops every word, ready to be written again from the start.
    pub fn clear(&mut self) {
        self.words.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn words(&self) -> &[Word] {
        self.words.as_slice()
    }

    pub fn to_bytes(&self) -> std::vec::Vec<u8> {
        let mut bytes = std::vec::Vec::with_capacity(
            self.words.len().saturating_add(1).saturating_mul(WORD_BYTES),
        );
        // `len()` is bounded by BYTECODE_CAPACITY so the count always fits.
        let count = Word::try_from(self.words.len()).unwrap_or(Word::MAX);
        bytes.extend_from_slice(&count.to_le_bytes());
        for word in self.words.iter() {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BytecodeError> {
        if bytes.len() % WORD_BYTES != 0 || bytes.is_empty() {
            return Err(BytecodeError::TruncatedImage(bytes.len()));
        }
        let mut chunks = bytes.chunks_exact(WORD_BYTES).map(read_word);
        let declared = chunks
            .next()
            .ok_or(BytecodeError::TruncatedImage(bytes.len()))?;
        let actual = (bytes.len() / WORD_BYTES).saturating_sub(1);
        let declared = usize::try_from(declared).map_err(|_| BytecodeError::CountMismatch {
            declared: usize::MAX,
            actual,
        })?;
        if declared > BYTECODE_CAPACITY {
            return Err(BytecodeError::TooLarge(declared));
        }
        if declared != actual {
            return Err(BytecodeError::CountMismatch { declared, actual });
        }

        let mut code = Self::new();
        for word in chunks {
            code.append(word)?;
        }
        Ok(code)
    }
}

fn read_word(chunk: &[u8]) -> Word {
    let mut raw = [0u8; WORD_BYTES];
    raw.copy_from_slice(chunk);
    Word::from_le_bytes(raw)
}
