//! Flat word addressed memory.
//!
//! The first `rows * columns * 2` cells are the framebuffer. Each pixel is
//! a pair of cells, the symbol followed by its color letter, laid out row
//! by row. Programs draw by writing those cells and executing `DRAW`.

use core::fmt;
use std::io::{self, Write};

use thiserror_no_std::Error;

use crate::Word;
use crate::console::{Console, ConsoleError};

pub const CELLS_PER_PIXEL: usize = 2;
const BLANK: Word = b' ' as Word;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {0} is outside of memory")]
    OutOfRange(Word),
    #[error("framebuffer of {rows}x{columns} does not fit in {capacity} cells")]
    FramebufferTooLarge {
        rows: usize,
        columns: usize,
        capacity: usize,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryConfig {
    pub capacity: usize,
    pub rows: usize,
    pub columns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            rows: 7,
            columns: 14,
        }
    }
}

impl MemoryConfig {
    pub fn framebuffer_cells(&self) -> Option<usize> {
        self.rows
            .checked_mul(self.columns)?
            .checked_mul(CELLS_PER_PIXEL)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    White,
    Yellow,
    Green,
    Red,
}

impl Color {
    pub fn from_word(word: Word) -> Option<Self> {
        match u8::try_from(word).ok()? {
            b'W' => Some(Color::White),
            b'Y' => Some(Color::Yellow),
            b'G' => Some(Color::Green),
            b'R' => Some(Color::Red),
            _ => None,
        }
    }

    pub fn letter(self) -> u8 {
        match self {
            Color::White => b'W',
            Color::Yellow => b'Y',
            Color::Green => b'G',
            Color::Red => b'R',
        }
    }

    pub fn ansi(self) -> &'static str {
        match self {
            Color::White => "\x1b[37m",
            Color::Yellow => "\x1b[33m",
            Color::Green => "\x1b[32m",
            Color::Red => "\x1b[31m",
        }
    }
}

const ANSI_RESET: &str = "\x1b[0m";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pixel {
    pub symbol: Word,
    /// `None` when the color cell holds an unknown letter.
    pub color: Option<Color>,
}

impl Pixel {
    /// The character shown for this pixel. Cells that are not a printable
    /// character show as `?`.
    pub fn glyph(&self) -> char {
        u32::try_from(self.symbol)
            .ok()
            .and_then(char::from_u32)
            .filter(|c| !c.is_control())
            .unwrap_or('?')
    }
}

pub struct Memory {
    cells: Vec<Word>,
    rows: usize,
    columns: usize,
}

impl Memory {
    pub fn new(config: MemoryConfig) -> Result<Self, MemoryError> {
        let too_large = MemoryError::FramebufferTooLarge {
            rows: config.rows,
            columns: config.columns,
            capacity: config.capacity,
        };
        let framebuffer = config.framebuffer_cells().ok_or(too_large)?;
        if framebuffer > config.capacity {
            return Err(too_large);
        }
        let mut memory = Self {
            cells: vec![0; config.capacity],
            rows: config.rows,
            columns: config.columns,
        };
        memory.reset_framebuffer();
        Ok(memory)
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    fn index(&self, address: Word) -> Result<usize, MemoryError> {
        usize::try_from(address)
            .ok()
            .filter(|index| *index < self.cells.len())
            .ok_or(MemoryError::OutOfRange(address))
    }

    pub fn read(&self, address: Word) -> Result<Word, MemoryError> {
        let index = self.index(address)?;
        self.cells
            .get(index)
            .copied()
            .ok_or(MemoryError::OutOfRange(address))
    }

    pub fn write(&mut self, address: Word, value: Word) -> Result<(), MemoryError> {
        let index = self.index(address)?;
        let cell = self
            .cells
            .get_mut(index)
            .ok_or(MemoryError::OutOfRange(address))?;
        *cell = value;
        Ok(())
    }

    /// Fills every pixel with a white blank.
    pub fn reset_framebuffer(&mut self) {
        let white = Word::from(Color::White.letter());
        let cells = self
            .rows
            .saturating_mul(self.columns)
            .saturating_mul(CELLS_PER_PIXEL);
        let Some(framebuffer) = self.cells.get_mut(..cells) else {
            return;
        };
        for pair in framebuffer.chunks_exact_mut(CELLS_PER_PIXEL) {
            if let [symbol, color] = pair {
                *symbol = BLANK;
                *color = white;
            }
        }
    }

    fn pixel_address(&self, row: usize, column: usize) -> Option<usize> {
        if row >= self.rows || column >= self.columns {
            return None;
        }
        row.checked_mul(self.columns)?
            .checked_add(column)?
            .checked_mul(CELLS_PER_PIXEL)
    }

    pub fn pixel(&self, row: usize, column: usize) -> Option<Pixel> {
        let address = self.pixel_address(row, column)?;
        let symbol = *self.cells.get(address)?;
        let color = *self.cells.get(address.checked_add(1)?)?;
        Some(Pixel {
            symbol,
            color: Color::from_word(color),
        })
    }

    pub fn set_pixel(&mut self, row: usize, column: usize, symbol: char, color: Color) -> bool {
        let Some(address) = self.pixel_address(row, column) else {
            return false;
        };
        let Some(next) = address.checked_add(1) else {
            return false;
        };
        let symbol = Word::from(u32::from(symbol));
        match self.cells.get_mut(address..=next) {
            Some([symbol_cell, color_cell]) => {
                *symbol_cell = symbol;
                *color_cell = Word::from(color.letter());
                true
            }
            _ => false,
        }
    }

    pub fn frame(&self) -> Frame<'_> {
        Frame { memory: self }
    }

    /// Hands the current framebuffer to the console.
    pub fn draw<C: Console>(&self, console: &mut C) -> Result<(), ConsoleError> {
        console.draw(&self.frame())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }
}

/// A read only view of the framebuffer.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    memory: &'a Memory,
}

impl Frame<'_> {
    pub fn rows(&self) -> usize {
        self.memory.rows
    }

    pub fn columns(&self) -> usize {
        self.memory.columns
    }

    pub fn pixel(&self, row: usize, column: usize) -> Option<Pixel> {
        self.memory.pixel(row, column)
    }

    /// Writes the frame one row per line, wrapping each pixel in its ANSI
    /// color when `colored` is set.
    pub fn render<W: Write>(&self, out: &mut W, colored: bool) -> io::Result<()> {
        for row in 0..self.rows() {
            for column in 0..self.columns() {
                let Some(pixel) = self.pixel(row, column) else {
                    continue;
                };
                match pixel.color.filter(|_| colored) {
                    Some(color) => write!(out, "{}{}{ANSI_RESET}", color.ansi(), pixel.glyph())?,
                    None => write!(out, "{}", pixel.glyph())?,
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

impl fmt::Display for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows() {
            for column in 0..self.columns() {
                if let Some(pixel) = self.pixel(row, column) {
                    write!(f, "{}", pixel.glyph())?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
