//! Two pass assembler.
//!
//! Each pass walks the whole source and emits into the bytecode buffer.
//! A jump to a label that has not been seen yet emits a placeholder and
//! leaves a pending entry in the label table; by the second pass every
//! definition is known, so rewinding and running the same pass again
//! produces the final image.
//!
//! One instruction per line. A line may start with any number of
//! `name:` label definitions and the operand of `PUSH`/`POP` takes the
//! rest of its line.

use heapless::Vec;
use thiserror_no_std::Error;
use tracing::debug;

use crate::bytecode::{Bytecode, BytecodeError};
use crate::instruction::{Argument, Instruction};
use crate::labels::{LabelError, LabelTable, UNRESOLVED};
use crate::operand::{AddrExpr, Operand};
use crate::registers::Register;
use crate::tokenizer::{TokenError, Words};
use crate::{Ops, Shape, Word};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("{0}")]
    Kind(AssemblerErrorKind),
    #[error("line {line}: {kind}")]
    WithLine { line: u32, kind: AssemblerErrorKind },
}

impl AssemblerError {
    fn with_line(self, line: u32) -> Self {
        match self {
            AssemblerError::WithLine { .. } => self,
            AssemblerError::Kind(kind) => AssemblerError::WithLine { line, kind },
        }
    }

    pub fn line_number(&self) -> Option<u32> {
        match self {
            Self::Kind(_) => None,
            Self::WithLine { line, .. } => Some(*line),
        }
    }

    pub fn error_kind(&self) -> &AssemblerErrorKind {
        match self {
            Self::Kind(kind) => kind,
            Self::WithLine { kind, .. } => kind,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblerErrorKind {
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("malformed operand `{0}`")]
    BadOperand(String),
    #[error("wrong number of operands for {0}")]
    ArgCountMismatch(String),
    #[error("label `{0}` is never defined")]
    UnresolvedLabel(String),
    #[error("too many labels")]
    LabelTableFull,
    #[error("token too long")]
    TokenTooLong,
    #[error("program does not fit in the bytecode buffer")]
    BytecodeOverflow,
    #[error("label `{0}` defined twice")]
    DuplicateLabel(String),
    #[error("`{0}` cannot be popped into")]
    InvalidPopTarget(String),
}

impl From<AssemblerErrorKind> for AssemblerError {
    fn from(kind: AssemblerErrorKind) -> Self {
        AssemblerError::Kind(kind)
    }
}

impl From<BytecodeError> for AssemblerError {
    fn from(_: BytecodeError) -> Self {
        AssemblerError::Kind(AssemblerErrorKind::BytecodeOverflow)
    }
}

impl From<LabelError> for AssemblerError {
    fn from(err: LabelError) -> Self {
        let kind = match err {
            LabelError::TableFull => AssemblerErrorKind::LabelTableFull,
            LabelError::NameTooLong => AssemblerErrorKind::TokenTooLong,
            LabelError::Duplicate(name) => AssemblerErrorKind::DuplicateLabel(name),
        };
        AssemblerError::Kind(kind)
    }
}

impl From<TokenError> for AssemblerError {
    fn from(_: TokenError) -> Self {
        AssemblerError::Kind(AssemblerErrorKind::TokenTooLong)
    }
}

pub struct Assembler<'a> {
    words: Words<'a>,
    labels: LabelTable,
    code: Bytecode,
    passes: u32,
}

impl<'a> Assembler<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            words: Words::new(source),
            labels: LabelTable::new(),
            code: Bytecode::new(),
            passes: 0,
        }
    }

    /// Runs one pass over the whole source, stopping at the first error.
    pub fn pass(&mut self) -> Result<(), AssemblerError> {
        loop {
            let token = match self.words.next_word() {
                Ok(token) => token,
                Err(TokenError::NoTokenLeft) => break,
                Err(err) => return Err(AssemblerError::from(err).with_line(self.words.line())),
            };
            let line = self.words.line();
            self.statement(token, line)
                .map_err(|err| err.with_line(line))?;
        }
        self.passes = self.passes.saturating_add(1);
        debug!(
            pass = self.passes,
            words = self.code.len(),
            labels = self.labels.len(),
            "assembler pass complete"
        );
        debug!("label table after pass {}:\n{}", self.passes, self.labels);
        Ok(())
    }

    /// Puts the source and write cursors back at the start. The label
    /// table is kept.
    pub fn rewind(&mut self) {
        self.words.rewind();
        self.code.clear();
    }

    /// Hands out the image once every referenced label has been defined.
    pub fn finish(self) -> Result<Bytecode, AssemblerError> {
        if let Some(label) = self.labels.unresolved().next() {
            let err = AssemblerError::Kind(AssemblerErrorKind::UnresolvedLabel(
                label.name.as_str().into(),
            ));
            return Err(match label.first_reference {
                Some(line) => err.with_line(line),
                None => err,
            });
        }
        let mut code = self.code;
        code.reset();
        Ok(code)
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn code(&self) -> &Bytecode {
        &self.code
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    fn statement(&mut self, token: &str, line: u32) -> Result<(), AssemblerError> {
        if LabelTable::is_label_syntax(token) {
            self.labels
                .define(LabelTable::label_name(token), self.code.len())?;
            return Ok(());
        }

        let op = Ops::from_mnemonic(token)
            .ok_or_else(|| AssemblerErrorKind::UnknownMnemonic(token.into()))?;
        let argument = match op.shape() {
            Shape::None => Argument::None,
            Shape::Transfer => {
                let text = self.rest_of_line()?;
                if text.is_empty() {
                    return Err(AssemblerErrorKind::ArgCountMismatch(op.mnemonic().into()).into());
                }
                let operand = parse_operand(&text)?;
                if op == Ops::Pop && !operand.is_pop_target() {
                    return Err(AssemblerErrorKind::InvalidPopTarget(text).into());
                }
                Argument::Operand(operand)
            }
            Shape::Target => Argument::Target(self.target(op, line)?),
        };

        if self.has_more_on_line() {
            return Err(AssemblerErrorKind::ArgCountMismatch(op.mnemonic().into()).into());
        }
        Instruction::new(op, argument).encode(&mut self.code)?;
        Ok(())
    }

    fn has_more_on_line(&self) -> bool {
        matches!(self.words.peek_inline(), Some(c) if c != '\n')
    }

    /// Joins the remaining words of the current line with single spaces.
    fn rest_of_line(&mut self) -> Result<String, AssemblerError> {
        let mut text = String::new();
        while self.has_more_on_line() {
            let word = self.words.next_word()?;
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(word);
        }
        Ok(text)
    }

    /// A jump operand: a numeric offset or a label name.
    fn target(&mut self, op: Ops, line: u32) -> Result<Word, AssemblerError> {
        let missing = || AssemblerErrorKind::ArgCountMismatch(op.mnemonic().into());
        if !self.has_more_on_line() {
            return Err(missing().into());
        }
        let token = self.words.next_word()?;
        if let Some(offset) = parse_word(token) {
            return Ok(offset);
        }
        if LabelTable::is_label_syntax(token) || Ops::from_mnemonic(token).is_some() {
            return Err(missing().into());
        }
        match self.labels.reference(token, line)? {
            Some(offset) => Word::try_from(offset)
                .map_err(|_| AssemblerError::from(AssemblerErrorKind::BytecodeOverflow)),
            None => Ok(UNRESOLVED),
        }
    }
}

/// Assembles a complete source file.
pub fn assemble(source: &str) -> Result<Bytecode, AssemblerError> {
    let mut assembler = Assembler::new(source);
    assembler.pass()?;
    assembler.rewind();
    assembler.pass()?;
    assembler.finish()
}

/// Parses `[`? term (`+` term)? `]`? where a term is a register name or a
/// literal.
fn parse_operand(text: &str) -> Result<Operand, AssemblerError> {
    let bad = || AssemblerError::from(AssemblerErrorKind::BadOperand(text.into()));
    let trimmed = text.trim();
    let (memory, inner) = match trimmed.strip_prefix('[') {
        Some(rest) => (true, rest.strip_suffix(']').ok_or_else(bad)?),
        None => (false, trimmed),
    };

    let mut register: Option<Register> = None;
    let mut constant: Option<Word> = None;
    for term in split_terms(inner).ok_or_else(bad)? {
        let term = term.trim();
        if let Some(found) = Register::from_name(term) {
            if register.replace(found).is_some() {
                return Err(bad());
            }
        } else {
            let value = parse_literal(term).ok_or_else(bad)?;
            if constant.replace(value).is_some() {
                return Err(bad());
            }
        }
    }

    let expr = match (register, constant) {
        (Some(register), Some(constant)) => AddrExpr::Sum(register, constant),
        (Some(register), None) => AddrExpr::Register(register),
        (None, Some(constant)) => AddrExpr::Constant(constant),
        (None, None) => return Err(bad()),
    };
    Ok(if memory {
        Operand::Memory(expr)
    } else {
        Operand::Direct(expr)
    })
}

/// Splits on `+` outside of character literals. At most two terms.
fn split_terms(text: &str) -> Option<Vec<&str, 2>> {
    let mut terms = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (at, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '+' if !quoted => {
                terms.push(text.get(start..at)?).ok()?;
                start = at.checked_add(1)?;
            }
            _ => {}
        }
    }
    terms.push(text.get(start..)?).ok()?;
    Some(terms)
}

/// A number or a `'c'` character literal.
fn parse_literal(term: &str) -> Option<Word> {
    if term.starts_with('\'') {
        let mut chars = term.chars();
        return match (chars.next(), chars.next(), chars.next(), chars.next()) {
            (Some('\''), Some(c), Some('\''), None) => Some(Word::from(u32::from(c))),
            _ => None,
        };
    }
    parse_word(term)
}

/// Decimal or `0x` hexadecimal, with an optional leading `-`.
fn parse_word(token: &str) -> Option<Word> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, token),
    };
    let (digits, radix) = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => (hex, 16),
        Some(_) => return None,
        None if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => (digits, 10),
        None => return None,
    };
    // The magnitude of `Word::MIN` does not fit in a `Word`.
    let magnitude = u64::from_str_radix(digits, radix).ok()?;
    if negative {
        Word::checked_sub_unsigned(0, magnitude)
    } else {
        Word::try_from(magnitude).ok()
    }
}
