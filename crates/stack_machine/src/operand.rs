//! The `PUSH`/`POP` operand and its mode word.
//!
//! On the wire a transfer operand is a mode word followed by the register
//! code (if any) and then the constant (if any):
//! `[mode][register?][constant?]`

use core::fmt;

use crate::bytecode::{Bytecode, BytecodeError};
use crate::registers::{Register, RegisterFile};
use crate::{MachineError, Word};

const CONSTANT_BIT: Word = 1;
const REGISTER_BIT: Word = 1 << 1;
const MEMORY_BIT: Word = 1 << 2;
const MODE_BITS: Word = CONSTANT_BIT | REGISTER_BIT | MEMORY_BIT;

/// Which parts an operand is made of.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mode {
    pub constant: bool,
    pub register: bool,
    pub memory: bool,
}

impl Mode {
    pub fn to_word(self) -> Word {
        let mut word = 0;
        if self.constant {
            word |= CONSTANT_BIT;
        }
        if self.register {
            word |= REGISTER_BIT;
        }
        if self.memory {
            word |= MEMORY_BIT;
        }
        word
    }

    /// A mode must name at least a constant or a register.
    pub fn from_word(word: Word) -> Result<Self, MachineError> {
        if word & !MODE_BITS != 0 {
            return Err(MachineError::InvalidMode(word));
        }
        let mode = Self {
            constant: word & CONSTANT_BIT != 0,
            register: word & REGISTER_BIT != 0,
            memory: word & MEMORY_BIT != 0,
        };
        if !mode.constant && !mode.register {
            return Err(MachineError::InvalidMode(word));
        }
        Ok(mode)
    }
}

/// A value computed at run time from a register, a constant or both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrExpr {
    Constant(Word),
    Register(Register),
    Sum(Register, Word),
}

impl AddrExpr {
    pub fn register(&self) -> Option<Register> {
        match self {
            AddrExpr::Constant(_) => None,
            AddrExpr::Register(register) | AddrExpr::Sum(register, _) => Some(*register),
        }
    }

    pub fn constant(&self) -> Option<Word> {
        match self {
            AddrExpr::Register(_) => None,
            AddrExpr::Constant(value) | AddrExpr::Sum(_, value) => Some(*value),
        }
    }

    pub fn evaluate(&self, registers: &RegisterFile) -> Word {
        let base = self.register().map_or(0, |register| registers.get(register));
        base.wrapping_add(self.constant().unwrap_or(0))
    }
}

impl fmt::Display for AddrExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrExpr::Constant(value) => write!(f, "{value}"),
            AddrExpr::Register(register) => write!(f, "{register}"),
            AddrExpr::Sum(register, value) => write!(f, "{register} + {value}"),
        }
    }
}

/// Either the computed value itself or the memory cell it addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Direct(AddrExpr),
    Memory(AddrExpr),
}

impl Operand {
    pub fn expr(&self) -> &AddrExpr {
        match self {
            Operand::Direct(expr) | Operand::Memory(expr) => expr,
        }
    }

    pub fn mode(&self) -> Mode {
        let expr = self.expr();
        Mode {
            constant: expr.constant().is_some(),
            register: expr.register().is_some(),
            memory: matches!(self, Operand::Memory(_)),
        }
    }

    /// A constant only names a destination when it is used as an address.
    pub fn is_pop_target(&self) -> bool {
        match self {
            Operand::Memory(_) => true,
            Operand::Direct(expr) => expr.constant().is_none(),
        }
    }

    /// Number of words the operand takes in the bytecode, mode word
    /// included.
    pub fn width(&self) -> usize {
        let expr = self.expr();
        1usize
            .saturating_add(usize::from(expr.register().is_some()))
            .saturating_add(usize::from(expr.constant().is_some()))
    }

    pub fn encode(&self, code: &mut Bytecode) -> Result<(), BytecodeError> {
        code.append(self.mode().to_word())?;
        let expr = self.expr();
        if let Some(register) = expr.register() {
            code.append(register.code())?;
        }
        if let Some(constant) = expr.constant() {
            code.append(constant)?;
        }
        Ok(())
    }

    pub fn decode(code: &mut Bytecode) -> Result<Self, MachineError> {
        let mode_word = code.fetch()?;
        let mode = Mode::from_word(mode_word)?;
        let register = if mode.register {
            Some(Register::try_from(code.fetch()?)?)
        } else {
            None
        };
        let constant = if mode.constant {
            Some(code.fetch()?)
        } else {
            None
        };
        let expr = match (register, constant) {
            (Some(register), Some(constant)) => AddrExpr::Sum(register, constant),
            (Some(register), None) => AddrExpr::Register(register),
            (None, Some(constant)) => AddrExpr::Constant(constant),
            (None, None) => return Err(MachineError::InvalidMode(mode_word)),
        };
        if mode.memory {
            Ok(Operand::Memory(expr))
        } else {
            Ok(Operand::Direct(expr))
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Direct(expr) => write!(f, "{expr}"),
            Operand::Memory(expr) => write!(f, "[{expr}]"),
        }
    }
}
