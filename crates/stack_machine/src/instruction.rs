use core::fmt;

use crate::bytecode::{Bytecode, BytecodeError};
use crate::operand::Operand;
use crate::{MachineError, Ops, Shape, Word};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Argument {
    None,
    Operand(Operand),
    Target(Word),
}

/// One decoded instruction, the opcode together with whatever follows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub op: Ops,
    pub argument: Argument,
}

impl Instruction {
    pub fn new(op: Ops, argument: Argument) -> Self {
        Self { op, argument }
    }

    pub fn width(&self) -> usize {
        match self.argument {
            Argument::None => 1,
            Argument::Operand(operand) => operand.width().saturating_add(1),
            Argument::Target(_) => 2,
        }
    }

    pub fn encode(&self, code: &mut Bytecode) -> Result<(), BytecodeError> {
        code.append(Word::from(self.op))?;
        match self.argument {
            Argument::None => Ok(()),
            Argument::Operand(operand) => operand.encode(code),
            Argument::Target(target) => code.append(target),
        }
    }

    /// Reads one instruction at the cursor and leaves the cursor after it.
    pub fn decode(code: &mut Bytecode) -> Result<Self, MachineError> {
        let op = Ops::try_from(code.fetch()?)?;
        let argument = match op.shape() {
            Shape::None => Argument::None,
            Shape::Transfer => Argument::Operand(Operand::decode(code)?),
            Shape::Target => Argument::Target(code.fetch()?),
        };
        Ok(Self { op, argument })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.mnemonic())?;
        match self.argument {
            Argument::None => Ok(()),
            Argument::Operand(operand) => write!(f, " {operand}"),
            Argument::Target(target) => write!(f, " {target}"),
        }
    }
}

/// Decodes a whole image, pairing each instruction with its offset.
///
/// The cursor of `code` is left wherever decoding stopped.
pub fn disassemble(
    code: &mut Bytecode,
) -> Result<std::vec::Vec<(usize, Instruction)>, MachineError> {
    code.reset();
    let mut listing = std::vec::Vec::new();
    while !code.is_finished() {
        let at = code.position();
        listing.push((at, Instruction::decode(code)?));
    }
    Ok(listing)
}
