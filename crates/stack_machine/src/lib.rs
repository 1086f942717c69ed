#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

use heapless::Vec;
use thiserror_no_std::Error;
use tracing::{debug, trace, warn};
use variant_count::VariantCount;

pub mod assembler;
pub mod bytecode;
pub mod console;
pub mod instruction;
pub mod labels;
pub mod memory;
pub mod operand;
pub mod registers;
pub mod tokenizer;


use crate::bytecode::{Bytecode, BytecodeError, Seek};
use crate::console::{Console, ConsoleError};
use crate::memory::{Memory, MemoryError};
use crate::operand::{AddrExpr, Operand};
use crate::registers::RegisterFile;

/// This crate implements a small stack machine and the assembler that
/// feeds it.
///
/// Source text is assembled in two passes into a flat image of signed
/// 64 bit words. The processor fetches from that image and works against
/// a value stack, a call stack used only for return addresses, four
/// registers and a flat memory whose first cells double as a text mode
/// framebuffer.
///
/// Instruction words, operands, stack values, register values and memory
/// cells all share the one `Word` type so values move between them
/// without conversion.
pub type Word = i64;

pub const STACK_CAPACITY: usize = 1024;
pub const CALL_STACK_CAPACITY: usize = 256;

/// What follows an opcode in the bytecode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// Nothing, the opcode is the whole instruction.
    None,
    /// A mode word followed by a register and/or constant word.
    Transfer,
    /// One absolute instruction offset.
    Target,
}

#[derive(Clone, Copy, Debug)]
pub struct OpInfo {
    pub op: Ops,
    pub mnemonic: &'static str,
    pub shape: Shape,
}

macro_rules! ops {
    ($($op:ident = $code:literal, $mnemonic:literal, $shape:ident;)*) => {
        #[repr(i64)] // Must match Word
        #[derive(VariantCount, Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum Ops {
            $($op = $code,)*
        }

        /// Every instruction the machine knows, declared once. The
        /// assembler reads mnemonics and operand shapes from it and the
        /// processor and disassembler map opcode words back through it.
        pub const OPS: [OpInfo; Ops::VARIANT_COUNT] = [
            $(OpInfo { op: Ops::$op, mnemonic: $mnemonic, shape: Shape::$shape },)*
        ];

        impl Ops {
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Ops::$op => $mnemonic,)*
                }
            }

            pub fn shape(self) -> Shape {
                match self {
                    $(Ops::$op => Shape::$shape,)*
                }
            }
        }
    };
}

ops! {
    Push = 1, "PUSH", Transfer;
    Pop = 2, "POP", Transfer;
    Add = 3, "ADD", None;
    Sub = 4, "SUB", None;
    Mul = 5, "MUL", None;
    Div = 6, "DIV", None;
    In = 7, "IN", None;
    Out = 8, "OUT", None;
    Draw = 9, "DRAW", None;
    Ret = 10, "RET", None;
    Jmp = 11, "JMP", Target;
    Ja = 12, "JA", Target;
    Jae = 13, "JAE", Target;
    Jb = 14, "JB", Target;
    Jbe = 15, "JBE", Target;
    Je = 16, "JE", Target;
    Jne = 17, "JNE", Target;
    Call = 18, "CALL", Target;
}

impl Ops {
    /// Mnemonics match without regard to ASCII case.
    pub fn from_mnemonic(token: &str) -> Option<Self> {
        OPS.iter()
            .find(|info| info.mnemonic.eq_ignore_ascii_case(token))
            .map(|info| info.op)
    }
}

impl From<Ops> for Word {
    fn from(op: Ops) -> Word {
        op as Word
    }
}

impl TryFrom<Word> for Ops {
    type Error = MachineError;
    fn try_from(value: Word) -> Result<Self, Self::Error> {
        OPS.iter()
            .find(|info| Word::from(info.op) == value)
            .map(|info| info.op)
            .ok_or(MachineError::UnknownOpcode(value))
    }
}

#[derive(Error, Debug)]
pub enum MachineError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(Word),
    #[error("word {0} is not a valid addressing mode")]
    InvalidMode(Word),
    #[error("word {0} does not name a register")]
    InvalidRegister(Word),
    #[error("POP needs a register or memory destination")]
    InvalidPopTarget,
    #[error("RET executed with an empty call stack")]
    EmptyCallStack,
    #[error("division by zero")]
    DivideByZero,
    #[error("attempted opperation would overflow the stack")]
    StackOverflow,
    #[error("attempted call would overflow the call stack")]
    CallStackOverflow,
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Console(#[from] ConsoleError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
}

/// Executes one bytecode image. The processor owns everything a run
/// touches and is dropped with it.
pub struct Processor<C> {
    code: Bytecode,
    stack: Vec<Word, STACK_CAPACITY>,
    call_stack: Vec<Word, CALL_STACK_CAPACITY>,
    registers: RegisterFile,
    memory: Memory,
    console: C,
}

impl<C: Console> Processor<C> {
    pub fn new(mut code: Bytecode, memory: Memory, console: C) -> Self {
        code.reset();
        Self {
            code,
            stack: Vec::new(),
            call_stack: Vec::new(),
            registers: RegisterFile::default(),
            memory,
            console,
        }
    }

    /// Runs until the program counter falls off the end of the image.
    pub fn run(&mut self) -> Result<(), MachineError> {
        debug!(words = self.code.len(), "starting execution");
        loop {
            match self.step() {
                Ok(Status::Running) => continue,
                Ok(Status::Halted) => break,
                Err(err) => {
                    debug!(at = self.code.position(), %err, "execution halted on error");
                    return Err(err);
                }
            }
        }
        debug!(stack = self.stack.len(), "execution finished");
        Ok(())
    }

    /// Fetches and executes a single instruction.
    pub fn step(&mut self) -> Result<Status, MachineError> {
        let at = self.code.position();
        let word = match self.code.fetch() {
            Ok(word) => word,
            Err(BytecodeError::EndOfProgram) => return Ok(Status::Halted),
            Err(err) => return Err(err.into()),
        };
        let op = Ops::try_from(word)?;
        trace!(at, op = op.mnemonic(), "dispatch");

        match op {
            Ops::Push => {
                let operand = Operand::decode(&mut self.code)?;
                let value = self.load(&operand)?;
                push(&mut self.stack, value)?;
            }
            Ops::Pop => {
                let operand = Operand::decode(&mut self.code)?;
                if !operand.is_pop_target() {
                    return Err(MachineError::InvalidPopTarget);
                }
                if let Some(value) = self.pop_or_warn(op) {
                    self.store(&operand, value)?;
                }
            }
            Ops::Add => self.arithmetic(op, |first, second| Ok(first.wrapping_add(second)))?,
            Ops::Sub => self.arithmetic(op, |first, second| Ok(first.wrapping_sub(second)))?,
            Ops::Mul => self.arithmetic(op, |first, second| Ok(first.wrapping_mul(second)))?,
            Ops::Div => self.arithmetic(op, |first, second| {
                if second == 0 {
                    return Err(MachineError::DivideByZero);
                }
                Ok(first.wrapping_div(second))
            })?,
            Ops::In => {
                let value = self.console.read_value()?;
                push(&mut self.stack, value)?;
            }
            Ops::Out => {
                if let Some(value) = self.pop_or_warn(op) {
                    self.console.write_value(value)?;
                }
            }
            Ops::Draw => self.memory.draw(&mut self.console)?,
            Ops::Jmp => self.jump()?,
            Ops::Ja => self.branch(op, Word::gt)?,
            Ops::Jae => self.branch(op, Word::ge)?,
            Ops::Jb => self.branch(op, Word::lt)?,
            Ops::Jbe => self.branch(op, Word::le)?,
            Ops::Je => self.branch(op, Word::eq)?,
            Ops::Jne => self.branch(op, Word::ne)?,
            Ops::Call => {
                // The operand is the next word, execution resumes after it.
                let return_to = self
                    .code
                    .position()
                    .checked_add(1)
                    .and_then(|next| Word::try_from(next).ok())
                    .ok_or(BytecodeError::Overflow)?;
                self.call_stack
                    .push(return_to)
                    .map_err(|_| MachineError::CallStackOverflow)?;
                self.jump()?;
            }
            Ops::Ret => {
                let return_to = self
                    .call_stack
                    .pop()
                    .ok_or(MachineError::EmptyCallStack)?;
                self.code.seek(Seek::Absolute, return_to)?;
            }
        }

        Ok(Status::Running)
    }

    fn load(&self, operand: &Operand) -> Result<Word, MachineError> {
        let effective = operand.expr().evaluate(&self.registers);
        match operand {
            Operand::Direct(_) => Ok(effective),
            Operand::Memory(_) => Ok(self.memory.read(effective)?),
        }
    }

    fn store(&mut self, operand: &Operand, value: Word) -> Result<(), MachineError> {
        match operand {
            Operand::Memory(expr) => {
                let address = expr.evaluate(&self.registers);
                self.memory.write(address, value)?;
            }
            Operand::Direct(AddrExpr::Register(register)) => self.registers.set(*register, value),
            Operand::Direct(_) => return Err(MachineError::InvalidPopTarget),
        }
        Ok(())
    }

    fn arithmetic(
        &mut self,
        op: Ops,
        apply: fn(Word, Word) -> Result<Word, MachineError>,
    ) -> Result<(), MachineError> {
        let Some(first) = self.pop_or_warn(op) else {
            return Ok(());
        };
        let Some(second) = self.pop_or_warn(op) else {
            return Ok(());
        };
        push(&mut self.stack, apply(first, second)?)
    }

    fn jump(&mut self) -> Result<(), MachineError> {
        let target = self.code.fetch()?;
        self.code.seek(Seek::Absolute, target)?;
        Ok(())
    }

    /// Compares the top of the stack against the value below it. Both
    /// values are put back whether or not the jump is taken.
    fn branch(&mut self, op: Ops, holds: fn(&Word, &Word) -> bool) -> Result<(), MachineError> {
        let Some(top) = self.pop_or_warn(op) else {
            self.code.skip()?;
            return Ok(());
        };
        let Some(second) = self.pop_or_warn(op) else {
            push(&mut self.stack, top)?;
            self.code.skip()?;
            return Ok(());
        };

        push(&mut self.stack, second)?;
        push(&mut self.stack, top)?;

        if holds(&top, &second) {
            self.jump()
        } else {
            self.code.skip()?;
            Ok(())
        }
    }

    /// An empty stack is not fatal: the instruction is reported and
    /// skipped.
    fn pop_or_warn(&mut self, op: Ops) -> Option<Word> {
        let value = self.stack.pop();
        if value.is_none() {
            warn!(
                op = op.mnemonic(),
                at = self.code.position(),
                "pop from an empty value stack, instruction skipped"
            );
        }
        value
    }

    pub fn stack(&self) -> &[Word] {
        self.stack.as_slice()
    }

    pub fn call_stack(&self) -> &[Word] {
        self.call_stack.as_slice()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The program counter.
    pub fn position(&self) -> usize {
        self.code.position()
    }

    pub fn into_console(self) -> C {
        self.console
    }
}

fn push<const STACK_SIZE: usize>(
    stack: &mut Vec<Word, STACK_SIZE>,
    value: Word,
) -> Result<(), MachineError> {
    if stack.push(value).is_err() {
        return Err(MachineError::StackOverflow);
    }
    Ok(())
}

#[cfg(test)]
mod test;
