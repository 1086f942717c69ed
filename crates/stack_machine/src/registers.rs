use core::fmt;

use variant_count::VariantCount;

use crate::{MachineError, Word};

/// The machine's named registers. The set is closed: operands carry the
/// register's code, never a free index.
#[repr(i64)] // Must match Word
#[derive(VariantCount, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    Rax = 1,
    Rbx = 2,
    Rcx = 3,
    Rdx = 4,
}

impl Register {
    pub const ALL: [Register; Register::VARIANT_COUNT] =
        [Register::Rax, Register::Rbx, Register::Rcx, Register::Rdx];

    pub fn name(self) -> &'static str {
        match self {
            Register::Rax => "RAX",
            Register::Rbx => "RBX",
            Register::Rcx => "RCX",
            Register::Rdx => "RDX",
        }
    }

    pub fn from_name(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|register| register.name().eq_ignore_ascii_case(token))
    }

    pub fn code(self) -> Word {
        self as Word
    }
}

impl TryFrom<Word> for Register {
    type Error = MachineError;
    fn try_from(value: Word) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|register| register.code() == value)
            .ok_or(MachineError::InvalidRegister(value))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One 64 bit slot per register, all zero at start.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterFile {
    rax: Word,
    rbx: Word,
    rcx: Word,
    rdx: Word,
}

impl RegisterFile {
    pub fn get(&self, register: Register) -> Word {
        match register {
            Register::Rax => self.rax,
            Register::Rbx => self.rbx,
            Register::Rcx => self.rcx,
            Register::Rdx => self.rdx,
        }
    }

    pub fn set(&mut self, register: Register, value: Word) {
        let slot = match register {
            Register::Rax => &mut self.rax,
            Register::Rbx => &mut self.rbx,
            Register::Rcx => &mut self.rcx,
            Register::Rdx => &mut self.rdx,
        };
        *slot = value;
    }
}
