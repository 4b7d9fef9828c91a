//! Instruction set scaffolding.
//!
//! A compact MIPS32 subset, just enough to exercise every path of the
//! execution engines: integer ALU operations (including the trapping
//! `add`/`addi`), loads and stores, branches and a jump, and the
//! single-precision arithmetic that occupies the floating-point units
//! for multiple cycles. Real MIPS32 encodings are used throughout;
//! anything else fails to decode and raises the reserved-instruction
//! fault.

/// Opcode and function-field constants.
pub mod opcodes;

/// Instruction word encoders, used by tests and program builders.
pub mod asm;

use self::opcodes::*;

use crate::core::alu::AluType;

/// A decoded instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Add { rd: u8, rs: u8, rt: u8 },
    Addu { rd: u8, rs: u8, rt: u8 },
    Sub { rd: u8, rs: u8, rt: u8 },
    And { rd: u8, rs: u8, rt: u8 },
    Or { rd: u8, rs: u8, rt: u8 },
    Slt { rd: u8, rs: u8, rt: u8 },
    Addi { rt: u8, rs: u8, imm: i16 },
    Addiu { rt: u8, rs: u8, imm: i16 },
    Lui { rt: u8, imm: i16 },
    Lw { rt: u8, base: u8, offset: i16 },
    Sw { rt: u8, base: u8, offset: i16 },
    Lwc1 { ft: u8, base: u8, offset: i16 },
    Swc1 { ft: u8, base: u8, offset: i16 },
    Beq { rs: u8, rt: u8, offset: i16 },
    Bne { rs: u8, rt: u8, offset: i16 },
    J { target: u32 },
    AddS { fd: u8, fs: u8, ft: u8 },
    MulS { fd: u8, fs: u8, ft: u8 },
    DivS { fd: u8, fs: u8, ft: u8 },
}

/// Decodes an instruction word. `None` means the word is not part of
/// the supported subset and must raise a reserved-instruction fault.
pub fn decode(word: u32) -> Option<Instruction> {
    if word == 0 {
        return Some(Instruction::Nop);
    }

    let op = word >> 26;
    let rs = ((word >> 21) & 0x1f) as u8;
    let rt = ((word >> 16) & 0x1f) as u8;
    let rd = ((word >> 11) & 0x1f) as u8;
    let imm = word as u16 as i16;

    match op {
        OP_SPECIAL => {
            if (word >> 6) & 0x1f != 0 {
                return None;
            }
            match word & 0x3f {
                FUNCT_ADD => Some(Instruction::Add { rd, rs, rt }),
                FUNCT_ADDU => Some(Instruction::Addu { rd, rs, rt }),
                FUNCT_SUB => Some(Instruction::Sub { rd, rs, rt }),
                FUNCT_AND => Some(Instruction::And { rd, rs, rt }),
                FUNCT_OR => Some(Instruction::Or { rd, rs, rt }),
                FUNCT_SLT => Some(Instruction::Slt { rd, rs, rt }),
                _ => None,
            }
        }
        OP_ADDI => Some(Instruction::Addi { rt, rs, imm }),
        OP_ADDIU => Some(Instruction::Addiu { rt, rs, imm }),
        OP_LUI => Some(Instruction::Lui { rt, imm }),
        OP_LW => Some(Instruction::Lw {
            rt,
            base: rs,
            offset: imm,
        }),
        OP_SW => Some(Instruction::Sw {
            rt,
            base: rs,
            offset: imm,
        }),
        OP_LWC1 => Some(Instruction::Lwc1 {
            ft: rt,
            base: rs,
            offset: imm,
        }),
        OP_SWC1 => Some(Instruction::Swc1 {
            ft: rt,
            base: rs,
            offset: imm,
        }),
        OP_BEQ => Some(Instruction::Beq { rs, rt, offset: imm }),
        OP_BNE => Some(Instruction::Bne { rs, rt, offset: imm }),
        OP_J => Some(Instruction::J {
            target: word & 0x03FF_FFFF,
        }),
        OP_COP1 => {
            if rs as u32 != FMT_SINGLE {
                return None;
            }
            let fd = ((word >> 6) & 0x1f) as u8;
            let fs = rd;
            let ft = rt;
            match word & 0x3f {
                FUNCT_ADD_S => Some(Instruction::AddS { fd, fs, ft }),
                FUNCT_MUL_S => Some(Instruction::MulS { fd, fs, ft }),
                FUNCT_DIV_S => Some(Instruction::DivS { fd, fs, ft }),
                _ => None,
            }
        }
        _ => None,
    }
}

impl Instruction {
    /// Whether the instruction has a memory phase.
    pub fn executes_memory(&self) -> bool {
        matches!(
            self,
            Instruction::Lw { .. }
                | Instruction::Sw { .. }
                | Instruction::Lwc1 { .. }
                | Instruction::Swc1 { .. }
        )
    }

    /// Whether the instruction has a write-back phase.
    pub fn executes_write_back(&self) -> bool {
        !matches!(
            self,
            Instruction::Nop
                | Instruction::Sw { .. }
                | Instruction::Swc1 { .. }
                | Instruction::Beq { .. }
                | Instruction::Bne { .. }
                | Instruction::J { .. }
        )
    }

    /// Whether the instruction may redirect the program counter.
    pub fn is_control_transfer(&self) -> bool {
        matches!(
            self,
            Instruction::Beq { .. } | Instruction::Bne { .. } | Instruction::J { .. }
        )
    }

    /// Whether the memory phase writes.
    pub fn is_memory_write(&self) -> bool {
        matches!(self, Instruction::Sw { .. } | Instruction::Swc1 { .. })
    }

    /// The functional-unit kind the execute phase occupies.
    pub fn alu_kind(&self) -> AluType {
        match self {
            Instruction::AddS { .. } => AluType::FloatAddition,
            Instruction::MulS { .. } => AluType::FloatMultiplication,
            Instruction::DivS { .. } => AluType::FloatDivision,
            _ => AluType::Integer,
        }
    }
}
