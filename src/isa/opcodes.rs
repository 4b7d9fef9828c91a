//! MIPS32 opcode and function-field constants for the supported subset.

pub const OP_SPECIAL: u32 = 0x00;
pub const OP_J: u32 = 0x02;
pub const OP_BEQ: u32 = 0x04;
pub const OP_BNE: u32 = 0x05;
pub const OP_ADDI: u32 = 0x08;
pub const OP_ADDIU: u32 = 0x09;
pub const OP_LUI: u32 = 0x0f;
pub const OP_COP1: u32 = 0x11;
pub const OP_LW: u32 = 0x23;
pub const OP_LWC1: u32 = 0x31;
pub const OP_SW: u32 = 0x2b;
pub const OP_SWC1: u32 = 0x39;

pub const FUNCT_ADD: u32 = 0x20;
pub const FUNCT_ADDU: u32 = 0x21;
pub const FUNCT_SUB: u32 = 0x22;
pub const FUNCT_AND: u32 = 0x24;
pub const FUNCT_OR: u32 = 0x25;
pub const FUNCT_SLT: u32 = 0x2a;

/// COP1 format field for single precision.
pub const FMT_SINGLE: u32 = 0x10;

pub const FUNCT_ADD_S: u32 = 0x00;
pub const FUNCT_MUL_S: u32 = 0x02;
pub const FUNCT_DIV_S: u32 = 0x03;
