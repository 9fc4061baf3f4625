//! MIPS instruction classification.
//!
//! Only the fields needed to decide whether a word carries a branch delay slot
//! are decoded. Operands, registers and mnemonics are out of scope.

use serde::{Deserialize, Serialize};

/// Width of every instruction in bytes.
pub const INSTRUCTION_WIDTH: u32 = 4;

/// Distance from a call-and-link instruction to the address control returns to:
/// the call itself plus its delay slot.
pub const RETURN_OFFSET: u32 = 2 * INSTRUCTION_WIDTH;

/// Primary opcodes (bits 31..26).
pub mod opcode {
    pub const SPECIAL: u8 = 0x00;
    pub const REGIMM: u8 = 0x01;
    pub const J: u8 = 0x02;
    pub const JAL: u8 = 0x03;
    pub const BEQ: u8 = 0x04;
    pub const BNE: u8 = 0x05;
    pub const BLEZ: u8 = 0x06;
    pub const BGTZ: u8 = 0x07;
    pub const COP1: u8 = 0x11;
    pub const BEQL: u8 = 0x14;
    pub const BNEL: u8 = 0x15;
    pub const BLEZL: u8 = 0x16;
    pub const BGTZL: u8 = 0x17;
}

/// SPECIAL function codes (bits 5..0).
pub mod funct {
    pub const JR: u8 = 0x08;
    pub const JALR: u8 = 0x09;
}

/// REGIMM `rt` codes (bits 20..16).
pub mod regimm {
    pub const BLTZ: u8 = 0x00;
    pub const BGEZ: u8 = 0x01;
    pub const BLTZL: u8 = 0x02;
    pub const BGEZL: u8 = 0x03;
    pub const BLTZAL: u8 = 0x10;
    pub const BGEZAL: u8 = 0x11;
    pub const BLTZALL: u8 = 0x12;
    pub const BGEZALL: u8 = 0x13;
}

/// COP1 format codes (bits 25..21).
pub mod cop1 {
    /// BC1F/BC1T/BC1FL/BC1TL.
    pub const BC: u8 = 0x08;
}

const DELAY_SLOT_OPCODES: [u8; 10] = [
    opcode::J,
    opcode::JAL,
    opcode::BEQ,
    opcode::BNE,
    opcode::BLEZ,
    opcode::BGTZ,
    opcode::BEQL,
    opcode::BNEL,
    opcode::BLEZL,
    opcode::BGTZL,
];

const DELAY_SLOT_FUNCTS: [u8; 2] = [funct::JR, funct::JALR];

const DELAY_SLOT_REGIMM: [u8; 8] = [
    regimm::BLTZ,
    regimm::BGEZ,
    regimm::BLTZL,
    regimm::BGEZL,
    regimm::BLTZAL,
    regimm::BGEZAL,
    regimm::BLTZALL,
    regimm::BGEZALL,
];

/// Whether a decoded word carries a mandatory delay slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchClassification {
    NotABranch,
    DelaySlotBranch,
}

/// Transient decoded view of one instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub word: u32,
}

impl Instruction {
    pub fn decode(word: u32) -> Self {
        Self { word }
    }

    pub fn opcode(self) -> u8 {
        ((self.word >> 26) & 0x3F) as u8
    }

    pub fn funct(self) -> u8 {
        (self.word & 0x3F) as u8
    }

    pub fn rt(self) -> u8 {
        ((self.word >> 16) & 0x1F) as u8
    }

    pub fn fmt(self) -> u8 {
        ((self.word >> 21) & 0x1F) as u8
    }

    pub fn classification(self) -> BranchClassification {
        let has_delay_slot = match self.opcode() {
            opcode::SPECIAL => DELAY_SLOT_FUNCTS.contains(&self.funct()),
            opcode::REGIMM => DELAY_SLOT_REGIMM.contains(&self.rt()),
            opcode::COP1 => self.fmt() == cop1::BC,
            op => DELAY_SLOT_OPCODES.contains(&op),
        };
        if has_delay_slot {
            BranchClassification::DelaySlotBranch
        } else {
            BranchClassification::NotABranch
        }
    }

    /// `jal` or `jalr`: the two forms whose return address must be an entry point.
    pub fn is_call_and_link(self) -> bool {
        match self.opcode() {
            opcode::JAL => true,
            opcode::SPECIAL => self.funct() == funct::JALR,
            _ => false,
        }
    }
}

/// Classify a raw 32-bit word. Total over all inputs.
pub fn classify(word: u32) -> BranchClassification {
    Instruction::decode(word).classification()
}

pub fn is_delay_slot_branch(word: u32) -> bool {
    classify(word) == BranchClassification::DelaySlotBranch
}

pub fn is_call_and_link(word: u32) -> bool {
    Instruction::decode(word).is_call_and_link()
}

/// Address control returns to after a call-and-link at `address`.
///
/// `None` when the result would not fit in the 32-bit address space.
pub fn return_address(address: u32) -> Option<u32> {
    address.checked_add(RETURN_OFFSET)
}

/// Instruction encoders used by tests and fixture builders.
pub mod encode {
    use super::{funct, opcode};

    pub const NOP: u32 = 0;

    pub fn jal(target: u32) -> u32 {
        (u32::from(opcode::JAL) << 26) | ((target >> 2) & 0x03FF_FFFF)
    }

    pub fn j(target: u32) -> u32 {
        (u32::from(opcode::J) << 26) | ((target >> 2) & 0x03FF_FFFF)
    }

    pub fn jr(rs: u8) -> u32 {
        (u32::from(rs & 0x1F) << 21) | u32::from(funct::JR)
    }

    pub fn jalr(rs: u8) -> u32 {
        (u32::from(rs & 0x1F) << 21) | (31 << 11) | u32::from(funct::JALR)
    }

    pub fn beq(rs: u8, rt: u8, offset: i16) -> u32 {
        (u32::from(opcode::BEQ) << 26)
            | (u32::from(rs & 0x1F) << 21)
            | (u32::from(rt & 0x1F) << 16)
            | u32::from(offset as u16)
    }

    /// `addiu rt, rs, imm`
    pub fn addiu(rt: u8, rs: u8, imm: i16) -> u32 {
        (0x09 << 26)
            | (u32::from(rs & 0x1F) << 21)
            | (u32::from(rt & 0x1F) << 16)
            | u32::from(imm as u16)
    }
}
