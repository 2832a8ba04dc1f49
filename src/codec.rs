//! Instruction codec: a byte window of the program image to an
//! [`Instruction`] and back.

use std::fmt::Display;

use thiserror::Error;

use crate::{
    isa::{cond_fn, op_code, reg_code::RNONE, reg_name, OpClass, REG_COUNT},
    utils::get_i64,
};

/// A decoded instruction. Register fields the class does not use hold
/// [`RNONE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub class: OpClass,
    pub ifun: u8,
    pub ra: u8,
    pub rb: u8,
    pub valc: i64,
}

/// Why an instruction could not be fetched. Both are architectural
/// outcomes, reported through the instruction's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FetchFault {
    #[error("instruction address {0:#x} is outside the program image")]
    Address(i64),
    #[error("invalid instruction byte {byte:#04x} at {pc:#x}")]
    Invalid { pc: i64, byte: u8 },
}

/// Decode the instruction at `pc`. Returns the instruction and the address
/// of the next one (`valP`).
pub fn decode(image: &[u8], pc: i64) -> Result<(Instruction, i64), FetchFault> {
    let start = usize::try_from(pc)
        .ok()
        .filter(|&p| p < image.len())
        .ok_or(FetchFault::Address(pc))?;
    let byte = image[start];
    let class = OpClass::from_icode(byte >> 4).ok_or(FetchFault::Invalid { pc, byte })?;
    let end = start + class.size();
    if end > image.len() {
        return Err(FetchFault::Address(pc));
    }

    let (mut ra, mut rb) = (RNONE, RNONE);
    let mut cursor = start + 1;
    if class.need_regids() {
        let regs = image[cursor];
        let invalid = FetchFault::Invalid { pc, byte: regs };
        ra = operand(regs >> 4, class.uses_ra()).ok_or(invalid)?;
        rb = operand(regs & 0xf, class.uses_rb()).ok_or(invalid)?;
        cursor += 1;
    }
    let valc = if class.need_valc() {
        get_i64(&image[cursor..end])
    } else {
        0
    };
    let inst = Instruction {
        class,
        ifun: byte & 0xf,
        ra,
        rb,
        valc,
    };
    Ok((inst, end as i64))
}

fn operand(nibble: u8, used: bool) -> Option<u8> {
    if !used {
        Some(RNONE)
    } else if (nibble as usize) < REG_COUNT {
        Some(nibble)
    } else {
        None
    }
}

impl Instruction {
    pub fn new(class: OpClass, ifun: u8, ra: u8, rb: u8, valc: i64) -> Self {
        Self {
            class,
            ifun,
            ra,
            rb,
            valc,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.class.size());
        out.push(self.class.icode() << 4 | (self.ifun & 0xf));
        if self.class.need_regids() {
            // unused operands get the 0xf filler
            let nibble = |reg: u8, used: bool| if used { reg & 0xf } else { 0xf };
            let (ra, rb) = (
                nibble(self.ra, self.class.uses_ra()),
                nibble(self.rb, self.class.uses_rb()),
            );
            out.push(ra << 4 | rb);
        }
        if self.class.need_valc() {
            out.extend_from_slice(&self.valc.to_le_bytes());
        }
        out
    }
}

fn cond_suffix(ifun: u8) -> &'static str {
    match ifun {
        cond_fn::LE => "le",
        cond_fn::L => "l",
        cond_fn::E => "e",
        cond_fn::NE => "ne",
        cond_fn::GE => "ge",
        cond_fn::G => "g",
        _ => "?",
    }
}

impl Display for Instruction {
    /// Disassembly, e.g. `irmovq $0x7, %rax`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ra = reg_name(self.ra).unwrap_or("%none");
        let rb = reg_name(self.rb).unwrap_or("%none");
        let valc = self.valc;
        match self.class {
            OpClass::Halt => write!(f, "halt"),
            OpClass::Nop => write!(f, "nop"),
            OpClass::Cmov if self.ifun == cond_fn::YES => write!(f, "rrmovq {ra}, {rb}"),
            OpClass::Cmov => write!(f, "cmov{} {ra}, {rb}", cond_suffix(self.ifun)),
            OpClass::Irmovq => write!(f, "irmovq ${valc:#x}, {rb}"),
            OpClass::Rmmovq => write!(f, "rmmovq {ra}, {valc:#x}({rb})"),
            OpClass::Mrmovq => write!(f, "mrmovq {valc:#x}({rb}), {ra}"),
            OpClass::Opq => {
                let name = match self.ifun {
                    op_code::ADD => "addq",
                    op_code::SUB => "subq",
                    op_code::AND => "andq",
                    op_code::XOR => "xorq",
                    _ => "opq?",
                };
                write!(f, "{name} {ra}, {rb}")
            }
            OpClass::Jxx if self.ifun == cond_fn::YES => write!(f, "jmp {valc:#x}"),
            OpClass::Jxx => write!(f, "j{} {valc:#x}", cond_suffix(self.ifun)),
            OpClass::Call => write!(f, "call {valc:#x}"),
            OpClass::Ret => write!(f, "ret"),
            OpClass::Pushq => write!(f, "pushq {ra}"),
            OpClass::Popq => write!(f, "popq {ra}"),
        }
    }
}
