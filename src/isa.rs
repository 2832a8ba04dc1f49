//! Instruction set definition: opcode, register and function codes, the
//! instruction classes, condition codes and the ALU.

macro_rules! define_code {
    {
        @mod $modname:ident;
        @type $typ:ty;
        $( $cname:ident = $cval:expr; )*
    } => {
        pub mod $modname {
            $(pub const $cname : $typ = $cval; )*
            #[allow(unused)]
            pub fn name_of(code: $typ) -> &'static str {
                match code {
                    $($cname => stringify!($cname), )*
                    _ => "no name"
                }
            }
        }
    };
}

define_code! {
    @mod inst_code;
    @type u8;
    HALT = 0x0;
    NOP = 0x1;
    CMOVX = 0x2;
    IRMOVQ = 0x3;
    RMMOVQ = 0x4;
    MRMOVQ = 0x5;
    OPQ = 0x6;
    JX = 0x7;
    CALL = 0x8;
    RET = 0x9;
    PUSHQ = 0xa;
    POPQ = 0xb;
}

define_code! {
    @mod reg_code;
    @type u8;
    RAX = 0;
    RCX = 1;
    RDX = 2;
    RBX = 3;
    RSP = 4;
    RBP = 5;
    RSI = 6;
    RDI = 7;
    R8 = 8;
    R9 = 9;
    RNONE = 0xa;
    R11 = 0xb;
    R12 = 0xc;
    R13 = 0xd;
    R14 = 0xe;
}

/// Number of register file slots. Slot [`reg_code::RNONE`] exists but no
/// operand can name it.
pub const REG_COUNT: usize = 15;

/// The register file. Index 4 is the stack pointer.
pub type RegFile = [i64; REG_COUNT];

/// Default size of data memory in bytes.
pub const MEM_SIZE: usize = 1024;

/// Assembly name of a register, `None` for codes that do not name one.
pub fn reg_name(code: u8) -> Option<&'static str> {
    use reg_code::*;
    Some(match code {
        RAX => "%rax",
        RCX => "%rcx",
        RDX => "%rdx",
        RBX => "%rbx",
        RSP => "%rsp",
        RBP => "%rbp",
        RSI => "%rsi",
        RDI => "%rdi",
        R8 => "%r8",
        R9 => "%r9",
        R11 => "%r11",
        R12 => "%r12",
        R13 => "%r13",
        R14 => "%r14",
        _ => return None,
    })
}

define_code! {
    @mod op_code;
    @type u8;
    ADD = 0;
    SUB = 1;
    AND = 2;
    XOR = 3;
}

/// Compute `a op b`. Returns `None` for an unknown function code.
pub fn arithmetic_compute(a: i64, b: i64, op: u8) -> Option<i64> {
    use op_code::*;
    match op {
        ADD => Some(a.wrapping_add(b)),
        SUB => Some(a.wrapping_sub(b)),
        AND => Some(a & b),
        XOR => Some(a ^ b),
        _ => None,
    }
}

define_code! {
    @mod cond_fn;
    @type u8;
    YES = 0;
    LE = 1;
    L = 2;
    E = 3;
    NE = 4;
    GE = 5;
    G = 6;
}

/// Instruction class. Decoded once in fetch and carried through every
/// latch, so later stages match on the tag instead of on raw opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum OpClass {
    Halt,
    /// Also the class of a bubble.
    #[default]
    Nop,
    /// `rrmovq` and `cmovXX`.
    Cmov,
    Irmovq,
    Rmmovq,
    Mrmovq,
    Opq,
    Jxx,
    Call,
    Ret,
    Pushq,
    Popq,
}

impl OpClass {
    pub fn from_icode(icode: u8) -> Option<Self> {
        use inst_code::*;
        Some(match icode {
            HALT => Self::Halt,
            NOP => Self::Nop,
            CMOVX => Self::Cmov,
            IRMOVQ => Self::Irmovq,
            RMMOVQ => Self::Rmmovq,
            MRMOVQ => Self::Mrmovq,
            OPQ => Self::Opq,
            JX => Self::Jxx,
            CALL => Self::Call,
            RET => Self::Ret,
            PUSHQ => Self::Pushq,
            POPQ => Self::Popq,
            _ => return None,
        })
    }

    pub fn icode(self) -> u8 {
        use inst_code::*;
        match self {
            Self::Halt => HALT,
            Self::Nop => NOP,
            Self::Cmov => CMOVX,
            Self::Irmovq => IRMOVQ,
            Self::Rmmovq => RMMOVQ,
            Self::Mrmovq => MRMOVQ,
            Self::Opq => OPQ,
            Self::Jxx => JX,
            Self::Call => CALL,
            Self::Ret => RET,
            Self::Pushq => PUSHQ,
            Self::Popq => POPQ,
        }
    }

    /// Whether the encoding carries a register byte.
    pub fn need_regids(self) -> bool {
        !matches!(
            self,
            Self::Halt | Self::Nop | Self::Jxx | Self::Call | Self::Ret
        )
    }

    /// Whether the encoding carries an 8-byte immediate.
    pub fn need_valc(self) -> bool {
        matches!(
            self,
            Self::Irmovq | Self::Rmmovq | Self::Mrmovq | Self::Jxx | Self::Call
        )
    }

    /// Encoded length in bytes.
    pub fn size(self) -> usize {
        1 + self.need_regids() as usize + 8 * self.need_valc() as usize
    }

    /// Whether the `rA` nibble names a register this class reads or writes.
    pub fn uses_ra(self) -> bool {
        matches!(
            self,
            Self::Cmov | Self::Rmmovq | Self::Mrmovq | Self::Opq | Self::Pushq | Self::Popq
        )
    }

    /// Whether the `rB` nibble names a register this class reads or writes.
    pub fn uses_rb(self) -> bool {
        matches!(
            self,
            Self::Cmov | Self::Irmovq | Self::Rmmovq | Self::Mrmovq | Self::Opq
        )
    }
}

/// A data structure that simulates the condition codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConditionCode {
    pub zf: bool,
    pub sf: bool,
    pub of: bool,
}

impl ConditionCode {
    /// Test if the condition code satisfies the given condition function.
    /// Unknown functions never hold.
    pub fn test(self, cfn: u8) -> bool {
        let Self { sf, zf, of } = self;
        use cond_fn::*;
        match cfn {
            YES => true,
            E => zf,
            NE => !zf,
            L => sf ^ of,
            LE => zf || (sf ^ of),
            GE => !(sf ^ of),
            G => !zf && !(sf ^ of),
            _ => false,
        }
    }

    /// Recompute the flags from `e = a op b`.
    pub fn set(&mut self, a: i64, b: i64, e: i64, opfun: u8) {
        use op_code::*;
        *self = ConditionCode {
            zf: e == 0,
            sf: e < 0,
            of: match opfun {
                // a, b have the same sign and a, e have different sign
                ADD => (!(a ^ b) & (a ^ e)) < 0,
                // (a - b): a, b have different sign and a, e have different sign
                SUB => ((a ^ b) & (a ^ e)) < 0,
                _ => false,
            },
        };
    }
}

impl std::fmt::Display for ConditionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flag = |v: bool| {
            if v {
                crate::utils::GRN.bold().paint("true")
            } else {
                crate::utils::GRAY.paint("false")
            }
        };
        write!(
            f,
            "zf {zf}  sf {sf}  of {of}",
            zf = flag(self.zf),
            sf = flag(self.sf),
            of = flag(self.of),
        )
    }
}

/// Architectural status of an instruction, and of the machine once the
/// instruction retires.
#[derive(Debug, Clone, PartialEq, Eq, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Stat {
    /// Indicates that everything is fine. Bubbles carry this status too.
    #[default]
    Aok,
    /// Instruction memory or data memory was accessed with an invalid
    /// address.
    Adr,
    /// The instruction fetcher read an invalid instruction.
    Ins,
    /// A `halt` instruction retired.
    Hlt,
}

impl Stat {
    pub fn is_ok(self) -> bool {
        self == Stat::Aok
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (name, s) = match self {
            Stat::Aok => ("aok", crate::utils::GRN.normal()),
            Stat::Hlt => ("hlt", crate::utils::GRN.bold()),
            Stat::Adr => ("adr", crate::utils::RED.bold()),
            Stat::Ins => ("ins", crate::utils::RED.bold()),
        };
        write!(f, "{}", s.paint(name))
    }
}
