//! Pipeline registers between the stages.
//!
//! Each latch is a plain struct whose [`Default`] is the bubble: a `nop`
//! with no destination and status [`Stat::Aok`]. At the end of a cycle the
//! engine decides, per latch, whether it takes the value computed by the
//! stage feeding it, keeps its current value, or becomes a bubble.

use crate::isa::{reg_code::RNONE, OpClass, Stat};

use super::speculate::SpecMark;

macro_rules! define_latches {
    ($(
        $(#[$att:meta])*
        $name:ident $short:ident {
            $( $(#[$fatt:meta])* $field:ident : $ty:ty = $default:expr ),* $(,)?
        }
    )*) => {
        $(
            $(#[$att])*
            #[derive(Debug, Clone, PartialEq)]
            #[cfg_attr(feature = "serde", derive(serde::Serialize))]
            pub struct $name {
                $( $(#[$fatt])* pub $field: $ty, )*
            }

            impl $name {
                /// The architecturally inert content of this latch.
                pub fn bubble() -> Self {
                    Self { $( $field: $default, )* }
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::bubble()
                }
            }
        )*

        /// All pipeline registers at the start of a cycle.
        #[derive(Debug, Clone, Default, PartialEq)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize))]
        pub struct Latches {
            $( pub $short: $name, )*
        }
    };
}

define_latches! {
    /// Input of fetch.
    FetchLatch f {
        pred_pc: i64 = 0,
    }

    /// Output of fetch, input of decode.
    DecodeLatch d {
        /// Fetch sequence number, 0 for bubbles.
        seq: u64 = 0,
        class: OpClass = OpClass::Nop,
        ifun: u8 = 0,
        ra: u8 = RNONE,
        rb: u8 = RNONE,
        valc: i64 = 0,
        valp: i64 = 0,
        imem_error: bool = false,
        instr_valid: bool = true,
        /// Speculative bookkeeping performed when this instruction was fetched.
        spec: SpecMark = SpecMark::None,
    }

    /// Output of decode, input of execute.
    ExecuteLatch e {
        seq: u64 = 0,
        class: OpClass = OpClass::Nop,
        ifun: u8 = 0,
        ra: u8 = RNONE,
        rb: u8 = RNONE,
        valc: i64 = 0,
        valp: i64 = 0,
        vala: i64 = 0,
        valb: i64 = 0,
        srca: u8 = RNONE,
        srcb: u8 = RNONE,
        imem_error: bool = false,
        instr_valid: bool = true,
        spec: SpecMark = SpecMark::None,
    }

    /// Output of execute, input of memory.
    MemoryLatch m {
        seq: u64 = 0,
        class: OpClass = OpClass::Nop,
        cnd: bool = true,
        vale: i64 = 0,
        vala: i64 = 0,
        /// Fall-through address; the redirect target of a mispredicted jump.
        valp: i64 = 0,
        dste: u8 = RNONE,
        dstm: u8 = RNONE,
        imem_error: bool = false,
        instr_valid: bool = true,
    }

    /// Output of memory, input of write-back.
    WriteBackLatch w {
        seq: u64 = 0,
        class: OpClass = OpClass::Nop,
        stat: Stat = Stat::Aok,
        vale: i64 = 0,
        valm: i64 = 0,
        dste: u8 = RNONE,
        dstm: u8 = RNONE,
        /// Set when this `ret` loaded a different target than predicted.
        ret_redirect: Option<i64> = None,
    }
}

/// What a latch does at the end of a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Control {
    /// Take the value computed this cycle.
    #[default]
    Normal,
    /// Keep the current value.
    Stall,
    /// Become a bubble.
    Bubble,
}

impl Control {
    pub fn apply<T: Default + Clone>(self, cur: &T, computed: T) -> T {
        match self {
            Control::Normal => computed,
            Control::Stall => cur.clone(),
            Control::Bubble => T::default(),
        }
    }
}
