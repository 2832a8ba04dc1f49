//! Forwarding and pipeline register control.
//!
//! Forwarding is split in two tiers. Decode only sees the write-back
//! latch, which holds the values being committed this very cycle. Execute
//! re-resolves its operands against the memory and write-back latches, in
//! the order `M_valE`, `W_valE`, `W_valM`.

use crate::isa::{reg_code::RNONE, OpClass, RegFile};

use super::{
    latch::{Control, ExecuteLatch, Latches, MemoryLatch, WriteBackLatch},
    stages::{ExecuteOutput, MemoryOutput},
};

/// Read a register in decode, forwarding from the write-back latch.
pub fn read_decode(src: u8, regs: &RegFile, w: &WriteBackLatch) -> i64 {
    if src == RNONE {
        0
    } else if src == w.dste {
        w.vale
    } else if src == w.dstm {
        w.valm
    } else {
        regs.get(src as usize).copied().unwrap_or(0)
    }
}

/// Re-resolve an operand in execute. `val` is what decode produced.
pub fn forward_execute(src: u8, val: i64, m: &MemoryLatch, w: &WriteBackLatch) -> i64 {
    if src == RNONE {
        val
    } else if src == m.dste {
        m.vale
    } else if src == w.dste {
        w.vale
    } else if src == w.dstm {
        w.valm
    } else {
        val
    }
}

/// Per-latch decisions for the end of a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipeControl {
    pub f: Control,
    pub d: Control,
    pub e: Control,
    pub m: Control,
    /// The instruction in decode this cycle is squashed.
    pub cancel_decode: bool,
    /// The instruction in execute this cycle is squashed; its condition
    /// code update and branch resolution are discarded.
    pub cancel_execute: bool,
}

impl PipeControl {
    /// Whether the instruction fetched this cycle enters the decode latch.
    pub fn fetch_committed(&self) -> bool {
        self.d == Control::Normal
    }

    fn flush_younger_than_memory() -> Self {
        Self {
            d: Control::Bubble,
            e: Control::Bubble,
            m: Control::Bubble,
            cancel_decode: true,
            cancel_execute: true,
            ..Default::default()
        }
    }
}

/// Decide how every latch advances, given the stage outputs of this cycle.
///
/// `decoded` is the output of decode, whose `srca`/`srcb` are checked
/// against a load sitting in execute.
pub fn control(
    latches: &Latches,
    decoded: &ExecuteLatch,
    execute: &ExecuteOutput,
    memory: &MemoryOutput,
) -> PipeControl {
    let e = &latches.e;

    // An instruction older than everything in D/E has faulted or halted:
    // nothing younger may take effect.
    if !memory.w.stat.is_ok() || !latches.w.stat.is_ok() {
        tracing::debug!("cancel instructions behind a non-aok status");
        return PipeControl::flush_younger_than_memory();
    }

    if let Some(target) = memory.w.ret_redirect {
        tracing::debug!("return mispredicted, redirect to {:#x}", target);
        return PipeControl::flush_younger_than_memory();
    }

    if execute.mispredicted {
        tracing::debug!("branch mispredicted, fall through to {:#x}", execute.m.valp);
        return PipeControl {
            d: Control::Bubble,
            e: Control::Bubble,
            cancel_decode: true,
            ..Default::default()
        };
    }

    let load_use = matches!(e.class, OpClass::Mrmovq | OpClass::Popq)
        && e.ra != RNONE
        && (e.ra == decoded.srca || e.ra == decoded.srcb);
    if load_use {
        tracing::debug!("load/use hazard on register {:#x}", e.ra);
        return PipeControl {
            f: Control::Stall,
            d: Control::Stall,
            e: Control::Bubble,
            ..Default::default()
        };
    }

    PipeControl::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{reg_code::*, Stat};

    #[test]
    fn forwarding_priority() {
        let m = MemoryLatch {
            dste: RAX,
            vale: 1,
            ..Default::default()
        };
        let w = WriteBackLatch {
            dste: RAX,
            vale: 2,
            dstm: RBX,
            valm: 3,
            ..Default::default()
        };
        assert_eq!(forward_execute(RAX, 0, &m, &w), 1);
        assert_eq!(forward_execute(RBX, 0, &m, &w), 3);
        assert_eq!(forward_execute(RCX, 9, &m, &w), 9);
        assert_eq!(forward_execute(RNONE, 9, &m, &w), 9);

        let same = WriteBackLatch {
            dste: RSP,
            vale: 2,
            dstm: RSP,
            valm: 3,
            ..Default::default()
        };
        assert_eq!(forward_execute(RSP, 0, &MemoryLatch::bubble(), &same), 2);

        let mut regs = [0; crate::isa::REG_COUNT];
        regs[RCX as usize] = 7;
        assert_eq!(read_decode(RCX, &regs, &w), 7);
        assert_eq!(read_decode(RAX, &regs, &w), 2);
        assert_eq!(read_decode(RNONE, &regs, &w), 0);
    }

    fn outputs() -> (ExecuteOutput, MemoryOutput) {
        (ExecuteOutput::default(), MemoryOutput::default())
    }

    #[test]
    fn load_use_stalls() {
        let mut latches = Latches::default();
        latches.e.class = OpClass::Mrmovq;
        latches.e.ra = RBX;
        let decoded = ExecuteLatch {
            srca: RBX,
            ..Default::default()
        };
        let (ex, mem) = outputs();
        let ctrl = control(&latches, &decoded, &ex, &mem);
        assert_eq!((ctrl.f, ctrl.d, ctrl.e), (Control::Stall, Control::Stall, Control::Bubble));
        assert!(!ctrl.cancel_decode && !ctrl.fetch_committed());

        let unrelated = ExecuteLatch {
            srca: RCX,
            ..Default::default()
        };
        assert_eq!(control(&latches, &unrelated, &ex, &mem), PipeControl::default());
    }

    #[test]
    fn flush_precedence() {
        let latches = Latches::default();
        let (mut ex, mut mem) = outputs();
        ex.mispredicted = true;
        let ctrl = control(&latches, &ExecuteLatch::bubble(), &ex, &mem);
        assert!(ctrl.cancel_decode && !ctrl.cancel_execute);
        assert_eq!(ctrl.m, Control::Normal);

        mem.w.ret_redirect = Some(0x40);
        let ctrl = control(&latches, &ExecuteLatch::bubble(), &ex, &mem);
        assert!(ctrl.cancel_decode && ctrl.cancel_execute);
        assert_eq!(ctrl.m, Control::Bubble);

        mem.w.ret_redirect = None;
        mem.w.stat = Stat::Hlt;
        let ctrl = control(&latches, &ExecuteLatch::bubble(), &ex, &mem);
        assert!(ctrl.cancel_execute && !ctrl.fetch_committed());
    }
}
