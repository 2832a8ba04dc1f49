use crate::{
    error::Result,
    isa::{reg_code::RNONE, OpClass, Stat},
    pipeline::{latch::WriteBackLatch, state::MachineState},
};

#[derive(Debug, Clone, Default)]
pub struct MemoryOutput {
    pub w: WriteBackLatch,
    /// Pending store: byte offset and value.
    pub write: Option<(usize, i64)>,
    /// Sequence number of the `ret` whose prediction resolves here.
    pub resolves_return: Option<u64>,
}

pub fn memory(state: &MachineState) -> Result<MemoryOutput> {
    use OpClass::*;
    let m = &state.latches.m;
    let mem = &state.arch.mem;

    let addr = match m.class {
        Rmmovq | Pushq | Call | Mrmovq => Some(m.vale),
        Popq | Ret => Some(m.vala),
        _ => None,
    };
    let data = if m.class == Call { m.valp } else { m.vala };

    let mut dmem_error = false;
    let mut valm = 0;
    let mut write = None;
    if let Some(addr) = addr {
        match mem.check(addr) {
            Some(offset) => match m.class {
                Mrmovq | Popq | Ret => valm = mem.read(offset),
                _ => write = Some((offset, data)),
            },
            None => {
                tracing::debug!("data memory error at {:#x}", addr);
                dmem_error = true;
            }
        }
    }

    let stat = if m.imem_error {
        Stat::Adr
    } else if !m.instr_valid {
        Stat::Ins
    } else if dmem_error {
        Stat::Adr
    } else if m.class == Halt {
        Stat::Hlt
    } else {
        Stat::Aok
    };

    let mut ret_redirect = None;
    let mut resolves_return = None;
    if m.class == Ret {
        let predicted = state.predictor.expected_return(m.seq)?;
        resolves_return = Some(m.seq);
        if !dmem_error && predicted.target != valm {
            ret_redirect = Some(valm);
        }
    }

    // a faulting instruction writes nothing
    let (dste, dstm) = if matches!(stat, Stat::Adr | Stat::Ins) {
        (RNONE, RNONE)
    } else {
        (m.dste, m.dstm)
    };

    Ok(MemoryOutput {
        w: WriteBackLatch {
            seq: m.seq,
            class: m.class,
            stat,
            vale: m.vale,
            valm,
            dste,
            dstm,
            ret_redirect,
        },
        write,
        resolves_return,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::EngineError,
        isa::{reg_code::*, ConditionCode, MEM_SIZE},
        pipeline::speculate::SpecMark,
    };

    fn state_with(f: impl FnOnce(&mut MachineState)) -> MachineState {
        let mut state = MachineState::new(vec![0x00], 0, MEM_SIZE);
        f(&mut state);
        state
    }

    #[test]
    fn store_and_load() {
        let state = state_with(|s| {
            s.latches.m.class = OpClass::Rmmovq;
            s.latches.m.vale = 16;
            s.latches.m.vala = 42;
        });
        let out = memory(&state).unwrap();
        assert_eq!(out.write, Some((16, 42)));
        assert_eq!(out.w.stat, Stat::Aok);

        let state = state_with(|s| {
            s.arch.mem.write(16, 42);
            s.latches.m.class = OpClass::Mrmovq;
            s.latches.m.vale = 16;
            s.latches.m.dstm = RBX;
        });
        let out = memory(&state).unwrap();
        assert_eq!((out.w.valm, out.w.dstm, out.write), (42, RBX, None));
    }

    #[test]
    fn status_order() {
        let state = state_with(|s| {
            s.latches.m.class = OpClass::Popq;
            s.latches.m.vala = MEM_SIZE as i64;
            s.latches.m.dste = RSP;
            s.latches.m.dstm = RAX;
        });
        let out = memory(&state).unwrap();
        assert_eq!(out.w.stat, Stat::Adr);
        assert_eq!((out.w.dste, out.w.dstm), (RNONE, RNONE));

        let state = state_with(|s| {
            s.latches.m.instr_valid = false;
            s.latches.m.imem_error = true;
        });
        assert_eq!(memory(&state).unwrap().w.stat, Stat::Adr);

        let state = state_with(|s| s.latches.m.instr_valid = false);
        assert_eq!(memory(&state).unwrap().w.stat, Stat::Ins);

        let state = state_with(|s| s.latches.m.class = OpClass::Halt);
        assert_eq!(memory(&state).unwrap().w.stat, Stat::Hlt);
    }

    #[test]
    fn ret_checks_prediction() -> Result<()> {
        let ret_with_target = |target: i64, loaded: i64| -> Result<MemoryOutput> {
            let state = state_with(|s| {
                s.predictor
                    .record(
                        4,
                        SpecMark::Return {
                            popped: None,
                            target,
                        },
                        ConditionCode::default(),
                    )
                    .unwrap();
                s.arch.mem.write(100, loaded);
                s.latches.m.class = OpClass::Ret;
                s.latches.m.seq = 4;
                s.latches.m.vala = 100;
            });
            memory(&state)
        };
        let hit = ret_with_target(0x30, 0x30)?;
        assert_eq!(hit.w.ret_redirect, None);
        assert_eq!(hit.resolves_return, Some(4));

        let miss = ret_with_target(0x30, 0x50)?;
        assert_eq!(miss.w.ret_redirect, Some(0x50));

        // a ret without a queued prediction is an engine bug
        let orphan = state_with(|s| {
            s.latches.m.class = OpClass::Ret;
            s.latches.m.seq = 4;
        });
        assert_eq!(
            memory(&orphan).unwrap_err(),
            EngineError::StackUnderflow("predicted_return_queue")
        );
        Ok(())
    }
}
