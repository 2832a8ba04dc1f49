use crate::{
    codec::{self, FetchFault},
    pipeline::{
        latch::{DecodeLatch, Latches},
        state::MachineState,
    },
};

#[derive(Debug, Clone, Default)]
pub struct FetchOutput {
    /// Address fetched this cycle.
    pub pc: i64,
    pub d: DecodeLatch,
    /// Predicted address of the next instruction.
    pub pred_pc: i64,
}

/// Choose the fetch address: a corrected return target first, then the
/// fall-through of a jump that was not taken, then the prediction.
pub fn select_pc(latches: &Latches) -> i64 {
    if let Some(target) = latches.w.ret_redirect {
        target
    } else if latches.m.class == crate::isa::OpClass::Jxx && !latches.m.cnd {
        latches.m.valp
    } else {
        latches.f.pred_pc
    }
}

pub fn fetch(state: &MachineState) -> FetchOutput {
    let pc = select_pc(&state.latches);
    let seq = state.next_seq;

    match codec::decode(&state.image, pc) {
        Ok((inst, valp)) => {
            let (pred_pc, spec) = state.predictor.predict(seq, &inst, valp);
            tracing::trace!("fetch {:#x}: {} (next {:#x})", pc, inst, pred_pc);
            FetchOutput {
                pc,
                d: DecodeLatch {
                    seq,
                    class: inst.class,
                    ifun: inst.ifun,
                    ra: inst.ra,
                    rb: inst.rb,
                    valc: inst.valc,
                    valp,
                    imem_error: false,
                    instr_valid: true,
                    spec,
                },
                pred_pc,
            }
        }
        Err(fault) => {
            tracing::trace!("fetch {:#x}: {}", pc, fault);
            let valp = pc.wrapping_add(1);
            FetchOutput {
                pc,
                d: DecodeLatch {
                    seq,
                    valp,
                    imem_error: matches!(fault, FetchFault::Address(_)),
                    instr_valid: !matches!(fault, FetchFault::Invalid { .. }),
                    ..DecodeLatch::bubble()
                },
                pred_pc: valp,
            }
        }
    }
}
