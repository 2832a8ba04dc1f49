use crate::{
    isa::{
        arithmetic_compute, op_code,
        reg_code::{RNONE, RSP},
        ConditionCode, OpClass,
    },
    pipeline::{hazard::forward_execute, latch::MemoryLatch, state::MachineState},
};

const NEG_8: i64 = -8;

#[derive(Debug, Clone, Default)]
pub struct ExecuteOutput {
    pub m: MemoryLatch,
    /// New condition codes, for `OPq` only.
    pub cc: Option<ConditionCode>,
    /// A jump predicted taken turned out not taken.
    pub mispredicted: bool,
    /// Sequence number of the jump or call whose prediction resolves here.
    pub resolves_branch: Option<u64>,
}

pub fn execute(state: &MachineState) -> ExecuteOutput {
    use OpClass::*;
    let e = &state.latches.e;
    let (m, w) = (&state.latches.m, &state.latches.w);

    let vala = forward_execute(e.srca, e.vala, m, w);
    let valb = forward_execute(e.srcb, e.valb, m, w);

    let alua = match e.class {
        Cmov | Opq => vala,
        Irmovq | Rmmovq | Mrmovq => e.valc,
        Call | Pushq => NEG_8,
        Ret | Popq => 8,
        _ => 0,
    };
    let alub = match e.class {
        Rmmovq | Mrmovq | Opq | Call | Pushq | Ret | Popq => valb,
        _ => 0,
    };
    let alufun = if e.class == Opq { e.ifun } else { op_code::ADD };
    let vale = arithmetic_compute(alua, alub, alufun).unwrap_or(0);

    let cc = (e.class == Opq).then(|| {
        let mut cc = state.arch.cc;
        cc.set(alua, alub, vale, alufun);
        cc
    });

    let cnd = match e.class {
        Jxx | Cmov => state.arch.cc.test(e.ifun),
        _ => true,
    };

    let dste = match e.class {
        Cmov if cnd => e.rb,
        Irmovq | Opq => e.rb,
        Pushq | Popq | Call | Ret => RSP,
        _ => RNONE,
    };
    let dstm = match e.class {
        Mrmovq | Popq => e.ra,
        _ => RNONE,
    };

    ExecuteOutput {
        m: MemoryLatch {
            seq: e.seq,
            class: e.class,
            cnd,
            vale,
            vala,
            valp: e.valp,
            dste,
            dstm,
            imem_error: e.imem_error,
            instr_valid: e.instr_valid,
        },
        cc,
        mispredicted: e.class == Jxx && !cnd,
        resolves_branch: matches!(e.class, Jxx | Call).then_some(e.seq),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::{cond_fn, reg_code::*, MEM_SIZE};

    fn state_with(f: impl FnOnce(&mut MachineState)) -> MachineState {
        let mut state = MachineState::new(vec![0x00], 0, MEM_SIZE);
        f(&mut state);
        state
    }

    #[test]
    fn opq_forwards_and_sets_flags() {
        let state = state_with(|s| {
            s.latches.e.class = OpClass::Opq;
            s.latches.e.ifun = op_code::SUB;
            s.latches.e.srca = RAX;
            s.latches.e.srcb = RBX;
            s.latches.e.rb = RBX;
            s.latches.m.dste = RAX;
            s.latches.m.vale = 3;
            s.latches.w.dstm = RBX;
            s.latches.w.valm = 3;
        });
        let out = execute(&state);
        assert_eq!(out.m.vale, 0);
        assert_eq!(out.m.dste, RBX);
        let cc = out.cc.unwrap();
        assert!(cc.zf && !cc.sf && !cc.of);
    }

    #[test]
    fn stack_arithmetic() {
        let state = state_with(|s| {
            s.latches.e.class = OpClass::Call;
            s.latches.e.srcb = RSP;
            s.latches.e.valb = 64;
            s.latches.e.seq = 7;
        });
        let out = execute(&state);
        assert_eq!(out.m.vale, 56);
        assert_eq!(out.m.dste, RSP);
        assert_eq!(out.resolves_branch, Some(7));
        assert!(out.cc.is_none());
    }

    #[test]
    fn not_taken_jump_is_a_misprediction() {
        let state = state_with(|s| {
            s.latches.e.class = OpClass::Jxx;
            s.latches.e.ifun = cond_fn::NE;
            s.arch.cc.zf = true;
        });
        let out = execute(&state);
        assert!(out.mispredicted && !out.m.cnd);
    }

    #[test]
    fn failed_cmov_cancels_destination() {
        let state = state_with(|s| {
            s.latches.e.class = OpClass::Cmov;
            s.latches.e.ifun = cond_fn::E;
            s.latches.e.rb = RDX;
            s.latches.e.vala = 9;
        });
        let out = execute(&state);
        assert_eq!(out.m.dste, RNONE);
        assert_eq!(out.m.vale, 9);
        assert!(!out.mispredicted);
    }
}
