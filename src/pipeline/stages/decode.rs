use crate::{
    isa::{
        reg_code::{RNONE, RSP},
        OpClass,
    },
    pipeline::{hazard::read_decode, latch::ExecuteLatch, state::MachineState},
};

/// Register read ports A and B for an instruction class.
pub fn source_registers(class: OpClass, ra: u8, rb: u8) -> (u8, u8) {
    use OpClass::*;
    let srca = match class {
        Cmov | Rmmovq | Opq | Pushq => ra,
        Popq | Ret => RSP,
        _ => RNONE,
    };
    let srcb = match class {
        Mrmovq | Rmmovq | Opq | Cmov => rb,
        Pushq | Popq | Call | Ret => RSP,
        _ => RNONE,
    };
    (srca, srcb)
}

pub fn decode(state: &MachineState) -> ExecuteLatch {
    let d = &state.latches.d;
    let w = &state.latches.w;
    let (srca, srcb) = source_registers(d.class, d.ra, d.rb);

    ExecuteLatch {
        seq: d.seq,
        class: d.class,
        ifun: d.ifun,
        ra: d.ra,
        rb: d.rb,
        valc: d.valc,
        valp: d.valp,
        vala: read_decode(srca, &state.arch.regs, w),
        valb: read_decode(srcb, &state.arch.regs, w),
        srca,
        srcb,
        imem_error: d.imem_error,
        instr_valid: d.instr_valid,
        spec: d.spec,
    }
}
