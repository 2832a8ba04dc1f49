use crate::{
    isa::{reg_code::RSP, ConditionCode, RegFile, Stat, REG_COUNT},
    utils::{get_i64, put_i64},
};

use super::{latch::Latches, speculate::BranchPredictor};

/// Data memory. Addresses in `[0, size)` are valid; an 8-byte group may
/// start at any of them, so the backing store extends 7 bytes past `size`.
#[derive(Debug, Clone)]
pub struct DataMemory {
    bytes: Vec<u8>,
    size: usize,
}

impl DataMemory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size + 7],
            size,
        }
    }

    /// Map an address to a byte offset, `None` if it is out of bounds.
    pub fn check(&self, addr: i64) -> Option<usize> {
        usize::try_from(addr).ok().filter(|&a| a < self.size)
    }

    pub fn read(&self, offset: usize) -> i64 {
        get_i64(&self.bytes[offset..offset + 8])
    }

    pub fn write(&mut self, offset: usize, val: i64) {
        put_i64(&mut self.bytes[offset..offset + 8], val)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Programmer-visible state.
#[derive(Debug, Clone)]
pub struct ArchState {
    pub regs: RegFile,
    pub mem: DataMemory,
    pub cc: ConditionCode,
    pub stat: Stat,
}

impl ArchState {
    pub fn new(mem_size: usize) -> Self {
        let mut regs = [0; REG_COUNT];
        regs[RSP as usize] = mem_size as i64 - 1;
        Self {
            regs,
            mem: DataMemory::new(mem_size),
            cc: ConditionCode::default(),
            stat: Stat::Aok,
        }
    }
}

/// Everything the stages read during one cycle. Stages only ever see a
/// shared reference; the engine alone applies their results.
#[derive(Debug, Clone)]
pub struct MachineState {
    pub image: Vec<u8>,
    pub arch: ArchState,
    pub latches: Latches,
    pub predictor: BranchPredictor,
    /// Sequence number the next fetched instruction gets.
    pub next_seq: u64,
}

impl MachineState {
    pub fn new(image: Vec<u8>, entry: i64, mem_size: usize) -> Self {
        let mut latches = Latches::default();
        latches.f.pred_pc = entry;
        Self {
            image,
            arch: ArchState::new(mem_size),
            latches,
            predictor: BranchPredictor::default(),
            next_seq: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_bounds() {
        let mut mem = DataMemory::new(64);
        assert_eq!(mem.check(-1), None);
        assert_eq!(mem.check(64), None);
        let last = mem.check(63).unwrap();
        mem.write(last, -5);
        assert_eq!(mem.read(last), -5);
        assert_eq!(mem.as_bytes().len(), 71);
    }

    #[test]
    fn stack_pointer_starts_at_top() {
        let arch = ArchState::new(1024);
        assert_eq!(arch.regs[RSP as usize], 1023);
        assert!(arch.stat.is_ok());
    }
}
