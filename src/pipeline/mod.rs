//! The pipelined engine.
//!
//! One call to [`Engine::step`] is one clock cycle. All five stages are
//! evaluated against the state committed at the end of the previous cycle
//! (see [`stages`]); their results are then checked and applied in one
//! go, so a stage never observes another stage's output of the same cycle
//! and a failing cycle commits nothing.

pub mod hazard;
pub mod latch;
pub mod speculate;
pub mod stages;
pub mod state;

use crate::{
    error::{EngineError, Result},
    isa::{ConditionCode, RegFile, Stat, MEM_SIZE},
};

use self::{
    hazard::PipeControl,
    latch::{Control, FetchLatch, Latches},
    speculate::BranchPredictor,
    state::MachineState,
};

/// Largest data memory an engine accepts, in bytes.
pub const MAX_MEM_SIZE: usize = 1 << 30;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineOption {
    mem_size: usize,
}

impl Default for EngineOption {
    fn default() -> Self {
        Self { mem_size: MEM_SIZE }
    }
}

impl EngineOption {
    /// Size of data memory in bytes. The stack pointer starts at
    /// `mem_size - 1`.
    pub fn set_mem_size(mut self, mem_size: usize) -> Self {
        self.mem_size = mem_size;
        self
    }
}

pub struct Engine {
    state: MachineState,
    cycle_count: u64,
}

impl Engine {
    /// Load a program image and start fetching at `entry`.
    pub fn load(program: &[u8], entry: i64) -> Result<Self> {
        Self::load_with(program, entry, EngineOption::default())
    }

    pub fn load_with(program: &[u8], entry: i64, option: EngineOption) -> Result<Self> {
        if !(1..=MAX_MEM_SIZE).contains(&option.mem_size) {
            return Err(EngineError::InvalidMemSize(option.mem_size));
        }
        if usize::try_from(entry).map_or(true, |e| e >= program.len()) {
            return Err(EngineError::InvalidEntry {
                entry,
                len: program.len(),
            });
        }
        tracing::debug!(
            "load {} bytes, entry {:#x}, memory {} bytes",
            program.len(),
            entry,
            option.mem_size
        );
        Ok(Self {
            state: MachineState::new(program.to_vec(), entry, option.mem_size),
            cycle_count: 0,
        })
    }

    /// Advance one cycle and return the global status. Once the status is
    /// no longer [`Stat::Aok`] this does nothing.
    pub fn step(&mut self) -> Result<Stat> {
        if self.is_terminate() {
            return Ok(self.status());
        }
        tracing::trace!("cycle {}", self.cycle_count);
        let cur = &self.state;

        let fetched = stages::fetch(cur);
        let decoded = stages::decode(cur);
        let executed = stages::execute(cur);
        let memory = stages::memory(cur)?;
        let retired = stages::write_back(&cur.latches.w)?;
        let ctrl = hazard::control(&cur.latches, &decoded, &executed, &memory);

        let predictor = self.settle_speculation(&ctrl, &fetched, &executed, &memory)?;

        // nothing below can fail
        let cur = &self.state;
        let latches = Latches {
            f: FetchLatch {
                pred_pc: if ctrl.f == Control::Stall {
                    fetched.pc
                } else {
                    fetched.pred_pc
                },
            },
            d: ctrl.d.apply(&cur.latches.d, fetched.d),
            e: ctrl.e.apply(&cur.latches.e, decoded),
            m: ctrl.m.apply(&cur.latches.m, executed.m),
            w: memory.w,
        };
        let next_seq = cur.next_seq + ctrl.fetch_committed() as u64;

        let arch = &mut self.state.arch;
        for (reg, val) in retired.writes.into_iter().flatten() {
            tracing::info!("write register {:#x} <- {:#x}", reg, val);
            arch.regs[reg] = val;
        }
        if let Some((offset, val)) = memory.write {
            arch.mem.write(offset, val);
        }
        if let Some(cc) = executed.cc.filter(|_| !ctrl.cancel_execute) {
            arch.cc = cc;
        }
        arch.stat = retired.stat;

        self.state.latches = latches;
        self.state.predictor = predictor;
        self.state.next_seq = next_seq;
        self.cycle_count += 1;

        if !retired.stat.is_ok() {
            tracing::debug!(
                "terminate with status {:?} after {} cycles",
                retired.stat,
                self.cycle_count
            );
        }
        Ok(retired.stat)
    }

    /// Apply this cycle's speculation bookkeeping to a copy of the
    /// predictor. Squashed instructions are rolled back youngest first.
    fn settle_speculation(
        &self,
        ctrl: &PipeControl,
        fetched: &stages::FetchOutput,
        executed: &stages::ExecuteOutput,
        memory: &stages::MemoryOutput,
    ) -> Result<BranchPredictor> {
        let cur = &self.state;
        let mut predictor = cur.predictor.clone();

        if let Some(seq) = memory.resolves_return {
            predictor.resolve_return(seq)?;
        }
        if let Some(seq) = executed.resolves_branch.filter(|_| !ctrl.cancel_execute) {
            predictor.resolve_branch(seq)?;
        }
        if ctrl.cancel_decode {
            let d = &cur.latches.d;
            predictor.rollback(d.seq, d.spec)?;
        }
        if ctrl.cancel_execute {
            let e = &cur.latches.e;
            predictor.rollback(e.seq, e.spec)?;
        }
        if ctrl.fetch_committed() {
            predictor.record(fetched.d.seq, fetched.d.spec, cur.arch.cc)?;
        }
        Ok(predictor)
    }

    /// Step until the status is no longer [`Stat::Aok`] or `max_cycles`
    /// cycles have run in this call.
    pub fn run(&mut self, max_cycles: u64) -> Result<Stat> {
        for _ in 0..max_cycles {
            if self.step()? != Stat::Aok {
                break;
            }
        }
        Ok(self.status())
    }

    pub fn status(&self) -> Stat {
        self.state.arch.stat
    }

    pub fn is_terminate(&self) -> bool {
        !self.status().is_ok()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Value of register `code`, `None` if no slot has that code.
    pub fn register(&self, code: u8) -> Option<i64> {
        self.state.arch.regs.get(code as usize).copied()
    }

    pub fn registers(&self) -> &RegFile {
        &self.state.arch.regs
    }

    /// The 8-byte little-endian word at `addr`, `None` if out of bounds.
    pub fn memory_word(&self, addr: i64) -> Option<i64> {
        let mem = &self.state.arch.mem;
        mem.check(addr).map(|offset| mem.read(offset))
    }

    pub fn memory(&self) -> &[u8] {
        self.state.arch.mem.as_bytes()
    }

    pub fn condition_codes(&self) -> ConditionCode {
        self.state.arch.cc
    }

    pub fn latches(&self) -> &Latches {
        &self.state.latches
    }

    pub fn predictor(&self) -> &BranchPredictor {
        &self.state.predictor
    }
}
