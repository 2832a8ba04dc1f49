//! Static always-taken prediction and the speculation structures behind it.
//!
//! Fetch only *reads* these structures; the pushes and pops it decides on
//! are recorded in the instruction's [`SpecMark`] and applied by the engine
//! at commit. Resolution happens in order (branches in execute, returns in
//! memory) and consumes the oldest entry; squashing consumes the newest.
//! Every entry is tagged with the fetch sequence number of its instruction
//! and each pop checks the tag.

use std::collections::VecDeque;

use crate::{
    codec::Instruction,
    error::{EngineError, Result},
    isa::{ConditionCode, OpClass},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overflow {
    Fatal,
    DropOldest,
}

/// A bounded buffer used as a stack at one end and a queue at the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecStack<T> {
    name: &'static str,
    items: VecDeque<T>,
    cap: usize,
    overflow: Overflow,
}

impl<T> SpecStack<T> {
    fn new(name: &'static str, cap: usize, overflow: Overflow) -> Self {
        Self {
            name,
            items: VecDeque::with_capacity(cap),
            cap,
            overflow,
        }
    }

    pub fn push(&mut self, item: T) -> Result<()> {
        if self.items.len() == self.cap {
            match self.overflow {
                Overflow::Fatal => return Err(EngineError::StackOverflow(self.name)),
                Overflow::DropOldest => {
                    self.items.pop_front();
                }
            }
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Pop the newest entry.
    pub fn pop(&mut self) -> Result<T> {
        self.items
            .pop_back()
            .ok_or(EngineError::StackUnderflow(self.name))
    }

    /// Pop the oldest entry.
    pub fn pop_oldest(&mut self) -> Result<T> {
        self.items
            .pop_front()
            .ok_or(EngineError::StackUnderflow(self.name))
    }

    pub fn newest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Condition codes captured when a jump or call was predicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcEntry {
    pub seq: u64,
    pub cc: ConditionCode,
}

/// Return address pushed by a `call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RasEntry {
    pub seq: u64,
    pub addr: i64,
}

/// Target predicted for a `ret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetPrediction {
    pub seq: u64,
    pub target: i64,
}

/// Speculative bookkeeping an instruction performed when it was fetched,
/// carried in the latches so it can be undone if the instruction is
/// squashed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SpecMark {
    #[default]
    None,
    /// A jump or call pushed the condition codes; a call also pushed its
    /// return address.
    Branch { ret_addr: Option<RasEntry> },
    /// A return took `popped` off the call stack (if it was not empty) and
    /// queued `target` as its prediction.
    Return {
        popped: Option<RasEntry>,
        target: i64,
    },
}

/// Capacity of the call stack. Older entries are forgotten when it fills.
pub const CALL_STACK_DEPTH: usize = 64;
/// Capacity of the condition code stack and the return queue. Their
/// occupancy is bounded by the number of instructions in flight.
pub const IN_FLIGHT_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPredictor {
    cc_stack: SpecStack<CcEntry>,
    call_stack: SpecStack<RasEntry>,
    return_queue: SpecStack<RetPrediction>,
}

impl Default for BranchPredictor {
    fn default() -> Self {
        Self {
            cc_stack: SpecStack::new("cc_stack", IN_FLIGHT_DEPTH, Overflow::Fatal),
            call_stack: SpecStack::new("call_stack", CALL_STACK_DEPTH, Overflow::DropOldest),
            return_queue: SpecStack::new(
                "predicted_return_queue",
                IN_FLIGHT_DEPTH,
                Overflow::Fatal,
            ),
        }
    }
}

fn check_tag(stack: &'static str, expected: u64, found: u64) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(EngineError::OutOfSync {
            stack,
            expected,
            found,
        })
    }
}

impl BranchPredictor {
    /// Predict the address following `inst` (fetched with sequence number
    /// `seq`, falling through to `valp`).
    pub fn predict(&self, seq: u64, inst: &Instruction, valp: i64) -> (i64, SpecMark) {
        match inst.class {
            OpClass::Jxx => (inst.valc, SpecMark::Branch { ret_addr: None }),
            OpClass::Call => (
                inst.valc,
                SpecMark::Branch {
                    ret_addr: Some(RasEntry { seq, addr: valp }),
                },
            ),
            OpClass::Ret => {
                let popped = self.call_stack.newest().copied();
                let target = popped.map_or(valp, |e| e.addr);
                (target, SpecMark::Return { popped, target })
            }
            _ => (valp, SpecMark::None),
        }
    }

    /// Apply the bookkeeping of a fetched instruction.
    pub fn record(&mut self, seq: u64, mark: SpecMark, cc: ConditionCode) -> Result<()> {
        match mark {
            SpecMark::None => {}
            SpecMark::Branch { ret_addr } => {
                self.cc_stack.push(CcEntry { seq, cc })?;
                if let Some(entry) = ret_addr {
                    self.call_stack.push(entry)?;
                }
            }
            SpecMark::Return { popped, target } => {
                if let Some(entry) = popped {
                    let top = self.call_stack.pop()?;
                    check_tag("call_stack", entry.seq, top.seq)?;
                }
                self.return_queue.push(RetPrediction { seq, target })?;
            }
        }
        Ok(())
    }

    /// Undo [`BranchPredictor::record`] for a squashed instruction. Squashed
    /// instructions must be rolled back youngest first.
    pub fn rollback(&mut self, seq: u64, mark: SpecMark) -> Result<()> {
        match mark {
            SpecMark::None => {}
            SpecMark::Branch { ret_addr } => {
                if let Some(entry) = ret_addr {
                    let top = self.call_stack.pop()?;
                    check_tag("call_stack", entry.seq, top.seq)?;
                }
                let top = self.cc_stack.pop()?;
                check_tag("cc_stack", seq, top.seq)?;
            }
            SpecMark::Return { popped, .. } => {
                let top = self.return_queue.pop()?;
                check_tag("predicted_return_queue", seq, top.seq)?;
                if let Some(entry) = popped {
                    self.call_stack.push(entry)?;
                }
            }
        }
        Ok(())
    }

    /// A jump or call reached execute; drop its condition code snapshot.
    pub fn resolve_branch(&mut self, seq: u64) -> Result<CcEntry> {
        let entry = self.cc_stack.pop_oldest()?;
        check_tag("cc_stack", seq, entry.seq)?;
        Ok(entry)
    }

    /// The prediction a `ret` in the memory stage is checked against.
    pub fn expected_return(&self, seq: u64) -> Result<RetPrediction> {
        let entry = self
            .return_queue
            .oldest()
            .copied()
            .ok_or(EngineError::StackUnderflow("predicted_return_queue"))?;
        check_tag("predicted_return_queue", seq, entry.seq)?;
        Ok(entry)
    }

    /// A `ret` left the memory stage; drop its prediction.
    pub fn resolve_return(&mut self, seq: u64) -> Result<RetPrediction> {
        let entry = self.return_queue.pop_oldest()?;
        check_tag("predicted_return_queue", seq, entry.seq)?;
        Ok(entry)
    }

    pub fn cc_stack(&self) -> &SpecStack<CcEntry> {
        &self.cc_stack
    }

    pub fn call_stack(&self) -> &SpecStack<RasEntry> {
        &self.call_stack
    }

    pub fn return_queue(&self) -> &SpecStack<RetPrediction> {
        &self.return_queue
    }

    /// Whether no speculation is outstanding and no return address is
    /// pending.
    pub fn is_idle(&self) -> bool {
        self.cc_stack.is_empty() && self.call_stack.is_empty() && self.return_queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::reg_code::RNONE;

    fn inst(class: OpClass, valc: i64) -> Instruction {
        Instruction::new(class, 0, RNONE, RNONE, valc)
    }

    #[test]
    fn call_then_ret_predicts_return_address() -> Result<()> {
        let mut bp = BranchPredictor::default();
        let cc = ConditionCode::default();

        let (pred, mark) = bp.predict(1, &inst(OpClass::Call, 0x40), 9);
        assert_eq!(pred, 0x40);
        bp.record(1, mark, cc)?;

        let (pred, mark) = bp.predict(2, &inst(OpClass::Ret, 0), 0x41);
        assert_eq!(pred, 9);
        bp.record(2, mark, cc)?;
        assert!(bp.call_stack().is_empty());

        bp.resolve_branch(1)?;
        assert_eq!(bp.expected_return(2)?.target, 9);
        bp.resolve_return(2)?;
        assert!(bp.is_idle());
        Ok(())
    }

    #[test]
    fn rollback_restores_state() -> Result<()> {
        let mut bp = BranchPredictor::default();
        let cc = ConditionCode::default();
        let (_, call) = bp.predict(1, &inst(OpClass::Call, 0x40), 9);
        bp.record(1, call, cc)?;

        // wrong path: jump, then a ret consuming the call's entry
        let (_, jump) = bp.predict(2, &inst(OpClass::Jxx, 0x80), 0x49);
        bp.record(2, jump, cc)?;
        let (_, ret) = bp.predict(3, &inst(OpClass::Ret, 0), 0x81);
        bp.record(3, ret, cc)?;
        assert!(bp.call_stack().is_empty());

        bp.rollback(3, ret)?;
        bp.rollback(2, jump)?;
        assert_eq!(bp.call_stack().newest(), Some(&RasEntry { seq: 1, addr: 9 }));
        assert_eq!(bp.cc_stack().len(), 1);
        assert!(bp.return_queue().is_empty());
        Ok(())
    }

    #[test]
    fn empty_call_stack_predicts_fall_through() {
        let bp = BranchPredictor::default();
        let (pred, mark) = bp.predict(1, &inst(OpClass::Ret, 0), 5);
        assert_eq!(pred, 5);
        assert_eq!(
            mark,
            SpecMark::Return {
                popped: None,
                target: 5
            }
        );
    }

    #[test]
    fn invariant_violations() {
        let mut bp = BranchPredictor::default();
        assert_eq!(
            bp.resolve_branch(1),
            Err(EngineError::StackUnderflow("cc_stack"))
        );
        assert_eq!(
            bp.resolve_return(1),
            Err(EngineError::StackUnderflow("predicted_return_queue"))
        );

        let cc = ConditionCode::default();
        bp.record(1, SpecMark::Branch { ret_addr: None }, cc).unwrap();
        bp.record(2, SpecMark::Branch { ret_addr: None }, cc).unwrap();
        assert_eq!(
            bp.resolve_branch(2),
            Err(EngineError::OutOfSync {
                stack: "cc_stack",
                expected: 2,
                found: 1
            })
        );

        let mut full = BranchPredictor::default();
        for seq in 0..IN_FLIGHT_DEPTH as u64 {
            full.record(seq, SpecMark::Branch { ret_addr: None }, cc).unwrap();
        }
        assert_eq!(
            full.record(99, SpecMark::Branch { ret_addr: None }, cc),
            Err(EngineError::StackOverflow("cc_stack"))
        );
    }

    #[test]
    fn call_stack_forgets_oldest() -> Result<()> {
        let mut bp = BranchPredictor::default();
        let cc = ConditionCode::default();
        for seq in 0..=CALL_STACK_DEPTH as u64 {
            let (_, mark) = bp.predict(seq, &inst(OpClass::Call, 0), seq as i64);
            bp.record(seq, mark, cc)?;
            bp.resolve_branch(seq)?;
        }
        assert_eq!(bp.call_stack().len(), CALL_STACK_DEPTH);
        assert_eq!(bp.call_stack().oldest().map(|e| e.seq), Some(1));
        Ok(())
    }
}
