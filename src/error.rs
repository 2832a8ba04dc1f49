use thiserror::Error;

/// Failures of the simulator itself. Unlike [`crate::isa::Stat`], these never
/// describe the simulated program: they mean the engine reached a state its
/// control logic should make impossible, or was handed an unusable image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("entry point {entry} is outside the program image of {len} bytes")]
    InvalidEntry { entry: i64, len: usize },

    #[error("data memory size {0} is outside 1..={max}", max = crate::pipeline::MAX_MEM_SIZE)]
    InvalidMemSize(usize),

    #[error("{0} underflow")]
    StackUnderflow(&'static str),

    #[error("{0} overflow")]
    StackOverflow(&'static str),

    #[error("{stack} out of sync: expected entry of instruction #{expected}, found #{found}")]
    OutOfSync {
        stack: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("register index {0:#x} reached write-back")]
    InvalidRegister(u8),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
