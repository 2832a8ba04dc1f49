//! A five-stage pipelined simulator for a small 64-bit load/store
//! instruction set, with branch and return prediction.
pub mod asm;
pub mod codec;
pub mod error;
pub mod isa;
pub mod logging;
pub mod pipeline;
pub mod utils;

pub use asm::{assemble, AssembleOption, Program};
pub use error::EngineError;
pub use isa::Stat;
pub use pipeline::{Engine, EngineOption};
pub use utils::{mem_diff, reg_diff};

// re-export
pub use clap_verbosity_flag as verbose;
