use crate::{
    error::{EngineError, Result},
    isa::{reg_code::RNONE, Stat, REG_COUNT},
    pipeline::latch::WriteBackLatch,
};

#[derive(Debug, Clone, Default)]
pub struct WriteBackOutput {
    /// Register writes in commit order. `dstM` goes first so that `dstE`
    /// wins when both name the same register, matching forwarding.
    pub writes: [Option<(usize, i64)>; 2],
    pub stat: Stat,
}

fn target(dst: u8) -> Result<Option<usize>> {
    if dst == RNONE {
        Ok(None)
    } else if (dst as usize) < REG_COUNT {
        Ok(Some(dst as usize))
    } else {
        Err(EngineError::InvalidRegister(dst))
    }
}

pub fn write_back(w: &WriteBackLatch) -> Result<WriteBackOutput> {
    let m_write = target(w.dstm)?.map(|r| (r, w.valm));
    let e_write = target(w.dste)?.map(|r| (r, w.vale));
    Ok(WriteBackOutput {
        writes: [m_write, e_write],
        stat: w.stat,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::reg_code::*;

    #[test]
    fn commits_both_ports() {
        let w = WriteBackLatch {
            dste: RSP,
            vale: 8,
            dstm: RAX,
            valm: 1,
            ..Default::default()
        };
        let out = write_back(&w).unwrap();
        assert_eq!(out.writes, [Some((0, 1)), Some((4, 8))]);
        assert_eq!(out.stat, Stat::Aok);
        assert_eq!(write_back(&WriteBackLatch::bubble()).unwrap().writes, [None, None]);
    }

    #[test]
    fn rejects_unnamed_slot() {
        let w = WriteBackLatch {
            dste: 0xf,
            ..Default::default()
        };
        assert_eq!(write_back(&w).unwrap_err(), EngineError::InvalidRegister(0xf));
    }
}
