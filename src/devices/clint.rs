//! Core Local Interruptor: `mtime` and `mtimecmp`.
use crate::exception::Exception;
use crate::primitives::{CLINT_BASE, CLINT_MTIMECMP_OFFSET, CLINT_MTIME_OFFSET, DOUBLEWORD};

/// Two 64-bit registers. The emulator does not itself generate timer
/// interrupts from `mtime`/`mtimecmp`; the registers exist so guest timer
/// management code does not fault.
#[derive(Debug, Default)]
pub struct Clint {
    mtime: u64,
    mtimecmp: u64,
}

impl Clint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only 8-byte accesses are legal; any other width is an access fault.
    pub fn load(&self, addr: u64, size: u8) -> Result<u64, Exception> {
        if size != DOUBLEWORD {
            return Err(Exception::LoadAccessFault(addr));
        }
        Ok(match addr - CLINT_BASE {
            CLINT_MTIMECMP_OFFSET => self.mtimecmp,
            CLINT_MTIME_OFFSET => self.mtime,
            _ => 0,
        })
    }

    pub fn store(&mut self, addr: u64, size: u8, value: u64) -> Result<(), Exception> {
        if size != DOUBLEWORD {
            return Err(Exception::StoreAmoAccessFault(addr));
        }
        match addr - CLINT_BASE {
            CLINT_MTIMECMP_OFFSET => self.mtimecmp = value,
            CLINT_MTIME_OFFSET => self.mtime = value,
            _ => {}
        }
        Ok(())
    }
}
