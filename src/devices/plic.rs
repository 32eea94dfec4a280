//! Platform-Level Interrupt Controller: four 32-bit registers, no priority
//! arbitration beyond "last claimed IRQ wins".
use crate::exception::Exception;
use crate::primitives::{
    PLIC_BASE, PLIC_PENDING_OFFSET, PLIC_SCLAIM_OFFSET, PLIC_SENABLE_OFFSET,
    PLIC_SPRIORITY_OFFSET, WORD,
};

#[derive(Debug, Default)]
pub struct Plic {
    pending: u32,
    senable: u32,
    spriority: u32,
    sclaim: u32,
}

impl Plic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only 4-byte accesses are legal.
    pub fn load(&self, addr: u64, size: u8) -> Result<u64, Exception> {
        if size != WORD {
            return Err(Exception::LoadAccessFault(addr));
        }
        Ok(match addr - PLIC_BASE {
            PLIC_PENDING_OFFSET => self.pending as u64,
            PLIC_SENABLE_OFFSET => self.senable as u64,
            PLIC_SPRIORITY_OFFSET => self.spriority as u64,
            PLIC_SCLAIM_OFFSET => self.sclaim as u64,
            _ => 0,
        })
    }

    pub fn store(&mut self, addr: u64, size: u8, value: u64) -> Result<(), Exception> {
        if size != WORD {
            return Err(Exception::StoreAmoAccessFault(addr));
        }
        let value = value as u32;
        match addr - PLIC_BASE {
            PLIC_PENDING_OFFSET => self.pending = value,
            PLIC_SENABLE_OFFSET => self.senable = value,
            PLIC_SPRIORITY_OFFSET => self.spriority = value,
            PLIC_SCLAIM_OFFSET => self.sclaim = value,
            _ => {}
        }
        Ok(())
    }

    /// Record that `irq` has been claimed. Called by `Bus::disk_access` and
    /// `Cpu::check_pending_interrupt` when a device interrupt is taken.
    pub fn claim(&mut self, irq: u64) {
        self.sclaim = irq as u32;
    }
}
