//! Synchronous trap causes (exceptions).

/// Every exception the core can raise. The payload, where present, is the
/// faulting address or raw instruction (kept for diagnostics; `stval`/`mtval`
/// are always written as zero, see `Cpu::take_trap`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Exception {
    #[error("instruction address misaligned at {0:#x}")]
    InstructionAddrMisaligned(u64),
    #[error("instruction access fault at {0:#x}")]
    InstructionAccessFault(u64),
    #[error("illegal instruction {0:#010x}")]
    IllegalInstruction(u64),
    #[error("breakpoint at {0:#x}")]
    Breakpoint(u64),
    #[error("load address misaligned at {0:#x}")]
    LoadAddrMisaligned(u64),
    #[error("load access fault at {0:#x}")]
    LoadAccessFault(u64),
    #[error("store/amo address misaligned at {0:#x}")]
    StoreAmoAddrMisaligned(u64),
    #[error("store/amo access fault at {0:#x}")]
    StoreAmoAccessFault(u64),
    #[error("environment call from u-mode")]
    EnvironmentCallFromUMode,
    #[error("environment call from s-mode")]
    EnvironmentCallFromSMode,
    #[error("environment call from m-mode")]
    EnvironmentCallFromMMode,
    #[error("instruction page fault at {0:#x}")]
    InstructionPageFault(u64),
    #[error("load page fault at {0:#x}")]
    LoadPageFault(u64),
    #[error("store/amo page fault at {0:#x}")]
    StoreAmoPageFault(u64),
}

impl Exception {
    /// The standard RISC-V `scause`/`mcause` exception code.
    pub fn cause(&self) -> u64 {
        match self {
            Exception::InstructionAddrMisaligned(_) => 0,
            Exception::InstructionAccessFault(_) => 1,
            Exception::IllegalInstruction(_) => 2,
            Exception::Breakpoint(_) => 3,
            Exception::LoadAddrMisaligned(_) => 4,
            Exception::LoadAccessFault(_) => 5,
            Exception::StoreAmoAddrMisaligned(_) => 6,
            Exception::StoreAmoAccessFault(_) => 7,
            Exception::EnvironmentCallFromUMode => 8,
            Exception::EnvironmentCallFromSMode => 9,
            Exception::EnvironmentCallFromMMode => 11,
            Exception::InstructionPageFault(_) => 12,
            Exception::LoadPageFault(_) => 13,
            Exception::StoreAmoPageFault(_) => 15,
        }
    }

    /// Fatal exceptions halt the emulator after the trap is recorded;
    /// everything else resumes execution at the trap vector.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Exception::InstructionAddrMisaligned(_)
                | Exception::InstructionAccessFault(_)
                | Exception::LoadAddrMisaligned(_)
                | Exception::LoadAccessFault(_)
                | Exception::StoreAmoAddrMisaligned(_)
                | Exception::StoreAmoAccessFault(_)
        )
    }
}
