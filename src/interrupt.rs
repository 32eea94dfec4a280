//! Asynchronous trap causes (interrupts).

/// The interrupt kinds `Cpu::check_pending_interrupt` can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupt {
    #[error("supervisor software interrupt")]
    SupervisorSoftwareInterrupt,
    #[error("machine software interrupt")]
    MachineSoftwareInterrupt,
    #[error("supervisor timer interrupt")]
    SupervisorTimerInterrupt,
    #[error("machine timer interrupt")]
    MachineTimerInterrupt,
    #[error("supervisor external interrupt")]
    SupervisorExternalInterrupt,
    #[error("machine external interrupt")]
    MachineExternalInterrupt,
}

impl Interrupt {
    /// The standard RISC-V interrupt cause number (matches the MIP/MIE bit position).
    pub fn cause(&self) -> u64 {
        match self {
            Interrupt::SupervisorSoftwareInterrupt => 1,
            Interrupt::MachineSoftwareInterrupt => 3,
            Interrupt::SupervisorTimerInterrupt => 5,
            Interrupt::MachineTimerInterrupt => 7,
            Interrupt::SupervisorExternalInterrupt => 9,
            Interrupt::MachineExternalInterrupt => 11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn causes_match_mip_bit_positions() {
        assert_eq!(Interrupt::SupervisorExternalInterrupt.cause(), 9);
        assert_eq!(Interrupt::MachineExternalInterrupt.cause(), 11);
    }
}
