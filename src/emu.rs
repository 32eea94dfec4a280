//! The driver's main loop: owns the `Cpu` and repeatedly
//! fetch → execute → trap → poll-interrupts, as specified in the CPU
//! component design. Argument parsing and file loading are the caller's
//! job; `Emu` only needs the raw kernel and disk byte buffers.
use tracing::{debug, warn};

use crate::cpu::Cpu;
use crate::exception::Exception;
use crate::primitives::DRAM_BASE;

#[derive(Debug)]
pub struct Emu {
    pub cpu: Cpu,
}

impl Emu {
    pub fn new(kernel: Vec<u8>, disk_image: Vec<u8>) -> Self {
        Self {
            cpu: Cpu::new(kernel, disk_image),
        }
    }

    /// Reset the hart to its documented power-on state without reloading
    /// the kernel or disk image.
    pub fn restart(&mut self) {
        self.cpu.pc = DRAM_BASE;
        self.cpu.mode = crate::cpu::Mode::Machine;
        self.cpu.regs.reset();
        self.cpu.csr.reset();
    }

    /// Run until a fatal exception halts the hart. Returns the fatal
    /// exception, if any, for the caller to report.
    pub fn run(&mut self) -> Option<Exception> {
        loop {
            match self.cpu.fetch() {
                Ok(inst) => {
                    self.cpu.pc = self.cpu.pc.wrapping_add(4);
                    if let Err(e) = self.cpu.execute(inst) {
                        debug!(?e, "exception during execute");
                        let fatal = e.is_fatal();
                        self.cpu.take_trap(Some(e), None);
                        if fatal {
                            warn!(?e, pc = self.cpu.pc, "fatal exception halted the hart");
                            return Some(e);
                        }
                    }
                }
                Err(e) => {
                    debug!(?e, "exception during fetch");
                    let fatal = e.is_fatal();
                    self.cpu.take_trap(Some(e), None);
                    if fatal {
                        warn!(?e, pc = self.cpu.pc, "fatal exception halted the hart");
                        return Some(e);
                    }
                    continue;
                }
            }

            match self.cpu.check_pending_interrupt() {
                Ok(Some(interrupt)) => self.cpu.take_trap(None, Some(interrupt)),
                Ok(None) => {}
                Err(e) => {
                    warn!(?e, "fatal fault servicing a device interrupt");
                    return Some(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csr::MEPC;

    #[test]
    fn illegal_instruction_traps_to_machine_mode_and_resumes() {
        let data = vec![
            0x93, 0x0f, 0x50, 0x00, // addi x31, x0, 5
            0xaa, 0xaa, 0xaa, 0xaa, // illegal
            0x93, 0x0f, 0x50, 0x00, // addi x31, x0, 5
        ];
        let mut emu = Emu::new(data, vec![]);

        // Step 1: addi x31, x0, 5.
        let inst = emu.cpu.fetch().unwrap();
        emu.cpu.pc = emu.cpu.pc.wrapping_add(4);
        emu.cpu.execute(inst).unwrap();
        assert_eq!(emu.cpu.regs.read(31), 5);

        // Step 2: the illegal word traps to machine mode with mepc pointing
        // at the faulting instruction.
        let inst = emu.cpu.fetch().unwrap();
        emu.cpu.pc = emu.cpu.pc.wrapping_add(4);
        let err = emu.cpu.execute(inst).unwrap_err();
        emu.cpu.take_trap(Some(err), None);

        assert_eq!(emu.cpu.csr.read(MEPC), DRAM_BASE + 4);
    }

    #[test]
    fn restart_resets_pc_and_registers() {
        let mut emu = Emu::new(vec![], vec![]);
        emu.cpu.pc = 0xdead_beef;
        emu.cpu.regs.write(5, 42);
        emu.restart();
        assert_eq!(emu.cpu.pc, DRAM_BASE);
        assert_eq!(emu.cpu.regs.read(5), 0);
    }
}
