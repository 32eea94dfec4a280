//! The hart: integer registers, CSR file, privilege mode, Sv39 walker, and
//! the fetch/execute/trap surface the driver's main loop drives.
mod exec;

use crate::bus::Bus;
use crate::csr::{self, State as CsrState};
use crate::exception::Exception;
use crate::interrupt::Interrupt;
use crate::primitives::{DRAM_BASE, PAGE_SIZE, WORD};
use crate::reg::IntRegister;

/// Access kind a Sv39 walk is performed on behalf of, so a failed walk can
/// surface the right page-fault variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Instruction,
    Load,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    User,
    Supervisor,
    Machine,
}

impl Mode {
    fn encode(self) -> u64 {
        match self {
            Mode::User => 0,
            Mode::Supervisor => 1,
            Mode::Machine => 3,
        }
    }

    fn from_mstatus_mpp(bits: u64) -> Mode {
        match bits {
            0 => Mode::User,
            1 => Mode::Supervisor,
            _ => Mode::Machine,
        }
    }
}

#[derive(Debug)]
pub struct Cpu {
    pub regs: IntRegister,
    pub pc: u64,
    pub csr: CsrState,
    pub mode: Mode,
    pub bus: Bus,
    enable_paging: bool,
    pagetable: u64,
}

impl Cpu {
    pub fn new(code: Vec<u8>, disk_image: Vec<u8>) -> Self {
        Self {
            regs: IntRegister::new(),
            pc: DRAM_BASE,
            csr: CsrState::new(),
            mode: Mode::Machine,
            bus: Bus::new(code, disk_image),
            enable_paging: false,
            pagetable: 0,
        }
    }

    /// Translate `pc`, then fetch a 32-bit instruction word from the bus.
    pub fn fetch(&self) -> Result<u32, Exception> {
        let addr = self.translate(self.pc, AccessType::Instruction)?;
        self.bus
            .load(addr, WORD)
            .map(|v| v as u32)
            .map_err(|_| Exception::InstructionAccessFault(addr))
    }

    /// Decode and run one instruction. `self.pc` must already point past it
    /// (the driver increments `pc` by 4 between fetch and execute).
    pub fn execute(&mut self, inst: u32) -> Result<(), Exception> {
        exec::execute(self, inst)
    }

    pub fn read(&self, addr: u64, size: u8) -> Result<u64, Exception> {
        let pa = self.translate(addr, AccessType::Load)?;
        self.bus.load(pa, size)
    }

    pub fn write(&mut self, addr: u64, size: u8, value: u64) -> Result<(), Exception> {
        let pa = self.translate(addr, AccessType::Store)?;
        self.bus.store(pa, size, value)
    }

    /// Sv39 walk. Pass-through when paging is disabled. `pagetable` and
    /// `enable_paging` are a cache of `satp`, updated only by
    /// [`Cpu::update_paging`]; `satp` itself is never re-read here.
    pub fn translate(&self, addr: u64, access: AccessType) -> Result<u64, Exception> {
        if !self.enable_paging {
            return Ok(addr);
        }

        let page_fault = |addr: u64| match access {
            AccessType::Instruction => Exception::InstructionPageFault(addr),
            AccessType::Load => Exception::LoadPageFault(addr),
            AccessType::Store => Exception::StoreAmoPageFault(addr),
        };

        let vpn = [
            (addr >> 12) & 0x1ff,
            (addr >> 21) & 0x1ff,
            (addr >> 30) & 0x1ff,
        ];
        let offset = addr & 0xFFF;

        let mut a = self.pagetable;
        let mut i: i64 = 2;
        let pte;
        loop {
            let pte_addr = a + vpn[i as usize] * 8;
            let candidate = self
                .bus
                .load(pte_addr, crate::primitives::DOUBLEWORD)
                .map_err(|_| page_fault(addr))?;

            let v = candidate & 1 != 0;
            let r = (candidate >> 1) & 1 != 0;
            let w = (candidate >> 2) & 1 != 0;
            let x = (candidate >> 3) & 1 != 0;

            if !v || (!r && w) {
                return Err(page_fault(addr));
            }
            if r || x {
                pte = candidate;
                break;
            }
            i -= 1;
            if i < 0 {
                return Err(page_fault(addr));
            }
            let ppn = (candidate >> 10) & 0x0FFF_FFFF_FFFF;
            a = ppn * PAGE_SIZE;
        }

        let ppn1 = (pte >> 19) & 0x1ff;
        let ppn2 = (pte >> 28) & 0x3ff_ffff;

        let pa = match i {
            2 => (ppn2 << 30) | (vpn[1] << 21) | (vpn[0] << 12) | offset,
            1 => (ppn2 << 30) | (ppn1 << 21) | (vpn[0] << 12) | offset,
            _ => (((pte >> 10) & 0x0FFF_FFFF_FFFF) << 12) | offset,
        };
        Ok(pa)
    }

    /// Re-derive the paging cache from `satp` after a CSR write touches it.
    /// Call after every `csrrw`/`csrrs`/`csrrc` (and immediate variants).
    pub fn update_paging(&mut self, addr: csr::CsrAddress) {
        if addr != csr::SATP {
            return;
        }
        let satp = self.csr.read(csr::SATP);
        self.pagetable = (satp & ((1u64 << 44) - 1)) * PAGE_SIZE;
        self.enable_paging = (satp >> 60) == 8;
    }

    pub fn enable_paging(&self) -> bool {
        self.enable_paging
    }

    pub fn pagetable(&self) -> u64 {
        self.pagetable
    }

    /// `takeTrap`: deliver an exception or interrupt, delegating to
    /// supervisor mode when `medeleg`/`mideleg` names the cause.
    pub fn take_trap(&mut self, exception: Option<Exception>, interrupt: Option<Interrupt>) {
        let exception_pc = self.pc.wrapping_sub(4);
        let prev_mode = self.mode;

        let (cause, is_interrupt) = match (exception, interrupt) {
            (Some(e), _) => (e.cause(), false),
            (None, Some(i)) => (i.cause(), true),
            (None, None) => return,
        };

        let delegated = if is_interrupt {
            (self.csr.read(csr::MIDELEG) >> cause) & 1 != 0
        } else {
            (self.csr.read(csr::MEDELEG) >> cause) & 1 != 0
        };

        if prev_mode != Mode::Machine && delegated {
            self.mode = Mode::Supervisor;
            let stvec = self.csr.read(csr::STVEC);
            let base = stvec & !1;
            self.pc = base + if is_interrupt && (stvec & 1 != 0) { 4 * cause } else { 0 };
            self.csr.write(csr::SEPC, exception_pc & !1);
            self.csr.write(csr::SCAUSE, cause);
            self.csr.write(csr::STVAL, 0);

            let sie = self.csr.read_sstatus(csr::SSTATUS_SIE);
            self.csr.write_sstatus(csr::SSTATUS_SPIE, sie);
            self.csr.write_sstatus(csr::SSTATUS_SIE, 0);
            self.csr.write_sstatus(
                csr::SSTATUS_SPP,
                if prev_mode == Mode::Supervisor { 1 } else { 0 },
            );
        } else {
            self.mode = Mode::Machine;
            let mtvec = self.csr.read(csr::MTVEC);
            let base = mtvec & !1;
            self.pc = base + if is_interrupt && (mtvec & 1 != 0) { 4 * cause } else { 0 };
            self.csr.write(csr::MEPC, exception_pc & !1);
            self.csr.write(csr::MCAUSE, cause);
            self.csr.write(csr::MTVAL, 0);

            let mie = self.csr.read_mstatus(csr::MSTATUS_MIE);
            self.csr.write_mstatus(csr::MSTATUS_MPIE, mie);
            self.csr.write_mstatus(csr::MSTATUS_MIE, 0);
            self.csr.write_mstatus(csr::MSTATUS_MPP, prev_mode.encode());
        }
    }

    /// Poll devices for a pending interrupt, honouring the global-enable
    /// bits for the current mode, and service any virtio kick before
    /// latching its IRQ.
    pub fn check_pending_interrupt(&mut self) -> Result<Option<Interrupt>, Exception> {
        match self.mode {
            Mode::Machine if self.csr.read_mstatus(csr::MSTATUS_MIE) == 0 => return Ok(None),
            Mode::Supervisor if self.csr.read_sstatus(csr::SSTATUS_SIE) == 0 => return Ok(None),
            _ => {}
        }

        if let Some(irq) = self.bus.check_device_interrupt()? {
            self.bus.plic.claim(irq);
            let mip = self.csr.read(csr::MIP);
            self.csr.write(csr::MIP, mip | csr::SEIP_BIT);
        }

        let mie = self.csr.read(csr::MIE);
        let mip = self.csr.read(csr::MIP);
        let pending = mie & mip;

        let priority = [
            (csr::MEIP_BIT, Interrupt::MachineExternalInterrupt),
            (csr::MSIP_BIT, Interrupt::MachineSoftwareInterrupt),
            (csr::MTIP_BIT, Interrupt::MachineTimerInterrupt),
            (csr::SEIP_BIT, Interrupt::SupervisorExternalInterrupt),
            (csr::SSIP_BIT, Interrupt::SupervisorSoftwareInterrupt),
            (csr::STIP_BIT, Interrupt::SupervisorTimerInterrupt),
        ];

        for (bit, kind) in priority {
            if pending & bit != 0 {
                self.csr.write(csr::MIP, mip & !bit);
                return Ok(Some(kind));
            }
        }
        Ok(None)
    }
}
