//! Physical address space: a pure decoder keyed by address range, routing
//! width-typed loads/stores to whichever device owns that range.
use tracing::trace;

use crate::devices::{Clint, Plic, Uart, Virtio};
use crate::dram::Dram;
use crate::exception::Exception;
use crate::primitives::{
    BYTE, CLINT_BASE, CLINT_SIZE, DOUBLEWORD, DRAM_BASE, DRAM_END, HALFWORD, PLIC_BASE, PLIC_SIZE,
    UART_BASE, UART_IRQ, UART_SIZE, VIRTIO_BASE, VIRTIO_DESC_SIZE, VIRTIO_IRQ, VIRTIO_SIZE, WORD,
};

#[derive(Debug)]
pub struct Bus {
    pub clint: Clint,
    pub plic: Plic,
    pub uart: Uart,
    pub virtio: Virtio,
    pub dram: Dram,
}

impl Bus {
    pub fn new(code: Vec<u8>, disk_image: Vec<u8>) -> Self {
        Self {
            clint: Clint::new(),
            plic: Plic::new(),
            uart: Uart::new(),
            virtio: Virtio::new(disk_image),
            dram: Dram::new(code),
        }
    }

    pub fn load(&self, addr: u64, size: u8) -> Result<u64, Exception> {
        if (CLINT_BASE..CLINT_BASE + CLINT_SIZE).contains(&addr) {
            self.clint.load(addr, size)
        } else if (PLIC_BASE..PLIC_BASE + PLIC_SIZE).contains(&addr) {
            self.plic.load(addr, size)
        } else if (UART_BASE..UART_BASE + UART_SIZE).contains(&addr) {
            self.uart.load(addr, size)
        } else if (VIRTIO_BASE..VIRTIO_BASE + VIRTIO_SIZE).contains(&addr) {
            self.virtio.load(addr, size)
        } else if (DRAM_BASE..DRAM_END).contains(&addr) {
            self.dram.load(addr, size)
        } else {
            Err(Exception::LoadAccessFault(addr))
        }
    }

    pub fn store(&mut self, addr: u64, size: u8, value: u64) -> Result<(), Exception> {
        if (CLINT_BASE..CLINT_BASE + CLINT_SIZE).contains(&addr) {
            self.clint.store(addr, size, value)
        } else if (PLIC_BASE..PLIC_BASE + PLIC_SIZE).contains(&addr) {
            self.plic.store(addr, size, value)
        } else if (UART_BASE..UART_BASE + UART_SIZE).contains(&addr) {
            self.uart.store(addr, size, value)
        } else if (VIRTIO_BASE..VIRTIO_BASE + VIRTIO_SIZE).contains(&addr) {
            self.virtio.store(addr, size, value)
        } else if (DRAM_BASE..DRAM_END).contains(&addr) {
            self.dram.store(addr, size, value)
        } else {
            Err(Exception::StoreAmoAccessFault(addr))
        }
    }

    /// Walk the single virtqueue and service one request. Any fault here is
    /// fatal to the emulation; there is no retry.
    pub fn disk_access(&mut self) -> Result<(), Exception> {
        trace!("servicing virtio disk request");
        let desc_addr = self.virtio.desc_addr();
        let avail_addr = desc_addr + 0x40;
        let used_addr = desc_addr + 4096;

        let offset = self.load(avail_addr.wrapping_add(1), HALFWORD)?;
        let index = self.load(
            avail_addr
                .wrapping_add(offset % crate::primitives::VIRTIO_DESC_NUM)
                .wrapping_add(2),
            HALFWORD,
        )?;

        let desc_addr0 = desc_addr + VIRTIO_DESC_SIZE * index;
        let addr0 = self.load(desc_addr0, DOUBLEWORD)?;
        let next0 = self.load(desc_addr0.wrapping_add(14), HALFWORD)?;

        let desc_addr1 = desc_addr + VIRTIO_DESC_SIZE * next0;
        let addr1 = self.load(desc_addr1, DOUBLEWORD)?;
        let len1 = self.load(desc_addr1.wrapping_add(8), WORD)?;
        let flags1 = self.load(desc_addr1.wrapping_add(12), HALFWORD)?;

        let sector = self.load(addr0.wrapping_add(8), DOUBLEWORD)?;

        if flags1 & 0x2 == 0 {
            // guest -> disk
            for i in 0..len1 {
                let data = self.load(addr1 + i, BYTE)?;
                self.virtio.write_disk(sector * 512 + i, data as u8);
            }
        } else {
            // disk -> guest
            for i in 0..len1 {
                let data = self.virtio.read_disk(sector * 512 + i);
                self.store(addr1 + i, BYTE, data as u64)?;
            }
        }

        let new_id = self.virtio.new_id();
        self.store(used_addr.wrapping_add(2), HALFWORD, new_id % 8)
    }

    /// UART wins over virtio. On a virtio kick, service the request before
    /// latching the IRQ. Returns the IRQ number if either device fired.
    pub fn check_device_interrupt(&mut self) -> Result<Option<u64>, Exception> {
        if self.uart.is_interrupting() {
            return Ok(Some(UART_IRQ));
        }
        if self.virtio.is_interrupting() {
            self.disk_access()?;
            return Ok(Some(VIRTIO_IRQ));
        }
        Ok(None)
    }
}
