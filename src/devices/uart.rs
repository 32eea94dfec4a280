//! 16550-subset UART.
//!
//! The receive side is fed by a background OS thread the CLI driver owns
//! (reading host stdin is out of scope for the core, see SPEC_FULL.md §1);
//! this module only owns the mutex/condvar and the register semantics that
//! thread drives through [`Uart::receive_byte`].
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};

use crate::exception::Exception;
use crate::primitives::{
    BYTE, UART_BASE, UART_IRQ, UART_LSR, UART_LSR_RX, UART_LSR_TX, UART_RHR_THR, UART_SIZE,
};

#[derive(Debug)]
struct Inner {
    regs: [u8; UART_SIZE as usize],
    interrupting: bool,
}

/// A cheaply-clonable handle to the UART's shared state. Both `Bus` and the
/// CLI's stdin-reader thread hold a clone of the same handle.
#[derive(Debug, Clone)]
pub struct Uart {
    shared: Arc<(Mutex<Inner>, Condvar)>,
}

impl Uart {
    /// The IRQ line this device is wired to on the PLIC.
    pub const IRQ: u64 = UART_IRQ;

    pub fn new() -> Self {
        let mut regs = [0u8; UART_SIZE as usize];
        regs[UART_LSR as usize] = UART_LSR_TX;
        Self {
            shared: Arc::new((
                Mutex::new(Inner {
                    regs,
                    interrupting: false,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Guest-visible operations are byte-width only.
    pub fn load(&self, addr: u64, size: u8) -> Result<u64, Exception> {
        if size != BYTE {
            return Err(Exception::LoadAccessFault(addr));
        }
        let offset = (addr - UART_BASE) as usize;
        let (lock, cvar) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        if offset == UART_RHR_THR as usize {
            let value = inner.regs[offset];
            inner.regs[UART_LSR as usize] &= !UART_LSR_RX;
            cvar.notify_all();
            Ok(value as u64)
        } else {
            Ok(inner.regs[offset] as u64)
        }
    }

    pub fn store(&self, addr: u64, size: u8, value: u64) -> Result<(), Exception> {
        if size != BYTE {
            return Err(Exception::StoreAmoAccessFault(addr));
        }
        let offset = (addr - UART_BASE) as usize;
        if offset == UART_RHR_THR as usize {
            let mut stdout = std::io::stdout();
            let _ = stdout.write_all(&[value as u8]);
            let _ = stdout.flush();
            return Ok(());
        }
        let (lock, _) = &*self.shared;
        lock.lock().unwrap().regs[offset] = value as u8;
        Ok(())
    }

    /// Atomically return and clear the interrupting flag.
    pub fn is_interrupting(&self) -> bool {
        let (lock, _) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        let was = inner.interrupting;
        inner.interrupting = false;
        was
    }

    /// Drive one received host byte through the pseudocode body of
    /// SPEC_FULL.md §4.4. Called by the CLI's stdin-reader thread.
    pub fn receive_byte(&self, byte: u8) {
        let (lock, cvar) = &*self.shared;
        let mut inner = lock.lock().unwrap();
        while inner.regs[UART_LSR as usize] & UART_LSR_RX != 0 {
            inner = cvar.wait(inner).unwrap();
        }
        inner.regs[UART_RHR_THR as usize] = byte;
        inner.interrupting = true;
        inner.regs[UART_LSR as usize] |= UART_LSR_RX;
    }
}

impl Default for Uart {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::WORD;

    #[test]
    fn tx_ready_on_reset() {
        let uart = Uart::new();
        let lsr = uart.load(UART_BASE + UART_LSR, BYTE).unwrap();
        assert_eq!(lsr & UART_LSR_TX as u64, UART_LSR_TX as u64);
    }

    #[test]
    fn receive_then_load_clears_rx_ready() {
        let uart = Uart::new();
        uart.receive_byte(b'A');
        let lsr = uart.load(UART_BASE + UART_LSR, BYTE).unwrap();
        assert_eq!(lsr & UART_LSR_RX as u64, UART_LSR_RX as u64);

        let byte = uart.load(UART_BASE + UART_RHR_THR, BYTE).unwrap();
        assert_eq!(byte, b'A' as u64);

        let lsr = uart.load(UART_BASE + UART_LSR, BYTE).unwrap();
        assert_eq!(lsr & UART_LSR_RX as u64, 0);
    }

    #[test]
    fn is_interrupting_is_edge_triggered() {
        let uart = Uart::new();
        assert!(!uart.is_interrupting());
        uart.receive_byte(b'x');
        assert!(uart.is_interrupting());
        assert!(!uart.is_interrupting());
    }

    #[test]
    fn non_byte_width_faults() {
        let uart = Uart::new();
        assert!(uart.load(UART_BASE, WORD).is_err());
        assert!(uart.store(UART_BASE, WORD, 0).is_err());
    }

    #[test]
    fn clone_shares_state() {
        let uart = Uart::new();
        let handle = uart.clone();
        handle.receive_byte(b'z');
        assert!(uart.is_interrupting());
    }
}
