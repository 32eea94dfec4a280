//! Legacy virtio-mmio block device: config registers plus the backing disk
//! buffer. The virtqueue walk itself (`disk_access`) lives on `Bus`, since it
//! is DMA against DRAM rather than a register access against this device.
use crate::exception::Exception;
use crate::primitives::{VIRTIO_BASE, WORD};

const VIRTIO_MAGIC: u64 = VIRTIO_BASE;
const VIRTIO_VERSION: u64 = VIRTIO_BASE + 0x004;
const VIRTIO_DEVICE_ID: u64 = VIRTIO_BASE + 0x008;
const VIRTIO_VENDOR_ID: u64 = VIRTIO_BASE + 0x00c;
const VIRTIO_DEVICE_FEATURES: u64 = VIRTIO_BASE + 0x010;
const VIRTIO_DRIVER_FEATURES: u64 = VIRTIO_BASE + 0x020;
const VIRTIO_GUEST_PAGE_SIZE: u64 = VIRTIO_BASE + 0x028;
const VIRTIO_QUEUE_SEL: u64 = VIRTIO_BASE + 0x030;
const VIRTIO_QUEUE_NUM_MAX: u64 = VIRTIO_BASE + 0x034;
const VIRTIO_QUEUE_NUM: u64 = VIRTIO_BASE + 0x038;
const VIRTIO_QUEUE_PFN: u64 = VIRTIO_BASE + 0x040;
const VIRTIO_QUEUE_NOTIFY: u64 = VIRTIO_BASE + 0x050;
const VIRTIO_STATUS: u64 = VIRTIO_BASE + 0x070;

/// Latch value meaning "no kick pending".
const NO_KICK: u32 = 0xFFFF_FFFF;

#[derive(Debug)]
pub struct Virtio {
    driver_features: u32,
    page_size: u32,
    queue_sel: u32,
    queue_num: u32,
    queue_pfn: u32,
    queue_notify: u32,
    status: u32,
    disk: Vec<u8>,
    id: u64,
}

impl Virtio {
    pub fn new(disk_image: Vec<u8>) -> Self {
        Self {
            driver_features: 0,
            page_size: 0,
            queue_sel: 0,
            queue_num: 0,
            queue_pfn: 0,
            queue_notify: NO_KICK,
            status: 0,
            disk: disk_image,
            id: 0,
        }
    }

    /// All MMIO accesses to this device are 4 bytes wide.
    pub fn load(&self, addr: u64, size: u8) -> Result<u64, Exception> {
        if size != WORD {
            return Err(Exception::LoadAccessFault(addr));
        }
        Ok(match addr {
            VIRTIO_MAGIC => 0x7472_6976,
            VIRTIO_VERSION => 0x1,
            VIRTIO_DEVICE_ID => 0x2,
            VIRTIO_VENDOR_ID => 0x554d_4551,
            VIRTIO_DEVICE_FEATURES => 0,
            VIRTIO_DRIVER_FEATURES => self.driver_features as u64,
            VIRTIO_QUEUE_NUM_MAX => 8,
            VIRTIO_QUEUE_PFN => self.queue_pfn as u64,
            VIRTIO_STATUS => self.status as u64,
            _ => 0,
        })
    }

    pub fn store(&mut self, addr: u64, size: u8, value: u64) -> Result<(), Exception> {
        if size != WORD {
            return Err(Exception::StoreAmoAccessFault(addr));
        }
        let value = value as u32;
        match addr {
            // Preserves an idiosyncrasy of the upstream guest driver: writes
            // to the device-features register are mirrored into
            // driver_features rather than being dropped.
            VIRTIO_DEVICE_FEATURES => self.driver_features = value,
            VIRTIO_GUEST_PAGE_SIZE => self.page_size = value,
            VIRTIO_QUEUE_SEL => self.queue_sel = value,
            VIRTIO_QUEUE_NUM => self.queue_num = value,
            VIRTIO_QUEUE_PFN => self.queue_pfn = value,
            VIRTIO_QUEUE_NOTIFY => self.queue_notify = value,
            VIRTIO_STATUS => self.status = value,
            _ => {}
        }
        Ok(())
    }

    /// Edge-triggered: true exactly once per kick.
    pub fn is_interrupting(&mut self) -> bool {
        if self.queue_notify != NO_KICK {
            self.queue_notify = NO_KICK;
            return true;
        }
        false
    }

    pub fn desc_addr(&self) -> u64 {
        self.queue_pfn as u64 * self.page_size as u64
    }

    pub fn read_disk(&self, addr: u64) -> u8 {
        self.disk[addr as usize]
    }

    pub fn write_disk(&mut self, addr: u64, value: u8) {
        self.disk[addr as usize] = value;
    }

    pub fn new_id(&mut self) -> u64 {
        self.id = self.id.wrapping_add(1);
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_registers_match_the_legacy_virtio_spec() {
        let virtio = Virtio::new(vec![]);
        assert_eq!(virtio.load(VIRTIO_MAGIC, WORD).unwrap(), 0x7472_6976);
        assert_eq!(virtio.load(VIRTIO_VERSION, WORD).unwrap(), 1);
        assert_eq!(virtio.load(VIRTIO_DEVICE_ID, WORD).unwrap(), 2);
        assert_eq!(virtio.load(VIRTIO_VENDOR_ID, WORD).unwrap(), 0x554d_4551);
        assert_eq!(virtio.load(VIRTIO_QUEUE_NUM_MAX, WORD).unwrap(), 8);
    }

    #[test]
    fn device_features_write_mirrors_into_driver_features() {
        let mut virtio = Virtio::new(vec![]);
        virtio.store(VIRTIO_DEVICE_FEATURES, WORD, 0x42).unwrap();
        assert_eq!(virtio.load(VIRTIO_DRIVER_FEATURES, WORD).unwrap(), 0x42);
    }

    #[test]
    fn is_interrupting_fires_once_per_kick() {
        let mut virtio = Virtio::new(vec![]);
        assert!(!virtio.is_interrupting());
        virtio.store(VIRTIO_QUEUE_NOTIFY, WORD, 3).unwrap();
        assert!(virtio.is_interrupting());
        assert!(!virtio.is_interrupting());
    }

    #[test]
    fn desc_addr_is_pfn_times_page_size() {
        let mut virtio = Virtio::new(vec![]);
        virtio.store(VIRTIO_QUEUE_PFN, WORD, 2).unwrap();
        virtio.store(VIRTIO_GUEST_PAGE_SIZE, WORD, 4096).unwrap();
        assert_eq!(virtio.desc_addr(), 8192);
    }

    #[test]
    fn new_id_is_monotonic() {
        let mut virtio = Virtio::new(vec![]);
        assert_eq!(virtio.new_id(), 1);
        assert_eq!(virtio.new_id(), 2);
    }

    #[test]
    fn disk_round_trips() {
        let mut virtio = Virtio::new(vec![0; 512]);
        virtio.write_disk(10, 0xAB);
        assert_eq!(virtio.read_disk(10), 0xAB);
    }

    #[test]
    fn non_word_access_faults() {
        let virtio = Virtio::new(vec![]);
        assert!(virtio.load(VIRTIO_MAGIC, crate::primitives::BYTE).is_err());
    }
}
