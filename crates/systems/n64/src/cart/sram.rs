//! Battery-backed SRAM (PI domain 2, address 2)

use crate::backend::{ExecutionHooks, MemoryStorage, StorageBackend};
use crate::memory::{MemBase, RDRAM_MAX_SIZE};
use crate::rcp::pi::PiDmaHandler;

pub const SRAM_SIZE: usize = 0x8000;

pub struct Sram {
    storage: Box<dyn StorageBackend>,
}

impl Sram {
    /// Blank SRAM (all 0xff) when no storage is supplied.
    pub fn new(storage: Option<Box<dyn StorageBackend>>) -> Self {
        Self {
            storage: storage.unwrap_or_else(|| Box::new(MemoryStorage::new(SRAM_SIZE, 0xff))),
        }
    }

    pub fn data(&self) -> &[u8] {
        self.storage.data()
    }

    fn offset(&self, cart_addr: u32) -> usize {
        let len = self.storage.data().len().max(1);
        (cart_addr as usize & (SRAM_SIZE - 1)) % len
    }

    pub fn read(&self, address: u32) -> u32 {
        let off = self.offset(address & !3);
        match self.storage.data().get(off..off + 4) {
            Some(b) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            None => 0,
        }
    }

    pub fn write(&mut self, address: u32, value: u32, mask: u32) {
        let off = self.offset(address & !3);
        let Some(b) = self.storage.data_mut().get_mut(off..off + 4) else {
            return;
        };
        let old = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
        let new = (old & !mask) | (value & mask);
        b.copy_from_slice(&new.to_be_bytes());
        self.storage.save();
    }
}

impl PiDmaHandler for Sram {
    fn dma_read(
        &mut self,
        mem: &mut MemBase,
        _hooks: &mut dyn ExecutionHooks,
        dram_addr: u32,
        cart_addr: u32,
        length: u32,
    ) -> u32 {
        for i in 0..length {
            if dram_addr + i >= RDRAM_MAX_SIZE {
                break;
            }
            let off = self.offset(cart_addr + i);
            if let Some(b) = self.storage.data_mut().get_mut(off) {
                *b = mem.read_u8(dram_addr + i);
            }
        }
        self.storage.save();
        (length * 63) / 25
    }

    fn dma_write(
        &mut self,
        mem: &mut MemBase,
        _hooks: &mut dyn ExecutionHooks,
        dram_addr: u32,
        cart_addr: u32,
        length: u32,
    ) -> u32 {
        for i in 0..length {
            if dram_addr + i >= RDRAM_MAX_SIZE {
                break;
            }
            let off = self.offset(cart_addr + i);
            let byte = self.storage.data().get(off).copied().unwrap_or(0xff);
            mem.write_u8(dram_addr + i, byte);
        }
        (length * 63) / 25
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullHooks;
    use crate::config::BackingPreference;
    use crate::memory::MM_DOM2_ADDR2;

    #[test]
    fn test_blank_and_word_access() {
        let mut sram = Sram::new(None);
        assert_eq!(sram.read(MM_DOM2_ADDR2), 0xffff_ffff);
        sram.write(MM_DOM2_ADDR2 + 4, 0x1122_3344, 0x0000_ffff);
        assert_eq!(sram.read(MM_DOM2_ADDR2 + 4), 0xffff_3344);
        assert_eq!(&sram.data()[4..8], &[0xff, 0xff, 0x33, 0x44]);
    }

    #[test]
    fn test_dma_both_ways() {
        let mut mem = MemBase::allocate(BackingPreference::Compressed, None).unwrap();
        let mut sram = Sram::new(Some(Box::new(MemoryStorage::new(SRAM_SIZE, 0))));
        mem.bytes_mut(0x100, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);

        sram.dma_read(&mut mem, &mut NullHooks, 0x100, MM_DOM2_ADDR2 + 0x10, 4);
        assert_eq!(&sram.data()[0x10..0x14], &[1, 2, 3, 4]);

        sram.dma_write(&mut mem, &mut NullHooks, 0x200, MM_DOM2_ADDR2 + 0x10, 4);
        assert_eq!(mem.bytes(0x200, 4).unwrap(), &[1, 2, 3, 4]);
    }
}
