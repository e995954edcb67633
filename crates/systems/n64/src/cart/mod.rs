//! The cartridge slot: ROM, SRAM, and routing of PI DMA by bus address.
//!
//! ## PI address decoding
//!
//! - 0x05000000-0x07FFFFFF: domain 2 address 1 / domain 1 address 1 (64DD, absent)
//! - 0x08000000-0x0FFFFFFF: domain 2 address 2 (SRAM)
//! - 0x10000000-0x1FCFFFFF: domain 1 address 2 (cartridge ROM)
//! - 0x1FD00000-          : domain 1 address 3 (ROM mirror)

pub mod rom;
pub mod sram;

use crate::backend::StorageBackend;
use crate::memory::{MemBase, MM_CART_ROM, MM_DOM2_ADDR2};
use crate::rcp::pi::{PiDmaHandler, PiDmaResolver};
use crate::N64Error;

pub use rom::CartRom;
pub use sram::Sram;

pub struct Cartridge {
    pub rom: Option<CartRom>,
    pub sram: Sram,
}

impl Cartridge {
    pub fn new(sram: Option<Box<dyn StorageBackend>>) -> Self {
        Self {
            rom: None,
            sram: Sram::new(sram),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.rom.is_some()
    }

    /// Insert a ROM image, replacing any previous one.
    pub fn insert(&mut self, mem: &mut MemBase, data: &[u8]) -> Result<(), N64Error> {
        self.eject(mem);
        self.rom = Some(CartRom::load(mem, data)?);
        Ok(())
    }

    pub fn eject(&mut self, mem: &mut MemBase) {
        if let Some(rom) = self.rom.take() {
            rom.unload(mem);
        }
    }

    /// The 4 KiB boot segment of the inserted ROM
    pub fn boot_segment<'a>(&self, mem: &'a MemBase) -> Option<&'a [u8]> {
        self.rom.as_ref()?.boot_segment(mem)
    }

    /// CPU read in the cartridge ROM window; 0 with no cartridge.
    pub fn read_rom(&mut self, mem: &MemBase, address: u32) -> u32 {
        match self.rom.as_mut() {
            Some(rom) => rom.read(mem, address),
            None => 0,
        }
    }

    /// CPU write to the ROM window; returns whether a cartridge latched it.
    pub fn write_rom(&mut self, value: u32, mask: u32) -> bool {
        match self.rom.as_mut() {
            Some(rom) => {
                rom.write(value, mask);
                true
            }
            None => false,
        }
    }
}

impl PiDmaResolver for Cartridge {
    fn pi_dma_handler(&mut self, cart_addr: u32) -> Option<&mut dyn PiDmaHandler> {
        if cart_addr >= MM_CART_ROM {
            self.rom.as_mut().map(|rom| rom as &mut dyn PiDmaHandler)
        } else if cart_addr >= MM_DOM2_ADDR2 {
            Some(&mut self.sram)
        } else {
            None
        }
    }
}
