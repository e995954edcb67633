//! Cartridge ROM (PI domain 1, address 2)

use crate::backend::ExecutionHooks;
use crate::memory::{MemBase, CART_ROM_MAX_SIZE, MM_CART_ROM, RDRAM_MAX_SIZE};
use crate::rcp::pi::PiDmaHandler;
use crate::N64Error;
use rcp_core::logging::{log, LogCategory, LogLevel};

/// N64 ROM magic number (big-endian format)
pub const N64_ROM_MAGIC: [u8; 4] = [0x80, 0x37, 0x12, 0x40];

const ROM_MIN_SIZE: usize = 0x1000;
const ROM_ADDR_MASK: u32 = CART_ROM_MAX_SIZE - 1;

const KSEG0: u32 = 0x8000_0000;
const KSEG1: u32 = 0xa000_0000;

/// Byte order of a ROM image as dumped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum ByteOrder {
    /// Native (.z64)
    BigEndian,
    /// Byte-swapped within words (.n64)
    LittleEndian,
    /// Byte-swapped within halfwords (.v64)
    MiddleEndian,
}

impl ByteOrder {
    pub fn detect(data: &[u8]) -> Result<Self, N64Error> {
        match data.get(0..4) {
            Some([0x80, 0x37, 0x12, 0x40]) => Ok(ByteOrder::BigEndian),
            Some([0x40, 0x12, 0x37, 0x80]) => Ok(ByteOrder::LittleEndian),
            Some([0x37, 0x80, 0x40, 0x12]) => Ok(ByteOrder::MiddleEndian),
            _ => Err(N64Error::InvalidRom(
                "Unrecognized N64 ROM format (bad magic)".to_string(),
            )),
        }
    }
}

/// Convert a ROM image of any supported byte order to big-endian.
pub fn normalize(data: &[u8]) -> Result<Vec<u8>, N64Error> {
    if data.len() < ROM_MIN_SIZE {
        return Err(N64Error::InvalidRom(
            "ROM too small (minimum 4KB)".to_string(),
        ));
    }
    if data.len() > CART_ROM_MAX_SIZE as usize {
        return Err(N64Error::RomTooLarge(data.len()));
    }

    let mut rom = data.to_vec();
    match ByteOrder::detect(data)? {
        ByteOrder::BigEndian => {}
        ByteOrder::LittleEndian => rom.chunks_exact_mut(4).for_each(|w| w.reverse()),
        ByteOrder::MiddleEndian => rom.chunks_exact_mut(2).for_each(|h| h.swap(0, 1)),
    }
    Ok(rom)
}

/// The ROM contents live in the cartridge window of [`MemBase`].
#[derive(Debug, Clone, Default)]
pub struct CartRom {
    size: u32,
    /// Value of the last CPU write, returned by the next read
    last_write: Option<u32>,
}

impl CartRom {
    /// Normalize `data` and copy it into the cartridge window.
    pub fn load(mem: &mut MemBase, data: &[u8]) -> Result<Self, N64Error> {
        let rom = normalize(data)?;
        let window = mem
            .bytes_mut(MM_CART_ROM, rom.len())
            .ok_or(N64Error::RomTooLarge(rom.len()))?;
        window.copy_from_slice(&rom);

        log(LogCategory::Dma, LogLevel::Info, || {
            format!("cartridge ROM loaded: {} KiB", rom.len() >> 10)
        });
        Ok(Self {
            size: rom.len() as u32,
            last_write: None,
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Wipe the image from the cartridge window.
    pub fn unload(self, mem: &mut MemBase) {
        mem.clear(MM_CART_ROM, self.size as usize);
    }

    /// The 4 KiB boot segment (header and IPL3)
    pub fn boot_segment<'a>(&self, mem: &'a MemBase) -> Option<&'a [u8]> {
        mem.bytes(MM_CART_ROM, ROM_MIN_SIZE)
    }

    pub fn read(&mut self, mem: &MemBase, address: u32) -> u32 {
        if let Some(value) = self.last_write.take() {
            return value;
        }
        mem.read_u32(MM_CART_ROM + (address & ROM_ADDR_MASK))
    }

    /// Latch a CPU write; the caller marks the PI busy.
    pub fn write(&mut self, value: u32, mask: u32) {
        self.last_write = Some(value & mask);
    }
}

impl PiDmaHandler for CartRom {
    fn dma_read(
        &mut self,
        _mem: &mut MemBase,
        _hooks: &mut dyn ExecutionHooks,
        dram_addr: u32,
        cart_addr: u32,
        length: u32,
    ) -> u32 {
        log(LogCategory::Stubs, LogLevel::Warn, || {
            format!(
                "PI DMA into cartridge ROM ignored: dram {:08X} cart {:08X} ({:X} bytes)",
                dram_addr, cart_addr, length
            )
        });
        (length * 63) / 25
    }

    fn dma_write(
        &mut self,
        mem: &mut MemBase,
        hooks: &mut dyn ExecutionHooks,
        dram_addr: u32,
        cart_addr: u32,
        length: u32,
    ) -> u32 {
        let cart_addr = cart_addr & ROM_ADDR_MASK;
        let in_dram = length.min(RDRAM_MAX_SIZE.saturating_sub(dram_addr));
        let from_rom = self.size.saturating_sub(cart_addr).min(in_dram);

        if from_rom != 0 {
            mem.copy(dram_addr, MM_CART_ROM + cart_addr, from_rom as usize);
        }
        if in_dram > from_rom {
            mem.clear(dram_addr + from_rom, (in_dram - from_rom) as usize);
        }

        hooks.invalidate_cached_code(KSEG0 + dram_addr, length);
        hooks.invalidate_cached_code(KSEG1 + dram_addr, length);

        (length * 63) / 25
    }
}
