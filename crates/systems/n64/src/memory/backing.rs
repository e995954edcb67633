//! Host storage for every byte-addressable physical window.
//!
//! RDRAM, cartridge ROM, RSP DMEM/IMEM, the 64DD IPL ROM and PIF ROM/RAM all
//! live in one zeroed buffer. Two layouts exist:
//!
//! - **Full**: a 512 MiB buffer indexed directly by physical address. Pages
//!   never touched by the guest are never committed by the host.
//! - **Compressed**: the windows packed back to back (~76 MiB).
//!
//! Controllers only ever go through [`MemBase::translate`], so both layouts
//! behave identically. Bytes are stored in guest (big-endian) order.

use super::{
    CART_ROM_MAX_SIZE, DD_ROM_MAX_SIZE, MM_CART_ROM, MM_DD_ROM, MM_PIF_MEM, MM_RDRAM_DRAM,
    MM_RSP_MEM, PIF_RAM_SIZE, PIF_ROM_SIZE, RDRAM_MAX_SIZE, SP_MEM_SIZE,
};
use crate::config::BackingPreference;
use crate::N64Error;
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::masked_write;

pub const FULL_SIZE: usize = 0x2000_0000;

const MB_RDRAM_DRAM: usize = 0;
const MB_CART_ROM: usize = MB_RDRAM_DRAM + RDRAM_MAX_SIZE as usize;
const MB_RSP_MEM: usize = MB_CART_ROM + CART_ROM_MAX_SIZE as usize;
const MB_DD_ROM: usize = MB_RSP_MEM + SP_MEM_SIZE as usize;
const MB_PIF_MEM: usize = MB_DD_ROM + DD_ROM_MAX_SIZE as usize;
pub const COMPRESSED_SIZE: usize = MB_PIF_MEM + (PIF_ROM_SIZE + PIF_RAM_SIZE) as usize;

/// Zeroed allocation that reports failure instead of aborting.
fn try_alloc_zeroed(size: usize) -> Option<Box<[u8]>> {
    if size == 0 {
        return None;
    }
    let mut probe: Vec<u8> = Vec::new();
    probe.try_reserve_exact(size).ok()?;
    drop(probe);
    // `vec!` of zeroes goes through the zeroed allocator, so untouched pages
    // stay uncommitted
    Some(vec![0u8; size].into_boxed_slice())
}

pub enum MemBase {
    Full(Box<[u8]>),
    Compressed(Box<[u8]>),
}

impl MemBase {
    /// Allocate according to `preference`, never exceeding `cap` bytes.
    ///
    /// `Auto` tries the full layout first and falls back to the compressed
    /// one. Failure of every allowed layout is fatal for the device.
    pub fn allocate(preference: BackingPreference, cap: Option<usize>) -> Result<Self, N64Error> {
        let fits = |size: usize| cap.map_or(true, |cap| size <= cap);

        if preference != BackingPreference::Compressed && fits(FULL_SIZE) {
            if let Some(buf) = try_alloc_zeroed(FULL_SIZE) {
                return Ok(MemBase::Full(buf));
            }
            log(LogCategory::Bus, LogLevel::Warn, || {
                format!("full {:#x} byte backing unavailable", FULL_SIZE)
            });
        }

        if preference != BackingPreference::Full && fits(COMPRESSED_SIZE) {
            if let Some(buf) = try_alloc_zeroed(COMPRESSED_SIZE) {
                log(LogCategory::Bus, LogLevel::Info, || {
                    "using compressed physical backing".to_string()
                });
                return Ok(MemBase::Compressed(buf));
            }
        }

        Err(N64Error::BackingAllocation {
            requested: match preference {
                BackingPreference::Compressed => COMPRESSED_SIZE,
                _ => FULL_SIZE,
            },
        })
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, MemBase::Compressed(_))
    }

    /// Offset into the backing buffer for a physical address.
    pub fn translate(&self, address: u32) -> Option<usize> {
        match self {
            MemBase::Full(_) => ((address as usize) < FULL_SIZE).then_some(address as usize),
            MemBase::Compressed(_) => Self::compressed_offset(address),
        }
    }

    fn compressed_offset(address: u32) -> Option<usize> {
        let within = |base: u32, size: u32| address.wrapping_sub(base) < size;

        if within(MM_RDRAM_DRAM, RDRAM_MAX_SIZE) {
            Some(MB_RDRAM_DRAM + (address - MM_RDRAM_DRAM) as usize)
        } else if within(MM_CART_ROM, CART_ROM_MAX_SIZE) {
            Some(MB_CART_ROM + (address - MM_CART_ROM) as usize)
        } else if within(MM_PIF_MEM, PIF_ROM_SIZE + PIF_RAM_SIZE) {
            Some(MB_PIF_MEM + (address - MM_PIF_MEM) as usize)
        } else if within(MM_RSP_MEM, SP_MEM_SIZE) {
            Some(MB_RSP_MEM + (address - MM_RSP_MEM) as usize)
        } else if within(MM_DD_ROM, DD_ROM_MAX_SIZE) {
            Some(MB_DD_ROM + (address - MM_DD_ROM) as usize)
        } else {
            None
        }
    }

    fn buf(&self) -> &[u8] {
        match self {
            MemBase::Full(b) | MemBase::Compressed(b) => b,
        }
    }

    fn buf_mut(&mut self) -> &mut [u8] {
        match self {
            MemBase::Full(b) | MemBase::Compressed(b) => b,
        }
    }

    /// `len` bytes starting at `address`, if the whole range is backed.
    ///
    /// Ranges must stay inside one window; the compressed layout packs
    /// windows back to back.
    pub fn bytes(&self, address: u32, len: usize) -> Option<&[u8]> {
        let start = self.translate(address)?;
        self.buf().get(start..start.checked_add(len)?)
    }

    pub fn bytes_mut(&mut self, address: u32, len: usize) -> Option<&mut [u8]> {
        let start = self.translate(address)?;
        self.buf_mut().get_mut(start..start.checked_add(len)?)
    }

    pub fn read_u8(&self, address: u32) -> u8 {
        self.translate(address)
            .and_then(|off| self.buf().get(off).copied())
            .unwrap_or(0)
    }

    pub fn write_u8(&mut self, address: u32, value: u8) {
        if let Some(off) = self.translate(address) {
            if let Some(b) = self.buf_mut().get_mut(off) {
                *b = value;
            }
        }
    }

    /// Aligned word read; unbacked addresses read as zero.
    pub fn read_u32(&self, address: u32) -> u32 {
        self.bytes(address & !3, 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .unwrap_or(0)
    }

    /// Aligned masked word write; unbacked addresses are ignored.
    pub fn write_u32(&mut self, address: u32, value: u32, mask: u32) {
        if let Some(b) = self.bytes_mut(address & !3, 4) {
            let mut word = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            masked_write(&mut word, value, mask);
            b.copy_from_slice(&word.to_be_bytes());
        }
    }

    /// Copy `len` bytes between two backed ranges (may be different windows).
    pub fn copy(&mut self, dst: u32, src: u32, len: usize) -> bool {
        let (Some(s), Some(d)) = (self.translate(src), self.translate(dst)) else {
            return false;
        };
        let buf = self.buf_mut();
        if s.checked_add(len).map_or(true, |e| e > buf.len())
            || d.checked_add(len).map_or(true, |e| e > buf.len())
        {
            return false;
        }
        buf.copy_within(s..s + len, d);
        true
    }

    /// Zero a backed range.
    pub fn clear(&mut self, address: u32, len: usize) {
        if let Some(b) = self.bytes_mut(address, len) {
            b.fill(0);
        }
    }
}
