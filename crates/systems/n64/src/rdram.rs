//! RDRAM modules and their register windows.
//!
//! Up to eight 2 MiB modules. Each answers register accesses whose ID field
//! matches its DEVICE_ID, and DRAM accesses inside its 2 MiB slice. Writes
//! to the broadcast window (address bit 19) reach every module.
//!
//! During boot IPL3 calibrates each module's output current. Until that is
//! done, DRAM reads return garbage; this is modelled by swapping the DRAM
//! read handler while calibration runs.

use crate::memory::{MemBase, RDRAM_MAX_SIZE};
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::masked_write;
use serde::{Deserialize, Serialize};

pub const RDRAM_CONFIG_REG: usize = 0;
pub const RDRAM_DEVICE_ID_REG: usize = 1;
pub const RDRAM_DELAY_REG: usize = 2;
pub const RDRAM_MODE_REG: usize = 3;
pub const RDRAM_REF_INTERVAL_REG: usize = 4;
pub const RDRAM_REF_ROW_REG: usize = 5;
pub const RDRAM_RAS_INTERVAL_REG: usize = 6;
pub const RDRAM_MIN_INTERVAL_REG: usize = 7;
pub const RDRAM_ADDR_SELECT_REG: usize = 8;
pub const RDRAM_DEVICE_MANUF_REG: usize = 9;
pub const RDRAM_REGS_COUNT: usize = 10;

pub const RDRAM_MAX_MODULES_COUNT: usize = 8;
pub const RDRAM_MODULE_SIZE: u32 = 0x0020_0000;
pub const RDRAM_BCAST_ADDRESS_MASK: u32 = 0x0008_0000;

/// MODE bits read back inverted
const MODE_READ_XOR: u32 = 0xc0c0_c0c0;

/// Change to the DRAM read handler requested by a register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdramRemap {
    /// Current calibration started: install the corrupted-read handler
    Corrupted,
    /// Calibration finished: back to plain DRAM reads
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rdram {
    pub regs: [[u32; RDRAM_REGS_COUNT]; RDRAM_MAX_MODULES_COUNT],
    pub dram_size: u32,
}

fn rdram_reg(address: u32) -> usize {
    ((address & 0x3ff) >> 2) as usize
}

/// ID field of a register-window address
fn reg_id_field(address: u32) -> u32 {
    (address >> 10) & 0x1ff
}

/// ID a module answers to, as decoded from its DEVICE_ID register
fn device_id(reg: u32) -> u32 {
    (reg >> 2) & 0x1ff
}

/// Output current control value held in an (already un-inverted) MODE word
fn cc_value(mode: u32) -> u32 {
    ((mode & 0x0000_0040) >> 6)
        | ((mode & 0x0000_4000) >> 13)
        | ((mode & 0x0040_0000) >> 20)
        | ((mode & 0x0000_0080) >> 4)
        | ((mode & 0x0000_8000) >> 11)
        | ((mode & 0x0080_0000) >> 18)
}

impl Rdram {
    pub fn new(dram_size: u32) -> Self {
        Self {
            regs: [[0; RDRAM_REGS_COUNT]; RDRAM_MAX_MODULES_COUNT],
            dram_size: dram_size.min(RDRAM_MAX_SIZE),
        }
    }

    /// Modules actually fitted
    pub fn modules_count(&self) -> usize {
        (self.dram_size / RDRAM_MODULE_SIZE) as usize
    }

    pub fn poweron(&mut self, mem: &mut MemBase) {
        self.regs = [[0; RDRAM_REGS_COUNT]; RDRAM_MAX_MODULES_COUNT];
        let fitted = self.modules_count();
        for (id, module) in self.regs.iter_mut().take(fitted).enumerate() {
            module[RDRAM_CONFIG_REG] = 0xb519_0010;
            module[RDRAM_DEVICE_ID_REG] = (id as u32) << 2;
            module[RDRAM_DELAY_REG] = 0x230b_0223;
            module[RDRAM_MODE_REG] = 0xc4c0_c0c0;
            module[RDRAM_MIN_INTERVAL_REG] = 0x0040_c0e0;
            module[RDRAM_DEVICE_MANUF_REG] = 0x0000_0500;
        }
        mem.clear(0, self.dram_size as usize);
        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "RDRAM: {} modules, {} MiB",
                self.modules_count(),
                self.dram_size >> 20
            )
        });
    }

    fn module_with_id(&self, id: u32) -> Option<usize> {
        self.regs
            .iter()
            .take(self.modules_count())
            .position(|m| device_id(m[RDRAM_DEVICE_ID_REG]) == id)
    }

    pub fn read_regs(&self, address: u32) -> u32 {
        if address & RDRAM_BCAST_ADDRESS_MASK != 0 {
            log(LogCategory::Bus, LogLevel::Warn, || {
                format!("RDRAM: broadcast read at {:08X} unsupported", address)
            });
            return 0;
        }
        let reg = rdram_reg(address);
        let Some(module) = self.module_with_id(reg_id_field(address)) else {
            return 0;
        };
        let value = self.regs[module].get(reg).copied().unwrap_or(0);
        if reg == RDRAM_MODE_REG {
            value ^ MODE_READ_XOR
        } else {
            value
        }
    }

    /// Register write; may ask the caller to swap the DRAM read handler.
    pub fn write_regs(&mut self, address: u32, value: u32, mask: u32) -> Option<RdramRemap> {
        let reg = rdram_reg(address);
        if reg >= RDRAM_REGS_COUNT {
            return None;
        }

        if address & RDRAM_BCAST_ADDRESS_MASK != 0 {
            for module in self.regs.iter_mut() {
                masked_write(&mut module[reg], value, mask);
            }
            return match reg {
                RDRAM_DELAY_REG => Some(RdramRemap::Corrupted),
                RDRAM_MODE_REG => Some(RdramRemap::Plain),
                _ => None,
            };
        }

        if let Some(module) = self.module_with_id(reg_id_field(address)) {
            masked_write(&mut self.regs[module][reg], value, mask);
        }
        None
    }

    pub fn read_dram(&self, mem: &MemBase, address: u32) -> u32 {
        let addr = address & 0x03ff_ffff;
        if addr < self.dram_size {
            mem.read_u32(addr)
        } else {
            0
        }
    }

    pub fn write_dram(&self, mem: &mut MemBase, address: u32, value: u32, mask: u32) {
        let addr = address & 0x03ff_ffff;
        if addr < self.dram_size {
            mem.write_u32(addr, value, mask);
        }
    }

    /// DRAM read while calibration may be in progress.
    ///
    /// A module whose current control is still uncalibrated reads as 0.
    pub fn read_dram_corrupted(&self, mem: &MemBase, address: u32) -> u32 {
        let addr = address & 0x03ff_ffff;
        let Some(module) = self.module_with_id(addr / RDRAM_MODULE_SIZE) else {
            return 0;
        };
        let mode = self.regs[module][RDRAM_MODE_REG] ^ MODE_READ_XOR;
        if mode & 0x8000_0000 != 0 && cc_value(mode) == 0 {
            return 0;
        }
        self.read_dram(mem, address)
    }
}
