//! RI (RDRAM Interface)
//!
//! Configuration of the RDRAM bus. Nothing downstream depends on these
//! values, so the registers are plain storage.
//!
//! ## Memory Map
//!
//! RI registers are memory-mapped at 0x04700000-0x0470001F:
//! - 0x04700000: RI_MODE
//! - 0x04700004: RI_CONFIG
//! - 0x04700008: RI_CURRENT_LOAD
//! - 0x0470000C: RI_SELECT
//! - 0x04700010: RI_REFRESH
//! - 0x04700014: RI_LATENCY
//! - 0x04700018: RI_RERROR
//! - 0x0470001C: RI_WERROR

use crate::memory::reg_index;
use rcp_core::mmio::masked_write;
use serde::{Deserialize, Serialize};

pub const RI_MODE_REG: usize = 0;
pub const RI_CONFIG_REG: usize = 1;
pub const RI_CURRENT_LOAD_REG: usize = 2;
pub const RI_SELECT_REG: usize = 3;
pub const RI_REFRESH_REG: usize = 4;
pub const RI_LATENCY_REG: usize = 5;
pub const RI_RERROR_REG: usize = 6;
pub const RI_WERROR_REG: usize = 7;
pub const RI_REGS_COUNT: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiController {
    pub regs: [u32; RI_REGS_COUNT],
}

impl RiController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poweron(&mut self) {
        self.regs = [0; RI_REGS_COUNT];
    }

    pub fn read_regs(&self, address: u32) -> u32 {
        self.regs.get(reg_index(address)).copied().unwrap_or(0)
    }

    pub fn write_regs(&mut self, address: u32, value: u32, mask: u32) {
        if let Some(reg) = self.regs.get_mut(reg_index(address)) {
            masked_write(reg, value, mask);
        }
    }
}
