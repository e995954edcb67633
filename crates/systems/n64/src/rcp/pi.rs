//! PI (Peripheral Interface) - cartridge bus DMA
//!
//! The PI moves data between RDRAM and whatever answers on the cartridge
//! bus: ROM, SRAM or the 64DD. Which device serves an address is decided by
//! the cartridge side through [`PiDmaResolver`]; the PI only validates the
//! request, starts the transfer and schedules its completion.
//!
//! ## Memory Map
//!
//! PI registers are memory-mapped at 0x04600000-0x04600033:
//! - 0x04600000: PI_DRAM_ADDR - RDRAM address
//! - 0x04600004: PI_CART_ADDR - Cartridge bus address
//! - 0x04600008: PI_RD_LEN - Length minus one; writing starts RDRAM -> cart
//! - 0x0460000C: PI_WR_LEN - Length minus one; writing starts cart -> RDRAM
//! - 0x04600010: PI_STATUS - Busy/interrupt (write: bit0 reset, bit1 ack)
//! - 0x04600014-0x04600020: PI_BSD_DOM1_{LAT,PWD,PGS,RLS}
//! - 0x04600024-0x04600030: PI_BSD_DOM2_{LAT,PWD,PGS,RLS}

use super::mi::{MiController, MI_INTR_PI};
use crate::backend::ExecutionHooks;
use crate::memory::{reg_index, MemBase};
use crate::r4300::cp0::Cp0;
use crate::r4300::interrupt::EventKind;
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::masked_write;
use serde::{Deserialize, Serialize};

pub const PI_DRAM_ADDR_REG: usize = 0;
pub const PI_CART_ADDR_REG: usize = 1;
pub const PI_RD_LEN_REG: usize = 2;
pub const PI_WR_LEN_REG: usize = 3;
pub const PI_STATUS_REG: usize = 4;
pub const PI_BSD_DOM1_LAT_REG: usize = 5;
pub const PI_BSD_DOM1_PWD_REG: usize = 6;
pub const PI_BSD_DOM1_PGS_REG: usize = 7;
pub const PI_BSD_DOM1_RLS_REG: usize = 8;
pub const PI_BSD_DOM2_LAT_REG: usize = 9;
pub const PI_BSD_DOM2_PWD_REG: usize = 10;
pub const PI_BSD_DOM2_PGS_REG: usize = 11;
pub const PI_BSD_DOM2_RLS_REG: usize = 12;
pub const PI_REGS_COUNT: usize = 13;

pub const PI_STATUS_DMA_BUSY: u32 = 0x01;
pub const PI_STATUS_IO_BUSY: u32 = 0x02;
pub const PI_STATUS_ERROR: u32 = 0x04;
pub const PI_STATUS_INTERRUPT: u32 = 0x08;

/// Cycles before a posted cartridge write completes
const IO_WRITE_CYCLES: u32 = 0x1000;

/// A device reachable through PI DMA.
///
/// Both directions return the transfer time in CPU cycles.
pub trait PiDmaHandler {
    /// RDRAM -> device
    fn dma_read(
        &mut self,
        mem: &mut MemBase,
        hooks: &mut dyn ExecutionHooks,
        dram_addr: u32,
        cart_addr: u32,
        length: u32,
    ) -> u32;

    /// Device -> RDRAM
    fn dma_write(
        &mut self,
        mem: &mut MemBase,
        hooks: &mut dyn ExecutionHooks,
        dram_addr: u32,
        cart_addr: u32,
        length: u32,
    ) -> u32;
}

/// Maps a cartridge bus address to the device serving it.
pub trait PiDmaResolver {
    fn pi_dma_handler(&mut self, cart_addr: u32) -> Option<&mut dyn PiDmaHandler>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToCart,
    ToDram,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiController {
    pub regs: [u32; PI_REGS_COUNT],
}

impl PiController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poweron(&mut self) {
        self.regs = [0; PI_REGS_COUNT];
    }

    pub fn status(&self) -> u32 {
        self.regs[PI_STATUS_REG]
    }

    pub fn read_regs(&self, address: u32) -> u32 {
        self.regs.get(reg_index(address)).copied().unwrap_or(0)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write_regs(
        &mut self,
        address: u32,
        value: u32,
        mask: u32,
        cp0: &mut Cp0,
        mi: &mut MiController,
        resolver: &mut dyn PiDmaResolver,
        mem: &mut MemBase,
        hooks: &mut dyn ExecutionHooks,
    ) {
        let reg = reg_index(address);
        match reg {
            PI_RD_LEN_REG => {
                masked_write(&mut self.regs[reg], value, mask);
                self.dma(Direction::ToCart, cp0, resolver, mem, hooks);
            }
            PI_WR_LEN_REG => {
                masked_write(&mut self.regs[reg], value, mask);
                self.dma(Direction::ToDram, cp0, resolver, mem, hooks);
            }
            PI_STATUS_REG => {
                let w = value & mask;
                if w & 0x2 != 0 {
                    mi.clear(MI_INTR_PI, cp0);
                }
                if w & 0x1 != 0 {
                    self.regs[PI_STATUS_REG] = 0;
                }
            }
            PI_BSD_DOM1_LAT_REG..=PI_BSD_DOM2_RLS_REG => {
                masked_write(&mut self.regs[reg], value & 0xff, mask);
            }
            _ if reg < PI_REGS_COUNT => masked_write(&mut self.regs[reg], value, mask),
            _ => {}
        }
    }

    fn dma(
        &mut self,
        direction: Direction,
        cp0: &mut Cp0,
        resolver: &mut dyn PiDmaResolver,
        mem: &mut MemBase,
        hooks: &mut dyn ExecutionHooks,
    ) {
        let cart_addr = self.regs[PI_CART_ADDR_REG] & !1;
        let dram_addr = self.regs[PI_DRAM_ADDR_REG] & 0x00ff_fffe;
        let len_reg = match direction {
            Direction::ToCart => PI_RD_LEN_REG,
            Direction::ToDram => PI_WR_LEN_REG,
        };
        let length = (self.regs[len_reg] & 0x00ff_fffe) + 2;

        let Some(handler) = resolver.pi_dma_handler(cart_addr) else {
            log(LogCategory::Dma, LogLevel::Warn, || {
                format!(
                    "Unknown PI DMA {:?}: dram {:08X} cart {:08X} ({:X} bytes)",
                    direction, dram_addr, cart_addr, length
                )
            });
            return;
        };

        let cycles = match direction {
            Direction::ToCart => handler.dma_read(mem, hooks, dram_addr, cart_addr, length),
            Direction::ToDram => handler.dma_write(mem, hooks, dram_addr, cart_addr, length),
        };

        log(LogCategory::Dma, LogLevel::Debug, || {
            format!(
                "PI DMA {:?}: dram {:08X} cart {:08X} ({:X} bytes, {} cycles)",
                direction, dram_addr, cart_addr, length, cycles
            )
        });

        self.regs[PI_STATUS_REG] |= PI_STATUS_DMA_BUSY;
        cp0.add_interrupt_event(EventKind::Pi, cycles);
    }

    /// A CPU write to the cartridge bus keeps the PI busy for a while.
    pub fn io_write_started(&mut self, cp0: &mut Cp0) {
        self.regs[PI_STATUS_REG] |= PI_STATUS_IO_BUSY;
        cp0.add_interrupt_event(EventKind::Pi, IO_WRITE_CYCLES);
    }

    /// PI event: the transfer finished.
    pub fn end_of_dma_event(&mut self, cp0: &mut Cp0, mi: &mut MiController) {
        self.regs[PI_STATUS_REG] &= !(PI_STATUS_DMA_BUSY | PI_STATUS_IO_BUSY);
        self.regs[PI_STATUS_REG] |= PI_STATUS_INTERRUPT;
        mi.raise(MI_INTR_PI, cp0);
    }
}
