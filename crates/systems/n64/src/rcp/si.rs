//! SI (Serial Interface) - DMA between RDRAM and PIF RAM
//!
//! ## Memory Map
//!
//! SI registers are memory-mapped at 0x04800000-0x0480001B:
//! - 0x04800000: SI_DRAM_ADDR - RDRAM address of the 64-byte block
//! - 0x04800004: SI_PIF_ADDR_RD64B - Writing starts PIF RAM -> RDRAM
//! - 0x04800010: SI_PIF_ADDR_WR64B - Writing starts RDRAM -> PIF RAM
//! - 0x04800018: SI_STATUS - Busy/error/interrupt (write acknowledges)
//!
//! Only one transfer may be in flight. A second request, or one that does
//! not target PIF RAM, is refused with DMA_ERROR.

use super::mi::{MiController, MI_INTR_SI};
use crate::memory::{reg_index, MemBase, PIF_RAM_SIZE};
use crate::pif::{Pif, PIF_RAM_ADDR};
use crate::r4300::cp0::Cp0;
use crate::r4300::interrupt::EventKind;
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::masked_write;
use serde::{Deserialize, Serialize};

pub const SI_DRAM_ADDR_REG: usize = 0;
pub const SI_PIF_ADDR_RD64B_REG: usize = 1;
pub const SI_PIF_ADDR_WR64B_REG: usize = 4;
pub const SI_STATUS_REG: usize = 6;
pub const SI_REGS_COUNT: usize = 7;

pub const SI_STATUS_DMA_BUSY: u32 = 0x0001;
pub const SI_STATUS_IO_BUSY: u32 = 0x0002;
pub const SI_STATUS_DMA_ERROR: u32 = 0x0008;
pub const SI_STATUS_INTERRUPT: u32 = 0x1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiDmaDir {
    #[default]
    NoDma,
    /// PIF RAM -> RDRAM
    Read,
    /// RDRAM -> PIF RAM
    Write,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiController {
    pub regs: [u32; SI_REGS_COUNT],
    pub dma_dir: SiDmaDir,
    /// Cycles from request to completion, before jitter
    pub dma_duration: u32,
}

impl SiController {
    pub fn new(dma_duration: u32) -> Self {
        Self {
            dma_duration,
            ..Self::default()
        }
    }

    pub fn poweron(&mut self) {
        self.regs = [0; SI_REGS_COUNT];
        self.dma_dir = SiDmaDir::NoDma;
    }

    pub fn status(&self) -> u32 {
        self.regs[SI_STATUS_REG]
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
        pif: &mut Pif,
        mem: &mut MemBase,
    ) {
        let reg = reg_index(address);
        match reg {
            SI_DRAM_ADDR_REG => masked_write(&mut self.regs[reg], value, mask),
            SI_PIF_ADDR_RD64B_REG => {
                masked_write(&mut self.regs[reg], value, mask);
                self.start_dma(SiDmaDir::Read, cp0, pif, mem);
            }
            SI_PIF_ADDR_WR64B_REG => {
                masked_write(&mut self.regs[reg], value, mask);
                self.start_dma(SiDmaDir::Write, cp0, pif, mem);
            }
            SI_STATUS_REG => {
                self.regs[SI_STATUS_REG] &= !SI_STATUS_INTERRUPT;
                mi.clear(MI_INTR_SI, cp0);
            }
            _ => {}
        }
    }

    fn dram_addr(&self) -> u32 {
        self.regs[SI_DRAM_ADDR_REG] & 0x00ff_fffc
    }

    fn start_dma(&mut self, dir: SiDmaDir, cp0: &mut Cp0, pif: &mut Pif, mem: &mut MemBase) {
        let pif_reg = match dir {
            SiDmaDir::Read => SI_PIF_ADDR_RD64B_REG,
            _ => SI_PIF_ADDR_WR64B_REG,
        };
        let pif_addr = self.regs[pif_reg] & 0x1fff_ffff;

        if self.regs[SI_STATUS_REG] & SI_STATUS_DMA_BUSY != 0 || pif_addr != PIF_RAM_ADDR {
            log(LogCategory::Dma, LogLevel::Error, || {
                format!(
                    "SI DMA {:?} refused: PIF address {:08X}, status {:04X}",
                    dir, pif_addr, self.regs[SI_STATUS_REG]
                )
            });
            self.regs[SI_STATUS_REG] |= SI_STATUS_DMA_ERROR;
            return;
        }

        match dir {
            SiDmaDir::Write => {
                mem.copy(PIF_RAM_ADDR, self.dram_addr(), PIF_RAM_SIZE as usize);
            }
            SiDmaDir::Read => pif.update_pif_ram(mem),
            SiDmaDir::NoDma => return,
        }
        self.dma_dir = dir;
        self.regs[SI_STATUS_REG] |= SI_STATUS_DMA_BUSY;

        let duration = self.dma_duration + cp0.random_interrupt_time();
        cp0.add_interrupt_event(EventKind::Si, duration);
    }

    /// SI event: finish the transfer and interrupt.
    pub fn end_of_dma_event(
        &mut self,
        cp0: &mut Cp0,
        mi: &mut MiController,
        pif: &mut Pif,
        mem: &mut MemBase,
    ) {
        match self.dma_dir {
            SiDmaDir::Write => pif.process_pif_ram(mem),
            SiDmaDir::Read => {
                mem.copy(self.dram_addr(), PIF_RAM_ADDR, PIF_RAM_SIZE as usize);
            }
            SiDmaDir::NoDma => {}
        }
        self.regs[SI_STATUS_REG] &= !(SI_STATUS_DMA_BUSY | SI_STATUS_DMA_ERROR);
        self.regs[SI_STATUS_REG] |= SI_STATUS_INTERRUPT;
        self.dma_dir = SiDmaDir::NoDma;
        mi.raise(MI_INTR_SI, cp0);
    }

    /// The CPU wrote PIF RAM directly.
    pub fn pif_ram_written(&mut self, cp0: &mut Cp0, mi: &mut MiController) {
        self.regs[SI_STATUS_REG] |= SI_STATUS_INTERRUPT;
        mi.raise(MI_INTR_SI, cp0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackingPreference;
    use crate::memory::MM_SI_REGS;

    struct Rig {
        si: SiController,
        cp0: Cp0,
        mi: MiController,
        pif: Pif,
        mem: MemBase,
    }

    impl Rig {
        fn new() -> Self {
            let mut mi = MiController::new();
            mi.poweron();
            let mut mem = MemBase::allocate(BackingPreference::Compressed, None).unwrap();
            let mut pif = Pif::new(None);
            pif.poweron(&mut mem);
            Self {
                si: SiController::new(0x900),
                cp0: Cp0::new(2, false, 0),
                mi,
                pif,
                mem,
            }
        }

        fn write(&mut self, reg: usize, value: u32) {
            self.si.write_regs(
                MM_SI_REGS + (reg as u32) * 4,
                value,
                0xffff_ffff,
                &mut self.cp0,
                &mut self.mi,
                &mut self.pif,
                &mut self.mem,
            );
        }

        fn fire(&mut self) {
            self.cp0.add_cycles(0x900);
            assert_eq!(self.cp0.pop_due(), Some(EventKind::Si));
            self.si
                .end_of_dma_event(&mut self.cp0, &mut self.mi, &mut self.pif, &mut self.mem);
        }
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let mut rig = Rig::new();
        let block = [0x01, 0x03, 0x00, 0xff, 0xff, 0xff, 0xfe];
        rig.mem.bytes_mut(0x1000, 7).unwrap().copy_from_slice(&block);
        rig.mem.write_u8(0x1000 + 0x3f, 0x01);

        rig.write(SI_DRAM_ADDR_REG, 0x1000);
        rig.write(SI_PIF_ADDR_WR64B_REG, 0x1fc0_07c0);
        assert_eq!(rig.si.status(), SI_STATUS_DMA_BUSY);
        assert_eq!(rig.si.dma_dir, SiDmaDir::Write);
        rig.fire();
        assert_eq!(rig.si.status(), SI_STATUS_INTERRUPT);
        assert_ne!(rig.mi.intr() & MI_INTR_SI, 0);

        rig.write(SI_STATUS_REG, 0);
        assert_eq!(rig.si.status(), 0);
        assert_eq!(rig.mi.intr() & MI_INTR_SI, 0);

        rig.write(SI_DRAM_ADDR_REG, 0x2000);
        rig.write(SI_PIF_ADDR_RD64B_REG, 0x1fc0_07c0);
        rig.fire();
        assert_eq!(rig.mem.bytes(0x2000, 6).unwrap(), &[0x01, 0x03, 0x00, 0x05, 0x00, 0x02]);
    }

    #[test]
    fn test_single_flight() {
        let mut rig = Rig::new();
        rig.write(SI_PIF_ADDR_RD64B_REG, 0x1fc0_07c0);
        assert_eq!(rig.si.status(), SI_STATUS_DMA_BUSY);

        rig.write(SI_PIF_ADDR_WR64B_REG, 0x1fc0_07c0);
        assert_eq!(rig.si.status(), SI_STATUS_DMA_BUSY | SI_STATUS_DMA_ERROR);
        assert_eq!(rig.si.dma_dir, SiDmaDir::Read, "first transfer untouched");
        assert_eq!(rig.cp0.pending_events().len(), 1);

        rig.fire();
        assert_eq!(rig.si.status(), SI_STATUS_INTERRUPT, "completion clears the error");
    }

    #[test]
    fn test_bad_pif_address_is_refused() {
        let mut rig = Rig::new();
        rig.write(SI_PIF_ADDR_RD64B_REG, 0x1fc0_0000);
        assert_eq!(rig.si.status(), SI_STATUS_DMA_ERROR);
        assert!(!rig.cp0.is_pending(EventKind::Si));

        // KSEG1 alias of PIF RAM is accepted
        rig.write(SI_PIF_ADDR_RD64B_REG, 0xbfc0_07c0);
        assert_ne!(rig.si.status() & SI_STATUS_DMA_BUSY, 0);
    }

    #[test]
    fn test_duration_includes_jitter() {
        let mut rig = Rig::new();
        rig.cp0 = Cp0::new(2, true, 7);
        rig.write(SI_PIF_ADDR_RD64B_REG, 0x1fc0_07c0);
        let left = rig.cp0.remaining_cycles(EventKind::Si).unwrap();
        assert!((0x900..0x940).contains(&left));
    }
}
