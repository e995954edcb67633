//! RDP (Reality Display Processor) command interface
//!
//! Only the register side of the RDP lives here. Command lists are handed
//! to the graphics backend as soon as DPC_END moves; rasterization is the
//! backend's business.
//!
//! ## Memory Map
//!
//! DPC registers are memory-mapped at 0x04100000-0x0410001F:
//! - 0x04100000: DPC_START - Command list start (also resets CURRENT)
//! - 0x04100004: DPC_END - Command list end (writing kicks processing)
//! - 0x04100008: DPC_CURRENT - Read-only
//! - 0x0410000C: DPC_STATUS - Status (write: set/clear pairs)
//! - 0x04100010: DPC_CLOCK
//! - 0x04100014: DPC_BUFBUSY
//! - 0x04100018: DPC_PIPEBUSY
//! - 0x0410001C: DPC_TMEM
//!
//! DPS registers at 0x04200000-0x0420000F (TBIST, TEST_MODE, BUFTEST_ADDR,
//! BUFTEST_DATA) are plain storage.
//!
//! # Freeze
//!
//! While DPC_STATUS.FREEZE is set, the DP interrupt and the screen update
//! that would follow it are held back in an outbox and replayed once the
//! guest unfreezes the RDP.

use super::mi::{MiController, MI_INTR_DP};
use crate::backend::GfxBackend;
use crate::memory::{reg_index, MemBase};
use crate::r4300::cp0::Cp0;
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::masked_write;
use serde::{Deserialize, Serialize};

pub const DPC_START_REG: usize = 0;
pub const DPC_END_REG: usize = 1;
pub const DPC_CURRENT_REG: usize = 2;
pub const DPC_STATUS_REG: usize = 3;
pub const DPC_CLOCK_REG: usize = 4;
pub const DPC_BUFBUSY_REG: usize = 5;
pub const DPC_PIPEBUSY_REG: usize = 6;
pub const DPC_TMEM_REG: usize = 7;
pub const DPC_REGS_COUNT: usize = 8;

pub const DPS_TBIST_REG: usize = 0;
pub const DPS_TEST_MODE_REG: usize = 1;
pub const DPS_BUFTEST_ADDR_REG: usize = 2;
pub const DPS_BUFTEST_DATA_REG: usize = 3;
pub const DPS_REGS_COUNT: usize = 4;

pub const DPC_STATUS_XBUS_DMEM_DMA: u32 = 0x001;
pub const DPC_STATUS_FREEZE: u32 = 0x002;
pub const DPC_STATUS_FLUSH: u32 = 0x004;
pub const DPC_STATUS_START_GCLK: u32 = 0x008;
pub const DPC_STATUS_TMEM_BUSY: u32 = 0x010;
pub const DPC_STATUS_PIPE_BUSY: u32 = 0x020;
pub const DPC_STATUS_CMD_BUSY: u32 = 0x040;
pub const DPC_STATUS_CBUF_READY: u32 = 0x080;
pub const DPC_STATUS_DMA_BUSY: u32 = 0x100;
pub const DPC_STATUS_END_VALID: u32 = 0x200;
pub const DPC_STATUS_START_VALID: u32 = 0x400;

// DPC_STATUS write bits
const DPC_CLR_XBUS_DMEM_DMA: u32 = 0x001;
const DPC_SET_XBUS_DMEM_DMA: u32 = 0x002;
const DPC_CLR_FREEZE: u32 = 0x004;
const DPC_SET_FREEZE: u32 = 0x008;
const DPC_CLR_FLUSH: u32 = 0x010;
const DPC_SET_FLUSH: u32 = 0x020;
const DPC_CLR_TMEM_CTR: u32 = 0x040;
const DPC_CLR_PIPE_CTR: u32 = 0x080;
const DPC_CLR_CMD_CTR: u32 = 0x100;
const DPC_CLR_CLOCK_CTR: u32 = 0x200;

/// Work held back while the RDP is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnfreezeAction {
    DpInterrupt,
    UpdateScreen,
}

/// What the caller must do after a DPC register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DpcEffect {
    None,
    /// DPC_END moved: run the command list
    ProcessList,
    /// The RDP was unfrozen with an RSP task waiting on it
    RunSpTask,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdpController {
    pub dpc_regs: [u32; DPC_REGS_COUNT],
    pub dps_regs: [u32; DPS_REGS_COUNT],
    pub outbox: Vec<UnfreezeAction>,
}

impl RdpController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poweron(&mut self) {
        *self = Self::default();
    }

    pub fn status(&self) -> u32 {
        self.dpc_regs[DPC_STATUS_REG]
    }

    pub fn is_frozen(&self) -> bool {
        self.dpc_regs[DPC_STATUS_REG] & DPC_STATUS_FREEZE != 0
    }

    /// Hold `action` back until the next unfreeze (at most once each).
    pub fn defer(&mut self, action: UnfreezeAction) {
        if !self.outbox.contains(&action) {
            self.outbox.push(action);
        }
    }

    pub fn has_deferred(&self, action: UnfreezeAction) -> bool {
        self.outbox.contains(&action)
    }

    pub fn read_regs(&self, address: u32) -> u32 {
        self.dpc_regs.get(reg_index(address)).copied().unwrap_or(0)
    }

    /// Write a DPC register.
    ///
    /// `sp_running` tells whether the RSP is neither halted nor broken, in
    /// which case an unfreeze hands the pending task back to the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn write_regs(
        &mut self,
        address: u32,
        value: u32,
        mask: u32,
        sp_running: bool,
        cp0: &mut Cp0,
        mi: &mut MiController,
        gfx: &mut dyn GfxBackend,
    ) -> DpcEffect {
        let reg = reg_index(address);
        match reg {
            DPC_START_REG => {
                masked_write(&mut self.dpc_regs[reg], value, mask);
                self.dpc_regs[DPC_CURRENT_REG] = self.dpc_regs[DPC_START_REG];
                DpcEffect::None
            }
            DPC_END_REG => {
                masked_write(&mut self.dpc_regs[reg], value, mask);
                DpcEffect::ProcessList
            }
            DPC_STATUS_REG => {
                if self.update_status(value & mask) {
                    self.drain_outbox(cp0, mi, gfx);
                    if sp_running {
                        return DpcEffect::RunSpTask;
                    }
                }
                DpcEffect::None
            }
            _ => DpcEffect::None,
        }
    }

    /// Returns `true` when this write cleared FREEZE, whether or not it was set.
    fn update_status(&mut self, w: u32) -> bool {
        let status = &mut self.dpc_regs[DPC_STATUS_REG];

        if w & DPC_CLR_XBUS_DMEM_DMA != 0 {
            *status &= !DPC_STATUS_XBUS_DMEM_DMA;
        }
        if w & DPC_SET_XBUS_DMEM_DMA != 0 {
            *status |= DPC_STATUS_XBUS_DMEM_DMA;
        }
        if w & DPC_CLR_FREEZE != 0 {
            *status &= !DPC_STATUS_FREEZE;
        }
        if w & DPC_SET_FREEZE != 0 {
            *status |= DPC_STATUS_FREEZE;
        }
        if w & DPC_CLR_FLUSH != 0 {
            *status &= !DPC_STATUS_FLUSH;
        }
        if w & DPC_SET_FLUSH != 0 {
            *status |= DPC_STATUS_FLUSH;
        }
        let unfrozen = w & DPC_CLR_FREEZE != 0 && *status & DPC_STATUS_FREEZE == 0;

        if w & DPC_CLR_TMEM_CTR != 0 {
            self.dpc_regs[DPC_TMEM_REG] = 0;
        }
        if w & DPC_CLR_PIPE_CTR != 0 {
            self.dpc_regs[DPC_PIPEBUSY_REG] = 0;
        }
        if w & DPC_CLR_CMD_CTR != 0 {
            self.dpc_regs[DPC_BUFBUSY_REG] = 0;
        }
        if w & DPC_CLR_CLOCK_CTR != 0 {
            self.dpc_regs[DPC_CLOCK_REG] = 0;
        }
        unfrozen
    }

    fn drain_outbox(&mut self, cp0: &mut Cp0, mi: &mut MiController, gfx: &mut dyn GfxBackend) {
        for action in std::mem::take(&mut self.outbox) {
            log(LogCategory::Video, LogLevel::Debug, || {
                format!("RDP unfrozen: replaying {:?}", action)
            });
            match action {
                UnfreezeAction::DpInterrupt => mi.signal(MI_INTR_DP, cp0),
                UnfreezeAction::UpdateScreen => gfx.update_screen(),
            }
        }
    }

    /// Hand the command list to the backend and flag its completion.
    ///
    /// Framebuffer protection around the call is the caller's job.
    pub fn process_list(
        &mut self,
        mem: &mut MemBase,
        cp0: &mut Cp0,
        mi: &mut MiController,
        gfx: &mut dyn GfxBackend,
    ) {
        log(LogCategory::Video, LogLevel::Trace, || {
            format!(
                "RDP list {:08X}-{:08X}",
                self.dpc_regs[DPC_CURRENT_REG], self.dpc_regs[DPC_END_REG]
            )
        });
        gfx.process_rdp_list(mem, &mut self.dpc_regs);
        mi.signal(MI_INTR_DP, cp0);
    }

    pub fn read_dps_regs(&self, address: u32) -> u32 {
        self.dps_regs.get(reg_index(address)).copied().unwrap_or(0)
    }

    pub fn write_dps_regs(&mut self, address: u32, value: u32, mask: u32) {
        if let Some(reg) = self.dps_regs.get_mut(reg_index(address)) {
            masked_write(reg, value, mask);
        }
    }

    /// DP event: the command list retired.
    pub fn interrupt_event(&mut self, cp0: &mut Cp0, mi: &mut MiController) {
        let status = &mut self.dpc_regs[DPC_STATUS_REG];
        *status &= !(DPC_STATUS_TMEM_BUSY | DPC_STATUS_PIPE_BUSY | DPC_STATUS_CMD_BUSY);
        *status |= DPC_STATUS_CBUF_READY;

        if self.is_frozen() {
            self.defer(UnfreezeAction::DpInterrupt);
        } else {
            mi.raise(MI_INTR_DP, cp0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullGfx;
    use crate::memory::{MM_DPC_REGS, MM_DPS_REGS};

    #[derive(Default)]
    struct ScreenCounter {
        updates: u32,
        lists: u32,
    }

    impl GfxBackend for ScreenCounter {
        fn fb_read(&mut self, _addr: u32) {}
        fn fb_write(&mut self, _addr: u32, _size: usize) {}
        fn update_screen(&mut self) {
            self.updates += 1;
        }
        fn vi_status_changed(&mut self) {}
        fn vi_width_changed(&mut self) {}
        fn process_rdp_list(&mut self, _mem: &mut MemBase, dpc_regs: &mut [u32]) {
            dpc_regs[DPC_CURRENT_REG] = dpc_regs[DPC_END_REG];
            self.lists += 1;
        }
    }

    fn setup() -> (RdpController, Cp0, MiController) {
        let mut mi = MiController::new();
        mi.poweron();
        (RdpController::new(), Cp0::new(2, false, 0), mi)
    }

    fn reg(r: usize) -> u32 {
        MM_DPC_REGS + (r as u32) * 4
    }

    #[test]
    fn test_start_resets_current() {
        let (mut dp, mut cp0, mut mi) = setup();
        let effect = dp.write_regs(
            reg(DPC_START_REG),
            0x0010_0000,
            0xffff_ffff,
            false,
            &mut cp0,
            &mut mi,
            &mut NullGfx,
        );
        assert_eq!(effect, DpcEffect::None);
        assert_eq!(dp.read_regs(reg(DPC_CURRENT_REG)), 0x0010_0000);
    }

    #[test]
    fn test_end_requests_processing() {
        let (mut dp, mut cp0, mut mi) = setup();
        let mut gfx = ScreenCounter::default();
        let effect = dp.write_regs(
            reg(DPC_END_REG),
            0x0010_0100,
            0xffff_ffff,
            false,
            &mut cp0,
            &mut mi,
            &mut gfx,
        );
        assert_eq!(effect, DpcEffect::ProcessList);

        let mut mem =
            MemBase::allocate(crate::config::BackingPreference::Compressed, None).unwrap();
        dp.process_list(&mut mem, &mut cp0, &mut mi, &mut gfx);
        assert_eq!(gfx.lists, 1);
        assert_eq!(dp.read_regs(reg(DPC_CURRENT_REG)), 0x0010_0100);
        assert_ne!(mi.intr() & MI_INTR_DP, 0);
    }

    #[test]
    fn test_current_and_counters_read_only() {
        let (mut dp, mut cp0, mut mi) = setup();
        for r in [DPC_CURRENT_REG, DPC_CLOCK_REG, DPC_BUFBUSY_REG, DPC_TMEM_REG] {
            dp.write_regs(reg(r), 0x1234, 0xffff_ffff, false, &mut cp0, &mut mi, &mut NullGfx);
            assert_eq!(dp.read_regs(reg(r)), 0);
        }
    }

    #[test]
    fn test_status_pairs_and_counter_clears() {
        let (mut dp, mut cp0, mut mi) = setup();
        dp.dpc_regs[DPC_CLOCK_REG] = 99;
        dp.dpc_regs[DPC_PIPEBUSY_REG] = 5;
        dp.write_regs(
            reg(DPC_STATUS_REG),
            DPC_SET_XBUS_DMEM_DMA | DPC_SET_FLUSH | DPC_CLR_CLOCK_CTR | DPC_CLR_PIPE_CTR,
            0xffff_ffff,
            false,
            &mut cp0,
            &mut mi,
            &mut NullGfx,
        );
        assert_eq!(dp.status(), DPC_STATUS_XBUS_DMEM_DMA | DPC_STATUS_FLUSH);
        assert_eq!(dp.dpc_regs[DPC_CLOCK_REG], 0);
        assert_eq!(dp.dpc_regs[DPC_PIPEBUSY_REG], 0);
    }

    #[test]
    fn test_frozen_interrupt_waits_for_unfreeze() {
        let (mut dp, mut cp0, mut mi) = setup();
        let mut gfx = ScreenCounter::default();
        let status = reg(DPC_STATUS_REG);

        dp.write_regs(status, DPC_SET_FREEZE, 0xffff_ffff, false, &mut cp0, &mut mi, &mut gfx);
        assert!(dp.is_frozen());

        dp.interrupt_event(&mut cp0, &mut mi);
        dp.defer(UnfreezeAction::UpdateScreen);
        dp.defer(UnfreezeAction::UpdateScreen);
        assert_eq!(mi.intr() & MI_INTR_DP, 0);
        assert_ne!(dp.status() & DPC_STATUS_CBUF_READY, 0);
        assert_eq!(dp.outbox.len(), 2);

        let effect =
            dp.write_regs(status, DPC_CLR_FREEZE, 0xffff_ffff, true, &mut cp0, &mut mi, &mut gfx);
        assert_eq!(effect, DpcEffect::RunSpTask);
        assert!(dp.outbox.is_empty());
        assert_ne!(mi.intr() & MI_INTR_DP, 0);
        assert_eq!(gfx.updates, 1);
    }

    #[test]
    fn test_clear_freeze_restarts_waiting_task() {
        let (mut dp, mut cp0, mut mi) = setup();
        assert!(!dp.is_frozen());
        let effect = dp.write_regs(
            reg(DPC_STATUS_REG),
            DPC_CLR_FREEZE,
            0xffff_ffff,
            true,
            &mut cp0,
            &mut mi,
            &mut NullGfx,
        );
        assert_eq!(effect, DpcEffect::RunSpTask);

        // Halted RSP: nothing to restart
        let effect = dp.write_regs(
            reg(DPC_STATUS_REG),
            DPC_CLR_FREEZE,
            0xffff_ffff,
            false,
            &mut cp0,
            &mut mi,
            &mut NullGfx,
        );
        assert_eq!(effect, DpcEffect::None);
    }

    #[test]
    fn test_set_and_clear_freeze_together_stays_frozen() {
        let (mut dp, mut cp0, mut mi) = setup();
        let effect = dp.write_regs(
            reg(DPC_STATUS_REG),
            DPC_CLR_FREEZE | DPC_SET_FREEZE,
            0xffff_ffff,
            true,
            &mut cp0,
            &mut mi,
            &mut NullGfx,
        );
        assert_eq!(effect, DpcEffect::None);
        assert!(dp.is_frozen());
    }

    #[test]
    fn test_interrupt_event_clears_busy() {
        let (mut dp, mut cp0, mut mi) = setup();
        dp.dpc_regs[DPC_STATUS_REG] =
            DPC_STATUS_TMEM_BUSY | DPC_STATUS_PIPE_BUSY | DPC_STATUS_CMD_BUSY;
        dp.interrupt_event(&mut cp0, &mut mi);
        assert_eq!(dp.status(), DPC_STATUS_CBUF_READY);
        assert_ne!(mi.intr() & MI_INTR_DP, 0);
    }

    #[test]
    fn test_dps_storage() {
        let (mut dp, _, _) = setup();
        dp.write_dps_regs(MM_DPS_REGS + 0xc, 0xabcd, 0xffff_ffff);
        assert_eq!(dp.read_dps_regs(MM_DPS_REGS + 0xc), 0xabcd);
        assert_eq!(dp.read_dps_regs(MM_DPS_REGS + 0x10), 0);
    }
}
