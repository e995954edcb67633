//! VI (Video Interface) - scan-out timing for Nintendo 64
//!
//! The VI owns the vertical interrupt. Its period follows V_SYNC: one
//! field lasts `V_SYNC + 1` half-lines, each `count_per_scanline` CPU cycles
//! long. Pixel output itself is left to the graphics backend.
//!
//! ## Memory Map
//!
//! VI registers are memory-mapped at 0x04400000-0x04400037:
//! - 0x04400000: VI_STATUS - Video control/status register
//! - 0x04400004: VI_ORIGIN - Framebuffer origin address
//! - 0x04400008: VI_WIDTH - Framebuffer line width
//! - 0x0440000C: VI_INTR - Vertical interrupt line
//! - 0x04400010: VI_CURRENT - Current half-line (write acknowledges VI interrupt)
//! - 0x04400014: VI_BURST - Timing register
//! - 0x04400018: VI_V_SYNC - Half-lines per field minus one
//! - 0x0440001C: VI_H_SYNC - Horizontal sync
//! - 0x04400020: VI_LEAP - Horizontal sync leap
//! - 0x04400024: VI_H_START - Horizontal video start
//! - 0x04400028: VI_V_START - Vertical video start
//! - 0x0440002C: VI_V_BURST - Vertical burst start/end
//! - 0x04400030: VI_X_SCALE - Horizontal scale
//! - 0x04400034: VI_Y_SCALE - Vertical scale

use super::mi::{MiController, MI_INTR_VI};
use crate::backend::GfxBackend;
use crate::config::TvStandard;
use crate::memory::reg_index;
use crate::r4300::cp0::Cp0;
use crate::r4300::interrupt::EventKind;
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::masked_write;
use serde::{Deserialize, Serialize};

pub const VI_STATUS_REG: usize = 0;
pub const VI_ORIGIN_REG: usize = 1;
pub const VI_WIDTH_REG: usize = 2;
pub const VI_V_INTR_REG: usize = 3;
pub const VI_CURRENT_REG: usize = 4;
pub const VI_BURST_REG: usize = 5;
pub const VI_V_SYNC_REG: usize = 6;
pub const VI_H_SYNC_REG: usize = 7;
pub const VI_LEAP_REG: usize = 8;
pub const VI_H_START_REG: usize = 9;
pub const VI_V_START_REG: usize = 10;
pub const VI_V_BURST_REG: usize = 11;
pub const VI_X_SCALE_REG: usize = 12;
pub const VI_Y_SCALE_REG: usize = 13;
pub const VI_REGS_COUNT: usize = 14;

/// VI period used after an NMI when the guest never programmed V_SYNC
pub const DEFAULT_NMI_VI_DELAY: u32 = 5000;

/// Video Interface controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViController {
    pub regs: [u32; VI_REGS_COUNT],
    /// Interlace field, toggled each vertical interrupt when STATUS bit 6 is set
    pub field: u32,
    /// Cycles between two vertical interrupts
    pub delay: u32,
    /// COUNT of the next vertical interrupt; 0 until V_SYNC is first programmed
    pub next_vi: u32,
    pub count_per_scanline: u32,
    pub clock: u32,
    pub expected_refresh_rate: u32,
    /// Vertical interrupts since power-on
    #[serde(default)]
    pub frames: u64,
}

impl ViController {
    pub fn new(tv_standard: TvStandard) -> Self {
        Self {
            regs: [0; VI_REGS_COUNT],
            field: 0,
            delay: 0,
            next_vi: 0,
            count_per_scanline: 0,
            clock: tv_standard.vi_clock(),
            expected_refresh_rate: tv_standard.refresh_rate(),
            frames: 0,
        }
    }

    pub fn poweron(&mut self) {
        self.regs = [0; VI_REGS_COUNT];
        self.field = 0;
        self.delay = 0;
        self.next_vi = 0;
        self.count_per_scanline = 0;
        self.frames = 0;
    }

    /// Read a VI register.
    ///
    /// Not pure: a CURRENT read recomputes the beam position from the time
    /// left until the next vertical interrupt and latches it into the
    /// register file.
    pub fn read_regs(&mut self, address: u32, cp0: &Cp0) -> u32 {
        let reg = reg_index(address);
        if reg == VI_CURRENT_REG {
            self.regs[VI_CURRENT_REG] = self.current_line(cp0.count());
        }
        self.regs.get(reg).copied().unwrap_or(0)
    }

    fn current_line(&self, count: u32) -> u32 {
        let v_sync = self.regs[VI_V_SYNC_REG];
        let mut line = self.regs[VI_CURRENT_REG];
        if v_sync != 0 && self.count_per_scanline != 0 {
            let elapsed = self
                .delay
                .wrapping_sub(self.next_vi.wrapping_sub(count));
            line = elapsed / self.count_per_scanline;
            if line >= v_sync {
                line -= v_sync;
            }
        }
        (line & !1) | self.field
    }

    pub fn write_regs(
        &mut self,
        address: u32,
        value: u32,
        mask: u32,
        cp0: &mut Cp0,
        mi: &mut MiController,
        gfx: &mut dyn GfxBackend,
    ) {
        let reg = reg_index(address);
        match reg {
            VI_STATUS_REG => {
                if self.regs[reg] & mask != value & mask {
                    masked_write(&mut self.regs[reg], value, mask);
                    gfx.vi_status_changed();
                }
            }
            VI_WIDTH_REG => {
                if self.regs[reg] & mask != value & mask {
                    masked_write(&mut self.regs[reg], value, mask);
                    gfx.vi_width_changed();
                }
            }
            VI_CURRENT_REG => mi.clear(MI_INTR_VI, cp0),
            VI_V_SYNC_REG => {
                if self.regs[reg] & mask != value & mask {
                    masked_write(&mut self.regs[reg], value, mask);
                    self.set_vertical_interrupt(cp0);
                }
            }
            _ if reg < VI_REGS_COUNT => masked_write(&mut self.regs[reg], value, mask),
            _ => {}
        }
    }

    /// Derive timing from V_SYNC; the very first programming starts the VI.
    fn set_vertical_interrupt(&mut self, cp0: &mut Cp0) {
        let lines = self.regs[VI_V_SYNC_REG].wrapping_add(1);
        self.count_per_scanline = match lines {
            0 => 0,
            n => (self.clock / self.expected_refresh_rate.max(1)) / n,
        };
        self.delay = lines.wrapping_mul(self.count_per_scanline);

        log(LogCategory::Video, LogLevel::Debug, || {
            format!(
                "VI: V_SYNC={} -> {} cycles/line, {} cycles/field",
                self.regs[VI_V_SYNC_REG], self.count_per_scanline, self.delay
            )
        });

        if self.next_vi == 0 && self.delay != 0 {
            self.next_vi = cp0.count().wrapping_add(self.delay);
            cp0.add_interrupt_event_count(EventKind::Vi, self.next_vi);
        }
    }

    /// Period to use when an NMI restarts the VI.
    pub fn nmi_delay(&self) -> u32 {
        if self.regs[VI_V_SYNC_REG] != 0 && self.delay != 0 {
            self.delay
        } else {
            DEFAULT_NMI_VI_DELAY
        }
    }

    /// Restart the vertical interrupt `delay` cycles from now.
    pub fn restart(&mut self, cp0: &mut Cp0, delay: u32) {
        self.delay = delay;
        self.next_vi = cp0.count().wrapping_add(delay);
        cp0.add_interrupt_event_count(EventKind::Vi, self.next_vi);
    }

    /// VI event: advance the field and schedule the next vertical interrupt.
    ///
    /// The screen refresh (or its deferral while the RDP is frozen) is done
    /// by the caller beforehand.
    pub fn vertical_interrupt_event(&mut self, cp0: &mut Cp0, mi: &mut MiController) {
        self.field ^= (self.regs[VI_STATUS_REG] >> 6) & 1;

        if self.delay != 0 {
            self.next_vi = self.next_vi.wrapping_add(self.delay);
            cp0.add_interrupt_event_count(EventKind::Vi, self.next_vi);
        }
        self.frames += 1;

        mi.raise(MI_INTR_VI, cp0);
    }
}
