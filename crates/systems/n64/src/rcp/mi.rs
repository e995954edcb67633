//! MI (MIPS Interface) - RCP interrupt controller
//!
//! Collects the six RCP interrupt lines and forwards their OR (after
//! masking) to CP0 as interrupt line IP2.
//!
//! ## Memory Map
//!
//! MI registers are memory-mapped at 0x04300000-0x0430000F:
//! - 0x04300000: MI_INIT_MODE - Init length, init/ebus/RDRAM-register modes
//! - 0x04300004: MI_VERSION - Hardware version (read-only)
//! - 0x04300008: MI_INTR - Pending interrupts (read-only)
//! - 0x0430000C: MI_INTR_MASK - Interrupt mask
//!
//! ## Interrupt Bits
//!
//! Both MI_INTR and MI_INTR_MASK use the same bit positions:
//! - Bit 0: SP (Signal Processor)
//! - Bit 1: SI (Serial Interface)
//! - Bit 2: AI (Audio Interface)
//! - Bit 3: VI (Video Interface)
//! - Bit 4: PI (Peripheral Interface)
//! - Bit 5: DP (Display Processor)

use crate::memory::reg_index;
use crate::r4300::cp0::Cp0;
use rcp_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

pub const MI_INIT_MODE_REG: usize = 0;
pub const MI_VERSION_REG: usize = 1;
pub const MI_INTR_REG: usize = 2;
pub const MI_INTR_MASK_REG: usize = 3;
pub const MI_REGS_COUNT: usize = 4;

pub const MI_INTR_SP: u32 = 0x01;
pub const MI_INTR_SI: u32 = 0x02;
pub const MI_INTR_AI: u32 = 0x04;
pub const MI_INTR_VI: u32 = 0x08;
pub const MI_INTR_PI: u32 = 0x10;
pub const MI_INTR_DP: u32 = 0x20;

const MI_VERSION: u32 = 0x0202_0102;

/// MI_INIT_MODE layout
const INIT_LENGTH_MASK: u32 = 0x7f;
const INIT_MODE: u32 = 0x80;
const EBUS_TEST_MODE: u32 = 0x100;
const RDRAM_REG_MODE: u32 = 0x200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiController {
    pub regs: [u32; MI_REGS_COUNT],
}

impl MiController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poweron(&mut self) {
        self.regs = [0; MI_REGS_COUNT];
        self.regs[MI_VERSION_REG] = MI_VERSION;
    }

    pub fn intr(&self) -> u32 {
        self.regs[MI_INTR_REG]
    }

    pub fn intr_mask(&self) -> u32 {
        self.regs[MI_INTR_MASK_REG]
    }

    /// Any pending interrupt is also unmasked
    pub fn pending(&self) -> bool {
        self.regs[MI_INTR_REG] & self.regs[MI_INTR_MASK_REG] != 0
    }

    /// RDRAM register mode selects the alternate RDRAM register decoding
    pub fn rdram_reg_mode(&self) -> bool {
        self.regs[MI_INIT_MODE_REG] & RDRAM_REG_MODE != 0
    }

    pub fn read_regs(&self, address: u32) -> u32 {
        self.regs.get(reg_index(address)).copied().unwrap_or(0)
    }

    pub fn write_regs(&mut self, address: u32, value: u32, mask: u32, cp0: &mut Cp0) {
        let w = value & mask;
        match reg_index(address) {
            MI_INIT_MODE_REG => {
                update_init_mode(&mut self.regs[MI_INIT_MODE_REG], w);
                if w & 0x800 != 0 {
                    self.clear(MI_INTR_DP, cp0);
                }
            }
            MI_INTR_MASK_REG => {
                update_intr_mask(&mut self.regs[MI_INTR_MASK_REG], w);
                cp0.check_interrupt(self.pending());
            }
            MI_VERSION_REG | MI_INTR_REG => {}
            reg => log(LogCategory::Interrupts, LogLevel::Debug, || {
                format!("MI: write to unknown register {} = {:08X}", reg, w)
            }),
        }
    }

    /// Assert `bit`; an unmasked line interrupts the CPU immediately.
    pub fn raise(&mut self, bit: u32, cp0: &mut Cp0) {
        self.regs[MI_INTR_REG] |= bit;
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("MI: raise {:02X} (intr={:02X})", bit, self.intr())
        });
        if self.regs[MI_INTR_REG] & self.regs[MI_INTR_MASK_REG] & bit != 0 {
            cp0.raise_maskable_interrupt(crate::r4300::cp0::CP0_CAUSE_IP2);
        }
    }

    /// Assert `bit`; CP0 notices at its next event poll.
    pub fn signal(&mut self, bit: u32, cp0: &mut Cp0) {
        self.regs[MI_INTR_REG] |= bit;
        cp0.check_interrupt(self.pending());
    }

    pub fn clear(&mut self, bit: u32, cp0: &mut Cp0) {
        self.regs[MI_INTR_REG] &= !bit;
        cp0.check_interrupt(self.pending());
    }
}

fn update_init_mode(mode: &mut u32, w: u32) {
    *mode = (*mode & !INIT_LENGTH_MASK) | (w & INIT_LENGTH_MASK);

    if w & 0x80 != 0 {
        *mode &= !INIT_MODE;
    }
    if w & 0x100 != 0 {
        *mode |= INIT_MODE;
    }
    if w & 0x200 != 0 {
        *mode &= !EBUS_TEST_MODE;
    }
    if w & 0x400 != 0 {
        *mode |= EBUS_TEST_MODE;
    }
    if w & 0x1000 != 0 {
        *mode &= !RDRAM_REG_MODE;
    }
    if w & 0x2000 != 0 {
        *mode |= RDRAM_REG_MODE;
    }
}

/// Each source takes a (clear, set) bit pair, SP first.
fn update_intr_mask(mask: &mut u32, w: u32) {
    for (source, bit) in [
        MI_INTR_SP, MI_INTR_SI, MI_INTR_AI, MI_INTR_VI, MI_INTR_PI, MI_INTR_DP,
    ]
    .into_iter()
    .enumerate()
    {
        let clear = 1 << (2 * source);
        let set = clear << 1;
        if w & clear != 0 {
            *mask &= !bit;
        }
        if w & set != 0 {
            *mask |= bit;
        }
    }
}
