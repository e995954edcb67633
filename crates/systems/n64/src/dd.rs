//! 64DD registers with no drive attached.
//!
//! Games probe the ASIC status register to find out whether a 64DD is
//! plugged in. Reading it as all ones makes them carry on without one.

/// ASIC_CMD_STATUS
pub const DD_ASIC_STATUS: u32 = 0x0500_0508;

pub fn read_absent_dd_regs(address: u32) -> u32 {
    if address & !3 == DD_ASIC_STATUS {
        0xffff_ffff
    } else {
        0
    }
}
