//! RSP (Reality Signal Processor) front-end
//!
//! The RSP's register interface, its DMA engine and task dispatch. The
//! microcode itself runs in an [`RspBackend`]; this module decides when a
//! task starts and turns its completion into SP/DP events.
//!
//! ## Memory Map
//!
//! - 0x04000000-0x04000FFF: DMEM
//! - 0x04001000-0x04001FFF: IMEM (the 8 KiB pair mirrors up to 0x0403FFFF)
//! - 0x04040000: SP_MEM_ADDR - DMEM/IMEM address for DMA
//! - 0x04040004: SP_DRAM_ADDR - RDRAM address for DMA
//! - 0x04040008: SP_RD_LEN - Writing starts RDRAM -> SP memory
//! - 0x0404000C: SP_WR_LEN - Writing starts SP memory -> RDRAM
//! - 0x04040010: SP_STATUS - Halt/broke/signals (write: set/clear pairs)
//! - 0x04040014: SP_DMA_FULL
//! - 0x04040018: SP_DMA_BUSY
//! - 0x0404001C: SP_SEMAPHORE - Reading sets it, writing clears it
//! - 0x04080000: SP_PC
//! - 0x04080004: SP_IBIST
//!
//! ## DMA length register
//!
//! - Bits 0-11: bytes per row minus one (rounded up to 8)
//! - Bits 12-19: rows minus one
//! - Bits 20-31: RDRAM bytes skipped after each row

use super::mi::{MiController, MI_INTR_SP};
use crate::backend::{RspBackend, RspOutcome};
use crate::memory::{reg_index, MemBase, MM_RSP_MEM};
use crate::r4300::cp0::Cp0;
use crate::r4300::interrupt::EventKind;
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::masked_write;
use serde::{Deserialize, Serialize};

pub const SP_MEM_ADDR_REG: usize = 0;
pub const SP_DRAM_ADDR_REG: usize = 1;
pub const SP_RD_LEN_REG: usize = 2;
pub const SP_WR_LEN_REG: usize = 3;
pub const SP_STATUS_REG: usize = 4;
pub const SP_DMA_FULL_REG: usize = 5;
pub const SP_DMA_BUSY_REG: usize = 6;
pub const SP_SEMAPHORE_REG: usize = 7;
pub const SP_REGS_COUNT: usize = 8;

pub const SP_PC_REG: usize = 0;
pub const SP_IBIST_REG: usize = 1;
pub const SP_REGS2_COUNT: usize = 2;

pub const SP_STATUS_HALT: u32 = 0x0001;
pub const SP_STATUS_BROKE: u32 = 0x0002;
pub const SP_STATUS_DMA_BUSY: u32 = 0x0004;
pub const SP_STATUS_DMA_FULL: u32 = 0x0008;
pub const SP_STATUS_IO_FULL: u32 = 0x0010;
pub const SP_STATUS_SSTEP: u32 = 0x0020;
pub const SP_STATUS_INTR_BREAK: u32 = 0x0040;
/// Signal `n` is `SP_STATUS_SIG0 << n`
pub const SP_STATUS_SIG0: u32 = 0x0080;
pub const SP_STATUS_YIELD: u32 = SP_STATUS_SIG0;
pub const SP_STATUS_YIELDED: u32 = SP_STATUS_SIG0 << 1;
pub const SP_STATUS_TASKDONE: u32 = SP_STATUS_SIG0 << 2;

/// Task header field in DMEM holding the task type
pub const TASK_TYPE_OFFSET: u32 = 0xfc0;

const SP_MEM_MASK: u32 = 0x1fff;

/// What a task in DMEM is, as far as scheduling goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Gfx,
    Audio,
    Other,
}

impl TaskKind {
    fn from_header(word: u32) -> Self {
        match word {
            1 => TaskKind::Gfx,
            2 => TaskKind::Audio,
            _ => TaskKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpDmaDir {
    /// RDRAM -> SP memory
    Read,
    /// SP memory -> RDRAM
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RspController {
    pub regs: [u32; SP_REGS_COUNT],
    pub regs2: [u32; SP_REGS2_COUNT],
    /// RDRAM bytes reachable by SP DMA
    dram_size: u32,
}

impl RspController {
    pub fn new(dram_size: u32) -> Self {
        Self {
            regs: [0; SP_REGS_COUNT],
            regs2: [0; SP_REGS2_COUNT],
            dram_size,
        }
    }

    pub fn poweron(&mut self, mem: &mut MemBase) {
        self.regs = [0; SP_REGS_COUNT];
        self.regs2 = [0; SP_REGS2_COUNT];
        self.regs[SP_STATUS_REG] = SP_STATUS_HALT;
        mem.clear(MM_RSP_MEM, (SP_MEM_MASK + 1) as usize);
    }

    pub fn status(&self) -> u32 {
        self.regs[SP_STATUS_REG]
    }

    /// Neither halted nor in a break
    pub fn is_running(&self) -> bool {
        self.regs[SP_STATUS_REG] & (SP_STATUS_HALT | SP_STATUS_BROKE) == 0
    }

    pub fn read_mem(&self, mem: &MemBase, address: u32) -> u32 {
        mem.read_u32(MM_RSP_MEM + (address & SP_MEM_MASK))
    }

    pub fn write_mem(&self, mem: &mut MemBase, address: u32, value: u32, mask: u32) {
        mem.write_u32(MM_RSP_MEM + (address & SP_MEM_MASK), value, mask);
    }

    /// Read an SP register.
    ///
    /// Not pure: reading SEMAPHORE acquires it.
    pub fn read_regs(&mut self, address: u32) -> u32 {
        let reg = reg_index(address);
        let value = self.regs.get(reg).copied().unwrap_or(0);
        if reg == SP_SEMAPHORE_REG {
            self.regs[SP_SEMAPHORE_REG] = 1;
        }
        value
    }

    /// Write an SP register; returns `true` when a task should start.
    pub fn write_regs(
        &mut self,
        address: u32,
        value: u32,
        mask: u32,
        cp0: &mut Cp0,
        mi: &mut MiController,
        mem: &mut MemBase,
    ) -> bool {
        let reg = reg_index(address);
        match reg {
            SP_MEM_ADDR_REG | SP_DRAM_ADDR_REG => masked_write(&mut self.regs[reg], value, mask),
            SP_RD_LEN_REG => {
                masked_write(&mut self.regs[reg], value, mask);
                self.do_dma(SpDmaDir::Read, mem);
            }
            SP_WR_LEN_REG => {
                masked_write(&mut self.regs[reg], value, mask);
                self.do_dma(SpDmaDir::Write, mem);
            }
            SP_STATUS_REG => return self.update_status(value & mask, cp0, mi),
            SP_SEMAPHORE_REG => self.regs[SP_SEMAPHORE_REG] = 0,
            _ => {}
        }
        false
    }

    pub fn read_regs2(&self, address: u32) -> u32 {
        self.regs2.get(reg_index(address)).copied().unwrap_or(0)
    }

    pub fn write_regs2(&mut self, address: u32, value: u32, mask: u32) {
        match reg_index(address) {
            SP_PC_REG => masked_write(&mut self.regs2[SP_PC_REG], value & 0xffc, mask),
            SP_IBIST_REG => masked_write(&mut self.regs2[SP_IBIST_REG], value, mask),
            _ => {}
        }
    }

    fn do_dma(&mut self, dir: SpDmaDir, mem: &mut MemBase) {
        let l = match dir {
            SpDmaDir::Read => self.regs[SP_RD_LEN_REG],
            SpDmaDir::Write => self.regs[SP_WR_LEN_REG],
        };
        let length = ((l & 0xfff) | 7) + 1;
        let count = ((l >> 12) & 0xff) + 1;
        let skip = (l >> 20) & 0xfff;

        let bank = MM_RSP_MEM + (self.regs[SP_MEM_ADDR_REG] & 0x1000);
        let mut mem_addr = self.regs[SP_MEM_ADDR_REG] & 0xff8;
        let mut dram_addr = self.regs[SP_DRAM_ADDR_REG] & 0x00ff_fff8;

        log(LogCategory::Dma, LogLevel::Trace, || {
            format!(
                "SP DMA {:?}: sp {:04X} dram {:08X}, {} x {} bytes, skip {}",
                dir, mem_addr, dram_addr, count, length, skip
            )
        });

        for _ in 0..count {
            for _ in 0..length {
                let sp = bank + (mem_addr & 0xfff);
                if dram_addr < self.dram_size {
                    match dir {
                        SpDmaDir::Read => mem.write_u8(sp, mem.read_u8(dram_addr)),
                        SpDmaDir::Write => mem.write_u8(dram_addr, mem.read_u8(sp)),
                    }
                }
                mem_addr += 1;
                dram_addr += 1;
            }
            dram_addr += skip;
        }
    }

    fn update_status(&mut self, w: u32, cp0: &mut Cp0, mi: &mut MiController) -> bool {
        let status = &mut self.regs[SP_STATUS_REG];

        set_clear(status, w, 0x1, 0x2, SP_STATUS_HALT);
        if w & 0x4 != 0 {
            *status &= !SP_STATUS_BROKE;
        }
        if w & 0x8 != 0 && w & 0x10 == 0 {
            mi.clear(MI_INTR_SP, cp0);
        }
        if w & 0x10 != 0 && w & 0x8 == 0 {
            mi.signal(MI_INTR_SP, cp0);
        }
        set_clear(status, w, 0x20, 0x40, SP_STATUS_SSTEP);
        set_clear(status, w, 0x80, 0x100, SP_STATUS_INTR_BREAK);
        for sig in 0..8 {
            let clear = 0x200 << (2 * sig);
            set_clear(status, w, clear, clear << 1, SP_STATUS_SIG0 << sig);
        }

        w & (0x1 | 0x4) != 0 && self.is_running()
    }

    pub fn task_kind(&self, mem: &MemBase) -> TaskKind {
        TaskKind::from_header(mem.read_u32(MM_RSP_MEM + TASK_TYPE_OFFSET))
    }

    /// Run the loaded task to completion and schedule its interrupts.
    pub fn run_task(
        &mut self,
        kind: TaskKind,
        mem: &mut MemBase,
        backend: &mut dyn RspBackend,
        dpc_regs: &mut [u32],
        cp0: &mut Cp0,
    ) -> RspOutcome {
        let save_pc = self.regs2[SP_PC_REG] & !0xfff;
        self.regs2[SP_PC_REG] &= 0xfff;
        let outcome = backend.do_rsp_cycles(mem, &mut self.regs, dpc_regs);
        self.regs2[SP_PC_REG] |= save_pc;

        log(LogCategory::Dma, LogLevel::Trace, || {
            format!("SP task {:?} done: {:?}", kind, outcome)
        });

        match kind {
            TaskKind::Gfx => {
                if outcome.sp_interrupt {
                    cp0.add_interrupt_event(EventKind::Sp, 1000);
                }
                if outcome.dp_interrupt {
                    cp0.add_interrupt_event(EventKind::Dp, 1000);
                }
            }
            TaskKind::Audio => {
                if outcome.sp_interrupt {
                    cp0.add_interrupt_event(EventKind::Sp, 4000);
                }
            }
            TaskKind::Other => {
                if outcome.sp_interrupt {
                    cp0.add_interrupt_event(EventKind::Sp, 0);
                }
            }
        }
        self.regs[SP_STATUS_REG] &= !SP_STATUS_TASKDONE;
        outcome
    }

    /// SP event: the task hit its final break.
    pub fn interrupt_event(&mut self, cp0: &mut Cp0, mi: &mut MiController) {
        self.regs[SP_STATUS_REG] |= SP_STATUS_HALT | SP_STATUS_BROKE;
        if self.regs[SP_STATUS_REG] & SP_STATUS_INTR_BREAK != 0 {
            mi.raise(MI_INTR_SP, cp0);
        }
    }
}

/// Apply a (clear, set) bit pair; both bits together leave `bit` alone.
fn set_clear(reg: &mut u32, w: u32, clear: u32, set: u32, bit: u32) {
    if w & clear != 0 && w & set == 0 {
        *reg &= !bit;
    }
    if w & set != 0 && w & clear == 0 {
        *reg |= bit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackingPreference;
    use crate::memory::{MM_RSP_REGS, MM_RSP_REGS2};

    struct Rig {
        sp: RspController,
        cp0: Cp0,
        mi: MiController,
        mem: MemBase,
    }

    impl Rig {
        fn new() -> Self {
            let mut mem = MemBase::allocate(BackingPreference::Compressed, None).unwrap();
            let mut sp = RspController::new(0x0080_0000);
            sp.poweron(&mut mem);
            let mut mi = MiController::new();
            mi.poweron();
            Self {
                sp,
                cp0: Cp0::new(2, false, 0),
                mi,
                mem,
            }
        }

        fn write(&mut self, reg: usize, value: u32) -> bool {
            self.sp.write_regs(
                MM_RSP_REGS + (reg as u32) * 4,
                value,
                0xffff_ffff,
                &mut self.cp0,
                &mut self.mi,
                &mut self.mem,
            )
        }
    }

    struct Recording {
        outcome: RspOutcome,
        runs: u32,
    }

    impl RspBackend for Recording {
        fn do_rsp_cycles(
            &mut self,
            _mem: &mut MemBase,
            _sp_regs: &mut [u32],
            _dpc_regs: &mut [u32],
        ) -> RspOutcome {
            self.runs += 1;
            self.outcome
        }
    }

    #[test]
    fn test_poweron_halted() {
        let rig = Rig::new();
        assert_eq!(rig.sp.status(), SP_STATUS_HALT);
        assert!(!rig.sp.is_running());
    }

    #[test]
    fn test_dma_rows_and_skip() {
        let mut rig = Rig::new();
        for i in 0..0x40u32 {
            rig.mem.write_u8(0x1000 + i, i as u8);
        }
        rig.write(SP_MEM_ADDR_REG, 0x0000);
        rig.write(SP_DRAM_ADDR_REG, 0x1000);
        // 2 rows of 8 bytes, skipping 8 bytes between rows
        rig.write(SP_RD_LEN_REG, (8 << 20) | (1 << 12) | 7);

        let dmem = rig.mem.bytes(MM_RSP_MEM, 16).unwrap();
        assert_eq!(&dmem[..8], &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(&dmem[8..16], &[16, 17, 18, 19, 20, 21, 22, 23]);
    }

    #[test]
    fn test_dma_to_imem_and_back() {
        let mut rig = Rig::new();
        rig.sp
            .write_mem(&mut rig.mem, MM_RSP_MEM + 0x1008, 0xdead_beef, 0xffff_ffff);
        rig.write(SP_MEM_ADDR_REG, 0x1008);
        rig.write(SP_DRAM_ADDR_REG, 0x2000);
        rig.write(SP_WR_LEN_REG, 3);
        assert_eq!(rig.mem.read_u32(0x2000), 0xdead_beef);
    }

    #[test]
    fn test_mem_window_mirrors() {
        let mut rig = Rig::new();
        rig.sp.write_mem(&mut rig.mem, 0x0400_0010, 0x1234_5678, 0xffff_ffff);
        assert_eq!(rig.sp.read_mem(&rig.mem, 0x0400_2010), 0x1234_5678);
        assert_eq!(rig.sp.read_mem(&rig.mem, 0x0403_e010), 0x1234_5678);
    }

    #[test]
    fn test_semaphore() {
        let mut rig = Rig::new();
        let sem = MM_RSP_REGS + 0x1c;
        assert_eq!(rig.sp.read_regs(sem), 0);
        assert_eq!(rig.sp.read_regs(sem), 1);
        rig.write(SP_SEMAPHORE_REG, 0);
        assert_eq!(rig.sp.read_regs(sem), 0);
    }

    #[test]
    fn test_status_pairs() {
        let mut rig = Rig::new();
        // set sstep, set intr-break, set signal 2, set and clear signal 0 together
        rig.write(SP_STATUS_REG, 0x40 | 0x100 | (0x400 << 4) | 0x200 | 0x400);
        assert_eq!(
            rig.sp.status(),
            SP_STATUS_HALT | SP_STATUS_SSTEP | SP_STATUS_INTR_BREAK | SP_STATUS_TASKDONE
        );

        rig.write(SP_STATUS_REG, 0x20 | (0x200 << 4));
        assert_eq!(rig.sp.status(), SP_STATUS_HALT | SP_STATUS_INTR_BREAK);
    }

    #[test]
    fn test_status_interrupt_pair() {
        let mut rig = Rig::new();
        rig.write(SP_STATUS_REG, 0x10);
        assert_ne!(rig.mi.intr() & MI_INTR_SP, 0);
        rig.write(SP_STATUS_REG, 0x8);
        assert_eq!(rig.mi.intr() & MI_INTR_SP, 0);
    }

    #[test]
    fn test_clearing_halt_starts_task() {
        let mut rig = Rig::new();
        assert!(!rig.write(SP_STATUS_REG, 0x2), "setting halt never starts");
        assert!(rig.write(SP_STATUS_REG, 0x1 | 0x4));

        // Halt clear while broke is still set does not start
        let mut rig = Rig::new();
        rig.sp.regs[SP_STATUS_REG] |= SP_STATUS_BROKE;
        assert!(!rig.write(SP_STATUS_REG, 0x1));
    }

    #[test]
    fn test_task_scheduling_by_kind() {
        let mut rig = Rig::new();
        let mut backend = Recording {
            outcome: RspOutcome {
                sp_interrupt: true,
                dp_interrupt: true,
            },
            runs: 0,
        };
        let mut dpc = [0u32; 8];

        rig.mem.write_u32(MM_RSP_MEM + TASK_TYPE_OFFSET, 1, 0xffff_ffff);
        assert_eq!(rig.sp.task_kind(&rig.mem), TaskKind::Gfx);
        rig.sp
            .run_task(TaskKind::Gfx, &mut rig.mem, &mut backend, &mut dpc, &mut rig.cp0);
        assert_eq!(rig.cp0.remaining_cycles(EventKind::Sp), Some(1000));
        assert_eq!(rig.cp0.remaining_cycles(EventKind::Dp), Some(1000));

        let mut rig = Rig::new();
        rig.sp
            .run_task(TaskKind::Audio, &mut rig.mem, &mut backend, &mut dpc, &mut rig.cp0);
        assert_eq!(rig.cp0.remaining_cycles(EventKind::Sp), Some(4000));
        assert!(!rig.cp0.is_pending(EventKind::Dp));

        let mut rig = Rig::new();
        rig.sp
            .run_task(TaskKind::Other, &mut rig.mem, &mut backend, &mut dpc, &mut rig.cp0);
        assert_eq!(rig.cp0.remaining_cycles(EventKind::Sp), Some(0));
        assert_eq!(backend.runs, 3);
    }

    #[test]
    fn test_pc_keeps_high_bits_across_task() {
        let mut rig = Rig::new();
        rig.sp.write_regs2(MM_RSP_REGS2, 0x1234, 0xffff_ffff);
        assert_eq!(rig.sp.read_regs2(MM_RSP_REGS2), 0x234);
        let mut backend = Recording {
            outcome: RspOutcome::default(),
            runs: 0,
        };
        rig.sp.run_task(
            TaskKind::Other,
            &mut rig.mem,
            &mut backend,
            &mut [0u32; 8],
            &mut rig.cp0,
        );
        assert_eq!(rig.sp.read_regs2(MM_RSP_REGS2), 0x234);
        assert!(!rig.cp0.is_pending(EventKind::Sp));
    }

    #[test]
    fn test_interrupt_event() {
        let mut rig = Rig::new();
        rig.sp.regs[SP_STATUS_REG] = SP_STATUS_INTR_BREAK;
        rig.sp.interrupt_event(&mut rig.cp0, &mut rig.mi);
        assert_eq!(
            rig.sp.status(),
            SP_STATUS_INTR_BREAK | SP_STATUS_HALT | SP_STATUS_BROKE
        );
        assert_ne!(rig.mi.intr() & MI_INTR_SP, 0);
    }
}
