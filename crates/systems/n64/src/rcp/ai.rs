//! AI (Audio Interface) - sample DMA from RDRAM to the DAC
//!
//! The AI plays a buffer while a second one waits in a two-entry FIFO.
//! Playback time is modelled by the `Ai` event: it fires when slot 0 has
//! been consumed, at which point its samples are handed to the audio
//! backend and the queued buffer starts.
//!
//! ## Memory Map
//!
//! AI registers are memory-mapped at 0x04500000-0x04500017:
//! - 0x04500000: AI_DRAM_ADDR - RDRAM address of the next buffer
//! - 0x04500004: AI_LEN - Length in bytes; writing queues the buffer
//! - 0x04500008: AI_CONTROL - DMA enable
//! - 0x0450000C: AI_STATUS - FIFO state (write acknowledges AI interrupt)
//! - 0x04500010: AI_DACRATE - DAC clock divider
//! - 0x04500014: AI_BITRATE - Bits per sample minus one

use super::mi::{MiController, MI_INTR_AI};
use super::vi::ViController;
use crate::backend::AudioOut;
use crate::memory::{reg_index, MemBase};
use crate::r4300::cp0::Cp0;
use crate::r4300::interrupt::EventKind;
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::masked_write;
use serde::{Deserialize, Serialize};

pub const AI_DRAM_ADDR_REG: usize = 0;
pub const AI_LEN_REG: usize = 1;
pub const AI_CONTROL_REG: usize = 2;
pub const AI_STATUS_REG: usize = 3;
pub const AI_DACRATE_REG: usize = 4;
pub const AI_BITRATE_REG: usize = 5;
pub const AI_REGS_COUNT: usize = 6;

pub const AI_STATUS_BUSY: u32 = 0x4000_0000;
pub const AI_STATUS_FULL: u32 = 0x8000_0000;

const AI_LEN_MASK: u32 = 0x3fff8;
const DEFAULT_FREQUENCY: u32 = 44100;
const DEFAULT_BITS: u32 = 16;
/// Assumes 16-bit stereo whatever BITRATE says
const BYTES_PER_SAMPLE: u64 = 4;

/// One queued sample buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiDma {
    pub address: u32,
    pub length: u32,
    /// Cycles the buffer takes to play
    pub duration: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiController {
    pub regs: [u32; AI_REGS_COUNT],
    /// Slot 0 is playing, slot 1 is queued
    pub fifo: [AiDma; 2],
    /// Bytes of slot 0 not yet handed to the audio backend
    pub last_read: u32,
    /// The previous buffer ended on an 8 KiB boundary
    pub delayed_carry: bool,
    pub samples_format_changed: bool,
}

impl AiController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poweron(&mut self) {
        *self = Self::default();
    }

    pub fn status(&self) -> u32 {
        self.regs[AI_STATUS_REG]
    }

    /// Read an AI register.
    ///
    /// Not pure: reading LEN reports the bytes left in the playing buffer
    /// and pushes whatever was consumed since the last read to `audio`.
    pub fn read_regs(
        &mut self,
        address: u32,
        cp0: &Cp0,
        mem: &MemBase,
        audio: &mut dyn AudioOut,
    ) -> u32 {
        let reg = reg_index(address);
        if reg != AI_LEN_REG {
            return self.regs.get(reg).copied().unwrap_or(0);
        }

        let remaining = self.remaining_dma_length(cp0);
        if remaining < self.last_read {
            let consumed = self.fifo[0].length - self.last_read;
            self.push_samples(mem, audio, consumed, self.last_read - remaining);
            self.last_read = remaining;
        }
        remaining
    }

    fn remaining_dma_length(&self, cp0: &Cp0) -> u32 {
        let dma = &self.fifo[0];
        if dma.duration == 0 {
            return 0;
        }
        let Some(left) = cp0.remaining_cycles(EventKind::Ai) else {
            return 0;
        };
        let remaining = left.min(dma.duration as u64) * dma.length as u64 / dma.duration as u64;
        (remaining as u32) & !7
    }

    #[allow(clippy::too_many_arguments)]
    pub fn write_regs(
        &mut self,
        address: u32,
        value: u32,
        mask: u32,
        cp0: &mut Cp0,
        mi: &mut MiController,
        vi: &ViController,
        audio: &mut dyn AudioOut,
    ) {
        let reg = reg_index(address);
        match reg {
            AI_LEN_REG => {
                masked_write(&mut self.regs[AI_LEN_REG], value & AI_LEN_MASK, mask);
                if self.regs[AI_LEN_REG] != 0 {
                    self.fifo_push(cp0, vi, audio);
                }
            }
            AI_STATUS_REG => mi.clear(MI_INTR_AI, cp0),
            AI_DACRATE_REG | AI_BITRATE_REG => {
                if self.regs[reg] != value & mask {
                    self.samples_format_changed = true;
                }
                masked_write(&mut self.regs[reg], value, mask);
            }
            _ if reg < AI_REGS_COUNT => masked_write(&mut self.regs[reg], value, mask),
            _ => {}
        }
    }

    /// Playback time of the buffer currently in AI_LEN, in CPU cycles.
    fn dma_duration(&self, vi: &ViController) -> u32 {
        let samples_per_sec = (vi.clock / (1 + self.regs[AI_DACRATE_REG])) as u64;
        if samples_per_sec == 0 {
            return 0;
        }
        let length = self.regs[AI_LEN_REG] as u64;
        let cycles = length * vi.delay as u64 * vi.expected_refresh_rate as u64
            / (BYTES_PER_SAMPLE * samples_per_sec);
        cycles.min(u32::MAX as u64) as u32
    }

    fn fifo_push(&mut self, cp0: &mut Cp0, vi: &ViController, audio: &mut dyn AudioOut) {
        let dma = AiDma {
            address: self.regs[AI_DRAM_ADDR_REG],
            length: self.regs[AI_LEN_REG],
            duration: self.dma_duration(vi),
        };

        if self.regs[AI_STATUS_REG] & AI_STATUS_BUSY != 0 {
            self.fifo[1] = dma;
            self.regs[AI_STATUS_REG] |= AI_STATUS_FULL;
        } else {
            self.fifo[0] = dma;
            self.regs[AI_STATUS_REG] |= AI_STATUS_BUSY;
            self.do_dma(cp0, vi, audio);
        }
        debug_assert!(self.fifo_consistent());
    }

    fn fifo_pop(&mut self, cp0: &mut Cp0, vi: &ViController, audio: &mut dyn AudioOut) {
        if self.regs[AI_STATUS_REG] & AI_STATUS_FULL != 0 {
            self.fifo[0] = self.fifo[1];
            self.regs[AI_STATUS_REG] &= !AI_STATUS_FULL;
            self.do_dma(cp0, vi, audio);
        } else {
            self.regs[AI_STATUS_REG] &= !AI_STATUS_BUSY;
            self.delayed_carry = false;
        }
        debug_assert!(self.fifo_consistent());
    }

    /// Start playing slot 0.
    fn do_dma(&mut self, cp0: &mut Cp0, vi: &ViController, audio: &mut dyn AudioOut) {
        if self.samples_format_changed {
            let dacrate = self.regs[AI_DACRATE_REG];
            let bitrate = self.regs[AI_BITRATE_REG];
            let frequency = match dacrate {
                0 => DEFAULT_FREQUENCY,
                d => vi.clock / (1 + d),
            };
            let bits = match bitrate {
                0 => DEFAULT_BITS,
                b => 1 + b,
            };
            log(LogCategory::Audio, LogLevel::Debug, || {
                format!("AI: format {} Hz, {} bits", frequency, bits)
            });
            audio.set_format(frequency, bits);
            self.samples_format_changed = false;
        }

        let dma = &mut self.fifo[0];
        self.last_read = dma.length;

        if self.delayed_carry {
            dma.address = dma.address.wrapping_add(0x2000);
        }
        self.delayed_carry = dma.address.wrapping_add(dma.length) & 0x1fff == 0;

        log(LogCategory::Audio, LogLevel::Trace, || {
            format!(
                "AI: DMA {:08X} len {:X} for {} cycles",
                dma.address, dma.length, dma.duration
            )
        });
        cp0.add_interrupt_event(EventKind::Ai, dma.duration);
    }

    /// AI event: slot 0 finished playing.
    pub fn end_of_dma_event(
        &mut self,
        cp0: &mut Cp0,
        mi: &mut MiController,
        vi: &ViController,
        mem: &MemBase,
        audio: &mut dyn AudioOut,
    ) {
        if self.last_read != 0 {
            let consumed = self.fifo[0].length - self.last_read;
            self.push_samples(mem, audio, consumed, self.last_read);
            self.last_read = 0;
        }
        self.fifo_pop(cp0, vi, audio);
        mi.raise(MI_INTR_AI, cp0);
    }

    fn push_samples(&self, mem: &MemBase, audio: &mut dyn AudioOut, offset: u32, len: u32) {
        let start = self.fifo[0].address.wrapping_add(offset);
        match mem.bytes(start, len as usize) {
            Some(samples) => audio.push_samples(samples),
            None => log(LogCategory::Audio, LogLevel::Warn, || {
                format!("AI: samples at {:08X}+{:X} outside RDRAM", start, len)
            }),
        }
    }

    /// BUSY and FULL match FIFO occupancy.
    pub fn fifo_consistent(&self) -> bool {
        let status = self.regs[AI_STATUS_REG];
        status & AI_STATUS_FULL == 0 || status & AI_STATUS_BUSY != 0
    }
}
