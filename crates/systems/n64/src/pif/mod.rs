//! PIF - boot ROM, PIF RAM and the joybus channels
//!
//! Games talk to controllers and the cartridge EEPROM by DMAing a command
//! block into the 64-byte PIF RAM (0x1FC007C0-0x1FC007FF), letting the PIF
//! run it, and DMAing the replies back. The last byte of PIF RAM is the
//! control byte.
//!
//! # Command block format
//!
//! The block is scanned byte by byte, each channel taking the next entry:
//! - `0x00`: skip this channel
//! - `0xFF`: padding
//! - `0xFE`: end of setup, remaining channels are disabled
//! - `0xFD`: reset the channel's device
//! - otherwise `tx`, `rx` lengths (low 6 bits) followed by `tx` command bytes
//!   and `rx` reply bytes
//!
//! Channels 0-3 are the front controller ports, channel 4 the cartridge.

pub mod cic;
pub mod controller;
pub mod eeprom;

use crate::backend::JoybusDevice;
use crate::memory::{MemBase, MM_PIF_MEM, PIF_RAM_SIZE, PIF_ROM_SIZE};
use cic::Cic;
use controller::{GameController, JCMD_RESET};
use eeprom::Eeprom;
use rcp_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Physical address of PIF RAM
pub const PIF_RAM_ADDR: u32 = MM_PIF_MEM + PIF_ROM_SIZE;
pub const PIF_CHANNELS_COUNT: usize = 5;
pub const CONTROLLER_PORTS: usize = 4;
const CART_CHANNEL: usize = 4;

const RAM_LEN: usize = PIF_RAM_SIZE as usize;
const CONTROL_BYTE: usize = RAM_LEN - 1;

/// Control byte bits
const PIF_CMD_SETUP_CHANNELS: u8 = 0x01;
const PIF_CMD_CIC_CHALLENGE: u8 = 0x02;
const PIF_CMD_TERMINATE_BOOT: u8 = 0x08;
const PIF_CMD_LOCK: u8 = 0x30;
const PIF_LOCKED: u8 = 0x80;

/// Where a channel's command sits in PIF RAM after setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSetup {
    #[default]
    Disabled,
    /// Send a reset to the device and discard the reply
    Reset,
    /// `offset` is the index of the tx length byte
    Command { offset: usize },
}

pub struct Pif {
    pub channels: [ChannelSetup; PIF_CHANNELS_COUNT],
    pub controllers: [GameController; CONTROLLER_PORTS],
    pub eeprom: Option<Eeprom>,
    /// Devices overriding the built-in one on a channel
    custom: [Option<Box<dyn JoybusDevice>>; PIF_CHANNELS_COUNT],
    pub cic: Cic,
}

impl Pif {
    /// Controllers plugged in every port, plus an optional cartridge EEPROM.
    pub fn new(eeprom: Option<Eeprom>) -> Self {
        Self {
            channels: [ChannelSetup::Disabled; PIF_CHANNELS_COUNT],
            controllers: std::array::from_fn(|_| GameController::new(true)),
            eeprom,
            custom: std::array::from_fn(|_| None),
            cic: Cic::default(),
        }
    }

    /// Clear PIF RAM and publish the CIC seed for the boot code.
    pub fn poweron(&mut self, mem: &mut MemBase) {
        self.channels = [ChannelSetup::Disabled; PIF_CHANNELS_COUNT];
        if let Some(ram) = mem.bytes_mut(PIF_RAM_ADDR, RAM_LEN) {
            ram.fill(0);
            ram[0x26] = self.cic.seed;
            ram[0x27] = self.cic.seed;
        }
    }

    /// Replace the device on `channel`; `None` restores the built-in one.
    pub fn set_device(&mut self, channel: usize, device: Option<Box<dyn JoybusDevice>>) {
        if let Some(slot) = self.custom.get_mut(channel) {
            *slot = device;
        }
    }

    fn device(&mut self, channel: usize) -> Option<&mut dyn JoybusDevice> {
        if let Some(custom) = self.custom[channel].as_mut() {
            return Some(custom.as_mut());
        }
        if channel < CONTROLLER_PORTS {
            return Some(&mut self.controllers[channel]);
        }
        if channel == CART_CHANNEL {
            return self.eeprom.as_mut().map(|e| e as &mut dyn JoybusDevice);
        }
        None
    }

    /// Act on the control byte after the CPU handed PIF RAM over.
    pub fn process_pif_ram(&mut self, mem: &mut MemBase) {
        let Some(ram) = mem.bytes_mut(PIF_RAM_ADDR, RAM_LEN) else {
            return;
        };
        let commands = ram[CONTROL_BYTE];
        let mut clear = 0u8;

        if commands & PIF_CMD_SETUP_CHANNELS != 0 {
            self.setup_channels(ram);
            clear |= PIF_CMD_SETUP_CHANNELS;
        }
        if commands & PIF_CMD_CIC_CHALLENGE != 0 {
            log(LogCategory::Stubs, LogLevel::Warn, || {
                "PIF: CIC challenge not supported".to_string()
            });
            clear |= PIF_CMD_CIC_CHALLENGE;
        }
        if commands & PIF_CMD_TERMINATE_BOOT != 0 {
            clear |= PIF_CMD_TERMINATE_BOOT;
        }
        if commands & PIF_CMD_LOCK == PIF_CMD_LOCK {
            ram[CONTROL_BYTE] = PIF_LOCKED;
            return;
        }
        ram[CONTROL_BYTE] &= !clear;
    }

    fn setup_channels(&mut self, ram: &[u8]) {
        let mut i = 0;
        let mut k = 0;
        while i < RAM_LEN && k < PIF_CHANNELS_COUNT {
            match ram[i] {
                0x00 => {
                    self.channels[k] = ChannelSetup::Disabled;
                    k += 1;
                    i += 1;
                }
                0xff => i += 1,
                0xfe => break,
                0xfd => {
                    self.channels[k] = ChannelSetup::Reset;
                    k += 1;
                    i += 1;
                }
                _ if i + 1 < RAM_LEN && ram[i + 1] == 0xfe => {
                    // stray byte in front of an end marker
                    i += 1;
                }
                _ if i + 2 >= RAM_LEN => {
                    log(LogCategory::Dma, LogLevel::Warn, || {
                        format!("PIF: truncated command at {:02X}", i)
                    });
                    break;
                }
                b => {
                    let tx = (b & 0x3f) as usize;
                    let rx = (ram[i + 1] & 0x3f) as usize;
                    self.channels[k] = ChannelSetup::Command { offset: i };
                    k += 1;
                    i += 2 + tx + rx;
                }
            }
        }
        for channel in &mut self.channels[k..] {
            *channel = ChannelSetup::Disabled;
        }
    }

    /// Run every configured channel, leaving replies in PIF RAM.
    pub fn update_pif_ram(&mut self, mem: &mut MemBase) {
        let Some(ram) = mem.bytes_mut(PIF_RAM_ADDR, RAM_LEN) else {
            return;
        };
        for k in 0..PIF_CHANNELS_COUNT {
            match self.channels[k] {
                ChannelSetup::Disabled => {}
                ChannelSetup::Reset => {
                    if let Some(dev) = self.device(k) {
                        dev.process(&[JCMD_RESET], &mut [0u8; 3]);
                    }
                }
                ChannelSetup::Command { offset } => self.run_command(k, offset, ram),
            }
        }
    }

    fn run_command(&mut self, channel: usize, offset: usize, ram: &mut [u8]) {
        let tx_len = (ram[offset] & 0x3f) as usize;
        let rx_len = (ram[offset + 1] & 0x3f) as usize;
        let tx_start = offset + 2;
        let rx_start = tx_start + tx_len;
        if rx_start + rx_len > RAM_LEN {
            log(LogCategory::Dma, LogLevel::Warn, || {
                format!(
                    "PIF: channel {} block overruns PIF RAM (tx {}, rx {})",
                    channel, tx_len, rx_len
                )
            });
            return;
        }

        let answered = {
            let (head, tail) = ram.split_at_mut(rx_start);
            let tx = &head[tx_start..];
            let rx = &mut tail[..rx_len];
            match self.device(channel) {
                Some(dev) => dev.process(tx, rx),
                None => false,
            }
        };
        if !answered {
            ram[offset + 1] |= 0x80;
        }
    }
}
