//! JSON snapshots of the device registers and the event queue.
//!
//! Memory contents (RDRAM, SP memory, cartridge) are not part of the
//! snapshot. Event deadlines are stored as trigger COUNT values and
//! re-derived from COUNT on restore.

use crate::device::Device;
use crate::memory::Handler;
use crate::pif::{ChannelSetup, PIF_CHANNELS_COUNT};
use crate::r4300::cp0::Cp0State;
use crate::rcp::ai::AiController;
use crate::rcp::mi::MiController;
use crate::rcp::pi::PiController;
use crate::rcp::rdp::RdpController;
use crate::rcp::ri::RiController;
use crate::rcp::rsp::RspController;
use crate::rcp::si::SiController;
use crate::rcp::vi::ViController;
use crate::rdram::{Rdram, RdramRemap};
use crate::N64Error;
use rcp_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

pub const SAVESTATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub version: u32,
    pub cp0: Cp0State,
    pub mi: MiController,
    pub vi: ViController,
    pub ai: AiController,
    pub pi: PiController,
    pub si: SiController,
    pub ri: RiController,
    pub rdram: Rdram,
    /// RDRAM reads go through the uncalibrated-module quirk
    pub rdram_corrupted: bool,
    pub sp: RspController,
    pub dp: RdpController,
    pub pif_channels: [ChannelSetup; PIF_CHANNELS_COUNT],
}

impl Device {
    pub fn snapshot(&self) -> DeviceState {
        DeviceState {
            version: SAVESTATE_VERSION,
            cp0: self.cp0.snapshot(),
            mi: self.mi.clone(),
            vi: self.vi.clone(),
            ai: self.ai.clone(),
            pi: self.pi.clone(),
            si: self.si.clone(),
            ri: self.ri.clone(),
            rdram: self.rdram.clone(),
            rdram_corrupted: self.dram_handler == Handler::RdramDramCorrupted,
            sp: self.sp.clone(),
            dp: self.dp.clone(),
            pif_channels: self.pif.channels,
        }
    }

    pub fn restore(&mut self, state: &DeviceState) -> Result<(), N64Error> {
        if state.version != SAVESTATE_VERSION {
            return Err(N64Error::InvalidState(format!(
                "unsupported version {}",
                state.version
            )));
        }

        self.cp0.restore(&state.cp0);
        self.mi = state.mi.clone();
        self.vi = state.vi.clone();
        self.ai = state.ai.clone();
        self.pi = state.pi.clone();
        self.si = state.si.clone();
        self.ri = state.ri.clone();
        self.rdram = state.rdram.clone();
        self.sp = state.sp.clone();
        self.dp = state.dp.clone();
        self.pif.channels = state.pif_channels;

        let remap = if state.rdram_corrupted {
            RdramRemap::Corrupted
        } else {
            RdramRemap::Plain
        };
        self.apply_dram_remap(remap);

        log(LogCategory::CPU, LogLevel::Info, || {
            format!(
                "state restored, {} pending events",
                state.cp0.events.len()
            )
        });
        Ok(())
    }

    pub fn save_state_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    pub fn load_state_json(&mut self, value: &serde_json::Value) -> Result<(), N64Error> {
        let state: DeviceState = serde_json::from_value(value.clone())
            .map_err(|e| N64Error::InvalidState(e.to_string()))?;
        self.restore(&state)
    }
}
