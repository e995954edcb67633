//! N64 memory-mapped I/O and interrupt timing core.
//!
//! Everything the R4300 sees outside of its own registers lives here:
//!
//! - **Bus**: 64 KiB-granular physical address decoding ([`memory`])
//! - **RCP**: MI, VI, AI, PI, SI, RI and the RSP/RDP front-ends ([`rcp`])
//! - **RDRAM**: module registers and the uncalibrated-read quirk ([`rdram`])
//! - **PIF**: joybus channels, controllers, EEPROM and CIC ([`pif`])
//! - **Cartridge**: ROM and SRAM ([`cart`])
//! - **Timing**: the CP0 COUNT/COMPARE timeline and event queue ([`r4300`])
//!
//! The instruction engine, graphics, audio and RSP microcode are supplied
//! by the front-end through [`rcp_core::Cpu`] and the traits in [`backend`].

#![allow(clippy::upper_case_acronyms)]

pub mod backend;
pub mod cart;
pub mod config;
pub mod dd;
pub mod debugger;
pub mod device;
pub mod memory;
pub mod pif;
pub mod r4300;
pub mod rcp;
pub mod rdram;
pub mod savestate;

use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::{types::FrameStats, Cpu, MountPointInfo, System};
use thiserror::Error;

pub use backend::Backends;
pub use config::DeviceConfig;
pub use device::Device;
pub use pif::controller::{ControllerButtons, ControllerState};
pub use r4300::IdleEngine;
pub use savestate::DeviceState;

#[derive(Error, Debug)]
pub enum N64Error {
    #[error("Could not allocate {requested} bytes of physical backing")]
    BackingAllocation { requested: usize },
    #[error("Invalid ROM format: {0}")]
    InvalidRom(String),
    #[error("ROM too large: {0} bytes")]
    RomTooLarge(usize),
    #[error("No cartridge mounted")]
    NoCartridge,
    #[error("Invalid mount point: {0}")]
    InvalidMountPoint(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid save state: {0}")]
    InvalidState(String),
}

const CARTRIDGE_MOUNT: &str = "Cartridge";

/// Give up on a frame after this many cycles without a vertical interrupt
/// (about 20 NTSC frames).
const MAX_FRAME_CYCLES: u64 = 1 << 24;

/// A [`Device`] driven by an execution engine, one video frame at a time.
pub struct N64System {
    device: Device,
    engine: Box<dyn Cpu<Device>>,
    frames: u64,
}

impl N64System {
    pub fn new(
        config: DeviceConfig,
        backends: Backends,
        engine: Box<dyn Cpu<Device>>,
    ) -> Result<Self, N64Error> {
        let mut device = Device::new(config, backends)?;
        device.poweron();
        Ok(Self {
            device,
            engine,
            frames: 0,
        })
    }

    /// Headless system with null backends and an [`IdleEngine`].
    pub fn headless(config: DeviceConfig) -> Result<Self, N64Error> {
        Self::new(config, Backends::default(), Box::<IdleEngine>::default())
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    pub fn set_controller(&mut self, port: usize, state: ControllerState) {
        self.device.set_controller(port, state);
    }

    /// Press the reset button.
    pub fn reset_soft(&mut self) {
        self.device.reset_soft();
    }
}

impl System for N64System {
    type Error = N64Error;

    fn reset(&mut self) {
        self.device.poweron();
        self.engine.reset(&mut self.device);
        self.frames = 0;
    }

    fn step_frame(&mut self) -> Result<FrameStats, Self::Error> {
        if !self.device.cartridge().is_loaded() {
            return Err(N64Error::NoCartridge);
        }

        let start = self.device.cp0().cycles();
        let frame = self.device.vi().frames;
        let mut events = 0;
        while self.device.vi().frames == frame {
            if self.device.cp0().cycles() - start >= MAX_FRAME_CYCLES {
                log(LogCategory::Video, LogLevel::Warn, || {
                    format!("no vertical interrupt in {} cycles", MAX_FRAME_CYCLES)
                });
                break;
            }
            events += self.device.step(&mut *self.engine);
        }

        self.frames += 1;
        if self.frames % 60 == 0 {
            log(LogCategory::Video, LogLevel::Info, || {
                format!("N64: Frame {} complete", self.frames)
            });
        }

        Ok(FrameStats {
            cycles: self.device.cp0().cycles() - start,
            events,
        })
    }

    fn save_state(&self) -> serde_json::Value {
        self.device.save_state_json()
    }

    fn load_state(&mut self, v: &serde_json::Value) -> Result<(), serde_json::Error> {
        let state: DeviceState = serde_json::from_value(v.clone())?;
        self.device
            .restore(&state)
            .map_err(<serde_json::Error as serde::de::Error>::custom)
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: CARTRIDGE_MOUNT.to_string(),
            name: "Cartridge Slot".to_string(),
            extensions: vec!["z64".to_string(), "n64".to_string(), "v64".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        if mount_point_id != CARTRIDGE_MOUNT {
            return Err(N64Error::InvalidMountPoint(mount_point_id.to_string()));
        }

        self.device.insert_cartridge(data)?;
        self.reset();
        Ok(())
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        if mount_point_id != CARTRIDGE_MOUNT {
            return Err(N64Error::InvalidMountPoint(mount_point_id.to_string()));
        }

        self.device.eject_cartridge();
        Ok(())
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        mount_point_id == CARTRIDGE_MOUNT && self.device.cartridge().is_loaded()
    }
}
