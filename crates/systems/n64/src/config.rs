//! Device construction parameters.
//!
//! A [`DeviceConfig`] is everything the front-end decides before power-on:
//! memory size, CPU timing ratios, video standard and how the physical
//! backing is allocated. It round-trips through JSON so front-ends can keep
//! it next to their own settings file.

use crate::N64Error;
use serde::{Deserialize, Serialize};

pub const RDRAM_4MB: u32 = 0x0040_0000;
pub const RDRAM_8MB: u32 = 0x0080_0000;

/// Video standard; selects VI clock and expected refresh rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TvStandard {
    #[default]
    Ntsc,
    Pal,
    Mpal,
}

impl TvStandard {
    /// VI clock in Hz
    pub fn vi_clock(self) -> u32 {
        match self {
            TvStandard::Ntsc => 48_681_812,
            TvStandard::Pal => 49_656_530,
            TvStandard::Mpal => 48_628_316,
        }
    }

    /// Frames per second the guest expects
    pub fn refresh_rate(self) -> u32 {
        match self {
            TvStandard::Pal => 50,
            TvStandard::Ntsc | TvStandard::Mpal => 60,
        }
    }
}

/// How the physical backing buffer is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BackingPreference {
    /// Full 512 MiB mirror, falling back to the compressed layout
    #[default]
    Auto,
    /// Full mirror only
    Full,
    /// Compressed layout only
    Compressed,
}

/// Cartridge EEPROM fitted on joybus channel 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EepromType {
    #[default]
    None,
    Eeprom4k,
    Eeprom16k,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// RDRAM size in bytes, 4 or 8 MiB
    pub dram_size: u32,
    /// COUNT increments per executed instruction
    pub count_per_op: u32,
    /// Cycles between an SI DMA request and its completion interrupt
    pub si_dma_duration: u32,
    /// Add a small pseudo-random delay to SI completion
    pub randomize_interrupt: bool,
    pub random_seed: u64,
    pub tv_standard: TvStandard,
    pub backing: BackingPreference,
    /// Upper bound on the backing allocation, in bytes
    pub max_backing_bytes: Option<usize>,
    pub eeprom: EepromType,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            dram_size: RDRAM_8MB,
            count_per_op: 2,
            si_dma_duration: 0x900,
            randomize_interrupt: false,
            random_seed: 0,
            tv_standard: TvStandard::Ntsc,
            backing: BackingPreference::Auto,
            max_backing_bytes: None,
            eeprom: EepromType::None,
        }
    }
}

impl DeviceConfig {
    pub fn from_json(text: &str) -> Result<Self, N64Error> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| N64Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), N64Error> {
        if self.dram_size != RDRAM_4MB && self.dram_size != RDRAM_8MB {
            return Err(N64Error::InvalidConfig(format!(
                "dram_size must be 4 or 8 MiB, got {:#x}",
                self.dram_size
            )));
        }
        if self.count_per_op == 0 {
            return Err(N64Error::InvalidConfig(
                "count_per_op must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
