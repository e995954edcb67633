//! CIC lockout chip identification.
//!
//! The boot code (IPL3) in the cartridge header is paired with a specific
//! CIC. The variant is recognised from a CRC32 of IPL3, and its seed is
//! what the PIF hands to the boot code at power-on.

use rcp_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// IPL3 lives at ROM 0x40..0x1000
pub const IPL3_OFFSET: usize = 0x40;
pub const IPL3_SIZE: usize = 0xfc0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CicVersion {
    X101,
    #[default]
    X102,
    X103,
    X105,
    X106,
    /// 64DD boot chips
    Dd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cic {
    pub version: CicVersion,
    pub seed: u8,
}

impl Default for Cic {
    fn default() -> Self {
        Self {
            version: CicVersion::X102,
            seed: 0x3f,
        }
    }
}

impl Cic {
    /// Identify the CIC from the IPL3 bytes; unknown code falls back to 6102.
    pub fn detect(ipl3: &[u8]) -> Self {
        let crc = crc32fast::hash(&ipl3[..ipl3.len().min(IPL3_SIZE)]);
        let (version, seed) = match crc {
            0x6170_a4a1 => (CicVersion::X101, 0x3f),
            0x90bb_6cb5 => (CicVersion::X102, 0x3f),
            0x009e_9ea3 => (CicVersion::X102, 0x3f),
            0x0b05_0ee0 => (CicVersion::X103, 0x78),
            0x98bc_2c86 => (CicVersion::X105, 0x91),
            0xacc8_580a => (CicVersion::X106, 0x85),
            0x0e01_8159 | 0x10c6_8b18 | 0xbc60_5d0a | 0x502c_4466 | 0x0c96_5795 => {
                (CicVersion::Dd, 0xdd)
            }
            _ => {
                log(LogCategory::Dma, LogLevel::Warn, || {
                    format!("Unknown CIC type ({:08X}), using 6102", crc)
                });
                return Self::default();
            }
        };
        log(LogCategory::Dma, LogLevel::Info, || {
            format!("CIC {:?}, seed {:02X}", version, seed)
        });
        Self { version, seed }
    }
}
