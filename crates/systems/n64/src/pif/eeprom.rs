//! Cartridge EEPROM on the fifth joybus channel.

use super::controller::{write_reply, JCMD_RESET, JCMD_STATUS};
use crate::backend::{JoybusDevice, MemoryStorage, StorageBackend};
use crate::config::EepromType;
use rcp_core::logging::{log, LogCategory, LogLevel};

pub const JCMD_EEPROM_READ: u8 = 0x04;
pub const JCMD_EEPROM_WRITE: u8 = 0x05;

const EEPROM_BLOCK_SIZE: usize = 8;

impl EepromType {
    /// Capacity in bytes
    pub fn size(self) -> usize {
        match self {
            EepromType::None => 0,
            EepromType::Eeprom4k => 0x200,
            EepromType::Eeprom16k => 0x800,
        }
    }

    fn id(self) -> u8 {
        match self {
            EepromType::Eeprom16k => 0xc0,
            _ => 0x80,
        }
    }
}

pub struct Eeprom {
    kind: EepromType,
    storage: Box<dyn StorageBackend>,
}

impl Eeprom {
    /// EEPROM over `storage`, or a blank (0xff) medium when none is given.
    pub fn new(kind: EepromType, storage: Option<Box<dyn StorageBackend>>) -> Self {
        let storage = storage.unwrap_or_else(|| Box::new(MemoryStorage::new(kind.size(), 0xff)));
        Self { kind, storage }
    }

    pub fn kind(&self) -> EepromType {
        self.kind
    }

    pub fn data(&self) -> &[u8] {
        self.storage.data()
    }

    fn block_range(&self, block: u8) -> Option<std::ops::Range<usize>> {
        let start = block as usize * EEPROM_BLOCK_SIZE;
        let end = start + EEPROM_BLOCK_SIZE;
        (end <= self.kind.size().min(self.storage.data().len())).then_some(start..end)
    }
}

impl JoybusDevice for Eeprom {
    fn process(&mut self, tx: &[u8], rx: &mut [u8]) -> bool {
        let Some(&cmd) = tx.first() else {
            return false;
        };

        match cmd {
            JCMD_STATUS | JCMD_RESET => {
                write_reply(rx, &[0x00, self.kind.id(), 0x00]);
            }
            JCMD_EEPROM_READ => {
                let block = tx.get(1).copied().unwrap_or(0);
                match self.block_range(block) {
                    Some(range) => write_reply(rx, &self.storage.data()[range]),
                    None => log(LogCategory::Dma, LogLevel::Warn, || {
                        format!("EEPROM read of invalid block {}", block)
                    }),
                }
            }
            JCMD_EEPROM_WRITE => {
                let block = tx.get(1).copied().unwrap_or(0);
                let payload = tx.get(2..2 + EEPROM_BLOCK_SIZE);
                match (self.block_range(block), payload) {
                    (Some(range), Some(payload)) => {
                        self.storage.data_mut()[range].copy_from_slice(payload);
                        self.storage.save();
                        write_reply(rx, &[0x00]);
                    }
                    _ => log(LogCategory::Dma, LogLevel::Warn, || {
                        format!("EEPROM write of invalid block {} ({} bytes)", block, tx.len())
                    }),
                }
            }
            _ => {
                log(LogCategory::Dma, LogLevel::Warn, || {
                    format!("unknown EEPROM command {:02X}", cmd)
                });
                return false;
            }
        }
        true
    }
}
