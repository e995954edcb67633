//! Physical address decoding.
//!
//! The 32-bit physical address space is split into 65536 regions of 64 KiB,
//! one per `address >> 16`. Each region has a read handler and a write
//! handler. Handlers are identities ([`Handler`]); the [`Device`](crate::Device)
//! owns the controllers and resolves a handler to the controller that
//! services it.
//!
//! ## Memory Map
//!
//! - 0x00000000: RDRAM (4 or 8 MiB)
//! - 0x03F00000: RDRAM registers
//! - 0x04000000: RSP DMEM/IMEM
//! - 0x04040000: RSP registers
//! - 0x04080000: RSP PC/IBIST
//! - 0x04100000: RDP command registers (DPC)
//! - 0x04200000: RDP span registers (DPS)
//! - 0x04300000: MI
//! - 0x04400000: VI
//! - 0x04500000: AI
//! - 0x04600000: PI
//! - 0x04700000: RI
//! - 0x04800000: SI
//! - 0x05000000: cartridge domain 2 address 1 (64DD registers)
//! - 0x06000000: 64DD IPL ROM
//! - 0x08000000: cartridge domain 2 address 2 (SRAM)
//! - 0x10000000: cartridge ROM
//! - 0x1FC00000: PIF ROM and RAM
//! - 0x1FD00000: cartridge domain 3

pub mod backing;

use rcp_core::logging::{log, LogCategory, LogLevel};

pub use backing::MemBase;

pub const MM_RDRAM_DRAM: u32 = 0x0000_0000;
pub const MM_RDRAM_REGS: u32 = 0x03f0_0000;
pub const MM_RSP_MEM: u32 = 0x0400_0000;
pub const MM_RSP_REGS: u32 = 0x0404_0000;
pub const MM_RSP_REGS2: u32 = 0x0408_0000;
pub const MM_DPC_REGS: u32 = 0x0410_0000;
pub const MM_DPS_REGS: u32 = 0x0420_0000;
pub const MM_MI_REGS: u32 = 0x0430_0000;
pub const MM_VI_REGS: u32 = 0x0440_0000;
pub const MM_AI_REGS: u32 = 0x0450_0000;
pub const MM_PI_REGS: u32 = 0x0460_0000;
pub const MM_RI_REGS: u32 = 0x0470_0000;
pub const MM_SI_REGS: u32 = 0x0480_0000;
pub const MM_DOM2_ADDR1: u32 = 0x0500_0000;
pub const MM_DD_ROM: u32 = 0x0600_0000;
pub const MM_DOM2_ADDR2: u32 = 0x0800_0000;
pub const MM_CART_ROM: u32 = 0x1000_0000;
pub const MM_PIF_MEM: u32 = 0x1fc0_0000;
pub const MM_CART_DOM3: u32 = 0x1fd0_0000;

pub const RDRAM_MAX_SIZE: u32 = 0x0080_0000;
pub const CART_ROM_MAX_SIZE: u32 = 0x0400_0000;
pub const SP_MEM_SIZE: u32 = 0x2000;
pub const DD_ROM_MAX_SIZE: u32 = 0x0040_0000;
pub const PIF_ROM_SIZE: u32 = 0x7c0;
pub const PIF_RAM_SIZE: u32 = 0x40;

const REGION_COUNT: usize = 0x1_0000;

/// Register index of an aligned access inside a 64 KiB register window
#[inline]
pub fn reg_index(address: u32) -> usize {
    ((address & 0xffff) >> 2) as usize
}

/// Open-bus value: the low address half mirrored into both halves
#[inline]
pub fn open_bus_value(address: u32) -> u32 {
    let low = address & 0xffff;
    low | (low << 16)
}

/// Classification of a region, reported to debuggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemType {
    Nothing,
    Rdram,
    RdramReg,
    RspMem,
    RspReg,
    Rsp,
    Dp,
    Dps,
    Mi,
    Vi,
    Ai,
    Pi,
    Ri,
    Si,
    Dd,
    FlashRamStat,
    Rom,
    Pif,
}

/// Identity of the component servicing a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    OpenBus,
    RdramDram,
    /// RDRAM with the uncalibrated-module read quirk installed
    RdramDramCorrupted,
    /// RDRAM pages overlapped by a tracked framebuffer
    RdramFb,
    RdramRegs,
    RspMem,
    RspRegs,
    RspRegs2,
    DpcRegs,
    DpsRegs,
    MiRegs,
    ViRegs,
    AiRegs,
    PiRegs,
    RiRegs,
    SiRegs,
    DdRegs,
    CartDom2,
    CartRom,
    PifMem,
    /// Wrapper installed by breakpoint activation; the saved handler does the access
    Breakpoint,
}

/// One entry of the boot-time memory map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemMapping {
    pub begin: u32,
    /// Inclusive
    pub end: u32,
    pub mem_type: MemType,
    pub handler: Handler,
}

impl MemMapping {
    pub const fn new(begin: u32, end: u32, mem_type: MemType, handler: Handler) -> Self {
        Self {
            begin,
            end,
            mem_type,
            handler,
        }
    }
}

/// Breakpoint flag bits per region
pub const BP_READ: u8 = 0x1;
pub const BP_WRITE: u8 = 0x2;

/// The 64K-region dispatch table.
pub struct MemoryBus {
    read: Vec<Handler>,
    write: Vec<Handler>,
    types: Vec<MemType>,
    saved_read: Vec<Handler>,
    saved_write: Vec<Handler>,
    bp_flags: Vec<u8>,
}

impl MemoryBus {
    /// Every region starts as open bus.
    pub fn new() -> Self {
        Self {
            read: vec![Handler::OpenBus; REGION_COUNT],
            write: vec![Handler::OpenBus; REGION_COUNT],
            types: vec![MemType::Nothing; REGION_COUNT],
            saved_read: vec![Handler::OpenBus; REGION_COUNT],
            saved_write: vec![Handler::OpenBus; REGION_COUNT],
            bp_flags: vec![0; REGION_COUNT],
        }
    }

    /// Install `handler` on every region touched by `[begin, end]`.
    ///
    /// Later calls overwrite earlier ones. Regions with an active breakpoint
    /// wrapper keep the wrapper and get the new handler as their saved one.
    pub fn map(&mut self, begin: u32, end: u32, mem_type: MemType, handler: Handler) {
        debug_assert!(begin <= end, "inverted mapping {:08X}-{:08X}", begin, end);
        debug_assert!(handler != Handler::Breakpoint);

        log(LogCategory::Bus, LogLevel::Trace, || {
            format!(
                "map {:08X}-{:08X} -> {:?} ({:?})",
                begin, end, handler, mem_type
            )
        });

        for region in (begin >> 16) as usize..=(end >> 16) as usize {
            self.types[region] = mem_type;
            if self.bp_flags[region] & BP_READ != 0 {
                self.saved_read[region] = handler;
            } else {
                self.read[region] = handler;
            }
            if self.bp_flags[region] & BP_WRITE != 0 {
                self.saved_write[region] = handler;
            } else {
                self.write[region] = handler;
            }
        }
    }

    pub fn apply_mem_mapping(&mut self, mapping: &MemMapping) {
        self.map(mapping.begin, mapping.end, mapping.mem_type, mapping.handler);
    }

    #[inline]
    pub fn read_handler(&self, address: u32) -> Handler {
        self.read[(address >> 16) as usize]
    }

    #[inline]
    pub fn write_handler(&self, address: u32) -> Handler {
        self.write[(address >> 16) as usize]
    }

    /// Handler hidden behind a read breakpoint wrapper (or the live one)
    pub fn saved_read_handler(&self, address: u32) -> Handler {
        let region = (address >> 16) as usize;
        if self.bp_flags[region] & BP_READ != 0 {
            self.saved_read[region]
        } else {
            self.read[region]
        }
    }

    pub fn saved_write_handler(&self, address: u32) -> Handler {
        let region = (address >> 16) as usize;
        if self.bp_flags[region] & BP_WRITE != 0 {
            self.saved_write[region]
        } else {
            self.write[region]
        }
    }

    pub fn mem_type(&self, address: u32) -> MemType {
        self.types[(address >> 16) as usize]
    }

    pub fn breakpoint_flags(&self, address: u32) -> u8 {
        self.bp_flags[(address >> 16) as usize]
    }

    pub fn activate_read_breakpoint(&mut self, address: u32) {
        let region = (address >> 16) as usize;
        if self.bp_flags[region] & BP_READ == 0 {
            self.saved_read[region] = self.read[region];
            self.read[region] = Handler::Breakpoint;
            self.bp_flags[region] |= BP_READ;
        }
    }

    pub fn deactivate_read_breakpoint(&mut self, address: u32) {
        let region = (address >> 16) as usize;
        if self.bp_flags[region] & BP_READ != 0 {
            self.read[region] = self.saved_read[region];
            self.bp_flags[region] &= !BP_READ;
        }
    }

    pub fn activate_write_breakpoint(&mut self, address: u32) {
        let region = (address >> 16) as usize;
        if self.bp_flags[region] & BP_WRITE == 0 {
            self.saved_write[region] = self.write[region];
            self.write[region] = Handler::Breakpoint;
            self.bp_flags[region] |= BP_WRITE;
        }
    }

    pub fn deactivate_write_breakpoint(&mut self, address: u32) {
        let region = (address >> 16) as usize;
        if self.bp_flags[region] & BP_WRITE != 0 {
            self.write[region] = self.saved_write[region];
            self.bp_flags[region] &= !BP_WRITE;
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_region_defaults_to_open_bus() {
        let bus = MemoryBus::new();
        for addr in [0u32, 0x0430_0000, 0x8000_0000, 0xffff_fffc] {
            assert_eq!(bus.read_handler(addr), Handler::OpenBus);
            assert_eq!(bus.write_handler(addr), Handler::OpenBus);
            assert_eq!(bus.mem_type(addr), MemType::Nothing);
        }
    }

    #[test]
    fn test_open_bus_value_mirrors_low_half() {
        assert_eq!(open_bus_value(0x1234_5678), 0x5678_5678);
        assert_eq!(open_bus_value(0x0000_0000), 0);
        assert_eq!(open_bus_value(0xffff_ffff), 0xffff_ffff);
    }

    #[test]
    fn test_map_covers_whole_regions() {
        let mut bus = MemoryBus::new();
        bus.map(MM_MI_REGS, MM_MI_REGS + 4, MemType::Mi, Handler::MiRegs);

        assert_eq!(bus.read_handler(MM_MI_REGS + 0xfffc), Handler::MiRegs);
        assert_eq!(bus.read_handler(MM_MI_REGS + 0x1_0000), Handler::OpenBus);
        assert_eq!(bus.mem_type(MM_MI_REGS), MemType::Mi);
    }

    #[test]
    fn test_map_then_clear_restores_open_bus() {
        let mut bus = MemoryBus::new();
        bus.map(0x1000_0000, 0x1fff_ffff, MemType::Rom, Handler::CartRom);
        bus.map(0x0000_0000, 0xffff_ffff, MemType::Nothing, Handler::OpenBus);

        for addr in [0x1000_0000u32, 0x1abc_0000, 0x1fff_fffc] {
            assert_eq!(bus.read_handler(addr), Handler::OpenBus);
        }
    }

    #[test]
    fn test_later_mapping_wins() {
        let mut bus = MemoryBus::new();
        bus.map(0x0500_0000, 0x05ff_ffff, MemType::Nothing, Handler::OpenBus);
        bus.map(0x0500_0000, 0x0500_ffff, MemType::Dd, Handler::DdRegs);

        assert_eq!(bus.read_handler(0x0500_0508), Handler::DdRegs);
        assert_eq!(bus.read_handler(0x0501_0000), Handler::OpenBus);
    }

    #[test]
    fn test_breakpoint_activation_is_idempotent() {
        let mut bus = MemoryBus::new();
        bus.map(MM_VI_REGS, MM_VI_REGS + 0xffff, MemType::Vi, Handler::ViRegs);

        bus.activate_read_breakpoint(MM_VI_REGS);
        bus.activate_read_breakpoint(MM_VI_REGS);
        assert_eq!(bus.read_handler(MM_VI_REGS), Handler::Breakpoint);
        assert_eq!(bus.saved_read_handler(MM_VI_REGS), Handler::ViRegs);
        // Write side untouched
        assert_eq!(bus.write_handler(MM_VI_REGS), Handler::ViRegs);

        bus.deactivate_read_breakpoint(MM_VI_REGS);
        bus.deactivate_read_breakpoint(MM_VI_REGS);
        assert_eq!(bus.read_handler(MM_VI_REGS), Handler::ViRegs);
        assert_eq!(bus.breakpoint_flags(MM_VI_REGS), 0);
    }

    #[test]
    fn test_read_and_write_breakpoints_are_independent() {
        let mut bus = MemoryBus::new();
        bus.map(MM_AI_REGS, MM_AI_REGS + 0xffff, MemType::Ai, Handler::AiRegs);

        bus.activate_read_breakpoint(MM_AI_REGS);
        bus.activate_write_breakpoint(MM_AI_REGS);
        assert_eq!(bus.breakpoint_flags(MM_AI_REGS), BP_READ | BP_WRITE);

        bus.deactivate_read_breakpoint(MM_AI_REGS);
        assert_eq!(bus.read_handler(MM_AI_REGS), Handler::AiRegs);
        assert_eq!(bus.write_handler(MM_AI_REGS), Handler::Breakpoint);
    }

    #[test]
    fn test_map_under_breakpoint_updates_saved_handler() {
        let mut bus = MemoryBus::new();
        bus.map(0, 0xffff, MemType::Rdram, Handler::RdramDram);
        bus.activate_read_breakpoint(0);

        bus.map(0, 0xffff, MemType::Rdram, Handler::RdramFb);
        assert_eq!(bus.read_handler(0), Handler::Breakpoint);
        assert_eq!(bus.write_handler(0), Handler::RdramFb);

        bus.deactivate_read_breakpoint(0);
        assert_eq!(bus.read_handler(0), Handler::RdramFb);
    }

    #[test]
    fn test_reg_index() {
        assert_eq!(reg_index(MM_SI_REGS + 0x18), 6);
        assert_eq!(reg_index(MM_PI_REGS + 0x30), 12);
    }
}
