//! Memory breakpoints.
//!
//! A breakpoint covers an inclusive physical address range. Adding one
//! installs the checking wrapper over every 64 KiB region it touches; the
//! wrapper records a [`BreakpointHit`] for each matching access and then
//! performs the access through the handler it displaced.

use crate::memory::{MemoryBus, BP_READ, BP_WRITE};
use rcp_core::logging::{log, LogCategory, LogLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub start: u32,
    /// Inclusive
    pub end: u32,
    /// `BP_READ` and/or `BP_WRITE`
    pub flags: u8,
}

impl Breakpoint {
    fn regions(&self) -> std::ops::RangeInclusive<u32> {
        (self.start >> 16)..=(self.end >> 16)
    }

    fn covers_region(&self, region: u32, flag: u8) -> bool {
        self.flags & flag != 0 && self.regions().contains(&region)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointHit {
    pub address: u32,
    pub size: usize,
    /// `BP_READ` or `BP_WRITE`
    pub flags: u8,
}

#[derive(Debug, Default)]
pub struct Debugger {
    breakpoints: Vec<Option<Breakpoint>>,
    hits: Vec<BreakpointHit>,
}

impl Debugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id to pass to [`remove`](Self::remove).
    pub fn add(&mut self, bus: &mut MemoryBus, start: u32, end: u32, flags: u8) -> usize {
        let bp = Breakpoint {
            start: start.min(end),
            end: start.max(end),
            flags: flags & (BP_READ | BP_WRITE),
        };
        for region in bp.regions() {
            let address = region << 16;
            if bp.flags & BP_READ != 0 {
                bus.activate_read_breakpoint(address);
            }
            if bp.flags & BP_WRITE != 0 {
                bus.activate_write_breakpoint(address);
            }
        }

        let id = match self.breakpoints.iter().position(Option::is_none) {
            Some(free) => {
                self.breakpoints[free] = Some(bp);
                free
            }
            None => {
                self.breakpoints.push(Some(bp));
                self.breakpoints.len() - 1
            }
        };
        log(LogCategory::Bus, LogLevel::Debug, || {
            format!(
                "breakpoint {} at {:08X}-{:08X} (flags {:x})",
                id, bp.start, bp.end, bp.flags
            )
        });
        id
    }

    /// Remove a breakpoint; regions still covered by another one stay wrapped.
    pub fn remove(&mut self, bus: &mut MemoryBus, id: usize) -> Option<Breakpoint> {
        let bp = self.breakpoints.get_mut(id)?.take()?;
        for region in bp.regions() {
            let address = region << 16;
            let still = |flag| {
                self.breakpoints
                    .iter()
                    .flatten()
                    .any(|other| other.covers_region(region, flag))
            };
            if bp.flags & BP_READ != 0 && !still(BP_READ) {
                bus.deactivate_read_breakpoint(address);
            }
            if bp.flags & BP_WRITE != 0 && !still(BP_WRITE) {
                bus.deactivate_write_breakpoint(address);
            }
        }
        Some(bp)
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.iter().flatten()
    }

    /// Record a hit if an access of `size` bytes at `address` matches.
    pub fn check(&mut self, address: u32, size: usize, flag: u8) {
        let last = address.saturating_add(size.max(1) as u32 - 1);
        let matched = self
            .breakpoints
            .iter()
            .flatten()
            .any(|bp| bp.flags & flag != 0 && bp.start <= last && address <= bp.end);
        if matched {
            log(LogCategory::Bus, LogLevel::Info, || {
                format!(
                    "breakpoint hit: {} of {} bytes at {:08X}",
                    if flag == BP_READ { "read" } else { "write" },
                    size,
                    address
                )
            });
            self.hits.push(BreakpointHit {
                address,
                size,
                flags: flag,
            });
        }
    }

    pub fn take_hits(&mut self) -> Vec<BreakpointHit> {
        std::mem::take(&mut self.hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Handler, MemType, MM_VI_REGS};

    fn bus() -> MemoryBus {
        let mut bus = MemoryBus::new();
        bus.map(MM_VI_REGS, MM_VI_REGS + 0xffff, MemType::Vi, Handler::ViRegs);
        bus.map(0, 0x007f_ffff, MemType::Rdram, Handler::RdramDram);
        bus
    }

    #[test]
    fn test_add_wraps_only_requested_side() {
        let mut bus = bus();
        let mut dbg = Debugger::new();
        dbg.add(&mut bus, MM_VI_REGS + 0x10, MM_VI_REGS + 0x13, BP_WRITE);
        assert_eq!(bus.write_handler(MM_VI_REGS), Handler::Breakpoint);
        assert_eq!(bus.read_handler(MM_VI_REGS), Handler::ViRegs);
    }

    #[test]
    fn test_hits_match_range_and_flag() {
        let mut dbg = Debugger::new();
        let mut bus = bus();
        dbg.add(&mut bus, 0x1000, 0x1003, BP_READ);

        dbg.check(0x1000, 4, BP_WRITE);
        dbg.check(0x1004, 4, BP_READ);
        dbg.check(0x0ffc, 4, BP_READ);
        assert!(dbg.take_hits().is_empty());

        dbg.check(0x1002, 1, BP_READ);
        assert_eq!(
            dbg.take_hits(),
            vec![BreakpointHit {
                address: 0x1002,
                size: 1,
                flags: BP_READ
            }]
        );
    }

    #[test]
    fn test_remove_keeps_shared_regions() {
        let mut dbg = Debugger::new();
        let mut bus = bus();
        let a = dbg.add(&mut bus, 0x1000, 0x1003, BP_READ);
        let b = dbg.add(&mut bus, 0x2000, 0x2003, BP_READ | BP_WRITE);

        dbg.remove(&mut bus, b);
        assert_eq!(bus.read_handler(0x1000), Handler::Breakpoint, "a still covers it");
        assert_eq!(bus.write_handler(0x1000), Handler::RdramDram);

        dbg.remove(&mut bus, a);
        assert_eq!(bus.read_handler(0x1000), Handler::RdramDram);
        assert!(dbg.remove(&mut bus, a).is_none());
        assert_eq!(dbg.breakpoints().count(), 0);
    }

    #[test]
    fn test_ids_are_reused() {
        let mut dbg = Debugger::new();
        let mut bus = bus();
        let a = dbg.add(&mut bus, 0, 3, BP_READ);
        dbg.remove(&mut bus, a);
        assert_eq!(dbg.add(&mut bus, 8, 11, BP_READ), a);
    }
}
