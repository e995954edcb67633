//! Framebuffer tracking for graphics backends that render to host memory.
//!
//! When the backend reports the framebuffers it is drawing into, their
//! RDRAM pages are routed through [`Handler::RdramFb`]. CPU reads of a page
//! the RDP has drawn to since the last read let the backend copy its pixels
//! back first; CPU writes are forwarded so the backend can upload them.

use crate::backend::{ExecutionHooks, FrameBufferInfo, GfxBackend, FB_INFOS_COUNT};
use crate::memory::{Handler, MemType, MemoryBus, RDRAM_MAX_SIZE};
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::mask_extent;

const PAGE_SHIFT: u32 = 12;
pub const DIRTY_PAGES_COUNT: usize = (RDRAM_MAX_SIZE >> PAGE_SHIFT) as usize;

pub struct FrameBufferTracker {
    infos: [FrameBufferInfo; FB_INFOS_COUNT],
    dirty_pages: Vec<bool>,
    /// Still waiting for the first non-empty framebuffer report
    first_protect: bool,
    /// Installed RDRAM; framebuffers reported past it are left alone
    dram_size: u32,
}

fn page_of(address: u32) -> usize {
    ((address & (RDRAM_MAX_SIZE - 1)) >> PAGE_SHIFT) as usize
}

/// Inclusive RDRAM range covered by a framebuffer, if any
fn extent(info: &FrameBufferInfo, dram_size: u32) -> Option<(u32, u32)> {
    if info.addr == 0 {
        return None;
    }
    let bytes = info.width.wrapping_mul(info.height).wrapping_mul(info.size);
    if bytes == 0 {
        return None;
    }
    let begin = info.addr & 0x00ff_ffff;
    if begin >= dram_size {
        return None;
    }
    let end = begin.saturating_add(bytes - 1).min(dram_size - 1);
    Some((begin, end))
}

impl FrameBufferTracker {
    pub fn new(dram_size: u32) -> Self {
        Self {
            infos: [FrameBufferInfo::default(); FB_INFOS_COUNT],
            dirty_pages: vec![false; DIRTY_PAGES_COUNT],
            first_protect: true,
            dram_size: dram_size.min(RDRAM_MAX_SIZE),
        }
    }

    pub fn poweron(&mut self) {
        self.infos = [FrameBufferInfo::default(); FB_INFOS_COUNT];
        self.dirty_pages.fill(false);
        self.first_protect = true;
    }

    pub fn infos(&self) -> &[FrameBufferInfo; FB_INFOS_COUNT] {
        &self.infos
    }

    pub fn is_dirty(&self, address: u32) -> bool {
        self.dirty_pages[page_of(address)]
    }

    /// Route the backend's current framebuffers through the tracking handler.
    pub fn protect(
        &mut self,
        bus: &mut MemoryBus,
        gfx: &mut dyn GfxBackend,
        hooks: &mut dyn ExecutionHooks,
    ) {
        let Some(infos) = gfx.framebuffer_info() else {
            return;
        };
        self.infos = infos;

        if self.infos[0].addr != 0 && self.first_protect {
            self.first_protect = false;
            log(LogCategory::Video, LogLevel::Info, || {
                "framebuffer tracking active: fast memory disabled".to_string()
            });
            hooks.disable_fast_memory();
            hooks.invalidate_cached_code(0, 0);
        }

        for info in &self.infos {
            let Some((begin, end)) = extent(info, self.dram_size) else {
                continue;
            };
            bus.map(begin, end, MemType::Rdram, Handler::RdramFb);
            for page in self.dirty_pages[page_of(begin)..=page_of(end)].iter_mut() {
                *page = true;
            }
        }
    }

    /// Put `dram_handler` back over every tracked framebuffer.
    pub fn unprotect(&mut self, bus: &mut MemoryBus, dram_handler: Handler) {
        if self.infos[0].addr == 0 {
            return;
        }
        for info in &self.infos {
            if let Some((begin, end)) = extent(info, self.dram_size) {
                bus.map(begin, end, MemType::Rdram, dram_handler);
            }
        }
    }

    /// Call before a CPU read through [`Handler::RdramFb`].
    pub fn pre_read(&mut self, address: u32, gfx: &mut dyn GfxBackend) {
        for info in &self.infos {
            let Some((begin, end)) = extent(info, self.dram_size) else {
                continue;
            };
            let addr = address & 0x00ff_ffff;
            if addr < begin || addr > end {
                continue;
            }
            let page = page_of(addr);
            if self.dirty_pages[page] {
                gfx.fb_read(address);
                self.dirty_pages[page] = false;
            }
        }
    }

    /// Call after a CPU write through [`Handler::RdramFb`].
    pub fn post_write(&self, address: u32, mask: u32, gfx: &mut dyn GfxBackend) {
        let (offset, size) = mask_extent(mask);
        gfx.fb_write((address & !3) + offset, size);
    }
}

impl Default for FrameBufferTracker {
    fn default() -> Self {
        Self::new(RDRAM_MAX_SIZE)
    }
}
