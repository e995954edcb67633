//! Interfaces to everything outside the device core.
//!
//! Graphics, audio, the RSP microcode engine, save storage and controller
//! input are supplied by the front-end as trait objects. Each trait has a
//! null implementation so a device can run headless.

use crate::memory::MemBase;
use crate::pif::controller::ControllerState;

/// One framebuffer as reported by the graphics backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameBufferInfo {
    /// RDRAM address; 0 marks an unused slot
    pub addr: u32,
    /// Bytes per pixel
    pub size: u32,
    pub width: u32,
    pub height: u32,
}

pub const FB_INFOS_COUNT: usize = 6;

/// Audio sink fed by the AI.
pub trait AudioOut {
    /// Sample rate or depth changed; applies to the following pushes.
    fn set_format(&mut self, frequency: u32, bits: u32);
    /// Interleaved stereo samples, big-endian 16-bit as stored in RDRAM.
    fn push_samples(&mut self, samples: &[u8]);
}

/// Graphics plugin entry points the device calls.
pub trait GfxBackend {
    /// The CPU is about to read `addr` from a framebuffer page that may be stale.
    fn fb_read(&mut self, addr: u32);
    /// The CPU wrote `size` bytes at `addr` inside a framebuffer.
    fn fb_write(&mut self, addr: u32, size: usize);
    fn update_screen(&mut self);
    fn vi_status_changed(&mut self);
    fn vi_width_changed(&mut self);
    /// Run the display list between DPC_CURRENT and DPC_END.
    fn process_rdp_list(&mut self, mem: &mut MemBase, dpc_regs: &mut [u32]);
    /// Framebuffers to track, or `None` when the backend does not support tracking.
    fn framebuffer_info(&mut self) -> Option<[FrameBufferInfo; FB_INFOS_COUNT]> {
        None
    }
    fn resize_video_output(&mut self, _width: u32, _height: u32) {}
    fn move_screen(&mut self, _x: i32, _y: i32) {}
    fn change_window(&mut self) {}
}

/// Which RCP interrupts an RSP task signalled on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RspOutcome {
    pub sp_interrupt: bool,
    pub dp_interrupt: bool,
}

/// RSP microcode executor (HLE or LLE).
pub trait RspBackend {
    /// Run the task currently loaded in DMEM/IMEM.
    fn do_rsp_cycles(
        &mut self,
        mem: &mut MemBase,
        sp_regs: &mut [u32],
        dpc_regs: &mut [u32],
    ) -> RspOutcome;
}

/// Byte storage for a save medium (SRAM, EEPROM).
pub trait StorageBackend {
    fn data(&self) -> &[u8];
    fn data_mut(&mut self) -> &mut [u8];
    /// Persist after a guest write.
    fn save(&mut self);
}

/// A peripheral on one PIF channel.
pub trait JoybusDevice {
    /// Handle one command: `tx[0]` is the command byte, `rx` the reply area.
    ///
    /// Returns `false` when nothing answered; the PIF then flags the channel.
    fn process(&mut self, tx: &[u8], rx: &mut [u8]) -> bool;
}

/// Controller input source polled on every read-buttons command.
pub trait ControllerInput {
    fn input(&mut self) -> ControllerState;
}

/// Execution engine state the device must invalidate.
pub trait ExecutionHooks {
    fn disable_fast_memory(&mut self) {}
    /// `size == 0` means everything
    fn invalidate_cached_code(&mut self, _address: u32, _size: u32) {}
}

#[derive(Debug, Default)]
pub struct NullAudio;

impl AudioOut for NullAudio {
    fn set_format(&mut self, _frequency: u32, _bits: u32) {}
    fn push_samples(&mut self, _samples: &[u8]) {}
}

#[derive(Debug, Default)]
pub struct NullGfx;

impl GfxBackend for NullGfx {
    fn fb_read(&mut self, _addr: u32) {}
    fn fb_write(&mut self, _addr: u32, _size: usize) {}
    fn update_screen(&mut self) {}
    fn vi_status_changed(&mut self) {}
    fn vi_width_changed(&mut self) {}
    fn process_rdp_list(&mut self, _mem: &mut MemBase, _dpc_regs: &mut [u32]) {}
}

/// Completes every task instantly, signalling SP only.
#[derive(Debug, Default)]
pub struct NullRsp;

impl RspBackend for NullRsp {
    fn do_rsp_cycles(
        &mut self,
        _mem: &mut MemBase,
        _sp_regs: &mut [u32],
        _dpc_regs: &mut [u32],
    ) -> RspOutcome {
        RspOutcome {
            sp_interrupt: true,
            dp_interrupt: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct NullHooks;

impl ExecutionHooks for NullHooks {}

/// In-memory storage; counts saves so callers can flush lazily.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    data: Vec<u8>,
    pub saves: usize,
}

impl MemoryStorage {
    /// Fresh medium filled with `fill`
    pub fn new(size: usize, fill: u8) -> Self {
        Self {
            data: vec![fill; size],
            saves: 0,
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data, saves: 0 }
    }
}

impl StorageBackend for MemoryStorage {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn save(&mut self) {
        self.saves += 1;
    }
}

/// The backend set handed to [`Device::new`](crate::Device::new).
pub struct Backends {
    pub audio: Box<dyn AudioOut>,
    pub gfx: Box<dyn GfxBackend>,
    pub rsp: Box<dyn RspBackend>,
    pub hooks: Box<dyn ExecutionHooks>,
    /// SRAM contents; a blank 32 KiB medium when `None`
    pub sram: Option<Box<dyn StorageBackend>>,
    /// EEPROM contents; blank when `None` and the config fits an EEPROM
    pub eeprom: Option<Box<dyn StorageBackend>>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            audio: Box::new(NullAudio),
            gfx: Box::new(NullGfx),
            rsp: Box::new(NullRsp),
            hooks: Box::new(NullHooks),
            sram: None,
            eeprom: None,
        }
    }
}
