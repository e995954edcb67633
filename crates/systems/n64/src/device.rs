//! The device: every RCP controller, the physical backing and the bus.
//!
//! [`Device`] owns all state. The [`MemoryBus`] only names which component
//! services an address; the accessors here resolve that name and hand the
//! controller the collaborators it needs for the one call. Cross-controller
//! effects that need the whole device (running an RSP task, processing a
//! display list, remapping RDRAM) come back as return values and are
//! finished here.
//!
//! Time advances when the execution engine reports cycles. After every
//! step, [`Device::gen_interrupt`] fires the events whose deadline has been
//! reached.

use crate::backend::{AudioOut, Backends, ExecutionHooks, GfxBackend, RspBackend};
use crate::cart::Cartridge;
use crate::config::{DeviceConfig, EepromType};
use crate::dd;
use crate::debugger::{BreakpointHit, Debugger};
use crate::memory::{
    open_bus_value, Handler, MemBase, MemMapping, MemType, MemoryBus, BP_READ, BP_WRITE,
    MM_AI_REGS, MM_CART_DOM3, MM_CART_ROM, MM_DD_ROM, MM_DOM2_ADDR1, MM_DOM2_ADDR2,
    MM_DPC_REGS, MM_DPS_REGS, MM_MI_REGS, MM_PIF_MEM, MM_PI_REGS, MM_RDRAM_DRAM,
    MM_RDRAM_REGS, MM_RI_REGS, MM_RSP_MEM, MM_RSP_REGS, MM_RSP_REGS2, MM_SI_REGS,
    MM_VI_REGS, PIF_RAM_SIZE, PIF_ROM_SIZE,
};
use crate::pif::cic::{Cic, IPL3_OFFSET};
use crate::pif::controller::ControllerState;
use crate::pif::eeprom::Eeprom;
use crate::pif::{Pif, CONTROLLER_PORTS};
use crate::r4300::cp0::{Cp0, CpuSignal};
use crate::r4300::interrupt::EventKind;
use crate::rcp::ai::{AiController, AI_STATUS_REG};
use crate::rcp::fb::FrameBufferTracker;
use crate::rcp::mi::MiController;
use crate::rcp::pi::PiController;
use crate::rcp::rdp::{DpcEffect, RdpController, UnfreezeAction};
use crate::rcp::ri::RiController;
use crate::rcp::rsp::{RspController, TaskKind};
use crate::rcp::si::SiController;
use crate::rcp::vi::{ViController, DEFAULT_NMI_VI_DELAY};
use crate::rdram::{Rdram, RdramRemap};
use crate::N64Error;
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::mmio::{byte_lane, extract_byte, extract_half, half_lane, mask_extent};
use rcp_core::types::FrameStats;
use rcp_core::Cpu;

/// Cycles from a soft reset to the NMI that restarts the CPU (about half a second)
pub const NMI_DELAY: u32 = 50_000_000;

/// Offset of the last word of PIF RAM (holds the control byte) within the PIF window
const PIF_CONTROL_WORD: u32 = PIF_ROM_SIZE + PIF_RAM_SIZE - 4;
const PIF_MEM_LEN: u32 = PIF_ROM_SIZE + PIF_RAM_SIZE;

pub struct Device {
    pub(crate) config: DeviceConfig,
    pub(crate) mem: MemBase,
    pub(crate) bus: MemoryBus,
    pub(crate) cp0: Cp0,
    pub(crate) mi: MiController,
    pub(crate) vi: ViController,
    pub(crate) ai: AiController,
    pub(crate) pi: PiController,
    pub(crate) si: SiController,
    pub(crate) ri: RiController,
    pub(crate) rdram: Rdram,
    pub(crate) sp: RspController,
    pub(crate) dp: RdpController,
    pub(crate) fb: FrameBufferTracker,
    pub(crate) pif: Pif,
    pub(crate) cart: Cartridge,
    debugger: Debugger,
    /// Handler currently servicing plain RDRAM (switches with the corrupted-read quirk)
    pub(crate) dram_handler: Handler,
    audio: Box<dyn AudioOut>,
    gfx: Box<dyn GfxBackend>,
    rsp: Box<dyn RspBackend>,
    hooks: Box<dyn ExecutionHooks>,
    stopped: bool,
}

impl Device {
    /// Allocate the backing, build every controller and install the memory map.
    ///
    /// The device still needs [`poweron`](Self::poweron) before it runs.
    pub fn new(config: DeviceConfig, backends: Backends) -> Result<Self, N64Error> {
        config.validate()?;
        let mem = MemBase::allocate(config.backing, config.max_backing_bytes)?;
        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "physical backing: {}",
                if mem.is_compressed() { "compressed" } else { "full" }
            )
        });

        let Backends {
            audio,
            gfx,
            rsp,
            hooks,
            sram,
            eeprom,
        } = backends;
        let eeprom = match config.eeprom {
            EepromType::None => None,
            kind => Some(Eeprom::new(kind, eeprom)),
        };

        let mut dev = Self {
            mem,
            bus: MemoryBus::new(),
            cp0: Cp0::new(
                config.count_per_op,
                config.randomize_interrupt,
                config.random_seed,
            ),
            mi: MiController::new(),
            vi: ViController::new(config.tv_standard),
            ai: AiController::new(),
            pi: PiController::new(),
            si: SiController::new(config.si_dma_duration),
            ri: RiController::new(),
            rdram: Rdram::new(config.dram_size),
            sp: RspController::new(config.dram_size),
            dp: RdpController::new(),
            fb: FrameBufferTracker::new(config.dram_size),
            pif: Pif::new(eeprom),
            cart: Cartridge::new(sram),
            debugger: Debugger::new(),
            dram_handler: Handler::RdramDram,
            audio,
            gfx,
            rsp,
            hooks,
            stopped: false,
            config,
        };
        for mapping in dev.mappings() {
            dev.bus.apply_mem_mapping(&mapping);
        }
        Ok(dev)
    }

    /// Boot-time memory map, applied in order (later entries win).
    pub fn mappings(&self) -> Vec<MemMapping> {
        let dram_end = MM_RDRAM_DRAM + self.config.dram_size - 1;
        vec![
            MemMapping::new(0x0000_0000, 0xffff_ffff, MemType::Nothing, Handler::OpenBus),
            MemMapping::new(MM_RDRAM_DRAM, dram_end, MemType::Rdram, Handler::RdramDram),
            MemMapping::new(MM_RDRAM_REGS, 0x03ff_ffff, MemType::RdramReg, Handler::RdramRegs),
            MemMapping::new(MM_RSP_MEM, 0x0403_ffff, MemType::RspMem, Handler::RspMem),
            MemMapping::new(MM_RSP_REGS, 0x0407_ffff, MemType::RspReg, Handler::RspRegs),
            MemMapping::new(MM_RSP_REGS2, 0x040f_ffff, MemType::Rsp, Handler::RspRegs2),
            MemMapping::new(MM_DPC_REGS, 0x041f_ffff, MemType::Dp, Handler::DpcRegs),
            MemMapping::new(MM_DPS_REGS, 0x042f_ffff, MemType::Dps, Handler::DpsRegs),
            MemMapping::new(MM_MI_REGS, 0x043f_ffff, MemType::Mi, Handler::MiRegs),
            MemMapping::new(MM_VI_REGS, 0x044f_ffff, MemType::Vi, Handler::ViRegs),
            MemMapping::new(MM_AI_REGS, 0x045f_ffff, MemType::Ai, Handler::AiRegs),
            MemMapping::new(MM_PI_REGS, 0x046f_ffff, MemType::Pi, Handler::PiRegs),
            MemMapping::new(MM_RI_REGS, 0x047f_ffff, MemType::Ri, Handler::RiRegs),
            MemMapping::new(MM_SI_REGS, 0x048f_ffff, MemType::Si, Handler::SiRegs),
            MemMapping::new(MM_DOM2_ADDR1, MM_DD_ROM - 1, MemType::Dd, Handler::DdRegs),
            MemMapping::new(MM_DOM2_ADDR2, MM_CART_ROM - 1, MemType::FlashRamStat, Handler::CartDom2),
            MemMapping::new(MM_CART_ROM, MM_PIF_MEM - 1, MemType::Rom, Handler::CartRom),
            MemMapping::new(MM_PIF_MEM, MM_CART_DOM3 - 1, MemType::Pif, Handler::PifMem),
        ]
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Put every component in its power-on state and start the timers.
    pub fn poweron(&mut self) {
        if let Some(boot) = self.cart.boot_segment(&self.mem) {
            self.pif.cic = Cic::detect(&boot[IPL3_OFFSET..]);
        }

        self.cp0.poweron();
        self.mi.poweron();
        self.vi.poweron();
        self.ai.poweron();
        self.pi.poweron();
        self.si.poweron();
        self.ri.poweron();
        self.rdram.poweron(&mut self.mem);
        self.sp.poweron(&mut self.mem);
        self.dp.poweron();
        self.fb.poweron();
        self.pif.poweron(&mut self.mem);

        self.dram_handler = Handler::RdramDram;
        for mapping in self.mappings() {
            self.bus.apply_mem_mapping(&mapping);
        }

        self.vi.restart(&mut self.cp0, DEFAULT_NMI_VI_DELAY);
        self.cp0.add_interrupt_event_count(EventKind::Special, 0);
        self.stopped = false;

        log(LogCategory::CPU, LogLevel::Info, || {
            format!("power on (CIC {:?})", self.pif.cic.version)
        });
    }

    /// Press the reset button: HW2 right away, the NMI half a second later.
    pub fn reset_soft(&mut self) {
        self.cp0.add_interrupt_event(EventKind::Hw2, 1);
        self.cp0.add_interrupt_event(EventKind::Nmi, NMI_DELAY);
    }

    /// Power cycle at the next event poll.
    pub fn reset_hard(&mut self) {
        self.cp0.add_interrupt_event(EventKind::ResetHard, 0);
    }

    /// Make [`run`](Self::run) return after the current step.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Step `engine` until [`stop`](Self::stop) is called.
    pub fn run<E: Cpu<Device> + ?Sized>(&mut self, engine: &mut E) {
        self.stopped = false;
        while !self.stopped {
            self.step(engine);
        }
    }

    /// Step `engine` for at least `cycles` cycles (or until stopped).
    pub fn run_for<E: Cpu<Device> + ?Sized>(&mut self, engine: &mut E, cycles: u64) -> FrameStats {
        let start = self.cp0.cycles();
        let mut events = 0;
        self.stopped = false;
        while !self.stopped && self.cp0.cycles() - start < cycles {
            events += self.step(engine);
        }
        FrameStats {
            cycles: self.cp0.cycles() - start,
            events,
        }
    }

    /// One engine step followed by an event poll; returns events fired.
    pub fn step<E: Cpu<Device> + ?Sized>(&mut self, engine: &mut E) -> u32 {
        let cycles = engine.step(self);
        self.cp0.add_cycles(cycles as u64);
        self.gen_interrupt()
    }

    /// Fire every event whose deadline has been reached, in order.
    pub fn gen_interrupt(&mut self) -> u32 {
        let mut fired = 0;
        while let Some(kind) = self.cp0.pop_due() {
            fired += 1;
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("{:?} event at count {:08X}", kind, self.cp0.count())
            });
            self.dispatch(kind);
            if kind == EventKind::ResetHard {
                break;
            }
        }
        fired
    }

    fn dispatch(&mut self, kind: EventKind) {
        match kind {
            EventKind::Vi => {
                if self.dp.has_deferred(UnfreezeAction::DpInterrupt) {
                    self.dp.defer(UnfreezeAction::UpdateScreen);
                } else {
                    self.gfx.update_screen();
                }
                self.vi.vertical_interrupt_event(&mut self.cp0, &mut self.mi);
            }
            EventKind::Compare => self.cp0.compare_int_handler(),
            EventKind::Check => self.cp0.check_int_handler(),
            EventKind::Special => self.cp0.special_int_handler(),
            EventKind::Hw2 => self.cp0.hw2_int_handler(),
            EventKind::Si => self.si.end_of_dma_event(
                &mut self.cp0,
                &mut self.mi,
                &mut self.pif,
                &mut self.mem,
            ),
            EventKind::Pi => self.pi.end_of_dma_event(&mut self.cp0, &mut self.mi),
            EventKind::Ai => self.ai.end_of_dma_event(
                &mut self.cp0,
                &mut self.mi,
                &self.vi,
                &self.mem,
                &mut *self.audio,
            ),
            EventKind::Sp => self.sp.interrupt_event(&mut self.cp0, &mut self.mi),
            EventKind::Dp => self.dp.interrupt_event(&mut self.cp0, &mut self.mi),
            EventKind::Nmi => self.nmi_int_handler(),
            EventKind::ResetHard => {
                log(LogCategory::CPU, LogLevel::Info, || "hard reset".to_string());
                self.poweron();
                self.cp0.signal(CpuSignal::HardReset);
            }
        }
    }

    fn nmi_int_handler(&mut self) {
        let delay = self.vi.nmi_delay();
        self.cp0.nmi_reset();
        self.vi.restart(&mut self.cp0, delay);
        self.cp0.add_interrupt_event_count(EventKind::Special, 0);

        // The AI event is gone with the queue; so is anything it was playing
        self.ai.regs[AI_STATUS_REG] = 0;
        self.ai.fifo = Default::default();

        log(LogCategory::CPU, LogLevel::Info, || {
            format!("NMI, VI restarted with delay {}", delay)
        });
        self.cp0.signal(CpuSignal::SoftReset);
    }

    pub fn take_cpu_signal(&mut self) -> Option<CpuSignal> {
        self.cp0.take_signal()
    }

    pub fn cp0(&self) -> &Cp0 {
        &self.cp0
    }

    pub fn cp0_mut(&mut self) -> &mut Cp0 {
        &mut self.cp0
    }

    pub fn mi(&self) -> &MiController {
        &self.mi
    }

    pub fn vi(&self) -> &ViController {
        &self.vi
    }

    pub fn ai(&self) -> &AiController {
        &self.ai
    }

    pub fn pi(&self) -> &PiController {
        &self.pi
    }

    pub fn si(&self) -> &SiController {
        &self.si
    }

    pub fn sp(&self) -> &RspController {
        &self.sp
    }

    pub fn dp(&self) -> &RdpController {
        &self.dp
    }

    pub fn pif(&self) -> &Pif {
        &self.pif
    }

    pub fn pif_mut(&mut self) -> &mut Pif {
        &mut self.pif
    }

    pub fn framebuffers(&self) -> &FrameBufferTracker {
        &self.fb
    }

    /// Raw physical backing, bypassing every handler.
    pub fn mem(&self) -> &MemBase {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut MemBase {
        &mut self.mem
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    pub fn mem_type(&self, address: u32) -> MemType {
        self.bus.mem_type(address)
    }

    pub fn set_controller(&mut self, port: usize, state: ControllerState) {
        if port < CONTROLLER_PORTS {
            self.pif.controllers[port].set_state(state);
        }
    }

    pub fn insert_cartridge(&mut self, data: &[u8]) -> Result<(), N64Error> {
        self.cart.insert(&mut self.mem, data)
    }

    pub fn eject_cartridge(&mut self) {
        self.cart.eject(&mut self.mem);
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cart
    }

    pub fn add_breakpoint(&mut self, start: u32, end: u32, flags: u8) -> usize {
        self.debugger.add(&mut self.bus, start, end, flags)
    }

    pub fn remove_breakpoint(&mut self, id: usize) -> bool {
        self.debugger.remove(&mut self.bus, id).is_some()
    }

    pub fn take_breakpoint_hits(&mut self) -> Vec<BreakpointHit> {
        self.debugger.take_hits()
    }

    pub fn read_u8(&mut self, address: u32) -> u8 {
        extract_byte(self.read_aligned_word(address), address)
    }

    pub fn read_u16(&mut self, address: u32) -> u16 {
        extract_half(self.read_aligned_word(address), address)
    }

    pub fn read_u32(&mut self, address: u32) -> u32 {
        self.read_aligned_word(address)
    }

    pub fn read_u64(&mut self, address: u32) -> u64 {
        let hi = self.read_aligned_word(address);
        let lo = self.read_aligned_word(address.wrapping_add(4));
        (hi as u64) << 32 | lo as u64
    }

    pub fn write_u8(&mut self, address: u32, value: u8) {
        let (value, mask) = byte_lane(address, value);
        self.write_aligned_word(address, value, mask);
    }

    pub fn write_u16(&mut self, address: u32, value: u16) {
        let (value, mask) = half_lane(address, value);
        self.write_aligned_word(address, value, mask);
    }

    pub fn write_u32(&mut self, address: u32, value: u32) {
        self.write_aligned_word(address, value, 0xffff_ffff);
    }

    pub fn write_u64(&mut self, address: u32, value: u64) {
        self.write_aligned_word(address, (value >> 32) as u32, 0xffff_ffff);
        self.write_aligned_word(address.wrapping_add(4), value as u32, 0xffff_ffff);
    }

    /// Read the word containing `address` through its region's handler.
    pub fn read_aligned_word(&mut self, address: u32) -> u32 {
        let address = address & !3;
        let handler = self.bus.read_handler(address);
        self.read_with(handler, address)
    }

    /// Write the lanes selected by `mask` of the word containing `address`.
    pub fn write_aligned_word(&mut self, address: u32, value: u32, mask: u32) {
        let address = address & !3;
        let handler = self.bus.write_handler(address);
        self.write_with(handler, address, value, mask);
    }

    fn read_with(&mut self, handler: Handler, address: u32) -> u32 {
        match handler {
            Handler::OpenBus => open_bus_value(address),
            Handler::RdramDram => self.rdram.read_dram(&self.mem, address),
            Handler::RdramDramCorrupted => self.rdram.read_dram_corrupted(&self.mem, address),
            Handler::RdramFb => {
                self.fb.pre_read(address, &mut *self.gfx);
                self.read_with(self.dram_handler, address)
            }
            Handler::RdramRegs => self.rdram.read_regs(address),
            Handler::RspMem => self.sp.read_mem(&self.mem, address),
            Handler::RspRegs => self.sp.read_regs(address),
            Handler::RspRegs2 => self.sp.read_regs2(address),
            Handler::DpcRegs => self.dp.read_regs(address),
            Handler::DpsRegs => self.dp.read_dps_regs(address),
            Handler::MiRegs => self.mi.read_regs(address),
            Handler::ViRegs => self.vi.read_regs(address, &self.cp0),
            Handler::AiRegs => {
                self.ai
                    .read_regs(address, &self.cp0, &self.mem, &mut *self.audio)
            }
            Handler::PiRegs => self.pi.read_regs(address),
            Handler::RiRegs => self.ri.read_regs(address),
            Handler::SiRegs => self.si.read_regs(address),
            Handler::DdRegs => dd::read_absent_dd_regs(address),
            Handler::CartDom2 => self.cart.sram.read(address),
            Handler::CartRom => self.cart.read_rom(&self.mem, address),
            Handler::PifMem => self.read_pif_mem(address),
            Handler::Breakpoint => {
                self.debugger.check(address, 4, BP_READ);
                let saved = self.bus.saved_read_handler(address);
                self.read_with(saved, address)
            }
        }
    }

    fn write_with(&mut self, handler: Handler, address: u32, value: u32, mask: u32) {
        match handler {
            Handler::OpenBus => {}
            Handler::RdramDram | Handler::RdramDramCorrupted => {
                self.rdram.write_dram(&mut self.mem, address, value, mask)
            }
            Handler::RdramFb => {
                self.rdram.write_dram(&mut self.mem, address, value, mask);
                self.fb.post_write(address, mask, &mut *self.gfx);
            }
            Handler::RdramRegs => {
                if let Some(remap) = self.rdram.write_regs(address, value, mask) {
                    self.apply_dram_remap(remap);
                }
            }
            Handler::RspMem => self.sp.write_mem(&mut self.mem, address, value, mask),
            Handler::RspRegs => {
                let start = self.sp.write_regs(
                    address,
                    value,
                    mask,
                    &mut self.cp0,
                    &mut self.mi,
                    &mut self.mem,
                );
                if start {
                    self.do_sp_task();
                }
            }
            Handler::RspRegs2 => self.sp.write_regs2(address, value, mask),
            Handler::DpcRegs => {
                let effect = self.dp.write_regs(
                    address,
                    value,
                    mask,
                    self.sp.is_running(),
                    &mut self.cp0,
                    &mut self.mi,
                    &mut *self.gfx,
                );
                match effect {
                    DpcEffect::None => {}
                    DpcEffect::ProcessList => self.process_rdp_list(),
                    DpcEffect::RunSpTask => self.do_sp_task(),
                }
            }
            Handler::DpsRegs => self.dp.write_dps_regs(address, value, mask),
            Handler::MiRegs => self.mi.write_regs(address, value, mask, &mut self.cp0),
            Handler::ViRegs => self.vi.write_regs(
                address,
                value,
                mask,
                &mut self.cp0,
                &mut self.mi,
                &mut *self.gfx,
            ),
            Handler::AiRegs => self.ai.write_regs(
                address,
                value,
                mask,
                &mut self.cp0,
                &mut self.mi,
                &self.vi,
                &mut *self.audio,
            ),
            Handler::PiRegs => self.pi.write_regs(
                address,
                value,
                mask,
                &mut self.cp0,
                &mut self.mi,
                &mut self.cart,
                &mut self.mem,
                &mut *self.hooks,
            ),
            Handler::RiRegs => self.ri.write_regs(address, value, mask),
            Handler::SiRegs => self.si.write_regs(
                address,
                value,
                mask,
                &mut self.cp0,
                &mut self.mi,
                &mut self.pif,
                &mut self.mem,
            ),
            Handler::DdRegs => {}
            Handler::CartDom2 => self.cart.sram.write(address, value, mask),
            Handler::CartRom => {
                if self.cart.write_rom(value, mask) {
                    self.pi.io_write_started(&mut self.cp0);
                }
            }
            Handler::PifMem => self.write_pif_mem(address, value, mask),
            Handler::Breakpoint => {
                let (offset, size) = mask_extent(mask);
                self.debugger.check(address + offset, size, BP_WRITE);
                let saved = self.bus.saved_write_handler(address);
                self.write_with(saved, address, value, mask);
            }
        }
    }

    fn read_pif_mem(&mut self, address: u32) -> u32 {
        let offset = address - MM_PIF_MEM;
        if offset < PIF_MEM_LEN {
            self.mem.read_u32(address)
        } else {
            log(LogCategory::Bus, LogLevel::Warn, || {
                format!("read from unbacked PIF address {:08X}", address)
            });
            0
        }
    }

    fn write_pif_mem(&mut self, address: u32, value: u32, mask: u32) {
        let offset = address - MM_PIF_MEM;
        if !(PIF_ROM_SIZE..PIF_MEM_LEN).contains(&offset) {
            log(LogCategory::Bus, LogLevel::Warn, || {
                format!("write to PIF ROM/unbacked address {:08X} ignored", address)
            });
            return;
        }
        self.mem.write_u32(address, value, mask);
        if offset == PIF_CONTROL_WORD && mask & 0xff != 0 {
            self.pif.process_pif_ram(&mut self.mem);
        }
        self.si.pif_ram_written(&mut self.cp0, &mut self.mi);
    }

    pub(crate) fn apply_dram_remap(&mut self, remap: RdramRemap) {
        let handler = match remap {
            RdramRemap::Corrupted => Handler::RdramDramCorrupted,
            RdramRemap::Plain => Handler::RdramDram,
        };
        if handler == self.dram_handler {
            return;
        }
        log(LogCategory::Bus, LogLevel::Debug, || {
            format!("RDRAM reads now via {:?}", handler)
        });
        self.dram_handler = handler;
        let dram_end = MM_RDRAM_DRAM + self.config.dram_size - 1;
        self.bus.map(MM_RDRAM_DRAM, dram_end, MemType::Rdram, handler);
    }

    fn protect_framebuffers(&mut self) {
        self.fb
            .protect(&mut self.bus, &mut *self.gfx, &mut *self.hooks);
    }

    fn unprotect_framebuffers(&mut self) {
        self.fb.unprotect(&mut self.bus, self.dram_handler);
    }

    fn process_rdp_list(&mut self) {
        self.unprotect_framebuffers();
        self.dp
            .process_list(&mut self.mem, &mut self.cp0, &mut self.mi, &mut *self.gfx);
        self.protect_framebuffers();
    }

    /// Run the task loaded in DMEM, unless it is a display list and the RDP is frozen.
    fn do_sp_task(&mut self) {
        let kind = self.sp.task_kind(&self.mem);
        if kind == TaskKind::Gfx {
            if self.dp.is_frozen() {
                log(LogCategory::Video, LogLevel::Debug, || {
                    "gfx task held while the RDP is frozen".to_string()
                });
                return;
            }
            self.unprotect_framebuffers();
        }

        let outcome = self.sp.run_task(
            kind,
            &mut self.mem,
            &mut *self.rsp,
            &mut self.dp.dpc_regs,
            &mut self.cp0,
        );
        log(LogCategory::Dma, LogLevel::Trace, || {
            format!("{:?} task done: {:?}", kind, outcome)
        });

        if kind == TaskKind::Gfx {
            self.protect_framebuffers();
        }
    }
}
