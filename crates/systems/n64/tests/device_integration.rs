//! End-to-end register scenarios driven through the public `Device` API.

use rcp_n64::backend::{
    AudioOut, Backends, ExecutionHooks, FrameBufferInfo, GfxBackend, RspBackend, RspOutcome,
    FB_INFOS_COUNT,
};
use rcp_n64::cart::rom::N64_ROM_MAGIC;
use rcp_n64::config::BackingPreference;
use rcp_n64::memory::{
    Handler, MemBase, MemType, MemoryBus, BP_WRITE, MM_AI_REGS, MM_DPC_REGS, MM_MI_REGS,
    MM_PI_REGS, MM_RSP_MEM, MM_RSP_REGS, MM_SI_REGS,
};
use rcp_n64::pif::{ChannelSetup, PIF_RAM_ADDR};
use rcp_n64::r4300::interrupt::EventKind;
use rcp_n64::rcp::ai::{
    AI_BITRATE_REG, AI_DACRATE_REG, AI_DRAM_ADDR_REG, AI_LEN_REG, AI_STATUS_BUSY,
    AI_STATUS_FULL, AI_STATUS_REG,
};
use rcp_n64::rcp::mi::{MI_INTR_AI, MI_INTR_DP, MI_INTR_PI, MI_INTR_SI, MI_INTR_SP, MI_INTR_VI};
use rcp_n64::rcp::pi::{
    PI_CART_ADDR_REG, PI_DRAM_ADDR_REG, PI_STATUS_DMA_BUSY, PI_STATUS_INTERRUPT, PI_STATUS_REG,
    PI_WR_LEN_REG,
};
use rcp_n64::rcp::rdp::{UnfreezeAction, DPC_END_REG, DPC_STATUS_REG};
use rcp_n64::rcp::rsp::{SP_STATUS_BROKE, SP_STATUS_HALT, SP_STATUS_REG, TASK_TYPE_OFFSET};
use rcp_n64::rcp::si::{
    SI_DRAM_ADDR_REG, SI_PIF_ADDR_RD64B_REG, SI_PIF_ADDR_WR64B_REG, SI_STATUS_DMA_BUSY,
    SI_STATUS_DMA_ERROR, SI_STATUS_INTERRUPT, SI_STATUS_REG,
};
use rcp_n64::{ControllerButtons, ControllerState, Device, DeviceConfig};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct Record {
    formats: Vec<(u32, u32)>,
    samples: Vec<u8>,
    fb_reads: Vec<u32>,
    fb_writes: Vec<(u32, usize)>,
    screen_updates: u32,
    rdp_lists: u32,
    rsp_tasks: u32,
    invalidations: Vec<(u32, u32)>,
    fast_memory_disabled: bool,
}

type Shared = Rc<RefCell<Record>>;

struct RecAudio(Shared);

impl AudioOut for RecAudio {
    fn set_format(&mut self, frequency: u32, bits: u32) {
        self.0.borrow_mut().formats.push((frequency, bits));
    }
    fn push_samples(&mut self, samples: &[u8]) {
        self.0.borrow_mut().samples.extend_from_slice(samples);
    }
}

struct RecGfx {
    rec: Shared,
    fbs: Option<[FrameBufferInfo; FB_INFOS_COUNT]>,
}

impl GfxBackend for RecGfx {
    fn fb_read(&mut self, addr: u32) {
        self.rec.borrow_mut().fb_reads.push(addr);
    }
    fn fb_write(&mut self, addr: u32, size: usize) {
        self.rec.borrow_mut().fb_writes.push((addr, size));
    }
    fn update_screen(&mut self) {
        self.rec.borrow_mut().screen_updates += 1;
    }
    fn vi_status_changed(&mut self) {}
    fn vi_width_changed(&mut self) {}
    fn process_rdp_list(&mut self, _mem: &mut MemBase, _dpc_regs: &mut [u32]) {
        self.rec.borrow_mut().rdp_lists += 1;
    }
    fn framebuffer_info(&mut self) -> Option<[FrameBufferInfo; FB_INFOS_COUNT]> {
        self.fbs
    }
}

struct RecRsp(Shared);

impl RspBackend for RecRsp {
    fn do_rsp_cycles(
        &mut self,
        _mem: &mut MemBase,
        _sp_regs: &mut [u32],
        _dpc_regs: &mut [u32],
    ) -> RspOutcome {
        self.0.borrow_mut().rsp_tasks += 1;
        RspOutcome {
            sp_interrupt: true,
            dp_interrupt: true,
        }
    }
}

struct RecHooks(Shared);

impl ExecutionHooks for RecHooks {
    fn disable_fast_memory(&mut self) {
        self.0.borrow_mut().fast_memory_disabled = true;
    }
    fn invalidate_cached_code(&mut self, address: u32, size: u32) {
        self.0.borrow_mut().invalidations.push((address, size));
    }
}

fn device_with(fbs: Option<[FrameBufferInfo; FB_INFOS_COUNT]>) -> (Device, Shared) {
    let rec = Shared::default();
    let backends = Backends {
        audio: Box::new(RecAudio(rec.clone())),
        gfx: Box::new(RecGfx {
            rec: rec.clone(),
            fbs,
        }),
        rsp: Box::new(RecRsp(rec.clone())),
        hooks: Box::new(RecHooks(rec.clone())),
        ..Backends::default()
    };
    let config = DeviceConfig {
        backing: BackingPreference::Compressed,
        ..DeviceConfig::default()
    };
    let mut dev = Device::new(config, backends).expect("device");
    dev.poweron();
    (dev, rec)
}

fn device() -> (Device, Shared) {
    device_with(None)
}

fn reg(base: u32, index: usize) -> u32 {
    base + 4 * index as u32
}

/// Jump the timeline to the pending `kind` and fire everything due.
fn advance_to(dev: &mut Device, kind: EventKind) {
    let left = dev
        .cp0()
        .remaining_cycles(kind)
        .unwrap_or_else(|| panic!("{:?} not pending", kind));
    dev.cp0_mut().add_cycles(left);
    dev.gen_interrupt();
}

#[test]
fn test_ai_double_buffer() {
    let (mut dev, rec) = device();
    dev.mem_mut().bytes_mut(0x10_0000, 0x1000).unwrap().fill(0x11);
    dev.mem_mut().bytes_mut(0x20_0000, 0x800).unwrap().fill(0x22);

    dev.write_u32(reg(MM_AI_REGS, AI_DACRATE_REG), 1102);
    dev.write_u32(reg(MM_AI_REGS, AI_BITRATE_REG), 15);

    dev.write_u32(reg(MM_AI_REGS, AI_DRAM_ADDR_REG), 0x10_0000);
    dev.write_u32(reg(MM_AI_REGS, AI_LEN_REG), 0x1000);
    let status = dev.read_u32(reg(MM_AI_REGS, AI_STATUS_REG));
    assert_eq!(status & (AI_STATUS_BUSY | AI_STATUS_FULL), AI_STATUS_BUSY);
    assert_eq!(rec.borrow().formats, vec![(48_681_812 / 1103, 16)]);

    dev.write_u32(reg(MM_AI_REGS, AI_DRAM_ADDR_REG), 0x20_0000);
    dev.write_u32(reg(MM_AI_REGS, AI_LEN_REG), 0x800);
    let status = dev.read_u32(reg(MM_AI_REGS, AI_STATUS_REG));
    assert_eq!(
        status & (AI_STATUS_BUSY | AI_STATUS_FULL),
        AI_STATUS_BUSY | AI_STATUS_FULL
    );

    advance_to(&mut dev, EventKind::Ai);
    assert_ne!(dev.mi().intr() & MI_INTR_AI, 0);
    assert_eq!(dev.ai().status() & (AI_STATUS_BUSY | AI_STATUS_FULL), AI_STATUS_BUSY);
    assert_eq!(rec.borrow().samples.len(), 0x1000);
    assert!(rec.borrow().samples.iter().all(|&b| b == 0x11));
    assert!(dev.ai().fifo_consistent());

    dev.write_u32(reg(MM_AI_REGS, AI_STATUS_REG), 0);
    assert_eq!(dev.mi().intr() & MI_INTR_AI, 0, "status write acknowledges");

    advance_to(&mut dev, EventKind::Ai);
    assert_eq!(dev.ai().status() & (AI_STATUS_BUSY | AI_STATUS_FULL), 0);
    assert_eq!(rec.borrow().samples.len(), 0x1800);
    assert!(rec.borrow().samples[0x1000..].iter().all(|&b| b == 0x22));
    assert!(!dev.cp0().is_pending(EventKind::Ai));
}

#[test]
fn test_pi_dma_length_seven_copies_eight_bytes() {
    let (mut dev, rec) = device();
    let mut rom: Vec<u8> = (0..0x1000).map(|i| (i * 3) as u8).collect();
    rom[0..4].copy_from_slice(&N64_ROM_MAGIC);
    dev.insert_cartridge(&rom).unwrap();
    dev.mem_mut().bytes_mut(0x1000, 0x10).unwrap().fill(0xee);

    dev.write_u32(reg(MM_PI_REGS, PI_DRAM_ADDR_REG), 0x1000);
    dev.write_u32(reg(MM_PI_REGS, PI_CART_ADDR_REG), 0x1000_0040);
    dev.write_u32(reg(MM_PI_REGS, PI_WR_LEN_REG), 0x7);

    assert_eq!(dev.mem().bytes(0x1000, 8).unwrap(), &rom[0x40..0x48]);
    assert_eq!(dev.mem().read_u8(0x1008), 0xee, "nothing past the length");
    assert_ne!(dev.pi().status() & PI_STATUS_DMA_BUSY, 0);
    assert_eq!(dev.cp0().remaining_cycles(EventKind::Pi), Some(8 * 63 / 25));
    assert!(rec.borrow().invalidations.contains(&(0x8000_1000, 8)));

    advance_to(&mut dev, EventKind::Pi);
    assert_eq!(dev.pi().status() & PI_STATUS_DMA_BUSY, 0);
    assert_ne!(dev.pi().status() & PI_STATUS_INTERRUPT, 0);
    assert_ne!(dev.mi().intr() & MI_INTR_PI, 0);

    dev.write_u32(reg(MM_PI_REGS, PI_STATUS_REG), 0x2);
    assert_eq!(dev.mi().intr() & MI_INTR_PI, 0);
}

#[test]
fn test_map_then_clear() {
    let mut bus = MemoryBus::new();
    bus.map(0x0450_0000, 0x0450_ffff, MemType::Ai, Handler::AiRegs);
    assert_eq!(bus.read_handler(0x0450_0004), Handler::AiRegs);

    bus.map(0x0000_0000, 0xffff_ffff, MemType::Nothing, Handler::OpenBus);
    assert_eq!(bus.read_handler(0x0450_0004), Handler::OpenBus);
    assert_eq!(bus.write_handler(0x0450_0004), Handler::OpenBus);
    assert_eq!(bus.mem_type(0x0450_0004), MemType::Nothing);
}

#[test]
fn test_si_controller_poll() {
    let (mut dev, _rec) = device();
    let mut block = [0u8; 64];
    block[..8].copy_from_slice(&[0x01, 0x04, 0x01, 0xff, 0xff, 0xff, 0xff, 0xfe]);
    block[63] = 0x01;
    dev.mem_mut().bytes_mut(0x2000, 64).unwrap().copy_from_slice(&block);

    let state = ControllerState {
        buttons: ControllerButtons {
            a: true,
            start: true,
            ..ControllerButtons::default()
        },
        stick_x: 10,
        stick_y: -5,
    };
    dev.set_controller(0, state);

    dev.write_u32(reg(MM_SI_REGS, SI_DRAM_ADDR_REG), 0x2000);
    dev.write_u32(reg(MM_SI_REGS, SI_PIF_ADDR_WR64B_REG), PIF_RAM_ADDR);
    assert_ne!(dev.si().status() & SI_STATUS_DMA_BUSY, 0);

    dev.write_u32(reg(MM_SI_REGS, SI_PIF_ADDR_WR64B_REG), PIF_RAM_ADDR);
    assert_ne!(
        dev.si().status() & SI_STATUS_DMA_ERROR,
        0,
        "only one transfer in flight"
    );

    advance_to(&mut dev, EventKind::Si);
    assert_eq!(dev.si().status() & SI_STATUS_DMA_BUSY, 0);
    assert_ne!(dev.si().status() & SI_STATUS_INTERRUPT, 0);
    assert_ne!(dev.mi().intr() & MI_INTR_SI, 0);
    assert_eq!(dev.pif().channels[0], ChannelSetup::Command { offset: 0 });
    assert_eq!(dev.pif().channels[1], ChannelSetup::Disabled);

    dev.write_u32(reg(MM_SI_REGS, SI_STATUS_REG), 0);
    assert_eq!(dev.mi().intr() & MI_INTR_SI, 0);

    dev.write_u32(reg(MM_SI_REGS, SI_PIF_ADDR_RD64B_REG), PIF_RAM_ADDR);
    advance_to(&mut dev, EventKind::Si);
    assert_eq!(dev.mem().bytes(0x2003, 4).unwrap(), &state.to_bytes());
    assert_eq!(dev.mem().read_u8(0x2001), 0x04, "controller answered");
}

#[test]
fn test_gfx_task_waits_for_unfrozen_rdp() {
    let (mut dev, rec) = device();
    dev.write_u32(MM_RSP_MEM + TASK_TYPE_OFFSET, 1);

    // DPC_STATUS: set freeze
    dev.write_u32(reg(MM_DPC_REGS, DPC_STATUS_REG), 0x8);

    // SP_STATUS: clear halt, clear broke, set interrupt-on-break
    dev.write_u32(reg(MM_RSP_REGS, SP_STATUS_REG), 0x1 | 0x4 | 0x100);
    assert_eq!(rec.borrow().rsp_tasks, 0, "held while frozen");
    assert!(dev.sp().is_running());

    // DPC_STATUS: clear freeze
    dev.write_u32(reg(MM_DPC_REGS, DPC_STATUS_REG), 0x4);
    assert_eq!(rec.borrow().rsp_tasks, 1);
    assert_eq!(dev.cp0().remaining_cycles(EventKind::Sp), Some(1000));
    assert_eq!(dev.cp0().remaining_cycles(EventKind::Dp), Some(1000));

    advance_to(&mut dev, EventKind::Sp);
    let status = dev.sp().status();
    assert_eq!(
        status & (SP_STATUS_HALT | SP_STATUS_BROKE),
        SP_STATUS_HALT | SP_STATUS_BROKE
    );
    assert_ne!(dev.mi().intr() & MI_INTR_SP, 0);
    assert_ne!(dev.mi().intr() & MI_INTR_DP, 0, "DP fired at the same deadline");
}

#[test]
fn test_frozen_dp_interrupt_defers_screen_update() {
    let (mut dev, rec) = device();
    dev.write_u32(reg(MM_DPC_REGS, DPC_STATUS_REG), 0x8);

    dev.cp0_mut().add_interrupt_event(EventKind::Dp, 10);
    advance_to(&mut dev, EventKind::Dp);
    assert_eq!(dev.mi().intr() & MI_INTR_DP, 0);
    assert!(dev.dp().has_deferred(UnfreezeAction::DpInterrupt));

    let updates = rec.borrow().screen_updates;
    advance_to(&mut dev, EventKind::Vi);
    assert_ne!(dev.mi().intr() & MI_INTR_VI, 0);
    assert_eq!(rec.borrow().screen_updates, updates, "update held back");
    assert!(dev.dp().has_deferred(UnfreezeAction::UpdateScreen));

    dev.write_u32(reg(MM_DPC_REGS, DPC_STATUS_REG), 0x4);
    assert_eq!(rec.borrow().screen_updates, updates + 1);
    assert_ne!(dev.mi().intr() & MI_INTR_DP, 0);
    assert!(!dev.dp().has_deferred(UnfreezeAction::DpInterrupt));
}

#[test]
fn test_framebuffer_tracking_around_display_list() {
    let mut fbs = [FrameBufferInfo::default(); FB_INFOS_COUNT];
    fbs[0] = FrameBufferInfo {
        addr: 0x10_0000,
        size: 2,
        width: 320,
        height: 240,
    };
    let (mut dev, rec) = device_with(Some(fbs));

    dev.write_u32(reg(MM_DPC_REGS, DPC_END_REG), 0x100);
    assert_eq!(rec.borrow().rdp_lists, 1);
    assert_eq!(dev.bus().read_handler(0x10_0000), Handler::RdramFb);
    assert!(rec.borrow().fast_memory_disabled);
    assert!(rec.borrow().invalidations.contains(&(0, 0)));

    dev.read_u32(0x10_0010);
    dev.read_u32(0x10_0014);
    assert_eq!(rec.borrow().fb_reads, vec![0x10_0010], "one notification per dirty page");

    dev.read_u32(0x12_8000);
    assert_eq!(rec.borrow().fb_reads.len(), 1, "past the framebuffer end");

    dev.write_u16(0x10_0022, 0xabcd);
    assert_eq!(rec.borrow().fb_writes, vec![(0x10_0022, 2)]);
    assert_eq!(dev.read_u16(0x10_0022), 0xabcd);
}

#[test]
fn test_register_breakpoint_still_forwards() {
    let (mut dev, _rec) = device();
    dev.add_breakpoint(MM_MI_REGS + 0xc, MM_MI_REGS + 0xf, BP_WRITE);

    // MI_INTR_MASK: set VI
    dev.write_u32(MM_MI_REGS + 0xc, 0x80);
    assert_eq!(dev.mi().intr_mask(), MI_INTR_VI);
    let hits = dev.take_breakpoint_hits();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].address, MM_MI_REGS + 0xc);
}

#[test]
fn test_vertical_interrupts_keep_coming() {
    let (mut dev, rec) = device();
    for frame in 1..=3 {
        advance_to(&mut dev, EventKind::Vi);
        assert_eq!(dev.vi().frames, frame);
    }
    assert_eq!(rec.borrow().screen_updates, 3);
}
