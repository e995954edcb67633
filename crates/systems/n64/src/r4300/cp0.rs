//! CP0 timing and interrupt state.
//!
//! Only the part of coprocessor 0 the rest of the device interacts with
//! lives here: COUNT/COMPARE, STATUS/CAUSE interrupt bits, and the ordered
//! interrupt event queue. Everything else (TLB, EPC, exception vectors)
//! belongs to the execution engine, which is told about deliverable
//! interrupts and resets through [`CpuSignal`]s.
//!
//! # Timeline
//!
//! Time is a monotonically increasing 64-bit cycle counter. COUNT is its low
//! 32 bits plus an offset changed only by guest writes to COUNT. Events are
//! queued by 64-bit deadline, so COUNT wrapping through zero never reorders
//! them. Deadlines are converted to and from the 32-bit COUNT domain at the
//! API boundary.

use super::interrupt::EventKind;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rcp_core::logging::{log, LogCategory, LogLevel};
use rcp_core::scheduler::EventQueue;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const CP0_STATUS_IE: u32 = 0x0000_0001;
pub const CP0_STATUS_EXL: u32 = 0x0000_0002;
pub const CP0_STATUS_ERL: u32 = 0x0000_0004;
pub const CP0_STATUS_IM4: u32 = 0x0000_1000;
pub const CP0_STATUS_NMI: u32 = 0x0008_0000;
pub const CP0_STATUS_SR: u32 = 0x0010_0000;
pub const CP0_STATUS_TS: u32 = 0x0020_0000;
pub const CP0_STATUS_BEV: u32 = 0x0040_0000;

pub const CP0_CAUSE_EXCCODE_MASK: u32 = 0x0000_007c;
pub const CP0_CAUSE_IP2: u32 = 0x0000_0400;
pub const CP0_CAUSE_IP4: u32 = 0x0000_1000;
pub const CP0_CAUSE_IP7: u32 = 0x0000_8000;

/// Software interrupt bits, the only CAUSE bits the guest may write
const CP0_CAUSE_SW_MASK: u32 = 0x0000_0300;

const FULL_WRAP: u64 = 1 << 32;

/// Requests for the execution engine, drained after each poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuSignal {
    /// Take the general exception vector with the current CAUSE
    Interrupt,
    /// NMI: jump to the reset vector, ErrorEPC = current PC
    SoftReset,
    /// Device was powered back on
    HardReset,
}

/// Serializable CP0 state, queue included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cp0State {
    pub count: u32,
    pub compare: u32,
    pub status: u32,
    pub cause: u32,
    pub last_addr: u32,
    /// `(kind, trigger COUNT)` in firing order
    pub events: Vec<(EventKind, u32)>,
}

pub struct Cp0 {
    cycles: u64,
    count_offset: u32,
    compare: u32,
    status: u32,
    cause: u32,
    count_per_op: u32,
    last_addr: u32,
    queue: EventQueue<EventKind>,
    signals: VecDeque<CpuSignal>,
    rng: Option<StdRng>,
    count_wraps: u64,
}

impl Cp0 {
    pub fn new(count_per_op: u32, randomize_interrupt: bool, seed: u64) -> Self {
        Self {
            cycles: 0,
            count_offset: 0,
            compare: 0,
            status: 0,
            cause: 0,
            count_per_op,
            last_addr: 0,
            queue: EventQueue::with_capacity(16),
            signals: VecDeque::new(),
            rng: randomize_interrupt.then(|| StdRng::seed_from_u64(seed)),
            count_wraps: 0,
        }
    }

    /// Power-on register values. The cycle timeline keeps running.
    pub fn poweron(&mut self) {
        self.count_offset = (self.cycles as u32).wrapping_neg();
        self.compare = 0;
        self.status = 0;
        self.cause = 0;
        self.last_addr = 0;
        self.queue.clear();
        self.signals.clear();
        self.count_wraps = 0;
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn count_per_op(&self) -> u32 {
        self.count_per_op
    }

    pub fn count(&self) -> u32 {
        (self.cycles as u32).wrapping_add(self.count_offset)
    }

    /// Guest write to COUNT.
    ///
    /// Pending events keep their distance from now. COMPARE and the count
    /// wrap marker are defined against COUNT itself, so both are re-armed.
    pub fn set_count(&mut self, value: u32) {
        self.count_offset = value.wrapping_sub(self.cycles as u32);
        self.add_interrupt_event_count(EventKind::Compare, self.compare);
        // Special never replaces itself
        self.remove_event(EventKind::Special);
        self.add_interrupt_event_count(EventKind::Special, 0);
    }

    pub fn compare(&self) -> u32 {
        self.compare
    }

    /// Guest write to COMPARE: acknowledges the timer interrupt and re-arms it.
    pub fn set_compare(&mut self, value: u32) {
        self.compare = value;
        self.cause &= !CP0_CAUSE_IP7;
        self.add_interrupt_event_count(EventKind::Compare, value);
    }

    pub fn status(&self) -> u32 {
        self.status
    }

    /// Guest write to STATUS; may unmask something already pending.
    pub fn set_status(&mut self, value: u32) {
        self.status = value;
        self.queue_check_if_deliverable();
    }

    pub fn cause(&self) -> u32 {
        self.cause
    }

    /// Guest write to CAUSE: only the software interrupt bits stick.
    pub fn set_cause(&mut self, value: u32) {
        self.cause = (self.cause & !CP0_CAUSE_SW_MASK) | (value & CP0_CAUSE_SW_MASK);
        self.queue_check_if_deliverable();
    }

    pub fn count_wraps(&self) -> u64 {
        self.count_wraps
    }

    /// Account for instructions executed since the last call.
    pub fn update_count(&mut self, pc: u32) {
        let ops = pc.wrapping_sub(self.last_addr) >> 2;
        self.cycles += ops as u64 * self.count_per_op as u64;
        self.last_addr = pc;
    }

    /// Reset the PC reference of [`update_count`](Self::update_count) after a jump.
    pub fn set_last_addr(&mut self, pc: u32) {
        self.last_addr = pc;
    }

    pub fn add_cycles(&mut self, cycles: u64) {
        self.cycles += cycles;
    }

    /// Schedule `kind` to fire `delta` cycles from now.
    pub fn add_interrupt_event(&mut self, kind: EventKind, delta: u32) {
        self.schedule_at(kind, self.cycles + delta as u64);
    }

    /// Schedule `kind` to fire when COUNT reaches `trigger`.
    pub fn add_interrupt_event_count(&mut self, kind: EventKind, trigger: u32) {
        let mut delta = trigger.wrapping_sub(self.count()) as u64;
        if delta == 0 && kind.waits_full_wrap() {
            delta = FULL_WRAP;
        }
        self.schedule_at(kind, self.cycles + delta);
    }

    fn schedule_at(&mut self, kind: EventKind, deadline: u64) {
        if self.queue.contains(kind) {
            if kind.replaces_pending() {
                self.queue.remove(kind);
            } else {
                log(LogCategory::Interrupts, LogLevel::Warn, || {
                    format!("two events of type {:?} in the interrupt queue", kind)
                });
                return;
            }
        }
        self.queue.insert(kind, deadline);
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!(
                "event {:?} at cycle {} (count {:08X})",
                kind,
                deadline,
                self.to_count(deadline)
            )
        });
    }

    fn to_count(&self, deadline: u64) -> u32 {
        (deadline as u32).wrapping_add(self.count_offset)
    }

    pub fn remove_event(&mut self, kind: EventKind) {
        self.queue.remove(kind);
    }

    /// Trigger COUNT of the pending `kind`, if any.
    pub fn get_event(&self, kind: EventKind) -> Option<u32> {
        self.queue.deadline_of(kind).map(|d| self.to_count(d))
    }

    /// Cycles left until the pending `kind` fires (0 when overdue).
    pub fn remaining_cycles(&self, kind: EventKind) -> Option<u64> {
        self.queue
            .deadline_of(kind)
            .map(|d| d.saturating_sub(self.cycles))
    }

    pub fn is_pending(&self, kind: EventKind) -> bool {
        self.queue.contains(kind)
    }

    /// COUNT at which the next event fires
    pub fn next_interrupt(&self) -> Option<u32> {
        self.queue.next_deadline().map(|d| self.to_count(d))
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.next_deadline()
    }

    /// Pop the earliest event whose deadline has been reached.
    pub fn pop_due(&mut self) -> Option<EventKind> {
        self.queue.pop_due(self.cycles).map(|e| e.kind)
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// `(kind, trigger COUNT)` in firing order
    pub fn pending_events(&self) -> Vec<(EventKind, u32)> {
        self.queue
            .iter()
            .map(|e| (e.kind, self.to_count(e.deadline)))
            .collect()
    }

    fn interrupts_enabled(&self) -> bool {
        self.status & (CP0_STATUS_IE | CP0_STATUS_EXL | CP0_STATUS_ERL) == CP0_STATUS_IE
    }

    /// An unmasked interrupt line is asserted and STATUS lets it through.
    pub fn interrupt_pending(&self) -> bool {
        self.interrupts_enabled() && self.status & self.cause & 0xff00 != 0
    }

    fn queue_check_if_deliverable(&mut self) {
        if self.interrupt_pending() {
            self.add_interrupt_event(EventKind::Check, 0);
        }
    }

    /// Assert `ip` in CAUSE and deliver immediately if STATUS allows.
    pub fn raise_maskable_interrupt(&mut self, ip: u32) {
        self.cause = (self.cause | ip) & !CP0_CAUSE_EXCCODE_MASK;
        if self.interrupt_pending() {
            self.signal(CpuSignal::Interrupt);
        }
    }

    /// Refresh IP2 from the MI lines; delivery waits for the next poll.
    pub fn check_interrupt(&mut self, mi_pending: bool) {
        if mi_pending {
            self.cause = (self.cause | CP0_CAUSE_IP2) & !CP0_CAUSE_EXCCODE_MASK;
        } else {
            self.cause &= !CP0_CAUSE_IP2;
        }
        self.queue_check_if_deliverable();
    }

    /// COMPARE event: assert IP7 and re-arm for the next wrap.
    pub fn compare_int_handler(&mut self) {
        self.add_interrupt_event_count(EventKind::Compare, self.compare);
        self.raise_maskable_interrupt(CP0_CAUSE_IP7);
    }

    /// CHECK event: deliver whatever became deliverable since it was queued.
    pub fn check_int_handler(&mut self) {
        if self.interrupt_pending() {
            self.signal(CpuSignal::Interrupt);
        }
    }

    /// SPECIAL event: COUNT passed through zero.
    pub fn special_int_handler(&mut self) {
        self.count_wraps += 1;
        log(LogCategory::CPU, LogLevel::Debug, || {
            format!("COUNT wrapped ({} times)", self.count_wraps)
        });
        self.add_interrupt_event_count(EventKind::Special, 0);
    }

    /// HW2 event: the reset button line.
    pub fn hw2_int_handler(&mut self) {
        self.status = (self.status & !(CP0_STATUS_SR | CP0_STATUS_TS | CP0_STATUS_NMI))
            | CP0_STATUS_IM4;
        self.cause = (self.cause | CP0_CAUSE_IP4) & !CP0_CAUSE_EXCCODE_MASK;
        self.signal(CpuSignal::Interrupt);
    }

    /// CP0 part of the NMI: status for the reset vector, COUNT and CAUSE cleared.
    pub fn nmi_reset(&mut self) {
        self.queue.clear();
        self.status = (self.status & !(CP0_STATUS_SR | CP0_STATUS_TS | CP0_STATUS_NMI))
            | (CP0_STATUS_ERL | CP0_STATUS_BEV | CP0_STATUS_SR);
        self.cause = 0;
        // The caller re-arms the timeline; nothing survives the reset
        self.count_offset = 0u32.wrapping_sub(self.cycles as u32);
        self.count_wraps = 0;
    }

    pub fn signal(&mut self, signal: CpuSignal) {
        if signal == CpuSignal::Interrupt && self.signals.contains(&CpuSignal::Interrupt) {
            return;
        }
        self.signals.push_back(signal);
    }

    pub fn take_signal(&mut self) -> Option<CpuSignal> {
        self.signals.pop_front()
    }

    pub fn has_signals(&self) -> bool {
        !self.signals.is_empty()
    }

    /// Extra cycles added to SI completion when randomization is enabled.
    pub fn random_interrupt_time(&mut self) -> u32 {
        match self.rng.as_mut() {
            Some(rng) => rng.random_range(0..0x40),
            None => 0,
        }
    }

    pub fn snapshot(&self) -> Cp0State {
        Cp0State {
            count: self.count(),
            compare: self.compare,
            status: self.status,
            cause: self.cause,
            last_addr: self.last_addr,
            events: self.pending_events(),
        }
    }

    pub fn restore(&mut self, state: &Cp0State) {
        self.count_offset = state.count.wrapping_sub(self.cycles as u32);
        self.compare = state.compare;
        self.status = state.status;
        self.cause = state.cause;
        self.last_addr = state.last_addr;
        self.queue.clear();
        for &(kind, trigger) in &state.events {
            self.add_interrupt_event_count(kind, trigger);
        }
    }
}
