//! R4300 interfaces consumed by the device.
//!
//! The instruction engine itself is external. It drives the device through
//! [`rcp_core::Cpu`] and talks to [`cp0::Cp0`] for timing.

pub mod cp0;
pub mod interrupt;

use crate::Device;
use rcp_core::Cpu;

/// Execution engine that spins in place: every step costs one instruction.
///
/// Stands in for the real interpreter when only the device side is exercised
/// (front-end bring-up, tests, timing experiments).
#[derive(Debug, Default)]
pub struct IdleEngine {
    pub steps: u64,
    pub interrupts_taken: u64,
}

impl Cpu<Device> for IdleEngine {
    fn reset(&mut self, _dev: &mut Device) {
        self.steps = 0;
        self.interrupts_taken = 0;
    }

    fn step(&mut self, dev: &mut Device) -> u32 {
        while let Some(signal) = dev.take_cpu_signal() {
            if signal == cp0::CpuSignal::Interrupt {
                self.interrupts_taken += 1;
            }
        }
        self.steps += 1;
        dev.cp0().count_per_op()
    }
}
