//! Standard N64 game controller on a joybus channel.
//!
//! ## Button State Convention
//!
//! N64 controllers use **active-high logic**: a set bit is a pressed button.
//!
//! Button layout in the 16-bit response:
//! - Bits 15-12: A, B, Z, Start
//! - Bits 11-8: D-Up, D-Down, D-Left, D-Right
//! - Bits 7-6: Reserved
//! - Bits 5-4: L, R
//! - Bits 3-0: C-Up, C-Down, C-Left, C-Right
//!
//! The analog stick uses signed 8-bit axes, X left to right and Y down to up.
//!
//! ## Commands
//!
//! - **0x00 / 0xFF**: status (device type 0x0500, no pak inserted)
//! - **0x01**: read buttons and stick
//! - **0x02 / 0x03**: controller pak read/write (no pak, reported as absent)

use crate::backend::{ControllerInput, JoybusDevice};
use rcp_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

pub const JCMD_STATUS: u8 = 0x00;
pub const JCMD_CONTROLLER_READ: u8 = 0x01;
pub const JCMD_PAK_READ: u8 = 0x02;
pub const JCMD_PAK_WRITE: u8 = 0x03;
pub const JCMD_RESET: u8 = 0xff;

/// Device type reported by a standard controller
const JDT_JOY_ABS_COUNTERS: u16 = 0x0500;
const PAK_NOT_PRESENT: u8 = 0x02;

/// N64 controller button flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControllerButtons {
    pub a: bool,
    pub b: bool,
    /// Z trigger
    pub z: bool,
    pub start: bool,
    pub d_up: bool,
    pub d_down: bool,
    pub d_left: bool,
    pub d_right: bool,
    /// L trigger
    pub l: bool,
    /// R trigger
    pub r: bool,
    pub c_up: bool,
    pub c_down: bool,
    pub c_left: bool,
    pub c_right: bool,
}

impl ControllerButtons {
    /// Pack buttons into the 16-bit value of a read response
    pub fn to_u16(&self) -> u16 {
        [
            (self.a, 15),
            (self.b, 14),
            (self.z, 13),
            (self.start, 12),
            (self.d_up, 11),
            (self.d_down, 10),
            (self.d_left, 9),
            (self.d_right, 8),
            (self.l, 5),
            (self.r, 4),
            (self.c_up, 3),
            (self.c_down, 2),
            (self.c_left, 1),
            (self.c_right, 0),
        ]
        .iter()
        .filter(|(pressed, _)| *pressed)
        .fold(0u16, |acc, (_, bit)| acc | (1 << bit))
    }
}

/// Controller state (buttons + analog stick)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    pub buttons: ControllerButtons,
    /// Analog stick X (-128 to 127, left to right)
    pub stick_x: i8,
    /// Analog stick Y (-128 to 127, down to up)
    pub stick_y: i8,
}

impl ControllerState {
    /// The 4-byte read response: buttons (big-endian), X, Y
    pub fn to_bytes(&self) -> [u8; 4] {
        let [hi, lo] = self.buttons.to_u16().to_be_bytes();
        [hi, lo, self.stick_x as u8, self.stick_y as u8]
    }
}

/// A controller plugged into one of the four front ports.
#[derive(Default)]
pub struct GameController {
    pub connected: bool,
    state: ControllerState,
    input: Option<Box<dyn ControllerInput>>,
}

impl GameController {
    pub fn new(connected: bool) -> Self {
        Self {
            connected,
            ..Self::default()
        }
    }

    /// Latch a state; used when no input source is attached.
    pub fn set_state(&mut self, state: ControllerState) {
        self.state = state;
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Poll `input` on every read command instead of the latched state.
    pub fn set_input(&mut self, input: Option<Box<dyn ControllerInput>>) {
        self.input = input;
    }

    fn poll(&mut self) -> ControllerState {
        if let Some(input) = self.input.as_mut() {
            self.state = input.input();
        }
        self.state
    }
}

impl JoybusDevice for GameController {
    fn process(&mut self, tx: &[u8], rx: &mut [u8]) -> bool {
        if !self.connected {
            return false;
        }
        let Some(&cmd) = tx.first() else {
            return false;
        };

        match cmd {
            JCMD_STATUS | JCMD_RESET => {
                let [t0, t1] = JDT_JOY_ABS_COUNTERS.to_be_bytes();
                write_reply(rx, &[t0, t1, PAK_NOT_PRESENT]);
            }
            JCMD_CONTROLLER_READ => {
                let bytes = self.poll().to_bytes();
                write_reply(rx, &bytes);
            }
            JCMD_PAK_READ | JCMD_PAK_WRITE => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("controller pak command {:02X} without a pak", cmd)
                });
                rx.fill(0);
            }
            _ => {
                log(LogCategory::Dma, LogLevel::Warn, || {
                    format!("unknown controller command {:02X}", cmd)
                });
                return false;
            }
        }
        true
    }
}

/// Copy as much of `reply` as the channel's rx area can hold.
pub(crate) fn write_reply(rx: &mut [u8], reply: &[u8]) {
    let n = rx.len().min(reply.len());
    rx[..n].copy_from_slice(&reply[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<ControllerState>);

    impl ControllerInput for Scripted {
        fn input(&mut self) -> ControllerState {
            self.0.pop().unwrap_or_default()
        }
    }

    #[test]
    fn test_button_packing() {
        let buttons = ControllerButtons {
            a: true,
            start: true,
            d_right: true,
            l: true,
            c_right: true,
            ..Default::default()
        };
        assert_eq!(buttons.to_u16(), 0x8000 | 0x1000 | 0x0100 | 0x0020 | 0x0001);
    }

    #[test]
    fn test_status_reply() {
        let mut pad = GameController::new(true);
        let mut rx = [0u8; 3];
        assert!(pad.process(&[JCMD_STATUS], &mut rx));
        assert_eq!(rx, [0x05, 0x00, 0x02]);
    }

    #[test]
    fn test_read_uses_latched_state() {
        let mut pad = GameController::new(true);
        pad.set_state(ControllerState {
            buttons: ControllerButtons {
                b: true,
                ..Default::default()
            },
            stick_x: -10,
            stick_y: 100,
        });
        let mut rx = [0u8; 4];
        assert!(pad.process(&[JCMD_CONTROLLER_READ], &mut rx));
        assert_eq!(rx, [0x40, 0x00, 0xf6, 100]);
    }

    #[test]
    fn test_read_polls_input_source() {
        let mut pad = GameController::new(true);
        pad.set_input(Some(Box::new(Scripted(vec![ControllerState {
            stick_x: 5,
            ..Default::default()
        }]))));
        let mut rx = [0u8; 4];
        pad.process(&[JCMD_CONTROLLER_READ], &mut rx);
        assert_eq!(rx[2], 5);
        assert_eq!(pad.state().stick_x, 5);
    }

    #[test]
    fn test_unplugged_does_not_answer() {
        let mut pad = GameController::new(false);
        let mut rx = [0u8; 3];
        assert!(!pad.process(&[JCMD_STATUS], &mut rx));
        assert_eq!(rx, [0; 3]);
    }
}
