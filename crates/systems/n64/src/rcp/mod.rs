//! Reality Co-Processor interfaces.
//!
//! Each controller owns its register file and receives the collaborators it
//! touches (CP0, MI, RDRAM backing, backends) as borrowed parameters. None
//! keeps a reference into another; the [`Device`](crate::Device) wires them
//! together on every access.

pub mod ai;
pub mod fb;
pub mod mi;
pub mod pi;
pub mod rdp;
pub mod ri;
pub mod rsp;
pub mod si;
pub mod vi;
