//! Core device primitives and traits.

pub mod logging;
pub mod mmio;
pub mod scheduler;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// Emulated CPU cycles on the device timeline.
    pub type Cycles = u64;

    /// Summary of one emulated video frame.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct FrameStats {
        /// Cycles executed while producing the frame
        pub cycles: Cycles,
        /// Events dispatched while producing the frame
        pub events: u32,
    }
}

use serde_json::Value;

/// A CPU-like component stepped against a bus; returns cycles consumed.
pub trait Cpu<B: ?Sized> {
    fn reset(&mut self, bus: &mut B);
    fn step(&mut self, bus: &mut B) -> u32;
}

/// Description of a mount point (media slot) that a system supports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointInfo {
    /// Unique identifier for this mount point (e.g., "Cartridge")
    pub id: String,
    /// User-friendly name for display (e.g., "Cartridge Slot")
    pub name: String,
    /// File extensions accepted by this mount point (e.g., ["z64", "n64"])
    pub extensions: Vec<String>,
    /// Whether this mount point is required for the system to function
    pub required: bool,
}

/// A high-level System trait tying components together.
pub trait System {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reset to initial power-on state
    fn reset(&mut self);

    /// Emulate until the next video frame boundary.
    fn step_frame(&mut self) -> Result<types::FrameStats, Self::Error>;

    /// Return a JSON-serializable save state for debugging.
    /// Save states do not include ROM/cartridge data.
    fn save_state(&self) -> Value;

    /// Load a JSON save state.
    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error>;

    /// Check if this system supports save/load state functionality
    fn supports_save_states(&self) -> bool {
        false
    }

    /// Get the list of mount points this system supports
    fn mount_points(&self) -> Vec<MountPointInfo>;

    /// Load media into a specific mount point
    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Unload media from a specific mount point
    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error>;

    /// Check if a mount point has media loaded
    fn is_mounted(&self, mount_point_id: &str) -> bool;
}
