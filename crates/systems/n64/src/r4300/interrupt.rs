//! Interrupt event kinds and their queueing policy.

use serde::{Deserialize, Serialize};

/// Kinds of timed events carried by the CP0 queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Vertical interrupt
    Vi,
    /// COUNT reached COMPARE
    Compare,
    /// Deliver a pending maskable interrupt at the next poll
    Check,
    /// SI DMA completion
    Si,
    /// PI DMA completion
    Pi,
    /// COUNT wrapped through zero
    Special,
    /// AI DMA completion
    Ai,
    /// RSP task completion
    Sp,
    /// RDP command list completion
    Dp,
    /// Reset button pressed (cartridge HW2 line)
    Hw2,
    /// Non-maskable interrupt following a soft reset
    Nmi,
    /// Hard reset requested by the front-end
    ResetHard,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::Vi,
        EventKind::Compare,
        EventKind::Check,
        EventKind::Si,
        EventKind::Pi,
        EventKind::Special,
        EventKind::Ai,
        EventKind::Sp,
        EventKind::Dp,
        EventKind::Hw2,
        EventKind::Nmi,
        EventKind::ResetHard,
    ];

    /// Re-arming these moves the pending instance instead of rejecting the new one.
    pub fn replaces_pending(self) -> bool {
        matches!(self, EventKind::Vi | EventKind::Compare | EventKind::Check)
    }

    /// An absolute trigger equal to the current COUNT means one full wrap later.
    pub fn waits_full_wrap(self) -> bool {
        matches!(self, EventKind::Compare | EventKind::Special)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replacement_policy() {
        let replacing: Vec<_> = EventKind::ALL
            .iter()
            .copied()
            .filter(|k| k.replaces_pending())
            .collect();
        assert_eq!(
            replacing,
            vec![EventKind::Vi, EventKind::Compare, EventKind::Check]
        );
        assert!(!EventKind::Ai.replaces_pending());
    }

    #[test]
    fn test_count_anchored_kinds_wait_full_wrap() {
        assert!(EventKind::Compare.waits_full_wrap());
        assert!(EventKind::Special.waits_full_wrap());
        assert!(!EventKind::Vi.waits_full_wrap());
    }
}
