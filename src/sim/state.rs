//! Ping-pong buffer selection.
//!
//! The simulation keeps two equally sized cell buffers. Each generation is
//! computed by reading the active buffer and writing the standby buffer, then
//! advancing the iteration counter, which swaps the two roles. The counter's
//! parity alone decides which slot is active, so selection is a pure read and
//! there is no in-place read/write hazard: rendering the active buffer may
//! overlap a compute step writing the standby buffer.

use std::ops::Index;

/// Identity of one of the two state buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    /// Buffer "A": seeded at initialization, active on even iterations.
    Primary,
    /// Buffer "B": first written by the first simulation step, active on odd
    /// iterations.
    Secondary,
}

impl Slot {
    /// The other slot.
    pub fn complement(self) -> Slot {
        match self {
            Slot::Primary => Slot::Secondary,
            Slot::Secondary => Slot::Primary,
        }
    }

    fn index(self) -> usize {
        match self {
            Slot::Primary => 0,
            Slot::Secondary => 1,
        }
    }
}

/// A pair of values owned one per [`Slot`].
#[derive(Debug)]
pub struct SlotPair<T> {
    pair: [T; 2],
}

impl<T> SlotPair<T> {
    pub fn new(primary: T, secondary: T) -> Self {
        Self {
            pair: [primary, secondary],
        }
    }
}

impl<T> Index<Slot> for SlotPair<T> {
    type Output = T;

    fn index(&self, slot: Slot) -> &T {
        &self.pair[slot.index()]
    }
}

/// Iteration counter and the active/standby selection rule.
///
/// `iterate` is the only mutation; it cannot fail. The counter never resets,
/// and overflow at `u64` width is a theoretical limit we do not special-case.
#[derive(Debug)]
pub struct PingPong {
    iteration: u64,
    force_primary: bool,
}

impl PingPong {
    /// A fresh counter at iteration 0.
    ///
    /// With `force_primary` set, [`PingPong::active`] always reports
    /// [`Slot::Primary`] regardless of parity; this is a debug aid for
    /// inspecting the seeded buffer.
    pub fn new(force_primary: bool) -> Self {
        Self {
            iteration: 0,
            force_primary,
        }
    }

    /// The slot holding the authoritative, readable state.
    pub fn active(&self) -> Slot {
        if self.force_primary || self.iteration % 2 == 0 {
            Slot::Primary
        } else {
            Slot::Secondary
        }
    }

    /// The slot the next simulation step writes.
    ///
    /// Always distinct from [`PingPong::active`].
    pub fn standby(&self) -> Slot {
        self.active().complement()
    }

    /// Advance one generation, swapping which slot is active.
    ///
    /// The compute kernel must have finished writing the current standby
    /// buffer before this is called, otherwise the next render reads a stale
    /// or partially written buffer.
    pub fn iterate(&mut self) {
        self.iteration += 1;
    }

    /// Number of completed iterations.
    pub fn iteration_step(&self) -> u64 {
        self.iteration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_matches_iterate_calls() {
        let mut clock = PingPong::new(false);
        for n in 0u64..100 {
            assert_eq!(clock.iteration_step(), n);
            let expected = if n % 2 == 0 {
                Slot::Primary
            } else {
                Slot::Secondary
            };
            assert_eq!(clock.active(), expected);
            clock.iterate();
        }
    }

    #[test]
    fn active_and_standby_are_always_distinct() {
        let mut clock = PingPong::new(false);
        for _ in 0..16 {
            assert_ne!(clock.active(), clock.standby());
            assert_eq!(clock.standby(), clock.active().complement());
            clock.iterate();
        }
    }

    #[test]
    fn force_primary_overrides_parity() {
        let mut clock = PingPong::new(true);
        for _ in 0..5 {
            assert_eq!(clock.active(), Slot::Primary);
            assert_eq!(clock.standby(), Slot::Secondary);
            clock.iterate();
        }
        // The counter still advances underneath the override.
        assert_eq!(clock.iteration_step(), 5);
    }

    #[test]
    fn slot_pair_indexes_by_slot() {
        let pair = SlotPair::new("a", "b");
        assert_eq!(pair[Slot::Primary], "a");
        assert_eq!(pair[Slot::Secondary], "b");
        assert!(!std::ptr::eq(&pair[Slot::Primary], &pair[Slot::Secondary]));
    }
}
