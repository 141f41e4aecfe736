//! Logical Height Clock
//!
//! The engine's only notion of time is a monotonically increasing height read
//! from a [`HeightSource`]. The engine never advances it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::Height;

/// Read-only view of the host's logical height.
pub trait HeightSource: Send + Sync {
    /// Current logical height. Must never decrease between calls.
    fn current_height(&self) -> Height;
}

/// Manually driven height clock for the simulator and tests.
///
/// # Monotonicity Contract
/// - `current_height()` never decreases
/// - `advance_to()` panics on backward movement
/// - `advance_by()` only moves forward and panics on overflow
#[derive(Debug, Default)]
pub struct ManualClock {
    current: AtomicU64,
}

impl ManualClock {
    /// Create a clock starting at the given height.
    #[inline]
    pub fn new(start: Height) -> Self {
        Self {
            current: AtomicU64::new(start),
        }
    }

    /// Advance to a new height. Panics if height would go backward.
    #[inline]
    pub fn advance_to(&self, height: Height) {
        let previous = self.current.fetch_max(height, Ordering::SeqCst);
        assert!(
            height >= previous,
            "ManualClock: cannot go backward from {} to {}",
            previous,
            height
        );
    }

    /// Advance by a number of heights (one per mined block). Panics if the
    /// height would overflow.
    #[inline]
    pub fn advance_by(&self, delta: Height) {
        let advanced = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |h| h.checked_add(delta));
        if let Err(current) = advanced {
            panic!("ManualClock: cannot advance {} past height {}", delta, current);
        }
    }

    /// Check if a height is strictly in the past.
    #[inline]
    pub fn is_past(&self, height: Height) -> bool {
        height < self.current_height()
    }
}

impl HeightSource for ManualClock {
    #[inline]
    fn current_height(&self) -> Height {
        self.current.load(Ordering::SeqCst)
    }
}

impl fmt::Display for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "height {}", self.current_height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_monotonic() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.current_height(), 100);

        clock.advance_to(150);
        assert_eq!(clock.current_height(), 150);

        clock.advance_by(3);
        assert_eq!(clock.current_height(), 153);
        assert!(clock.is_past(152));
        assert!(!clock.is_past(153));
    }

    #[test]
    fn test_advance_to_same_height_is_noop() {
        let clock = ManualClock::new(10);
        clock.advance_to(10);
        assert_eq!(clock.current_height(), 10);
    }

    #[test]
    #[should_panic(expected = "cannot go backward")]
    fn test_clock_backward_panics() {
        let clock = ManualClock::new(1_000);
        clock.advance_to(500);
    }

    #[test]
    #[should_panic(expected = "cannot advance")]
    fn test_advance_by_overflow_panics() {
        let clock = ManualClock::new(Height::MAX - 1);
        clock.advance_by(2);
    }

    #[test]
    fn test_advance_by_to_the_last_height() {
        let clock = ManualClock::new(Height::MAX - 1);
        clock.advance_by(1);
        assert_eq!(clock.current_height(), Height::MAX);
    }
}
