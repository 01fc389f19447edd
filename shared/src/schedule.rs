//! Countdown derivation for the guessing window
//!
//! Everything here is a pure function of `now` and the phase-start timestamp
//! the server stamped when guessing began. The server and every client derive
//! the same deadline from the same timestamp, so there is no shared tick.

/// Time after the nominal deadline during which late submissions still land
pub const SETTLEMENT_GRACE_MS: u64 = 3_000;

/// Where a round's guessing window currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Guesses accepted, countdown still running
    Open { remaining_ms: u64 },
    /// Countdown hit zero; stragglers may still land
    Grace { closes_in_ms: u64 },
    /// Window definitively closed; the round must settle
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundWindow {
    pub started_at: u64,
    pub budget_ms: u64,
    pub grace_ms: u64,
}

impl RoundWindow {
    pub fn new(started_at: u64, budget_ms: u64, grace_ms: u64) -> Self {
        Self {
            started_at,
            budget_ms,
            grace_ms,
        }
    }

    pub fn with_grace(self, grace_ms: u64) -> Self {
        Self { grace_ms, ..self }
    }

    pub fn elapsed_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.started_at)
    }

    /// `max(0, budget - (now - started_at))`
    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.budget_ms.saturating_sub(self.elapsed_ms(now))
    }

    /// Whole seconds left, rounded up, as shown to players
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.remaining_ms(now).div_ceil(1000)
    }

    pub fn deadline(&self) -> u64 {
        self.started_at.saturating_add(self.budget_ms)
    }

    pub fn closes_at(&self) -> u64 {
        self.deadline().saturating_add(self.grace_ms)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.remaining_ms(now) == 0
    }

    pub fn is_closed(&self, now: u64) -> bool {
        now >= self.closes_at()
    }

    pub fn state(&self, now: u64) -> WindowState {
        if self.is_closed(now) {
            WindowState::Closed
        } else if self.is_expired(now) {
            WindowState::Grace {
                closes_in_ms: self.closes_at() - now,
            }
        } else {
            WindowState::Open {
                remaining_ms: self.remaining_ms(now),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> RoundWindow {
        RoundWindow::new(10_000, 15_000, SETTLEMENT_GRACE_MS)
    }

    #[test]
    fn test_remaining_counts_down() {
        let w = window();
        assert_eq!(w.remaining_ms(10_000), 15_000);
        assert_eq!(w.remaining_ms(20_000), 5_000);
        assert_eq!(w.remaining_ms(25_000), 0);
        assert_eq!(w.remaining_ms(90_000), 0);
    }

    #[test]
    fn test_clock_behind_start_does_not_underflow() {
        let w = window();
        assert_eq!(w.elapsed_ms(5_000), 0);
        assert_eq!(w.remaining_ms(5_000), 15_000);
    }

    #[test]
    fn test_remaining_secs_rounds_up() {
        let w = window();
        assert_eq!(w.remaining_secs(10_001), 15);
        assert_eq!(w.remaining_secs(24_999), 1);
        assert_eq!(w.remaining_secs(25_000), 0);
    }

    #[test]
    fn test_window_states() {
        let w = window();
        assert_eq!(w.state(12_000), WindowState::Open { remaining_ms: 13_000 });
        assert_eq!(w.state(25_000), WindowState::Grace { closes_in_ms: 3_000 });
        assert_eq!(w.state(27_999), WindowState::Grace { closes_in_ms: 1 });
        assert_eq!(w.state(28_000), WindowState::Closed);
        assert!(w.is_expired(25_000));
        assert!(!w.is_closed(25_000));
    }

    #[test]
    fn test_zero_grace_closes_at_deadline() {
        let w = window().with_grace(0);
        assert_eq!(w.state(25_000), WindowState::Closed);
    }
}
