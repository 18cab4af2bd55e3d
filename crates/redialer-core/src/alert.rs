//! Long-call alert countdown.
//!
//! At most one countdown exists at a time. Arming replaces the current
//! countdown outright, so a re-arm always restarts from the full delay and
//! a stale deadline can never fire.

use std::time::Duration;

use tokio::time::Instant;

/// A single armed countdown. Replaced, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    /// Increments on every arm; identifies the countdown in logs.
    pub id: u64,
    pub deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct AlertTimer {
    delay: Duration,
    countdown: Option<Countdown>,
    next_id: u64,
    /// Set when a countdown expires, cleared by [`AlertTimer::acknowledge`].
    active: bool,
}

impl AlertTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            countdown: None,
            next_id: 1,
            active: false,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_armed(&self) -> bool {
        self.countdown.is_some()
    }

    /// Whether an expired countdown's alert is still sounding.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn countdown(&self) -> Option<Countdown> {
        self.countdown
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.countdown.map(|c| c.deadline)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline().map(|d| d.saturating_duration_since(now))
    }

    /// Start a fresh countdown from `now`, discarding any running one.
    pub fn arm(&mut self, now: Instant) -> Countdown {
        let countdown = Countdown {
            id: self.next_id,
            deadline: now + self.delay,
        };
        self.next_id += 1;
        if let Some(previous) = self.countdown.replace(countdown) {
            tracing::debug!(previous = previous.id, countdown = countdown.id, "alert countdown restarted");
        }
        countdown
    }

    /// Stop the running countdown. Returns the cancelled countdown, if any.
    pub fn cancel(&mut self) -> Option<Countdown> {
        self.countdown.take()
    }

    /// Fire the countdown if its deadline has been reached.
    ///
    /// Returns the expired countdown exactly once; the alert is then active
    /// until acknowledged.
    pub fn poll(&mut self, now: Instant) -> Option<Countdown> {
        match self.countdown {
            Some(countdown) if countdown.deadline <= now => {
                self.countdown = None;
                self.active = true;
                Some(countdown)
            }
            _ => None,
        }
    }

    /// Silence an active alert. Returns false if nothing was sounding.
    pub fn acknowledge(&mut self) -> bool {
        std::mem::take(&mut self.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(240_000);

    #[test]
    fn fires_once_at_deadline() {
        let t0 = Instant::now();
        let mut timer = AlertTimer::new(DELAY);
        timer.arm(t0);

        assert!(timer.poll(t0 + Duration::from_millis(239_999)).is_none());
        assert!(timer.poll(t0 + DELAY).is_some());
        assert!(timer.is_active());
        assert!(!timer.is_armed());
        assert!(timer.poll(t0 + DELAY * 2).is_none());
    }

    #[test]
    fn rearm_restarts_from_full_delay() {
        let t0 = Instant::now();
        let mut timer = AlertTimer::new(DELAY);
        let first = timer.arm(t0);
        let second = timer.arm(t0 + Duration::from_millis(200_000));

        assert_ne!(first.id, second.id);
        assert!(timer.poll(t0 + DELAY).is_none());
        assert_eq!(timer.deadline(), Some(t0 + Duration::from_millis(440_000)));
        assert_eq!(timer.poll(t0 + Duration::from_millis(440_000)), Some(second));
    }

    #[test]
    fn cancel_is_noop_when_idle() {
        let mut timer = AlertTimer::new(DELAY);
        assert!(timer.cancel().is_none());

        let t0 = Instant::now();
        timer.arm(t0);
        assert!(timer.cancel().is_some());
        assert!(timer.poll(t0 + DELAY).is_none());
        assert!(!timer.is_active());
    }

    #[test]
    fn acknowledge_clears_active_flag() {
        let t0 = Instant::now();
        let mut timer = AlertTimer::new(DELAY);
        assert!(!timer.acknowledge());

        timer.arm(t0);
        timer.poll(t0 + DELAY);
        assert!(timer.acknowledge());
        assert!(!timer.acknowledge());
    }

    #[test]
    fn remaining_counts_down() {
        let t0 = Instant::now();
        let mut timer = AlertTimer::new(DELAY);
        assert_eq!(timer.remaining(t0), None);
        timer.arm(t0);
        assert_eq!(
            timer.remaining(t0 + Duration::from_millis(40_000)),
            Some(Duration::from_millis(200_000))
        );
    }
}
