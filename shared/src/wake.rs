//! Deferred wake-up of the character body after the window comes back into view.
//!
//! Hidden puts the body to sleep right away. Visible schedules a wake `delay` later so the
//! first frames after a long pause (huge deltas, stale transforms) do not launch the body.
//! Time is whatever monotonic clock the caller polls with.

use std::time::Duration;

use tracing::debug;

/// What the caller should do with the body in response to a visibility change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisibilityAction {
    Sleep,
    /// Wake is scheduled; nothing to do until [`WakeScheduler::poll`] says so.
    Deferred,
    Nothing,
}

#[derive(Clone, Debug)]
pub struct WakeScheduler {
    delay: Duration,
    due: Option<Duration>,
    /// Bumped on every schedule/cancel so a stale due time can never fire.
    generation: u64,
    torn_down: bool,
}

impl WakeScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            due: None,
            generation: 0,
            torn_down: false,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    #[inline]
    pub fn pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Any visibility change cancels a wake that has not fired yet.
    pub fn visibility_changed(&mut self, visible: bool, now: Duration) -> VisibilityAction {
        if self.torn_down {
            return VisibilityAction::Nothing;
        }
        self.cancel();
        if visible {
            self.generation += 1;
            self.due = Some(now + self.delay);
            debug!(generation = self.generation, delay = ?self.delay, "wake scheduled");
            VisibilityAction::Deferred
        } else {
            VisibilityAction::Sleep
        }
    }

    pub fn cancel(&mut self) {
        if self.due.take().is_some() {
            self.generation += 1;
        }
    }

    /// `true` exactly once, on the first poll at or after the due time.
    pub fn poll(&mut self, now: Duration) -> bool {
        if self.torn_down {
            return false;
        }
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }

    /// Inert from here on: pending and future wakes never fire.
    pub fn teardown(&mut self) {
        self.cancel();
        self.torn_down = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn hidden_sleeps_and_visible_wakes_after_delay() {
        let mut w = WakeScheduler::new(ms(200));
        assert_eq!(w.visibility_changed(false, ms(0)), VisibilityAction::Sleep);
        assert_eq!(w.visibility_changed(true, ms(1000)), VisibilityAction::Deferred);
        assert!(!w.poll(ms(1199)));
        assert!(w.poll(ms(1200)));
        assert!(!w.poll(ms(1300)));
    }

    #[test]
    fn later_change_cancels_pending_wake() {
        let mut w = WakeScheduler::new(ms(200));
        w.visibility_changed(true, ms(0));
        let first = w.generation();
        assert_eq!(w.visibility_changed(false, ms(100)), VisibilityAction::Sleep);
        assert!(w.generation() > first);
        assert!(!w.pending());
        assert!(!w.poll(ms(500)));
    }

    #[test]
    fn wake_after_teardown_is_a_no_op() {
        let mut w = WakeScheduler::new(ms(200));
        w.visibility_changed(true, ms(0));
        w.teardown();
        assert!(!w.poll(ms(1000)));
        assert_eq!(w.visibility_changed(true, ms(1000)), VisibilityAction::Nothing);
        assert!(!w.poll(ms(5000)));
    }
}
