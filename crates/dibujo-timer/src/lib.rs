//! Pausable turn countdown for Dibujo.
//!
//! A [`TurnTimer`] counts one turn down from its budget (60 seconds by
//! default). It yields a [`TimerEvent::Tick`] once per second carrying the
//! whole seconds left, then exactly one [`TimerEvent::Timeout`].
//!
//! # Tick alignment
//!
//! Ticks fire on whole-second boundaries measured back from the deadline,
//! not from the last tick. A 60 s turn ticks `59, 58, …, 1` and then times
//! out. After a pause at 42.4 s left, [`resume`](TurnTimer::resume) sets
//! a fresh deadline 42.4 s ahead, so the next tick fires 0.4 s later and
//! carries `42`.
//!
//! # Integration
//!
//! The timer is designed to sit inside a room actor's `tokio::select!`
//! loop. While idle or paused, [`TurnTimer::next_event`] pends forever, so
//! the other branches keep running:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         event = timer.next_event() => match event {
//!             TimerEvent::Tick { remaining } => { /* broadcast timer_tick */ }
//!             TimerEvent::Timeout => { /* reveal word, advance turn */ }
//!         },
//!     }
//! }
//! ```
//!
//! `next_event` only changes the timer after its sleep completes, so a
//! branch that loses the `select!` race never skips or repeats an event.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace};

/// Spacing between ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// What the timer produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// A second boundary passed; `remaining` whole seconds are left.
    Tick { remaining: u32 },
    /// The budget ran out. Fires once per started countdown.
    Timeout,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Idle,
    Running {
        deadline: Instant,
        /// Seconds value of the next tick; 0 means the timeout is next.
        next_tick: u32,
    },
    Paused {
        remaining: Duration,
    },
}

/// One countdown per in-progress turn.
#[derive(Debug)]
pub struct TurnTimer {
    state: State,
    /// Budget of the current countdown, kept for [`elapsed`](Self::elapsed).
    budget: Duration,
}

impl Default for TurnTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnTimer {
    /// An idle timer.
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            budget: Duration::ZERO,
        }
    }

    /// Starts a countdown of `budget`, replacing any previous one.
    pub fn start(&mut self, budget: Duration) {
        self.budget = budget;
        self.run_for(budget);
        debug!(budget_secs = budget.as_secs_f64(), "turn timer started");
    }

    /// Waits for the next tick or the timeout.
    ///
    /// Pends forever while idle or paused.
    pub async fn next_event(&mut self) -> TimerEvent {
        let State::Running {
            deadline,
            next_tick,
        } = self.state
        else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        if next_tick >= 1 {
            let fire_at = deadline
                .checked_sub(TICK_INTERVAL * next_tick)
                .unwrap_or(deadline);
            time::sleep_until(fire_at).await;
            self.state = State::Running {
                deadline,
                next_tick: next_tick - 1,
            };
            trace!(remaining = next_tick, "turn timer tick");
            TimerEvent::Tick {
                remaining: next_tick,
            }
        } else {
            time::sleep_until(deadline).await;
            self.state = State::Idle;
            debug!("turn timer expired");
            TimerEvent::Timeout
        }
    }

    /// Freezes the countdown, keeping the exact time left.
    ///
    /// Returns the frozen remaining time, or `None` if nothing was running.
    pub fn pause(&mut self) -> Option<Duration> {
        let State::Running { deadline, .. } = self.state else {
            return None;
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.state = State::Paused { remaining };
        debug!(remaining_secs = remaining.as_secs_f64(), "turn timer paused");
        Some(remaining)
    }

    /// Continues a paused countdown from its frozen value.
    ///
    /// Returns `false` if the timer was not paused.
    pub fn resume(&mut self) -> bool {
        let State::Paused { remaining } = self.state else {
            return false;
        };
        self.run_for(remaining);
        debug!(remaining_secs = remaining.as_secs_f64(), "turn timer resumed");
        true
    }

    /// Stops the countdown. Calling it on an idle or already fired timer
    /// does nothing.
    pub fn cancel(&mut self) {
        if !matches!(self.state, State::Idle) {
            debug!("turn timer cancelled");
        }
        self.state = State::Idle;
    }

    /// Time left. Zero when idle.
    pub fn remaining(&self) -> Duration {
        match self.state {
            State::Idle => Duration::ZERO,
            State::Running { deadline, .. } => {
                deadline.saturating_duration_since(Instant::now())
            }
            State::Paused { remaining } => remaining,
        }
    }

    /// Time left rounded up to whole seconds, as shown to players.
    pub fn remaining_secs(&self) -> u32 {
        ceil_secs(self.remaining())
    }

    /// Time spent so far in the current countdown, excluding pauses.
    pub fn elapsed(&self) -> Duration {
        if matches!(self.state, State::Idle) {
            return Duration::ZERO;
        }
        self.budget.saturating_sub(self.remaining())
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, State::Paused { .. })
    }

    fn run_for(&mut self, remaining: Duration) {
        self.state = State::Running {
            deadline: Instant::now() + remaining,
            next_tick: ceil_secs(remaining).saturating_sub(1),
        };
    }
}

fn ceil_secs(d: Duration) -> u32 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    u32::try_from(secs).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_secs_rounds_partial_seconds_up() {
        assert_eq!(ceil_secs(Duration::ZERO), 0);
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_secs(60)), 60);
        assert_eq!(ceil_secs(Duration::from_millis(42_400)), 43);
    }

    #[test]
    fn test_new_timer_is_idle() {
        let timer = TurnTimer::new();
        assert!(!timer.is_running());
        assert!(!timer.is_paused());
        assert_eq!(timer.remaining(), Duration::ZERO);
        assert_eq!(timer.elapsed(), Duration::ZERO);
    }
}
