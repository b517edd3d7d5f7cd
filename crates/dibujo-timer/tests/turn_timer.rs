//! Integration tests for the turn countdown.
//!
//! Uses a paused Tokio clock so sleeps resolve instantly and elapsed
//! times are exact.

use std::time::Duration;

use dibujo_timer::{TimerEvent, TurnTimer};
use tokio::time::{self, Instant};

/// Polls `next_event` but gives up after `limit` of virtual time.
async fn next_within(timer: &mut TurnTimer, limit: Duration) -> Option<TimerEvent> {
    time::timeout(limit, timer.next_event()).await.ok()
}

// =========================================================================
// Countdown
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_next_event_first_tick_after_one_second() {
    let mut timer = TurnTimer::new();
    let t0 = Instant::now();
    timer.start(Duration::from_secs(60));

    let event = timer.next_event().await;
    assert_eq!(event, TimerEvent::Tick { remaining: 59 });
    assert_eq!(t0.elapsed(), Duration::from_secs(1));
    assert_eq!(timer.remaining_secs(), 59);
}

#[tokio::test(start_paused = true)]
async fn test_next_event_full_countdown_ends_with_single_timeout() {
    let mut timer = TurnTimer::new();
    let t0 = Instant::now();
    timer.start(Duration::from_secs(5));

    let mut events = Vec::new();
    loop {
        let event = timer.next_event().await;
        events.push(event);
        if event == TimerEvent::Timeout {
            break;
        }
    }

    assert_eq!(
        events,
        vec![
            TimerEvent::Tick { remaining: 4 },
            TimerEvent::Tick { remaining: 3 },
            TimerEvent::Tick { remaining: 2 },
            TimerEvent::Tick { remaining: 1 },
            TimerEvent::Timeout,
        ]
    );
    assert_eq!(t0.elapsed(), Duration::from_secs(5));
    assert!(!timer.is_running());

    // Nothing after the timeout.
    assert!(next_within(&mut timer, Duration::from_secs(30)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_next_event_idle_timer_never_fires() {
    let mut timer = TurnTimer::new();
    assert!(next_within(&mut timer, Duration::from_secs(120)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_next_event_dropped_future_does_not_skip_tick() {
    let mut timer = TurnTimer::new();
    timer.start(Duration::from_secs(10));

    // Lose the race before the first tick is due.
    assert!(next_within(&mut timer, Duration::from_millis(500)).await.is_none());

    assert_eq!(timer.next_event().await, TimerEvent::Tick { remaining: 9 });
}

#[tokio::test(start_paused = true)]
async fn test_start_replaces_running_countdown() {
    let mut timer = TurnTimer::new();
    timer.start(Duration::from_secs(60));
    time::advance(Duration::from_secs(30)).await;

    timer.start(Duration::from_secs(10));
    assert_eq!(timer.remaining_secs(), 10);
    assert_eq!(timer.next_event().await, TimerEvent::Tick { remaining: 9 });
}

// =========================================================================
// Pause / resume
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_freezes_remaining_time() {
    let mut timer = TurnTimer::new();
    timer.start(Duration::from_secs(60));
    time::advance(Duration::from_millis(17_600)).await;

    let frozen = timer.pause().expect("was running");
    assert_eq!(frozen, Duration::from_millis(42_400));
    assert!(timer.is_paused());

    // Time passing while paused changes nothing and produces no events.
    assert!(next_within(&mut timer, Duration::from_secs(300)).await.is_none());
    assert_eq!(timer.remaining(), Duration::from_millis(42_400));
    assert_eq!(timer.remaining_secs(), 43);
}

#[tokio::test(start_paused = true)]
async fn test_resume_continues_from_frozen_value() {
    let mut timer = TurnTimer::new();
    timer.start(Duration::from_secs(60));
    time::advance(Duration::from_millis(17_600)).await;
    timer.pause();
    time::advance(Duration::from_secs(90)).await;

    assert!(timer.resume());
    assert!(timer.is_running());

    let t0 = Instant::now();
    assert_eq!(timer.next_event().await, TimerEvent::Tick { remaining: 42 });
    assert_eq!(t0.elapsed(), Duration::from_millis(400));

    // Runs out 42.4 s after the resume, not 60 s.
    while timer.next_event().await != TimerEvent::Timeout {}
    assert_eq!(t0.elapsed(), Duration::from_millis(42_400));
}

#[tokio::test(start_paused = true)]
async fn test_elapsed_excludes_paused_time() {
    let mut timer = TurnTimer::new();
    timer.start(Duration::from_secs(60));
    time::advance(Duration::from_secs(12)).await;
    timer.pause();
    time::advance(Duration::from_secs(50)).await;
    timer.resume();
    time::advance(Duration::from_secs(3)).await;

    assert_eq!(timer.elapsed(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_on_wrong_state_are_noops() {
    let mut timer = TurnTimer::new();
    assert!(timer.pause().is_none());
    assert!(!timer.resume());

    timer.start(Duration::from_secs(5));
    assert!(!timer.resume());
    assert!(timer.pause().is_some());
    assert!(timer.pause().is_none());
}

// =========================================================================
// Cancel
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_running_timer() {
    let mut timer = TurnTimer::new();
    timer.start(Duration::from_secs(60));
    timer.cancel();

    assert!(!timer.is_running());
    assert_eq!(timer.remaining(), Duration::ZERO);
    assert!(next_within(&mut timer, Duration::from_secs(120)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_paused_timer_discards_snapshot() {
    let mut timer = TurnTimer::new();
    timer.start(Duration::from_secs(60));
    timer.pause();
    timer.cancel();

    assert!(!timer.is_paused());
    assert!(!timer.resume());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_timeout_is_idempotent() {
    let mut timer = TurnTimer::new();
    timer.start(Duration::from_millis(500));
    assert_eq!(timer.next_event().await, TimerEvent::Timeout);

    timer.cancel();
    timer.cancel();
    assert!(!timer.is_running());
}
