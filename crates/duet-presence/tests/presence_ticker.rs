//! Integration tests for the presence ticker.
//!
//! Uses `tokio::time::pause()` (via `start_paused`) so intervals elapse
//! instantly and deterministically.

use std::time::Duration;

use duet_presence::{PresenceConfig, PresenceTicker};

// =========================================================================
// Helpers
// =========================================================================

fn every_second() -> PresenceConfig {
    PresenceConfig {
        initial_jitter: Duration::ZERO,
        ..PresenceConfig::with_interval(Duration::from_secs(1))
    }
}

// =========================================================================
// Creation
// =========================================================================

#[test]
fn test_default_interval_is_ten_seconds() {
    assert_eq!(PresenceConfig::default().interval, Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_ticker_initial_state() {
    let t = PresenceTicker::new(every_second());
    assert_eq!(t.tick_count(), 0);
    assert_eq!(t.interval(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_ticker_clamps_interval() {
    let t = PresenceTicker::new(PresenceConfig::with_interval(Duration::from_millis(1)));
    assert_eq!(t.interval(), PresenceConfig::MIN_INTERVAL);
}

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ticks_increment_monotonically() {
    let mut t = PresenceTicker::new(every_second());
    for expected in 1..=4 {
        let tick = t.wait_for_tick().await;
        assert_eq!(tick.tick, expected);
        assert_eq!(tick.missed, 0);
    }
    assert_eq!(t.tick_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_waits_one_interval() {
    let mut t = PresenceTicker::new(every_second());
    let early = tokio::time::timeout(Duration::from_millis(900), t.wait_for_tick()).await;
    assert!(early.is_err(), "tick fired before the interval elapsed");
}

#[tokio::test(start_paused = true)]
async fn test_late_wakeup_reports_missed_without_burst() {
    let mut t = PresenceTicker::new(every_second());
    t.wait_for_tick().await;

    // Block the "runtime" for 3.5 intervals.
    tokio::time::advance(Duration::from_millis(3_500)).await;
    let tick = t.wait_for_tick().await;
    assert_eq!(tick.tick, 2);
    assert_eq!(tick.missed, 2);

    // The next one stays on the original grid: due at 5 s, not at 4.5 s
    // and not at 5.5 s.
    let burst = tokio::time::timeout(Duration::from_millis(400), t.wait_for_tick()).await;
    assert!(burst.is_err(), "ticker burst after a late wake-up");
    let tick = tokio::time::timeout(Duration::from_millis(200), t.wait_for_tick())
        .await
        .expect("tick should land back on the grid");
    assert_eq!(tick.tick, 3);
    assert_eq!(tick.missed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_handling_does_not_drift() {
    let start = tokio::time::Instant::now();
    let mut t = PresenceTicker::new(every_second());

    for k in 1..=3u64 {
        let tick = t.wait_for_tick().await;
        assert_eq!(tick.missed, 0);
        assert_eq!(start.elapsed(), Duration::from_secs(k));
        // Broadcasting takes a while.
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}

// =========================================================================
// select! loop pattern (mirrors the server's presence task)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_pattern() {
    let mut t = PresenceTicker::new(every_second());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(1);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3_200)).await;
        tx.send(()).await.ok();
    });

    let mut fired = 0u64;
    loop {
        tokio::select! {
            _ = rx.recv() => break,
            tick = t.wait_for_tick() => {
                fired += 1;
                assert_eq!(tick.tick, fired);
            }
        }
    }
    assert_eq!(fired, 3);
}
