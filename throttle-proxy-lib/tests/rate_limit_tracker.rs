use std::time::{Duration, Instant};
use throttle_proxy_lib::security::rate_limit::{RequestTracker, WINDOW};

#[test]
fn test_observed_counts_requests_in_current_second() {
    let t0 = Instant::now();
    let tracker = RequestTracker::starting_at(t0);

    for i in 0..10u32 {
        let at = t0 + Duration::from_millis(u64::from(i) * 90);
        assert_eq!(tracker.record_at(at), i + 1);
    }
    assert_eq!(tracker.current_rate_at(t0 + Duration::from_millis(900)), 10);
}

#[test]
fn test_window_resets_after_one_second() {
    let t0 = Instant::now();
    let tracker = RequestTracker::starting_at(t0);

    tracker.record_at(t0);
    tracker.record_at(t0 + Duration::from_millis(500));
    assert_eq!(tracker.record_at(t0 + Duration::from_millis(999)), 3);

    // Exactly one second after the window opened counts as elapsed
    assert_eq!(tracker.record_at(t0 + WINDOW), 1);
    assert_eq!(tracker.window_start(), t0 + WINDOW);
}

#[test]
fn test_reset_opens_window_at_triggering_request() {
    let t0 = Instant::now();
    let tracker = RequestTracker::starting_at(t0);

    tracker.record_at(t0);
    let late = t0 + Duration::from_millis(2_500);
    assert_eq!(tracker.record_at(late), 1);
    assert_eq!(tracker.record_at(late + Duration::from_millis(999)), 2);
    assert_eq!(tracker.record_at(late + WINDOW), 1);
}

#[test]
fn test_window_start_never_moves_backward() {
    let t0 = Instant::now();
    let tracker = RequestTracker::starting_at(t0);

    let newer = t0 + Duration::from_secs(2);
    tracker.record_at(newer);
    // A request stamped before the current window joins it
    assert_eq!(tracker.record_at(t0 + Duration::from_millis(1_500)), 2);
    assert_eq!(tracker.window_start(), newer);
    assert_eq!(tracker.last_seen(), newer);
}

#[test]
fn test_current_rate_is_zero_once_window_expired() {
    let t0 = Instant::now();
    let tracker = RequestTracker::starting_at(t0);
    tracker.record_at(t0);
    tracker.record_at(t0);

    assert_eq!(tracker.current_rate_at(t0 + Duration::from_millis(10)), 2);
    assert_eq!(tracker.current_rate_at(t0 + Duration::from_secs(1)), 0);
    // Reading does not reset the window
    assert_eq!(tracker.window_start(), t0);
}

#[test]
fn test_idle_time_tracks_last_request() {
    let t0 = Instant::now();
    let tracker = RequestTracker::starting_at(t0);
    tracker.record_at(t0 + Duration::from_millis(700));

    assert_eq!(
        tracker.idle_for_at(t0 + Duration::from_millis(1_700)),
        Duration::from_secs(1)
    );
    // Earlier instants saturate instead of underflowing
    assert_eq!(tracker.idle_for_at(t0), Duration::ZERO);
}

#[test]
fn test_concurrent_records_observe_distinct_counts() {
    use std::sync::Arc;
    use std::thread;

    let t0 = Instant::now();
    let tracker = Arc::new(RequestTracker::starting_at(t0));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || (0..50).map(|_| tracker.record_at(t0)).collect::<Vec<_>>())
        })
        .collect();

    let mut seen: Vec<u32> = Vec::new();
    for h in handles {
        seen.extend(h.join().unwrap());
    }
    seen.sort_unstable();

    assert_eq!(seen, (1..=400).collect::<Vec<u32>>());
}
