//! Tests for the backoff policy.

use super::*;

#[test]
fn test_default_policy() {
    let policy = BackoffPolicy::default();

    assert_eq!(policy.initial_delay, Duration::from_millis(100));
    assert_eq!(policy.max_delay, Duration::from_secs(10));
    assert_eq!(policy.backoff_multiplier, 2.0);
    assert!(policy.use_jitter);
}

#[test]
fn test_exponential_growth_without_jitter() {
    let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(10), 2.0)
        .without_jitter();

    assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
    assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
    assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
    assert_eq!(policy.calculate_delay(3), Duration::from_millis(800));
}

#[test]
fn test_delay_is_capped() {
    let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(5), 2.0)
        .without_jitter();

    assert_eq!(policy.calculate_delay(10), Duration::from_secs(5));
    assert_eq!(policy.calculate_delay(u32::MAX), Duration::from_secs(5));
}

#[test]
fn test_jitter_stays_within_bounds() {
    let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60), 2.0)
        .with_jitter_percent(0.25);

    for _ in 0..100 {
        let delay = policy.calculate_delay(2).as_secs_f64();
        assert!((3.0..=5.0).contains(&delay), "delay {} out of range", delay);
    }
}

#[test]
fn test_jitter_never_exceeds_max() {
    let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(2), 2.0)
        .with_jitter_percent(1.0);

    for _ in 0..100 {
        assert!(policy.calculate_delay(8) <= Duration::from_secs(2));
    }
}

#[test]
fn test_jitter_percent_is_clamped() {
    let policy = BackoffPolicy::default().with_jitter_percent(3.0);
    assert_eq!(policy.jitter_percent, 1.0);

    let policy = BackoffPolicy::default().with_jitter_percent(-1.0);
    assert_eq!(policy.jitter_percent, 0.0);
}
