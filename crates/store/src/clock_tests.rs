use super::*;

#[test]
fn fake_clock_advances_monotonic_time() {
    let clock = FakeClock::new();
    let before = clock.now();

    clock.advance(Duration::from_secs(30));

    assert_eq!(clock.now().duration_since(before), Duration::from_secs(30));
}

#[test]
fn fake_clock_advances_wall_time() {
    let clock = FakeClock::new();
    let before = clock.unix_secs();

    clock.advance(Duration::from_secs(30));

    let elapsed = clock.unix_secs() - before;
    assert!((elapsed - 30.0).abs() < 1e-6);
}

#[test]
fn fake_clock_clones_share_state() {
    let clock = FakeClock::new();
    let other = clock.clone();
    let before = other.now();

    clock.advance(Duration::from_secs(5));

    assert_eq!(other.now().duration_since(before), Duration::from_secs(5));
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}
