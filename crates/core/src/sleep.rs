use rand::Rng;
use std::thread;
use std::time::Duration;

/// Sleep for `secs` seconds with +/-30% random jitter.
/// Non-finite or non-positive durations return at once.
pub fn sleep_jitter(secs: f64) {
    if !secs.is_finite() || secs <= 0.0 {
        return;
    }
    let jitter = secs * 0.3;
    let actual = secs + rand::thread_rng().gen_range(-jitter..=jitter);
    if let Ok(d) = Duration::try_from_secs_f64(actual.max(0.01)) {
        thread::sleep(d);
    }
}

/// Fixed settle delay after an action. Zero returns immediately.
pub fn settle(ms: u64) {
    if ms > 0 {
        thread::sleep(Duration::from_millis(ms));
    }
}
