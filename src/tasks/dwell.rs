//! Interruptible periodic wait used between an activity's work cycles
//!
//! The wait sleeps in short ticks and re-reads both the configured interval
//! and the continue predicate on every tick, so a shortened interval or a
//! cancellation is noticed within one tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracker_shared::limits;

/// Live, shareable dwell interval
///
/// Clones share the same value, so a command handler can change the cadence
/// of a loop that is currently sleeping.
#[derive(Debug, Clone)]
pub struct DwellInterval {
    millis: Arc<AtomicU64>,
}

impl DwellInterval {
    pub fn new(interval: Duration) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(interval.as_millis() as u64)),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::Relaxed))
    }

    pub fn set(&self, interval: Duration) {
        self.millis.store(interval.as_millis() as u64, Ordering::Relaxed);
    }
}

/// How a dwell ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DwellOutcome {
    /// The configured interval elapsed
    Elapsed,
    /// The continue predicate turned false
    Interrupted,
}

/// Dwell with the default activity tick
pub async fn dwell<F>(interval: &DwellInterval, can_continue: F) -> DwellOutcome
where
    F: FnMut() -> bool,
{
    dwell_with_tick(interval, Duration::from_millis(limits::DWELL_TICK_MS), can_continue).await
}

/// Sleep in `tick` steps until `interval` has elapsed or `can_continue` is false
///
/// Always sleeps at least one tick so other tasks get a turn.
pub async fn dwell_with_tick<F>(
    interval: &DwellInterval,
    tick: Duration,
    mut can_continue: F,
) -> DwellOutcome
where
    F: FnMut() -> bool,
{
    let started = Instant::now();

    loop {
        sleep(tick).await;

        if !can_continue() {
            return DwellOutcome::Interrupted;
        }

        if started.elapsed() >= interval.get() {
            return DwellOutcome::Elapsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn test_full_interval_elapses() {
        let interval = DwellInterval::from_secs(3);
        let started = Instant::now();

        assert_eq!(dwell(&interval, || true).await, DwellOutcome::Elapsed);

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3));
        assert!(waited <= Duration::from_secs(3) + Duration::from_millis(limits::DWELL_TICK_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shortened_interval_takes_effect_while_sleeping() {
        let interval = DwellInterval::from_secs(30);
        let handle = interval.clone();

        tokio::spawn(async move {
            sleep(Duration::from_secs(2)).await;
            handle.set(Duration::from_secs(5));
        });

        let started = Instant::now();
        assert_eq!(dwell(&interval, || true).await, DwellOutcome::Elapsed);

        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(5));
        assert!(
            waited <= Duration::from_secs(5) + Duration::from_millis(limits::DWELL_TICK_MS),
            "waited {:?}",
            waited
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_interrupts_at_next_tick() {
        let interval = DwellInterval::from_secs(30);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(1250)).await;
            flag.store(true, Ordering::Relaxed);
        });

        let started = Instant::now();
        let outcome = dwell(&interval, || !stop.load(Ordering::Relaxed)).await;

        assert_eq!(outcome, DwellOutcome::Interrupted);
        assert!(started.elapsed() <= Duration::from_millis(1250 + limits::DWELL_TICK_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_yields_one_tick() {
        let interval = DwellInterval::new(Duration::ZERO);
        let started = Instant::now();

        assert_eq!(dwell(&interval, || true).await, DwellOutcome::Elapsed);
        assert_eq!(started.elapsed(), Duration::from_millis(limits::DWELL_TICK_MS));
    }

    #[test]
    fn test_clones_share_value() {
        let a = DwellInterval::from_secs(30);
        let b = a.clone();
        b.set(Duration::from_secs(10));
        assert_eq!(a.get(), Duration::from_secs(10));
    }
}
