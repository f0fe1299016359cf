//! Time-based firing of trigger specifications on the tokio runtime.

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::trigger::TriggerSpec;

/// Invoked once per firing. Each invocation runs on its own task.
pub type FireCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Cancels the timer it was returned for. Dropping it leaves the timer running.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Stops future firings. A callback that already started keeps running.
    pub fn cancel(&self) {
        self.task.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Longest single sleep against the system clock. Bounds how far a firing
/// lags after the clock is stepped or the host resumes from suspend.
const MAX_NAP: Duration = Duration::from_secs(60);

/// Where a timer reads calendar time from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeSource {
    /// The system UTC clock, re-read before every firing.
    #[default]
    Wall,
    /// The tokio clock, anchored to UTC once at registration. Follows
    /// paused and advanced test time.
    Runtime,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer {
    source: TimeSource,
}

impl TokioTimer {
    #[must_use]
    pub fn new(source: TimeSource) -> Self {
        Self { source }
    }

    #[must_use]
    pub fn runtime() -> Self {
        Self::new(TimeSource::Runtime)
    }

    #[must_use]
    pub fn source(&self) -> TimeSource {
        self.source
    }

    pub fn register(&self, spec: TriggerSpec, callback: FireCallback) -> TimerHandle {
        TimerHandle { task: tokio::spawn(drive(spec, callback, Clock::start(self.source))) }
    }

    pub fn cancel(&self, handle: &TimerHandle) {
        handle.cancel();
    }
}

enum Clock {
    Wall,
    Pinned { wall: DateTime<Utc>, instant: Instant },
}

impl Clock {
    fn start(source: TimeSource) -> Self {
        match source {
            TimeSource::Wall => Self::Wall,
            TimeSource::Runtime => Self::Pinned { wall: Utc::now(), instant: Instant::now() },
        }
    }

    fn now(&self) -> DateTime<Utc> {
        match self {
            Self::Wall => Utc::now(),
            Self::Pinned { wall, instant } => {
                *wall + chrono::Duration::from_std(instant.elapsed()).unwrap_or_default()
            }
        }
    }

    async fn sleep_until(&self, at: DateTime<Utc>) {
        match self {
            Self::Wall => loop {
                let Ok(remaining) = (at - Utc::now()).to_std() else { return };
                if remaining.is_zero() {
                    return;
                }
                tokio::time::sleep(remaining.min(MAX_NAP)).await;
            },
            Self::Pinned { wall, instant } => {
                let offset = (at - *wall).to_std().unwrap_or_default();
                tokio::time::sleep_until(*instant + offset).await;
            }
        }
    }
}

async fn drive(spec: TriggerSpec, callback: FireCallback, clock: Clock) {
    if let TriggerSpec::OneShot { at } = spec {
        let late = clock.now() - at;
        if late > chrono::Duration::minutes(1) {
            warn!(%at, late_secs = late.num_seconds(), "one-shot trigger is in the past, firing now");
        }
        clock.sleep_until(at).await;
        tokio::spawn(callback());
        return;
    }

    // Never earlier than the last firing, so the same occurrence cannot fire twice.
    let mut cursor = clock.now();
    loop {
        let Some(next) = spec.next_fire_after(cursor) else {
            warn!(trigger = %spec, "trigger has no future firing");
            return;
        };
        debug!(trigger = %spec, %next, "waiting for next firing");
        clock.sleep_until(next).await;
        tokio::spawn(callback());
        cursor = next.max(clock.now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{self, CalendarPattern};
    use futures_util::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_callback(count: Arc<AtomicUsize>) -> FireCallback {
        Arc::new(move || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let spec = trigger::convert_absolute(Utc::now() + chrono::Duration::minutes(3));
        let handle = TokioTimer::runtime().register(spec, counting_callback(count.clone()));

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn past_one_shot_fires_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let spec = TriggerSpec::OneShot { at: Utc::now() - chrono::Duration::hours(2) };
        TokioTimer::runtime().register(spec, counting_callback(count.clone()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_keeps_firing_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let spec = TriggerSpec::Periodic { pattern: CalendarPattern::midnight() };
        let timer = TokioTimer::runtime();
        let first = spec.next_fire_after(Utc::now()).unwrap();
        let handle = timer.register(spec, counting_callback(count.clone()));

        let hour = Duration::from_secs(3600);
        let to_first = (first - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(to_first + hour).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(24 * hour).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        timer.cancel(&handle);
        tokio::time::sleep(Duration::from_secs(72 * 3600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_firing_prevents_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let spec = trigger::convert_absolute(Utc::now() + chrono::Duration::hours(1));
        let handle = TokioTimer::runtime().register(spec, counting_callback(count.clone()));
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wall_clock_one_shot_fires_on_time() {
        let count = Arc::new(AtomicUsize::new(0));
        let timer = TokioTimer::default();
        assert_eq!(timer.source(), TimeSource::Wall);
        let spec = trigger::convert_absolute(Utc::now() + chrono::Duration::milliseconds(150));
        let handle = timer.register(spec, counting_callback(count.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn wall_clock_naps_are_bounded() {
        // Under paused time the system clock stands still, so a wall timer
        // keeps waking every nap without ever reaching a far deadline.
        let count = Arc::new(AtomicUsize::new(0));
        let spec = trigger::convert_absolute(Utc::now() + chrono::Duration::days(1));
        let handle = TokioTimer::default().register(spec, counting_callback(count.clone()));

        tokio::time::sleep(MAX_NAP * 5 + Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());
        handle.cancel();
    }
}
