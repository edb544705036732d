use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Handle to one periodic timer. Cancelling (or dropping) the handle stops
/// the timer; an in-flight tick body is not interrupted.
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Register a periodic unit of work with no shared ordering constraint
/// across tasks.
///
/// The next fire time is start-of-previous-tick + interval, so a slow tick
/// body does not stretch the effective period. A missed deadline fires
/// immediately once, without catching up a backlog.
pub fn schedule<F>(interval: Duration, task: F) -> TimerHandle
where
    F: Fn() + Send + 'static,
{
    let handle = tokio::spawn(async move {
        loop {
            let started = Instant::now();
            task();
            sleep_until(started + interval).await;
        }
    });
    TimerHandle { task: handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(counter: Arc<AtomicUsize>) -> impl Fn() + Send + 'static {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_configured_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let timer = schedule(Duration::from_secs(1), counting_task(count.clone()));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        timer.cancel();

        // First fire at t=0, then one per second.
        let fired = count.load(Ordering::SeqCst);
        assert!((10..=11).contains(&fired), "fired {fired} times");
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_tick_independently() {
        let fast = Arc::new(AtomicUsize::new(0));
        let slow = Arc::new(AtomicUsize::new(0));
        let t1 = schedule(Duration::from_secs(1), counting_task(fast.clone()));
        let t2 = schedule(Duration::from_secs(5), counting_task(slow.clone()));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        t1.cancel();
        t2.cancel();

        let fast_fired = fast.load(Ordering::SeqCst);
        let slow_fired = slow.load(Ordering::SeqCst);
        assert!((10..=11).contains(&fast_fired), "fast fired {fast_fired}");
        assert!((2..=3).contains(&slow_fired), "slow fired {slow_fired}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_work_does_not_delay_other_timers() {
        // A tick that spawns long-running work must not stretch anyone's
        // period, its own included.
        let slow_tick = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(AtomicUsize::new(0));

        let slow_counter = slow_tick.clone();
        let t1 = schedule(Duration::from_secs(1), move || {
            slow_counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(tokio::time::sleep(Duration::from_secs(30)));
        });
        let t2 = schedule(Duration::from_secs(1), counting_task(other.clone()));

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        t1.cancel();
        t2.cancel();

        assert!(slow_tick.load(Ordering::SeqCst) >= 5);
        assert!(other.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_deadline_fires_once_without_backlog() {
        let count = Arc::new(AtomicUsize::new(0));
        let timer = schedule(Duration::from_secs(1), counting_task(count.clone()));
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Jump far past the due tick in one step: exactly one late fire,
        // no catch-up burst for the nine other missed deadlines.
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // The following tick is armed relative to the late fire.
        tokio::time::advance(Duration::from_millis(999)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        tokio::time::advance(Duration::from_millis(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        timer.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_future_ticks() {
        let count = Arc::new(AtomicUsize::new(0));
        let timer = schedule(Duration::from_secs(1), counting_task(count.clone()));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        timer.cancel();
        let before = count.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }
}
