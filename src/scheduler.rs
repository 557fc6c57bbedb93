//! Timer scheduling and jitter seams.
//!
//! The connection engine never sleeps a thread; every delay is a one-shot
//! callback armed through the [`Scheduler`] trait. Both timing and
//! randomness are injected at construction so tests can drive a virtual
//! clock and a fixed jitter sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Callback invoked when a timer fires.
///
/// The callback receives its own [`CancelToken`]: a callback that races a
/// concurrent cancellation must re-check the token after acquiring whatever
/// lock guards the state it mutates, and treat a cancelled token as a no-op.
pub type TimerCallback = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

/// Cancellation flag shared between a timer and its callback.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a new, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the token as cancelled.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if the token has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a scheduled one-shot timer.
#[derive(Debug)]
pub struct TimerHandle {
    token: CancelToken,
    abort: Option<tokio::task::AbortHandle>,
}

impl TimerHandle {
    /// Creates a handle around a token, without an abortable task.
    #[must_use]
    pub const fn new(token: CancelToken) -> Self {
        Self { token, abort: None }
    }

    /// Creates a handle that also aborts a waiting task on cancel.
    #[must_use]
    pub const fn with_abort(token: CancelToken, abort: tokio::task::AbortHandle) -> Self {
        Self {
            token,
            abort: Some(abort),
        }
    }

    /// Cancels the timer.
    ///
    /// Safe to call on an already-fired or already-cancelled timer.
    pub fn cancel(&self) {
        self.token.cancel();
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Returns true if the timer has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Arms one-shot timers.
pub trait Scheduler: Send + Sync {
    /// Schedules `callback` to run once after `delay`.
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Scheduler backed by the tokio timer wheel.
///
/// Each timer is a spawned task that sleeps and then invokes the callback
/// unless the timer was cancelled first. Under `tokio::time::pause` the
/// clock is virtual, which keeps timer-driven tests deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    /// Creates a new tokio-backed scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioScheduler {
    fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let token = CancelToken::new();
        let fired = token.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !fired.is_cancelled() {
                callback(&fired);
            }
        });
        TimerHandle::with_abort(token, task.abort_handle())
    }
}

/// Source of bounded randomness for registration attempt jitter.
pub trait JitterSource: Send + Sync {
    /// Returns a uniformly distributed duration in `[0, max]`.
    fn uniform(&self, max: Duration) -> Duration;
}

/// Jitter drawn from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl RandomJitter {
    /// Creates a new random jitter source.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl JitterSource for RandomJitter {
    fn uniform(&self, max: Duration) -> Duration {
        use rand::Rng;

        if max.is_zero() {
            return Duration::ZERO;
        }
        let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic scheduler and jitter for unit tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::{CancelToken, Duration, JitterSource, Scheduler, TimerCallback, TimerHandle};

    struct Job {
        due: Duration,
        seq: u64,
        token: CancelToken,
        callback: TimerCallback,
    }

    #[derive(Default)]
    struct Queue {
        now: Duration,
        next_seq: u64,
        jobs: Vec<Job>,
    }

    /// Virtual-clock scheduler driven manually from the test body.
    ///
    /// `advance` moves the clock forward and runs every due job in due-time
    /// order. Jobs armed by a running callback land on the same queue and
    /// run in the same pass if they fall within the advanced window.
    #[derive(Default)]
    pub(crate) struct ManualScheduler {
        queue: Mutex<Queue>,
    }

    impl ManualScheduler {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn advance(&self, step: Duration) {
            let target = self.queue.lock().unwrap().now + step;
            loop {
                let job = {
                    let mut queue = self.queue.lock().unwrap();
                    let next = queue
                        .jobs
                        .iter()
                        .enumerate()
                        .filter(|(_, job)| job.due <= target)
                        .min_by_key(|(_, job)| (job.due, job.seq))
                        .map(|(idx, _)| idx);
                    match next {
                        Some(idx) => {
                            let job = queue.jobs.remove(idx);
                            queue.now = job.due;
                            job
                        }
                        None => break,
                    }
                };
                // Invoke without holding the queue lock; the callback may
                // arm new timers on this scheduler.
                if !job.token.is_cancelled() {
                    (job.callback)(&job.token);
                }
            }
            self.queue.lock().unwrap().now = target;
        }

        pub(crate) fn pending(&self) -> usize {
            let queue = self.queue.lock().unwrap();
            queue
                .jobs
                .iter()
                .filter(|job| !job.token.is_cancelled())
                .count()
        }

        pub(crate) fn now(&self) -> Duration {
            self.queue.lock().unwrap().now
        }
    }

    impl Scheduler for ManualScheduler {
        fn after(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
            let token = CancelToken::new();
            let mut queue = self.queue.lock().unwrap();
            let due = queue.now + delay;
            let seq = queue.next_seq;
            queue.next_seq += 1;
            queue.jobs.push(Job {
                due,
                seq,
                token: token.clone(),
                callback,
            });
            TimerHandle::new(token)
        }
    }

    /// Jitter source that replays a fixed sequence, then zero.
    #[derive(Default)]
    pub(crate) struct SequenceJitter {
        values: Mutex<VecDeque<Duration>>,
    }

    impl SequenceJitter {
        pub(crate) fn new(values: impl IntoIterator<Item = Duration>) -> Self {
            Self {
                values: Mutex::new(values.into_iter().collect()),
            }
        }
    }

    impl JitterSource for SequenceJitter {
        fn uniform(&self, _max: Duration) -> Duration {
            self.values
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Duration::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::testing::ManualScheduler;
    use super::*;

    #[test]
    fn test_manual_scheduler_runs_due_jobs_in_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_a = Arc::clone(&order);
        let order_b = Arc::clone(&order);

        scheduler.after(
            Duration::from_secs(10),
            Box::new(move |_| order_a.lock().unwrap().push("b")),
        );
        scheduler.after(
            Duration::from_secs(5),
            Box::new(move |_| order_b.lock().unwrap().push("a")),
        );

        scheduler.advance(Duration::from_secs(10));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_manual_scheduler_does_not_run_future_jobs() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        scheduler.after(
            Duration::from_secs(5),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        scheduler.advance(Duration::from_secs(4));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        scheduler.advance(Duration::from_secs(1));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_job_does_not_fire() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let handle = scheduler.after(
            Duration::from_secs(5),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();
        // Double cancel is a no-op.
        handle.cancel();

        scheduler.advance(Duration::from_secs(10));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_can_arm_follow_up_timer() {
        let scheduler = ManualScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        struct Chain {
            fired: Arc<AtomicUsize>,
        }

        fn arm(scheduler: &Arc<ManualScheduler>, chain: Arc<Chain>) {
            let sched = Arc::clone(scheduler);
            scheduler.after(
                Duration::from_secs(1),
                Box::new(move |_| {
                    if chain.fired.fetch_add(1, Ordering::SeqCst) < 2 {
                        arm(&sched, chain);
                    }
                }),
            );
        }

        let scheduler = Arc::new(scheduler);
        arm(
            &scheduler,
            Arc::new(Chain {
                fired: Arc::clone(&fired),
            }),
        );

        scheduler.advance(Duration::from_secs(3));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.now(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_fires_after_delay() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        scheduler.after(
            Duration::from_secs(3),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_cancel_prevents_fire() {
        let scheduler = TokioScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);

        let handle = scheduler.after(
            Duration::from_secs(3),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_random_jitter_within_bounds() {
        let jitter = RandomJitter::new();
        let max = Duration::from_secs(5);
        for _ in 0..100 {
            assert!(jitter.uniform(max) <= max);
        }
        assert_eq!(jitter.uniform(Duration::ZERO), Duration::ZERO);
    }
}
