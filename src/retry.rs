//! Fixed-schedule retry policy
//!
//! Retrying is opt-in per failure: the producer of an error decides whether
//! it is transient by implementing [`RetryableError`]. Anything not transient
//! aborts on the first attempt.
//!
//! The schedule is a fixed list of delays (`1s, 3s, 5s` by default), so an
//! operation runs at most `schedule.len() + 1` times. The loop itself is
//! `backoff`'s; cancellation cuts a pending wait short and stops further
//! attempts, but never interrupts an attempt that is already running.

use std::fmt::Display;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backoff::backoff::Backoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default backoff schedule shared by storage and transport retries
pub const DEFAULT_SCHEDULE: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

/// Classifies an error as transient (safe to retry) or permanent
pub trait RetryableError {
    /// Returns true if the failed operation may succeed when attempted again
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    schedule: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            schedule: DEFAULT_SCHEDULE.to_vec(),
        }
    }
}

/// Walks the configured delays once; yields nothing after cancellation
struct Schedule<'a> {
    delays: &'a [Duration],
    next: usize,
    cancel: &'a CancellationToken,
}

impl Backoff for Schedule<'_> {
    fn reset(&mut self) {
        self.next = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let delay = self.delays.get(self.next).copied();
        self.next += 1;
        delay
    }
}

impl RetryPolicy {
    pub fn new(schedule: impl Into<Vec<Duration>>) -> Self {
        Self {
            schedule: schedule.into(),
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            schedule: Vec::new(),
        }
    }

    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }

    /// Maximum number of invocations this policy performs
    pub fn max_attempts(&self) -> usize {
        self.schedule.len() + 1
    }

    /// Run `f` until it succeeds, fails permanently, the schedule is
    /// exhausted or `cancel` fires. The last error is returned on failure.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + Display,
    {
        let attempts = AtomicUsize::new(0);
        // error of the last attempt while its retry delay is running
        let waiting: Mutex<Option<E>> = Mutex::new(None);

        let schedule = Schedule {
            delays: &self.schedule,
            next: 0,
            cancel,
        };

        let retry = backoff::future::retry_notify(
            schedule,
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                if let Ok(mut slot) = waiting.lock() {
                    slot.take();
                }
                let attempt = f();
                async move {
                    attempt.await.map_err(|err| {
                        if err.is_transient() {
                            backoff::Error::transient(err)
                        } else {
                            backoff::Error::permanent(err)
                        }
                    })
                }
            },
            |err: E, delay: Duration| {
                warn!(
                    "operation '{operation}' failed on attempt {}: {err}, retrying in {}s",
                    attempts.load(Ordering::SeqCst),
                    delay.as_secs_f32()
                );
                if let Ok(mut slot) = waiting.lock() {
                    *slot = Some(err);
                }
            },
        );
        tokio::pin!(retry);

        let result = tokio::select! {
            biased;
            result = &mut retry => result,
            _ = cancel.cancelled() => {
                let pending = waiting.lock().ok().and_then(|mut slot| slot.take());
                match pending {
                    Some(err) => {
                        debug!("operation '{operation}' cancelled while waiting to retry");
                        Err(err)
                    }
                    // an attempt is in flight; let it finish, no retry follows
                    None => retry.as_mut().await,
                }
            }
        };

        let attempts = attempts.load(Ordering::SeqCst);
        match &result {
            Ok(_) if attempts > 1 => {
                debug!("operation '{operation}' succeeded after {attempts} attempts")
            }
            Err(err) if attempts > 1 => {
                warn!("operation '{operation}' failed after {attempts} attempts: {err}")
            }
            _ => {}
        }
        result
    }
}
