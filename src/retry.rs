//! Bounded retry with a fixed backoff schedule.
//!
//! The remote store is shared, rate-limited infrastructure, so transient
//! throttling is expected under normal load. Every retry loop here has a
//! finite budget; once the schedule is spent the last error is surfaced.

use std::time::Duration;

use rand::Rng;

/// Sleep abstraction so backoff behavior can be tested without waiting.
pub trait Sleeper {
    fn sleep(&self, d: Duration);
}

/// Real sleeper used outside of tests.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

/// Why a retried operation ultimately failed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error is not retryable; returned from the first attempt that hit it.
    Fatal(E),
    /// Every attempt failed with a retryable error; holds the last one.
    Exhausted { attempts: usize, last: E },
}

/// A fixed backoff schedule plus a jitter bound. An operation is attempted
/// once per schedule slot plus one initial attempt, sleeping between attempts.
pub struct RetryPolicy {
    waits: Vec<Duration>,
    jitter_ms: u64,
}

impl RetryPolicy {
    pub fn new(waits_ms: &[u64], jitter_ms: u64) -> Self {
        Self {
            waits: waits_ms.iter().map(|&ms| Duration::from_millis(ms)).collect(),
            jitter_ms,
        }
    }

    /// Schedule for bulk listing calls, which contend hardest with other
    /// bucket users: exponential-ish waits plus up to 10ms of jitter.
    pub fn listing() -> Self {
        Self::new(&[16, 32, 64, 128, 256, 256, 512, 512], 10)
    }

    /// Schedule for single-object reads: cheaper and less contended than
    /// listing, so a short fixed delay is enough.
    pub fn read() -> Self {
        Self::new(&[100, 100], 0)
    }

    /// Total number of attempts this policy will make.
    pub fn attempts(&self) -> usize {
        self.waits.len() + 1
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// schedule is exhausted. `retryable` decides which errors are transient.
    pub fn run<T, E, F, P>(
        &self,
        sleeper: &dyn Sleeper,
        retryable: P,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        for (i, attempt) in (1..=self.attempts()).enumerate() {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !retryable(&err) => return Err(RetryError::Fatal(err)),
                Err(err) => {
                    if attempt == self.attempts() {
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    eprintln!("Warning: transient store error (attempt {attempt}), retrying");
                    sleeper.sleep(self.waits[i] + self.jitter());
                }
            }
        }
        unreachable!("retry loop returns from its final attempt")
    }

    fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..self.jitter_ms))
    }
}
