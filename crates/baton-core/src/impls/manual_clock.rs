//! ManualClock - virtual time for tests and simulations.
//!
//! `sleep` returns immediately after advancing virtual time by the requested
//! duration. Hooks registered with [`ManualClock::on_sleep`] run during each
//! sleep, which is where tests make "the other writer" act.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ports::Clock;

type SleepHook = Box<dyn FnMut(usize, Duration) + Send>;

struct Inner {
    now: DateTime<Utc>,
    elapsed: Duration,
    sleeps: Vec<Duration>,
    hooks: Vec<SleepHook>,
}

/// Cloning shares the same virtual timeline.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<Inner>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(DateTime::<Utc>::default())
    }

    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                now,
                elapsed: Duration::ZERO,
                sleeps: Vec::new(),
                hooks: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `hook` during every sleep. It receives the 1-based number of the
    /// sleep and its duration.
    pub fn on_sleep<F>(&self, hook: F)
    where
        F: FnMut(usize, Duration) + Send + 'static,
    {
        self.lock().hooks.push(Box::new(hook));
    }

    pub fn advance(&self, duration: Duration) {
        let mut inner = self.lock();
        inner.elapsed += duration;
        let step =
            chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        inner.now += step;
    }

    /// Virtual time spent sleeping since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Every sleep so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        let (number, mut hooks) = {
            let mut inner = self.lock();
            inner.sleeps.push(duration);
            (inner.sleeps.len(), std::mem::take(&mut inner.hooks))
        };
        // Hooks run unlocked so they may use the clock themselves.
        for hook in &mut hooks {
            hook(number, duration);
        }
        {
            let mut inner = self.lock();
            hooks.append(&mut inner.hooks);
            inner.hooks = hooks;
        }
        tokio::task::yield_now().await;
    }
}
