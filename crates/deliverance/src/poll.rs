//! Bounded polling shared by every wait in the crate.

use crate::error::Error;
use crate::utils::CancellationToken;
use rand::Rng;
use std::thread::sleep;
use std::time::{Duration, Instant};

/// Repeatedly evaluates a check at a fixed interval until it yields a value
/// or the bound is exceeded. The check always runs at least once.
#[derive(Debug, Clone)]
pub struct Poll {
    pub interval: Duration,
    pub timeout: Duration,
    /// When set, `on_period` fires once for every elapsed period (including
    /// the first, at zero) while the check keeps failing.
    pub alert_every: Option<Duration>,
    /// When set and fired, the wait ends early with [`Error::Cancelled`].
    pub cancel: Option<CancellationToken>,
}

impl Poll {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            alert_every: None,
            cancel: None,
        }
    }

    pub fn alerting_every(mut self, period: Duration) -> Self {
        self.alert_every = Some(period);
        self
    }

    pub fn cancellable(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Runs `check` until it returns `Some`. Returns `Ok(None)` on timeout.
    pub fn until<T, E: From<Error>>(
        &self,
        check: impl FnMut() -> Result<Option<T>, E>,
    ) -> Result<Option<T>, E> {
        self.until_alerting(check, |_| {})
    }

    /// Like [`Poll::until`], calling `on_period(n)` exactly once for each
    /// elapsed alert period `n` while the check is still failing.
    pub fn until_alerting<T, E: From<Error>>(
        &self,
        mut check: impl FnMut() -> Result<Option<T>, E>,
        mut on_period: impl FnMut(u64),
    ) -> Result<Option<T>, E> {
        let start = Instant::now();
        let mut last_alerted: Option<u64> = None;
        loop {
            if let Some(value) = check()? {
                return Ok(Some(value));
            }
            if self.is_cancelled() {
                return Err(Error::Cancelled.into());
            }
            let elapsed = start.elapsed();
            if elapsed > self.timeout {
                return Ok(None);
            }
            if let Some(period) = self.alert_every {
                let n = period_index(elapsed, period);
                if last_alerted.map_or(true, |last| n > last) {
                    last_alerted = Some(n);
                    on_period(n);
                }
            }
            match &self.cancel {
                Some(token) => {
                    if token.sleep(self.interval) {
                        return Err(Error::Cancelled.into());
                    }
                }
                None => sleep(self.interval),
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

fn period_index(elapsed: Duration, period: Duration) -> u64 {
    if period.is_zero() {
        return 0;
    }
    (elapsed.as_millis() / period.as_millis().max(1)) as u64
}

/// `base` give or take `pct` percent, picked uniformly.
pub fn jittered(base: Duration, pct: u32) -> Duration {
    if base.is_zero() || pct == 0 {
        return base;
    }
    let spread = base.as_secs_f64() * f64::from(pct.min(100)) / 100.0;
    let secs = rand::thread_rng().gen_range(base.as_secs_f64() - spread..=base.as_secs_f64() + spread);
    Duration::from_secs_f64(secs.max(0.0))
}

/// Sleeps for `base` give or take `pct` percent.
pub fn jitter(base: Duration, pct: u32) {
    let wait = jittered(base, pct);
    if !wait.is_zero() {
        sleep(wait);
    }
}
