//! 🐢 Throttle: the art of waiting, and then waiting twice as long.
//!
//! One `Backoff` per worker. It starts at the configured inter-batch wait and
//! doubles every time the service says "slow down". It never shrinks back.
//! Whether it should is an open argument; until someone wins it, the delay
//! only goes up, saturating instead of overflowing.
//!
//! A zero wait is allowed (no pacing), but the first throttle bumps it to
//! `THROTTLE_FLOOR` so a retry is never a busy loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{trace, warn};

use crate::backends::BackendError;

/// 🧱 Where escalation starts when the configured wait is zero.
pub(crate) const THROTTLE_FLOOR: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Backoff {
    delay: Duration,
}

impl Backoff {
    pub(crate) fn new(initial: Duration) -> Self {
        Self { delay: initial }
    }

    pub(crate) fn current(&self) -> Duration {
        self.delay
    }

    /// ⏫ Double the delay for everything that follows.
    pub(crate) fn escalate(&mut self) -> Duration {
        self.delay = if self.delay.is_zero() {
            THROTTLE_FLOOR
        } else {
            self.delay.saturating_mul(2)
        };
        self.delay
    }

    /// 💤 Sleep for the current delay. Zero means "don't bother the scheduler".
    pub(crate) async fn wait(&self) {
        if !self.delay.is_zero() {
            trace!("💤 backing off for {:?}", self.delay);
            sleep(self.delay).await;
        }
    }
}

/// 🔁 Repeat `call` until it stops being throttled: double the delay, wait, try the
/// identical call again. Every other outcome goes straight back to the caller.
pub(crate) async fn retry_throttled<T, F, Fut>(
    backoff: &mut Backoff,
    what: &str,
    mut call: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    loop {
        match call().await {
            Err(err) if err.is_throttling() => {
                let delay = backoff.escalate();
                warn!("🐢 {} throttled ({}); retrying in {:?}", what, err, delay);
                backoff.wait().await;
            }
            outcome => return outcome,
        }
    }
}
