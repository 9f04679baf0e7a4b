//! A cancellable one-shot countdown backed by a tokio task.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

/// A running countdown.
///
/// Created with [`Countdown::start`]. The tick callback fires immediately
/// with the full duration and then once per elapsed second with the time
/// remaining. When the countdown reaches zero, the expiry callback is
/// spawned on its own task, so an expiry handler is free to cancel or
/// replace timers (including the slot this one lives in) without aborting
/// its own work.
///
/// Dropping the handle cancels the countdown. A cancelled countdown never
/// fires its expiry callback.
pub struct Countdown {
    task: JoinHandle<()>,
}

impl Countdown {
    /// Starts a countdown of `seconds` seconds.
    ///
    /// `on_tick` is called with the seconds remaining, starting at
    /// `seconds` and ending at 1. `on_expire` is called once, after the
    /// full duration has elapsed.
    pub fn start<T, E>(seconds: u64, mut on_tick: T, on_expire: E) -> Self
    where
        T: FnMut(i64) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut remaining = seconds as i64;
            while remaining > 0 {
                on_tick(remaining);
                tokio::time::sleep(Duration::from_secs(1)).await;
                remaining -= 1;
            }
            trace!(seconds, "countdown expired");
            // Detached so the handler can drop this Countdown's own
            // handle without aborting itself.
            tokio::spawn(async move { on_expire() });
        });
        Self { task }
    }

    /// Cancels the countdown. The expiry callback will not run.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
    }
}
