//! Cancellable one-shot timers for the connection.
//!
//! Each connection carries two of these: the read timer (armed around every
//! read cycle) and the abandoned timer (armed at start and on write
//! completion). Arming replaces any previous schedule; cancelling is
//! idempotent and never panics into the caller.
//!
//! A fire and a cancel may race: the cancellation token is checked inside
//! the timer task, but a callback that already won the select runs anyway.
//! Fire paths therefore re-check connection state, never assume it.

use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub(crate) struct ConnTimer {
    token: Mutex<Option<CancellationToken>>,
}

impl ConnTimer {
    pub(crate) fn new() -> Self {
        ConnTimer { token: Mutex::new(None) }
    }

    /// Schedules `on_fire` to run after `delay`, replacing (and cancelling)
    /// any previous schedule on this timer.
    pub(crate) fn arm<F>(&self, delay: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let previous = self.token.lock().unwrap().replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => on_fire(),
            }
        });
    }

    /// Cancels the pending schedule, if any.
    pub(crate) fn cancel(&self) {
        if let Some(token) = self.token.lock().unwrap().take() {
            token.cancel();
        }
    }
}
