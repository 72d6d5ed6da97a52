//! Adaptive rate control shared by all embedding requests.
//!
//! One controller exists per embedding configuration and is injected into
//! the client rather than living in a global. On a rate-limit signal every
//! in-flight and future submission pauses; after the backoff elapses the
//! effective concurrency restarts at one slot and re-grows with sustained
//! success.
//!
//! Backoff schedule: the pause that observed the throttle waits the
//! currently stored duration; the stored duration doubles afterwards, so
//! the new value applies to the next pause.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// First pause after a rate-limit signal.
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

/// Backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Consecutive successes required to grow concurrency by one slot.
const GROW_EVERY: u32 = 3;

/// Consecutive successes required to halve the stored backoff.
const COOL_EVERY: u32 = GROW_EVERY * 10;

#[derive(Debug)]
struct State {
    allowed: usize,
    in_flight: usize,
    paused: bool,
    backoff: Duration,
    consecutive_successes: u32,
}

/// Async-safe controller gating concurrent embedding requests.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    max_concurrency: usize,
    state: Mutex<State>,
    notify: Notify,
}

impl AdaptiveRateLimiter {
    pub fn new(max_concurrency: usize) -> Self {
        let max = max_concurrency.max(1);
        Self {
            max_concurrency: max,
            state: Mutex::new(State {
                allowed: max,
                in_flight: 0,
                paused: false,
                backoff: INITIAL_BACKOFF,
                consecutive_successes: 0,
            }),
            notify: Notify::new(),
        }
    }

    /// Wait for a free slot while the controller is not paused.
    pub async fn acquire(self: &Arc<Self>) -> RatePermit {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            {
                let mut state = self.state.lock();
                if !state.paused && state.in_flight < state.allowed {
                    state.in_flight += 1;
                    return RatePermit {
                        limiter: Arc::clone(self),
                    };
                }
            }
            notified.await;
        }
    }

    /// Record a successful request: grow concurrency one slot per
    /// [`GROW_EVERY`] successes, cool the backoff after [`COOL_EVERY`].
    ///
    /// The two schedules are independent; a success count hitting both
    /// thresholds at once applies both.
    pub fn on_success(&self) {
        let mut grew = false;
        {
            let mut state = self.state.lock();
            state.consecutive_successes += 1;
            if state.consecutive_successes % GROW_EVERY == 0
                && state.allowed < self.max_concurrency
            {
                state.allowed += 1;
                debug!(allowed = state.allowed, "embedding concurrency grown");
                grew = true;
            }
            if state.consecutive_successes % COOL_EVERY == 0 && state.backoff > INITIAL_BACKOFF {
                state.backoff = std::cmp::max(INITIAL_BACKOFF, state.backoff / 2);
                debug!(backoff_secs = state.backoff.as_secs(), "embedding backoff cooled");
            }
        }
        if grew {
            self.notify.notify_waiters();
        }
    }

    /// Pause all submissions and wait out the backoff.
    ///
    /// The first caller owns the pause; concurrent callers that also saw a
    /// throttle wait for the same resume instead of stacking pauses.
    pub async fn backoff_pause(&self) {
        let pause_for = {
            let mut state = self.state.lock();
            state.consecutive_successes = 0;
            if state.paused {
                None
            } else {
                state.paused = true;
                Some(state.backoff)
            }
        };

        match pause_for {
            Some(wait) => {
                warn!(
                    wait_secs = wait.as_secs(),
                    "embedding endpoint rate-limited, pausing all requests"
                );
                tokio::time::sleep(wait).await;
                let mut state = self.state.lock();
                state.backoff = std::cmp::min(MAX_BACKOFF, state.backoff * 2);
                state.allowed = 1;
                state.paused = false;
                drop(state);
                self.notify.notify_waiters();
            }
            None => {
                // Wait for the owning pause to lift.
                loop {
                    let mut notified = std::pin::pin!(self.notify.notified());
                    notified.as_mut().enable();
                    if !self.state.lock().paused {
                        return;
                    }
                    notified.await;
                }
            }
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }

    #[cfg(test)]
    fn snapshot(&self) -> (usize, bool, Duration) {
        let state = self.state.lock();
        (state.allowed, state.paused, state.backoff)
    }
}

/// RAII slot handle; dropping it frees the slot.
#[derive(Debug)]
pub struct RatePermit {
    limiter: Arc<AdaptiveRateLimiter>,
}

impl Drop for RatePermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
