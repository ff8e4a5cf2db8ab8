//! Circuit breaker around the durable store
//!
//! After `failure_threshold` consecutive failures the breaker opens and the
//! durable store is skipped until `cooldown` has elapsed. After the cooldown
//! exactly one caller is admitted as a trial; everyone else keeps using the
//! fallback until the trial closes the breaker (success) or re-opens it
//! (failure). A trial that reports neither expires after another cooldown.

use chrono::Duration;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;

pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    consecutive_failures: AtomicU32,
    /// Unix millis until which the breaker is open; 0 when closed
    open_until_ms: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            consecutive_failures: AtomicU32::new(0),
            open_until_ms: AtomicI64::new(0),
            clock,
        }
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Whether the durable store should be tried
    ///
    /// Once the cooldown has passed, the caller that wins the swap holds the
    /// trial and pushes the deadline out by another cooldown.
    pub fn allow_request(&self) -> bool {
        let open_until = self.open_until_ms.load(Ordering::Acquire);
        if open_until == 0 {
            return true;
        }
        let now = self.now_ms();
        if now < open_until {
            return false;
        }
        let trial_until = now + self.cooldown.num_milliseconds();
        self.open_until_ms
            .compare_exchange(open_until, trial_until, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True while the breaker is open or a trial is in flight; never claims the trial
    pub fn is_open(&self) -> bool {
        let open_until = self.open_until_ms.load(Ordering::Acquire);
        open_until != 0 && self.now_ms() < open_until
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn record_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::AcqRel);
        let was_open = self.open_until_ms.swap(0, Ordering::AcqRel) != 0;
        if was_open || previous >= self.failure_threshold {
            info!("Durable store recovered; leaving degraded mode");
        }
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold {
            let until = self.now_ms() + self.cooldown.num_milliseconds();
            self.open_until_ms.store(until, Ordering::Release);
            warn!(
                "Durable store failed {} consecutive times; breaker open for {}s",
                failures,
                self.cooldown.num_seconds()
            );
        }
    }
}
