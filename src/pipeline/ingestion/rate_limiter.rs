use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

#[derive(Clone, Debug)]
pub struct Limits {
    pub requests_per_min: Option<u64>,
    /// Requests allowed in flight at once
    pub concurrency: u32,
    /// Minimum pause between the start of two requests
    pub min_delay: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            requests_per_min: None,
            concurrency: 1,
            min_delay: Duration::from_millis(500),
        }
    }
}

/// Shared limiter for polite sequential fetching. Clones share state.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    limits: Limits,
    // token bucket: current tokens and time of last refill
    rpm_tokens: Mutex<(f64, Instant)>,
    last_start: Mutex<Option<Instant>>,
    sem: Arc<Semaphore>,
}

/// Held for the duration of one request.
#[derive(Debug)]
pub struct RequestPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        let rpm_capacity = limits.requests_per_min.unwrap_or(0) as f64;
        let sem = Arc::new(Semaphore::new(limits.concurrency.max(1) as usize));
        Self {
            inner: Arc::new(Inner {
                limits,
                rpm_tokens: Mutex::new((rpm_capacity, Instant::now())),
                last_start: Mutex::new(None),
                sem,
            }),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.inner.limits
    }

    /// Wait for a free slot, the inter-request delay and the per-minute budget.
    pub async fn acquire(&self) -> RequestPermit {
        // The semaphore is never closed, so a failed acquire only means no permit.
        let permit = self.inner.sem.clone().acquire_owned().await.ok();

        {
            let mut last = self.inner.last_start.lock().await;
            if let Some(prev) = *last {
                let since = prev.elapsed();
                if since < self.inner.limits.min_delay {
                    tokio::time::sleep(self.inner.limits.min_delay - since).await;
                }
            }
            *last = Some(Instant::now());
        }

        if let Some(rpm) = self.inner.limits.requests_per_min.filter(|r| *r > 0) {
            self.consume_token(rpm as f64).await;
        }

        RequestPermit { _permit: permit }
    }

    async fn consume_token(&self, capacity: f64) {
        let refill_rate = capacity / 60.0;
        loop {
            let mut guard = self.inner.rpm_tokens.lock().await;
            let (ref mut tokens, ref mut last) = *guard;
            let now = Instant::now();
            *tokens = (*tokens + now.duration_since(*last).as_secs_f64() * refill_rate).min(capacity);
            *last = now;
            if *tokens >= 1.0 {
                *tokens -= 1.0;
                return;
            }
            let wait = (1.0 - *tokens) / refill_rate;
            drop(guard);
            tokio::time::sleep(Duration::from_secs_f64(wait.max(0.001))).await;
        }
    }
}
