use crate::types::{AnalysisError, AnalysisResult};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source used by the rate gate
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Global minimum-interval gate for outbound requests
///
/// All callers share one mutex-protected timestamp of the last reserved
/// slot. Each caller takes the slot one interval after it, so concurrent
/// callers are released one interval apart.
pub struct RateGate {
    min_interval: Duration,
    max_wait: Option<Duration>,
    last_pass: Mutex<Option<Instant>>,
    clock: Arc<dyn Clock>,
}

impl RateGate {
    /// Gate allowing at most `max_per_second` passes per second
    pub fn new(max_per_second: f64, max_wait: Option<Duration>) -> AnalysisResult<Self> {
        Self::with_clock(max_per_second, max_wait, Arc::new(SystemClock))
    }

    pub fn with_clock(
        max_per_second: f64,
        max_wait: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> AnalysisResult<Self> {
        if !max_per_second.is_finite() || max_per_second <= 0.0 {
            return Err(AnalysisError::Config(format!(
                "Rate gate needs a positive request rate, got {}",
                max_per_second
            )));
        }

        Ok(Self {
            min_interval: Duration::from_secs_f64(1.0 / max_per_second),
            max_wait,
            last_pass: Mutex::new(None),
            clock,
        })
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until the caller may issue a request
    ///
    /// The caller reserves the next free slot under the lock, then sleeps
    /// until it with the lock released. Returns how long the caller waited
    /// for its slot. If that wait would exceed `max_wait`, fails with
    /// `RateLimited` without reserving anything.
    pub fn acquire(&self) -> AnalysisResult<Duration> {
        let (slot, wait) = {
            let mut last_pass = self.last_pass.lock().unwrap_or_else(|e| e.into_inner());
            let now = self.clock.now();

            let slot = match *last_pass {
                Some(last) => (last + self.min_interval).max(now),
                None => now,
            };
            let wait = slot.saturating_duration_since(now);

            if let Some(max_wait) = self.max_wait {
                if wait > max_wait {
                    let retry_after = wait.as_secs_f64().ceil().max(1.0) as u64;
                    log::warn!("Rate gate wait {:?} exceeds cap {:?}", wait, max_wait);
                    return Err(AnalysisError::RateLimited { retry_after });
                }
            }

            *last_pass = Some(slot);
            (slot, wait)
        };

        let remaining = slot.saturating_duration_since(self.clock.now());
        if !remaining.is_zero() {
            log::debug!("Rate gate: waiting {:?}", remaining);
            self.clock.sleep(remaining);
        }

        Ok(wait)
    }
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("min_interval", &self.min_interval)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}
