use crate::store::StoreError;
use std::time::Duration;

/// Exponential backoff schedule for rejected bulk submissions: retry `n`
/// (0-based) sleeps `initial * 2^n`, with at most `max_retries` retries.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    pub max_retries: u32,
    pub initial: Duration,
}

impl Backoff {
    pub fn new(max_retries: u32, initial_secs: u64) -> Self {
        Self {
            max_retries,
            initial: Duration::from_secs(initial_secs),
        }
    }

    /// Delay before retry `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial.saturating_mul(1u32 << attempt.min(31))
    }
}

/// Runs `op`, retrying retryable store errors per the schedule. Non-retryable
/// errors return immediately. On exhaustion, returns the final error together
/// with the total number of attempts made.
pub fn with_retries<T>(
    policy: &Backoff,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, (u32, StoreError)> {
    let mut attempt = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                tracing::warn!(
                    retry = attempt + 1,
                    delay_secs = delay.as_secs_f64(),
                    error = %e,
                    "bulk submission failed, backing off"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err((attempt + 1, e)),
        }
    }
}
