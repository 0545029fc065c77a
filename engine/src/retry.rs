use std::fmt::Display;
use std::time::Duration;

use tracing::{error, info, warn};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// 1s, 2s, 4s, ...
    Exponential,
    /// step, 2·step, 3·step, ...
    Linear(Duration),
}

impl Backoff {
    /// Delay after the failed attempt with zero-based index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Exponential => Duration::from_secs(1u64 << attempt.min(16)),
            Backoff::Linear(step) => *step * (attempt + 1),
        }
    }
}

/// Runs `op` up to `max_attempts` times, sleeping between failures.
/// Returns the last error once attempts are exhausted.
pub fn retry<T, E: Display>(
    phase: &str,
    max_attempts: u32,
    backoff: Backoff,
    sleep: &dyn Fn(Duration),
    mut op: impl FnMut() -> Result<T, E>,
) -> Result<T, E> {
    let attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        info!(phase, attempt = attempt + 1, attempts, "starting phase");
        match op() {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt + 1 >= attempts {
                    error!(phase, attempts, error = %e, "max retries reached");
                    return Err(e);
                }
                let delay = backoff.delay(attempt);
                warn!(phase, attempt = attempt + 1, error = %e, delay_secs = delay.as_secs(), "phase failed, retrying");
                sleep(delay);
                attempt += 1;
            }
        }
    }
}
