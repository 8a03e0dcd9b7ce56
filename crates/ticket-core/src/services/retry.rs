//! Bounded retry for service calls.

use std::thread;

use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::models::config::RetryPolicy;

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// Only transient errors are retried. An exhausted `Unavailable` error reports
/// the number of attempts actually made.
pub fn with_retry<T>(
    policy: &RetryPolicy,
    service: &'static str,
    mut op: impl FnMut() -> Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                let delay = policy.delay_for(attempt);
                warn!(service, attempt, ?delay, error = %e, "Transient failure, retrying");
                thread::sleep(delay);
                attempt += 1;
            }
            Err(ServiceError::Unavailable { reason, .. }) => {
                debug!(service, attempt, "Giving up");
                return Err(ServiceError::Unavailable {
                    service,
                    attempts: attempt,
                    reason,
                });
            }
            Err(e) => return Err(e),
        }
    }
}
