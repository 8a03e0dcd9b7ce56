//! Clients for the external services a receipt run depends on.

mod retry;

#[cfg(feature = "native")]
mod chat;
#[cfg(feature = "native")]
mod sheets;

pub use retry::with_retry;

#[cfg(feature = "native")]
pub use chat::ChatCompletionService;
#[cfg(feature = "native")]
pub use sheets::GoogleSheetsSink;

#[cfg(feature = "native")]
use std::time::Duration;

#[cfg(feature = "native")]
use crate::error::{ServiceError, TicketError};

/// Read a credential from the environment.
#[cfg(feature = "native")]
fn read_secret(var: &str) -> Result<String, TicketError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(TicketError::Config(format!(
            "environment variable {var} is not set"
        ))),
    }
}

/// Map a transport failure to a transient service error.
#[cfg(feature = "native")]
fn transport_error(service: &'static str, timeout: Duration, e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout {
            service,
            after: timeout,
        }
    } else {
        ServiceError::Unavailable {
            service,
            attempts: 1,
            reason: e.to_string(),
        }
    }
}
