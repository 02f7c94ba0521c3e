//! Errors surfaced by the stress harness.

use gpubridge_graphics::{ConfigError, GraphicsError};
use thiserror::Error;

use crate::status::Status;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graphics(#[from] GraphicsError),

    /// A flat call failed where the workload expected success.
    #[error("{call} returned {status}")]
    Call { call: &'static str, status: Status },

    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Turns an unexpected status into an error naming the call.
pub(crate) fn check(call: &'static str, status: Status) -> Result<(), AppError> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(AppError::Call { call, status })
    }
}

/// Same as [`check`] for calls that return a raw handle or pointer.
pub(crate) fn check_value<T>(call: &'static str, value: T, status: Status) -> Result<T, AppError> {
    check(call, status).map(|()| value)
}
