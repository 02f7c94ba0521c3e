//! Graphics error types.
//!
//! Every failing operation reports exactly one [`GraphicsError`]. Callers
//! across the numeric boundary only see the coarse [`ErrorKind`], so each
//! variant maps onto one class.

use std::fmt;

use gpubridge_core::{ArenaError, Handle, HandleError};

use crate::runtime::WorkerId;

/// Errors that can occur while creating resources or recording passes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// The handle is stale, null, or was never issued.
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),
    /// The call is illegal in the current pass or runtime state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// An argument is out of range or inconsistent with the bound state.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The handle resolved to the wrong kind of resource, or the call is not
    /// available for this pass kind.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Debug groups or queries were not properly nested.
    #[error("unbalanced: {0}")]
    Unbalanced(String),
    /// A pipeline-statistics query is already active in this pass.
    #[error("pipeline statistics query {index} of {query_set} is already active")]
    OnlyOneActive { query_set: Handle, index: u32 },
    /// The pass belongs to another worker.
    #[error("pass {pass} is owned by {owner}, not {caller}")]
    InvalidOwner {
        pass: Handle,
        owner: WorkerId,
        caller: WorkerId,
    },
    /// A worker or pass cannot be torn down while a pass is still recording.
    #[error("{worker} still owns recording pass {pass}")]
    InUse { worker: WorkerId, pass: Handle },
    /// A resource failed a device-level check when the pass was finalized.
    #[error("device error: {0}")]
    Device(String),
    /// A pointer or length from the shared arena was rejected.
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

impl From<HandleError> for GraphicsError {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::InvalidHandle(handle) => Self::InvalidHandle(handle),
        }
    }
}

/// Coarse error classes visible across the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidHandle,
    InvalidState,
    ValidationError,
    TypeMismatch,
    Unbalanced,
    OnlyOneActive,
    InvalidOwner,
    InUseError,
    DeviceError,
}

impl GraphicsError {
    /// The class this error is reported as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidHandle(_) => ErrorKind::InvalidHandle,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Validation(_) | Self::Arena(_) => ErrorKind::ValidationError,
            Self::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Self::Unbalanced(_) => ErrorKind::Unbalanced,
            Self::OnlyOneActive { .. } => ErrorKind::OnlyOneActive,
            Self::InvalidOwner { .. } => ErrorKind::InvalidOwner,
            Self::InUse { .. } => ErrorKind::InUseError,
            Self::Device(_) => ErrorKind::DeviceError,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidHandle => "InvalidHandle",
            Self::InvalidState => "InvalidState",
            Self::ValidationError => "ValidationError",
            Self::TypeMismatch => "TypeMismatch",
            Self::Unbalanced => "Unbalanced",
            Self::OnlyOneActive => "OnlyOneActive",
            Self::InvalidOwner => "InvalidOwner",
            Self::InUseError => "InUseError",
            Self::DeviceError => "DeviceError",
        };
        f.write_str(name)
    }
}
