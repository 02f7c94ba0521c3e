//! Numeric status codes returned across the flat call surface.

use std::fmt;

use gpubridge_graphics::{ErrorKind, GraphicsError};

/// Result of a flat call. `Ok` is zero; every error class has its own code.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Ok = 0,
    InvalidHandle = 1,
    InvalidState = 2,
    ValidationError = 3,
    TypeMismatch = 4,
    Unbalanced = 5,
    OnlyOneActive = 6,
    InvalidOwner = 7,
    InUseError = 8,
    DeviceError = 9,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Decodes a raw code; unknown codes yield `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Ok,
            1 => Self::InvalidHandle,
            2 => Self::InvalidState,
            3 => Self::ValidationError,
            4 => Self::TypeMismatch,
            5 => Self::Unbalanced,
            6 => Self::OnlyOneActive,
            7 => Self::InvalidOwner,
            8 => Self::InUseError,
            9 => Self::DeviceError,
            _ => return None,
        })
    }
}

impl From<ErrorKind> for Status {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::InvalidHandle => Self::InvalidHandle,
            ErrorKind::InvalidState => Self::InvalidState,
            ErrorKind::ValidationError => Self::ValidationError,
            ErrorKind::TypeMismatch => Self::TypeMismatch,
            ErrorKind::Unbalanced => Self::Unbalanced,
            ErrorKind::OnlyOneActive => Self::OnlyOneActive,
            ErrorKind::InvalidOwner => Self::InvalidOwner,
            ErrorKind::InUseError => Self::InUseError,
            ErrorKind::DeviceError => Self::DeviceError,
        }
    }
}

impl From<&GraphicsError> for Status {
    fn from(err: &GraphicsError) -> Self {
        err.kind().into()
    }
}

impl<T> From<&Result<T, GraphicsError>> for Status {
    fn from(result: &Result<T, GraphicsError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(err) => err.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("Ok"),
            Self::InvalidHandle => ErrorKind::InvalidHandle.fmt(f),
            Self::InvalidState => ErrorKind::InvalidState.fmt(f),
            Self::ValidationError => ErrorKind::ValidationError.fmt(f),
            Self::TypeMismatch => ErrorKind::TypeMismatch.fmt(f),
            Self::Unbalanced => ErrorKind::Unbalanced.fmt(f),
            Self::OnlyOneActive => ErrorKind::OnlyOneActive.fmt(f),
            Self::InvalidOwner => ErrorKind::InvalidOwner.fmt(f),
            Self::InUseError => ErrorKind::InUseError.fmt(f),
            Self::DeviceError => ErrorKind::DeviceError.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..10 {
            let status = Status::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(Status::from_code(10), None);
    }

    #[test]
    fn test_error_maps_to_its_class() {
        let err = GraphicsError::Unbalanced("1 debug group left open".into());
        assert_eq!(Status::from(&err), Status::Unbalanced);

        let ok: Result<(), GraphicsError> = Ok(());
        assert!(Status::from(&ok).is_ok());
    }

    #[test]
    fn test_display_matches_kind() {
        assert_eq!(Status::InUseError.to_string(), "InUseError");
        assert_eq!(Status::Ok.to_string(), "Ok");
    }
}
