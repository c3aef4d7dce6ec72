//! The flat error-kind set every public entry point returns.

use thiserror::Error;

/// Every fallible operation in the crate returns one of these kinds.
///
/// The distilled C API returns a tagged error code through an out-parameter;
/// here the same flat set of kinds is carried by an idiomatic `Result`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("out of host or device memory")]
    OutOfMemory,
    #[error("backend object creation failed")]
    ObjectCreationFailed,
    #[error("access out of bounds")]
    OutOfBounds,
    #[error("invalid resource format")]
    InvalidFormat,
    #[error("invalid size")]
    InvalidSize,
    #[error("invalid enum value")]
    InvalidEnum,
    #[error("invalid operation for current state")]
    InvalidOperation,
}

/// The error type returned by fallible crate operations.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct GfxError {
    pub kind: ErrorKind,
    pub message: String,
}

impl GfxError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidOperation, message)
    }

    pub fn object_creation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ObjectCreationFailed, message)
    }

    pub fn invalid_enum(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidEnum, message)
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidFormat, message)
    }

    pub fn invalid_size(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidSize, message)
    }

    pub fn out_of_bounds(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfBounds, message)
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OutOfMemory, message)
    }
}

pub type Result<T> = std::result::Result<T, GfxError>;

#[cfg(feature = "vulkan")]
impl From<ash::vk::Result> for GfxError {
    fn from(result: ash::vk::Result) -> Self {
        use ash::vk::Result as VkResult;
        let kind = match result {
            VkResult::ERROR_OUT_OF_HOST_MEMORY | VkResult::ERROR_OUT_OF_DEVICE_MEMORY => {
                ErrorKind::OutOfMemory
            }
            VkResult::ERROR_FORMAT_NOT_SUPPORTED => ErrorKind::InvalidFormat,
            _ => ErrorKind::ObjectCreationFailed,
        };
        Self::new(kind, result.to_string())
    }
}
