//! Error types for resource loading

use crate::fs::FileHandle;
use crate::path::ResourceType;
use thiserror::Error;

/// Filesystem collaborator errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// No file at the given path
    #[error("file not found: {0}")]
    NotFound(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    /// Handle was never opened or is already closed
    #[error("invalid file handle {0:?}")]
    InvalidHandle(FileHandle),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

/// Resource loading errors
///
/// Read, parse and missing-factory errors never escape as `Err` from a load;
/// they put the resource in FAILURE and are kept as its last error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// Reading the backing file failed
    #[error("failed to read {path}: {reason}")]
    Read {
        /// Resource path
        path: String,
        /// Failure description
        reason: String,
    },

    /// The type's parser rejected the data
    #[error("failed to parse {path}: {reason}")]
    Parse {
        /// Resource path
        path: String,
        /// Failure description
        reason: String,
    },

    /// No factory registered for the resource type
    #[error("no factory registered for resource type {0}")]
    MissingFactory(ResourceType),

    /// A factory is already registered for the resource type
    #[error("resource type {0} is already registered")]
    AlreadyRegistered(ResourceType),

    /// A resource listed itself as its own dependency
    #[error("resource {0} depends on itself")]
    SelfReference(String),

    /// The hub has been shut down
    #[error("resource hub is shut down")]
    ShutDown,

    /// Filesystem error
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),
}

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResourceError::Read {
            path: "textures/a.tex".into(),
            reason: "disk on fire".into(),
        };
        assert!(err.to_string().contains("textures/a.tex"));
        assert!(err.to_string().contains("disk on fire"));

        let err = ResourceError::MissingFactory(ResourceType::of("mesh"));
        assert!(err.to_string().contains("no factory"));
    }

    #[test]
    fn test_fs_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ResourceError = FsError::from(io).into();
        assert!(matches!(err, ResourceError::Fs(FsError::Io(_))));
    }
}
