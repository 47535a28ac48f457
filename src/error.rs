//! Error types for the partition lifecycle engine

use thiserror::Error;

/// Core error type. Every public operation in [`crate::manager::PartitionManager`]
/// fails with one of these variants; callers at the IPC/CLI boundary map them
/// to the sentinels and exit codes in the external interface.
#[derive(Debug, Error)]
pub enum ChronosError {
    /// Index out of range, fraction outside `(0, 1]`, non-positive duration,
    /// or a malformed partition id.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Admission would violate memory conservation.
    #[error("insufficient memory on device {device_idx}: requested {requested} bytes, {available} available")]
    InsufficientMemory {
        device_idx: usize,
        requested: u64,
        available: u64,
    },

    /// An existing lock names a different owner, or the atomic create lost a race.
    #[error("device {device_idx} fraction slot {percent_mil:04} contended, held by {owner}")]
    Contended {
        device_idx: usize,
        percent_mil: u32,
        owner: String,
    },

    /// Release attempted by a user other than the partition owner.
    #[error("permission denied: {partition_id} is not owned by the caller")]
    PermissionDenied { partition_id: String },

    /// Release targeted an unknown or already-inactive partition.
    #[error("partition not found: {0}")]
    NotFound(String),

    /// No GPU platforms or devices were enumerated at startup.
    #[error("no GPU platform available")]
    PlatformUnavailable,

    /// A lock-store or config file operation failed at the boundary.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, ChronosError>;
