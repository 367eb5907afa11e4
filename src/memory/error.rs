/// Foreign-process memory error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MemoryError>;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Failed to read {len} bytes at 0x{address:X}")]
    ReadFailure { address: usize, len: usize },

    #[error("Failed to write {len} bytes at 0x{address:X}")]
    WriteFailure { address: usize, len: usize },

    #[error("Failed to allocate {size} bytes in the target process")]
    AllocationFailed { size: usize },

    #[error("Failed to suspend or resume the target process: {0}")]
    SuspendFailed(String),

    #[error("Target process is no longer running")]
    ProcessGone,

    #[error("Platform error: {0}")]
    PlatformError(#[from] anyhow::Error),
}

impl MemoryError {
    /// Whether the error means the process most likely exited
    pub fn is_process_lost(&self) -> bool {
        matches!(self, MemoryError::ReadFailure { .. } | MemoryError::ProcessGone)
    }
}
