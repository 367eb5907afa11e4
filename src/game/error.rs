/// Profile definition and resolution errors

use crate::detour::DetourError;
use crate::memory::MemoryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Invalid detour in profile {title}: {source}")]
    InvalidDetour {
        title: String,
        #[source]
        source: DetourError,
    },

    #[error("Invalid watch {watch} in profile {title}: {reason}")]
    InvalidWatch {
        title: String,
        watch: String,
        reason: String,
    },

    #[error("Duplicate profile: {0}")]
    DuplicateProfile(String),

    #[error("Cannot resolve address of watch {watch}: {reason}")]
    UnresolvedAddress { watch: String, reason: String },

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}
