/// Crate-level error types

use crate::detour::DetourError;
use crate::game::ProfileError;
use crate::memory::MemoryError;
use crate::settings::SettingsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to attach to {process}: {reason}")]
    AttachFailure { process: String, reason: String },

    #[error("No profile for {0}")]
    UnknownGame(String),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Detour error: {0}")]
    Detour(#[from] DetourError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Platform error: {0}")]
    PlatformError(#[from] anyhow::Error),
}
