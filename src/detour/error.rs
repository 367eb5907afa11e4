/// Code-patching error types

use crate::memory::MemoryError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DetourError>;

#[derive(Debug, Error)]
pub enum DetourError {
    #[error("Malformed pattern at line {line}: unexpected token {token:?}")]
    MalformedPattern { line: usize, token: String },

    #[error("Invalid signature token {0:?}")]
    InvalidSignature(String),

    #[error("Patch {name} needs {needed} bytes but the prologue only has {available}")]
    PatchTooLarge {
        name: String,
        needed: usize,
        available: usize,
    },

    #[error("Template declares {found} placeholders, expected {expected}")]
    PlaceholderMismatch { expected: usize, found: usize },

    #[error("Placeholder at offset {offset} is {width} bytes wide, expected {expected}")]
    PlaceholderWidth {
        offset: usize,
        width: usize,
        expected: usize,
    },

    #[error("Detour {name} conflicts with an active patch at 0x{address:X}")]
    DetourConflict { name: String, address: usize },

    #[error("Symbol {symbol} not found in {module}")]
    SymbolNotFound { module: String, symbol: String },

    #[error("Unexpected prologue for {name}: {found}")]
    PrologueMismatch { name: String, found: String },

    #[error("Shared cells must be allocated before installing detours")]
    CellsNotAllocated,

    #[error("Address 0x{0:X} does not fit 32-bit addressing")]
    AddressOutOfRange(usize),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

impl DetourError {
    /// The running game build cannot be patched; watching continues without the detour
    pub fn is_unsupported_build(&self) -> bool {
        matches!(
            self,
            DetourError::SymbolNotFound { .. } | DetourError::PrologueMismatch { .. }
        )
    }

    /// The profile definition itself is broken
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            DetourError::MalformedPattern { .. }
                | DetourError::InvalidSignature(_)
                | DetourError::PatchTooLarge { .. }
                | DetourError::PlaceholderMismatch { .. }
                | DetourError::PlaceholderWidth { .. }
                | DetourError::DetourConflict { .. }
        )
    }
}
