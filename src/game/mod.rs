/// Game profiles and the transition engine

pub mod error;
pub mod profile;
pub mod registry;
pub mod titles;
pub mod transition;

// Re-exports
pub use error::{ProfileError, Result};
pub use profile::{AddressExpr, CellKind, GameProfile, WatchSpec, LEVEL_WATCH, STATUS_WATCH};
pub use registry::Registry;
pub use transition::{LevelWhitelist, RunOptions, Snapshot, TransitionEngine};
