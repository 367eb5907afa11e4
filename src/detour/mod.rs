/// Code patching
///
/// Text templates are assembled into machine code, linked against addresses
/// allocated in the target, and written over a function prologue so the target
/// publishes state it would otherwise keep to itself.

pub mod error;
pub mod injector;
pub mod pattern;
pub mod signature;
pub mod spec;
pub mod templates;

// Re-exports
pub use error::{DetourError, Result};
pub use injector::{Cells, DetourPatch, Injector};
pub use pattern::{Assembled, Placeholder};
pub use signature::Signature;
pub use spec::{DetourSpec, Fill};
