pub mod access;
pub mod error;
pub mod pe;
#[cfg(windows)]
pub mod process;
pub mod sim;
pub mod watcher;

pub use access::{find_module, ModuleInfo, ProcessCode, ProcessMemory, SuspendGuard};
pub use error::MemoryError;
#[cfg(windows)]
pub use process::Process;
pub use sim::SimulatedProcess;
pub use watcher::{MemoryWatcher, WatcherList};
