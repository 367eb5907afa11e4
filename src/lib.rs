// UnrealLoads - Load remover and auto splitter core for Unreal Engine 1 games
//
// This library watches a running game process, patches the engine so that map
// loads and saves become visible in memory, and turns what it observes into
// timing commands for an external timer.

pub mod detour;
pub mod error;
pub mod game;
pub mod memory;
#[cfg(windows)]
pub mod platform;
pub mod settings;
pub mod splitter;
pub mod types;

pub use error::{Error, Result};
pub use game::Registry;
pub use settings::Settings;
pub use splitter::{Splitter, Tick};
pub use types::TimingCommand;
