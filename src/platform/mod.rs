pub mod elevation;
pub mod module;
pub mod windows;

pub use self::module::list_modules;
pub use self::windows::{ProcessInfo, HANDLE};
