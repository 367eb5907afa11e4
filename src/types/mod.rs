pub mod command;
pub mod status;
pub mod value;

pub use command::TimingCommand;
pub use status::Status;
pub use value::{TextEncoding, ValueType, WatchValue};
