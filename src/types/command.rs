use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction for the external timer controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingCommand {
    Start,
    Split,
    Reset,
    Pause,
    Resume,
}

impl TimingCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimingCommand::Start => "start",
            TimingCommand::Split => "split",
            TimingCommand::Reset => "reset",
            TimingCommand::Pause => "pause",
            TimingCommand::Resume => "resume",
        }
    }
}

impl fmt::Display for TimingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
