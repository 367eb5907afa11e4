use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine status as written into the shared status cell
///
/// The numeric values are what the injected code stores, so they must not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Status {
    #[default]
    None = 0,
    Loading = 1,
    Saving = 2,
}

impl Status {
    pub fn from_raw(value: i64) -> Option<Self> {
        match value {
            0 => Some(Status::None),
            1 => Some(Status::Loading),
            2 => Some(Status::Saving),
            _ => None,
        }
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    pub fn is_busy(self) -> bool {
        self != Status::None
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::None => "none",
            Status::Loading => "loading",
            Status::Saving => "saving",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        for status in [Status::None, Status::Loading, Status::Saving] {
            assert_eq!(Status::from_raw(status.raw() as i64), Some(status));
        }
        assert_eq!(Status::from_raw(7), None);
    }
}
