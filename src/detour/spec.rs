use super::error::{DetourError, Result};
use super::pattern::Assembled;
use super::signature::Signature;
use crate::types::Status;

/// Size of `jmp rel32`, the instruction written over the target's prologue
pub const JMP_REL32_LEN: usize = 5;

/// Runtime value written into a template placeholder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fill {
    /// Address of the shared status cell
    StatusCell,
    /// Address of the shared level-name buffer
    LevelCell,
    /// Characters the level buffer holds, excluding the terminator
    LevelCapacity,
    /// Raw value of a status
    Status(Status),
    /// rel32 from the end of the placeholder to the relocated original function
    CallOriginal,
}

/// Declarative description of one detour
#[derive(Clone, Copy, Debug)]
pub struct DetourSpec {
    pub name: &'static str,
    pub module: &'static str,
    pub symbol: &'static str,
    /// Bytes expected at the function entry, ending on an instruction boundary.
    /// They are relocated verbatim, so they must not contain relative operands.
    pub prologue: &'static str,
    pub template: &'static str,
    /// One entry per template placeholder, in declaration order
    pub fills: &'static [Fill],
}

impl DetourSpec {
    pub fn prologue(&self) -> Result<Signature> {
        Signature::parse(self.prologue)
    }

    /// Assembles the template and checks it against the fills and the prologue
    pub fn validate(&self) -> Result<Assembled> {
        let prologue = self.prologue()?;
        if prologue.len() < JMP_REL32_LEN {
            return Err(DetourError::PatchTooLarge {
                name: self.name.to_string(),
                needed: JMP_REL32_LEN,
                available: prologue.len(),
            });
        }

        let assembled = Assembled::parse(self.template)?;
        if assembled.placeholders().len() != self.fills.len() {
            return Err(DetourError::PlaceholderMismatch {
                expected: self.fills.len(),
                found: assembled.placeholders().len(),
            });
        }
        if let Some(p) = assembled.placeholders().iter().find(|p| p.width != 4) {
            return Err(DetourError::PlaceholderWidth {
                offset: p.offset,
                width: p.width,
                expected: 4,
            });
        }

        Ok(assembled)
    }
}
