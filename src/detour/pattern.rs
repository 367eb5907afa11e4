/// Textual machine-code templates
///
/// A template is a list of lines. Each line holds hex byte pairs (`8B EC`) and/or
/// placeholders (`#4`), which reserve that many zeroed bytes to be filled with a
/// little-endian value once runtime addresses are known. Anything after `//` or `;`
/// is a comment, and so is free text that follows at least one token on a line:
///
/// ```text
/// 55            // push ebp
/// C7 05 #4 #4   // mov dword ptr [status], imm32
/// E8 #4         call gate
/// ```
///
/// The assembler knows nothing about instructions; it only turns text into bytes.

use super::error::{DetourError, Result};

pub const PLACEHOLDER_MARKER: char = '#';
const MAX_PLACEHOLDER_WIDTH: usize = 8;

/// Reserved bytes inside an assembled template
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placeholder {
    pub offset: usize,
    pub width: usize,
}

/// Bytes produced from a template plus its unresolved placeholders
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assembled {
    bytes: Vec<u8>,
    placeholders: Vec<Placeholder>,
}

impl Assembled {
    pub fn parse(template: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        let mut placeholders = Vec::new();

        for (index, raw) in template.lines().enumerate() {
            let line = strip_comment(raw);
            let mut parsed_any = false;

            for token in line.split_whitespace() {
                if let Some(width) = token.strip_prefix(PLACEHOLDER_MARKER) {
                    let width = width
                        .parse::<usize>()
                        .ok()
                        .filter(|w| (1..=MAX_PLACEHOLDER_WIDTH).contains(w))
                        .ok_or_else(|| malformed(index, token))?;
                    placeholders.push(Placeholder { offset: bytes.len(), width });
                    bytes.resize(bytes.len() + width, 0);
                } else if let Some(byte) = parse_hex_byte(token) {
                    bytes.push(byte);
                } else if parsed_any {
                    break;
                } else {
                    return Err(malformed(index, token));
                }
                parsed_any = true;
            }
        }

        Ok(Self { bytes, placeholders })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Placeholders in declaration order
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Fills the `index`-th placeholder, which must be exactly 4 bytes wide
    pub fn fill_u32(&mut self, index: usize, value: u32) -> Result<()> {
        let placeholder = *self.placeholders.get(index).ok_or(DetourError::PlaceholderMismatch {
            expected: index + 1,
            found: self.placeholders.len(),
        })?;
        if placeholder.width != 4 {
            return Err(DetourError::PlaceholderWidth {
                offset: placeholder.offset,
                width: placeholder.width,
                expected: 4,
            });
        }

        self.bytes[placeholder.offset..placeholder.offset + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

fn strip_comment(line: &str) -> &str {
    let end = [line.find("//"), line.find(';')]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    &line[..end]
}

fn parse_hex_byte(token: &str) -> Option<u8> {
    if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(token, 16).ok()
}

fn malformed(index: usize, token: &str) -> DetourError {
    DetourError::MalformedPattern {
        line: index + 1,
        token: token.to_string(),
    }
}

/// Formats bytes as space-separated upper-case hex pairs
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
