/// Byte signatures for function prologues

use super::error::{DetourError, Result};

/// バイトパターン（`??` = ワイルドカード）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    bytes: Vec<u8>,
    mask: Vec<bool>, // true = マッチが必要, false = ワイルドカード
}

impl Signature {
    /// パターンを文字列から作成
    /// 例: "55 8B EC 6A FF"
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut bytes = Vec::new();
        let mut mask = Vec::new();

        for part in pattern.split_whitespace() {
            if part == "??" || part == "?" {
                bytes.push(0);
                mask.push(false);
            } else if part.len() == 2 {
                let byte = u8::from_str_radix(part, 16)
                    .map_err(|_| DetourError::InvalidSignature(part.to_string()))?;
                bytes.push(byte);
                mask.push(true);
            } else {
                return Err(DetourError::InvalidSignature(part.to_string()));
            }
        }

        Ok(Self { bytes, mask })
    }

    /// バイト配列とマッチするか
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() >= self.bytes.len()
            && self
                .bytes
                .iter()
                .zip(&self.mask)
                .zip(data)
                .all(|((expected, required), actual)| !required || expected == actual)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards() {
        let signature = Signature::parse("55 8B EC ?? FF").unwrap();
        assert_eq!(signature.len(), 5);
        assert!(signature.matches(&[0x55, 0x8B, 0xEC, 0x6A, 0xFF]));
        assert!(signature.matches(&[0x55, 0x8B, 0xEC, 0x00, 0xFF, 0x90]));
        assert!(!signature.matches(&[0x55, 0x8B, 0xEC, 0x6A, 0xFE]));
        assert!(!signature.matches(&[0x55, 0x8B]));
    }

    #[test]
    fn test_invalid_token() {
        assert!(Signature::parse("55 8BEC").is_err());
        assert!(Signature::parse("55 ZZ").is_err());
    }
}
