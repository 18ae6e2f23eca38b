//! Record fingerprinting for resume/dedup.

use blake3::Hasher;
use std::fmt;

/// 128-bit digest of a record's field values. Order-sensitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    /// Hash field values with blake3 and keep the first 16 bytes.
    /// Each value is length-prefixed so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn of<S: AsRef<str>>(values: &[S]) -> Self {
        let mut hasher = Hasher::new();
        for v in values {
            let bytes = v.as_ref().as_bytes();
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        let mut out = [0u8; 16];
        out.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
        Fingerprint(out)
    }

    /// Parse the 32-char lowercase hex form written to the result log.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 32 || !s.is_ascii() {
            return None;
        }
        let mut out = [0u8; 16];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Fingerprint(out))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
