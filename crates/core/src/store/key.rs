//! Hierarchical keys and their order-preserving byte encoding.
//!
//! A key is a tuple of parts. Encoded keys compare byte-wise in the same
//! order as the tuples compare part by part: integers numerically, strings
//! lexicographically, and every integer before every string at the same
//! position. A key that is a tuple prefix of another is also a byte prefix
//! of it, which is what makes prefix scans plain range scans.

use std::fmt;

const TAG_INT: u8 = 0x01;
const TAG_STR: u8 = 0x02;

/// One component of a [`Key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Int(i64),
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

impl From<u64> for KeyPart {
    fn from(value: u64) -> Self {
        KeyPart::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        KeyPart::Int(i64::from(value))
    }
}

/// A hierarchical store key, e.g. `["chapters", 3, "Chapter 1"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Key(Vec<KeyPart>);

impl Key {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a part (builder style).
    pub fn push(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Whether every part of `prefix` leads this key.
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn last(&self) -> Option<&KeyPart> {
        self.0.last()
    }

    /// Encode into the order-preserving byte form.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len() * 10);
        for part in &self.0 {
            match part {
                KeyPart::Int(v) => {
                    out.push(TAG_INT);
                    // Flipping the sign bit makes two's complement sort as unsigned.
                    out.extend_from_slice(&((*v as u64) ^ (1 << 63)).to_be_bytes());
                }
                KeyPart::Str(s) => {
                    out.push(TAG_STR);
                    for b in s.as_bytes() {
                        if *b == 0x00 {
                            out.extend_from_slice(&[0x00, 0xFF]);
                        } else {
                            out.push(*b);
                        }
                    }
                    out.extend_from_slice(&[0x00, 0x00]);
                }
            }
        }
        out
    }

    /// Decode a key produced by [`Key::encode`].
    pub fn decode(bytes: &[u8]) -> Option<Key> {
        let mut parts = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                TAG_INT => {
                    let raw: [u8; 8] = bytes.get(i + 1..i + 9)?.try_into().ok()?;
                    parts.push(KeyPart::Int((u64::from_be_bytes(raw) ^ (1 << 63)) as i64));
                    i += 9;
                }
                TAG_STR => {
                    let mut buf = Vec::new();
                    i += 1;
                    loop {
                        match (bytes.get(i)?, bytes.get(i + 1)) {
                            (0x00, Some(0x00)) => {
                                i += 2;
                                break;
                            }
                            (0x00, Some(0xFF)) => {
                                buf.push(0x00);
                                i += 2;
                            }
                            (0x00, _) => return None,
                            (b, _) => {
                                buf.push(*b);
                                i += 1;
                            }
                        }
                    }
                    parts.push(KeyPart::Str(String::from_utf8(buf).ok()?));
                }
                _ => return None,
            }
        }
        Some(Key(parts))
    }
}

/// Exclusive upper bound for a byte-prefix range scan, or `None` when the
/// prefix is empty or all `0xFF` (the range is unbounded above).
pub(crate) fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < 0xFF {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match part {
                KeyPart::Int(v) => write!(f, "{}", v)?,
                KeyPart::Str(s) => write!(f, "{:?}", s)?,
            }
        }
        write!(f, "]")
    }
}

/// Build a [`Key`] from a list of parts: `key!["chapters", id, path]`.
#[macro_export]
macro_rules! key {
    ($($part:expr),* $(,)?) => {
        $crate::store::Key::new()$(.push($part))*
    };
}
