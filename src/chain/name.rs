//! Antelope base32 names.
//!
//! Account, action and permission names are packed into a `u64`: up to twelve
//! 5-bit symbols followed by an optional 4-bit thirteenth symbol.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const CHARMAP: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Errors raised when parsing a name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("name '{0}' is longer than 13 characters")]
    TooLong(String),

    #[error("name '{name}' contains invalid character '{ch}'")]
    InvalidChar { name: String, ch: char },

    #[error("name '{0}' is not in canonical form")]
    NotCanonical(String),
}

/// A packed Antelope name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Name(u64);

impl Name {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

fn symbol(name: &str, ch: char) -> Result<u64, NameError> {
    match ch {
        'a'..='z' => Ok(ch as u64 - 'a' as u64 + 6),
        '1'..='5' => Ok(ch as u64 - '1' as u64 + 1),
        '.' => Ok(0),
        _ => Err(NameError::InvalidChar {
            name: name.to_string(),
            ch,
        }),
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() > 13 {
            return Err(NameError::TooLong(s.to_string()));
        }

        let mut value = 0u64;
        for (i, &ch) in chars.iter().take(12).enumerate() {
            value |= (symbol(s, ch)? & 0x1f) << (64 - 5 * (i + 1));
        }
        if let Some(&ch) = chars.get(12) {
            let last = symbol(s, ch)?;
            if last > 0x0f {
                return Err(NameError::InvalidChar {
                    name: s.to_string(),
                    ch,
                });
            }
            value |= last;
        }

        let name = Name(value);
        // Trailing dots collapse on the way back out.
        if name.to_string() != s {
            return Err(NameError::NotCanonical(s.to_string()));
        }
        Ok(name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = [b'.'; 13];
        let mut tmp = self.0;
        for i in 0..=12 {
            let (mask, shift) = if i == 0 { (0x0f, 4) } else { (0x1f, 5) };
            out[12 - i] = CHARMAP[(tmp & mask) as usize];
            tmp >>= shift;
        }
        let text = std::str::from_utf8(&out).map_err(|_| fmt::Error)?;
        f.write_str(text.trim_end_matches('.'))
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
