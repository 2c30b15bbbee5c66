//! Hex-encoded, version-tagged content fingerprints.

use super::traits::SchemeTag;
use crate::error::FingerprintError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed-width bit vector summarising the visual content of a media item.
///
/// Textual form is `"<tag>:<hex>"` (e.g. `dct8:7f3a…`). Bare hex without a
/// tag is accepted for fingerprints stored by older versions; its bit width
/// is four bits per hex digit. The bit vector is left-padded with zero bits
/// up to a nibble boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint {
    tag: Option<SchemeTag>,
    bits: u32,
    hex: String,
}

impl Fingerprint {
    /// Pack a bit sequence (most significant first) into a tagged fingerprint
    pub fn from_bits(tag: SchemeTag, bits: &[bool]) -> Self {
        let pad = (4 - bits.len() % 4) % 4;
        let mut hex = String::with_capacity((bits.len() + pad) / 4);
        let mut nibble: u8 = 0;
        let mut filled = pad;

        for &bit in bits {
            nibble = (nibble << 1) | u8::from(bit);
            filled += 1;
            if filled == 4 {
                hex.push(char::from_digit(u32::from(nibble), 16).unwrap_or('0'));
                nibble = 0;
                filled = 0;
            }
        }

        Self {
            tag: Some(tag),
            bits: bits.len() as u32,
            hex,
        }
    }

    /// Parse a stored fingerprint string
    pub fn parse(text: &str) -> Result<Self, FingerprintError> {
        let malformed = |reason: String| FingerprintError::Malformed {
            text: text.to_string(),
            reason,
        };

        let trimmed = text.trim();
        let (tag, hex) = match trimmed.split_once(':') {
            Some((tag, hex)) => (Some(tag.parse::<SchemeTag>().map_err(malformed)?), hex),
            None => (None, trimmed),
        };

        if hex.is_empty() {
            return Err(malformed("no hex digits".to_string()));
        }
        if let Some(bad) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(malformed(format!("unexpected character {bad:?}")));
        }
        let hex = hex.to_ascii_lowercase();

        let bits = match tag {
            Some(tag) => {
                let bits = tag.bit_count();
                let expected_len = bits.div_ceil(4) as usize;
                if hex.len() != expected_len {
                    return Err(malformed(format!(
                        "{tag} expects {expected_len} hex digits, found {}",
                        hex.len()
                    )));
                }
                // Padding bits live in the leading nibble and must be zero
                let pad = expected_len as u32 * 4 - bits;
                let lead = hex
                    .chars()
                    .next()
                    .and_then(|c| c.to_digit(16))
                    .unwrap_or(0);
                if pad > 0 && lead >> (4 - pad) != 0 {
                    return Err(malformed("padding bits are set".to_string()));
                }
                bits
            }
            None => hex.len() as u32 * 4,
        };

        Ok(Self { tag, bits, hex })
    }

    /// Scheme tag, `None` for legacy untagged fingerprints
    pub fn tag(&self) -> Option<SchemeTag> {
        self.tag
    }

    /// Width of the bit vector
    pub fn bit_count(&self) -> u32 {
        self.bits
    }

    /// Lowercase hex digits without the tag
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Whether a Hamming distance between the two is meaningful.
    ///
    /// Widths must match. Tags must match when both sides carry one; an
    /// untagged fingerprint is compared on width alone.
    pub fn is_comparable_with(&self, other: &Fingerprint) -> bool {
        if self.bits != other.bits || self.hex.len() != other.hex.len() {
            return false;
        }
        match (self.tag, other.tag) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{}:{}", tag, self.hex),
            None => f.write_str(&self.hex),
        }
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_string()
    }
}
