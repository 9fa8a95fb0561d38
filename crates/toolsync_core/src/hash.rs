//! Schema fingerprints.
//!
//! Uses BLAKE3 over canonical bytes. A fingerprint is rendered as
//! `blake3:<64 hex chars>` everywhere it is persisted or printed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Prefix used in the textual form of a fingerprint
const ALGORITHM_PREFIX: &str = "blake3";

/// A BLAKE3 content hash (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of canonical bytes
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, used as a human-facing version marker
    #[must_use]
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns error if hex is invalid or not 32 bytes
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(hex).map_err(|_| HashError::InvalidHex)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Parse the `blake3:<hex>` textual form
    ///
    /// # Errors
    ///
    /// Returns error if the prefix is unknown or the hex part is invalid
    pub fn parse(s: &str) -> Result<Self, HashError> {
        let (algorithm, hex) = s.split_once(':').ok_or(HashError::MissingPrefix)?;
        if algorithm != ALGORITHM_PREFIX {
            return Err(HashError::UnknownAlgorithm(algorithm.to_string()));
        }
        Self::from_hex(hex)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", ALGORITHM_PREFIX, self.to_hex())
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Fingerprint parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// Invalid hex encoding
    InvalidHex,
    /// Invalid length (not 32 bytes)
    InvalidLength(usize),
    /// Textual form lacks the `algorithm:` prefix
    MissingPrefix,
    /// Prefix names an algorithm other than BLAKE3
    UnknownAlgorithm(String),
}

impl std::error::Error for HashError {}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHex => write!(f, "Invalid hex encoding"),
            Self::InvalidLength(len) => write!(f, "Invalid hash length: {} (expected 32)", len),
            Self::MissingPrefix => write!(f, "Fingerprint is missing its algorithm prefix"),
            Self::UnknownAlgorithm(name) => write!(f, "Unknown fingerprint algorithm: {}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_compute() {
        let fp = Fingerprint::compute(b"hello world");
        assert_eq!(fp.to_hex().len(), 64);
        assert_eq!(fp, Fingerprint::compute(b"hello world"));
        assert_ne!(fp, Fingerprint::compute(b"other"));
    }

    #[test]
    fn test_fingerprint_display_and_parse() {
        let fp = Fingerprint::compute(b"tools");
        let text = fp.to_string();
        assert!(text.starts_with("blake3:"));
        assert_eq!(Fingerprint::parse(&text).unwrap(), fp);
    }

    #[test]
    fn test_fingerprint_short() {
        let fp = Fingerprint::compute(b"tools");
        assert_eq!(fp.short().len(), 12);
        assert!(fp.to_hex().starts_with(&fp.short()));
    }

    #[test]
    fn test_fingerprint_parse_errors() {
        assert_eq!(Fingerprint::parse("abcdef"), Err(HashError::MissingPrefix));
        assert_eq!(
            Fingerprint::parse("sha1:00"),
            Err(HashError::UnknownAlgorithm("sha1".to_string()))
        );
        assert_eq!(Fingerprint::parse("blake3:zz"), Err(HashError::InvalidHex));
        assert_eq!(
            Fingerprint::parse("blake3:0011"),
            Err(HashError::InvalidLength(2))
        );
    }

    #[test]
    fn test_fingerprint_serde_as_string() {
        let fp = Fingerprint::compute(b"x");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
