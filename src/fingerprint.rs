//! Fingerprint utilities for detecting identical schemas

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA256 fingerprint of a canonicalized schema definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute fingerprint from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute fingerprint from a canonical string form
    pub fn of_canonical(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` hex characters, used in file names and log lines
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Verify that canonical content matches this fingerprint
    pub fn verify(&self, canonical: &str) -> bool {
        Self::of_canonical(canonical) == *self
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_consistency() {
        let content = r#"{"fields":[{"name":"field1","type":"string"}]}"#;
        assert_eq!(Fingerprint::of_canonical(content), Fingerprint::of_canonical(content));
    }

    #[test]
    fn test_fingerprint_different_content() {
        let a = Fingerprint::of_canonical(r#"{"fields":[{"name":"a","type":"int"}]}"#);
        let b = Fingerprint::of_canonical(r#"{"fields":[{"name":"a","type":"long"}]}"#);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fingerprint_verification() {
        let content = r#"{"fields":[]}"#;
        let fp = Fingerprint::of_canonical(content);
        assert!(fp.verify(content));
        assert!(!fp.verify("different content"));
        assert_eq!(fp.as_str().len(), 64);
        assert_eq!(fp.short(12).len(), 12);
    }
}
