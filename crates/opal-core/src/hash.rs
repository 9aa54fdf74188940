//! Structural hash functions
//!
//! A structural hash fingerprints the control-flow/instruction shape of a
//! function so the profile reader can detect whether the profiled and current
//! versions of a function are identical. The profile header declares which
//! function produced its fingerprints; both sides must use the same one.

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::hash::Hasher;

/// Hash function used for structural fingerprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashFunction {
    /// Fast 64-bit hash. Not stable across library versions; only valid when
    /// profile and binary were processed by the same toolchain build.
    #[default]
    Legacy,
    /// SHA-256 truncated to 64 bits. Stable across runs and versions.
    Stable,
}

impl HashFunction {
    /// Hash a byte stream into a 64-bit fingerprint.
    pub fn digest(self, bytes: &[u8]) -> u64 {
        match self {
            HashFunction::Legacy => {
                let mut hasher = FxHasher::default();
                hasher.write(bytes);
                hasher.finish()
            }
            HashFunction::Stable => {
                let digest = Sha256::digest(bytes);
                let mut truncated = [0u8; 8];
                truncated.copy_from_slice(&digest[..8]);
                u64::from_le_bytes(truncated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        let bytes = b"blocks:3;succ:1,2";
        assert_eq!(
            HashFunction::Legacy.digest(bytes),
            HashFunction::Legacy.digest(bytes)
        );
        assert_eq!(
            HashFunction::Stable.digest(bytes),
            HashFunction::Stable.digest(bytes)
        );
    }

    #[test]
    fn test_functions_disagree() {
        let bytes = b"entry";
        assert_ne!(
            HashFunction::Legacy.digest(bytes),
            HashFunction::Stable.digest(bytes)
        );
    }

    #[test]
    fn test_input_sensitivity() {
        assert_ne!(
            HashFunction::Stable.digest(b"a"),
            HashFunction::Stable.digest(b"b")
        );
    }

    #[test]
    fn test_serde_names() {
        let legacy: HashFunction = serde_json::from_str("\"legacy\"").unwrap();
        let stable: HashFunction = serde_json::from_str("\"stable\"").unwrap();
        assert_eq!(legacy, HashFunction::Legacy);
        assert_eq!(stable, HashFunction::Stable);
    }
}
