//! Content hashing for incremental change detection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CurateError;

/// Hash algorithm used for pre- and post-mapping content hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMethod {
    /// 64-bit CRC, the fast default.
    #[default]
    Crc64,
    /// 32-bit CRC.
    Crc32,
    /// SHA-256.
    Sha256,
}

impl HashMethod {
    /// Name as used in cache indexes and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashMethod::Crc64 => "crc64",
            HashMethod::Crc32 => "crc32",
            HashMethod::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashMethod {
    type Err = CurateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crc64" => Ok(HashMethod::Crc64),
            "crc32" => Ok(HashMethod::Crc32),
            "sha256" => Ok(HashMethod::Sha256),
            other => Err(CurateError::Config(format!(
                "Unknown hash method '{}' (expected crc64, crc32 or sha256)",
                other
            ))),
        }
    }
}

/// Hash a byte buffer, returning a lowercase hex digest.
pub fn hash(data: &[u8], method: HashMethod) -> String {
    match method {
        HashMethod::Crc64 => {
            let mut digest = crc64fast::Digest::new();
            digest.write(data);
            format!("{:016x}", digest.sum64())
        }
        HashMethod::Crc32 => format!("{:08x}", crc32fast::hash(data)),
        HashMethod::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_lengths() {
        let data = b"DICM";
        assert_eq!(hash(data, HashMethod::Crc64).len(), 16);
        assert_eq!(hash(data, HashMethod::Crc32).len(), 8);
        assert_eq!(hash(data, HashMethod::Sha256).len(), 64);
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(hash(b"123456789", HashMethod::Crc32), "cbf43926");
        assert_eq!(
            hash(b"", HashMethod::Sha256),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = hash(b"patient1", HashMethod::Crc64);
        let b = hash(b"patient2", HashMethod::Crc64);
        assert_ne!(a, b);
        assert_eq!(a, hash(b"patient1", HashMethod::Crc64));
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("CRC64".parse::<HashMethod>().unwrap(), HashMethod::Crc64);
        assert_eq!("sha256".parse::<HashMethod>().unwrap(), HashMethod::Sha256);
        assert!("md5".parse::<HashMethod>().is_err());
    }
}
