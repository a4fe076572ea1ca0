/// Digest helpers for fingerprint layers
///
/// Layer hashes are hex digests over a canonical token stream. The algorithm
/// is selectable so fingerprints can match whatever the ledger collaborator
/// seals; SHA-256 is the default.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::collections::BTreeSet;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }

    /// Length of the hex digest
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

/// Hex digest of a byte slice
pub fn calculate_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
        HashAlgorithm::Sha1 => {
            let mut hasher = sha1::Sha1::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
    }
}

/// Hash an already-sorted token stream
///
/// Tokens are joined with a unit separator so `["ab","c"]` and `["a","bc"]`
/// never collide.
pub fn hash_tokens<'a, I>(tokens: I, algorithm: HashAlgorithm) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut buffer = Vec::new();
    for token in tokens {
        buffer.extend_from_slice(token.as_bytes());
        buffer.push(0x1f);
    }
    calculate_hash(&buffer, algorithm)
}

/// Compact 32-bit shingles for set-similarity between fingerprints
pub fn shingles<'a, I>(tokens: I) -> BTreeSet<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    tokens
        .into_iter()
        .map(|token| crc32fast::hash(token.as_bytes()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_hash_lengths() {
        let data = b"loan_amount=100000";
        for algorithm in [
            HashAlgorithm::Md5,
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(calculate_hash(data, algorithm).len(), algorithm.hex_len());
        }
    }

    #[test]
    fn test_token_boundaries_do_not_collide() {
        let a = hash_tokens(["ab", "c"], HashAlgorithm::Sha256);
        let b = hash_tokens(["a", "bc"], HashAlgorithm::Sha256);
        assert_ne!(a, b);
    }

    #[test]
    fn test_shingles_deduplicate() {
        let set = shingles(["x", "y", "x"]);
        assert_eq!(set.len(), 2);
    }
}
