//! Content hashing primitives for cache keys and value identity.
//!
//! [`ContentHasher`] is the only place that names a concrete digest crate.
//! Everything above it (canonical addressing, interning, cache keys) works in
//! terms of [`HashAlgorithm`] and [`ContentHash`], so the digest can change
//! without touching those layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The digest used to produce a [`ContentHash`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// XXH3 with 128-bit output. Fast, not cryptographic.
    #[default]
    #[serde(rename = "xxh3-128")]
    Xxh3_128,
    /// BLAKE3 with 256-bit output.
    #[serde(rename = "blake3-256")]
    Blake3_256,
}

impl HashAlgorithm {
    /// Number of digest bytes this algorithm produces.
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Xxh3_128 => 16,
            Self::Blake3_256 => 32,
        }
    }

    /// Stable lowercase name, matching the serialized form.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xxh3_128 => "xxh3-128",
            Self::Blake3_256 => "blake3-256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed-length content identifier.
///
/// Two values with the same `ContentHash` are assumed to be equal under
/// canonicalization. Hashes produced by different algorithms never compare
/// equal, even if their leading bytes happen to match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash {
    algorithm: HashAlgorithm,
    bytes: [u8; 32],
}

impl ContentHash {
    /// Hashes a byte slice in one shot.
    pub fn from_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Self {
        let mut hasher = ContentHasher::new(algorithm);
        hasher.update(data);
        hasher.finish()
    }

    /// The algorithm that produced this hash.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The digest bytes (16 for XXH3-128, 32 for BLAKE3-256).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.algorithm.digest_len()]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ContentHash({}:{:02x}{:02x}..)",
            self.algorithm, self.bytes[0], self.bytes[1]
        )
    }
}

impl Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

enum HasherState {
    Xxh3(Box<xxhash_rust::xxh3::Xxh3>),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental hasher producing a [`ContentHash`].
pub struct ContentHasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

impl ContentHasher {
    /// Creates a hasher for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::Xxh3_128 => HasherState::Xxh3(Box::default()),
            HashAlgorithm::Blake3_256 => HasherState::Blake3(Box::default()),
        };
        Self { algorithm, state }
    }

    /// Feeds bytes into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Xxh3(h) => h.update(data),
            HasherState::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Feeds a previously computed hash, so digests can be chained.
    pub fn update_hash(&mut self, hash: &ContentHash) {
        self.update(hash.as_bytes());
    }

    /// Consumes the hasher and returns the digest.
    pub fn finish(self) -> ContentHash {
        let mut bytes = [0u8; 32];
        match self.state {
            HasherState::Xxh3(h) => {
                bytes[..16].copy_from_slice(&h.digest128().to_le_bytes());
            }
            HasherState::Blake3(h) => {
                bytes.copy_from_slice(h.finalize().as_bytes());
            }
        }
        ContentHash {
            algorithm: self.algorithm,
            bytes,
        }
    }
}
