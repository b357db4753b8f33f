//! Length-bounded channel names with a content-derived suffix.
//!
//! Channel names are durable identities on the destination, so the output
//! must depend on nothing but the input and the two lengths.

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    sha2::{Digest, Sha256},
};

/// Characters removed from names before and after hashing.
pub const FORBIDDEN: &[char] = &[
    ' ', '(', ')', '.', '#', '$', '@', '%', '^', '&', '*', '+', '=', '[', ']', '{', '}', ':', ';',
    '\'', '<', '>', '/', '?', ',', '|', '`', '"',
];

/// Length of a base64-encoded SHA-256 digest.
pub const ENCODED_DIGEST_LEN: usize = 44;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShortenError {
    #[error("hash length must be positive")]
    EmptyHash,

    #[error("hash length {hash_len} exceeds target length {target_len}")]
    HashLongerThanTarget { target_len: usize, hash_len: usize },

    #[error("hash length {hash_len} exceeds the encoded digest length {}", ENCODED_DIGEST_LEN)]
    HashLongerThanDigest { hash_len: usize },
}

pub fn strip_forbidden(raw: &str) -> String {
    raw.chars().filter(|c| !FORBIDDEN.contains(c)).collect()
}

/// Validated `(target_len, hash_len)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameShortener {
    target_len: usize,
    hash_len: usize,
}

impl NameShortener {
    pub fn new(target_len: usize, hash_len: usize) -> Result<Self, ShortenError> {
        if hash_len == 0 {
            return Err(ShortenError::EmptyHash);
        }
        if hash_len > ENCODED_DIGEST_LEN {
            return Err(ShortenError::HashLongerThanDigest { hash_len });
        }
        if hash_len > target_len {
            return Err(ShortenError::HashLongerThanTarget {
                target_len,
                hash_len,
            });
        }
        Ok(Self {
            target_len,
            hash_len,
        })
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    pub fn hash_len(&self) -> usize {
        self.hash_len
    }

    /// Names shorter than the target come back stripped but otherwise
    /// untouched; longer ones are truncated, suffixed and lower-cased.
    pub fn shorten(&self, raw: &str) -> String {
        let cleaned = strip_forbidden(raw);
        if cleaned.chars().count() < self.target_len {
            return cleaned;
        }
        let digest = STANDARD.encode(Sha256::digest(cleaned.as_bytes()));
        let mut name: String = cleaned
            .chars()
            .take(self.target_len - self.hash_len)
            .collect();
        name.extend(digest.chars().take(self.hash_len));
        strip_forbidden(&name).to_lowercase()
    }
}

/// One-off form of [`NameShortener::shorten`].
pub fn shorten(raw: &str, target_len: usize, hash_len: usize) -> Result<String, ShortenError> {
    Ok(NameShortener::new(target_len, hash_len)?.shorten(raw))
}
