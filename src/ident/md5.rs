//! MD5 digests as canonical identity for schema documents and module ASTs.

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use super::errors::IdentError;

/// A lowercase-hex MD5 digest (32 characters).
///
/// Two schema documents with equal digests are treated as the same schema;
/// a type may be looked up by the digest of any of its stored versions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Md5Hash(String);

impl Md5Hash {
    /// Digest raw bytes into a lowercase-hex MD5.
    pub fn digest(bytes: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(bytes)))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// True when `s` has the shape of an MD5 hex digest.
    pub fn looks_like_md5(s: &str) -> bool {
        s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for Md5Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Md5Hash {
    type Err = IdentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !Self::looks_like_md5(s) {
            return Err(IdentError::InvalidMd5(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}
