//! SHA-1 digest newtype matching the registry's `shasum` format.
//!
//! Validates that the value is a 40-character lowercase hexadecimal string.

use crate::error::{Result, VerifyError};
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::{self, Read};

/// Expected length of a hex-encoded SHA-1 digest.
const SHASUM_HEX_LEN: usize = 40;

/// A validated hex-encoded SHA-1 digest string.
///
/// # Examples
///
/// ```
/// use tbv::archive::shasum::Shasum;
///
/// let hex = "a".repeat(40);
/// let digest = Shasum::try_from(hex.as_str())?;
/// assert_eq!(digest.short(), "aaaaaaa");
/// # Ok::<(), tbv::error::VerifyError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct Shasum(String);

impl Shasum {
    /// Return the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first seven characters, as git abbreviates commits.
    #[must_use]
    pub fn short(&self) -> String {
        self.0.chars().take(7).collect()
    }

    /// Hashes everything `reader` yields.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while reading.
    pub fn of_reader(reader: &mut dyn Read) -> io::Result<Self> {
        let mut hasher = Sha1::new();
        io::copy(reader, &mut hasher)?;
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Hashes an in-memory buffer.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha1::digest(bytes)))
    }
}

impl TryFrom<&str> for Shasum {
    type Error = VerifyError;

    fn try_from(value: &str) -> Result<Self> {
        validate_shasum(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for Shasum {
    type Error = VerifyError;

    fn try_from(value: String) -> Result<Self> {
        validate_shasum(&value)?;
        Ok(Self(value))
    }
}

impl AsRef<str> for Shasum {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Shasum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate that `value` is a well-formed hex-encoded SHA-1 digest.
fn validate_shasum(value: &str) -> Result<()> {
    if value.len() != SHASUM_HEX_LEN {
        return Err(VerifyError::Parse {
            reason: format!(
                "expected {SHASUM_HEX_LEN} hex characters in shasum, got {}",
                value.len()
            ),
        });
    }
    if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(VerifyError::Parse {
            reason: format!("non-hex character '{bad}' in shasum"),
        });
    }
    if value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(VerifyError::Parse {
            reason: "shasum must be lowercase".to_owned(),
        });
    }
    Ok(())
}
