//! Two-level semantic versions for type and function definitions.
//!
//! A version is `<major>.<minor>` where both parts are non-negative
//! integers. Ordering is numeric, not textual: `1.10 > 1.9`.
//!
//! Version assignment rules:
//! - New entity: `0.1`
//! - Backward-compatible change: minor + 1
//! - Incompatible change with major >= 1: major + 1, minor reset to 0
//! - Incompatible change with major == 0: minor + 1 (pre-release)
//! - Module release: every `0.x` entity is promoted to `1.0`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::IdentError;

/// A `<major>.<minor>` version pair with numeric ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
}

impl SemanticVersion {
    /// Version assigned to a freshly registered entity.
    pub const DEFAULT: SemanticVersion = SemanticVersion { major: 0, minor: 1 };

    /// Version assigned to `0.x` entities when their module is released.
    pub const RELEASE: SemanticVersion = SemanticVersion { major: 1, minor: 0 };

    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for SemanticVersion {
    type Err = IdentError;

    /// Strict parse: exactly one dot, both sides plain decimal integers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| IdentError::InvalidVersion(s.to_string()))?;
        if major.is_empty()
            || minor.is_empty()
            || !major.bytes().all(|b| b.is_ascii_digit())
            || !minor.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(IdentError::InvalidVersion(s.to_string()));
        }
        let major = major
            .parse()
            .map_err(|_| IdentError::InvalidVersion(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| IdentError::InvalidVersion(s.to_string()))?;
        Ok(Self { major, minor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        let v = SemanticVersion::new(2, 13);
        assert_eq!(v.to_string(), "2.13");
        assert_eq!("2.13".parse::<SemanticVersion>().unwrap(), v);
    }

    #[test]
    fn test_numeric_ordering() {
        let small: SemanticVersion = "1.9".parse().unwrap();
        let large: SemanticVersion = "1.10".parse().unwrap();
        assert!(small < large);
        assert!("0.5".parse::<SemanticVersion>().unwrap() < "1.0".parse().unwrap());
    }

    #[test]
    fn test_strict_parsing() {
        assert!("1".parse::<SemanticVersion>().is_err());
        assert!("1.".parse::<SemanticVersion>().is_err());
        assert!(".1".parse::<SemanticVersion>().is_err());
        assert!("1.2.3".parse::<SemanticVersion>().is_err());
        assert!("1.-2".parse::<SemanticVersion>().is_err());
        assert!("a.b".parse::<SemanticVersion>().is_err());
    }
}
